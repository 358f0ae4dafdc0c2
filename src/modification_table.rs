//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::fs::File;
use std::io;
use std::path::Path;
use crate::error::Error;

// chrom, start, end, read_name, score, strand, thick_start, thick_end, color, coverage, methylated
pub const MODIFICATION_TABLE_COLUMNS: usize = 11;

const COL_CHROM: usize = 0;
const COL_START: usize = 1;
const COL_END: usize = 2;
const COL_READ_NAME: usize = 3;
const COL_STRAND: usize = 5;
const COL_COVERAGE: usize = 9;
const COL_METHYLATED: usize = 10;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Strand {
    Plus,
    Minus,
    Unknown
}

impl Strand {
    pub fn from_field(s: &str) -> Strand {
        match s {
            "+" => Strand::Plus,
            "-" => Strand::Minus,
            _ => Strand::Unknown
        }
    }
}

/// One modification call row: a single read's observations over one interval.
/// `start`/`end` are 0-based half-open.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ModificationRecord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub read_id: String,
    pub strand: Strand,
    pub coverage: u64,
    pub modified_count: u64
}

fn parse_integer(record: &csv::StringRecord, row: usize, column: usize, name: &str) -> Result<u64, Error> {
    let field = &record[column];
    return field.trim().parse::<u64>()
        .map_err(|_| Error::malformed(row, format!("{} is not a non-negative integer: '{}'", name, field)));
}

impl ModificationRecord {
    pub fn from_fields(row: usize, record: &csv::StringRecord) -> Result<ModificationRecord, Error> {
        if record.len() != MODIFICATION_TABLE_COLUMNS {
            return Err(Error::malformed(row, format!("expected {} columns, found {}", MODIFICATION_TABLE_COLUMNS, record.len())));
        }

        let start = parse_integer(record, row, COL_START, "start")?;
        let end = parse_integer(record, row, COL_END, "end")?;
        let coverage = parse_integer(record, row, COL_COVERAGE, "coverage")?;
        let modified_count = parse_integer(record, row, COL_METHYLATED, "methylated")?;

        if start >= end {
            return Err(Error::malformed(row, format!("interval start {} is not before end {}", start, end)));
        }

        if modified_count > coverage {
            return Err(Error::malformed(row, format!("methylated count {} exceeds coverage {}", modified_count, coverage)));
        }

        let read_id = &record[COL_READ_NAME];
        if read_id.is_empty() {
            return Err(Error::malformed(row, "empty read name"));
        }

        Ok(ModificationRecord {
            chrom: record[COL_CHROM].to_owned(),
            start: start,
            end: end,
            read_id: read_id.to_owned(),
            strand: Strand::from_field(&record[COL_STRAND]),
            coverage: coverage,
            modified_count: modified_count
        })
    }
}

/// Parse a headerless, tab-separated modification table in file order.
/// Any bad row aborts the whole parse. Blank lines are skipped and not
/// counted, so the `row` of an error is the 0-based index among data rows.
pub fn parse_modification_table<R: io::Read>(input: R) -> Result<Vec<ModificationRecord>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(input);

    let mut records = Vec::new();
    for (row, r) in reader.records().enumerate() {
        let fields = r.map_err(|e| Error::malformed(row, e.to_string()))?;
        records.push(ModificationRecord::from_fields(row, &fields)?);
    }
    return Ok(records);
}

pub fn read_modification_table(filename: &Path) -> Result<Vec<ModificationRecord>, Error> {
    let file = File::open(filename).map_err(|e| Error::io(e, filename))?;
    let records = parse_modification_table(io::BufReader::new(file))?;
    info!("read {} modification records from {}", records.len(), filename.display());
    let num_unstranded = records.iter().filter(|r| r.strand == Strand::Unknown).count();
    if num_unstranded > 0 {
        debug!("{} records have no strand", num_unstranded);
    }
    return Ok(records);
}
