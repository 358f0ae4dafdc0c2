//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::collections::HashMap;
use std::path::Path;
use intervaltree::IntervalTree;
use core::ops::Range;
use crate::error::Error;

// Chromosome -> intervaltree of the bed intervals on it
pub struct GenomeRegions
{
    interval_trees: HashMap::<String, IntervalTree<u64, usize>>
}

impl GenomeRegions
{
    pub fn from_bed(filename: &Path) -> Result<GenomeRegions, Error> {
        let mut bed_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(filename)
            .map_err(|e| Error::unavailable(filename, format!("could not open bed file: {}", e)))?;

        // read bed file into a data structure we can use to make intervaltrees from
        // this maps from chromosome to a vector of intervals, with an interval index for each
        let mut region_desc_by_chr = HashMap::<String, Vec<(Range<u64>, usize)>>::new();

        let mut region_count: usize = 0;
        for (row, r) in bed_reader.records().enumerate() {
            let record = r.map_err(|e| Error::malformed(row, e.to_string()))?;
            if record.len() < 3 {
                return Err(Error::malformed(row, format!("bed record has {} columns, expected at least 3", record.len())));
            }
            let start: u64 = record[1].parse().map_err(|_| Error::malformed(row, format!("bad bed start: '{}'", &record[1])))?;
            let end: u64 = record[2].parse().map_err(|_| Error::malformed(row, format!("bad bed end: '{}'", &record[2])))?;
            if end <= start {
                return Err(Error::malformed(row, format!("bed end {} is not after start {}", end, start)));
            }

            let region_desc = region_desc_by_chr.entry(record[0].to_owned()).or_insert( Vec::new() );
            region_desc.push( (start..end, region_count) );
            region_count += 1;
        }
        info!("read {} regions from {}", region_count, filename.display());

        // build chromosome -> intervaltree map
        let mut regions = GenomeRegions { interval_trees: HashMap::<String, IntervalTree<u64, usize>>::new() };
        for (chrom, region_desc) in region_desc_by_chr {
            regions.interval_trees.insert(chrom, region_desc.into_iter().collect());
        }
        return Ok(regions)
    }

    // true if the half-open interval [start, end) overlaps any region on chrom
    pub fn overlaps(& self, chrom: &str, start: u64, end: u64) -> bool {
        if let Some(tree) = self.interval_trees.get(chrom) {
            return tree.query(start..end).next().is_some();
        } else {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_bed(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_overlaps() {
        let bed = write_bed("chr1\t100\t200\nchr1\t500\t600\tname\nchr2\t0\t10\n");
        let regions = GenomeRegions::from_bed(bed.path()).unwrap();

        assert!(regions.overlaps("chr1", 150, 160));
        assert!(regions.overlaps("chr1", 50, 101));
        assert!(regions.overlaps("chr1", 199, 300));
        assert!(!regions.overlaps("chr1", 200, 300));
        assert!(!regions.overlaps("chr1", 50, 100));
        assert!(regions.overlaps("chr2", 5, 6));
        assert!(!regions.overlaps("chr3", 5, 6));
    }

    #[test]
    fn test_malformed_bed() {
        let bed = write_bed("chr1\t100\t200\nchr1\tfive\t600\n");
        assert!(matches!(GenomeRegions::from_bed(bed.path()), Err(Error::MalformedInput { row: 1, .. })));

        let bed = write_bed("chr1\t100\t100\n");
        assert!(matches!(GenomeRegions::from_bed(bed.path()), Err(Error::MalformedInput { row: 0, .. })));
    }
}
