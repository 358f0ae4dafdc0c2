//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use indexmap::IndexMap;
use std::path::Path;
use crate::error::Error;
use crate::haplotags::HaplotypeAssignment;
use crate::modification_table::{ModificationRecord, read_modification_table};
use crate::output::write_allelic_methylation;
use crate::parameters::{AnalysisConfig, ZeroCoveragePolicy};
use crate::utility::GenomeRegions;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Haplotype {
    One,
    Two,
    Unassigned
}

// Only these are ever reported, in this order
pub const REPORTED_HAPLOTYPES: [Haplotype; 2] = [Haplotype::One, Haplotype::Two];

impl Haplotype {
    // Absent reads and tag values outside {1, 2} are unassigned
    pub fn from_tag(value: Option<i32>) -> Haplotype {
        match value {
            Some(1) => Haplotype::One,
            Some(2) => Haplotype::Two,
            _ => Haplotype::Unassigned
        }
    }

    pub fn number(&self) -> Option<u8> {
        match self {
            Haplotype::One => Some(1),
            Haplotype::Two => Some(2),
            Haplotype::Unassigned => None
        }
    }
}

/// Grouping key: records share a region only if all three bounds are equal.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Region {
    pub chrom: String,
    pub start: u64,
    pub end: u64
}

impl Region {
    pub fn of(record: &ModificationRecord) -> Region {
        Region { chrom: record.chrom.clone(), start: record.start, end: record.end }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct JoinedRecord<'a> {
    pub record: &'a ModificationRecord,
    pub haplotype: Haplotype
}

#[derive(Clone, PartialEq, Debug)]
pub struct AllelicMethylationResult {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub haplotype: u8,
    pub methylation_rate: f64,
    pub n_reads: usize
}

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct AggregationSummary {
    pub num_regions: usize,
    pub num_haplotype_one: usize,
    pub num_haplotype_two: usize,
    pub num_unassigned: usize,
    pub num_outside_regions: usize,
    pub num_zero_coverage: usize,
    pub num_results: usize
}

// Running sums for one (region, haplotype) group
#[derive(Clone, Copy, Default, Debug)]
struct HaplotypeTally {
    n_records: usize,
    modified: u128,
    coverage: u128
}

impl HaplotypeTally {
    fn add(& mut self, record: &ModificationRecord) {
        self.n_records += 1;
        self.modified += record.modified_count as u128;
        self.coverage += record.coverage as u128;
    }
}

pub fn join<'a>(records: &'a [ModificationRecord], assignment: &HaplotypeAssignment) -> Vec<JoinedRecord<'a>> {
    records.iter()
           .map(|r| JoinedRecord { record: r, haplotype: Haplotype::from_tag(assignment.get(&r.read_id)) })
           .collect()
}

/// Partition joined records by exact region, regions kept in order of first appearance.
pub fn group_by_region<'a>(joined: &[JoinedRecord<'a>]) -> IndexMap<Region, Vec<JoinedRecord<'a>>> {
    let mut groups: IndexMap<Region, Vec<JoinedRecord<'a>>> = IndexMap::new();
    for j in joined {
        groups.entry(Region::of(j.record)).or_insert_with(Vec::new).push(*j);
    }
    return groups;
}

fn tally_haplotype(group: &[JoinedRecord], haplotype: Haplotype) -> HaplotypeTally {
    let mut tally = HaplotypeTally::default();
    for j in group.iter().filter(|j| j.haplotype == haplotype) {
        tally.add(j.record);
    }
    return tally;
}

/// Compute per-(region, haplotype) methylation rates. Unassigned records never
/// produce a row; a haplotype with no records in a region produces nothing.
pub fn aggregate(records: &[ModificationRecord],
                 assignment: &HaplotypeAssignment,
                 config: &AnalysisConfig,
                 regions: Option<&GenomeRegions>) -> Result<(Vec<AllelicMethylationResult>, AggregationSummary), Error>
{
    let mut summary = AggregationSummary::default();

    let mut joined = join(records, assignment);
    if let Some(gr) = regions {
        let before = joined.len();
        joined.retain(|j| gr.overlaps(&j.record.chrom, j.record.start, j.record.end));
        summary.num_outside_regions = before - joined.len();
    }

    for j in joined.iter() {
        match j.haplotype {
            Haplotype::One => summary.num_haplotype_one += 1,
            Haplotype::Two => summary.num_haplotype_two += 1,
            Haplotype::Unassigned => summary.num_unassigned += 1
        }
    }

    let groups = group_by_region(&joined);
    summary.num_regions = groups.len();

    let mut results = Vec::new();
    for (region, group) in groups.iter() {
        for haplotype in REPORTED_HAPLOTYPES {
            let tally = tally_haplotype(group, haplotype);
            if tally.n_records == 0 {
                continue;
            }

            // haplotype is always One or Two here
            let hn = haplotype.number().unwrap_or_default();
            let methylation_rate = if tally.coverage > 0 {
                tally.modified as f64 / tally.coverage as f64
            } else {
                summary.num_zero_coverage += 1;
                debug!("zero coverage for {}:{}-{} haplotype {}", region.chrom, region.start, region.end, hn);
                match config.zero_coverage {
                    ZeroCoveragePolicy::Nan => f64::NAN,
                    ZeroCoveragePolicy::Skip => continue,
                    ZeroCoveragePolicy::Error => {
                        return Err(Error::UndefinedRate {
                            chrom: region.chrom.clone(),
                            start: region.start,
                            end: region.end,
                            haplotype: hn
                        });
                    }
                }
            };

            results.push(AllelicMethylationResult {
                chrom: region.chrom.clone(),
                start: region.start,
                end: region.end,
                haplotype: hn,
                methylation_rate: methylation_rate,
                n_reads: tally.n_records
            });
        }
    }
    summary.num_results = results.len();

    info!("aggregated {} regions: {} records on haplotype 1, {} on haplotype 2, {} unassigned",
          summary.num_regions, summary.num_haplotype_one, summary.num_haplotype_two, summary.num_unassigned);
    if summary.num_outside_regions > 0 {
        info!("{} records fell outside the requested regions", summary.num_outside_regions);
    }
    if summary.num_zero_coverage > 0 {
        warn!("{} region/haplotype groups had zero total coverage", summary.num_zero_coverage);
    }
    return Ok((results, summary));
}

/// Full in-process run: read both inputs, aggregate, write the table.
/// Nothing is written unless every earlier step succeeded.
pub fn analyze_allelic_methylation(modifications: &Path,
                                   bam: &Path,
                                   output: &Path,
                                   config: &AnalysisConfig) -> Result<(Vec<AllelicMethylationResult>, AggregationSummary), Error>
{
    let records = read_modification_table(modifications)?;
    let assignment = HaplotypeAssignment::from_bam(bam, config)?;
    let regions = match &config.regions {
        Some(bed) => Some(GenomeRegions::from_bed(bed)?),
        None => None
    };

    let (results, summary) = aggregate(&records, &assignment, config, regions.as_ref())?;
    write_allelic_methylation(output, &results)?;
    info!("wrote {} allelic methylation rows to {}", results.len(), output.display());
    return Ok((results, summary));
}
