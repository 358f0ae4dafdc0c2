//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use rust_htslib::{bam, bam::Read, bam::record::Aux};
use std::collections::HashMap;
use std::path::Path;
use itertools::Itertools;
use crate::error::Error;
use crate::parameters::AnalysisConfig;

// Read name -> raw haplotype tag value, filled by one pass over a bam.
// Reads without the tag are never stored. Read-only once built.
#[derive(Default, Debug)]
pub struct HaplotypeAssignment
{
    cache: HashMap<String, i32>
}

impl HaplotypeAssignment
{
    pub fn new() -> HaplotypeAssignment {
        HaplotypeAssignment::default()
    }

    fn key(record: &bam::Record) -> String {
        return String::from_utf8_lossy(record.qname()).into_owned();
    }

    // Later alignments of the same read (secondary, supplementary) overwrite earlier ones
    pub(crate) fn insert(&mut self, read_id: String, haplotype: i32) {
        self.cache.insert(read_id, haplotype);
    }

    fn update(&mut self, record: &bam::Record, tag: &[u8; 2]) -> Option<i32> {
        if let Some(hi) = get_haplotag_from_record(record, tag) {
            self.insert(HaplotypeAssignment::key(record), hi);
            return Some(hi);
        } else {
            return None;
        }
    }

    pub fn get(&self, read_id: &str) -> Option<i32> {
        return self.cache.get(read_id).copied();
    }

    pub fn len(&self) -> usize {
        return self.cache.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.cache.is_empty();
    }

    /// Scan every record of an indexed bam once, keeping only the tag values.
    pub fn from_bam(filename: &Path, config: &AnalysisConfig) -> Result<HaplotypeAssignment, Error> {
        if !filename.exists() {
            return Err(Error::unavailable(filename, "alignment file does not exist"));
        }

        let mut bam = bam::IndexedReader::from_path(filename)
            .map_err(|e| Error::unavailable(filename, format!("could not open indexed alignment file: {}", e)))?;
        bam.fetch(bam::FetchDefinition::All)
            .map_err(|e| Error::unavailable(filename, format!("could not iterate alignment file: {}", e)))?;

        let mut assignment = HaplotypeAssignment::new();
        let mut record = bam::Record::new();
        let mut num_records: usize = 0;
        let mut num_tagged: usize = 0;

        while let Some(r) = bam.read(&mut record) {
            r.map_err(|e| Error::unavailable(filename, format!("could not read alignment record {}: {}", num_records, e)))?;
            num_records += 1;
            if assignment.update(&record, &config.haplotype_tag).is_some() {
                num_tagged += 1;
            }
        }

        info!("scanned {} alignments in {}, {} carried a {} tag ({} distinct reads)",
              num_records, filename.display(), num_tagged, config.tag_str(), assignment.len());
        for (value, count) in assignment.cache.values().counts().into_iter().sorted() {
            debug!("{}:{} assigned to {} reads", config.tag_str(), value, count);
        }
        return Ok(assignment);
    }
}

// whatshap encodes the tag as U8, other taggers use wider types
pub fn get_haplotag_from_record(record: &bam::Record, tag: &[u8; 2]) -> Option<i32> {
    match record.aux(tag) {
        Ok(Aux::U8(v)) => Some(v as i32),
        Ok(Aux::I8(v)) => Some(v as i32),
        Ok(Aux::U16(v)) => Some(v as i32),
        Ok(Aux::I16(v)) => Some(v as i32),
        Ok(Aux::I32(v)) => Some(v),
        Ok(Aux::U32(v)) => i32::try_from(v).ok(),
        Ok(_) => {
            debug!("ignoring non-integer {} tag on {}", String::from_utf8_lossy(tag), String::from_utf8_lossy(record.qname()));
            None
        }
        Err(_e) => None
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use rust_htslib::bam::record::{Cigar, CigarString};
    use std::path::PathBuf;

    pub enum TestTag {
        I32(i32),
        U8(u8),
        Str(&'static str)
    }

    // (read name, start position, tag value)
    pub fn write_test_bam(dir: &Path, name: &str, reads: &[(&str, i64, Option<TestTag>)], index: bool) -> PathBuf {
        let path = dir.join(name);

        let mut header = bam::Header::new();
        let mut sq = bam::header::HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", &"chr1");
        sq.push_tag(b"LN", &100000);
        header.push_record(&sq);

        {
            let mut writer = bam::Writer::from_path(&path, &header, bam::Format::Bam).unwrap();
            let cigar = CigarString(vec![Cigar::Match(4)]);
            for (qname, pos, tag) in reads {
                let mut record = bam::Record::new();
                record.set(qname.as_bytes(), Some(&cigar), b"ACGT", &[30, 30, 30, 30]);
                record.set_tid(0);
                record.set_pos(*pos);
                record.set_mapq(60);
                match tag {
                    Some(TestTag::I32(v)) => record.push_aux(b"HP", Aux::I32(*v)).unwrap(),
                    Some(TestTag::U8(v)) => record.push_aux(b"HP", Aux::U8(*v)).unwrap(),
                    Some(TestTag::Str(v)) => record.push_aux(b"HP", Aux::String(*v)).unwrap(),
                    None => ()
                }
                writer.write(&record).unwrap();
            }
        }

        if index {
            bam::index::build(&path, None, bam::index::Type::Bai, 1).unwrap();
        }
        path
    }

    #[test]
    fn test_tags_and_untagged_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_bam(dir.path(), "tagged.bam", &[
            ("r1", 100, Some(TestTag::I32(1))),
            ("r2", 150, Some(TestTag::U8(2))),
            ("r3", 200, None),
        ], true);

        let assignment = HaplotypeAssignment::from_bam(&path, &AnalysisConfig::defaults()).unwrap();
        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment.get("r1"), Some(1));
        assert_eq!(assignment.get("r2"), Some(2));
        assert_eq!(assignment.get("r3"), None);
    }

    #[test]
    fn test_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_bam(dir.path(), "dup.bam", &[
            ("r1", 100, Some(TestTag::I32(1))),
            ("r2", 120, Some(TestTag::I32(1))),
            ("r1", 500, Some(TestTag::I32(2))),
        ], true);

        let assignment = HaplotypeAssignment::from_bam(&path, &AnalysisConfig::defaults()).unwrap();
        assert_eq!(assignment.get("r1"), Some(2));
        assert_eq!(assignment.get("r2"), Some(1));
    }

    #[test]
    fn test_default_is_empty() {
        let mut assignment = HaplotypeAssignment::default();
        assert!(assignment.is_empty());
        assert_eq!(assignment.get("r1"), None);

        assignment.insert("r1".to_owned(), 1);
        assignment.insert("r1".to_owned(), 2);
        assert_eq!(assignment.len(), 1);
        assert_eq!(assignment.get("r1"), Some(2));
    }

    #[test]
    fn test_custom_tag_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_bam(dir.path(), "tagged.bam", &[
            ("r1", 100, Some(TestTag::I32(1))),
        ], true);

        let mut config = AnalysisConfig::defaults();
        config.haplotype_tag = *b"XH";
        let assignment = HaplotypeAssignment::from_bam(&path, &config).unwrap();
        assert!(assignment.is_empty());
    }

    #[test]
    fn test_non_integer_tag_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_bam(dir.path(), "string_tag.bam", &[
            ("r1", 100, Some(TestTag::Str("1"))),
        ], true);

        let assignment = HaplotypeAssignment::from_bam(&path, &AnalysisConfig::defaults()).unwrap();
        assert_eq!(assignment.get("r1"), None);
    }

    #[test]
    fn test_missing_or_unindexed_bam() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig::defaults();

        let missing = dir.path().join("missing.bam");
        assert!(matches!(HaplotypeAssignment::from_bam(&missing, &config),
                         Err(Error::ResourceUnavailable { .. })));

        let unindexed = write_test_bam(dir.path(), "unindexed.bam", &[
            ("r1", 100, Some(TestTag::I32(1))),
        ], false);
        assert!(matches!(HaplotypeAssignment::from_bam(&unindexed, &config),
                         Err(Error::ResourceUnavailable { .. })));
    }
}
