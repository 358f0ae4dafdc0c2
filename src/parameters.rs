//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::path::PathBuf;
use crate::error::Error;

// What to do with a (region, haplotype) group whose summed coverage is zero
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ZeroCoveragePolicy {
    Nan,
    Skip,
    Error
}

pub fn zero_coverage_policy_to_str(policy: ZeroCoveragePolicy) -> &'static str {
    match policy {
        ZeroCoveragePolicy::Nan => "nan",
        ZeroCoveragePolicy::Skip => "skip",
        ZeroCoveragePolicy::Error => "error",
    }
}

pub fn str_to_zero_coverage_policy(s: &str) -> Result<ZeroCoveragePolicy, Error> {
    match s {
        "nan" => Ok(ZeroCoveragePolicy::Nan),
        "skip" => Ok(ZeroCoveragePolicy::Skip),
        "error" => Ok(ZeroCoveragePolicy::Error),
        _ => Err(Error::Parameter(format!("unknown zero coverage policy: {}", s)))
    }
}

pub fn str_to_tag(s: &str) -> Result<[u8; 2], Error> {
    let bytes = s.as_bytes();
    if bytes.len() != 2 || !bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::Parameter(format!("aux tag must be two alphanumeric characters: {}", s)));
    }
    return Ok([bytes[0], bytes[1]]);
}

// Settings for the in-process aggregation, built once per run
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub haplotype_tag: [u8; 2],
    pub zero_coverage: ZeroCoveragePolicy,
    pub regions: Option<PathBuf>
}

impl AnalysisConfig {
    pub fn defaults() -> AnalysisConfig {
        AnalysisConfig {
            haplotype_tag: *b"HP",
            zero_coverage: ZeroCoveragePolicy::Nan,
            regions: None
        }
    }

    pub fn tag_str(&self) -> String {
        return String::from_utf8_lossy(&self.haplotype_tag).into_owned();
    }
}

// Settings for the external stages of the full pipeline
#[derive(Clone, Debug)]
pub struct PipelineParameters {
    pub output_dir: PathBuf,
    pub reference: PathBuf,
    pub pod5_dir: Option<PathBuf>,
    pub bam_file: Option<PathBuf>,
    pub model: String,
    pub modified_bases: String,
    pub device: String,
    pub threads: usize,
    pub analysis: AnalysisConfig
}

impl PipelineParameters {
    pub fn defaults(reference: PathBuf) -> PipelineParameters {
        PipelineParameters {
            output_dir: PathBuf::from("results"),
            reference: reference,
            pod5_dir: None,
            bam_file: None,
            model: "dna_r10.4.1_e8.2_400bps_sup@v4.3.0".to_owned(),
            modified_bases: "5mCG_5hmCG".to_owned(),
            device: "cuda:all".to_owned(),
            threads: 8,
            analysis: AnalysisConfig::defaults()
        }
    }

    // Either basecall from pod5 or start from an existing bam, never neither
    pub fn validate(&self) -> Result<(), Error> {
        if self.pod5_dir.is_none() && self.bam_file.is_none() {
            return Err(Error::Parameter("--bam-file required when --skip-basecalling is set".to_owned()));
        }
        if self.threads == 0 {
            return Err(Error::Parameter("--threads must be at least 1".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_coverage_policy_strings() {
        for p in [ZeroCoveragePolicy::Nan, ZeroCoveragePolicy::Skip, ZeroCoveragePolicy::Error] {
            assert_eq!(str_to_zero_coverage_policy(zero_coverage_policy_to_str(p)).unwrap(), p);
        }
        assert!(matches!(str_to_zero_coverage_policy("zero"), Err(Error::Parameter(_))));
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!(str_to_tag("HP").unwrap(), *b"HP");
        assert_eq!(str_to_tag("h1").unwrap(), *b"h1");
        assert!(str_to_tag("HPX").is_err());
        assert!(str_to_tag("H").is_err());
        assert!(str_to_tag("H:").is_err());
    }

    #[test]
    fn test_pipeline_requires_an_input() {
        let mut params = PipelineParameters::defaults(PathBuf::from("ref.fa"));
        assert!(params.validate().is_err());

        params.bam_file = Some(PathBuf::from("reads.bam"));
        assert!(params.validate().is_ok());

        params.threads = 0;
        assert!(params.validate().is_err());
    }
}
