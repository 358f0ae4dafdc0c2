//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::path::PathBuf;

/// Errors that can abort an allelic methylation run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // row counts data rows from 0, blank lines excluded
    #[error("malformed input at row {row}: {reason}")]
    MalformedInput {
        row: usize,
        reason: String,
    },

    #[error("resource unavailable: {reason} ({path})")]
    ResourceUnavailable {
        path: PathBuf,
        reason: String,
    },

    #[error("undefined methylation rate for {chrom}:{start}-{end} haplotype {haplotype}: zero total coverage")]
    UndefinedRate {
        chrom: String,
        start: u64,
        end: u64,
        haplotype: u8,
    },

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("stage {stage} failed: {reason}")]
    Stage {
        stage: String,
        reason: String,
    },

    #[error("invalid parameter: {0}")]
    Parameter(String),
}

impl Error {
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    pub fn malformed(row: usize, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            row,
            reason: reason.into(),
        }
    }

    pub fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
