//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::fs;
use std::io;
use std::path::Path;
use crate::aggregate::AllelicMethylationResult;
use crate::error::Error;

pub const ALLELIC_METHYLATION_HEADER: [&str; 6] = ["chrom", "start", "end", "haplotype", "methylation_rate", "n_reads"];

// Rates are written at full precision, shortest round-trip form
pub fn write_results<W: io::Write>(out: W, results: &[AllelicMethylationResult]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&ALLELIC_METHYLATION_HEADER)?;
    for r in results {
        writer.write_record(&[r.chrom.clone(),
                              r.start.to_string(),
                              r.end.to_string(),
                              r.haplotype.to_string(),
                              r.methylation_rate.to_string(),
                              r.n_reads.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

// Permissions the finished table should carry: those of the file being
// replaced, otherwise the usual mode for a newly created data file.
fn output_permissions(filename: &Path) -> io::Result<Option<fs::Permissions>> {
    match fs::metadata(filename) {
        Ok(meta) => return Ok(Some(meta.permissions())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => (),
        Err(e) => return Err(e)
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        return Ok(Some(fs::Permissions::from_mode(0o644)));
    }

    #[cfg(not(unix))]
    return Ok(None);
}

/// Write the result table to `filename`, replacing any existing file.
/// Rows go to a temporary file in the same directory which is renamed into
/// place, so a failed write leaves no partial table behind. The table keeps
/// the permissions of the file it replaces.
pub fn write_allelic_methylation(filename: &Path, results: &[AllelicMethylationResult]) -> Result<(), Error> {
    let dir = match filename.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new(".")
    };

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(e, filename))?;
    write_results(tmp.as_file(), results).map_err(|e| Error::io(io::Error::from(e), filename))?;
    if let Some(permissions) = output_permissions(filename).map_err(|e| Error::io(e, filename))? {
        tmp.as_file().set_permissions(permissions).map_err(|e| Error::io(e, filename))?;
    }
    tmp.persist(filename).map_err(|e| Error::io(e.error, filename))?;
    Ok(())
}
