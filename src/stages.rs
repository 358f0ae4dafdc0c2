//---------------------------------------------------------
// Copyright 2024 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use rust_htslib::bam;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use crate::aggregate::{analyze_allelic_methylation, AllelicMethylationResult};
use crate::error::Error;
use crate::parameters::{AnalysisConfig, PipelineParameters};

const REPORT_TITLE: &str = "Allelic Methylation Analysis Report";
const REPORT_INTRO: &str = "Analysis of allele-specific methylation patterns in cancer samples";

// One step of the pipeline. The stage owns the paths it reads and writes;
// nothing downstream cares how its inputs were produced.
pub trait PipelineStage {
    fn name(&self) -> &str;
    fn outputs(&self) -> Vec<PathBuf>;
    fn run(&mut self) -> Result<(), Error>;
}

// A single external program invocation, optionally with stdout sent to a file
#[derive(Clone, Debug)]
pub struct ExternalCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub stdout: Option<PathBuf>
}

impl ExternalCommand {
    pub fn new(program: &str) -> ExternalCommand {
        ExternalCommand { program: OsString::from(program), args: Vec::new(), stdout: None }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> ExternalCommand {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn stdout_to(mut self, path: &Path) -> ExternalCommand {
        self.stdout = Some(path.to_path_buf());
        self
    }

    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    pub fn run(&self, stage: &str) -> Result<(), Error> {
        let stage_error = |reason: String| Error::Stage { stage: stage.to_owned(), reason: reason };

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(path) = &self.stdout {
            let file = File::create(path).map_err(|e| Error::io(e, path))?;
            cmd.stdout(Stdio::from(file));
        }

        debug!("running {}", self.command_line().join(" "));
        let status = cmd.status()
            .map_err(|e| stage_error(format!("could not launch {}: {}", self.program.to_string_lossy(), e)))?;
        if !status.success() {
            return Err(stage_error(format!("{} exited with {}", self.program.to_string_lossy(), status)));
        }
        Ok(())
    }
}

pub fn index_bam(path: &Path, threads: usize, stage: &str) -> Result<(), Error> {
    bam::index::build(path, None, bam::index::Type::Bai, threads as u32)
        .map_err(|e| Error::Stage { stage: stage.to_owned(), reason: format!("could not index {}: {}", path.display(), e) })
}

// Stages that shell out to a tool, then optionally index a bam they produced
pub struct ExternalStage {
    pub name: &'static str,
    pub commands: Vec<ExternalCommand>,
    pub index: Option<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub threads: usize
}

impl ExternalStage {
    pub fn basecall(params: &PipelineParameters, pod5_dir: &Path) -> ExternalStage {
        let output_bam = params.output_dir.join("basecalls.bam");
        let cmd = ExternalCommand::new("dorado")
            .arg("basecaller")
            .arg(&params.model)
            .arg(pod5_dir)
            .arg("--modified-bases").arg(&params.modified_bases)
            .arg("--emit-moves")
            .arg("--device").arg(&params.device)
            .stdout_to(&output_bam);
        ExternalStage { name: "basecall", commands: vec![cmd], index: None, outputs: vec![output_bam], threads: params.threads }
    }

    pub fn sort_index(params: &PipelineParameters, input_bam: &Path) -> ExternalStage {
        let sorted_bam = params.output_dir.join("basecalls.sorted.bam");
        let cmd = ExternalCommand::new("samtools")
            .arg("sort")
            .arg("-@").arg(params.threads.to_string())
            .arg("-o").arg(&sorted_bam)
            .arg(input_bam);
        ExternalStage { name: "sort", commands: vec![cmd], index: Some(sorted_bam.clone()), outputs: vec![sorted_bam], threads: params.threads }
    }

    pub fn extract_modifications(params: &PipelineParameters, bam: &Path) -> ExternalStage {
        let methyl_bed = params.output_dir.join("methylation.bed");
        let cmd = ExternalCommand::new("modkit")
            .arg("extract")
            .arg(bam)
            .arg(&methyl_bed)
            .arg("--ref").arg(&params.reference)
            .arg("--threads").arg(params.threads.to_string())
            .arg("--log-level").arg("info");
        ExternalStage { name: "extract-modifications", commands: vec![cmd], index: None, outputs: vec![methyl_bed], threads: params.threads }
    }

    pub fn call_variants(params: &PipelineParameters, bam: &Path) -> ExternalStage {
        let vcf = params.output_dir.join("variants.vcf");
        let cmd = ExternalCommand::new("sniffles")
            .arg("-i").arg(bam)
            .arg("-v").arg(&vcf)
            .arg("--reference").arg(&params.reference)
            .arg("--threads").arg(params.threads.to_string());
        ExternalStage { name: "call-variants", commands: vec![cmd], index: None, outputs: vec![vcf], threads: params.threads }
    }

    pub fn phase_variants(params: &PipelineParameters, vcf: &Path, bam: &Path) -> ExternalStage {
        let phased_vcf = params.output_dir.join("phased.vcf");
        let cmd = ExternalCommand::new("whatshap")
            .arg("phase")
            .arg("-o").arg(&phased_vcf)
            .arg("--reference").arg(&params.reference)
            .arg(vcf)
            .arg(bam);
        ExternalStage { name: "phase", commands: vec![cmd], index: None, outputs: vec![phased_vcf], threads: params.threads }
    }

    pub fn haplotag(params: &PipelineParameters, phased_vcf: &Path, bam: &Path) -> ExternalStage {
        let phased_bam = params.output_dir.join("phased.bam");
        let cmd = ExternalCommand::new("whatshap")
            .arg("haplotag")
            .arg("-o").arg(&phased_bam)
            .arg("--reference").arg(&params.reference)
            .arg(phased_vcf)
            .arg(bam);
        ExternalStage { name: "haplotag", commands: vec![cmd], index: Some(phased_bam.clone()), outputs: vec![phased_bam], threads: params.threads }
    }

    pub fn report(params: &PipelineParameters) -> ExternalStage {
        let cmd = ExternalCommand::new("multiqc")
            .arg(&params.output_dir)
            .arg("-o").arg(&params.output_dir)
            .arg("--title").arg(REPORT_TITLE)
            .arg("--comment").arg(REPORT_INTRO)
            .arg("--force");
        let report = params.output_dir.join("multiqc_report.html");
        ExternalStage { name: "report", commands: vec![cmd], index: None, outputs: vec![report], threads: params.threads }
    }
}

impl PipelineStage for ExternalStage {
    fn name(&self) -> &str {
        self.name
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.clone()
    }

    fn run(&mut self) -> Result<(), Error> {
        for cmd in &self.commands {
            cmd.run(self.name)?;
        }
        if let Some(path) = &self.index {
            index_bam(path, self.threads, self.name)?;
        }
        Ok(())
    }
}

// The in-process stage: join modification calls with haplotags
pub struct AllelicMethylationStage {
    pub modifications: PathBuf,
    pub bam: PathBuf,
    pub output: PathBuf,
    pub config: AnalysisConfig,
    pub results: Vec<AllelicMethylationResult>
}

impl AllelicMethylationStage {
    pub fn new(params: &PipelineParameters, modifications: &Path, bam: &Path) -> AllelicMethylationStage {
        AllelicMethylationStage {
            modifications: modifications.to_path_buf(),
            bam: bam.to_path_buf(),
            output: params.output_dir.join("allelic_methylation.csv"),
            config: params.analysis.clone(),
            results: Vec::new()
        }
    }
}

impl PipelineStage for AllelicMethylationStage {
    fn name(&self) -> &str {
        "allelic-methylation"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.output.clone()]
    }

    fn run(&mut self) -> Result<(), Error> {
        let (results, _summary) = analyze_allelic_methylation(&self.modifications, &self.bam, &self.output, &self.config)?;
        self.results = results;
        Ok(())
    }
}

fn run_stage<S: PipelineStage>(stage: &mut S) -> Result<Vec<PathBuf>, Error> {
    info!("running stage {}", stage.name());
    stage.run()?;
    let outputs = stage.outputs();
    for o in &outputs {
        debug!("stage {} produced {}", stage.name(), o.display());
    }
    Ok(outputs)
}

fn first_output(stage: &str, outputs: Vec<PathBuf>) -> Result<PathBuf, Error> {
    outputs.into_iter().next()
        .ok_or_else(|| Error::Stage { stage: stage.to_owned(), reason: "stage produced no output".to_owned() })
}

/// Basecall (unless a bam is supplied), extract modifications, call and phase
/// variants, haplotag reads, aggregate allelic methylation and render the report.
pub fn run_pipeline(params: &PipelineParameters) -> Result<Vec<AllelicMethylationResult>, Error> {
    params.validate()?;
    std::fs::create_dir_all(&params.output_dir).map_err(|e| Error::io(e, &params.output_dir))?;

    let bam = match (&params.bam_file, &params.pod5_dir) {
        (Some(bam), _) => bam.clone(),
        (None, Some(pod5_dir)) => {
            let raw = first_output("basecall", run_stage(&mut ExternalStage::basecall(params, pod5_dir))?)?;
            first_output("sort", run_stage(&mut ExternalStage::sort_index(params, &raw))?)?
        }
        (None, None) => return Err(Error::Parameter("no input reads".to_owned()))
    };

    let methyl_bed = first_output("extract-modifications", run_stage(&mut ExternalStage::extract_modifications(params, &bam))?)?;
    let vcf = first_output("call-variants", run_stage(&mut ExternalStage::call_variants(params, &bam))?)?;
    let phased_vcf = first_output("phase", run_stage(&mut ExternalStage::phase_variants(params, &vcf, &bam))?)?;
    let phased_bam = first_output("haplotag", run_stage(&mut ExternalStage::haplotag(params, &phased_vcf, &bam))?)?;

    let mut allelic = AllelicMethylationStage::new(params, &methyl_bed, &phased_bam);
    run_stage(&mut allelic)?;

    run_stage(&mut ExternalStage::report(params))?;
    info!("analysis complete, results saved to {}", params.output_dir.display());
    Ok(allelic.results)
}
