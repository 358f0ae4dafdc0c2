extern crate pretty_env_logger;

#[macro_use]
extern crate log;

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use anyhow::Context;

mod aggregate;
mod error;
mod haplotags;
mod modification_table;
mod output;
mod parameters;
mod stages;
mod utility;

use crate::aggregate::analyze_allelic_methylation;
use crate::parameters::*;
use crate::stages::run_pipeline;

fn analysis_args<'a>() -> [Arg<'a>; 3] {
    [ Arg::new("regions")
          .short('r')
          .long("regions")
          .takes_value(true)
          .help("only aggregate records overlapping these bed regions"),
      Arg::new("haplotype-tag")
          .long("haplotype-tag")
          .takes_value(true)
          .default_value("HP")
          .help("the alignment aux tag holding the haplotype of each read"),
      Arg::new("zero-coverage")
          .long("zero-coverage")
          .takes_value(true)
          .possible_values(["nan", "skip", "error"])
          .default_value("nan")
          .help("what to report for a region/haplotype with zero total coverage") ]
}

fn analysis_config(matches: &ArgMatches) -> anyhow::Result<AnalysisConfig> {
    let mut config = AnalysisConfig::defaults();
    if let Some(tag) = matches.value_of("haplotype-tag") {
        config.haplotype_tag = str_to_tag(tag)?;
    }
    if let Some(policy) = matches.value_of("zero-coverage") {
        config.zero_coverage = str_to_zero_coverage_policy(policy)?;
    }
    config.regions = matches.value_of("regions").map(PathBuf::from);
    Ok(config)
}

fn main() {
    let matches = Command::new("hapmeth")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Allele-specific methylation from per-read modification calls and haplotagged reads")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("debug")
            .long("debug")
            .global(true)
            .help("verbose logging"))
        .subcommand(Command::new("aggregate")
                .about("compute per-haplotype methylation rates for each region of a modification table")
                .arg(Arg::new("modifications")
                    .short('m')
                    .long("modifications")
                    .takes_value(true)
                    .required(true)
                    .help("per-read modification call table (11 column tsv, no header)"))
                .arg(Arg::new("bam")
                    .short('b')
                    .long("bam")
                    .takes_value(true)
                    .required(true)
                    .help("indexed bam with haplotype tagged reads"))
                .arg(Arg::new("output")
                    .short('o')
                    .long("output")
                    .takes_value(true)
                    .required(true)
                    .help("output csv file"))
                .args(analysis_args()))
        .subcommand(Command::new("pipeline")
                .about("run basecalling, modification extraction, variant calling, phasing and aggregation")
                .arg(Arg::new("pod5-dir")
                    .long("pod5-dir")
                    .takes_value(true)
                    .required_unless_present("skip-basecalling")
                    .help("directory containing pod5 files"))
                .arg(Arg::new("reference")
                    .short('g')
                    .long("reference")
                    .takes_value(true)
                    .required(true)
                    .help("the reference genome"))
                .arg(Arg::new("output-dir")
                    .short('o')
                    .long("output-dir")
                    .takes_value(true)
                    .default_value("results")
                    .help("output directory"))
                .arg(Arg::new("skip-basecalling")
                    .long("skip-basecalling")
                    .requires("bam-file")
                    .help("start from an existing bam instead of pod5 files"))
                .arg(Arg::new("bam-file")
                    .long("bam-file")
                    .takes_value(true)
                    .help("pre-existing bam file, used with --skip-basecalling"))
                .arg(Arg::new("model")
                    .long("model")
                    .takes_value(true)
                    .help("basecalling model"))
                .arg(Arg::new("threads")
                    .short('t')
                    .long("threads")
                    .takes_value(true)
                    .default_value("8")
                    .help("threads for the external tools"))
                .arg(Arg::new("device")
                    .long("device")
                    .takes_value(true)
                    .default_value("cuda:all")
                    .help("basecalling device"))
                .args(analysis_args()))
        .get_matches();

    let level = if matches.is_present("debug") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .init();

    let result = match matches.subcommand() {
        Some(("aggregate", m)) => aggregate_main(m),
        Some(("pipeline", m)) => pipeline_main(m),
        _ => unreachable!("subcommand is required")
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn aggregate_main(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = analysis_config(matches)?;
    let modifications = PathBuf::from(matches.value_of("modifications").context("--modifications is required")?);
    let bam = PathBuf::from(matches.value_of("bam").context("--bam is required")?);
    let output = PathBuf::from(matches.value_of("output").context("--output is required")?);

    info!("params: {:#?}", config);
    info!("zero coverage policy: {}", zero_coverage_policy_to_str(config.zero_coverage));
    let (results, summary) = analyze_allelic_methylation(&modifications, &bam, &output, &config)
        .with_context(|| format!("allelic methylation failed for {}", modifications.display()))?;
    info!("finished: {} rows from {} regions", results.len(), summary.num_regions);
    Ok(())
}

fn pipeline_main(matches: &ArgMatches) -> anyhow::Result<()> {
    let reference = PathBuf::from(matches.value_of("reference").context("--reference is required")?);
    let mut params = PipelineParameters::defaults(reference);
    params.analysis = analysis_config(matches)?;

    if let Some(dir) = matches.value_of("output-dir") {
        params.output_dir = PathBuf::from(dir);
    }
    if matches.is_present("skip-basecalling") {
        params.bam_file = matches.value_of("bam-file").map(PathBuf::from);
    } else {
        params.pod5_dir = matches.value_of("pod5-dir").map(PathBuf::from);
    }
    if let Some(model) = matches.value_of("model") {
        params.model = model.to_owned();
    }
    if let Some(device) = matches.value_of("device") {
        params.device = device.to_owned();
    }
    if let Some(threads) = matches.value_of("threads") {
        params.threads = threads.parse().with_context(|| format!("--threads is not a number: {}", threads))?;
    }

    info!("params: {:#?}", params);
    let results = run_pipeline(&params)?;
    info!("finished: {} allelic methylation rows", results.len());
    Ok(())
}
