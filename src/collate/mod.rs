//! Collation of MOI reports of many VCF files into one CSV report.

use std::path::PathBuf;

use crate::common::io::std::{open_output, FinishWrite};

pub mod assemble;
pub mod batch;
pub mod error;
pub mod keyer;
pub mod record;
pub mod reporter;
pub mod sample;
pub mod schema;

use self::assemble::{banner, ReportAssembler};
use self::batch::{
    BatchRunner, BatchSettings, BatchSettingsBuilder, CancelToken, FailurePolicy,
};
use self::error::CollateError;
use self::record::LinePolicy;
use self::reporter::{
    CnvThreshold, LocationLookup, MoiReporter, ReportGenerator, ReporterParamsBuilder,
    VcfExtractor, DEFAULT_COPY_NUMBER, DEFAULT_EXTRACTOR_PROGRAM, DEFAULT_FUSION_READS,
    DEFAULT_REPORTER_PROGRAM,
};
use self::schema::ColumnSchema;

/// Default number of worker threads: all cores but one.
fn default_num_procs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
}

/// Command line arguments for collating MOI reports.
#[derive(clap::Args, Debug)]
#[group(id = "CollateArgs")]
pub struct Args {
    /// List of VCF files to process.
    #[arg(required = true, value_name = "VCF")]
    pub vcf_files: Vec<PathBuf>,

    /// Copy number threshold for CNV reporting; disabled when `--cu` and `--cl` are given.
    #[arg(long, value_name = "INT", default_value_t = DEFAULT_COPY_NUMBER)]
    pub cn: u32,
    /// Copy number threshold (5% CI lower bound) for reporting amplifications.
    #[arg(long, value_name = "INT")]
    pub cu: Option<u32>,
    /// Copy number threshold (95% CI upper bound) for reporting copy loss.
    #[arg(long, value_name = "INT")]
    pub cl: Option<u32>,
    /// Threshold for number of fusion reads to report.
    #[arg(long, value_name = "INT", default_value_t = DEFAULT_FUSION_READS)]
    pub reads: u32,

    /// Data comes from Pediatric MATCH rather than Adult MATCH.
    #[arg(short, long)]
    pub pedmatch: bool,
    /// Data comes from blood specimens, and therefore we only have DNA data.
    #[arg(short, long)]
    pub blood: bool,

    /// Number of worker threads; defaults to the number of cores minus one.
    #[arg(short, long, value_name = "INT")]
    pub num_procs: Option<usize>,
    /// Output to file rather than STDOUT; gzip compressed if the name ends in `.gz`.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Fail a sample on truncated report lines instead of skipping them.
    #[arg(long)]
    pub strict: bool,
    /// What to do if the MOI reporter fails on a sample.
    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    pub on_failure: FailurePolicy,
    /// Add a `Location` column looked up with the VCF extractor for SNVs.
    #[arg(long)]
    pub location_lookup: bool,
    /// Do not write the banner with the run parameters.
    #[arg(long)]
    pub no_banner: bool,

    /// The MOI reporter program.
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_REPORTER_PROGRAM)]
    pub reporter_cmd: String,
    /// The VCF extractor program used for `--location-lookup`.
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_EXTRACTOR_PROGRAM)]
    pub extractor_cmd: String,
}

impl Args {
    /// Validate the arguments and derive the batch settings.
    ///
    /// Fails with `CollateError::ConfigConflict` on inconsistent thresholds.
    pub fn settings(&self, common: &crate::common::Args) -> Result<BatchSettings, anyhow::Error> {
        let params = ReporterParamsBuilder::default()
            .cnv(CnvThreshold::from_options(self.cn, self.cu, self.cl)?)
            .reads(self.reads)
            .blood(self.blood)
            .pedmatch(self.pedmatch)
            .build()?;

        Ok(BatchSettingsBuilder::default()
            .params(params)
            .schema(ColumnSchema::new(self.location_lookup))
            .line_policy(if self.strict {
                LinePolicy::Strict
            } else {
                LinePolicy::Tolerant
            })
            .failure_policy(self.on_failure)
            .num_procs(self.num_procs.unwrap_or_else(default_num_procs))
            .quiet(common.quiet())
            .build()?)
    }
}

/// Run the batch and write the report.
///
/// `open_out` is only called once all samples have been processed, so that a failed or
/// interrupted batch does not leave a partial report behind.  The output is finished
/// explicitly, so errors on completing it are not lost.  Samples that failed under
/// `FailurePolicy::Skip` are reported as `CollateError::FailedSamples` after the report for
/// the remaining samples has been written.
#[allow(clippy::too_many_arguments)]
pub fn collate<W, F>(
    settings: &BatchSettings,
    generator: &dyn ReportGenerator,
    location: Option<&dyn LocationLookup>,
    vcfs: &[PathBuf],
    cancel: CancelToken,
    banner: Option<String>,
    open_out: F,
) -> Result<(), anyhow::Error>
where
    W: FinishWrite,
    F: FnOnce() -> Result<W, anyhow::Error>,
{
    let outcome = BatchRunner::new(settings, generator, location, cancel).run(vcfs)?;

    let mut assembler = ReportAssembler::new(&settings.schema);
    if let Some(banner) = banner {
        assembler = assembler.with_banner(banner);
    }
    let mut out = open_out()?;
    assembler.write(&outcome.result, &mut out)?;
    out.finish_write()?;

    if !outcome.failed.is_empty() {
        return Err(CollateError::FailedSamples(outcome.failed).into());
    }
    Ok(())
}

/// Main entry point for collating MOI reports.
pub fn run(common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &common);
    tracing::info!("args = {:?}", &args);

    let settings = args.settings(common)?;

    let cancel = CancelToken::default();
    batch::cancel_on_interrupt(cancel.clone())?;

    let generator = MoiReporter::new(&args.reporter_cmd);
    let extractor = VcfExtractor::new(&args.extractor_cmd);
    let location: Option<&dyn LocationLookup> = if args.location_lookup {
        Some(&extractor)
    } else {
        None
    };
    let run_banner = (!args.no_banner).then(|| banner(&settings.params));

    collate(
        &settings,
        &generator,
        location,
        &args.vcf_files,
        cancel,
        run_banner,
        || open_output(args.output.as_deref()),
    )
}
