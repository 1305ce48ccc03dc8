//! The external programs the collation relies on.
//!
//! The MOI reporter turns a VCF file into the comma-separated variant table that is collated,
//! the VCF extractor is used to look up the location annotation of SNVs.  Both are modelled
//! as traits so that the pipeline can be driven without the external tools.

use std::path::Path;
use std::process::{Command, ExitStatus};

use anyhow::Context;

use super::error::CollateError;

/// Default copy number threshold.
pub const DEFAULT_COPY_NUMBER: u32 = 7;

/// Default fusion read count threshold.
pub const DEFAULT_FUSION_READS: u32 = 1000;

/// Default name of the MOI reporter program.
pub const DEFAULT_REPORTER_PROGRAM: &str = "match_moi_report.pl";

/// Default name of the VCF extractor program.
pub const DEFAULT_EXTRACTOR_PROGRAM: &str = "vcfExtractor.pl";

/// Copy number threshold mode for reporting CNVs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CnvThreshold {
    /// Plain copy number threshold.
    CopyNumber(u32),
    /// Confidence interval bounds.
    ConfidenceInterval {
        /// 5% CI lower bound for reporting amplifications.
        cu: u32,
        /// 95% CI upper bound for reporting copy loss.
        cl: u32,
    },
}

impl Default for CnvThreshold {
    fn default() -> Self {
        CnvThreshold::CopyNumber(DEFAULT_COPY_NUMBER)
    }
}

impl CnvThreshold {
    /// Build from the command line options.
    ///
    /// Giving the CI bounds disables the copy number threshold; they must be given together.
    pub fn from_options(cn: u32, cu: Option<u32>, cl: Option<u32>) -> Result<Self, CollateError> {
        match (cu, cl) {
            (None, None) => Ok(CnvThreshold::CopyNumber(cn)),
            (Some(cu), Some(cl)) => Ok(CnvThreshold::ConfidenceInterval { cu, cl }),
            _ => Err(CollateError::ConfigConflict(String::from(
                "you must indicate both a 5% *and* 95% CI value when using the --cu and --cl option",
            ))),
        }
    }

    /// Reporter arguments for this threshold.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            CnvThreshold::CopyNumber(cn) => vec![String::from("--cn"), cn.to_string()],
            CnvThreshold::ConfidenceInterval { cu, cl } => vec![
                String::from("--cu"),
                cu.to_string(),
                String::from("--cl"),
                cl.to_string(),
            ],
        }
    }

    /// Short description for the report banner.
    pub fn describe(&self) -> String {
        match self {
            CnvThreshold::CopyNumber(cn) => format!("cn={}", cn),
            CnvThreshold::ConfidenceInterval { cu, cl } => format!("cu={}; cl={}", cu, cl),
        }
    }
}

/// Thresholds and rule set passed to the MOI reporter, identical for all samples of a run.
#[derive(Debug, Clone, PartialEq, Eq, derive_builder::Builder)]
#[builder(pattern = "immutable")]
pub struct ReporterParams {
    /// CNV reporting threshold.
    #[builder(default)]
    pub cnv: CnvThreshold,
    /// Minimal number of fusion reads to report.
    #[builder(default = "DEFAULT_FUSION_READS")]
    pub reads: u32,
    /// Blood specimen, i.e., DNA data only.
    #[builder(default)]
    pub blood: bool,
    /// Use the Pediatric MATCH rules instead of the Adult MATCH ones.
    #[builder(default)]
    pub pedmatch: bool,
}

impl ReporterParams {
    /// Reporter arguments, without the trailing VCF path.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = self.cnv.to_args();
        if self.blood {
            args.extend([String::from("-R"), String::from("-b")]);
        } else {
            args.extend([
                String::from("-r"),
                self.reads.to_string(),
                String::from("-R"),
            ]);
        }
        if self.pedmatch {
            args.push(String::from("-p"));
        }
        args
    }

    /// Name of the study whose rules are applied.
    pub fn study_name(&self) -> &'static str {
        if self.pedmatch {
            "Pediatric MATCH"
        } else {
            "Adult MATCH"
        }
    }
}

/// Generation of the raw MOI report of one sample.
pub trait ReportGenerator: Send + Sync {
    /// Run the reporter on `vcf` and return its standard output.
    fn generate(&self, vcf: &Path, params: &ReporterParams) -> Result<String, anyhow::Error>;
}

/// Lookup of the location annotation of an SNV.
pub trait LocationLookup: Send + Sync {
    /// Return the location of the variant at `position` (`chrom:pos`) in `vcf`, if any.
    fn locate(&self, vcf: &Path, position: &str) -> Result<Option<String>, anyhow::Error>;
}

/// Signal number of SIGINT.
#[cfg(unix)]
const SIGINT: i32 = 2;

/// Whether a child process was killed by SIGINT.
///
/// On Ctrl-C the reporter receives the signal together with us, possibly before the batch has
/// been cancelled.
fn interrupted(status: &ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal() == Some(SIGINT)
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        false
    }
}

/// `ReportGenerator` that runs the MOI reporter program.
#[derive(Debug, Clone)]
pub struct MoiReporter {
    program: String,
}

impl MoiReporter {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Default for MoiReporter {
    fn default() -> Self {
        Self::new(DEFAULT_REPORTER_PROGRAM)
    }
}

impl ReportGenerator for MoiReporter {
    fn generate(&self, vcf: &Path, params: &ReporterParams) -> Result<String, anyhow::Error> {
        tracing::debug!("running {} on {}", &self.program, vcf.display());
        let output = Command::new(&self.program)
            .args(params.to_args())
            .arg(vcf)
            .output()
            .with_context(|| format!("could not run {}", &self.program))?;

        if interrupted(&output.status) {
            return Err(CollateError::Interrupted.into());
        }
        if !output.status.success() {
            return Err(CollateError::ReporterFailed {
                vcf: vcf.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Whitespace-separated field of the extractor output holding the location.
const LOCATION_FIELD: usize = 12;

/// `LocationLookup` that re-reads the VCF file with the VCF extractor program.
#[derive(Debug, Clone)]
pub struct VcfExtractor {
    program: String,
}

impl VcfExtractor {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// Extract the location from the extractor output: field 12 of the first variant line.
    fn parse_location(stdout: &str) -> Option<String> {
        stdout
            .lines()
            .find(|line| line.starts_with("chr"))
            .and_then(|line| line.split_whitespace().nth(LOCATION_FIELD))
            .map(|location| location.to_string())
    }
}

impl Default for VcfExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_EXTRACTOR_PROGRAM)
    }
}

impl LocationLookup for VcfExtractor {
    fn locate(&self, vcf: &Path, position: &str) -> Result<Option<String>, anyhow::Error> {
        let output = Command::new(&self.program)
            .args(["-N", "-n", "-a", "-p", position])
            .arg(vcf)
            .output()
            .with_context(|| format!("could not run {}", &self.program))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} failed on {} ({}): {}",
                &self.program,
                vcf.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(Self::parse_location(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}
