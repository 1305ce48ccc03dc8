//! Errors that the top level needs to tell apart.

use std::path::PathBuf;

use itertools::Itertools;

use super::record::VariantClass;

/// Conditions raised while collating MOI reports.
///
/// Everything else travels as plain `anyhow::Error`; these variants exist so that `main` and
/// the batch runner can `downcast_ref` and react (exit status, skip vs. abort).
#[derive(Debug, thiserror::Error)]
pub enum CollateError {
    /// Invalid combination of command line options, detected before any work starts.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),
    /// A line carries a known class tag but too few fields (strict mode only).
    #[error("malformed {class} record with {found} field(s), need at least {needed}: {line:?}")]
    MalformedLine {
        class: VariantClass,
        found: usize,
        needed: usize,
        line: String,
    },
    /// The external reporter exited with non-zero status.
    #[error("MOI reporter failed on {}: {status}: {stderr}", .vcf.display())]
    ReporterFailed {
        vcf: PathBuf,
        status: String,
        stderr: String,
    },
    /// Samples that were skipped because their reporter invocation failed.
    #[error(
        "{} sample(s) could not be processed: {}",
        .0.len(),
        .0.iter().map(|p| p.display()).join(", ")
    )]
    FailedSamples(Vec<PathBuf>),
    /// The run was interrupted from the outside.
    #[error("interrupted")]
    Interrupted,
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn failed_samples_display() {
        let err = CollateError::FailedSamples(vec![
            PathBuf::from("a_DNA_b.vcf"),
            PathBuf::from("c.vcf"),
        ]);

        assert_eq!(
            err.to_string(),
            "2 sample(s) could not be processed: a_DNA_b.vcf, c.vcf"
        );
    }

    #[test]
    fn downcast_through_context() {
        let err = anyhow::Error::from(CollateError::Interrupted).context("while running batch");

        assert!(matches!(
            err.downcast_ref::<CollateError>(),
            Some(CollateError::Interrupted)
        ));
    }
}
