//! Running the MOI reporter over all samples of a batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use rayon::prelude::*;

use super::error::CollateError;
use super::record::LinePolicy;
use super::reporter::{LocationLookup, ReportGenerator, ReporterParams};
use super::sample::{SampleCollector, SampleNames, SampleReportBundle};
use super::schema::ColumnSchema;

/// Bundles of all samples, by input VCF path.
pub type BatchResult = BTreeMap<PathBuf, SampleReportBundle>;

/// What to do when the reporter fails on a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop handing out samples, let running ones finish, discard all results.
    #[default]
    Abort,
    /// Log the failure, leave the sample out of the report, and fail at the very end.
    Skip,
}

/// Shared flag to stop a running batch from the outside.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Set `cancel` when the process receives Ctrl-C.
///
/// The listener runs on its own thread with a single-threaded tokio runtime and lives until the
/// process ends.  It logs to the subscriber of the calling thread.
pub fn cancel_on_interrupt(cancel: CancelToken) -> Result<(), anyhow::Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let dispatch = tracing::dispatcher::get_default(Clone::clone);
    std::thread::Builder::new()
        .name(String::from("interrupt-listener"))
        .spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                runtime.block_on(async {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => {
                            tracing::warn!(
                                "Interrupted, waiting for running samples to finish..."
                            );
                            cancel.cancel();
                        }
                        Err(e) => tracing::error!("could not listen for interrupt: {}", e),
                    }
                })
            })
        })?;
    Ok(())
}

/// Successful bundles plus the samples that failed under `FailurePolicy::Skip`.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub result: BatchResult,
    pub failed: Vec<PathBuf>,
}

/// Settings of a batch run that are the same for all samples.
#[derive(Debug, Clone, PartialEq, Eq, derive_builder::Builder)]
#[builder(pattern = "immutable")]
pub struct BatchSettings {
    /// Parameters passed to the reporter.
    pub params: ReporterParams,
    /// Output column schema.
    #[builder(default)]
    pub schema: ColumnSchema,
    /// Handling of truncated report lines.
    #[builder(default)]
    pub line_policy: LinePolicy,
    /// Handling of reporter failures.
    #[builder(default)]
    pub failure_policy: FailurePolicy,
    /// Number of worker threads; below 2 samples are processed sequentially.
    #[builder(default = "1")]
    pub num_procs: usize,
    /// Suppress sample naming warnings.
    #[builder(default)]
    pub quiet: bool,
}

/// Runs reporter and collector for each sample, sequentially or on a worker pool.
pub struct BatchRunner<'a> {
    settings: &'a BatchSettings,
    generator: &'a dyn ReportGenerator,
    location: Option<&'a dyn LocationLookup>,
    cancel: CancelToken,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        settings: &'a BatchSettings,
        generator: &'a dyn ReportGenerator,
        location: Option<&'a dyn LocationLookup>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            settings,
            generator,
            location,
            cancel,
        }
    }

    /// Generate and collect the report of a single sample.
    fn process(&self, vcf: &Path) -> Result<SampleReportBundle, anyhow::Error> {
        if self.cancel.is_cancelled() {
            return Err(CollateError::Interrupted.into());
        }

        let names = SampleNames::from_path(vcf, self.settings.quiet);
        let report = self
            .generator
            .generate(vcf, &self.settings.params)
            .map_err(|e| {
                // Children die with us on Ctrl-C, report this as the interruption it is.
                if self.cancel.is_cancelled() {
                    CollateError::Interrupted.into()
                } else {
                    e
                }
            })?;

        SampleCollector::new(
            vcf,
            &names,
            &self.settings.schema,
            self.settings.line_policy,
            self.location,
        )
        .collect(&report)
    }

    /// Decide whether the failure of `vcf` ends the batch.
    ///
    /// Returns the error if so, records the sample as failed otherwise.
    fn on_failure(
        &self,
        vcf: &Path,
        err: anyhow::Error,
        failed: &Mutex<Vec<PathBuf>>,
    ) -> Result<(), anyhow::Error> {
        let interrupted = matches!(
            err.downcast_ref::<CollateError>(),
            Some(CollateError::Interrupted)
        );
        if interrupted || self.settings.failure_policy == FailurePolicy::Abort {
            tracing::error!("Can not process file: {}!", vcf.display());
            return Err(err);
        }

        tracing::error!("Can not process file: {}, skipping: {:#}", vcf.display(), err);
        failed
            .lock()
            .map_err(|_| anyhow::anyhow!("failed sample list poisoned"))?
            .push(vcf.to_path_buf());
        Ok(())
    }

    /// Process `vcf` and store its bundle; each path is written exactly once.
    fn process_into(
        &self,
        vcf: &Path,
        result: &Mutex<BatchResult>,
        failed: &Mutex<Vec<PathBuf>>,
    ) -> Result<(), anyhow::Error> {
        match self.process(vcf) {
            Ok(bundle) => {
                result
                    .lock()
                    .map_err(|_| anyhow::anyhow!("batch result poisoned"))?
                    .insert(vcf.to_path_buf(), bundle);
                Ok(())
            }
            Err(e) => self.on_failure(vcf, e, failed),
        }
    }

    /// Run the batch over `vcfs`.
    ///
    /// With `FailurePolicy::Abort`, the first failure stops the batch: no further samples are
    /// started, running ones complete, and the error is returned without any results.  An
    /// interruption through the `CancelToken` always behaves like this and yields
    /// `CollateError::Interrupted`.
    ///
    /// Workers log to the subscriber of the calling thread.
    pub fn run(&self, vcfs: &[PathBuf]) -> Result<BatchOutcome, anyhow::Error> {
        let vcfs = vcfs.iter().unique().collect::<Vec<_>>();
        let result = Mutex::new(BatchResult::new());
        let failed = Mutex::new(Vec::new());

        if self.settings.num_procs < 2 {
            tracing::info!(
                "Non-parallel processing files (total: {} VCF(s))",
                vcfs.len()
            );
            for vcf in &vcfs {
                self.process_into(vcf, &result, &failed)?;
            }
        } else {
            tracing::info!(
                "Parallel processing files using {} processes (total: {} VCF(s))",
                self.settings.num_procs,
                vcfs.len()
            );
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.num_procs)
                .thread_name(|i| format!("moi-worker-{}", i))
                .build()?;
            let dispatch = tracing::dispatcher::get_default(Clone::clone);
            pool.install(|| {
                vcfs.par_iter().try_for_each(|vcf| {
                    tracing::dispatcher::with_default(&dispatch, || {
                        self.process_into(vcf, &result, &failed)
                    })
                })
            })?;
        }

        if self.cancel.is_cancelled() {
            return Err(CollateError::Interrupted.into());
        }

        let result = result
            .into_inner()
            .map_err(|_| anyhow::anyhow!("batch result poisoned"))?;
        let mut failed = failed
            .into_inner()
            .map_err(|_| anyhow::anyhow!("failed sample list poisoned"))?;
        failed.sort();
        tracing::info!(
            "... collected {} sample(s), {} failed",
            result.len(),
            failed.len()
        );

        Ok(BatchOutcome { result, failed })
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::collate::record::VariantClass;
    use crate::collate::reporter::fake::FakeReporter;
    use crate::collate::reporter::ReporterParamsBuilder;

    fn settings(num_procs: usize, failure_policy: FailurePolicy) -> BatchSettings {
        BatchSettingsBuilder::default()
            .params(ReporterParamsBuilder::default().build().unwrap())
            .num_procs(num_procs)
            .failure_policy(failure_policy)
            .quiet(true)
            .build()
            .unwrap()
    }

    fn reporter() -> FakeReporter {
        FakeReporter::default()
            .with_report(
                "S1_DNA_S1_RNA.vcf",
                "SNV,chr7:140453136,A,T,0.45,1500,825,675,COSM476,BRAF,NM_004333.4,c.1799T>A,p.V600E,missense\n",
            )
            .with_report("S2_DNA_S2_RNA.vcf", "CNV,MET,chr7:116339139,2.1,9.4,11.2\n")
            .with_report("S3_DNA_S3_RNA.vcf", "")
    }

    fn vcfs(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[rstest::rstest]
    fn run_collects_all_samples(#[values(1, 2, 4)] num_procs: usize) -> Result<(), anyhow::Error> {
        let settings = settings(num_procs, FailurePolicy::Abort);
        let reporter = reporter();
        let runner = BatchRunner::new(&settings, &reporter, None, CancelToken::default());

        let outcome = runner.run(&vcfs(&[
            "S3_DNA_S3_RNA.vcf",
            "S1_DNA_S1_RNA.vcf",
            "S2_DNA_S2_RNA.vcf",
        ]))?;

        assert_eq!(outcome.failed, Vec::<PathBuf>::new());
        assert_eq!(
            outcome.result.keys().collect::<Vec<_>>(),
            vec![
                &PathBuf::from("S1_DNA_S1_RNA.vcf"),
                &PathBuf::from("S2_DNA_S2_RNA.vcf"),
                &PathBuf::from("S3_DNA_S3_RNA.vcf"),
            ]
        );
        let s3 = &outcome.result[&PathBuf::from("S3_DNA_S3_RNA.vcf")];
        assert!(s3.bucket(VariantClass::NoResult).is_some());
        assert_eq!(reporter.calls(), 3);

        Ok(())
    }

    #[test]
    fn run_deduplicates_inputs() -> Result<(), anyhow::Error> {
        let settings = settings(2, FailurePolicy::Abort);
        let reporter = reporter();
        let runner = BatchRunner::new(&settings, &reporter, None, CancelToken::default());

        let outcome = runner.run(&vcfs(&["S1_DNA_S1_RNA.vcf", "S1_DNA_S1_RNA.vcf"]))?;

        assert_eq!(outcome.result.len(), 1);
        assert_eq!(reporter.calls(), 1);

        Ok(())
    }

    #[rstest::rstest]
    fn run_abort_on_failure(#[values(1, 3)] num_procs: usize) {
        let settings = settings(num_procs, FailurePolicy::Abort);
        let reporter = reporter();
        let runner = BatchRunner::new(&settings, &reporter, None, CancelToken::default());

        let err = runner
            .run(&vcfs(&["S1_DNA_S1_RNA.vcf", "broken.vcf", "S2_DNA_S2_RNA.vcf"]))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CollateError>(),
            Some(CollateError::ReporterFailed { vcf, .. }) if vcf == &PathBuf::from("broken.vcf")
        ));
    }

    #[test]
    fn run_abort_sequential_stops_at_failure() {
        let settings = settings(1, FailurePolicy::Abort);
        let reporter = reporter();
        let runner = BatchRunner::new(&settings, &reporter, None, CancelToken::default());

        let result = runner.run(&vcfs(&["broken.vcf", "S1_DNA_S1_RNA.vcf", "S2_DNA_S2_RNA.vcf"]));

        assert!(result.is_err());
        assert_eq!(reporter.calls(), 1);
    }

    #[rstest::rstest]
    fn run_skip_on_failure(#[values(1, 3)] num_procs: usize) -> Result<(), anyhow::Error> {
        let settings = settings(num_procs, FailurePolicy::Skip);
        let reporter = reporter();
        let runner = BatchRunner::new(&settings, &reporter, None, CancelToken::default());

        let outcome = runner.run(&vcfs(&[
            "zzz.vcf",
            "S1_DNA_S1_RNA.vcf",
            "broken.vcf",
            "S2_DNA_S2_RNA.vcf",
        ]))?;

        assert_eq!(outcome.failed, vcfs(&["broken.vcf", "zzz.vcf"]));
        assert_eq!(outcome.result.len(), 2);

        Ok(())
    }

    #[rstest::rstest]
    fn run_cancelled(#[values(1, 2)] num_procs: usize) {
        let settings = settings(num_procs, FailurePolicy::Skip);
        let reporter = reporter();
        let cancel = CancelToken::default();
        cancel.cancel();
        let runner = BatchRunner::new(&settings, &reporter, None, cancel);

        let err = runner
            .run(&vcfs(&["S1_DNA_S1_RNA.vcf", "S2_DNA_S2_RNA.vcf"]))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CollateError>(),
            Some(CollateError::Interrupted)
        ));
        assert_eq!(reporter.calls(), 0);
    }

    #[rstest::rstest]
    fn run_cancelled_mid_batch(
        #[values(FailurePolicy::Abort, FailurePolicy::Skip)] failure_policy: FailurePolicy,
    ) {
        let settings = settings(1, failure_policy);
        let cancel = CancelToken::default();
        let reporter = reporter().cancel_on("S2_DNA_S2_RNA.vcf", cancel.clone());
        let runner = BatchRunner::new(&settings, &reporter, None, cancel);

        let err = runner
            .run(&vcfs(&[
                "S1_DNA_S1_RNA.vcf",
                "S2_DNA_S2_RNA.vcf",
                "S3_DNA_S3_RNA.vcf",
            ]))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CollateError>(),
            Some(CollateError::Interrupted)
        ));
        // The sample running on cancellation completes, the next one is not started.
        assert_eq!(reporter.calls(), 2);
    }

    #[rstest::rstest]
    fn run_cancelled_mid_batch_parallel(#[values(2, 4)] num_procs: usize) {
        let settings = settings(num_procs, FailurePolicy::Skip);
        let cancel = CancelToken::default();
        let reporter = reporter().cancel_on("S1_DNA_S1_RNA.vcf", cancel.clone());
        let runner = BatchRunner::new(&settings, &reporter, None, cancel);

        let err = runner
            .run(&vcfs(&[
                "S1_DNA_S1_RNA.vcf",
                "S2_DNA_S2_RNA.vcf",
                "S3_DNA_S3_RNA.vcf",
            ]))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CollateError>(),
            Some(CollateError::Interrupted)
        ));
        assert!(reporter.calls() <= 3);
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[rstest::rstest]
    fn run_logs_from_workers(#[values(1, 2, 4)] num_procs: usize) -> Result<(), anyhow::Error> {
        let settings = BatchSettingsBuilder::default()
            .params(ReporterParamsBuilder::default().build()?)
            .num_procs(num_procs)
            .failure_policy(FailurePolicy::Skip)
            .build()?;
        let reporter = FakeReporter::default().with_report("patientA.vcf", "");
        let logs = SharedBuf::default();
        let writer = logs.clone();
        let collector = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let outcome = tracing::subscriber::with_default(collector, || {
            BatchRunner::new(&settings, &reporter, None, CancelToken::default())
                .run(&vcfs(&["patientA.vcf", "broken.vcf"]))
        })?;

        assert_eq!(outcome.failed, vcfs(&["broken.vcf"]));
        let logs = logs.contents();
        assert!(logs.contains("Can not get DNA or RNA sample name for 'patientA.vcf'"));
        assert!(logs.contains("Can not process file: broken.vcf, skipping"));

        Ok(())
    }

    #[test]
    fn failure_policy_display() {
        assert_eq!(FailurePolicy::Abort.to_string(), "abort");
        assert_eq!(FailurePolicy::Skip.to_string(), "skip");
    }
}
