//! Writing of the collated CSV report.

use std::io::Write;

use itertools::Itertools;

use super::batch::BatchResult;
use super::reporter::ReporterParams;
use super::schema::ColumnSchema;

/// Width of the banner rules.
const BANNER_WIDTH: usize = 95;

/// Banner documenting the parameters of a run.
pub fn banner(params: &ReporterParams) -> String {
    let rule = "-".repeat(BANNER_WIDTH);
    format!(
        "{rule}\nCollated {} MOI Reports Using Params CNV: {}, Fusion Reads: reads={}\n{rule}\n",
        params.study_name(),
        params.cnv.describe(),
        params.reads,
        rule = rule
    )
}

/// Writes a `BatchResult` as one CSV report.
///
/// Samples are written in ascending order of their VCF path, each sample's rows class by class
/// (SNV, CNV, Fusion, NoResult) and within a class in variant key order.  The order does not
/// depend on the order in which samples were processed.
pub struct ReportAssembler<'a> {
    schema: &'a ColumnSchema,
    banner: Option<String>,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(schema: &'a ColumnSchema) -> Self {
        Self {
            schema,
            banner: None,
        }
    }

    /// Precede the header with `banner`.
    pub fn with_banner(mut self, banner: String) -> Self {
        self.banner = Some(banner);
        self
    }

    /// Write the report to `out`; finalizing `out` is up to the caller.
    pub fn write<W: Write>(&self, result: &BatchResult, out: &mut W) -> Result<(), anyhow::Error> {
        if let Some(banner) = &self.banner {
            out.write_all(banner.as_bytes())?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        writer.write_record(self.schema.header())?;

        let samples = result
            .iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.as_os_str().cmp(rhs.as_os_str()));
        let mut count = 0;
        for (vcf, bundle) in samples {
            tracing::debug!("writing {} row(s) for {}", bundle.len(), vcf.display());
            for row in bundle.rows() {
                debug_assert_eq!(row.len(), self.schema.width());
                writer.write_record(row.fields())?;
                count += 1;
            }
        }
        writer.flush()?;

        tracing::info!("Wrote {} row(s) for {} sample(s)", count, result.len());
        Ok(())
    }
}
