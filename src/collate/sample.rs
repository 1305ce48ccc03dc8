//! Per-sample collection of report rows.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use itertools::Itertools;

use super::keyer::VariantKey;
use super::record::{classify, LinePolicy, VariantClass};
use super::reporter::LocationLookup;
use super::schema::{ColumnSchema, OutputRow};

/// Marker between the DNA and the RNA sample name in VCF file names.
const DNA_MARKER: &str = "DNA";

/// Suffix of the VCF files.
const VCF_SUFFIX: &str = ".vcf";

/// DNA and RNA sample names of one VCF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleNames {
    pub dna: String,
    pub rna: String,
}

impl SampleNames {
    /// Derive the sample names from a file name like `MSN1234_v1_MSN1234_DNA_MSN1235_RNA.vcf`.
    ///
    /// The DNA name runs up to and including the first `DNA` that is followed by `_`, the RNA
    /// name is the rest without the `.vcf` suffix.  If the file name does not follow this
    /// convention, both names are set to the file name without suffix and a warning is logged
    /// unless `quiet` is set.
    pub fn from_path(path: &Path, quiet: bool) -> Self {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        if let Some(stem) = file_name.strip_suffix(VCF_SUFFIX) {
            let marker = format!("{}_", DNA_MARKER);
            if let Some(pos) = stem.find(&marker) {
                return SampleNames {
                    dna: stem[..pos + DNA_MARKER.len()].to_string(),
                    rna: stem[pos + marker.len()..].to_string(),
                };
            }
        }

        if !quiet {
            tracing::warn!(
                "Can not get DNA or RNA sample name for '{}'! Using full VCF filename instead",
                &file_name
            );
        }
        let name = file_name
            .strip_suffix(VCF_SUFFIX)
            .unwrap_or(&file_name)
            .to_string();
        SampleNames {
            dna: name.clone(),
            rna: name,
        }
    }
}

/// The rows of one sample, by variant class and variant key.
///
/// Within a class, rows keep the order in which their keys were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleReportBundle {
    buckets: BTreeMap<VariantClass, IndexMap<VariantKey, OutputRow>>,
}

impl SampleReportBundle {
    /// Insert a row, replacing any earlier row with the same class and key.
    fn insert(&mut self, class: VariantClass, key: VariantKey, row: OutputRow) {
        if let Some(previous) = self.buckets.entry(class).or_default().insert(key, row) {
            tracing::trace!("replacing earlier {} row {:?}", class, previous.fields());
        }
    }

    /// The rows of `class`, if any.
    pub fn bucket(&self, class: VariantClass) -> Option<&IndexMap<VariantKey, OutputRow>> {
        self.buckets.get(&class)
    }

    /// Whether there is no row at all.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.is_empty())
    }

    /// Total number of rows.
    pub fn len(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.len()).sum()
    }

    /// All rows in output order: class by class, then by variant key.
    pub fn rows(&self) -> impl Iterator<Item = &OutputRow> + '_ {
        self.buckets.iter().flat_map(|(class, bucket)| {
            bucket
                .iter()
                .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp_in_class(rhs, *class))
                .map(|(_, row)| row)
        })
    }
}

/// Turns the raw reporter output of one sample into a `SampleReportBundle`.
///
/// The collector does not share any mutable state, so one instance per sample can be used
/// from any number of threads.
pub struct SampleCollector<'a> {
    vcf: &'a Path,
    names: &'a SampleNames,
    schema: &'a ColumnSchema,
    policy: LinePolicy,
    location: Option<&'a dyn LocationLookup>,
}

impl<'a> SampleCollector<'a> {
    pub fn new(
        vcf: &'a Path,
        names: &'a SampleNames,
        schema: &'a ColumnSchema,
        policy: LinePolicy,
        location: Option<&'a dyn LocationLookup>,
    ) -> Self {
        Self {
            vcf,
            names,
            schema,
            policy,
            location,
        }
    }

    /// Look up the location of an SNV; failures are logged and yield no location.
    fn locate(&self, position: &str) -> Option<String> {
        let lookup = self.location?;
        match lookup.locate(self.vcf, position) {
            Ok(location) => location,
            Err(e) => {
                tracing::error!(
                    "Can not get location of {} in {}: {:#}",
                    position,
                    self.vcf.display(),
                    e
                );
                None
            }
        }
    }

    /// Collect all rows from `report`.
    ///
    /// If no line yields a row, the bundle holds a single placeholder row of class
    /// `NoResult` labelled with the DNA sample name.
    pub fn collect(&self, report: &str) -> Result<SampleReportBundle, anyhow::Error> {
        let mut bundle = SampleReportBundle::default();

        for (line_no, line) in report.lines().enumerate() {
            let record = classify(line, self.policy).with_context(|| {
                format!("line {} of report for {}", line_no + 1, self.vcf.display())
            })?;
            let Some(record) = record else {
                continue;
            };
            let Some(key) = VariantKey::from_record(&record) else {
                continue;
            };

            let location = match (record.class(), self.schema.with_location) {
                (VariantClass::Snv, true) => record.field(1).and_then(|pos| self.locate(pos)),
                _ => None,
            };
            let row = self.schema.project(&record, self.names, location.as_deref());
            bundle.insert(record.class(), key, row);
        }

        if bundle.is_empty() {
            tracing::debug!("no MOIs found for {}", self.vcf.display());
            bundle.insert(
                VariantClass::NoResult,
                VariantKey::no_result(),
                self.schema.placeholder_row(&self.names.dna),
            );
        }

        Ok(bundle)
    }
}
