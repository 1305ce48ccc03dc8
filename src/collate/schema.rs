//! The output column schema and the projection of raw records onto it.

use strum::{Display, VariantArray};

use super::record::{RawRecord, VariantClass};
use super::sample::SampleNames;

/// Filler for columns without a value.
pub const PLACEHOLDER: &str = "-";

/// Header of the leading sample name column.
pub const SAMPLE_HEADER: &str = "Sample";

/// The output columns following the sample name, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, VariantArray)]
pub enum Column {
    Type,
    Gene,
    Position,
    Ref,
    Alt,
    Transcript,
    #[strum(serialize = "CDS")]
    Cds,
    #[strum(serialize = "AA")]
    Aa,
    #[strum(serialize = "VARID")]
    VarId,
    #[strum(serialize = "VAF/CN")]
    VafCn,
    #[strum(serialize = "Coverage/Counts")]
    Coverage,
    RefCov,
    AltCov,
    Function,
    /// Only present if location lookup is enabled; filled for SNVs only.
    Location,
}

impl Column {
    /// Index of the column in the row template (i.e., after the sample name).
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Mapping from raw field index to output column for one variant class.
pub type ClassLayout = &'static [(usize, Column)];

/// SNV records fill every column but the location.
pub const SNV_LAYOUT: ClassLayout = &[
    (0, Column::Type),
    (9, Column::Gene),
    (1, Column::Position),
    (2, Column::Ref),
    (3, Column::Alt),
    (10, Column::Transcript),
    (11, Column::Cds),
    (12, Column::Aa),
    (8, Column::VarId),
    (4, Column::VafCn),
    (5, Column::Coverage),
    (6, Column::RefCov),
    (7, Column::AltCov),
    (13, Column::Function),
];

pub const CNV_LAYOUT: ClassLayout = &[
    (0, Column::Type),
    (1, Column::Gene),
    (2, Column::Position),
    (5, Column::VafCn),
];

pub const FUSION_LAYOUT: ClassLayout = &[
    (0, Column::Type),
    (4, Column::Gene),
    (2, Column::VarId),
    (1, Column::Alt),
    (3, Column::Coverage),
];

/// Return the layout table of `class`; the synthetic `NoResult` class has none.
pub fn layout(class: VariantClass) -> ClassLayout {
    match class {
        VariantClass::Snv => SNV_LAYOUT,
        VariantClass::Cnv => CNV_LAYOUT,
        VariantClass::Fusion => FUSION_LAYOUT,
        VariantClass::NoResult => &[],
    }
}

/// One fixed-width output row, sample name first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow(Vec<String>);

impl OutputRow {
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The column schema of one run.
///
/// All rows produced through one schema have the same width, whatever their class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnSchema {
    /// Whether the trailing `Location` column is present.
    pub with_location: bool,
}

impl ColumnSchema {
    pub fn new(with_location: bool) -> Self {
        Self { with_location }
    }

    /// The columns after the sample name.
    pub fn columns(&self) -> &'static [Column] {
        if self.with_location {
            Column::VARIANTS
        } else {
            &Column::VARIANTS[..Column::Location.index()]
        }
    }

    /// Number of fields per row, including the sample name.
    pub fn width(&self) -> usize {
        1 + self.columns().len()
    }

    /// Header row.
    pub fn header(&self) -> Vec<String> {
        std::iter::once(SAMPLE_HEADER.to_string())
            .chain(self.columns().iter().map(|column| column.to_string()))
            .collect()
    }

    /// Project `record` onto the row template.
    ///
    /// Fusions are labelled with the RNA sample name, everything else with the DNA one.  Raw
    /// fields missing from a short line and columns not covered by the class layout are set to
    /// `PLACEHOLDER`.  `location` is only used for SNVs and if the schema has a location
    /// column.
    pub fn project(
        &self,
        record: &RawRecord,
        names: &SampleNames,
        location: Option<&str>,
    ) -> OutputRow {
        let sample = match record.class() {
            VariantClass::Fusion => &names.rna,
            _ => &names.dna,
        };
        let mut row = self.placeholder_row(sample);

        for &(raw_idx, column) in layout(record.class()) {
            if let Some(value) = record.field(raw_idx) {
                row.0[1 + column.index()] = value.to_string();
            }
        }
        if self.with_location && record.class() == VariantClass::Snv {
            if let Some(location) = location {
                row.0[1 + Column::Location.index()] = location.to_string();
            }
        }

        row
    }

    /// A row with the sample name and placeholders everywhere else.
    pub fn placeholder_row(&self, sample: &str) -> OutputRow {
        let mut fields = vec![PLACEHOLDER.to_string(); self.width()];
        fields[0] = sample.to_string();
        OutputRow(fields)
    }
}
