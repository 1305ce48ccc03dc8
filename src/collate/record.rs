//! Classification of the comma-separated lines written by the MOI reporter.
//!
//! The reporter emits one variant per line with the variant class as the first field, e.g.
//!
//! ```text
//! SNV,chr7:140453136,A,T,0.45,1500,825,675,COSM476,BRAF,NM_004333.4,c.1799T>A,p.V600E,missense
//! CNV,MET,chr7:116339139,2.1,9.4,11.2
//! Fusion,EML4-ALK,EML4-ALK.E6aA20.COSF1062,12034,ALK
//! ```
//!
//! Anything else (blank lines, banners, separators) is not a record and is skipped.

use strum::{Display, EnumString, VariantArray};

use super::error::CollateError;

/// Field delimiter of the reporter output.
pub const DELIMITER: char = ',';

/// Variant class of a report line; also the bucket a row ends up in.
///
/// The declaration order is the order in which classes are written to the report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    VariantArray,
)]
pub enum VariantClass {
    #[strum(serialize = "SNV")]
    Snv,
    #[strum(serialize = "CNV")]
    Cnv,
    #[strum(serialize = "Fusion")]
    Fusion,
    /// Synthetic class for samples without any reported variant; never parsed from input.
    #[strum(serialize = "NoResult")]
    NoResult,
}

impl VariantClass {
    /// Parse the class tag in the first field of a line.
    ///
    /// `NoResult` is not a valid tag in reporter output.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.parse::<VariantClass>() {
            Ok(VariantClass::NoResult) | Err(_) => None,
            Ok(class) => Some(class),
        }
    }

    /// Minimal number of fields so that the variant key can be built.
    pub fn min_fields(&self) -> usize {
        match self {
            VariantClass::Snv => 10,
            VariantClass::Cnv | VariantClass::Fusion => 3,
            VariantClass::NoResult => 0,
        }
    }
}

/// How to treat lines with a known class tag but too few fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinePolicy {
    /// Skip such lines silently.
    #[default]
    Tolerant,
    /// Fail the sample with `CollateError::MalformedLine`.
    Strict,
}

/// One classified line, borrowing its fields from the reporter output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord<'a> {
    class: VariantClass,
    fields: Vec<&'a str>,
}

impl<'a> RawRecord<'a> {
    pub fn class(&self) -> VariantClass {
        self.class
    }

    /// All fields, including the class tag at index 0.
    pub fn fields(&self) -> &[&'a str] {
        &self.fields
    }

    /// Field at raw index `idx`, if the line is long enough.
    pub fn field(&self, idx: usize) -> Option<&'a str> {
        self.fields.get(idx).copied()
    }
}

/// Classify a single line of reporter output.
///
/// Returns `Ok(None)` for lines that are not variant records.  Truncated records are skipped
/// or rejected depending on `policy`.
pub fn classify(line: &str, policy: LinePolicy) -> Result<Option<RawRecord<'_>>, CollateError> {
    let line = line.trim_end_matches('\r');
    let fields = line.split(DELIMITER).collect::<Vec<_>>();
    let Some(class) = VariantClass::from_tag(fields[0]) else {
        return Ok(None);
    };

    let needed = class.min_fields();
    if fields.len() < needed {
        return match policy {
            LinePolicy::Tolerant => {
                tracing::trace!("skipping truncated {} line: {:?}", class, line);
                Ok(None)
            }
            LinePolicy::Strict => Err(CollateError::MalformedLine {
                class,
                found: fields.len(),
                needed,
                line: line.to_string(),
            }),
        };
    }

    Ok(Some(RawRecord { class, fields }))
}
