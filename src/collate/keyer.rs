//! Variant keys and their natural ordering.

use std::cmp::Ordering;
use std::fmt::Display;

use super::record::{RawRecord, VariantClass};

/// Separator of the components of a `VariantKey`.
const KEY_SEPARATOR: char = ':';

/// Composite identifier of a variant within one sample and class.
///
/// The key doubles as de-duplication key (last write wins) and as sort key.  For SNVs it is
/// `gene:position` (raw fields 9 and 1), for CNVs and fusions raw fields 1 and 2.  Since the
/// position field itself is usually `chrom:pos`, a typical SNV key is `BRAF:chr7:140453136`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey(String);

impl VariantKey {
    /// Build the key for the given record.
    ///
    /// The classifier guarantees the fields needed here, `None` is only returned for
    /// records that bypassed it.
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let (first, second) = match record.class() {
            VariantClass::Snv => (record.field(9)?, record.field(1)?),
            VariantClass::Cnv | VariantClass::Fusion => (record.field(1)?, record.field(2)?),
            VariantClass::NoResult => return None,
        };
        Some(VariantKey(format!("{}{}{}", first, KEY_SEPARATOR, second)))
    }

    /// The key of the synthetic row of a sample without variants.
    pub fn no_result() -> Self {
        VariantKey(String::from("no_result"))
    }

    /// The `idx`-th colon-separated component, empty if there is none.
    fn component(&self, idx: usize) -> &str {
        self.0.split(KEY_SEPARATOR).nth(idx).unwrap_or_default()
    }

    /// Order two keys of the same variant class for output.
    ///
    /// SNVs are ordered by the second and then the third key component (chromosome and
    /// position for `gene:chrom:pos` keys), everything else by the second component only.
    /// Components are compared with `natural_cmp`.  Keys that compare equal keep their
    /// relative order when used with a stable sort.
    pub fn cmp_in_class(&self, other: &Self, class: VariantClass) -> Ordering {
        let primary = natural_cmp(self.component(1), other.component(1));
        match class {
            VariantClass::Snv => {
                primary.then_with(|| natural_cmp(self.component(2), other.component(2)))
            }
            _ => primary,
        }
    }
}

impl Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VariantKey {
    fn from(value: &str) -> Self {
        VariantKey(value.to_string())
    }
}

/// Run of either ASCII digits or non-digits in a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

/// Split `s` into alternating runs of digits and non-digits.
fn chunks(s: &str) -> impl Iterator<Item = Chunk<'_>> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let is_digit = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != is_digit)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(if is_digit {
            Chunk::Number(head)
        } else {
            Chunk::Text(head)
        })
    })
}

/// Compare two digit runs by numeric value, without limiting the number of digits.
fn cmp_numbers(lhs: &str, rhs: &str) -> Ordering {
    let lhs_trimmed = lhs.trim_start_matches('0');
    let rhs_trimmed = rhs.trim_start_matches('0');
    lhs_trimmed
        .len()
        .cmp(&rhs_trimmed.len())
        .then_with(|| lhs_trimmed.cmp(rhs_trimmed))
        // "7" before "07"
        .then_with(|| lhs.len().cmp(&rhs.len()))
}

/// Natural ordering of two strings.
///
/// Both strings are split into alternating runs of digits and non-digits.  Runs are compared
/// pairwise: digit runs by their numeric value, other runs lexically, and a digit run sorts
/// before a non-digit run.  If one string is a prefix of the other in terms of runs, the shorter
/// one sorts first.  Thus `chr2` < `chr10` and `chr2:9` < `chr2:10`.
pub fn natural_cmp(lhs: &str, rhs: &str) -> Ordering {
    let mut lhs_chunks = chunks(lhs);
    let mut rhs_chunks = chunks(rhs);
    loop {
        let ordering = match (lhs_chunks.next(), rhs_chunks.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Chunk::Number(a)), Some(Chunk::Number(b))) => cmp_numbers(a, b),
            (Some(Chunk::Text(a)), Some(Chunk::Text(b))) => a.cmp(b),
            (Some(Chunk::Number(_)), Some(Chunk::Text(_))) => Ordering::Less,
            (Some(Chunk::Text(_)), Some(Chunk::Number(_))) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}
