//! Expected-versus-received checks for read results.

use std::fmt;

use crate::batch::BatchReadResult;
use crate::record::Record;
use crate::value::{Bin, Value};

/// Observation from comparing an expected bin with what a read returned.
#[derive(Debug, Clone, PartialEq)]
pub enum BinCheck {
    Match {
        name: String,
        value: Value,
    },
    Mismatch {
        name: String,
        expected: Value,
        /// `None` when the record or the bin was absent.
        received: Option<Value>,
    },
}

impl BinCheck {
    /// Compares `expected` with the bin of the same name in `record`.
    ///
    /// Only a present, deep-equal value matches; a missing record or bin is
    /// always a mismatch.
    pub fn compare(expected: &Bin, record: Option<&Record>) -> Self {
        let received = record.and_then(|record| record.get(&expected.name));
        match received {
            Some(value) if *value == expected.value => BinCheck::Match {
                name: expected.name.clone(),
                value: value.clone(),
            },
            _ => BinCheck::Mismatch {
                name: expected.name.clone(),
                expected: expected.value.clone(),
                received: received.cloned(),
            },
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, BinCheck::Match { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            BinCheck::Match { name, .. } | BinCheck::Mismatch { name, .. } => name,
        }
    }
}

impl fmt::Display for BinCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinCheck::Match { name, value } => write!(f, "bin {name} matched: {value}"),
            BinCheck::Mismatch {
                name,
                expected,
                received: Some(received),
            } => write!(f, "bin {name} mismatch: expected {expected}, received {received}"),
            BinCheck::Mismatch {
                name,
                expected,
                received: None,
            } => write!(f, "bin {name} mismatch: expected {expected}, received nothing"),
        }
    }
}

/// Checks `expected[i]` against the record in slot `i` of `result`.
///
/// Produces one check per expectation; expectations past the end of the
/// result compare against an absent record.
pub fn validate_batch(result: &BatchReadResult, expected: &[Bin]) -> Vec<BinCheck> {
    expected
        .iter()
        .enumerate()
        .map(|(index, bin)| {
            BinCheck::compare(bin, result.get(index).and_then(|slot| slot.record()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::from_bins(
            [
                Bin::new("bin1", "value1"),
                Bin::new("blob", vec![1u8, 2, 3]),
                Bin::new("list", vec![Value::from(1i64), Value::from("two")]),
            ],
            1,
            0,
        )
    }

    #[test]
    fn equal_values_match() {
        let record = record();
        assert!(BinCheck::compare(&Bin::new("bin1", "value1"), Some(&record)).is_match());
        assert!(BinCheck::compare(&Bin::new("blob", vec![1u8, 2, 3]), Some(&record)).is_match());
        assert!(BinCheck::compare(
            &Bin::new("list", vec![Value::from(1i64), Value::from("two")]),
            Some(&record)
        )
        .is_match());
    }

    #[test]
    fn stored_nan_matches_expected_nan() {
        let record = Record::from_bins([Bin::new("ratio", f64::NAN)], 1, 0);
        assert!(BinCheck::compare(&Bin::new("ratio", f64::NAN), Some(&record)).is_match());
    }

    #[test]
    fn different_values_report_both_sides() {
        let record = record();
        let check = BinCheck::compare(&Bin::new("bin1", "value2"), Some(&record));
        assert_eq!(
            check,
            BinCheck::Mismatch {
                name: "bin1".into(),
                expected: "value2".into(),
                received: Some("value1".into()),
            }
        );
        assert_eq!(
            check.to_string(),
            "bin bin1 mismatch: expected value2, received value1"
        );
    }

    #[test]
    fn absence_is_never_a_match() {
        let record = record();
        let missing_bin = BinCheck::compare(&Bin::new("bbb", Value::Nil), Some(&record));
        assert!(!missing_bin.is_match());

        let missing_record = BinCheck::compare(&Bin::new("bin1", "value1"), None);
        assert!(matches!(
            missing_record,
            BinCheck::Mismatch { received: None, .. }
        ));
    }

    #[test]
    fn blobs_compare_byte_for_byte() {
        let record = record();
        assert!(!BinCheck::compare(&Bin::new("blob", vec![1u8, 2]), Some(&record)).is_match());
        assert!(!BinCheck::compare(&Bin::new("blob", "\u{1}\u{2}\u{3}"), Some(&record)).is_match());
    }

    #[test]
    fn validate_batch_covers_every_expectation() {
        let result = BatchReadResult::default();
        let checks = validate_batch(&result, &[Bin::new("bin1", "value1")]);
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].is_match());
        assert_eq!(checks[0].name(), "bin1");
    }
}
