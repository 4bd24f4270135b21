//! Decoding of bitmask permission tables.
//!
//! Permission tables are often stored compactly as one row per label with an
//! allow bitmask and a deny bitmask, where each operation owns one bit.

use crate::operation::Operation;
use crate::statement::{ExplicitStatement, PermissionStatement};
use serde::{Deserialize, Serialize};
use vellum_core::{CoreResult, LabelSet};

/// One row of a bitmask permission table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmaskRow {
    /// Label the row applies to
    pub label: u64,
    /// Bits of operations granted by the label
    pub allow: u64,
    /// Bits of operations forbidden by the label
    pub deny: u64,
}

impl From<(u64, u64, u64)> for BitmaskRow {
    fn from((label, allow, deny): (u64, u64, u64)) -> Self {
        Self { label, allow, deny }
    }
}

/// Decodes bitmask rows into an explicit statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitmaskDecoder {
    bits: Vec<(Operation, u64)>,
}

impl BitmaskDecoder {
    /// Create a decoder with no operations
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a bit (or combination of bits) to an operation
    #[must_use]
    pub fn with_bit(mut self, operation: Operation, bit: u64) -> Self {
        self.bits.push((operation, bit));
        self
    }

    /// Operation bit table
    #[must_use]
    pub fn bits(&self) -> &[(Operation, u64)] {
        &self.bits
    }

    /// Decode into a sealed explicit statement. Every operation in the bit
    /// table gets a rule, even when no row grants or denies it.
    ///
    /// # Errors
    ///
    /// Returns error if a row's label is zero
    pub fn decode_explicit(&self, rows: &[BitmaskRow]) -> CoreResult<ExplicitStatement> {
        let mut statement = ExplicitStatement::new();
        for (operation, bit) in &self.bits {
            let matching = |mask: fn(&BitmaskRow) -> u64| {
                LabelSet::new(
                    rows.iter()
                        .filter(|row| mask(row) & bit == *bit)
                        .map(|row| row.label),
                )
            };
            let allow = matching(|row| row.allow)?;
            let deny = matching(|row| row.deny)?;
            statement.statement(operation.clone(), allow, deny)?;
        }
        statement.seal();
        Ok(statement)
    }

    /// Decode into a permission statement
    ///
    /// # Errors
    ///
    /// Returns error if a row's label is zero
    pub fn decode(&self, rows: &[BitmaskRow]) -> CoreResult<PermissionStatement> {
        self.decode_explicit(rows).map(PermissionStatement::Explicit)
    }
}

/// Decode `(label, allow_bits, deny_bits)` rows with an operation bit table
///
/// # Errors
///
/// Returns error if a row's label is zero
pub fn from_bitmasks(
    rows: &[(u64, u64, u64)],
    bits: &[(Operation, u64)],
) -> CoreResult<PermissionStatement> {
    let decoder = bits
        .iter()
        .cloned()
        .fold(BitmaskDecoder::new(), |decoder, (operation, bit)| {
            decoder.with_bit(operation, bit)
        });
    let rows: Vec<BitmaskRow> = rows.iter().copied().map(BitmaskRow::from).collect();
    decoder.decode(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation_bits() -> Vec<(Operation, u64)> {
        vec![
            (Operation::READ, 1),
            (Operation::UPDATE, 2),
            (Operation::DELETE, 4),
            (Operation::new("carrots"), 8),
        ]
    }

    fn literal(statement: &ExplicitStatement, name: &str) -> (String, String) {
        let rule = statement.rule(&Operation::new(name)).unwrap();
        (rule.allow.to_literal(), rule.deny.to_literal())
    }

    #[test]
    fn test_bitmask_statement_construction() {
        let rows: Vec<BitmaskRow> = [(3, 7, 0), (1, 1, 4), (2, 2, 6), (4, 0, 2)]
            .into_iter()
            .map(BitmaskRow::from)
            .collect();
        let decoder = operation_bits()
            .into_iter()
            .fold(BitmaskDecoder::new(), |d, (op, bit)| d.with_bit(op, bit));
        let statement = decoder.decode_explicit(&rows).unwrap();

        assert!(statement.is_sealed());
        assert_eq!(literal(&statement, "read"), ("{1,3}".into(), "{}".into()));
        assert_eq!(literal(&statement, "update"), ("{2,3}".into(), "{2,4}".into()));
        assert_eq!(literal(&statement, "delete"), ("{3}".into(), "{1,2}".into()));
        assert_eq!(literal(&statement, "carrots"), ("{}".into(), "{}".into()));
        assert_eq!(statement.operations().count(), 4);
    }

    #[test]
    fn test_from_bitmasks_behaviour() {
        let statement = from_bitmasks(
            &[(3, 7, 0), (1, 1, 4), (2, 2, 6), (4, 0, 2)],
            &operation_bits(),
        )
        .unwrap();
        let labels = |v: &[u64]| LabelSet::new(v.iter().copied()).unwrap();
        assert!(statement.allow(&Operation::READ, &labels(&[1])));
        assert!(!statement.allow(&Operation::UPDATE, &labels(&[2])));
        assert!(statement.allow(&Operation::UPDATE, &labels(&[3])));
        assert!(!statement.something_allowed(&Operation::new("carrots")));
        assert!(!statement.something_allowed(&Operation::RELABEL));
    }

    #[test]
    fn test_multi_bit_operation_needs_all_bits() {
        let statement = from_bitmasks(&[(5, 3, 0), (6, 1, 0)], &[(Operation::new("admin"), 3)])
            .unwrap();
        assert!(statement.label_is_allowed(&Operation::new("admin"), 5u64));
        assert!(!statement.label_is_allowed(&Operation::new("admin"), 6u64));
    }

    #[test]
    fn test_zero_label_is_rejected() {
        assert!(from_bitmasks(&[(0, 1, 0)], &[(Operation::READ, 1)]).is_err());
    }
}
