//! Labels, label sets and label deltas.
//!
//! A label is a positive integer. Objects carry a [`LabelSet`]; permission
//! statements grant or deny operations in terms of labels. A [`LabelDelta`]
//! describes a change to a label set and can be applied either in memory or
//! as a SQL expression against an `int[]` column.

use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Conversion of caller-supplied values into labels.
///
/// Conversion fails with [`CoreError::InvalidLabel`] for zero or negative
/// values.
pub trait IntoLabel {
    /// Convert into a label
    ///
    /// # Errors
    ///
    /// Returns error if the value is not a positive integer
    fn into_label(self) -> CoreResult<u64>;
}

macro_rules! impl_into_label_signed {
    ($($t:ty),*) => {$(
        impl IntoLabel for $t {
            fn into_label(self) -> CoreResult<u64> {
                u64::try_from(self)
                    .ok()
                    .filter(|&label| label != 0)
                    .ok_or_else(|| CoreError::InvalidLabel { label: self.to_string() })
            }
        }
    )*};
}

macro_rules! impl_into_label_unsigned {
    ($($t:ty),*) => {$(
        impl IntoLabel for $t {
            fn into_label(self) -> CoreResult<u64> {
                if self == 0 {
                    return Err(CoreError::InvalidLabel { label: self.to_string() });
                }
                Ok(u64::from(self))
            }
        }
    )*};
}

impl_into_label_signed!(i32, i64);
impl_into_label_unsigned!(u32, u64);

impl IntoLabel for ObjectId {
    fn into_label(self) -> CoreResult<u64> {
        self.as_u64().into_label()
    }
}

impl<T: IntoLabel + Copy> IntoLabel for &T {
    fn into_label(self) -> CoreResult<u64> {
        (*self).into_label()
    }
}

/// An immutable, sorted, duplicate-free set of labels
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LabelSet(Vec<u64>);

impl LabelSet {
    /// Build a label set from any collection of label-like values.
    ///
    /// The result is sorted ascending with duplicates removed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidLabel`] if any element is not positive
    pub fn new<I>(labels: I) -> CoreResult<Self>
    where
        I: IntoIterator,
        I::Item: IntoLabel,
    {
        let mut labels = labels
            .into_iter()
            .map(IntoLabel::into_label)
            .collect::<CoreResult<Vec<_>>>()?;
        labels.sort_unstable();
        labels.dedup();
        Ok(Self(labels))
    }

    /// The empty label set
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Parse a `{1,2,3}` literal, the format used for `int[]` columns.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedLabelSet`] if the literal does not have
    /// the expected shape, or [`CoreError::InvalidLabel`] if it contains zero
    pub fn parse(literal: &str) -> CoreResult<Self> {
        let malformed = || CoreError::MalformedLabelSet {
            literal: literal.to_string(),
        };
        let body = literal
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(malformed)?;
        if body.is_empty() {
            return Ok(Self::empty());
        }
        if !body.bytes().all(|b| b.is_ascii_digit() || b == b',') {
            return Err(malformed());
        }
        let labels = body
            .split(',')
            .map(|part| part.parse::<u64>().map_err(|_| malformed()))
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(labels)
    }

    /// Check membership. Values which are not valid labels are never members.
    pub fn contains(&self, label: impl IntoLabel) -> bool {
        label
            .into_label()
            .is_ok_and(|label| self.0.binary_search(&label).is_ok())
    }

    /// True iff `other` is non-empty and every member of `other` is in this set
    #[must_use]
    pub fn contains_all(&self, other: &LabelSet) -> bool {
        !other.is_empty() && other.0.iter().all(|label| self.0.binary_search(label).is_ok())
    }

    /// True iff the two sets share at least one label
    #[must_use]
    pub fn intersects(&self, other: &LabelSet) -> bool {
        let (mut a, mut b) = (self.0.iter().peekable(), other.0.iter().peekable());
        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            match x.cmp(y) {
                std::cmp::Ordering::Less => {
                    a.next();
                }
                std::cmp::Ordering::Greater => {
                    b.next();
                }
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Set union
    #[must_use]
    pub fn union(&self, other: &LabelSet) -> LabelSet {
        if other.is_empty() {
            return self.clone();
        }
        let mut labels = Vec::with_capacity(self.len() + other.len());
        labels.extend_from_slice(&self.0);
        labels.extend_from_slice(&other.0);
        labels.sort_unstable();
        labels.dedup();
        Self(labels)
    }

    /// Set difference: members of this set not in `other`
    #[must_use]
    pub fn difference(&self, other: &LabelSet) -> LabelSet {
        if other.is_empty() {
            return self.clone();
        }
        Self(
            self.0
                .iter()
                .copied()
                .filter(|label| other.0.binary_search(label).is_err())
                .collect(),
        )
    }

    /// Number of labels
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label at a position in ascending order
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u64> {
        self.0.get(index).copied()
    }

    /// Iterate over labels in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    /// Labels as a sorted slice
    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    /// Render as a `{1,2,3}` literal
    #[must_use]
    pub fn to_literal(&self) -> String {
        let body = self
            .0
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{}}}", body)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

impl std::str::FromStr for LabelSet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a u64;
    type IntoIter = std::slice::Iter<'a, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<LabelSet> for Vec<u64> {
    fn from(set: LabelSet) -> Self {
        set.0
    }
}

impl Serialize for LabelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LabelSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        Self::parse(&literal).map_err(serde::de::Error::custom)
    }
}

/// A change to a label set: labels to add and labels to remove.
///
/// Removal wins when a label appears in both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelDelta {
    add: LabelSet,
    remove: LabelSet,
}

impl LabelDelta {
    /// Create a delta from explicit add and remove sets
    #[must_use]
    pub fn new(add: LabelSet, remove: LabelSet) -> Self {
        Self { add, remove }
    }

    /// A delta which changes nothing
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            add: LabelSet::empty(),
            remove: LabelSet::empty(),
        }
    }

    /// The delta which turns `from` into `to`
    #[must_use]
    pub fn changing(from: &LabelSet, to: &LabelSet) -> Self {
        Self {
            add: to.difference(from),
            remove: from.difference(to),
        }
    }

    /// Also add these labels
    #[must_use]
    pub fn adding(mut self, labels: &LabelSet) -> Self {
        self.add = self.add.union(labels);
        self
    }

    /// Also remove these labels
    #[must_use]
    pub fn removing(mut self, labels: &LabelSet) -> Self {
        self.remove = self.remove.union(labels);
        self
    }

    /// Labels this delta adds
    #[must_use]
    pub const fn add(&self) -> &LabelSet {
        &self.add
    }

    /// Labels this delta removes
    #[must_use]
    pub const fn remove(&self) -> &LabelSet {
        &self.remove
    }

    /// True if the delta neither adds nor removes anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Whether applying this delta adds the label
    pub fn will_add(&self, label: impl IntoLabel) -> bool {
        self.add.contains(label)
    }

    /// Whether applying this delta removes the label
    pub fn will_remove(&self, label: impl IntoLabel) -> bool {
        self.remove.contains(label)
    }

    /// Apply to a label set: `(labels ∪ add) − remove`
    #[must_use]
    pub fn apply(&self, labels: &LabelSet) -> LabelSet {
        labels.union(&self.add).difference(&self.remove)
    }

    /// Equivalent SQL expression over an `int[]` column, using the intarray
    /// `+`, `-`, `sort_asc` and `uniq` operators. An empty delta yields the
    /// column name unchanged.
    #[must_use]
    pub fn sql_expression(&self, column: &str) -> String {
        if self.is_empty() {
            return column.to_string();
        }
        let mut expression = column.to_string();
        if !self.add.is_empty() {
            expression = format!("(({})+'{}'::int[])", expression, self.add.to_literal());
        }
        if !self.remove.is_empty() {
            expression = format!("(({})-'{}'::int[])", expression, self.remove.to_literal());
        }
        format!("uniq(sort_asc({}))", expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn labels(values: &[u64]) -> LabelSet {
        LabelSet::new(values.iter().copied()).unwrap()
    }

    #[test]
    fn test_new_sorts_and_dedups() {
        let set = LabelSet::new([8i64, 3, 8, 1]).unwrap();
        assert_eq!(set.as_slice(), &[1, 3, 8]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0), Some(1));
        assert_eq!(set.get(3), None);
    }

    #[test]
    fn test_new_rejects_non_positive() {
        assert_eq!(
            LabelSet::new([1i64, 0]),
            Err(CoreError::InvalidLabel {
                label: "0".to_string()
            })
        );
        assert!(LabelSet::new([-4i32]).is_err());
        assert!(LabelSet::new([ObjectId::from_raw(0)]).is_err());
        assert!(LabelSet::new([ObjectId::from_raw(1200)]).is_ok());
    }

    #[test]
    fn test_contains() {
        let set = labels(&[2, 4, 6]);
        assert!(set.contains(4u64));
        assert!(set.contains(4i64));
        assert!(!set.contains(5u64));
        assert!(!set.contains(-4i64));
        assert!(!set.contains(0u64));
    }

    #[test]
    fn test_contains_all() {
        let set = labels(&[1, 2, 3, 4]);
        assert!(set.contains_all(&labels(&[2, 4])));
        assert!(!set.contains_all(&labels(&[2, 5])));
        assert!(!set.contains_all(&LabelSet::empty()));
        assert!(!LabelSet::empty().contains_all(&LabelSet::empty()));
    }

    #[test]
    fn test_union_and_difference() {
        let a = labels(&[1, 3, 5]);
        let b = labels(&[2, 3, 4]);
        assert_eq!(a.union(&b), labels(&[1, 2, 3, 4, 5]));
        assert_eq!(a.difference(&b), labels(&[1, 5]));
        assert_eq!(b.difference(&a), labels(&[2, 4]));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&labels(&[2, 4])));
        assert!(!a.intersects(&LabelSet::empty()));
    }

    #[test]
    fn test_literal() {
        assert_eq!(LabelSet::empty().to_literal(), "{}");
        assert_eq!(labels(&[10, 2]).to_literal(), "{2,10}");
        assert_eq!(LabelSet::parse("{88,3}").unwrap(), labels(&[3, 88]));
        assert_eq!(LabelSet::parse("{}").unwrap(), LabelSet::empty());
    }

    #[test]
    fn test_malformed_literals() {
        for literal in ["", "1,2", "{1,2", "{1, 2}", "{a}", "{1,,2}", "{-1}", "[1]"] {
            assert!(
                matches!(
                    LabelSet::parse(literal),
                    Err(CoreError::MalformedLabelSet { .. })
                ),
                "{literal} should be malformed"
            );
        }
        assert!(matches!(
            LabelSet::parse("{0}"),
            Err(CoreError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn test_serde_uses_literal() {
        let set = labels(&[5, 1]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "\"{1,5}\"");
        let back: LabelSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert!(serde_json::from_str::<LabelSet>("\"1,5\"").is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(labels(&[1, 2]) < labels(&[1, 3]));
        assert!(labels(&[1]) < labels(&[1, 2]));
        assert!(LabelSet::empty() < labels(&[1]));
    }

    #[test]
    fn test_delta_apply() {
        let delta = LabelDelta::new(labels(&[7, 8]), labels(&[1]));
        assert_eq!(delta.apply(&labels(&[1, 2])), labels(&[2, 7, 8]));
        assert!(delta.will_add(7u64));
        assert!(delta.will_remove(1u64));
        assert!(!delta.will_remove(2u64));
    }

    #[test]
    fn test_delta_removal_wins() {
        let delta = LabelDelta::empty()
            .adding(&labels(&[4]))
            .removing(&labels(&[4]));
        assert_eq!(delta.apply(&labels(&[1])), labels(&[1]));
        assert_eq!(delta.apply(&labels(&[1, 4])), labels(&[1]));
    }

    #[test]
    fn test_delta_changing() {
        let from = labels(&[1, 2, 3]);
        let to = labels(&[3, 4]);
        let delta = LabelDelta::changing(&from, &to);
        assert_eq!(delta.add(), &labels(&[4]));
        assert_eq!(delta.remove(), &labels(&[1, 2]));
        assert_eq!(delta.apply(&from), to);
        assert!(LabelDelta::changing(&from, &from).is_empty());
    }

    #[test]
    fn test_delta_sql_expression() {
        assert_eq!(LabelDelta::empty().sql_expression("labels"), "labels");
        assert_eq!(
            LabelDelta::empty()
                .adding(&labels(&[1, 2]))
                .removing(&labels(&[5, 6]))
                .sql_expression("labels"),
            "uniq(sort_asc(((((labels)+'{1,2}'::int[]))-'{5,6}'::int[])))"
        );
        assert_eq!(
            LabelDelta::empty()
                .adding(&labels(&[10, 11]))
                .sql_expression("labels"),
            "uniq(sort_asc(((labels)+'{10,11}'::int[])))"
        );
        assert_eq!(
            LabelDelta::empty()
                .removing(&labels(&[4, 5]))
                .sql_expression("labels"),
            "uniq(sort_asc(((labels)-'{4,5}'::int[])))"
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_new_is_sorted_unique(values in proptest::collection::vec(1u64..500, 0..40)) {
            let set = LabelSet::new(values.iter().copied()).unwrap();
            let slice = set.as_slice();
            prop_assert!(slice.windows(2).all(|w| w[0] < w[1]));
            for v in &values {
                prop_assert!(set.contains(*v));
            }
        }

        #[test]
        fn prop_literal_parses_back(values in proptest::collection::vec(1u64..u64::MAX, 0..20)) {
            let set = LabelSet::new(values).unwrap();
            prop_assert_eq!(LabelSet::parse(&set.to_literal()).unwrap(), set);
        }

        #[test]
        fn prop_union_difference_membership(
            a in proptest::collection::vec(1u64..60, 0..20),
            b in proptest::collection::vec(1u64..60, 0..20),
        ) {
            let a = LabelSet::new(a).unwrap();
            let b = LabelSet::new(b).unwrap();
            let union = a.union(&b);
            let diff = a.difference(&b);
            for label in 1u64..60 {
                prop_assert_eq!(union.contains(label), a.contains(label) || b.contains(label));
                prop_assert_eq!(diff.contains(label), a.contains(label) && !b.contains(label));
            }
            prop_assert_eq!(a.intersects(&b), a.iter().any(|l| b.contains(l)));
        }

        #[test]
        fn prop_changing_reaches_target(
            from in proptest::collection::vec(1u64..40, 0..15),
            to in proptest::collection::vec(1u64..40, 0..15),
        ) {
            let from = LabelSet::new(from).unwrap();
            let to = LabelSet::new(to).unwrap();
            prop_assert_eq!(LabelDelta::changing(&from, &to).apply(&from), to);
        }
    }
}
