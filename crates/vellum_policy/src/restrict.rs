//! Attribute restrictions.
//!
//! A restriction rule hides attributes, or makes them read-only, on objects
//! carrying any of its labels. Users holding one of the rule's lifting
//! labels are exempt.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use vellum_core::LabelSet;

/// One restriction rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionRule {
    /// Rule name
    pub name: String,
    /// The rule applies to objects carrying any of these labels
    pub applies_to: LabelSet,
    /// Users holding any of these labels are exempt
    pub lifted_by: LabelSet,
    /// Attributes removed from the object view
    pub hidden: BTreeSet<String>,
    /// Attributes which may not be changed
    pub read_only: BTreeSet<String>,
}

impl RestrictionRule {
    /// Create a rule with no restricted attributes
    #[must_use]
    pub fn new(name: impl Into<String>, applies_to: LabelSet, lifted_by: LabelSet) -> Self {
        Self {
            name: name.into(),
            applies_to,
            lifted_by,
            hidden: BTreeSet::new(),
            read_only: BTreeSet::new(),
        }
    }

    /// Hide an attribute
    #[must_use]
    pub fn hiding(mut self, attribute: impl Into<String>) -> Self {
        self.hidden.insert(attribute.into());
        self
    }

    /// Make an attribute read-only
    #[must_use]
    pub fn read_only(mut self, attribute: impl Into<String>) -> Self {
        self.read_only.insert(attribute.into());
        self
    }

    /// Whether the rule is in force for this object and user
    #[must_use]
    pub fn is_active(&self, object_labels: &LabelSet, user_labels: &LabelSet) -> bool {
        object_labels.intersects(&self.applies_to) && !user_labels.intersects(&self.lifted_by)
    }
}

/// Restricted attributes for one object as seen by one user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeRestrictions {
    /// Hidden attributes
    pub hidden: BTreeSet<String>,
    /// Read-only attributes, not including hidden ones
    pub read_only: BTreeSet<String>,
    /// Names of rules in force
    pub applied_rules: Vec<String>,
}

impl AttributeRestrictions {
    /// Check if any restriction applies
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        !self.hidden.is_empty() || !self.read_only.is_empty()
    }

    /// Check if an attribute is hidden
    #[must_use]
    pub fn is_hidden(&self, attribute: &str) -> bool {
        self.hidden.contains(attribute)
    }

    /// Hidden attributes are read-only too
    #[must_use]
    pub fn is_read_only(&self, attribute: &str) -> bool {
        self.is_hidden(attribute) || self.read_only.contains(attribute)
    }

    /// Copy of the attributes with hidden ones removed
    #[must_use]
    pub fn apply_to(&self, attributes: &Map<String, Value>) -> Map<String, Value> {
        attributes
            .iter()
            .filter(|(name, _)| !self.is_hidden(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Read-only attributes whose values differ between `before` and `after`
    #[must_use]
    pub fn violations(
        &self,
        before: &Map<String, Value>,
        after: &Map<String, Value>,
    ) -> Vec<String> {
        self.hidden
            .iter()
            .chain(self.read_only.iter())
            .filter(|name| before.get(name.as_str()) != after.get(name.as_str()))
            .cloned()
            .collect()
    }
}

/// A set of restriction rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionPolicy {
    rules: Vec<RestrictionRule>,
}

impl RestrictionPolicy {
    /// Create an empty policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule
    #[must_use]
    pub fn with_rule(mut self, rule: RestrictionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules in the policy
    #[must_use]
    pub fn rules(&self) -> &[RestrictionRule] {
        &self.rules
    }

    /// Restrictions for an object carrying `object_labels` as seen by a
    /// user holding `user_labels`
    #[must_use]
    pub fn evaluate(&self, object_labels: &LabelSet, user_labels: &LabelSet) -> AttributeRestrictions {
        let mut restrictions = AttributeRestrictions::default();
        for rule in self
            .rules
            .iter()
            .filter(|rule| rule.is_active(object_labels, user_labels))
        {
            restrictions.hidden.extend(rule.hidden.iter().cloned());
            restrictions.read_only.extend(rule.read_only.iter().cloned());
            restrictions.applied_rules.push(rule.name.clone());
        }
        let hidden = restrictions.hidden.clone();
        restrictions.read_only.retain(|name| !hidden.contains(name));
        restrictions
    }
}
