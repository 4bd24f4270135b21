//! Permission statements.
//!
//! A statement answers whether an operation is permitted against a label
//! set, and compiles the same answer into a SQL predicate over an `int[]`
//! labels column.
//!
//! Explicit statements hold an allow list and a deny list per operation. An
//! operation is allowed when the labels touch the allow list and miss the
//! deny list; denial always wins. Statements compose with [`Combinator`]s.

use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use vellum_core::{CoreError, CoreResult, IntoLabel, LabelSet};

/// Allow and deny lists for one operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// Labels which grant the operation
    pub allow: LabelSet,
    /// Labels which forbid the operation, overriding `allow`
    pub deny: LabelSet,
}

impl Rule {
    fn allows(&self, labels: &LabelSet) -> bool {
        labels.intersects(&self.allow) && !labels.intersects(&self.deny)
    }

    fn condition(&self, column: &str, excludes: Option<&LabelSet>) -> String {
        if self.allow.is_empty() {
            return "FALSE".to_string();
        }
        let deny = match excludes {
            Some(excludes) => self.deny.union(excludes),
            None => self.deny.clone(),
        };
        if deny.is_empty() {
            format!("({column} && '{}'::int[])", self.allow.to_literal())
        } else {
            format!(
                "(({column} && '{}'::int[]) AND NOT ({column} && '{}'::int[]))",
                self.allow.to_literal(),
                deny.to_literal()
            )
        }
    }
}

/// Per-operation allow/deny rules, sealed once complete
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExplicitStatement {
    rules: BTreeMap<Operation, Rule>,
    sealed: bool,
}

impl ExplicitStatement {
    /// Create an empty, unsealed statement
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for an operation, replacing any earlier rule
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StatementSealed`] once the statement is sealed
    pub fn statement(
        &mut self,
        operation: Operation,
        allow: LabelSet,
        deny: LabelSet,
    ) -> CoreResult<&mut Self> {
        if self.sealed {
            return Err(CoreError::StatementSealed);
        }
        self.rules.insert(operation, Rule { allow, deny });
        Ok(self)
    }

    /// Builder form of [`statement`](Self::statement)
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StatementSealed`] once the statement is sealed
    pub fn with_statement(
        mut self,
        operation: Operation,
        allow: LabelSet,
        deny: LabelSet,
    ) -> CoreResult<Self> {
        self.statement(operation, allow, deny)?;
        Ok(self)
    }

    /// Refuse any further rules
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Check if sealed
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Rule for an operation, if one was given
    #[must_use]
    pub fn rule(&self, operation: &Operation) -> Option<&Rule> {
        self.rules.get(operation)
    }

    /// Operations which have rules
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.rules.keys()
    }

    /// Whether the operation is allowed on objects carrying `labels`
    #[must_use]
    pub fn allow(&self, operation: &Operation, labels: &LabelSet) -> bool {
        self.rule(operation).is_some_and(|rule| rule.allows(labels))
    }

    /// Whether the label is in the allow list and not in the deny list
    pub fn label_is_allowed(&self, operation: &Operation, label: impl IntoLabel) -> bool {
        label.into_label().is_ok_and(|label| {
            self.rule(operation)
                .is_some_and(|rule| rule.allow.contains(label) && !rule.deny.contains(label))
        })
    }

    /// Whether the label is in the deny list
    pub fn label_is_denied(&self, operation: &Operation, label: impl IntoLabel) -> bool {
        label.into_label().is_ok_and(|label| {
            self.rule(operation)
                .is_some_and(|rule| rule.deny.contains(label))
        })
    }

    /// Whether any label at all grants the operation
    #[must_use]
    pub fn something_allowed(&self, operation: &Operation) -> bool {
        self.rule(operation)
            .is_some_and(|rule| !rule.allow.is_empty())
    }

    /// SQL predicate equivalent to [`allow`](Self::allow)
    #[must_use]
    pub fn sql_condition(
        &self,
        operation: &Operation,
        column: &str,
        excludes: Option<&LabelSet>,
    ) -> String {
        match self.rule(operation) {
            Some(rule) => rule.condition(column, excludes),
            None => "FALSE".to_string(),
        }
    }
}

/// How two statements combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// Both statements must agree
    And,
    /// Either statement suffices
    Or,
}

/// Unknown combinator name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown statement combinator: {0}")]
pub struct ParseCombinatorError(pub String);

impl FromStr for Combinator {
    type Err = ParseCombinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(ParseCombinatorError(other.to_string())),
        }
    }
}

/// A permission statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionStatement {
    /// Per-operation allow/deny lists
    Explicit(ExplicitStatement),
    /// Everything is allowed
    SuperUser,
    /// Both children must allow
    And(Box<PermissionStatement>, Box<PermissionStatement>),
    /// Either child may allow
    Or(Box<PermissionStatement>, Box<PermissionStatement>),
}

impl PermissionStatement {
    /// Wrap an explicit statement, sealing it
    #[must_use]
    pub fn explicit(mut statement: ExplicitStatement) -> Self {
        statement.seal();
        Self::Explicit(statement)
    }

    /// A statement which allows nothing
    #[must_use]
    pub fn deny_all() -> Self {
        Self::explicit(ExplicitStatement::new())
    }

    /// Combine two statements
    #[must_use]
    pub fn combine(a: Self, b: Self, combinator: Combinator) -> Self {
        match combinator {
            Combinator::And => Self::And(Box::new(a), Box::new(b)),
            Combinator::Or => Self::Or(Box::new(a), Box::new(b)),
        }
    }

    /// Whether the operation is allowed on objects carrying `labels`
    #[must_use]
    pub fn allow(&self, operation: &Operation, labels: &LabelSet) -> bool {
        match self {
            Self::Explicit(statement) => statement.allow(operation, labels),
            Self::SuperUser => true,
            Self::And(a, b) => a.allow(operation, labels) && b.allow(operation, labels),
            Self::Or(a, b) => a.allow(operation, labels) || b.allow(operation, labels),
        }
    }

    /// Whether the single label grants the operation.
    ///
    /// Values which are not valid labels are never allowed.
    pub fn label_is_allowed(&self, operation: &Operation, label: impl IntoLabel) -> bool {
        label
            .into_label()
            .is_ok_and(|label| self.label_allowed(operation, label))
    }

    fn label_allowed(&self, operation: &Operation, label: u64) -> bool {
        match self {
            Self::Explicit(statement) => statement.label_is_allowed(operation, label),
            Self::SuperUser => true,
            Self::And(a, b) => {
                a.label_allowed(operation, label) && b.label_allowed(operation, label)
            }
            Self::Or(a, b) => {
                a.label_allowed(operation, label) || b.label_allowed(operation, label)
            }
        }
    }

    /// Whether the single label forbids the operation
    pub fn label_is_denied(&self, operation: &Operation, label: impl IntoLabel) -> bool {
        label
            .into_label()
            .is_ok_and(|label| self.label_denied(operation, label))
    }

    fn label_denied(&self, operation: &Operation, label: u64) -> bool {
        match self {
            Self::Explicit(statement) => statement.label_is_denied(operation, label),
            Self::SuperUser => false,
            Self::And(a, b) => a.label_denied(operation, label) && b.label_denied(operation, label),
            Self::Or(a, b) => a.label_denied(operation, label) || b.label_denied(operation, label),
        }
    }

    /// Whether any label at all grants the operation
    #[must_use]
    pub fn something_allowed(&self, operation: &Operation) -> bool {
        match self {
            Self::Explicit(statement) => statement.something_allowed(operation),
            Self::SuperUser => true,
            Self::And(a, b) => a.something_allowed(operation) && b.something_allowed(operation),
            Self::Or(a, b) => a.something_allowed(operation) || b.something_allowed(operation),
        }
    }

    /// True only for the superuser statement itself
    #[must_use]
    pub const fn is_superuser(&self) -> bool {
        matches!(self, Self::SuperUser)
    }

    /// SQL predicate over `column` equivalent to [`allow`](Self::allow).
    ///
    /// Labels in `excludes` are treated as extra deny labels.
    #[must_use]
    pub fn sql_condition(
        &self,
        operation: &Operation,
        column: &str,
        excludes: Option<&LabelSet>,
    ) -> String {
        match self {
            Self::Explicit(statement) => statement.sql_condition(operation, column, excludes),
            Self::SuperUser => match excludes {
                Some(excludes) => {
                    format!("(NOT ({column} && '{}'::int[]))", excludes.to_literal())
                }
                None => "TRUE".to_string(),
            },
            Self::And(a, b) => format!(
                "({} AND {})",
                a.sql_condition(operation, column, excludes),
                b.sql_condition(operation, column, excludes)
            ),
            Self::Or(a, b) => format!(
                "({} OR {})",
                a.sql_condition(operation, column, excludes),
                b.sql_condition(operation, column, excludes)
            ),
        }
    }

    /// Serializable summary for display
    #[must_use]
    pub fn describe(&self) -> StatementSummary {
        match self {
            Self::Explicit(statement) => StatementSummary::Explicit {
                rules: statement.rules.clone(),
            },
            Self::SuperUser => StatementSummary::SuperUser,
            Self::And(a, b) => StatementSummary::And {
                left: Box::new(a.describe()),
                right: Box::new(b.describe()),
            },
            Self::Or(a, b) => StatementSummary::Or {
                left: Box::new(a.describe()),
                right: Box::new(b.describe()),
            },
        }
    }
}

impl From<ExplicitStatement> for PermissionStatement {
    fn from(statement: ExplicitStatement) -> Self {
        Self::explicit(statement)
    }
}

/// Display form of a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementSummary {
    /// Explicit rules by operation
    Explicit {
        /// Rules by operation
        rules: BTreeMap<Operation, Rule>,
    },
    /// Superuser
    SuperUser,
    /// Conjunction
    And {
        /// Left child
        left: Box<StatementSummary>,
        /// Right child
        right: Box<StatementSummary>,
    },
    /// Disjunction
    Or {
        /// Left child
        left: Box<StatementSummary>,
        /// Right child
        right: Box<StatementSummary>,
    },
}
