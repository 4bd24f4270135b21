//! The acting user and their permission statement.

use crate::operation::Operation;
use crate::statement::PermissionStatement;
use std::sync::Arc;
use vellum_core::{LabelSet, UserId};

/// The user on whose behalf store operations run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user: UserId,
    statement: Arc<PermissionStatement>,
}

impl Principal {
    /// Create a principal
    #[must_use]
    pub fn new(user: UserId, statement: impl Into<Arc<PermissionStatement>>) -> Self {
        Self {
            user,
            statement: statement.into(),
        }
    }

    /// A principal holding the superuser statement
    #[must_use]
    pub fn superuser(user: UserId) -> Self {
        Self::new(user, PermissionStatement::SuperUser)
    }

    /// Acting user
    #[must_use]
    pub const fn user(&self) -> UserId {
        self.user
    }

    /// Active statement
    #[must_use]
    pub fn statement(&self) -> &PermissionStatement {
        &self.statement
    }

    /// Check if the active statement is the superuser statement
    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.statement.is_superuser()
    }

    /// Whether the operation is allowed on objects carrying `labels`
    #[must_use]
    pub fn allows(&self, operation: &Operation, labels: &LabelSet) -> bool {
        self.statement.allow(operation, labels)
    }

    /// SQL predicate restricting a query to readable rows
    #[must_use]
    pub fn read_filter(&self, column: &str, excludes: Option<&LabelSet>) -> String {
        self.statement.sql_condition(&Operation::READ, column, excludes)
    }
}
