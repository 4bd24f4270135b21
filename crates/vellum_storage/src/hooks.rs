//! Extension points consulted by the store.
//!
//! Hooks are trait objects injected through [`StoreHooks`]. Every hook has a
//! no-op default, and plain closures implement the single-method traits.

use crate::object::{ObjectDraft, StoredObject};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use vellum_core::{LabelDelta, LabelSet, ObjectId, UserId};
use vellum_policy::Operation;

/// What the permission override decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Let the operation proceed
    Allow,
    /// Keep the denial
    Deny,
}

/// A permission check the active statement refused
#[derive(Debug, Clone, Copy)]
pub struct PermissionCheck<'a> {
    /// Acting user
    pub user: UserId,
    /// Operation being attempted
    pub operation: &'a Operation,
    /// Object concerned; `None` for a create without a chosen ID
    pub object: Option<ObjectId>,
    /// Labels the check was made against
    pub labels: &'a LabelSet,
}

/// Kind of committed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Version 1 written
    Create,
    /// New version written
    Update,
    /// Labels changed in place
    Relabel,
    /// Deleted label added
    Delete,
    /// Deleted label removed
    Undelete,
    /// Object and history removed
    Erase,
    /// History removed
    EraseHistory,
}

/// Computes labels to apply to new objects before the create check
pub trait LabelDefaulter: Send + Sync {
    /// Labels to add to or remove from the draft's labels
    fn compute_default_labels(&self, draft: &ObjectDraft) -> LabelDelta;
}

/// Second opinion on denied permission checks
pub trait PermissionOverride: Send + Sync {
    /// `Some(Verdict::Allow)` overrides the denial
    fn on_permission_denied(&self, check: &PermissionCheck<'_>) -> Option<Verdict>;
}

/// Notified after each committed mutation
pub trait ChangeListener: Send + Sync {
    /// Called once per committed change, before the store call returns
    fn on_object_changed(
        &self,
        object: &StoredObject,
        kind: ChangeKind,
        previous: Option<&StoredObject>,
    );
}

/// Labels a user holds for lifting attribute restrictions
pub trait RestrictionLabels: Send + Sync {
    /// Restriction-lifting labels of the user
    fn restriction_labels(&self, user: UserId) -> LabelSet;
}

/// Hook implementation that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl LabelDefaulter for NoHooks {
    fn compute_default_labels(&self, _draft: &ObjectDraft) -> LabelDelta {
        LabelDelta::empty()
    }
}

impl PermissionOverride for NoHooks {
    fn on_permission_denied(&self, _check: &PermissionCheck<'_>) -> Option<Verdict> {
        None
    }
}

impl ChangeListener for NoHooks {
    fn on_object_changed(&self, _: &StoredObject, _: ChangeKind, _: Option<&StoredObject>) {}
}

impl RestrictionLabels for NoHooks {
    fn restriction_labels(&self, _user: UserId) -> LabelSet {
        LabelSet::empty()
    }
}

impl<F> LabelDefaulter for F
where
    F: Fn(&ObjectDraft) -> LabelDelta + Send + Sync,
{
    fn compute_default_labels(&self, draft: &ObjectDraft) -> LabelDelta {
        self(draft)
    }
}

impl<F> PermissionOverride for F
where
    F: Fn(&PermissionCheck<'_>) -> Option<Verdict> + Send + Sync,
{
    fn on_permission_denied(&self, check: &PermissionCheck<'_>) -> Option<Verdict> {
        self(check)
    }
}

impl<F> ChangeListener for F
where
    F: Fn(&StoredObject, ChangeKind, Option<&StoredObject>) + Send + Sync,
{
    fn on_object_changed(
        &self,
        object: &StoredObject,
        kind: ChangeKind,
        previous: Option<&StoredObject>,
    ) {
        self(object, kind, previous);
    }
}

impl<F> RestrictionLabels for F
where
    F: Fn(UserId) -> LabelSet + Send + Sync,
{
    fn restriction_labels(&self, user: UserId) -> LabelSet {
        self(user)
    }
}

/// The hooks a store consults
#[derive(Clone)]
pub struct StoreHooks {
    defaulter: Arc<dyn LabelDefaulter>,
    permission_override: Arc<dyn PermissionOverride>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    restriction_labels: Arc<dyn RestrictionLabels>,
}

impl StoreHooks {
    /// No-op hooks
    #[must_use]
    pub fn new() -> Self {
        Self {
            defaulter: Arc::new(NoHooks),
            permission_override: Arc::new(NoHooks),
            listeners: Vec::new(),
            restriction_labels: Arc::new(NoHooks),
        }
    }

    /// Set the default label computation
    #[must_use]
    pub fn with_label_defaulter(mut self, defaulter: impl LabelDefaulter + 'static) -> Self {
        self.defaulter = Arc::new(defaulter);
        self
    }

    /// Set the permission override
    #[must_use]
    pub fn with_permission_override(mut self, hook: impl PermissionOverride + 'static) -> Self {
        self.permission_override = Arc::new(hook);
        self
    }

    /// Add a change listener
    #[must_use]
    pub fn with_listener(mut self, listener: impl ChangeListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Set the restriction label lookup
    #[must_use]
    pub fn with_restriction_labels(mut self, hook: impl RestrictionLabels + 'static) -> Self {
        self.restriction_labels = Arc::new(hook);
        self
    }

    pub(crate) fn default_labels(&self, draft: &ObjectDraft) -> LabelDelta {
        self.defaulter.compute_default_labels(draft)
    }

    pub(crate) fn override_denial(&self, check: &PermissionCheck<'_>) -> bool {
        self.permission_override.on_permission_denied(check) == Some(Verdict::Allow)
    }

    pub(crate) fn notify(
        &self,
        object: &StoredObject,
        kind: ChangeKind,
        previous: Option<&StoredObject>,
    ) {
        for listener in &self.listeners {
            listener.on_object_changed(object, kind, previous);
        }
    }

    pub(crate) fn user_restriction_labels(&self, user: UserId) -> LabelSet {
        self.restriction_labels.restriction_labels(user)
    }
}

impl Default for StoreHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StoreHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHooks")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
