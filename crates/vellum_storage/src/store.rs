//! The object store.
//!
//! Every operation runs on behalf of a [`Principal`]. The store works out
//! the labels an object will carry, asks the principal's statement whether
//! the operation is allowed (consulting the permission override hook on a
//! denial), and only then writes to the backend, evicts the cache entry and
//! notifies listeners.

use crate::backend::{Backend, MemoryBackend};
use crate::cache::ObjectCache;
use crate::config::StoreConfig;
use crate::history::{HistoryVersion, ObjectHistory, RetiredRecord};
use crate::hooks::{ChangeKind, PermissionCheck, StoreHooks};
use crate::object::{ObjectDraft, ObjectRecord, StoredObject};
use crate::stats::{Counters, StoreStats};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vellum_core::{Clock, CoreError, CoreResult, LabelDelta, LabelSet, ObjectId, SystemClock};
use vellum_policy::{AttributeRestrictions, Operation, Principal, RestrictionPolicy};

/// Versioned, label-gated object store
#[derive(Debug)]
pub struct ObjectStore {
    config: StoreConfig,
    backend: Arc<dyn Backend>,
    cache: ObjectCache,
    hooks: StoreHooks,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl ObjectStore {
    /// Create a store over a backend with default configuration
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let config = StoreConfig::default();
        Self {
            cache: ObjectCache::new(config.max_cache_entries),
            config,
            backend,
            hooks: StoreHooks::default(),
            clock: Arc::new(SystemClock),
            counters: Counters::default(),
        }
    }

    /// Create a store with custom configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn with_config(backend: Arc<dyn Backend>, config: StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            cache: ObjectCache::new(config.max_cache_entries),
            config,
            ..Self::new(backend)
        })
    }

    /// Create a store over a fresh in-memory backend
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Install hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: StoreHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Read cache
    #[must_use]
    pub const fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Operation counters
    #[must_use]
    pub fn statistics(&self) -> StoreStats {
        self.counters.snapshot(self.cache.hits(), self.cache.len())
    }

    /// Reserve an ID without writing a row. Use it with
    /// [`ObjectDraft::with_preallocated_id`].
    ///
    /// # Errors
    ///
    /// Returns error on backend failure
    pub fn preallocate_id(&self) -> CoreResult<ObjectId> {
        self.backend.allocate_id(self.config.reserved_id_threshold)
    }

    /// Store a new object as version 1.
    ///
    /// Labels are the draft's labels with the default-label hook's delta
    /// applied, then `changes`. An empty result gets the unlabelled label.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AlreadyStored`] if the draft came from a stored object
    /// - [`CoreError::InvalidId`] for a reserved, zero or existing ID
    /// - [`CoreError::PermissionDenied`] if `create` is not allowed on the labels
    pub fn create(
        &self,
        principal: &Principal,
        draft: ObjectDraft,
        changes: Option<&LabelDelta>,
        requested_id: Option<ObjectId>,
    ) -> CoreResult<Arc<StoredObject>> {
        Counters::bump(&self.counters.create);
        if draft.version() != 0 {
            return Err(CoreError::AlreadyStored);
        }

        let target = match (requested_id, draft.id()) {
            (Some(requested), Some(preallocated)) if requested != preallocated => {
                return Err(CoreError::InvalidId {
                    reason: format!("draft already carries ID {preallocated}"),
                });
            }
            (Some(requested), _) if requested.as_u64() <= self.config.reserved_id_threshold => {
                return Err(CoreError::InvalidId {
                    reason: format!("ID {requested} is in the reserved range"),
                });
            }
            (Some(requested), _) => Some(requested),
            (None, preallocated) => preallocated,
        };
        if let Some(id) = target {
            if !id.is_valid() {
                return Err(CoreError::InvalidId {
                    reason: "object ID must be positive".to_string(),
                });
            }
            if self.backend.fetch_labels(id)?.is_some() {
                return Err(CoreError::InvalidId {
                    reason: format!("object {id} already exists"),
                });
            }
        }

        let mut labels = self.hooks.default_labels(&draft).apply(draft.labels());
        if let Some(changes) = changes {
            labels = changes.apply(&labels);
        }
        let labels = match self.config.unlabelled_label {
            Some(unlabelled) if labels.is_empty() => LabelSet::new([unlabelled])?,
            _ => labels,
        };
        self.enforce(principal, &Operation::CREATE, target, &labels)?;

        let id = match target {
            Some(id) => id,
            None => self.backend.allocate_id(self.config.reserved_id_threshold)?,
        };
        let now = self.clock.now();
        let user = principal.user();
        let record = ObjectRecord {
            id,
            version: 1,
            labels,
            attributes: draft.into_attributes(),
            created_by: user,
            updated_by: user,
            created_at: now,
            updated_at: now,
        };
        self.backend.insert(&record)?;
        self.cache.evict(id);

        let object = Arc::new(StoredObject::from_record(record));
        info!(%id, %user, labels = %object.labels(), "created object");
        self.hooks.notify(&object, ChangeKind::Create, None);
        Ok(object)
    }

    /// Current version of an object, or `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PermissionDenied`] if `read` is not allowed
    pub fn read(&self, principal: &Principal, id: ObjectId) -> CoreResult<Option<Arc<StoredObject>>> {
        Counters::bump(&self.counters.read);
        let object = match self.cache.get(id) {
            Some(object) => {
                debug!(%id, "object cache hit");
                object
            }
            None => match self.load(id)? {
                Some(object) => object,
                None => {
                    debug!(%id, "object not found");
                    return Ok(None);
                }
            },
        };
        self.enforce(principal, &Operation::READ, Some(id), object.labels())?;
        Ok(Some(object))
    }

    /// Like [`read`](Self::read), but a permission denial reads as `None`
    ///
    /// # Errors
    ///
    /// Returns error on backend failure
    pub fn read_if_permitted(
        &self,
        principal: &Principal,
        id: ObjectId,
    ) -> CoreResult<Option<Arc<StoredObject>>> {
        match self.read(principal, id) {
            Err(CoreError::PermissionDenied { .. }) => Ok(None),
            other => other,
        }
    }

    /// Current labels of an object without any permission check
    ///
    /// # Errors
    ///
    /// Returns error on backend failure
    pub fn labels_for(&self, id: ObjectId) -> CoreResult<Option<LabelSet>> {
        if let Some(object) = self.cache.get(id) {
            return Ok(Some(object.labels().clone()));
        }
        self.backend.fetch_labels(id)
    }

    /// Write a new version from a draft taken from the current version.
    ///
    /// The draft's own labels are ignored; `changes` is applied to the stored
    /// labels instead.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the object does not exist
    /// - [`CoreError::PermissionDenied`] if `update` is not allowed on the
    ///   current labels, or, when the labels change, `relabel` on the
    ///   current labels or `create` on the new ones
    /// - [`CoreError::StaleVersion`] if the draft is not based on the current version
    /// - [`CoreError::ConcurrentModification`] if the labels changed while
    ///   the update was in flight
    pub fn update(
        &self,
        principal: &Principal,
        draft: ObjectDraft,
        changes: Option<&LabelDelta>,
    ) -> CoreResult<Arc<StoredObject>> {
        Counters::bump(&self.counters.update);
        let id = draft
            .id()
            .ok_or_else(|| CoreError::not_found("Object", "draft without ID"))?;
        let previous = self
            .backend
            .fetch(id)?
            .ok_or_else(|| CoreError::not_found("Object", id))?;
        self.enforce(principal, &Operation::UPDATE, Some(id), &previous.labels)?;
        if draft.version() != previous.version {
            return Err(CoreError::StaleVersion {
                expected: draft.version(),
                actual: previous.version,
            });
        }

        let labels = match changes {
            Some(changes) => changes.apply(&previous.labels),
            None => previous.labels.clone(),
        };
        if labels != previous.labels {
            self.enforce(principal, &Operation::RELABEL, Some(id), &previous.labels)?;
            self.enforce(principal, &Operation::CREATE, Some(id), &labels)?;
        }

        let now = self.clock.now();
        let user = principal.user();
        let record = ObjectRecord {
            id,
            version: previous.version + 1,
            labels,
            attributes: draft.into_attributes(),
            created_by: previous.created_by,
            updated_by: user,
            created_at: previous.created_at,
            updated_at: now,
        };
        let retired = RetiredRecord {
            record: previous,
            retired_at: now,
            retired_by: user,
        };
        let result = self.backend.replace(&record, &retired);
        self.cache.evict(id);
        result?;

        let object = Arc::new(StoredObject::from_record(record));
        let previous = StoredObject::from_record(retired.record);
        info!(%id, %user, version = object.version(), "updated object");
        self.hooks.notify(&object, ChangeKind::Update, Some(&previous));
        Ok(object)
    }

    /// Change an object's labels in place. The version is unchanged and no
    /// history is written.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the object does not exist
    /// - [`CoreError::PermissionDenied`] if `relabel` is not allowed on the
    ///   current labels, or `create` on the resulting labels
    pub fn relabel(
        &self,
        principal: &Principal,
        id: impl Into<ObjectId>,
        changes: &LabelDelta,
    ) -> CoreResult<Arc<StoredObject>> {
        Counters::bump(&self.counters.relabel);
        let id = id.into();
        let current = self.fetch_current(id)?;
        self.enforce(principal, &Operation::RELABEL, Some(id), current.labels())?;
        if changes.is_empty() {
            self.cache.evict(id);
            return Ok(Arc::new(current));
        }
        self.enforce(principal, &Operation::CREATE, Some(id), &changes.apply(current.labels()))?;
        self.commit_relabel(principal, &current, changes, ChangeKind::Relabel)
    }

    /// Mark an object deleted by adding the deleted label
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the object does not exist
    /// - [`CoreError::PermissionDenied`] if `delete` is not allowed
    pub fn delete(&self, principal: &Principal, id: impl Into<ObjectId>) -> CoreResult<Arc<StoredObject>> {
        Counters::bump(&self.counters.delete);
        let id = id.into();
        let current = self.fetch_current(id)?;
        self.enforce(principal, &Operation::DELETE, Some(id), current.labels())?;
        let changes = LabelDelta::empty().adding(&self.config.deleted_labels()?);
        self.commit_relabel(principal, &current, &changes, ChangeKind::Delete)
    }

    /// Remove the deleted label
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the object does not exist
    /// - [`CoreError::PermissionDenied`] if the undelete operation is not allowed
    pub fn undelete(&self, principal: &Principal, id: impl Into<ObjectId>) -> CoreResult<Arc<StoredObject>> {
        Counters::bump(&self.counters.delete);
        let id = id.into();
        let current = self.fetch_current(id)?;
        self.enforce(principal, &self.config.undelete_operation, Some(id), current.labels())?;
        let changes = LabelDelta::empty().removing(&self.config.deleted_labels()?);
        self.commit_relabel(principal, &current, &changes, ChangeKind::Undelete)
    }

    /// Physically remove an object and its history
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the object does not exist
    /// - [`CoreError::PermissionDenied`] if the erase gate refuses
    pub fn erase(&self, principal: &Principal, id: impl Into<ObjectId>) -> CoreResult<()> {
        Counters::bump(&self.counters.erase);
        let id = id.into();
        let current = self.fetch_current(id)?;
        self.enforce_erase(principal, id, current.labels())?;
        let result = self.backend.remove(id);
        self.cache.evict(id);
        if !result? {
            return Err(CoreError::not_found("Object", id));
        }
        info!(%id, user = %principal.user(), "erased object");
        self.hooks.notify(&current, ChangeKind::Erase, Some(&current));
        Ok(())
    }

    /// Remove the retired versions of an object, returning how many went
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the object does not exist
    /// - [`CoreError::PermissionDenied`] if the erase gate refuses
    pub fn erase_history(&self, principal: &Principal, id: impl Into<ObjectId>) -> CoreResult<usize> {
        Counters::bump(&self.counters.erase);
        let id = id.into();
        let current = self.fetch_current(id)?;
        self.enforce_erase(principal, id, current.labels())?;
        let result = self.backend.remove_history(id);
        self.cache.evict(id);
        let removed = result?;
        info!(%id, user = %principal.user(), removed, "erased object history");
        self.hooks.notify(&current, ChangeKind::EraseHistory, None);
        Ok(removed)
    }

    /// Current version plus the retired versions the principal may read.
    /// `None` if the object does not exist.
    ///
    /// Retired versions are filtered by the principal's statement alone. The
    /// permission override hook is not consulted for them, so a version the
    /// hook lets [`read_version`](Self::read_version) return can still be
    /// missing here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PermissionDenied`] if the current version is unreadable
    pub fn history(&self, principal: &Principal, id: ObjectId) -> CoreResult<Option<ObjectHistory>> {
        let Some(object) = self.read(principal, id)? else {
            return Ok(None);
        };
        let versions = self
            .backend
            .history(id)?
            .into_iter()
            .filter(|retired| principal.allows(&Operation::READ, &retired.record.labels))
            .map(HistoryVersion::from)
            .collect();
        Ok(Some(ObjectHistory { object, versions }))
    }

    /// A specific version of an object
    ///
    /// # Errors
    ///
    /// - [`CoreError::PermissionDenied`] if the object does not exist, its
    ///   current version is unreadable, or the requested version is unreadable
    /// - [`CoreError::NotFound`] if there is no such version
    pub fn read_version(
        &self,
        principal: &Principal,
        id: ObjectId,
        version: u64,
    ) -> CoreResult<Arc<StoredObject>> {
        let current = self.readable_current(principal, id)?;
        if current.version() == version {
            return Ok(current);
        }
        let retired = self
            .backend
            .history(id)?
            .into_iter()
            .find(|retired| retired.version() == version)
            .ok_or_else(|| CoreError::not_found("Version", format!("{id}@{version}")))?;
        self.enforce(principal, &Operation::READ, Some(id), &retired.record.labels)?;
        Ok(Arc::new(StoredObject::from_record(retired.record)))
    }

    /// The version of an object which was current at `at`, or `None` if the
    /// object did not exist then. Version 1 is matched within the configured
    /// time tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PermissionDenied`] if the object does not exist,
    /// its current version is unreadable, or the chosen version is unreadable
    pub fn read_version_at_time(
        &self,
        principal: &Principal,
        id: ObjectId,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Arc<StoredObject>>> {
        let current = self.readable_current(principal, id)?;
        if current.updated_at() <= at {
            return Ok(Some(current));
        }

        let history = self.backend.history(id)?;
        let tolerance = self.config.version_time_tolerance();
        let near = |updated_at: DateTime<Utc>| {
            updated_at >= at - tolerance && updated_at <= at + tolerance
        };
        let chosen = history
            .iter()
            .filter(|retired| retired.record.updated_at <= at)
            .max_by_key(|retired| retired.record.updated_at)
            .or_else(|| {
                history
                    .iter()
                    .find(|retired| retired.version() == 1 && near(retired.record.updated_at))
            });

        match chosen {
            Some(retired) => {
                self.enforce(principal, &Operation::READ, Some(id), &retired.record.labels)?;
                Ok(Some(Arc::new(StoredObject::from_record(retired.record.clone()))))
            }
            None if current.version() == 1 && near(current.updated_at()) => Ok(Some(current)),
            None => Ok(None),
        }
    }

    /// Number of live objects, skipping those carrying any `exclude` label
    ///
    /// # Errors
    ///
    /// Returns error on backend failure
    pub fn count_objects(&self, exclude: Option<&LabelSet>) -> CoreResult<usize> {
        self.backend.count(exclude)
    }

    /// Attribute restrictions in force for the principal on an object
    #[must_use]
    pub fn restrictions_for(
        &self,
        principal: &Principal,
        object: &StoredObject,
        policy: &RestrictionPolicy,
    ) -> AttributeRestrictions {
        if principal.is_superuser() {
            return AttributeRestrictions::default();
        }
        let user_labels = self.hooks.user_restriction_labels(principal.user());
        policy.evaluate(object.labels(), &user_labels)
    }

    fn load(&self, id: ObjectId) -> CoreResult<Option<Arc<StoredObject>>> {
        let epoch = self.cache.epoch();
        let Some(record) = self.backend.fetch(id)? else {
            return Ok(None);
        };
        let object = Arc::new(StoredObject::from_record(record));
        if self.cache.insert_if_unchanged(Arc::clone(&object), epoch) {
            debug!(%id, "object cached");
        }
        Ok(Some(object))
    }

    fn fetch_current(&self, id: ObjectId) -> CoreResult<StoredObject> {
        self.backend
            .fetch(id)?
            .map(StoredObject::from_record)
            .ok_or_else(|| CoreError::not_found("Object", id))
    }

    fn readable_current(&self, principal: &Principal, id: ObjectId) -> CoreResult<Arc<StoredObject>> {
        self.read(principal, id)?.ok_or_else(|| {
            warn!(%id, "version read of missing object");
            CoreError::permission_denied(&Operation::READ)
        })
    }

    fn commit_relabel(
        &self,
        principal: &Principal,
        current: &StoredObject,
        changes: &LabelDelta,
        kind: ChangeKind,
    ) -> CoreResult<Arc<StoredObject>> {
        let id = current.id();
        let result = self.backend.apply_label_delta(id, changes);
        self.cache.evict(id);
        let record = result?.ok_or_else(|| CoreError::not_found("Object", id))?;
        let object = Arc::new(StoredObject::from_record(record));
        info!(%id, user = %principal.user(), ?kind, labels = %object.labels(), "relabelled object");
        self.hooks.notify(&object, kind, Some(current));
        Ok(object)
    }

    fn enforce(
        &self,
        principal: &Principal,
        operation: &Operation,
        object: Option<ObjectId>,
        labels: &LabelSet,
    ) -> CoreResult<()> {
        if principal.allows(operation, labels) {
            return Ok(());
        }
        self.consult_override(principal, operation, object, labels)
    }

    fn enforce_erase(&self, principal: &Principal, id: ObjectId, labels: &LabelSet) -> CoreResult<()> {
        match &self.config.erase_operation {
            Some(operation) => self.enforce(principal, operation, Some(id), labels),
            None if principal.is_superuser() => Ok(()),
            None => self.consult_override(principal, &Operation::ERASE, Some(id), labels),
        }
    }

    fn consult_override(
        &self,
        principal: &Principal,
        operation: &Operation,
        object: Option<ObjectId>,
        labels: &LabelSet,
    ) -> CoreResult<()> {
        let check = PermissionCheck {
            user: principal.user(),
            operation,
            object,
            labels,
        };
        if self.hooks.override_denial(&check) {
            debug!(user = %principal.user(), %operation, ?object, "denial overridden by hook");
            return Ok(());
        }
        warn!(user = %principal.user(), %operation, ?object, "permission denied");
        Err(CoreError::permission_denied(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Verdict;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::sync::Mutex;
    use vellum_core::{ManualClock, UserId};
    use vellum_policy::{ExplicitStatement, PermissionStatement, RestrictionRule};

    fn labels(values: &[u64]) -> LabelSet {
        LabelSet::new(values.iter().copied()).unwrap()
    }

    fn admin() -> Principal {
        Principal::superuser(UserId::from_raw(1))
    }

    fn limited(rules: &[(Operation, &[u64], &[u64])]) -> Principal {
        let mut statement = ExplicitStatement::new();
        for (operation, allow, deny) in rules {
            statement
                .statement(operation.clone(), labels(allow), labels(deny))
                .unwrap();
        }
        Principal::new(UserId::from_raw(41), PermissionStatement::explicit(statement))
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn clocked() -> (ObjectStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = ObjectStore::in_memory().with_clock(clock.clone());
        (store, clock)
    }

    #[test]
    fn test_create_assigns_id_above_threshold() {
        let store = ObjectStore::in_memory();
        let object = store
            .create(&admin(), ObjectDraft::new().with_labels(labels(&[7])), None, None)
            .unwrap();
        assert!(object.id().as_u64() > store.config().reserved_id_threshold);
        assert_eq!(object.version(), 1);
        assert_eq!(object.created_by(), UserId::from_raw(1));
    }

    #[test]
    fn test_create_unlabelled_gets_unlabelled_label() {
        let store = ObjectStore::in_memory();
        let object = store.create(&admin(), ObjectDraft::new(), None, None).unwrap();
        assert_eq!(object.labels(), &labels(&[100]));
    }

    #[test]
    fn test_create_applies_default_labels_then_changes() {
        let hooks = StoreHooks::new().with_label_defaulter(|_draft: &ObjectDraft| {
            LabelDelta::empty().adding(&LabelSet::new([5u64, 6]).unwrap_or_default())
        });
        let store = ObjectStore::in_memory().with_hooks(hooks);
        let changes = LabelDelta::empty().removing(&labels(&[6]));
        let object = store
            .create(&admin(), ObjectDraft::new().with_labels(labels(&[1])), Some(&changes), None)
            .unwrap();
        assert_eq!(object.labels(), &labels(&[1, 5]));
    }

    #[test]
    fn test_create_rejects_reserved_and_mismatched_ids() {
        let store = ObjectStore::in_memory();
        let reserved = store.create(&admin(), ObjectDraft::new(), None, Some(ObjectId::from_raw(10)));
        assert!(matches!(reserved, Err(CoreError::InvalidId { .. })));

        let id = store.preallocate_id().unwrap();
        let draft = ObjectDraft::new().with_preallocated_id(id);
        let other = ObjectId::from_raw(id.as_u64() + 50);
        let mismatched = store.create(&admin(), draft, None, Some(other));
        assert!(matches!(mismatched, Err(CoreError::InvalidId { .. })));
    }

    #[test]
    fn test_create_with_preallocated_id() {
        let store = ObjectStore::in_memory();
        let id = store.preallocate_id().unwrap();
        let object = store
            .create(&admin(), ObjectDraft::new().with_preallocated_id(id), None, None)
            .unwrap();
        assert_eq!(object.id(), id);

        let again = store.create(&admin(), ObjectDraft::new().with_preallocated_id(id), None, None);
        assert!(matches!(again, Err(CoreError::InvalidId { .. })));
    }

    #[test]
    fn test_create_stored_draft_is_rejected() {
        let store = ObjectStore::in_memory();
        let object = store.create(&admin(), ObjectDraft::new(), None, None).unwrap();
        let result = store.create(&admin(), object.to_draft(), None, None);
        assert_eq!(result.unwrap_err(), CoreError::AlreadyStored);
    }

    #[test]
    fn test_read_caches_and_counts_hits() {
        let store = ObjectStore::in_memory();
        let id = store.create(&admin(), ObjectDraft::new(), None, None).unwrap().id();
        assert!(!store.cache().contains(id));

        store.read(&admin(), id).unwrap();
        store.read(&admin(), id).unwrap();
        let stats = store.statistics();
        assert_eq!(stats.read_count, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_entries, 1);
    }

    #[test]
    fn test_read_denied_and_if_permitted() {
        let store = ObjectStore::in_memory();
        let id = store
            .create(&admin(), ObjectDraft::new().with_labels(labels(&[9])), None, None)
            .unwrap()
            .id();
        let reader = limited(&[(Operation::READ, &[8], &[])]);
        assert!(store.read(&reader, id).unwrap_err().is_permission_denied());
        assert!(store.read_if_permitted(&reader, id).unwrap().is_none());
        assert!(store.read(&reader, ObjectId::from_raw(99_999)).unwrap().is_none());
    }

    #[test]
    fn test_override_hook_allows_denied_operation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let hooks = StoreHooks::new().with_permission_override(move |check: &PermissionCheck<'_>| {
            log.lock().unwrap().push(check.operation.to_string());
            (check.operation == &Operation::READ).then_some(Verdict::Allow)
        });
        let store = ObjectStore::in_memory().with_hooks(hooks);
        let id = store.create(&admin(), ObjectDraft::new(), None, None).unwrap().id();

        let nobody = Principal::new(UserId::from_raw(3), PermissionStatement::deny_all());
        assert!(store.read(&nobody, id).unwrap().is_some());
        assert!(store.delete(&nobody, id).is_err());
        assert_eq!(*seen.lock().unwrap(), vec!["read".to_string(), "delete".to_string()]);
    }

    #[test]
    fn test_update_writes_history_and_keeps_creation() {
        let (store, clock) = clocked();
        let created = store
            .create(&admin(), ObjectDraft::new().with_attribute("title", "a"), None, None)
            .unwrap();
        clock.advance(Duration::minutes(5));

        let mut draft = created.to_draft();
        draft.set_attribute("title", "b");
        let editor = Principal::superuser(UserId::from_raw(2));
        let updated = store.update(&editor, draft, None).unwrap();

        assert_eq!(updated.version(), 2);
        assert_eq!(updated.created_at(), start());
        assert_eq!(updated.updated_at(), start() + Duration::minutes(5));
        assert_eq!(updated.created_by(), UserId::from_raw(1));
        assert_eq!(updated.updated_by(), UserId::from_raw(2));

        let history = store.history(&admin(), created.id()).unwrap().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.versions[0].retired_by, UserId::from_raw(2));
        assert_eq!(history.versions[0].object.attribute("title"), Some(&"a".into()));
    }

    #[test]
    fn test_update_stale_version() {
        let store = ObjectStore::in_memory();
        let created = store.create(&admin(), ObjectDraft::new(), None, None).unwrap();
        let stale = created.to_draft();
        store.update(&admin(), created.to_draft(), None).unwrap();

        let result = store.update(&admin(), stale, None);
        assert_eq!(
            result.unwrap_err(),
            CoreError::StaleVersion {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_update_without_id_is_not_found() {
        let store = ObjectStore::in_memory();
        let result = store.update(&admin(), ObjectDraft::new(), None);
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn test_relabel_keeps_version_and_skips_history() {
        let store = ObjectStore::in_memory();
        let id = store
            .create(&admin(), ObjectDraft::new().with_labels(labels(&[1, 2])), None, None)
            .unwrap()
            .id();
        let changes = LabelDelta::new(labels(&[3]), labels(&[1]));
        let relabelled = store.relabel(&admin(), id, &changes).unwrap();
        assert_eq!(relabelled.labels(), &labels(&[2, 3]));
        assert_eq!(relabelled.version(), 1);
        assert!(store.history(&admin(), id).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_undelete() {
        let store = ObjectStore::in_memory();
        let id = store
            .create(&admin(), ObjectDraft::new().with_labels(labels(&[4])), None, None)
            .unwrap()
            .id();
        assert_eq!(store.delete(&admin(), id).unwrap().labels(), &labels(&[4, 101]));
        assert_eq!(store.count_objects(Some(&labels(&[101]))).unwrap(), 0);
        assert_eq!(store.undelete(&admin(), id).unwrap().labels(), &labels(&[4]));
        assert_eq!(store.count_objects(Some(&labels(&[101]))).unwrap(), 1);
    }

    #[test]
    fn test_erase_requires_superuser_by_default() {
        let store = ObjectStore::in_memory();
        let id = store.create(&admin(), ObjectDraft::new(), None, None).unwrap().id();
        let everything = limited(&[
            (Operation::READ, &[100], &[]),
            (Operation::ERASE, &[100], &[]),
        ]);
        assert!(store.erase(&everything, id).unwrap_err().is_permission_denied());
        store.erase(&admin(), id).unwrap();
        assert!(store.read(&admin(), id).unwrap().is_none());
    }

    #[test]
    fn test_erase_with_configured_operation() {
        let config = StoreConfig {
            erase_operation: Some(Operation::ERASE),
            ..StoreConfig::default()
        };
        let store = ObjectStore::with_config(Arc::new(MemoryBackend::new()), config).unwrap();
        let id = store.create(&admin(), ObjectDraft::new(), None, None).unwrap().id();
        let eraser = limited(&[(Operation::ERASE, &[100], &[])]);
        store.erase(&eraser, id).unwrap();
        assert_eq!(store.count_objects(None).unwrap(), 0);
    }

    #[test]
    fn test_read_version_at_time() {
        let (store, clock) = clocked();
        let created = store.create(&admin(), ObjectDraft::new(), None, None).unwrap();
        let id = created.id();
        clock.advance(Duration::hours(1));
        store.update(&admin(), created.to_draft(), None).unwrap();

        let before = store
            .read_version_at_time(&admin(), id, start() + Duration::minutes(30))
            .unwrap()
            .unwrap();
        assert_eq!(before.version(), 1);

        let now = store
            .read_version_at_time(&admin(), id, start() + Duration::hours(2))
            .unwrap()
            .unwrap();
        assert_eq!(now.version(), 2);

        let slightly_early = store
            .read_version_at_time(&admin(), id, start() - Duration::seconds(1))
            .unwrap()
            .unwrap();
        assert_eq!(slightly_early.version(), 1);

        let too_early = store
            .read_version_at_time(&admin(), id, start() - Duration::minutes(5))
            .unwrap();
        assert!(too_early.is_none());
    }

    #[test]
    fn test_restrictions_for_uses_user_labels() {
        let hooks = StoreHooks::new()
            .with_restriction_labels(|user: UserId| {
                if user == UserId::from_raw(41) {
                    LabelSet::empty()
                } else {
                    LabelSet::new([60u64]).unwrap_or_default()
                }
            });
        let store = ObjectStore::in_memory().with_hooks(hooks);
        let object = store
            .create(&admin(), ObjectDraft::new().with_labels(labels(&[50])), None, None)
            .unwrap();
        let policy = RestrictionPolicy::new()
            .with_rule(RestrictionRule::new("salary", labels(&[50]), labels(&[60])).hiding("salary"));

        let plain = limited(&[(Operation::READ, &[50], &[])]);
        assert!(store.restrictions_for(&plain, &object, &policy).is_hidden("salary"));

        let lifted = Principal::new(UserId::from_raw(42), PermissionStatement::deny_all());
        assert!(!store.restrictions_for(&lifted, &object, &policy).is_restricted());
        assert!(!store.restrictions_for(&admin(), &object, &policy).is_restricted());
    }

    proptest::proptest! {
        #[test]
        fn prop_history_follows_updates(
            steps in proptest::collection::vec((any::<bool>(), 1u64..6, 1u64..6), 1..12)
        ) {
            let store = ObjectStore::in_memory();
            let mut current = store
                .create(&admin(), ObjectDraft::new().with_labels(labels(&[1])), None, None)
                .unwrap();
            let mut updates = 0u64;
            for (is_update, add, remove) in steps {
                let changes = LabelDelta::new(labels(&[add]), labels(&[remove]));
                current = if is_update {
                    updates += 1;
                    store.update(&admin(), current.to_draft(), Some(&changes)).unwrap()
                } else {
                    store.relabel(&admin(), current.id(), &changes).unwrap()
                };
                let slice = current.labels().as_slice();
                prop_assert!(slice.windows(2).all(|w| w[0] < w[1]));
            }

            prop_assert_eq!(current.version(), updates + 1);
            let history = store.history(&admin(), current.id()).unwrap().unwrap();
            let versions: Vec<u64> = history.versions.iter().map(|v| v.version).collect();
            prop_assert_eq!(versions, (1..=updates).collect::<Vec<u64>>());
            let stored = store.read(&admin(), current.id()).unwrap().unwrap();
            prop_assert_eq!(stored.labels(), current.labels());
        }
    }
}
