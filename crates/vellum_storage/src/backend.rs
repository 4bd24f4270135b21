//! Storage backends.
//!
//! A backend holds three tables: live objects keyed by ID (with the labels
//! kept as their own column), retired rows keyed by `(id, version)`, and the
//! ID sequence. Every method is one atomic unit of work.

use crate::history::RetiredRecord;
use crate::object::ObjectRecord;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use vellum_core::{CoreError, CoreResult, LabelDelta, LabelSet, ObjectId};

/// Persistence for object rows and their history
pub trait Backend: Send + Sync + fmt::Debug {
    /// Take the next ID from the sequence, skipping everything up to `above`
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn allocate_id(&self, above: u64) -> CoreResult<ObjectId>;

    /// Load the live row
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn fetch(&self, id: ObjectId) -> CoreResult<Option<ObjectRecord>>;

    /// Load only the labels column of the live row
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn fetch_labels(&self, id: ObjectId) -> CoreResult<Option<LabelSet>>;

    /// Insert a new row, advancing the sequence past its ID
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidId`] if a row with that ID exists
    fn insert(&self, record: &ObjectRecord) -> CoreResult<()>;

    /// Archive `retired` and write `record` in its place, provided the live
    /// row still has the retired version and labels
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StaleVersion`] if the live row moved on,
    /// [`CoreError::ConcurrentModification`] if its labels changed, or
    /// [`CoreError::NotFound`] if it is gone
    fn replace(&self, record: &ObjectRecord, retired: &RetiredRecord) -> CoreResult<()>;

    /// Apply a label delta to the labels column in place, returning the
    /// updated row
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn apply_label_delta(&self, id: ObjectId, delta: &LabelDelta) -> CoreResult<Option<ObjectRecord>>;

    /// Retired rows, oldest first
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn history(&self, id: ObjectId) -> CoreResult<Vec<RetiredRecord>>;

    /// Remove the live row and all retired rows; false if there was no row
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn remove(&self, id: ObjectId) -> CoreResult<bool>;

    /// Remove retired rows only, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn remove_history(&self, id: ObjectId) -> CoreResult<usize>;

    /// Count live rows, skipping rows carrying any `exclude` label
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    fn count(&self, exclude: Option<&LabelSet>) -> CoreResult<usize>;
}

pub(crate) fn check_replace(current: &ObjectRecord, retired: &RetiredRecord) -> CoreResult<()> {
    if current.version != retired.record.version {
        return Err(CoreError::StaleVersion {
            expected: retired.record.version,
            actual: current.version,
        });
    }
    if current.labels != retired.record.labels {
        return Err(CoreError::ConcurrentModification {
            id: current.id.as_u64(),
        });
    }
    Ok(())
}

pub(crate) fn excluded(labels: &LabelSet, exclude: Option<&LabelSet>) -> bool {
    exclude.is_some_and(|exclude| labels.intersects(exclude))
}

#[derive(Debug, Default)]
struct Tables {
    sequence: u64,
    objects: BTreeMap<ObjectId, ObjectRecord>,
    history: BTreeMap<(ObjectId, u64), RetiredRecord>,
}

impl Tables {
    fn history_keys(&self, id: ObjectId) -> Vec<(ObjectId, u64)> {
        self.history
            .range((id, 0)..=(id, u64::MAX))
            .map(|(key, _)| *key)
            .collect()
    }
}

/// Backend keeping its tables in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for MemoryBackend {
    fn allocate_id(&self, above: u64) -> CoreResult<ObjectId> {
        let mut tables = self.write();
        tables.sequence = tables.sequence.max(above) + 1;
        Ok(ObjectId::from_raw(tables.sequence))
    }

    fn fetch(&self, id: ObjectId) -> CoreResult<Option<ObjectRecord>> {
        Ok(self.read().objects.get(&id).cloned())
    }

    fn fetch_labels(&self, id: ObjectId) -> CoreResult<Option<LabelSet>> {
        Ok(self.read().objects.get(&id).map(|record| record.labels.clone()))
    }

    fn insert(&self, record: &ObjectRecord) -> CoreResult<()> {
        let mut tables = self.write();
        if tables.objects.contains_key(&record.id) {
            return Err(CoreError::InvalidId {
                reason: format!("object {} already exists", record.id),
            });
        }
        tables.sequence = tables.sequence.max(record.id.as_u64());
        tables.objects.insert(record.id, record.clone());
        Ok(())
    }

    fn replace(&self, record: &ObjectRecord, retired: &RetiredRecord) -> CoreResult<()> {
        let mut tables = self.write();
        let current = tables
            .objects
            .get(&record.id)
            .ok_or_else(|| CoreError::not_found("Object", record.id))?;
        check_replace(current, retired)?;
        tables
            .history
            .insert((record.id, retired.version()), retired.clone());
        tables.objects.insert(record.id, record.clone());
        Ok(())
    }

    fn apply_label_delta(&self, id: ObjectId, delta: &LabelDelta) -> CoreResult<Option<ObjectRecord>> {
        let mut tables = self.write();
        Ok(tables.objects.get_mut(&id).map(|record| {
            record.labels = delta.apply(&record.labels);
            record.clone()
        }))
    }

    fn history(&self, id: ObjectId) -> CoreResult<Vec<RetiredRecord>> {
        Ok(self
            .read()
            .history
            .range((id, 0)..=(id, u64::MAX))
            .map(|(_, retired)| retired.clone())
            .collect())
    }

    fn remove(&self, id: ObjectId) -> CoreResult<bool> {
        let mut tables = self.write();
        if tables.objects.remove(&id).is_none() {
            return Ok(false);
        }
        for key in tables.history_keys(id) {
            tables.history.remove(&key);
        }
        Ok(true)
    }

    fn remove_history(&self, id: ObjectId) -> CoreResult<usize> {
        let mut tables = self.write();
        let keys = tables.history_keys(id);
        for key in &keys {
            tables.history.remove(key);
        }
        Ok(keys.len())
    }

    fn count(&self, exclude: Option<&LabelSet>) -> CoreResult<usize> {
        Ok(self
            .read()
            .objects
            .values()
            .filter(|record| !excluded(&record.labels, exclude))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Attributes;
    use chrono::Utc;
    use vellum_core::UserId;

    fn record(id: u64, version: u64, labels: &[u64]) -> ObjectRecord {
        let now = Utc::now();
        ObjectRecord {
            id: ObjectId::from_raw(id),
            version,
            labels: LabelSet::new(labels.iter().copied()).unwrap(),
            attributes: Attributes::new(),
            created_by: UserId::from_raw(1),
            updated_by: UserId::from_raw(1),
            created_at: now,
            updated_at: now,
        }
    }

    fn retire(record: ObjectRecord) -> RetiredRecord {
        RetiredRecord {
            record,
            retired_at: Utc::now(),
            retired_by: UserId::from_raw(2),
        }
    }

    #[test]
    fn test_allocate_skips_reserved_range() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.allocate_id(1024).unwrap(), ObjectId::from_raw(1025));
        assert_eq!(backend.allocate_id(1024).unwrap(), ObjectId::from_raw(1026));
    }

    #[test]
    fn test_insert_advances_sequence() {
        let backend = MemoryBackend::new();
        backend.insert(&record(5000, 1, &[1])).unwrap();
        assert_eq!(backend.allocate_id(1024).unwrap(), ObjectId::from_raw(5001));
        assert!(matches!(
            backend.insert(&record(5000, 1, &[1])),
            Err(CoreError::InvalidId { .. })
        ));
    }

    #[test]
    fn test_replace_archives_and_checks_version() {
        let backend = MemoryBackend::new();
        let v1 = record(2000, 1, &[1]);
        backend.insert(&v1).unwrap();
        backend.replace(&record(2000, 2, &[1]), &retire(v1.clone())).unwrap();

        let err = backend
            .replace(&record(2000, 2, &[1]), &retire(v1))
            .unwrap_err();
        assert_eq!(err, CoreError::StaleVersion { expected: 1, actual: 2 });

        let history = backend.history(ObjectId::from_raw(2000)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version(), 1);
        assert_eq!(backend.fetch(ObjectId::from_raw(2000)).unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_replace_rejects_relabelled_row() {
        let backend = MemoryBackend::new();
        let v1 = record(2000, 1, &[4]);
        backend.insert(&v1).unwrap();
        let delete = LabelDelta::empty().adding(&LabelSet::new([101u64]).unwrap());
        backend.apply_label_delta(v1.id, &delete).unwrap();

        let err = backend
            .replace(&record(2000, 2, &[4]), &retire(v1))
            .unwrap_err();
        assert_eq!(err, CoreError::ConcurrentModification { id: 2000 });
        let current = backend.fetch(ObjectId::from_raw(2000)).unwrap().unwrap();
        assert_eq!(current.labels.as_slice(), &[4, 101]);
        assert_eq!(current.version, 1);
        assert!(backend.history(ObjectId::from_raw(2000)).unwrap().is_empty());
    }

    #[test]
    fn test_label_delta_and_count() {
        let backend = MemoryBackend::new();
        backend.insert(&record(2000, 1, &[1, 2])).unwrap();
        backend.insert(&record(2001, 1, &[3])).unwrap();
        let delta = LabelDelta::new(LabelSet::new([101u64]).unwrap(), LabelSet::new([1u64]).unwrap());
        let updated = backend
            .apply_label_delta(ObjectId::from_raw(2000), &delta)
            .unwrap()
            .unwrap();
        assert_eq!(updated.labels.as_slice(), &[2, 101]);
        assert_eq!(updated.version, 1);
        assert!(backend
            .apply_label_delta(ObjectId::from_raw(9), &delta)
            .unwrap()
            .is_none());

        let deleted = LabelSet::new([101u64]).unwrap();
        assert_eq!(backend.count(None).unwrap(), 2);
        assert_eq!(backend.count(Some(&deleted)).unwrap(), 1);
    }

    #[test]
    fn test_remove_takes_history() {
        let backend = MemoryBackend::new();
        let v1 = record(2000, 1, &[1]);
        backend.insert(&v1).unwrap();
        backend.replace(&record(2000, 2, &[1]), &retire(v1)).unwrap();
        backend.insert(&record(2001, 1, &[1])).unwrap();

        assert!(backend.remove(ObjectId::from_raw(2000)).unwrap());
        assert!(!backend.remove(ObjectId::from_raw(2000)).unwrap());
        assert!(backend.history(ObjectId::from_raw(2000)).unwrap().is_empty());
        assert_eq!(backend.remove_history(ObjectId::from_raw(2001)).unwrap(), 0);
        assert!(backend.fetch(ObjectId::from_raw(2001)).unwrap().is_some());
    }
}
