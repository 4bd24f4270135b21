//! Backend on a redb database file.
//!
//! Tables:
//! - `objects`: id → JSON row body (everything except labels)
//! - `object_labels`: id → label set literal
//! - `objects_history`: (id, version) → JSON retired row
//! - `meta`: name → counter, holding the ID sequence
//!
//! Each backend call runs in a single write or read transaction, so a
//! failed call leaves the file untouched.

use crate::backend::{check_replace, excluded, Backend};
use crate::history::RetiredRecord;
use crate::object::{Attributes, ObjectRecord};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;
use vellum_core::{CoreError, CoreResult, LabelDelta, LabelSet, ObjectId, UserId};

const OBJECTS: TableDefinition<u64, &[u8]> = TableDefinition::new("objects");
const OBJECT_LABELS: TableDefinition<u64, &str> = TableDefinition::new("object_labels");
const HISTORY: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("objects_history");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQUENCE_KEY: &str = "object_id_sequence";

/// Row body stored in `objects`; labels live in `object_labels`
#[derive(Debug, Serialize, Deserialize)]
struct RowBody {
    version: u64,
    attributes: Attributes,
    created_by: UserId,
    updated_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RowBody {
    fn from_record(record: &ObjectRecord) -> Self {
        Self {
            version: record.version,
            attributes: record.attributes.clone(),
            created_by: record.created_by,
            updated_by: record.updated_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn into_record(self, id: ObjectId, labels: LabelSet) -> ObjectRecord {
        ObjectRecord {
            id,
            version: self.version,
            labels,
            attributes: self.attributes,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn engine_error(err: impl Into<redb::Error>) -> CoreError {
    CoreError::backend(err.into())
}

fn load_labels(
    labels: &impl ReadableTable<u64, &'static str>,
    id: ObjectId,
) -> CoreResult<Option<LabelSet>> {
    labels
        .get(id.as_u64())
        .map_err(engine_error)?
        .map(|literal| LabelSet::parse(literal.value()))
        .transpose()
}

fn load_record(
    objects: &impl ReadableTable<u64, &'static [u8]>,
    labels: &impl ReadableTable<u64, &'static str>,
    id: ObjectId,
) -> CoreResult<Option<ObjectRecord>> {
    let Some(body) = objects.get(id.as_u64()).map_err(engine_error)? else {
        return Ok(None);
    };
    let body: RowBody = serde_json::from_slice(body.value())?;
    let labels = load_labels(labels, id)?.unwrap_or_default();
    Ok(Some(body.into_record(id, labels)))
}

fn history_keys(
    history: &impl ReadableTable<(u64, u64), &'static [u8]>,
    id: ObjectId,
) -> CoreResult<Vec<(u64, u64)>> {
    let mut keys = Vec::new();
    for entry in history
        .range((id.as_u64(), 0)..=(id.as_u64(), u64::MAX))
        .map_err(engine_error)?
    {
        let (key, _) = entry.map_err(engine_error)?;
        keys.push(key.value());
    }
    Ok(keys)
}

/// Backend persisting to a redb file
pub struct RedbBackend {
    db: Database,
}

impl fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbBackend").finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a database file and make sure all tables exist
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(engine_error)?;
        let txn = db.begin_write().map_err(engine_error)?;
        {
            txn.open_table(OBJECTS).map_err(engine_error)?;
            txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
            txn.open_table(HISTORY).map_err(engine_error)?;
            txn.open_table(META).map_err(engine_error)?;
        }
        txn.commit().map_err(engine_error)?;
        debug!(path = %path.display(), "opened redb object store");
        Ok(Self { db })
    }

    fn write<T>(&self, work: impl FnOnce(&WriteTransaction) -> CoreResult<T>) -> CoreResult<T> {
        let txn = self.db.begin_write().map_err(engine_error)?;
        let value = work(&txn)?;
        txn.commit().map_err(engine_error)?;
        Ok(value)
    }
}

impl Backend for RedbBackend {
    fn allocate_id(&self, above: u64) -> CoreResult<ObjectId> {
        self.write(|txn| {
            let mut meta = txn.open_table(META).map_err(engine_error)?;
            let current = meta
                .get(SEQUENCE_KEY)
                .map_err(engine_error)?
                .map_or(0, |value| value.value());
            let next = current.max(above) + 1;
            meta.insert(SEQUENCE_KEY, next).map_err(engine_error)?;
            Ok(ObjectId::from_raw(next))
        })
    }

    fn fetch(&self, id: ObjectId) -> CoreResult<Option<ObjectRecord>> {
        let txn = self.db.begin_read().map_err(engine_error)?;
        let objects = txn.open_table(OBJECTS).map_err(engine_error)?;
        let labels = txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
        load_record(&objects, &labels, id)
    }

    fn fetch_labels(&self, id: ObjectId) -> CoreResult<Option<LabelSet>> {
        let txn = self.db.begin_read().map_err(engine_error)?;
        let labels = txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
        load_labels(&labels, id)
    }

    fn insert(&self, record: &ObjectRecord) -> CoreResult<()> {
        let body = serde_json::to_vec(&RowBody::from_record(record))?;
        let literal = record.labels.to_literal();
        self.write(|txn| {
            let mut objects = txn.open_table(OBJECTS).map_err(engine_error)?;
            if objects.get(record.id.as_u64()).map_err(engine_error)?.is_some() {
                return Err(CoreError::InvalidId {
                    reason: format!("object {} already exists", record.id),
                });
            }
            objects
                .insert(record.id.as_u64(), body.as_slice())
                .map_err(engine_error)?;

            let mut labels = txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
            labels
                .insert(record.id.as_u64(), literal.as_str())
                .map_err(engine_error)?;

            let mut meta = txn.open_table(META).map_err(engine_error)?;
            let current = meta
                .get(SEQUENCE_KEY)
                .map_err(engine_error)?
                .map_or(0, |value| value.value());
            if record.id.as_u64() > current {
                meta.insert(SEQUENCE_KEY, record.id.as_u64())
                    .map_err(engine_error)?;
            }
            Ok(())
        })
    }

    fn replace(&self, record: &ObjectRecord, retired: &RetiredRecord) -> CoreResult<()> {
        let body = serde_json::to_vec(&RowBody::from_record(record))?;
        let archived = serde_json::to_vec(retired)?;
        let literal = record.labels.to_literal();
        self.write(|txn| {
            let mut objects = txn.open_table(OBJECTS).map_err(engine_error)?;
            let mut labels = txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
            let current = load_record(&objects, &labels, record.id)?
                .ok_or_else(|| CoreError::not_found("Object", record.id))?;
            check_replace(&current, retired)?;

            let mut history = txn.open_table(HISTORY).map_err(engine_error)?;
            history
                .insert((record.id.as_u64(), retired.version()), archived.as_slice())
                .map_err(engine_error)?;
            objects
                .insert(record.id.as_u64(), body.as_slice())
                .map_err(engine_error)?;
            labels
                .insert(record.id.as_u64(), literal.as_str())
                .map_err(engine_error)?;
            Ok(())
        })
    }

    fn apply_label_delta(&self, id: ObjectId, delta: &LabelDelta) -> CoreResult<Option<ObjectRecord>> {
        self.write(|txn| {
            let objects = txn.open_table(OBJECTS).map_err(engine_error)?;
            let mut labels = txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
            let Some(mut record) = load_record(&objects, &labels, id)? else {
                return Ok(None);
            };
            record.labels = delta.apply(&record.labels);
            let literal = record.labels.to_literal();
            labels
                .insert(id.as_u64(), literal.as_str())
                .map_err(engine_error)?;
            Ok(Some(record))
        })
    }

    fn history(&self, id: ObjectId) -> CoreResult<Vec<RetiredRecord>> {
        let txn = self.db.begin_read().map_err(engine_error)?;
        let history = txn.open_table(HISTORY).map_err(engine_error)?;
        let mut retired = Vec::new();
        for entry in history
            .range((id.as_u64(), 0)..=(id.as_u64(), u64::MAX))
            .map_err(engine_error)?
        {
            let (_, row) = entry.map_err(engine_error)?;
            retired.push(serde_json::from_slice(row.value())?);
        }
        Ok(retired)
    }

    fn remove(&self, id: ObjectId) -> CoreResult<bool> {
        self.write(|txn| {
            let mut objects = txn.open_table(OBJECTS).map_err(engine_error)?;
            let existed = objects.remove(id.as_u64()).map_err(engine_error)?.is_some();
            if !existed {
                return Ok(false);
            }
            let mut labels = txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
            labels.remove(id.as_u64()).map_err(engine_error)?;

            let mut history = txn.open_table(HISTORY).map_err(engine_error)?;
            for key in history_keys(&history, id)? {
                history.remove(key).map_err(engine_error)?;
            }
            Ok(true)
        })
    }

    fn remove_history(&self, id: ObjectId) -> CoreResult<usize> {
        self.write(|txn| {
            let mut history = txn.open_table(HISTORY).map_err(engine_error)?;
            let keys = history_keys(&history, id)?;
            for key in &keys {
                history.remove(*key).map_err(engine_error)?;
            }
            Ok(keys.len())
        })
    }

    fn count(&self, exclude: Option<&LabelSet>) -> CoreResult<usize> {
        let txn = self.db.begin_read().map_err(engine_error)?;
        let labels = txn.open_table(OBJECT_LABELS).map_err(engine_error)?;
        let mut count = 0;
        for entry in labels.iter().map_err(engine_error)? {
            let (_, literal) = entry.map_err(engine_error)?;
            if !excluded(&LabelSet::parse(literal.value())?, exclude) {
                count += 1;
            }
        }
        Ok(count)
    }
}
