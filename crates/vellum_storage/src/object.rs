//! Object values.
//!
//! [`ObjectDraft`] is the mutable form a caller builds and submits.
//! [`StoredObject`] is what the store hands back: a committed version with
//! no mutators. Edits go through [`StoredObject::to_draft`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vellum_core::{LabelSet, ObjectId, UserId};

/// Opaque attribute map carried by objects
pub type Attributes = Map<String, Value>;

/// One row of the live object table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Object ID
    pub id: ObjectId,
    /// Version, starting at 1
    pub version: u64,
    /// Current labels
    pub labels: LabelSet,
    /// Attributes
    pub attributes: Attributes,
    /// User who created version 1
    pub created_by: UserId,
    /// User who wrote this version
    pub updated_by: UserId,
    /// When version 1 was written
    pub created_at: DateTime<Utc>,
    /// When this version was written
    pub updated_at: DateTime<Utc>,
}

/// A mutable object awaiting create or update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectDraft {
    id: Option<ObjectId>,
    version: u64,
    labels: LabelSet,
    attributes: Attributes,
    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
}

impl ObjectDraft {
    /// Create an empty draft for a new object
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial labels
    #[must_use]
    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Replace all attributes
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Use an ID obtained from `ObjectStore::preallocate_id`
    #[must_use]
    pub fn with_preallocated_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    /// Object ID, if stored or preallocated
    #[must_use]
    pub const fn id(&self) -> Option<ObjectId> {
        self.id
    }

    /// Version this draft was taken from; 0 for new objects
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Labels requested for a new object. Ignored by update.
    #[must_use]
    pub const fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Replace the requested labels
    pub fn set_labels(&mut self, labels: LabelSet) {
        self.labels = labels;
    }

    /// Attributes
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Mutable attributes
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Get one attribute
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set one attribute, returning the previous value
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Remove one attribute
    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Creator of the stored object this draft came from
    #[must_use]
    pub const fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    /// Creation time of the stored object this draft came from
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub(crate) fn into_attributes(self) -> Attributes {
        self.attributes
    }
}

/// A committed, immutable object version
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StoredObject {
    record: ObjectRecord,
}

impl StoredObject {
    pub(crate) const fn from_record(record: ObjectRecord) -> Self {
        Self { record }
    }

    /// Object ID
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.record.id
    }

    /// Version
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.record.version
    }

    /// Labels
    #[must_use]
    pub const fn labels(&self) -> &LabelSet {
        &self.record.labels
    }

    /// Attributes
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.record.attributes
    }

    /// Get one attribute
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.record.attributes.get(name)
    }

    /// Creator
    #[must_use]
    pub const fn created_by(&self) -> UserId {
        self.record.created_by
    }

    /// Author of this version
    #[must_use]
    pub const fn updated_by(&self) -> UserId {
        self.record.updated_by
    }

    /// Creation time
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }

    /// Time this version was written
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.record.updated_at
    }

    /// Underlying row
    #[must_use]
    pub const fn record(&self) -> &ObjectRecord {
        &self.record
    }

    /// Mutable copy for submitting an update
    #[must_use]
    pub fn to_draft(&self) -> ObjectDraft {
        ObjectDraft {
            id: Some(self.record.id),
            version: self.record.version,
            labels: self.record.labels.clone(),
            attributes: self.record.attributes.clone(),
            created_by: Some(self.record.created_by),
            created_at: Some(self.record.created_at),
        }
    }
}

impl From<&StoredObject> for ObjectId {
    fn from(object: &StoredObject) -> Self {
        object.id()
    }
}
