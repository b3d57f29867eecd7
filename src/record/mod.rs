//! Record Module
//!
//! Schema-less records and their single-line encoding.
//!
//! ## Responsibilities
//! - Represent a record as an ordered map of scalar fields
//! - Enforce the mandatory string `_id`
//! - Mark tombstone versions (`_deleted`, `_deleted_ts`)
//! - Encode/decode one record version per text line
//!
//! ## Line Format
//! ```text
//! {"_id":"17295...a3f01c","city":"Skopje","name":"A"}\n
//! {"_deleted":true,"_deleted_ts":1729512000,"_id":"17295...a3f01c"}\n
//! ```

mod codec;
mod id;
mod value;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{FileDbError, Result};

pub use codec::{decode_line, encode_line};
pub use id::{generate_id, unix_timestamp};
pub use value::Value;

/// Field name → value mapping
pub type Fields = BTreeMap<String, Value>;

/// Reserved field holding the record identity
pub const ID_FIELD: &str = "_id";

/// Reserved field marking a tombstone version
pub const DELETED_FIELD: &str = "_deleted";

/// Reserved field holding the tombstone's unix timestamp (seconds)
pub const DELETED_TS_FIELD: &str = "_deleted_ts";

/// One version of a record
///
/// Always carries a string `_id` that is valid as an index token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Fields,
}

impl Record {
    /// Build a record from fields that must already contain `_id`
    ///
    /// A numeric `_id` is coerced to its decimal string form.
    pub fn from_fields(mut fields: Fields) -> Result<Self> {
        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(FileDbError::InvalidRecord(format!(
                    "_id must be a string or number, got {}",
                    other
                )))
            }
            None => {
                return Err(FileDbError::InvalidRecord("missing _id".to_string()));
            }
        };
        validate_id(&id)?;
        fields.insert(ID_FIELD.to_string(), Value::String(id));
        Ok(Self { fields })
    }

    /// Build a record for insertion, generating `_id` when absent or null
    pub fn for_insert(mut fields: Fields) -> Result<Self> {
        if fields.get(ID_FIELD).map_or(true, Value::is_null) {
            fields.insert(ID_FIELD.to_string(), Value::String(generate_id()));
        }
        Self::from_fields(fields)
    }

    /// Build the tombstone version for `id`
    pub fn tombstone(id: &str, deleted_ts: u64) -> Self {
        let mut fields = Fields::new();
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        fields.insert(DELETED_FIELD.to_string(), Value::Bool(true));
        fields.insert(DELETED_TS_FIELD.to_string(), Value::from(deleted_ts));
        Self { fields }
    }

    /// The record identity
    pub fn id(&self) -> &str {
        self.fields
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Whether this version marks the record deleted
    pub fn is_tombstone(&self) -> bool {
        self.fields
            .get(DELETED_FIELD)
            .map_or(false, Value::is_truthy)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Produce the next version of this record
    ///
    /// Non-null changes overwrite, null changes remove the field, and `_id`
    /// is never touched.
    pub fn apply_changes(&self, changes: &Fields) -> Record {
        let mut fields = self.fields.clone();
        for (key, value) in changes {
            if key == ID_FIELD {
                continue;
            }
            if value.is_null() {
                fields.remove(key);
            } else {
                fields.insert(key.clone(), value.clone());
            }
        }
        Record { fields }
    }
}

/// Ids end up as `id:offset:length` index tokens, one per line
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(FileDbError::InvalidRecord("_id must not be empty".to_string()));
    }
    if id.contains(|c: char| matches!(c, ':' | '\n' | '\r')) {
        return Err(FileDbError::InvalidRecord(format!(
            "_id {:?} contains ':' or a line break",
            id
        )));
    }
    Ok(())
}

/// Build a `Fields` map from `key => value` pairs
///
/// ```
/// use filedb::fields;
///
/// let f = fields! { "name" => "A", "age" => 30 };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::record::Fields::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::record::Fields::new();
        $( map.insert(::std::string::String::from($key), $crate::record::Value::from($value)); )+
        map
    }};
}
