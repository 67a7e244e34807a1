//! JSON file persistence for the whole document.
//!
//! The backing file holds one object whose values are arrays of records.
//! [`JsonFileStore`] is the only code that touches that file, and it is only
//! ever driven from inside a [`MutationQueue`](crate::queue::MutationQueue)
//! task, so it carries no locking of its own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};

/// One record: an open mapping of field name to JSON value.
pub type Record = Map<String, Value>;

/// The whole persisted state, keyed by collection name.
///
/// Collections hold raw JSON values. Items that are not objects are carried
/// through untouched; record-level operations only ever see the objects.
/// Each load builds a fresh `Document`, so nothing handed to a caller ever
/// aliases the copy a later task works on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    collections: BTreeMap<String, Vec<Value>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items of `name`, or an empty slice when the collection is absent.
    pub fn collection(&self, name: &str) -> &[Value] {
        self.collections
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Mutable access, creating the collection when absent.
    pub fn collection_mut(&mut self, name: &str) -> &mut Vec<Value> {
        self.collections.entry(name.to_string()).or_default()
    }

    /// The object items of `name`, skipping anything else.
    pub fn records(&self, name: &str) -> impl Iterator<Item = &Record> {
        self.collection(name).iter().filter_map(Value::as_object)
    }

    pub fn records_mut(&mut self, name: &str) -> impl Iterator<Item = &mut Record> {
        self.collections
            .get_mut(name)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object_mut)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Detach a collection so it can be edited alongside a view of the rest
    /// of the document. Pair with [`Document::put_collection`].
    pub fn take_collection(&mut self, name: &str) -> Vec<Value> {
        self.collections.remove(name).unwrap_or_default()
    }

    pub fn put_collection(&mut self, name: &str, items: Vec<Value>) {
        self.collections.insert(name.to_string(), items);
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// What to do with a collection value that is not an array of objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShapePolicy {
    /// Reset a non-array collection to `[]` and log a warning. Non-object
    /// items inside an array are kept as they are.
    #[default]
    Lenient,
    /// Fail the load with [`StoreError::Corruption`].
    Strict,
}

#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    policy: ShapePolicy,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_policy(path, ShapePolicy::default())
    }

    pub fn with_policy(path: impl Into<PathBuf>, policy: ShapePolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Side file written before the rename, e.g. `db.json.tmp`.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("store"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Create the parent directory and an empty `{}` document if the file is
    /// missing. Safe to call before every load.
    pub async fn ensure_exists(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io("create directory", parent, e))?;
        }
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| StoreError::io("stat", &self.path, e))?;
        if !exists {
            tracing::info!(path = %self.path.display(), "initializing empty store file");
            self.persist(&Document::new()).await?;
        }
        Ok(())
    }

    /// Read and normalize the whole document.
    pub async fn load(&self) -> Result<Document> {
        self.ensure_exists().await?;
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::io("read", &self.path, e))?;
        self.parse(&raw)
    }

    fn parse(&self, raw: &str) -> Result<Document> {
        if raw.trim().is_empty() {
            return Ok(Document::new());
        }
        let value: Value = serde_json::from_str(raw).map_err(|e| self.corruption(e.to_string()))?;
        let top = match value {
            Value::Object(top) => top,
            other => {
                return Err(self.corruption(format!(
                    "top-level value is {}, expected an object",
                    kind_of(&other)
                )))
            }
        };

        let mut doc = Document::new();
        for (name, value) in top {
            let items = match value {
                Value::Array(items) => self.check_items(&name, items)?,
                other => {
                    if self.policy == ShapePolicy::Strict {
                        return Err(self.corruption(format!(
                            "collection `{name}` is {}, expected an array",
                            kind_of(&other)
                        )));
                    }
                    tracing::warn!(
                        path = %self.path.display(),
                        collection = %name,
                        found = kind_of(&other),
                        "collection is not an array; resetting to empty",
                    );
                    Vec::new()
                }
            };
            doc.put_collection(&name, items);
        }
        Ok(doc)
    }

    fn check_items(&self, name: &str, items: Vec<Value>) -> Result<Vec<Value>> {
        if self.policy == ShapePolicy::Strict {
            if let Some((index, item)) = items.iter().enumerate().find(|(_, v)| !v.is_object()) {
                return Err(self.corruption(format!(
                    "item {index} of `{name}` is {}, expected an object",
                    kind_of(item)
                )));
            }
        }
        Ok(items)
    }

    /// Write `doc` durably: stage to the side file, then rename it over the
    /// primary file.
    pub async fn persist(&self, doc: &Document) -> Result<()> {
        let staged = self.stage(doc).await?;
        self.commit(&staged).await
    }

    /// First half of [`persist`](Self::persist). The primary file is not
    /// touched until [`commit`](Self::commit) runs.
    pub async fn stage(&self, doc: &Document) -> Result<PathBuf> {
        let mut payload = serde_json::to_string_pretty(doc)?;
        payload.push('\n');

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| StoreError::io("create", &temp, e))?;
        file.write_all(payload.as_bytes())
            .await
            .map_err(|e| StoreError::io("write", &temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::io("flush", &temp, e))?;
        Ok(temp)
    }

    pub async fn commit(&self, staged: &Path) -> Result<()> {
        tokio::fs::rename(staged, &self.path)
            .await
            .map_err(|e| StoreError::io("rename", staged, e))
    }

    fn corruption(&self, reason: String) -> StoreError {
        StoreError::Corruption {
            path: self.path.clone(),
            reason,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
