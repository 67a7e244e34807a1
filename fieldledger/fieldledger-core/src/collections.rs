//! Collection accessors over the queued JSON store.
//!
//! Each call is one queued load, mutate, persist cycle. The task is submitted
//! when the method is called, not when the returned future is first polled,
//! so calls made back to back run in that order. Two calls are never one
//! transaction; use [`DataStore::mutate`] when several records or
//! collections must change together.

use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::ids::matches_identity;
use crate::queue::MutationQueue;
use crate::storage::{Document, JsonFileStore, Record, ShapePolicy};

#[derive(Clone)]
pub struct DataStore {
    file: Arc<JsonFileStore>,
    queue: MutationQueue,
}

impl DataStore {
    /// Open a store over `path` with its own queue. Must be called inside a
    /// Tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_file(JsonFileStore::new(path))
    }

    pub fn open_with_policy(path: impl Into<PathBuf>, policy: ShapePolicy) -> Self {
        Self::with_file(JsonFileStore::with_policy(path, policy))
    }

    pub fn with_file(file: JsonFileStore) -> Self {
        Self {
            file: Arc::new(file),
            queue: MutationQueue::new(),
        }
    }

    pub fn file(&self) -> &JsonFileStore {
        &self.file
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// Make sure the backing file exists, through the queue like every other
    /// access.
    pub fn init(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let file = self.file.clone();
        let queued = self
            .queue
            .run_exclusive(move || async move { file.ensure_exists().await });
        async move { queued.await? }
    }

    /// Run `f` against a freshly loaded document; persist when it reports a
    /// change.
    fn cycle<T, F>(
        &self,
        op: &'static str,
        collection: &str,
        f: F,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce(&mut Document) -> (T, bool) + Send + 'static,
        T: Send + 'static,
    {
        let file = self.file.clone();
        let collection = collection.to_string();
        let queued = self.queue.run_exclusive(move || async move {
            let mut doc = file.load().await?;
            let (out, dirty) = f(&mut doc);
            if dirty {
                file.persist(&doc).await?;
            }
            tracing::debug!(op, collection = %collection, dirty, "store cycle complete");
            Ok::<T, StoreError>(out)
        });
        async move { queued.await? }
    }

    /// Every item of the collection, including any non-object items the
    /// file carries.
    pub fn list(&self, name: &str) -> impl Future<Output = Result<Vec<Value>>> + Send + 'static {
        let key = name.to_string();
        self.cycle("list", name, move |doc| (doc.collection(&key).to_vec(), false))
    }

    pub fn count(&self, name: &str) -> impl Future<Output = Result<usize>> + Send + 'static {
        let key = name.to_string();
        self.cycle("count", name, move |doc| (doc.collection(&key).len(), false))
    }

    /// First record whose `id_field` equals `id`, or `None`.
    pub fn get_by_id(
        &self,
        name: &str,
        id: &str,
        id_field: &str,
    ) -> impl Future<Output = Result<Option<Record>>> + Send + 'static {
        let (key, id, id_field) = (name.to_string(), id.to_string(), id_field.to_string());
        self.cycle("get", name, move |doc| {
            let found = doc
                .records(&key)
                .find(|r| matches_identity(r, &id_field, &id))
                .cloned();
            (found, false)
        })
    }

    /// Append `record` as is; the identity is expected to be assigned
    /// already (see [`ensure_identity`](crate::ids::ensure_identity)).
    pub fn create(
        &self,
        name: &str,
        record: Record,
    ) -> impl Future<Output = Result<Record>> + Send + 'static {
        let key = name.to_string();
        self.cycle("create", name, move |doc| {
            let inserted = record.clone();
            doc.collection_mut(&key).push(Value::Object(record));
            (inserted, true)
        })
    }

    /// Shallow-merge `patch` over the matching record, then re-pin the
    /// identity field to `id` whatever the patch says. Nothing is written
    /// when no record matches.
    pub fn update(
        &self,
        name: &str,
        id: &str,
        patch: Record,
        id_field: &str,
    ) -> impl Future<Output = Result<Option<Record>>> + Send + 'static {
        let (key, id, id_field) = (name.to_string(), id.to_string(), id_field.to_string());
        self.cycle("update", name, move |doc| {
            let Some(existing) = doc
                .records_mut(&key)
                .find(|r| matches_identity(r, &id_field, &id))
            else {
                return (None, false);
            };
            merge(existing, patch);
            existing.insert(id_field, Value::String(id));
            (Some(existing.clone()), true)
        })
    }

    /// Remove the matching record. `false` (and no write) when absent.
    pub fn remove(
        &self,
        name: &str,
        id: &str,
        id_field: &str,
    ) -> impl Future<Output = Result<bool>> + Send + 'static {
        let (key, id, id_field) = (name.to_string(), id.to_string(), id_field.to_string());
        self.cycle("remove", name, move |doc| {
            if !doc.contains(&key) {
                return (false, false);
            }
            let items = doc.collection_mut(&key);
            let hit = items
                .iter()
                .position(|v| v.as_object().is_some_and(|r| matches_identity(r, &id_field, &id)));
            match hit {
                Some(index) => {
                    items.remove(index);
                    (true, true)
                }
                None => (false, false),
            }
        })
    }

    /// Hand the named collection, detached, together with the rest of the
    /// document to `f`, then persist whatever both were left holding.
    pub fn mutate<T, F>(&self, name: &str, f: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce(&mut Vec<Value>, &mut Document) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.mutate_if(name, move |items, doc| (f(items, doc), true))
    }

    /// Like [`mutate`](Self::mutate), but `f` also says whether anything
    /// changed; nothing is written when it returns `false`.
    pub fn mutate_if<T, F>(&self, name: &str, f: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce(&mut Vec<Value>, &mut Document) -> (T, bool) + Send + 'static,
        T: Send + 'static,
    {
        let key = name.to_string();
        self.cycle("mutate", name, move |doc| {
            let mut items = doc.take_collection(&key);
            let (out, dirty) = f(&mut items, doc);
            doc.put_collection(&key, items);
            (out, dirty)
        })
    }

    /// Records whose `field` equals `value`, in collection order.
    pub fn find_where(
        &self,
        name: &str,
        field: &str,
        value: Value,
    ) -> impl Future<Output = Result<Vec<Record>>> + Send + 'static {
        let (key, field) = (name.to_string(), field.to_string());
        self.cycle("find_where", name, move |doc| {
            let found = doc
                .records(&key)
                .filter(|r| field_matches(r, &field, &value))
                .cloned()
                .collect();
            (found, false)
        })
    }

    /// Merge `patch` into every record whose `field` equals `value`; returns
    /// how many changed. A record keeps its stored identity; one without an
    /// identity takes whatever the patch carries.
    pub fn update_where(
        &self,
        name: &str,
        field: &str,
        value: Value,
        patch: Record,
        id_field: &str,
    ) -> impl Future<Output = Result<usize>> + Send + 'static {
        let (key, field, id_field) = (name.to_string(), field.to_string(), id_field.to_string());
        self.cycle("update_where", name, move |doc| {
            if !doc.contains(&key) {
                return (0, false);
            }
            let mut changed = 0;
            for record in doc.records_mut(&key) {
                if field_matches(record, &field, &value) {
                    let pinned = record.get(&id_field).cloned();
                    merge(record, patch.clone());
                    if let Some(identity) = pinned {
                        record.insert(id_field.clone(), identity);
                    }
                    changed += 1;
                }
            }
            (changed, changed > 0)
        })
    }

    /// Remove every record whose `field` equals `value`; returns how many
    /// went.
    pub fn remove_where(
        &self,
        name: &str,
        field: &str,
        value: Value,
    ) -> impl Future<Output = Result<usize>> + Send + 'static {
        let (key, field) = (name.to_string(), field.to_string());
        self.cycle("remove_where", name, move |doc| {
            if !doc.contains(&key) {
                return (0, false);
            }
            let items = doc.collection_mut(&key);
            let before = items.len();
            items.retain(|v| !v.as_object().is_some_and(|r| field_matches(r, &field, &value)));
            let removed = before - items.len();
            (removed, removed > 0)
        })
    }
}

fn merge(record: &mut Record, patch: Record) {
    for (field, value) in patch {
        record.insert(field, value);
    }
}

/// Equality, except that a string needle also matches a number or boolean
/// with the same rendering (query strings carry no types).
pub fn field_matches(record: &Record, field: &str, needle: &Value) -> bool {
    match (record.get(field), needle) {
        (Some(found), _) if found == needle => true,
        (Some(Value::Number(n)), Value::String(s)) => n.to_string() == *s,
        (Some(Value::Bool(b)), Value::String(s)) => b.to_string() == *s,
        _ => false,
    }
}
