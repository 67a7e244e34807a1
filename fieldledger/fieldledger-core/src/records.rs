//! Typed views of the stored collections.
//!
//! The file stays schema-less; these structs name the fields the
//! application relies on and keep everything else in `extra`, so a typed
//! read followed by a typed write never drops unknown fields.

use serde::de::DeserializeOwned;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::marker::PhantomData;

use crate::collections::DataStore;
use crate::error::{Result, StoreError};
use crate::ids::{ensure_identity, DEFAULT_ID_FIELD};
use crate::storage::Record;

/// A record type bound to one collection.
pub trait Entity: Serialize + DeserializeOwned + Send + 'static {
    const COLLECTION: &'static str;
    const ID_FIELD: &'static str = DEFAULT_ID_FIELD;
    /// Prefix for generated identities.
    const ID_PREFIX: &'static str;
}

/// Serialize `value` into a record. Anything that does not serialize to a
/// JSON object is rejected.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(serde_json::Error::custom(format!(
            "expected a record object, got {other}"
        )))),
    }
}

pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Project {
    const COLLECTION: &'static str = "projects";
    const ID_PREFIX: &'static str = "project";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Asset {
    const COLLECTION: &'static str = "assets";
    const ID_PREFIX: &'static str = "asset";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    /// `WORKER`, `SUPERVISOR`, `SITE_MANAGER`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Staff {
    const COLLECTION: &'static str = "staff";
    const ID_PREFIX: &'static str = "staff";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Vendor {
    const COLLECTION: &'static str = "vendors";
    const ID_PREFIX: &'static str = "vendor";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers_on_site: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for DailyLog {
    const COLLECTION: &'static str = "dailyLogs";
    const ID_PREFIX: &'static str = "log";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub vendor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for PurchaseOrder {
    const COLLECTION: &'static str = "purchaseOrders";
    const ID_PREFIX: &'static str = "po";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Invoice {
    const COLLECTION: &'static str = "invoices";
    const ID_PREFIX: &'static str = "inv";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code: Option<String>,
    #[serde(default)]
    pub quantity_received: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Goods received note.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsReceivedNote {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub po_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_by: Option<String>,
    #[serde(default)]
    pub lines: Vec<ReceivedLine>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for GoodsReceivedNote {
    const COLLECTION: &'static str = "grns";
    const ID_PREFIX: &'static str = "grn";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItem {
    #[serde(default)]
    pub item_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for BudgetItem {
    const COLLECTION: &'static str = "budgetItems";
    const ID_FIELD: &'static str = "itemCode";
    const ID_PREFIX: &'static str = "item";
}

/// Schedule activity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub activity_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Activity {
    const COLLECTION: &'static str = "activities";
    const ID_FIELD: &'static str = "activityCode";
    const ID_PREFIX: &'static str = "act";
}

/// Typed accessors for one [`Entity`], sharing the store's queue.
pub struct Collection<T> {
    store: DataStore,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Collection<T> {
    pub fn new(store: DataStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Every record that decodes as `T`; the rest are skipped with a warning.
    pub fn list(&self) -> impl Future<Output = Result<Vec<T>>> + Send + 'static {
        let queued = self.store.list(T::COLLECTION);
        async move { Ok(decode_all::<T>(queued.await?)) }
    }

    pub fn get(&self, id: &str) -> impl Future<Output = Result<Option<T>>> + Send + 'static {
        let queued = self.store.get_by_id(T::COLLECTION, id, T::ID_FIELD);
        async move { queued.await?.map(from_record).transpose() }
    }

    /// Append `entity`, generating its identity when blank.
    pub fn create(&self, entity: &T) -> impl Future<Output = Result<T>> + Send + 'static {
        let queued = to_record(entity).map(|mut record| {
            ensure_identity(&mut record, T::ID_FIELD, T::ID_PREFIX);
            self.store.create(T::COLLECTION, record)
        });
        async move { from_record(queued?.await?) }
    }

    pub fn update(
        &self,
        id: &str,
        patch: Record,
    ) -> impl Future<Output = Result<Option<T>>> + Send + 'static {
        let queued = self.store.update(T::COLLECTION, id, patch, T::ID_FIELD);
        async move { queued.await?.map(from_record).transpose() }
    }

    pub fn remove(&self, id: &str) -> impl Future<Output = Result<bool>> + Send + 'static {
        self.store.remove(T::COLLECTION, id, T::ID_FIELD)
    }

    pub fn find_where(
        &self,
        field: &str,
        value: Value,
    ) -> impl Future<Output = Result<Vec<T>>> + Send + 'static {
        let queued = self.store.find_where(T::COLLECTION, field, value);
        async move {
            let found = queued.await?;
            Ok(decode_all::<T>(found.into_iter().map(Value::Object)))
        }
    }
}

fn decode_all<T: Entity>(items: impl IntoIterator<Item = Value>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(entity) => Some(entity),
            Err(err) => {
                tracing::warn!(
                    collection = T::COLLECTION,
                    index,
                    error = %err,
                    "skipping record that does not decode",
                );
                None
            }
        })
        .collect()
}
