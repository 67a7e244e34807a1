//! Record identity helpers.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::storage::Record;

pub const DEFAULT_ID_FIELD: &str = "id";

/// `<prefix>-<unix millis>-<6 random hex chars>`, e.g. `staff-1718000000000-3f9a1c`.
pub fn generate_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), &suffix[..6])
}

/// Assign a generated identity when `record` has none (missing, null or an
/// empty string). Returns the identity the record ends up with.
pub fn ensure_identity(record: &mut Record, id_field: &str, prefix: &str) -> String {
    if let Some(existing) = record.get(id_field).and_then(identity_string) {
        if !existing.is_empty() {
            return existing;
        }
    }
    let id = generate_id(prefix);
    record.insert(id_field.to_string(), Value::String(id.clone()));
    id
}

/// Whether `record[id_field]` identifies as `id`. Numeric identities compare
/// by their decimal rendering so path strings can address them.
pub fn matches_identity(record: &Record, id_field: &str, id: &str) -> bool {
    record
        .get(id_field)
        .and_then(identity_string)
        .is_some_and(|value| value == id)
}

fn identity_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
