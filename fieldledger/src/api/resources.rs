//! Mapping from URL resource names to stored collections.

use fieldledger_core::records::{
    Activity, Asset, BudgetItem, DailyLog, Entity, GoodsReceivedNote, Invoice, Project,
    PurchaseOrder, Staff, Vendor,
};

/// Records in another collection that point at a resource and go with it
/// on delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependent {
    pub collection: &'static str,
    pub field: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resource {
    pub path: &'static str,
    pub collection: &'static str,
    pub id_field: &'static str,
    pub id_prefix: &'static str,
    pub dependents: &'static [Dependent],
}

impl Resource {
    pub fn of<T: Entity>(path: &'static str) -> Self {
        Self {
            path,
            collection: T::COLLECTION,
            id_field: T::ID_FIELD,
            id_prefix: T::ID_PREFIX,
            dependents: &[],
        }
    }

    pub fn with_dependents(mut self, dependents: &'static [Dependent]) -> Self {
        self.dependents = dependents;
        self
    }
}

const PROJECT_DEPENDENTS: &[Dependent] = &[Dependent {
    collection: DailyLog::COLLECTION,
    field: "projectId",
}];

#[derive(Clone, Debug)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
}

impl ResourceRegistry {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(vec![
            Resource::of::<Project>("projects").with_dependents(PROJECT_DEPENDENTS),
            Resource::of::<Asset>("assets"),
            Resource::of::<Staff>("staff"),
            Resource::of::<Vendor>("vendors"),
            Resource::of::<DailyLog>("daily-logs"),
            Resource::of::<PurchaseOrder>("purchase-orders"),
            Resource::of::<Invoice>("invoices"),
            Resource::of::<GoodsReceivedNote>("grns"),
            Resource::of::<BudgetItem>("budget-items"),
            Resource::of::<Activity>("activities"),
        ])
    }
}
