//! Read-only reference data: doctors, products and flat-rate expense tariffs.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use super::error::CollaboratorError;
use super::ids::{DoctorId, ExpenseTypeId, ProductId};
use super::money::Money;

pub trait Catalog: Send + Sync {
    fn doctor_exists(&self, id: &DoctorId) -> Result<bool, CollaboratorError>;
    fn product_exists(&self, id: &ProductId) -> Result<bool, CollaboratorError>;
    /// Tariff in effect right now; `None` for an unknown expense type.
    fn tariff_for(&self, expense_type: &ExpenseTypeId) -> Result<Option<Money>, CollaboratorError>;
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    doctors: RwLock<BTreeSet<DoctorId>>,
    products: RwLock<BTreeSet<ProductId>>,
    tariffs: RwLock<BTreeMap<ExpenseTypeId, Money>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_doctor(self, id: &str) -> Self {
        if let Ok(mut doctors) = self.doctors.write() {
            doctors.insert(DoctorId::new(id));
        }
        self
    }
    pub fn with_product(self, id: &str) -> Self {
        if let Ok(mut products) = self.products.write() {
            products.insert(ProductId::new(id));
        }
        self
    }
    pub fn with_tariff(self, expense_type: &str, tariff: Money) -> Self {
        if let Ok(mut tariffs) = self.tariffs.write() {
            tariffs.insert(ExpenseTypeId::new(expense_type), tariff);
        }
        self
    }
    /// Tariffs change over time; sheets never cache them.
    pub fn set_tariff(
        &self,
        expense_type: ExpenseTypeId,
        tariff: Money,
    ) -> Result<(), CollaboratorError> {
        self.tariffs
            .write()
            .map_err(|_| poisoned())?
            .insert(expense_type, tariff);
        Ok(())
    }
}

fn poisoned() -> CollaboratorError {
    CollaboratorError::new("catalog", "lock poisoned")
}

impl Catalog for MemoryCatalog {
    fn doctor_exists(&self, id: &DoctorId) -> Result<bool, CollaboratorError> {
        Ok(self.doctors.read().map_err(|_| poisoned())?.contains(id))
    }

    fn product_exists(&self, id: &ProductId) -> Result<bool, CollaboratorError> {
        Ok(self.products.read().map_err(|_| poisoned())?.contains(id))
    }

    fn tariff_for(&self, expense_type: &ExpenseTypeId) -> Result<Option<Money>, CollaboratorError> {
        Ok(self
            .tariffs
            .read()
            .map_err(|_| poisoned())?
            .get(expense_type)
            .copied())
    }
}
