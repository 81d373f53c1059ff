//! Process-wide schema cache. Each model type is derived at most once, even under
//! concurrent first use; later lookups share the cached result.

use crate::error::SchemaError;
use crate::schema::model::{derive, Model, ModelSchema};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

type Slot = Arc<OnceLock<Result<Arc<ModelSchema>, SchemaError>>>;

#[derive(Default)]
pub struct SchemaRegistry {
    slots: RwLock<HashMap<TypeId, Slot>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schema of `M`, or the derivation error (also cached).
    pub fn try_schema_of<M: Model>(&self) -> Result<Arc<ModelSchema>, SchemaError> {
        let slot = self.slot(TypeId::of::<M>());
        slot.get_or_init(|| {
            let derived = derive::<M>().map(Arc::new);
            match &derived {
                Ok(schema) => tracing::debug!(model = %schema.id, kind = %schema.kind(), "derived model schema"),
                Err(e) => tracing::warn!(model = type_name::<M>(), error = %e, "unable to derive model schema"),
            }
            derived
        })
        .clone()
    }

    /// Cached schema of `M`; an empty schema when derivation failed.
    pub fn schema_of<M: Model>(&self) -> Arc<ModelSchema> {
        self.try_schema_of::<M>()
            .unwrap_or_else(|_| Arc::new(ModelSchema::empty(type_name::<M>())))
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: TypeId) -> Slot {
        if let Some(slot) = self.slots.read().unwrap_or_else(PoisonError::into_inner).get(&id) {
            return slot.clone();
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }
}
