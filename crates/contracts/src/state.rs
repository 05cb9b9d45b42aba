//! PipelineState - the keyed value store passed between stages
//!
//! Values are kept as `serde_json::Value` so that any stage can hand its
//! output forward without the orchestrator knowing the concrete type. Typed
//! access goes through serde at the boundary.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ContractError;

/// Shared pipeline state (key -> produced value)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineState {
    values: BTreeMap<String, Value>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw value, replacing any previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Serialize and insert a typed value
    pub fn insert_typed<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), ContractError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| {
            ContractError::Other(format!("failed to serialize state value '{key}': {e}"))
        })?;
        self.values.insert(key, value);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read on behalf of `stage`
    ///
    /// # Errors
    /// `StageInput` if the key is absent or does not have the expected shape.
    pub fn get<T: DeserializeOwned>(&self, stage: &str, key: &str) -> Result<T, ContractError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ContractError::stage_input(stage, key, "missing from pipeline state"))?;
        T::deserialize(value)
            .map_err(|e| ContractError::stage_input(stage, key, format!("unexpected shape: {e}")))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl From<BTreeMap<String, Value>> for PipelineState {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}
