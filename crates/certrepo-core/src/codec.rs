//! Conversion between typed entities and the store's value representation
//!
//! Stores hold [`serde_json::Value`] documents. The repository only supplies
//! typed read and write targets; how the value is laid out on disk or on
//! the wire is up to the store.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// Encode an entity into a store value
pub fn encode<E: Serialize>(entity: &E) -> Result<Value> {
    Ok(serde_json::to_value(entity)?)
}

/// Decode a store value into a typed entity
pub fn decode<E: DeserializeOwned>(value: Value) -> Result<E> {
    Ok(serde_json::from_value(value)?)
}
