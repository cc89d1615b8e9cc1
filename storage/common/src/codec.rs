//! Record codec for stored values. Bincode keeps stored records compact and
//! deterministic; schema evolution happens at the proto layer, not here.

use serde::{de::DeserializeOwned, Serialize};

use crate::StoreError;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> { Ok(bincode::serialize(value)?) }

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> { Ok(bincode::deserialize(bytes)?) }
