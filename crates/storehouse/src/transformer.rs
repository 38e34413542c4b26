//! Value <-> byte codecs used by every tier
//!
//! A transformer is handed to a store at construction. Memory tiers only use
//! it to price entries (the encoded length is the cost); the disk tier uses it
//! to write and read payload files.

use crate::error::{Result, StorehouseError};
use crate::response::{CachedResponse, ResponseTransformer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// Deterministic, side-effect-free codec between `T` and bytes
pub trait Transformer<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<T>;

    /// Cost charged against a capacity budget
    fn cost(&self, value: &T) -> Result<u64> {
        self.encode(value).map(|bytes| bytes.len() as u64)
    }
}

pub type SharedTransformer<T> = Arc<dyn Transformer<T>>;

/// Identity codec for raw payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesTransformer;

impl Transformer<Vec<u8>> for BytesTransformer {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn cost(&self, value: &Vec<u8>) -> Result<u64> {
        Ok(value.len() as u64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringTransformer;

impl Transformer<String> for StringTransformer {
    fn encode(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| StorehouseError::Decode(e.to_string()))
    }

    fn cost(&self, value: &String) -> Result<u64> {
        Ok(value.len() as u64)
    }
}

#[derive(Serialize)]
struct WrapperRef<'a, T> {
    object: &'a T,
}

#[derive(Deserialize)]
struct Wrapper<T> {
    object: T,
}

/// JSON codec for any serde type.
///
/// Values are wrapped as `{"object": value}` so bare primitives still encode
/// to a JSON object.
pub struct JsonTransformer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonTransformer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonTransformer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Transformer<T> for JsonTransformer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(&WrapperRef { object: value })
            .map_err(|e| StorehouseError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice::<Wrapper<T>>(bytes)
            .map(|wrapper| wrapper.object)
            .map_err(|e| StorehouseError::Decode(e.to_string()))
    }
}

pub fn bytes() -> SharedTransformer<Vec<u8>> {
    Arc::new(BytesTransformer)
}

pub fn string() -> SharedTransformer<String> {
    Arc::new(StringTransformer)
}

pub fn response() -> SharedTransformer<CachedResponse> {
    Arc::new(ResponseTransformer)
}

pub fn json<T>() -> SharedTransformer<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    Arc::new(JsonTransformer::<T>::new())
}
