//! Async facade used by download clients
//!
//! Responses are keyed by canonicalized request URL. Store calls are blocking
//! (they may touch the filesystem) so each one runs on tokio's blocking pool.

use crate::error::{Result, StorehouseError};
use crate::expiry::Expiry;
use crate::storage::Storehouse;
use crate::transformer::Transformer;
use std::sync::Arc;
use tracing::debug;
use url::Url;

const FRAME_MAGIC: u8 = 0xC7;
const FRAME_VERSION: u8 = 1;
const HEADER_LEN: usize = 8;

/// A fetched response body with the metadata needed to replay it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header, if the origin sent one
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }
}

/// Binary frame: magic, version, status (u16 BE), content type length
/// (u32 BE, `u32::MAX` for none), content type bytes, body
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTransformer;

const NO_CONTENT_TYPE: u32 = u32::MAX;

impl Transformer<CachedResponse> for ResponseTransformer {
    fn encode(&self, value: &CachedResponse) -> Result<Vec<u8>> {
        let content_type = value.content_type.as_deref().map(str::as_bytes);
        let type_len = match content_type {
            Some(bytes) => u32::try_from(bytes.len())
                .ok()
                .filter(|len| *len != NO_CONTENT_TYPE)
                .ok_or_else(|| StorehouseError::Encode("content type too long".to_string()))?,
            None => NO_CONTENT_TYPE,
        };

        let mut frame = Vec::with_capacity(
            HEADER_LEN + content_type.map_or(0, <[u8]>::len) + value.body.len(),
        );
        frame.push(FRAME_MAGIC);
        frame.push(FRAME_VERSION);
        frame.extend_from_slice(&value.status.to_be_bytes());
        frame.extend_from_slice(&type_len.to_be_bytes());
        if let Some(bytes) = content_type {
            frame.extend_from_slice(bytes);
        }
        frame.extend_from_slice(&value.body);
        Ok(frame)
    }

    fn decode(&self, bytes: &[u8]) -> Result<CachedResponse> {
        if bytes.len() < HEADER_LEN {
            return Err(StorehouseError::Decode("truncated response frame".to_string()));
        }
        if bytes[0] != FRAME_MAGIC {
            return Err(StorehouseError::Decode("not a cached response".to_string()));
        }
        if bytes[1] != FRAME_VERSION {
            return Err(StorehouseError::Decode(format!(
                "unsupported response frame version {}",
                bytes[1]
            )));
        }

        let status = u16::from_be_bytes([bytes[2], bytes[3]]);
        let type_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let rest = &bytes[HEADER_LEN..];

        let (content_type, body) = if type_len == NO_CONTENT_TYPE {
            (None, rest)
        } else {
            let len = type_len as usize;
            if rest.len() < len {
                return Err(StorehouseError::Decode("truncated content type".to_string()));
            }
            let (raw, body) = rest.split_at(len);
            let content_type = String::from_utf8(raw.to_vec())
                .map_err(|e| StorehouseError::Decode(e.to_string()))?;
            (Some(content_type), body)
        };

        Ok(CachedResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Canonical cache key for a request URL.
///
/// Scheme and host are lowercased and default ports dropped by the parser;
/// the fragment is removed and query pairs are sorted.
pub fn canonical_key(url: &str) -> Result<String> {
    let mut parsed = Url::parse(url)
        .map_err(|e| StorehouseError::Encode(format!("invalid URL {}: {}", url, e)))?;
    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(parsed.to_string())
}

/// Response cache for download clients
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn Storehouse<CachedResponse>>,
    default_expiry: Expiry,
}

impl ResponseCache {
    /// Wrap `store`; `default_expiry` applies when `store` is called without one
    pub fn new(store: Arc<dyn Storehouse<CachedResponse>>, default_expiry: Expiry) -> Self {
        Self {
            store,
            default_expiry,
        }
    }

    /// Cached response for `url`, or `None` when absent or expired
    pub async fn cached(&self, url: &str) -> Result<Option<CachedResponse>> {
        let key = canonical_key(url)?;
        let store = Arc::clone(&self.store);
        let found = tokio::task::spawn_blocking(move || store.lookup(&key)).await??;
        debug!(url, hit = found.is_some(), "Response cache lookup");
        Ok(found)
    }

    pub async fn store(
        &self,
        url: &str,
        response: CachedResponse,
        expiry: Option<Expiry>,
    ) -> Result<()> {
        let key = canonical_key(url)?;
        let expiry = expiry.unwrap_or(self.default_expiry);
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.set(&key, response, Some(expiry))).await?
    }

    pub async fn invalidate(&self, url: &str) -> Result<()> {
        let key = canonical_key(url)?;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.remove(&key)).await?
    }
}
