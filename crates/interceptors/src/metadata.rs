//! Header map carriers for propagated metadata
//!
//! gRPC metadata and HTTP headers share one representation on the wire, so
//! both adapters read and write propagated context through these wrappers.

use application::MetadataCarrier;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Writable [`MetadataCarrier`] over a header map
#[derive(Debug)]
pub struct HeaderCarrier<'a>(pub &'a mut HeaderMap);

impl MetadataCarrier for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.0.insert(name, value);
            },
            _ => debug!(key, "Skipping metadata entry that is not a valid header"),
        }
    }
}

/// Read-only [`MetadataCarrier`] over a header map, for inbound requests
#[derive(Debug, Clone, Copy)]
pub struct HeaderView<'a>(pub &'a HeaderMap);

impl MetadataCarrier for HeaderView<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn set(&mut self, key: &str, _value: String) {
        debug!(key, "Ignoring write to read-only header view");
    }
}
