//! Context propagation over transport metadata
//!
//! Encodes the execution context of an outbound call into reserved
//! `x-filibuster-*` metadata entries and decodes it on the receiving side.
//! Decoding never fails a call: anything missing or malformed is reported
//! as "not present" and the receiver starts a fresh root index.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use domain::{DomainError, ExecutionIndex, SessionId};
use tracing::debug;
use uuid::Uuid;

use crate::error::ApplicationError;

/// Prefix shared by every propagated metadata key
pub const METADATA_PREFIX: &str = "x-filibuster-";
/// Encoded execution index of the call
pub const EXECUTION_INDEX_KEY: &str = "x-filibuster-execution-index";
/// Session the call belongs to
pub const SESSION_ID_KEY: &str = "x-filibuster-session-id";
/// Originating request id
pub const REQUEST_ID_KEY: &str = "x-filibuster-request-id";
/// Marks traffic issued by the instrumentation itself
pub const INSTRUMENTATION_KEY: &str = "x-filibuster-instrumentation";
/// Latency in milliseconds injected in front of this hop
pub const FORCED_SLEEP_KEY: &str = "x-filibuster-forced-sleep";

/// Largest encoded index accepted when decoding
pub const MAX_ENCODED_INDEX_LEN: usize = 64 * 1024;

/// Read/write access to a framework's metadata map
pub trait MetadataCarrier {
    /// Get the value for `key`, if present and textual
    fn get(&self, key: &str) -> Option<&str>;

    /// Set `key` to `value`, replacing any previous value
    fn set(&mut self, key: &str, value: String);
}

impl MetadataCarrier for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

impl MetadataCarrier for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

/// Metadata entries to attach to one outbound call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagatedMetadata {
    entries: BTreeMap<String, String>,
}

impl PropagatedMetadata {
    /// No entries
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if nothing needs to be attached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write every entry into `carrier`
    pub fn inject_into<C: MetadataCarrier + ?Sized>(&self, carrier: &mut C) {
        for (key, value) in &self.entries {
            carrier.set(key, value.clone());
        }
    }
}

impl MetadataCarrier for PropagatedMetadata {
    fn get(&self, key: &str) -> Option<&str> {
        Self::get(self, key)
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }
}

/// Context recovered from inbound metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedContext {
    pub session_id: SessionId,
    pub index: ExecutionIndex,
    pub request_id: Option<Uuid>,
}

/// Encodes and decodes execution context metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPropagator;

impl ContextPropagator {
    /// Encode an execution index as a header-safe string
    ///
    /// The format is unpadded base64url of the JSON segment list, which keeps
    /// arbitrary call site names inside the visible-ASCII header alphabet.
    pub fn encode_index(index: &ExecutionIndex) -> Result<String, ApplicationError> {
        let json = serde_json::to_vec(index)
            .map_err(|e| ApplicationError::Internal(format!("index serialization: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a string produced by [`ContextPropagator::encode_index`]
    pub fn decode_index(encoded: &str) -> Result<ExecutionIndex, DomainError> {
        if encoded.len() > MAX_ENCODED_INDEX_LEN {
            return Err(DomainError::malformed(format!(
                "encoded index of {} bytes exceeds {MAX_ENCODED_INDEX_LEN}",
                encoded.len()
            )));
        }
        let json = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| DomainError::malformed(format!("index base64: {e}")))?;
        serde_json::from_slice(&json).map_err(|e| DomainError::malformed(format!("index json: {e}")))
    }

    /// Build the metadata for an outbound call
    pub fn encode(
        index: &ExecutionIndex,
        session_id: &SessionId,
        request_id: Uuid,
    ) -> Result<PropagatedMetadata, ApplicationError> {
        let mut metadata = PropagatedMetadata::empty();
        metadata.set(EXECUTION_INDEX_KEY, Self::encode_index(index)?);
        metadata.set(SESSION_ID_KEY, session_id.to_string());
        metadata.set(REQUEST_ID_KEY, request_id.to_string());
        Ok(metadata)
    }

    /// Strict decoding
    ///
    /// * no session and no index: `Ok(None)`
    /// * session without index: root index in that session
    /// * index without session, or any undecodable value: error
    pub fn try_decode<C: MetadataCarrier + ?Sized>(
        carrier: &C,
    ) -> Result<Option<DecodedContext>, ApplicationError> {
        let session = carrier.get(SESSION_ID_KEY);
        let index = carrier.get(EXECUTION_INDEX_KEY);

        let session_id = match (session, index) {
            (None, None) => return Ok(None),
            (None, Some(_)) => {
                return Err(ApplicationError::MalformedPropagatedMetadata(
                    "execution index without session id".to_string(),
                ));
            },
            (Some(raw), _) => SessionId::parse(raw.trim())
                .map_err(|e| ApplicationError::MalformedPropagatedMetadata(e.to_string()))?,
        };

        let index = match index {
            Some(raw) => Self::decode_index(raw)
                .map_err(|e| ApplicationError::MalformedPropagatedMetadata(e.to_string()))?,
            None => ExecutionIndex::root(),
        };

        let request_id = carrier
            .get(REQUEST_ID_KEY)
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok());

        Ok(Some(DecodedContext {
            session_id,
            index,
            request_id,
        }))
    }

    /// Tolerant decoding: malformed metadata is treated as absent
    pub fn decode<C: MetadataCarrier + ?Sized>(carrier: &C) -> Option<DecodedContext> {
        match Self::try_decode(carrier) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed propagated metadata");
                None
            },
        }
    }

    /// Record the injected latency for the receiving service
    pub fn attach_forced_sleep(metadata: &mut PropagatedMetadata, delay: Duration) {
        metadata.set(FORCED_SLEEP_KEY, delay.as_millis().to_string());
    }

    /// Latency injected in front of an inbound request, if any
    pub fn forced_sleep<C: MetadataCarrier + ?Sized>(carrier: &C) -> Option<Duration> {
        carrier
            .get(FORCED_SLEEP_KEY)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// True if the carrier marks a request issued by the instrumentation itself
    pub fn is_instrumentation_request<C: MetadataCarrier + ?Sized>(carrier: &C) -> bool {
        carrier
            .get(INSTRUMENTATION_KEY)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}
