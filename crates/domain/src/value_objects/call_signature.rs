//! Call signature value object

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies *what* is being called, independent of where
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSignature {
    /// Remote service (gRPC service name, or HTTP authority)
    pub service_name: String,
    /// Remote method (gRPC method name, or `"METHOD /path"`)
    pub method_name: String,
    /// Hex BLAKE3 digest of the serialized arguments
    pub arguments_digest: String,
}

impl CallSignature {
    /// Create a signature, digesting the serialized arguments
    pub fn new(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        arguments: &[u8],
    ) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            arguments_digest: digest_arguments(arguments),
        }
    }

    /// Create a signature from an already computed digest
    pub fn with_digest(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        arguments_digest: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            arguments_digest: arguments_digest.into(),
        }
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.arguments_digest.get(..12).unwrap_or(&self.arguments_digest);
        write!(f, "{}/{}({short})", self.service_name, self.method_name)
    }
}

/// Lowercase hex BLAKE3 digest of call arguments
pub fn digest_arguments(arguments: &[u8]) -> String {
    blake3::hash(arguments).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let a = CallSignature::new("svcA", "rpc1", b"{\"id\":1}");
        let b = CallSignature::new("svcA", "rpc1", b"{\"id\":1}");
        let c = CallSignature::new("svcA", "rpc1", b"{\"id\":2}");

        assert_eq!(a, b);
        assert_ne!(a.arguments_digest, c.arguments_digest);
        assert_eq!(a.arguments_digest.len(), 64);
    }

    #[test]
    fn display_shortens_digest() {
        let sig = CallSignature::with_digest("svcA", "rpc1", "0123456789abcdef");
        assert_eq!(sig.to_string(), "svcA/rpc1(0123456789ab)");
    }

    #[test]
    fn serializes_camel_case() {
        let sig = CallSignature::with_digest("svcA", "rpc1", "d");
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"serviceName": "svcA", "methodName": "rpc1", "argumentsDigest": "d"})
        );
    }
}
