//! Instrumented HTTP client
//!
//! Wraps `reqwest::Client`. Every request sent through
//! [`InstrumentedRequestBuilder::send`] gets an execution index, carries the
//! propagated context in `x-filibuster-*` headers and may be answered by an
//! injected fault instead of the remote server.
//!
//! # Examples
//!
//! ```ignore
//! use interceptors::InstrumentedHttpClient;
//!
//! let client = InstrumentedHttpClient::new(reqwest::Client::new(), interceptor);
//! let response = client
//!     .get("http://inventory:8080/items/42")
//!     .send()
//!     .await?;
//! ```

use std::time::Duration;

use application::{
    CallInterceptor, CallResult, ContextPropagator, InterceptedCall, PropagatedMetadata,
};
use axum::http::{self, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE};
use domain::{CallSignature, CallSiteId, InjectedFault, resolve_http_status};
use reqwest::{Client, Method, Request, RequestBuilder, Response};
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
    adapter::{RpcAdapter, intercept},
    metadata::{HeaderCarrier, HeaderView},
};

/// HTTP client whose requests pass through the call interceptor
#[derive(Debug, Clone)]
pub struct InstrumentedHttpClient {
    inner: Client,
    interceptor: CallInterceptor,
}

impl InstrumentedHttpClient {
    #[must_use]
    pub const fn new(inner: Client, interceptor: CallInterceptor) -> Self {
        Self { inner, interceptor }
    }

    /// The underlying reqwest client
    #[must_use]
    pub const fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn get(&self, url: impl AsRef<str>) -> InstrumentedRequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl AsRef<str>) -> InstrumentedRequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl AsRef<str>) -> InstrumentedRequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: impl AsRef<str>) -> InstrumentedRequestBuilder {
        self.request(Method::DELETE, url)
    }

    pub fn patch(&self, url: impl AsRef<str>) -> InstrumentedRequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Start a request with a specific method
    pub fn request(&self, method: Method, url: impl AsRef<str>) -> InstrumentedRequestBuilder {
        InstrumentedRequestBuilder {
            client: self.clone(),
            inner: self.inner.request(method, url.as_ref()),
            call_site: None,
        }
    }
}

/// Request builder returned by [`InstrumentedHttpClient`]
pub struct InstrumentedRequestBuilder {
    client: InstrumentedHttpClient,
    inner: RequestBuilder,
    call_site: Option<CallSiteId>,
}

impl std::fmt::Debug for InstrumentedRequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedRequestBuilder")
            .field("call_site", &self.call_site)
            .finish_non_exhaustive()
    }
}

impl InstrumentedRequestBuilder {
    /// Override the call site (default: `"{authority}.{METHOD /path}"`)
    #[must_use]
    pub fn call_site(mut self, call_site: CallSiteId) -> Self {
        self.call_site = Some(call_site);
        self
    }

    /// Add a header; an invalid name or value fails the request in [`send`](Self::send)
    #[must_use]
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.inner = self.inner.header(name, value);
        self
    }

    #[must_use]
    pub fn json<T: serde::Serialize + ?Sized>(mut self, json: &T) -> Self {
        self.inner = self.inner.json(json);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<reqwest::Body>) -> Self {
        self.inner = self.inner.body(body);
        self
    }

    #[must_use]
    pub fn query<T: serde::Serialize + ?Sized>(mut self, query: &T) -> Self {
        self.inner = self.inner.query(query);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.timeout(timeout);
        self
    }

    /// Send the request through the interceptor
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built or the real call
    /// fails. Injected errors arrive as ordinary error-status responses.
    #[instrument(skip(self), fields(call_site = ?self.call_site))]
    pub async fn send(self) -> Result<Response, reqwest::Error> {
        let Self {
            client,
            inner,
            call_site,
        } = self;
        let request = inner.build()?;
        let (service, method) = signature_parts(&request);

        let call_site = call_site.or_else(|| {
            CallSiteId::for_method(&service, &method)
                .inspect_err(|e| debug!(error = %e, "No call site for HTTP call, not intercepting"))
                .ok()
        });
        let Some(call_site) = call_site else {
            return client.inner.execute(request).await;
        };

        let arguments = request
            .body()
            .and_then(reqwest::Body::as_bytes)
            .unwrap_or_default();
        let signature = CallSignature::new(service, method, arguments);
        let bypass = ContextPropagator::is_instrumentation_request(&HeaderView(request.headers()));
        let call = InterceptedCall::new(call_site, signature).bypassed(bypass);

        let transport = client.inner.clone();
        intercept(&client.interceptor, &HttpAdapter, call, request, move |request| async move {
            transport.execute(request).await
        })
        .await
    }
}

/// `(authority, "METHOD /path")` of a request
fn signature_parts(request: &Request) -> (String, String) {
    let url = request.url();
    let host = url.host_str().unwrap_or_default();
    let authority = url
        .port()
        .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
    (authority, format!("{} {}", request.method(), url.path()))
}

struct HttpAdapter;

impl RpcAdapter for HttpAdapter {
    type Request = Request;
    type Response = Response;
    type Error = reqwest::Error;

    fn attach_metadata(&self, request: &mut Self::Request, metadata: &PropagatedMetadata) {
        metadata.inject_into(&mut HeaderCarrier(request.headers_mut()));
    }

    fn manufacture(&self, fault: &InjectedFault) -> Self::Response {
        match fault {
            InjectedFault::Error { kind, detail } => {
                let status = StatusCode::from_u16(resolve_http_status(kind))
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let body = json!({ "error": kind, "detail": detail }).to_string();
                let mut response = http::Response::new(body);
                *response.status_mut() = status;
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Response::from(response)
            },
            InjectedFault::CorruptedResponse { payload } => {
                Response::from(http::Response::new(payload.clone()))
            },
        }
    }

    fn classify(&self, result: &Result<Self::Response, Self::Error>) -> CallResult {
        match result {
            Ok(response) if response.status().is_success() => CallResult::Success,
            Ok(response) => CallResult::failure(response.status().as_str()),
            Err(e) if e.is_timeout() => CallResult::failure("DEADLINE_EXCEEDED"),
            Err(_) => CallResult::failure("UNAVAILABLE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(method: Method, url: &str) -> Request {
        Client::new().request(method, url).build().unwrap()
    }

    #[test]
    fn signature_uses_authority_and_route() {
        let request = build(Method::GET, "http://inventory:8080/items/42?x=1");
        assert_eq!(
            signature_parts(&request),
            ("inventory:8080".to_string(), "GET /items/42".to_string())
        );

        let request = build(Method::POST, "http://inventory/items");
        assert_eq!(
            signature_parts(&request),
            ("inventory".to_string(), "POST /items".to_string())
        );
    }

    #[tokio::test]
    async fn invalid_header_fails_send() {
        let interceptor = CallInterceptor::new(
            std::sync::Arc::new(application::SessionRegistry::new()),
            application::FaultDecisionService::offline(),
            application::InterceptorSettings::default(),
        );
        let client = InstrumentedHttpClient::new(Client::new(), interceptor);

        let result = client
            .get("http://inventory/items")
            .header("x-note", "bad\nvalue")
            .send()
            .await;

        assert!(result.unwrap_err().is_builder());
    }

    #[tokio::test]
    async fn error_fault_maps_to_status_and_json() {
        let response = HttpAdapter.manufacture(&InjectedFault::Error {
            kind: "UNAVAILABLE".to_string(),
            detail: Some("down".to_string()),
        });
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({"error": "UNAVAILABLE", "detail": "down"}));
    }

    #[test]
    fn numeric_kind_is_http_status() {
        let response = HttpAdapter.manufacture(&InjectedFault::Error {
            kind: "429".to_string(),
            detail: None,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            HttpAdapter.classify(&Ok(response)),
            CallResult::failure("429")
        );
    }

    #[tokio::test]
    async fn corrupt_fault_is_ok_with_payload() {
        let response = HttpAdapter.manufacture(&InjectedFault::CorruptedResponse {
            payload: b"{not json".to_vec(),
        });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.bytes().await.unwrap()[..], b"{not json");
    }
}
