//! Outbound gRPC interception

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use application::{
    CallInterceptor, CallResult, ContextPropagator, InterceptedCall, PropagatedMetadata,
};
use axum::{
    body::{Body, Bytes, HttpBody},
    http::{Extensions, Request, Response},
};
use domain::{CallSignature, CallSiteId, InjectedFault, RpcStatus};
use tower::{BoxError, Layer, Service};
use tracing::debug;

use super::status::{framed_response, status_of, trailers_only};
use crate::{
    adapter::{CallSiteLabel, RpcAdapter, intercept},
    metadata::{HeaderCarrier, HeaderView},
};

/// Largest request body treated as a unary call
///
/// Streamed bodies, and bodies larger than this, are forwarded untouched
/// without an execution index or fault decision.
pub const MAX_BUFFERED_BODY: usize = 4 * 1024 * 1024;

/// Layer that intercepts outbound gRPC calls
#[derive(Debug, Clone)]
pub struct GrpcClientLayer {
    interceptor: CallInterceptor,
}

impl GrpcClientLayer {
    #[must_use]
    pub const fn new(interceptor: CallInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for GrpcClientLayer {
    type Service = GrpcClientService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcClientService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Service produced by [`GrpcClientLayer`]
#[derive(Debug, Clone)]
pub struct GrpcClientService<S> {
    inner: S,
    interceptor: CallInterceptor,
}

impl<S> Service<Request<Body>> for GrpcClientService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Use the service that was polled ready and leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();

        Box::pin(async move {
            let Some((service, method)) = parse_path(request.uri().path()) else {
                return inner.call(request).await.map_err(Into::into);
            };
            if !is_unary(request.body().size_hint().exact()) {
                debug!(%service, %method, "Streaming gRPC call, not intercepting");
                return inner.call(request).await.map_err(Into::into);
            }
            let Some(call_site) = call_site(request.extensions(), &service, &method) else {
                return inner.call(request).await.map_err(Into::into);
            };

            let (request, arguments) = buffer_body(request).await?;
            let bypass = ContextPropagator::is_instrumentation_request(&HeaderView(request.headers()));
            let signature = CallSignature::new(service, method, &arguments);
            let call = InterceptedCall::new(call_site, signature).bypassed(bypass);

            intercept(&interceptor, &GrpcAdapter, call, request, move |request| async move {
                inner.call(request).await.map_err(Into::into)
            })
            .await
        })
    }
}

struct GrpcAdapter;

impl RpcAdapter for GrpcAdapter {
    type Request = Request<Body>;
    type Response = Response<Body>;
    type Error = BoxError;

    fn attach_metadata(&self, request: &mut Self::Request, metadata: &PropagatedMetadata) {
        metadata.inject_into(&mut HeaderCarrier(request.headers_mut()));
    }

    fn manufacture(&self, fault: &InjectedFault) -> Self::Response {
        match fault {
            InjectedFault::Error { kind, detail } => {
                let status = RpcStatus::resolve(kind);
                let message = detail.as_deref().unwrap_or("injected by filibuster");
                trailers_only(status, message)
            },
            InjectedFault::CorruptedResponse { payload } => framed_response(payload),
        }
    }

    fn classify(&self, result: &Result<Self::Response, Self::Error>) -> CallResult {
        match result {
            Ok(response) => match status_of(response) {
                RpcStatus::Ok => CallResult::Success,
                status => CallResult::failure(status.name()),
            },
            Err(_) => CallResult::failure(RpcStatus::Unavailable.name()),
        }
    }
}

/// Split `/package.Service/Method` into service and method
fn parse_path(path: &str) -> Option<(String, String)> {
    let (service, method) = path.strip_prefix('/')?.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service.to_string(), method.to_string()))
}

fn call_site(extensions: &Extensions, service: &str, method: &str) -> Option<CallSiteId> {
    if let Some(CallSiteLabel(label)) = extensions.get::<CallSiteLabel>() {
        return Some(label.clone());
    }
    CallSiteId::for_method(service, method)
        .inspect_err(|e| debug!(error = %e, "No call site for gRPC call, not intercepting"))
        .ok()
}

/// A unary request carries one message, so its body length is known up front
fn is_unary(exact_len: Option<u64>) -> bool {
    exact_len.is_some_and(|len| usize::try_from(len).is_ok_and(|len| len <= MAX_BUFFERED_BODY))
}

/// Buffer a unary body so its bytes can be digested
async fn buffer_body(request: Request<Body>) -> Result<(Request<Body>, Bytes), BoxError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BUFFERED_BODY).await?;
    Ok((Request::from_parts(parts, Body::from(bytes.clone())), bytes))
}
