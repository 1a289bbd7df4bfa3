//! Inbound HTTP context restoration
//!
//! Decodes the caller's propagated context, runs the handler inside it and
//! echoes the request id on the response for log correlation.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use application::{CallInterceptor, ContextPropagator, REQUEST_ID_KEY};
use axum::http::{HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, field};

use crate::{inbound::inbound_context, metadata::HeaderView};

/// Layer that runs HTTP handlers inside the caller's execution context
#[derive(Debug, Clone)]
pub struct HttpServerLayer {
    interceptor: CallInterceptor,
}

impl HttpServerLayer {
    #[must_use]
    pub const fn new(interceptor: CallInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for HttpServerLayer {
    type Service = HttpServerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpServerService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Service produced by [`HttpServerLayer`]
#[derive(Debug, Clone)]
pub struct HttpServerService<S> {
    inner: S,
    interceptor: CallInterceptor,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpServerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + 'static,
    S::Future: Send + 'static,
    ReqBody: 'static,
    ResBody: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let span = tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri().path(),
            session_id = field::Empty,
            execution_index = field::Empty,
            forced_sleep = field::Empty,
        );
        let Some(ctx) = inbound_context(&self.interceptor, request.headers()) else {
            return Box::pin(self.inner.call(request).instrument(span));
        };
        span.record("session_id", field::display(ctx.session_id()));
        span.record("execution_index", field::display(ctx.index()));
        if let Some(sleep) = ContextPropagator::forced_sleep(&HeaderView(request.headers())) {
            span.record("forced_sleep", field::debug(sleep));
        }

        let request_id = ctx.request_id();
        let inner = &mut self.inner;
        let future = ctx.clone().sync_scope(|| inner.call(request));
        let future = ctx.scope(future);
        Box::pin(
            async move {
                let mut response = future.await?;
                if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                    response.headers_mut().insert(REQUEST_ID_KEY, value);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}
