//! Inbound gRPC context restoration

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use application::{CallInterceptor, ContextPropagator};
use axum::http::Request;
use tower::{Layer, Service};
use tracing::{Instrument, field};

use crate::{inbound::inbound_context, metadata::HeaderView};

/// Layer that runs gRPC handlers inside the caller's execution context
#[derive(Debug, Clone)]
pub struct GrpcServerLayer {
    interceptor: CallInterceptor,
}

impl GrpcServerLayer {
    #[must_use]
    pub const fn new(interceptor: CallInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for GrpcServerLayer {
    type Service = GrpcServerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcServerService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Service produced by [`GrpcServerLayer`]
#[derive(Debug, Clone)]
pub struct GrpcServerService<S> {
    inner: S,
    interceptor: CallInterceptor,
}

impl<S, B> Service<Request<B>> for GrpcServerService<S>
where
    S: Service<Request<B>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let span = tracing::info_span!(
            "grpc_request",
            path = %request.uri().path(),
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

        let inner = &mut self.inner;
        let future = ctx.clone().sync_scope(|| inner.call(request));
        Box::pin(ctx.scope(future).instrument(span))
    }
}
