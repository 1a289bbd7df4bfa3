//! Framework adapters for Filibuster instrumentation
//!
//! Wires the [`application::CallInterceptor`] into concrete RPC stacks:
//!
//! - [`GrpcClientLayer`] / [`GrpcServerLayer`]: `tower` layers for gRPC over
//!   `http::Request<axum::body::Body>`
//! - [`InstrumentedHttpClient`]: `reqwest` wrapper for outbound HTTP
//! - [`HttpServerLayer`]: `tower` layer for inbound HTTP
//! - [`session_routes`]: harness control endpoints for session lifecycle
//!
//! Client adapters assign an execution index to every outbound call and may
//! replace it with an injected fault. Server adapters restore the propagated
//! context so that calls made while handling a request nest under it.

pub mod adapter;
pub mod control;
pub mod grpc;
pub mod http;
mod inbound;
pub mod metadata;

pub use adapter::{CallSiteLabel, RpcAdapter, intercept};
pub use control::{ControlError, session_routes};
pub use grpc::{GrpcClientLayer, GrpcClientService, GrpcServerLayer, GrpcServerService};
pub use http::{
    HttpServerLayer, HttpServerService, InstrumentedHttpClient, InstrumentedRequestBuilder,
};
pub use metadata::{HeaderCarrier, HeaderView};
