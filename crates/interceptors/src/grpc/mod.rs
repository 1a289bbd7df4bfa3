//! gRPC adapters
//!
//! gRPC runs over HTTP/2 with `/package.Service/Method` paths, so both layers
//! operate on `http::Request<axum::body::Body>` and compose with any
//! `tower`-based gRPC stack.

mod client;
mod server;
pub mod status;

pub use client::{GrpcClientLayer, GrpcClientService, MAX_BUFFERED_BODY};
pub use server::{GrpcServerLayer, GrpcServerService};
