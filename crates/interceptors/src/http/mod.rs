//! Plain HTTP adapters

mod client;
mod server;

pub use client::{InstrumentedHttpClient, InstrumentedRequestBuilder};
pub use server::{HttpServerLayer, HttpServerService};
