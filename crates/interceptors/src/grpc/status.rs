//! gRPC status rendering
//!
//! Faults are delivered to the caller as a "trailers-only" response: HTTP
//! 200 with `grpc-status` and `grpc-message` in the headers and no body.

use axum::{
    body::Body,
    http::{HeaderValue, Response, StatusCode, header::CONTENT_TYPE},
};
use bytes::{BufMut, Bytes, BytesMut};
use domain::RpcStatus;

pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Percent-encode a status message as `grpc-message` requires
///
/// Printable ASCII other than `%` is kept; every other byte becomes `%XX`.
pub fn encode_message(message: &str) -> String {
    let mut encoded = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..=0x7e).contains(&byte) && byte != b'%' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// A trailers-only response carrying `status`
pub fn trailers_only(status: RpcStatus, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
    headers.insert(GRPC_STATUS, HeaderValue::from(status.code()));
    if let Ok(value) = HeaderValue::from_str(&encode_message(message)) {
        headers.insert(GRPC_MESSAGE, value);
    }
    response
}

/// Length-prefixed, uncompressed gRPC message frame
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 5);
    buf.put_u8(0);
    buf.put_u32(u32::try_from(payload.len()).unwrap_or(u32::MAX));
    buf.put_slice(payload);
    buf.freeze()
}

/// A successful response whose single message is `payload`
///
/// `grpc-status: 0` travels in the headers, as no trailers can be attached
/// to a buffered body.
pub fn framed_response(payload: &[u8]) -> Response<Body> {
    let mut response = Response::new(Body::from(frame(payload)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
    headers.insert(GRPC_STATUS, HeaderValue::from(RpcStatus::Ok.code()));
    response
}

/// Status visible in a response's headers
///
/// Trailers-only responses carry it here. For streamed responses the status
/// sits in trailers and the HTTP status is used instead.
pub fn status_of<B>(response: &Response<B>) -> RpcStatus {
    response
        .headers()
        .get(GRPC_STATUS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u16>().ok())
        .and_then(RpcStatus::from_code)
        .unwrap_or_else(|| RpcStatus::from_http_status(response.status().as_u16()))
}
