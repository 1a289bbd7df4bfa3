//! Value objects - immutable domain primitives

mod call_signature;
mod call_site_id;
mod execution_index;
mod rpc_status;
mod session_id;

pub use call_signature::{CallSignature, digest_arguments};
pub use call_site_id::{CallSiteId, MAX_CALL_SITE_LEN};
pub use execution_index::{ExecutionIndex, IndexSegment, MAX_INDEX_DEPTH};
pub use rpc_status::{RpcStatus, resolve_http_status};
pub use session_id::{MAX_SESSION_ID_LEN, SessionId};
