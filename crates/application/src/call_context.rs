//! Ambient execution context for instrumented tasks
//!
//! Server adapters decode the propagated metadata of an inbound request into
//! an `ExecutionContext` and run the handler inside [`ExecutionContext::scope`].
//! Outbound calls issued from that handler read it back with
//! [`ExecutionContext::current`] to derive their child index.
//!
//! # Examples
//!
//! ```
//! use application::ExecutionContext;
//! use domain::SessionId;
//!
//! # tokio_test::block_on(async {
//! let ctx = ExecutionContext::root(SessionId::parse("S1").unwrap());
//! let seen = ctx
//!     .scope(async { ExecutionContext::current().map(|c| c.session_id().to_string()) })
//!     .await;
//! assert_eq!(seen.as_deref(), Some("S1"));
//! assert!(ExecutionContext::current().is_none());
//! # });
//! ```

use std::future::Future;

use domain::{ExecutionIndex, SessionId};
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_CONTEXT: ExecutionContext;
}

/// Where the current task sits in the distributed call graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    session_id: SessionId,
    index: ExecutionIndex,
    request_id: Uuid,
}

impl ExecutionContext {
    /// Create a root context (`[]`) for a session, with a fresh request id
    #[must_use]
    pub fn root(session_id: SessionId) -> Self {
        Self {
            session_id,
            index: ExecutionIndex::root(),
            request_id: Uuid::new_v4(),
        }
    }

    /// Create a context from propagated values
    #[must_use]
    pub const fn new(session_id: SessionId, index: ExecutionIndex, request_id: Uuid) -> Self {
        Self {
            session_id,
            index,
            request_id,
        }
    }

    /// Session the current task belongs to
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Execution index of the request being handled
    #[must_use]
    pub const fn index(&self) -> &ExecutionIndex {
        &self.index
    }

    /// Id of the originating request
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The context of the running task, if any
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT_CONTEXT.try_with(Clone::clone).ok()
    }

    /// Run `future` with this context as the ambient context
    pub fn scope<F: Future>(self, future: F) -> impl Future<Output = F::Output> {
        CURRENT_CONTEXT.scope(self, future)
    }

    /// Run the synchronous closure `f` with this context as the ambient context
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT_CONTEXT.sync_scope(self, f)
    }
}

/// Carry the current ambient context (if any) into a future
///
/// Use this for work handed to `tokio::spawn`, which does not inherit
/// task-locals. The context is captured when this function is called, not
/// when the returned future is first polled.
pub fn in_current_context<F: Future>(future: F) -> impl Future<Output = F::Output> {
    let captured = ExecutionContext::current();
    async move {
        match captured {
            Some(ctx) => ctx.scope(future).await,
            None => future.await,
        }
    }
}
