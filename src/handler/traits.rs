//! HandlerAccess trait and related types.

use std::future::Future;
use std::pin::Pin;

use crate::registry::Registration;

use super::chain::{HandlerNode, NextHandler};
use super::request::{Request, RequestInfo};
use crate::error::ErrorStatus;

/// Type alias for boxed async return type (dyn-compatible).
///
/// This type is required because async trait methods cannot be object-safe.
/// Handler access functions return `BoxFuture` so chains can hold handlers
/// as trait objects.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one handler invocation.
///
/// `Ok(())` is the no-error return; an `Err` carries the protocol status
/// that aborts processing of the batch (the per-request granularity lives
/// in [`Request::status`](super::Request)).
pub type HandlerResult = std::result::Result<(), ErrorStatus>;

/// Access function of a handler node.
///
/// The node receives itself (for one-shot flag manipulation), the rest of
/// the chain as a [`NextHandler`] capability, the owning registration, the
/// per-PDU request info, and the batch of requests routed to this
/// registration.
///
/// A node that carries [`NodeFlags::AUTO_NEXT`](super::NodeFlags) should not
/// call `next` itself; the chain driver advances after it returns. Every
/// other node is expected to call `next.call(...)` explicitly if processing
/// should continue down the chain.
pub trait HandlerAccess: Send + Sync + 'static {
    /// Process a batch of requests in the given mode.
    fn access<'a>(
        &'a self,
        node: &'a HandlerNode,
        next: NextHandler<'a>,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult>;
}

