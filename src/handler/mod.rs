//! Handler pipeline for agent requests.
//!
//! Every registration owns a chain of named handler nodes. The dispatcher
//! calls the chain head with a batch of requests and a mode; each node
//! either processes the batch itself, delegates to the next node through
//! the [`NextHandler`] capability, or lets the driver advance automatically
//! when it carries the `AUTO_NEXT` flag.
//!
//! # Implementing a handler
//!
//! A leaf handler implements [`HandlerAccess`] and answers requests by
//! mutating them:
//!
//! ```rust
//! use async_snmpd::handler::{
//!     BoxFuture, HandlerAccess, HandlerNode, HandlerResult, Mode, NextHandler, Request,
//!     RequestInfo,
//! };
//! use async_snmpd::registry::Registration;
//! use async_snmpd::{Value, oid};
//!
//! struct Uptime;
//!
//! impl HandlerAccess for Uptime {
//!     fn access<'a>(
//!         &'a self,
//!         _node: &'a HandlerNode,
//!         _next: NextHandler<'a>,
//!         _reginfo: &'a Registration,
//!         reqinfo: &'a RequestInfo,
//!         requests: &'a mut [Request],
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             for request in requests.iter_mut() {
//!                 match reqinfo.mode {
//!                     Mode::Get if request.varbind.oid == oid!(1, 3, 6, 1, 2, 1, 1, 3, 0) => {
//!                         request.set_value(Value::TimeTicks(12345));
//!                     }
//!                     _ => {}
//!                 }
//!             }
//!             Ok(())
//!         })
//!     }
//! }
//! ```
//!
//! Stock nodes ([`instance`], [`debug`], [`bulk_to_next`], the table helpers
//! in [`crate::table`]) are injected by name in front of leaf handlers to
//! take care of the mechanical parts.

mod baby_steps;
mod chain;
mod instance;
mod request;
mod traits;

pub use baby_steps::{BabyStep, BabyStepsAccess, baby_steps};
pub use chain::{HandlerChain, HandlerNode, NextHandler, NodeFlags, call_nodes};
pub(crate) use chain::broken_chain;
pub use instance::{bulk_to_next, debug, instance};
pub use request::{DataMap, Request, RequestContext, RequestInfo};
pub use traits::{BoxFuture, HandlerAccess, HandlerResult};

use crate::error::ErrorStatus;

/// Request processing modes.
///
/// The discriminant values are the ABI the helpers expect: the read modes
/// reuse the PDU tag octets, and the internal set phases count up from zero
/// in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Mode {
    /// Return the value for an exact OID.
    Get = 0xA0,
    /// Return the first binding whose name is strictly greater.
    GetNext = 0xA1,
    /// Repeated GETNEXT with non-repeater and max-repetition counts.
    GetBulk = 0xA5,
    /// Validate type and writability.
    SetReserve1 = 0,
    /// Allocate resources.
    SetReserve2 = 1,
    /// Apply the change reversibly.
    SetAction = 2,
    /// Make the change visible.
    SetCommit = 3,
    /// Release resources allocated in the reserve phases.
    SetFree = 4,
    /// Roll back an applied change.
    SetUndo = 5,
}

impl Mode {
    /// The raw ABI value.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// True for the read modes.
    pub const fn is_read(self) -> bool {
        matches!(self, Mode::Get | Mode::GetNext | Mode::GetBulk)
    }

    /// True for any of the set phases.
    pub const fn is_set(self) -> bool {
        !self.is_read()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::Get => "GET",
            Mode::GetNext => "GETNEXT",
            Mode::GetBulk => "GETBULK",
            Mode::SetReserve1 => "SET_RESERVE1",
            Mode::SetReserve2 => "SET_RESERVE2",
            Mode::SetAction => "SET_ACTION",
            Mode::SetCommit => "SET_COMMIT",
            Mode::SetFree => "SET_FREE",
            Mode::SetUndo => "SET_UNDO",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a GETNEXT pass over a batch, used by the dispatcher to decide
/// whether to advance to the following subtree.
pub(crate) fn request_answered(request: &Request) -> bool {
    request.processed && !request.varbind.value.is_exception()
}

/// Map a per-request error to the status reported for the whole PDU.
pub(crate) fn worst_status(requests: &[Request]) -> (ErrorStatus, i32) {
    for request in requests {
        if !request.status.is_ok() {
            return (request.status, request.index as i32 + 1);
        }
    }
    (ErrorStatus::NoError, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_abi_values() {
        assert_eq!(Mode::Get.as_i32(), 0xA0);
        assert_eq!(Mode::GetNext.as_i32(), 0xA1);
        assert_eq!(Mode::GetBulk.as_i32(), 0xA5);
        assert_eq!(Mode::SetReserve1.as_i32(), 0);
        assert_eq!(Mode::SetReserve2.as_i32(), 1);
        assert_eq!(Mode::SetAction.as_i32(), 2);
        assert_eq!(Mode::SetCommit.as_i32(), 3);
        assert_eq!(Mode::SetFree.as_i32(), 4);
        assert_eq!(Mode::SetUndo.as_i32(), 5);
    }

    #[test]
    fn test_mode_classification() {
        assert!(Mode::Get.is_read());
        assert!(Mode::GetBulk.is_read());
        assert!(!Mode::SetCommit.is_read());
        assert!(Mode::SetFree.is_set());
    }
}
