//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use async_snmpd::prelude::*;
//! ```
//!
//! This imports the agent entry points, the wire data model, the handler
//! pipeline types needed to implement a MIB module, and the [`oid!`] macro.

pub use crate::agent::{Agent, AgentBuilder};
pub use crate::error::{Error, ErrorStatus, Result};
pub use crate::handler::{
    BoxFuture, HandlerAccess, HandlerChain, HandlerNode, HandlerResult, Mode, NextHandler,
    Request, RequestContext, RequestInfo,
};
pub use crate::oid::Oid;
pub use crate::pdu::{Message, Pdu, PduType};
pub use crate::registry::{Registration, RegistrationModes};
pub use crate::value::Value;
pub use crate::varbind::VarBind;
pub use crate::version::Version;

#[doc(no_inline)]
pub use crate::oid;
