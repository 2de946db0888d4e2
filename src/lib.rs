//! Async-first SNMP agent engine.
//!
//! This crate provides the middle layer of an SNMP agent: a BER codec, an
//! OID subtree registry, a composable handler pipeline, table helpers, the
//! transactional SET machine, and the dispatch loop that ties them to a
//! transport. Instrumentation (the actual MIB modules) plugs in through
//! [`handler::HandlerAccess`] and the stock helper nodes.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_snmpd::handler::{
//!     BoxFuture, HandlerAccess, HandlerNode, HandlerResult, Mode, NextHandler, Request,
//!     RequestInfo,
//! };
//! use async_snmpd::registry::Registration;
//! use async_snmpd::transport::UdpTransport;
//! use async_snmpd::{Agent, Value, oid};
//! use tokio_util::sync::CancellationToken;
//!
//! struct SysDescr;
//!
//! impl HandlerAccess for SysDescr {
//!     fn access<'a>(
//!         &'a self,
//!         _node: &'a HandlerNode,
//!         _next: NextHandler<'a>,
//!         reginfo: &'a Registration,
//!         reqinfo: &'a RequestInfo,
//!         requests: &'a mut [Request],
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             for request in requests.iter_mut() {
//!                 if reqinfo.mode == Mode::Get && request.varbind.oid == reginfo.root {
//!                     request.set_value(Value::OctetString("demo agent".into()));
//!                 }
//!             }
//!             Ok(())
//!         })
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> async_snmpd::Result<()> {
//!     let agent = Agent::builder()
//!         .community(&b"public"[..])
//!         .scalar("sysDescr", oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Arc::new(SysDescr))?
//!         .build();
//!
//!     let transport = UdpTransport::bind_address("udp:127.0.0.1:1161").await?;
//!     agent.serve(transport, CancellationToken::new()).await
//! }
//! ```
//!
//! # Layout
//!
//! - [`ber`]: tag/length/value codec, reverse and forward builders
//! - [`oid`]: the [`Oid`] type and the [`oid!`] macro
//! - [`value`], [`varbind`], [`pdu`]: wire data model
//! - [`registry`]: per-context subtree registrations
//! - [`handler`]: the chain driver, request state, stock helper nodes
//! - [`table`]: index decomposition, row containers, row iterators
//! - [`tc`]: RowStatus and StorageType transition checks
//! - [`agent`]: the dispatch loop and SET phase machine
//! - [`transport`]: the [`transport::AgentTransport`] contract and UDP
//! - [`store`]: persistent-store tokens and core config directives

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod agent;
pub mod ber;
pub mod error;
pub mod handler;
pub mod oid;
pub mod pdu;
pub mod prelude;
pub mod registry;
pub mod store;
pub mod table;
pub mod tc;
pub mod transport;
pub mod value;
pub mod varbind;
pub mod version;

pub use agent::{Agent, AgentBuilder};
pub use error::{Error, ErrorStatus, Result};
pub use oid::Oid;
pub use pdu::{Message, Pdu, PduType};
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;
