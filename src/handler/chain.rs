//! Handler chain construction and the call driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, trace};

use crate::error::{Error, ErrorStatus, RegistryErrorKind, Result};
use crate::registry::Registration;

use super::request::{Request, RequestInfo};
use super::traits::{BoxFuture, HandlerAccess, HandlerResult};

bitflags::bitflags! {
    /// Per-node behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u32 {
        /// The node answers exact instances; helpers may skip index parsing.
        const INSTANCE = 0x01;
        /// The chain driver calls the next node when this one returns.
        const AUTO_NEXT = 0x02;
    }
}

/// One node in a handler chain.
///
/// The payload (`myvoid` in the classical API) is the behavior trait object
/// itself; nodes are shared between cloned chains through `Arc`.
pub struct HandlerNode {
    name: String,
    flags: NodeFlags,
    behavior: Arc<dyn HandlerAccess>,
    /// One-shot suppression of AUTO_NEXT, consumed by the driver.
    override_once: AtomicBool,
}

impl HandlerNode {
    /// Create a node with no flags.
    pub fn new(name: impl Into<String>, behavior: Arc<dyn HandlerAccess>) -> Self {
        Self::with_flags(name, behavior, NodeFlags::empty())
    }

    /// Create a node with the given flags.
    pub fn with_flags(
        name: impl Into<String>,
        behavior: Arc<dyn HandlerAccess>,
        flags: NodeFlags,
    ) -> Self {
        Self {
            name: name.into(),
            flags,
            behavior,
            override_once: AtomicBool::new(false),
        }
    }

    /// The node's name, used for injection targeting.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's flags.
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Suppress the driver's automatic advance exactly once.
    ///
    /// Used by AUTO_NEXT helpers that have already called the next handler
    /// themselves this round (e.g. after converting GETNEXT to GET).
    pub fn skip_auto_next_once(&self) {
        self.override_once.store(true, Ordering::Relaxed);
    }

    fn take_override_once(&self) -> bool {
        self.override_once.swap(false, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HandlerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerNode")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// An ordered chain of handler nodes, head first.
///
/// Chains are cheap to clone; nodes are shared. A registration duplicated
/// across a range of sub-identifiers shares the same nodes.
#[derive(Debug, Clone, Default)]
pub struct HandlerChain {
    nodes: Vec<Arc<HandlerNode>>,
}

impl HandlerChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chain with a single node.
    pub fn single(node: HandlerNode) -> Self {
        Self {
            nodes: vec![Arc::new(node)],
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the chain has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The nodes, head first.
    pub fn nodes(&self) -> &[Arc<HandlerNode>] {
        &self.nodes
    }

    /// Put a node (and thus its whole sub-chain position) at the head.
    pub fn inject(&mut self, node: HandlerNode) {
        self.nodes.insert(0, Arc::new(node));
    }

    /// Splice a node immediately before the node named `before_what`.
    ///
    /// With `before_what` of `None`, the node becomes the new head.
    pub fn inject_before(&mut self, node: HandlerNode, before_what: Option<&str>) -> Result<()> {
        match before_what {
            None => {
                self.inject(node);
                Ok(())
            }
            Some(name) => {
                let Some(pos) = self.nodes.iter().position(|n| n.name() == name) else {
                    error!(before = name, "no handler to inject before");
                    return Err(Error::registry(RegistryErrorKind::RegistrationFailed));
                };
                debug!(handler = node.name(), before = name, "injecting handler");
                self.nodes.insert(pos, Arc::new(node));
                Ok(())
            }
        }
    }

    /// Find a node by name.
    pub fn find(&self, name: &str) -> Option<&Arc<HandlerNode>> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    /// Call the chain from the head.
    pub fn call<'a>(
        &'a self,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        call_nodes(&self.nodes, reginfo, reqinfo, requests)
    }
}

/// Capability handed to a handler for invoking the rest of its chain.
#[derive(Clone, Copy)]
pub struct NextHandler<'a> {
    nodes: &'a [Arc<HandlerNode>],
}

impl<'a> NextHandler<'a> {
    /// An empty continuation (end of chain).
    pub fn empty() -> Self {
        Self { nodes: &[] }
    }

    /// True if there is no further handler.
    pub fn is_end(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Call the remaining chain.
    pub fn call<'b>(
        self,
        reginfo: &'b Registration,
        reqinfo: &'b RequestInfo,
        requests: &'b mut [Request],
    ) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        call_nodes(self.nodes, reginfo, reqinfo, requests)
    }

    /// Call the remaining chain for a single request.
    pub fn call_one<'b>(
        self,
        reginfo: &'b Registration,
        reqinfo: &'b RequestInfo,
        request: &'b mut Request,
    ) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        call_nodes(self.nodes, reginfo, reqinfo, std::slice::from_mut(request))
    }
}

/// Drive a node list: call the head, then keep advancing over AUTO_NEXT
/// nodes unless one of them suppressed the advance for this round.
///
/// The final node of a chain frequently carries no continuation; reaching
/// the end of the list is a normal return.
pub fn call_nodes<'b>(
    nodes: &'b [Arc<HandlerNode>],
    reginfo: &'b Registration,
    reqinfo: &'b RequestInfo,
    requests: &'b mut [Request],
) -> BoxFuture<'b, HandlerResult> {
    Box::pin(async move {
        let mut nodes = nodes;
        let mut ret: HandlerResult = Ok(());
        while let Some((head, tail)) = nodes.split_first() {
            trace!(handler = head.name(), mode = %reqinfo.mode, "calling handler");
            let next = NextHandler { nodes: tail };
            ret = head
                .behavior
                .access(head, next, reginfo, reqinfo, &mut *requests)
                .await;
            trace!(handler = head.name(), ok = ret.is_ok(), "handler returned");

            if !head.flags().contains(NodeFlags::AUTO_NEXT) {
                break;
            }
            if head.take_override_once() {
                break;
            }
            if ret.is_err() {
                break;
            }
            nodes = tail;
        }
        ret
    })
}

/// Answer a batch with `GenErr` when a chain is misconfigured (empty chain,
/// missing leaf). Logged once per occurrence.
pub(crate) fn broken_chain(requests: &mut [Request]) -> HandlerResult {
    error!("handler chain has no nodes; answering genErr");
    for request in requests.iter_mut() {
        request.set_error(ErrorStatus::GenErr);
    }
    Err(ErrorStatus::GenErr)
}
