//! The dispatch loop.
//!
//! [`Agent`] owns the subtree registry and turns decoded request PDUs into
//! response PDUs: it splits the varbind list, resolves each variable to a
//! registration, groups adjacent same-registration runs into batches,
//! drives the handler pipeline in the right mode, and reassembles answers
//! in arrival order. SET PDUs run the transactional phase machine in
//! [`set`].

mod set;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, ErrorStatus, Result};
use crate::handler::{
    self, HandlerChain, Mode, Request, RequestContext, RequestInfo, instance,
};
use crate::handler::{HandlerAccess, HandlerNode};
use crate::oid::Oid;
use crate::pdu::{Message, Pdu, PduType};
use crate::registry::{Registration, Registry};
use crate::transport::AgentTransport;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// Default cap on encoded response size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65_507;

/// Configures and builds an [`Agent`].
pub struct AgentBuilder {
    registry: Registry,
    community: Option<Bytes>,
    max_message_size: usize,
}

impl AgentBuilder {
    /// Start a builder with an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            community: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Require this community string; mismatching messages are dropped.
    pub fn community(mut self, community: impl Into<Bytes>) -> Self {
        self.community = Some(community.into());
        self
    }

    /// Cap the encoded response size (`tooBig` above it).
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Register a subtree.
    pub fn register(mut self, registration: Registration) -> Result<Self> {
        self.registry.register(registration)?;
        Ok(self)
    }

    /// Register a scalar instance: the chain is `[instance, leaf]`.
    pub fn scalar(
        self,
        name: impl Into<String>,
        root: Oid,
        leaf: Arc<dyn HandlerAccess>,
    ) -> Result<Self> {
        let name = name.into();
        let mut chain = HandlerChain::single(HandlerNode::new(name.clone(), leaf));
        chain.inject(instance());
        self.register(Registration::new(name, root, chain))
    }

    /// Direct access to the registry during setup.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Finish building.
    pub fn build(self) -> Agent {
        Agent {
            inner: Arc::new(Inner {
                registry: std::sync::RwLock::new(self.registry),
                community: self.community,
                max_message_size: self.max_message_size,
                transactions: AtomicU64::new(1),
            }),
        }
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    registry: std::sync::RwLock<Registry>,
    community: Option<Bytes>,
    max_message_size: usize,
    transactions: AtomicU64,
}

/// The agent: registry plus dispatch.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

impl Agent {
    /// Start building an agent.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Register a subtree. Serialized with dispatch: takes effect for the
    /// next PDU.
    pub fn register(&self, registration: Registration) -> Result<()> {
        self.write_registry().register(registration)
    }

    /// Remove a registration.
    pub fn unregister(&self, context: &str, root: &Oid, priority: i32) -> Result<()> {
        self.write_registry().unregister(context, root, priority)
    }

    /// Splice a stock handler node into a named registration's chain.
    ///
    /// This is the programmatic form of the `injectHandler` config token.
    pub fn inject_handler(
        &self,
        node: HandlerNode,
        into: &str,
        before: Option<&str>,
    ) -> Result<()> {
        let mut registry = self.write_registry();
        let Some((context, reg)) = registry.find_by_name(into) else {
            return Err(Error::registry(
                crate::error::RegistryErrorKind::NotRegistered,
            ));
        };
        let mut updated = (*reg).clone();
        updated.chain_mut().inject_before(node, before)?;
        registry.replace(&context, updated)
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.inner.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.inner.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    fn next_transaction_id(&self) -> u64 {
        self.inner.transactions.fetch_add(1, Ordering::Relaxed)
    }

    /// Process one framed message; returns the encoded response, or `None`
    /// for messages that are dropped (bad community, non-request PDU).
    pub async fn handle_message(
        &self,
        data: Bytes,
        source: Option<SocketAddr>,
    ) -> Result<Option<Bytes>> {
        let message = Message::decode(data)?;

        if let Some(expected) = &self.inner.community
            && message.community != *expected
        {
            debug!(?source, "dropping message with unknown community");
            return Ok(None);
        }
        if !message.pdu.pdu_type.is_agent_request() {
            trace!(pdu_type = %message.pdu.pdu_type, "ignoring non-request PDU");
            return Ok(None);
        }

        let context = RequestContext {
            source,
            version: message.version,
            community: message.community.clone(),
            context_name: String::new(),
        };
        let response = self.handle_pdu(&message.pdu, context).await;

        let mut encoded =
            Message::new(message.version, message.community.clone(), response).encode();
        if encoded.len() > self.inner.max_message_size {
            // Too big to send: report tooBig with the request varbinds.
            let too_big = Pdu::error_response(
                message.pdu.request_id,
                ErrorStatus::TooBig,
                0,
                message.pdu.varbinds.clone(),
            );
            encoded = Message::new(message.version, message.community, too_big).encode();
        }
        Ok(Some(encoded))
    }

    /// Process a decoded request PDU into a response PDU.
    pub async fn handle_pdu(&self, pdu: &Pdu, context: RequestContext) -> Pdu {
        let transaction_id = self.next_transaction_id();
        debug!(
            transaction_id,
            pdu_type = %pdu.pdu_type,
            request_id = pdu.request_id,
            varbinds = pdu.varbinds.len(),
            "dispatching"
        );
        match pdu.pdu_type {
            PduType::Get => self.handle_get(pdu, &context, transaction_id).await,
            PduType::GetNext => self.handle_getnext(pdu, &context, transaction_id).await,
            PduType::GetBulk => self.handle_getbulk(pdu, &context, transaction_id).await,
            PduType::Set => set::handle_set(self, pdu, &context, transaction_id).await,
            _ => Pdu::error_response(
                pdu.request_id,
                ErrorStatus::GenErr,
                0,
                pdu.varbinds.clone(),
            ),
        }
    }

    /// Run one batch through its registration's chain, honoring the
    /// registration timeout.
    pub(crate) async fn call_batch(
        &self,
        reg: &Registration,
        reqinfo: &RequestInfo,
        batch: &mut [Request],
    ) -> std::result::Result<(), ErrorStatus> {
        if reg.chain().is_empty() {
            return handler::broken_chain(batch);
        }
        match reg.timeout {
            Some(limit) => {
                let outcome = {
                    let call = reg.chain().call(reg, reqinfo, &mut *batch);
                    tokio::time::timeout(limit, call).await
                };
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(registration = reg.name.as_str(), "handler timed out");
                        for request in batch.iter_mut() {
                            request.set_error(ErrorStatus::GenErr);
                        }
                        Err(ErrorStatus::GenErr)
                    }
                }
            }
            None => reg.chain().call(reg, reqinfo, batch).await,
        }
    }

    /// Resolve each varbind to its registration for `mode`.
    pub(crate) fn resolve(
        &self,
        varbinds: &[VarBind],
        context_name: &str,
        mode: Mode,
    ) -> Vec<Option<Arc<Registration>>> {
        let registry = self.read_registry();
        varbinds
            .iter()
            .map(|vb| registry.find(context_name, &vb.oid, mode))
            .collect()
    }

    async fn handle_get(
        &self,
        pdu: &Pdu,
        context: &RequestContext,
        transaction_id: u64,
    ) -> Pdu {
        let regs = self.resolve(&pdu.varbinds, &context.context_name, Mode::Get);
        let mut requests: Vec<Request> = pdu
            .varbinds
            .iter()
            .enumerate()
            .map(|(index, vb)| Request::new(vb.clone(), index, transaction_id))
            .collect();

        let reqinfo = RequestInfo::new(Mode::Get, transaction_id, context.clone());

        // Adjacent same-registration runs share one chain invocation.
        let mut start = 0;
        while start < requests.len() {
            let Some(reg) = regs[start].clone() else {
                let name = requests[start].varbind.oid.clone();
                requests[start].set_varbind(VarBind::no_such_object(name));
                start += 1;
                continue;
            };
            let mut end = start + 1;
            while end < requests.len()
                && regs[end]
                    .as_ref()
                    .is_some_and(|r| Arc::ptr_eq(r, &reg))
            {
                end += 1;
            }
            if let Err(status) = self.call_batch(&reg, &reqinfo, &mut requests[start..end]).await {
                let (worst, index) = handler::worst_status(&requests[start..end]);
                let (status, index) = if worst.is_ok() {
                    (status, start as i32 + 1)
                } else {
                    (worst, index)
                };
                return Pdu::error_response(pdu.request_id, status, index, pdu.varbinds.clone());
            }
            start = end;
        }

        // A handler error recorded per request surfaces for the whole PDU.
        let (status, index) = handler::worst_status(&requests);
        if !status.is_ok() {
            return Pdu::error_response(pdu.request_id, status, index, pdu.varbinds.clone());
        }

        // Unanswered requests hit a registration that had nothing to say.
        for request in &mut requests {
            if !request.processed && request.varbind.value == Value::Null {
                let name = request.varbind.oid.clone();
                request.varbind = VarBind::no_such_instance(name);
            }
        }

        self.finish_read(pdu, context.version, requests)
    }

    /// One GETNEXT resolution for a single variable: walk subtrees in OID
    /// order until one produces an answer beyond the probe.
    pub(crate) async fn getnext_one(
        &self,
        oid: &Oid,
        context: &RequestContext,
        transaction_id: u64,
    ) -> std::result::Result<VarBind, (ErrorStatus, VarBind)> {
        let reqinfo = RequestInfo::new(Mode::GetNext, transaction_id, context.clone());
        let mut best: Option<VarBind> = None;

        let mut current = {
            let registry = self.read_registry();
            registry
                .find(&context.context_name, oid, Mode::GetNext)
                .or_else(|| registry.find_next(&context.context_name, oid, Mode::GetNext))
        };
        let mut advance_key = oid.clone();

        while let Some(reg) = current {
            if let Some(b) = &best
                && reg.root >= b.oid
            {
                // No registration at or past the best answer can improve it.
                break;
            }

            let mut requests = vec![Request::new(VarBind::null(oid.clone()), 0, transaction_id)];
            if let Err(status) = self.call_batch(&reg, &reqinfo, &mut requests).await {
                return Err((status, VarBind::null(oid.clone())));
            }
            let request = requests.pop().unwrap_or_else(|| {
                Request::new(VarBind::null(oid.clone()), 0, transaction_id)
            });
            if !request.status.is_ok() {
                return Err((request.status, request.varbind));
            }
            if handler::request_answered(&request)
                && request.varbind.value != Value::Null
                && request.varbind.oid > *oid
            {
                let vb = request.varbind;
                let better = match &best {
                    Some(b) => vb.oid < b.oid,
                    None => true,
                };
                if better {
                    best = Some(vb);
                }
            }

            if reg.root > advance_key {
                advance_key = reg.root.clone();
            }
            current = self
                .read_registry()
                .find_next(&context.context_name, &advance_key, Mode::GetNext);
        }

        Ok(best.unwrap_or_else(|| VarBind::end_of_mib_view(oid.clone())))
    }

    async fn handle_getnext(
        &self,
        pdu: &Pdu,
        context: &RequestContext,
        transaction_id: u64,
    ) -> Pdu {
        let mut results = Vec::with_capacity(pdu.varbinds.len());
        for (index, vb) in pdu.varbinds.iter().enumerate() {
            match self.getnext_one(&vb.oid, context, transaction_id).await {
                Ok(result) => results.push(result),
                Err((status, _)) => {
                    return Pdu::error_response(
                        pdu.request_id,
                        status,
                        index as i32 + 1,
                        pdu.varbinds.clone(),
                    );
                }
            }
        }
        self.finish_read_varbinds(pdu, context.version, results)
    }

    async fn handle_getbulk(
        &self,
        pdu: &Pdu,
        context: &RequestContext,
        transaction_id: u64,
    ) -> Pdu {
        if context.version == Version::V1 {
            // GETBULK does not exist in v1.
            return Pdu::error_response(
                pdu.request_id,
                ErrorStatus::GenErr,
                0,
                pdu.varbinds.clone(),
            );
        }

        let non_repeaters = pdu.non_repeaters().min(pdu.varbinds.len());
        let max_repetitions = pdu.max_repetitions();
        let mut results: Vec<VarBind> = Vec::new();
        let mut size_estimate = 64usize;

        // Non-repeaters: one GETNEXT each.
        for (index, vb) in pdu.varbinds.iter().take(non_repeaters).enumerate() {
            match self.getnext_one(&vb.oid, context, transaction_id).await {
                Ok(result) => {
                    size_estimate += result.encoded_size();
                    results.push(result);
                }
                Err((status, _)) => {
                    return Pdu::error_response(
                        pdu.request_id,
                        status,
                        index as i32 + 1,
                        pdu.varbinds.clone(),
                    );
                }
            }
        }

        // Repeaters: advance each column round by round.
        let repeaters: Vec<Oid> = pdu.varbinds[non_repeaters..]
            .iter()
            .map(|vb| vb.oid.clone())
            .collect();
        let mut cursors: Vec<(Oid, bool)> =
            repeaters.into_iter().map(|oid| (oid, false)).collect();

        'rounds: for _ in 0..max_repetitions {
            if cursors.iter().all(|(_, done)| *done) {
                break;
            }
            for (slot, (cursor, done)) in cursors.iter_mut().enumerate() {
                if *done {
                    results.push(VarBind::end_of_mib_view(cursor.clone()));
                    continue;
                }
                match self.getnext_one(cursor, context, transaction_id).await {
                    Ok(result) => {
                        if result.value == Value::EndOfMibView {
                            *done = true;
                        } else {
                            *cursor = result.oid.clone();
                        }
                        size_estimate += result.encoded_size();
                        results.push(result);
                        if size_estimate > self.inner.max_message_size {
                            // Out of room: stop repeating, the manager
                            // continues from the last name returned.
                            results.pop();
                            break 'rounds;
                        }
                    }
                    Err((status, _)) => {
                        return Pdu::error_response(
                            pdu.request_id,
                            status,
                            (non_repeaters + slot) as i32 + 1,
                            pdu.varbinds.clone(),
                        );
                    }
                }
            }
        }

        self.finish_read_varbinds(pdu, context.version, results)
    }

    fn finish_read(&self, pdu: &Pdu, version: Version, requests: Vec<Request>) -> Pdu {
        let mut ordered = requests;
        ordered.sort_by_key(|r| r.index);
        let varbinds = ordered.into_iter().map(|r| r.varbind).collect();
        self.finish_read_varbinds(pdu, version, varbinds)
    }

    /// Translate exception values for v1 and assemble the response.
    fn finish_read_varbinds(&self, pdu: &Pdu, version: Version, varbinds: Vec<VarBind>) -> Pdu {
        if version == Version::V1
            && let Some(pos) = crate::varbind::first_exception(&varbinds)
        {
            return Pdu::error_response(
                pdu.request_id,
                ErrorStatus::NoSuchName,
                pos as i32 + 1,
                pdu.varbinds.clone(),
            );
        }
        Pdu::response(pdu.request_id, varbinds)
    }

    /// Serve requests from a transport until cancelled.
    pub async fn serve<T: AgentTransport>(
        &self,
        transport: T,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut buf = vec![0u8; self.inner.max_message_size.max(484)];
        loop {
            let (len, source) = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("agent serve loop shutting down");
                    return Ok(());
                }
                received = transport.recv_from(&mut buf) => received?,
            };
            let data = Bytes::copy_from_slice(&buf[..len]);
            match self.handle_message(data, Some(source)).await {
                Ok(Some(response)) => {
                    if let Err(error) = transport.send_to(&response, source).await {
                        warn!(%source, %error, "failed to send response");
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(%source, %error, "dropping undecodable message");
                }
            }
        }
    }
}
