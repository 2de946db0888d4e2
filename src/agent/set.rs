//! The transactional SET phase machine.
//!
//! A SET PDU drives every variable through RESERVE1, RESERVE2, ACTION, and
//! COMMIT. The phase order is total across the whole PDU: each phase runs
//! over every batch before the next phase begins. Rollback on failure:
//!
//! - failure in RESERVE1/RESERVE2 runs FREE on every request;
//! - failure in ACTION runs UNDO on every request, then FREE;
//! - failure in COMMIT runs UNDO on every request that reached COMMIT and
//!   surfaces `commitFailed` (`undoFailed` if the rollback itself fails).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ErrorStatus;
use crate::handler::{self, Mode, Request, RequestContext, RequestInfo};
use crate::pdu::Pdu;
use crate::registry::Registration;
use crate::version::Version;

use super::Agent;

/// A run of adjacent requests sharing one registration.
struct Batch {
    reg: Arc<Registration>,
    /// Range into the request vector.
    start: usize,
    end: usize,
}

/// Process a SET PDU.
pub(super) async fn handle_set(
    agent: &Agent,
    pdu: &Pdu,
    context: &RequestContext,
    transaction_id: u64,
) -> Pdu {
    let regs = agent.resolve(&pdu.varbinds, &context.context_name, Mode::SetReserve1);

    // Unresolved names fail before any phase runs.
    if let Some(index) = regs.iter().position(Option::is_none) {
        let status = if context.version == Version::V1 {
            ErrorStatus::NoSuchName
        } else {
            ErrorStatus::NotWritable
        };
        return Pdu::error_response(pdu.request_id, status, index as i32 + 1, pdu.varbinds.clone());
    }

    let mut requests: Vec<Request> = pdu
        .varbinds
        .iter()
        .enumerate()
        .map(|(index, vb)| Request::new(vb.clone(), index, transaction_id))
        .collect();

    let mut batches: Vec<Batch> = Vec::new();
    let mut start = 0;
    while start < requests.len() {
        // Unresolved names already returned above.
        let Some(reg) = regs[start].clone() else {
            start += 1;
            continue;
        };
        let mut end = start + 1;
        while end < requests.len()
            && regs[end].as_ref().is_some_and(|r| Arc::ptr_eq(r, &reg))
        {
            end += 1;
        }
        batches.push(Batch { reg, start, end });
        start = end;
    }

    let machine = SetMachine {
        agent,
        context,
        transaction_id,
        batches,
    };
    match machine.run(&mut requests).await {
        Ok(()) => Pdu::response(pdu.request_id, pdu.varbinds.clone()),
        Err((status, index)) => {
            Pdu::error_response(pdu.request_id, status, index, pdu.varbinds.clone())
        }
    }
}

struct SetMachine<'a> {
    agent: &'a Agent,
    context: &'a RequestContext,
    transaction_id: u64,
    batches: Vec<Batch>,
}

impl SetMachine<'_> {
    /// Run one phase over batches `0..limit`. Returns the failing batch
    /// index and the PDU-level (status, error index) on failure.
    async fn phase(
        &self,
        mode: Mode,
        requests: &mut [Request],
        limit: usize,
    ) -> Result<(), (usize, ErrorStatus, i32)> {
        let reqinfo = RequestInfo::new(mode, self.transaction_id, self.context.clone());
        for (n, batch) in self.batches.iter().take(limit).enumerate() {
            debug!(phase = %mode, batch = n, registration = batch.reg.name.as_str(), "set phase");
            let slice = &mut requests[batch.start..batch.end];
            let ret = self.agent.call_batch(&batch.reg, &reqinfo, slice).await;
            let (worst, index) = handler::worst_status(slice);
            if !worst.is_ok() {
                return Err((n, worst, index));
            }
            if let Err(status) = ret {
                return Err((n, status, batch.start as i32 + 1));
            }
        }
        Ok(())
    }

    /// A rollback phase never overrides the primary error; failures are
    /// logged and, for UNDO, reported as `undoFailed`.
    async fn rollback_phase(
        &self,
        mode: Mode,
        requests: &mut [Request],
        limit: usize,
    ) -> Result<(), ErrorStatus> {
        // Per-request statuses from the failing phase must not leak into
        // the rollback pass.
        for request in requests.iter_mut() {
            request.status = ErrorStatus::NoError;
        }
        match self.phase(mode, requests, limit).await {
            Ok(()) => Ok(()),
            Err((_, status, _)) => {
                warn!(phase = %mode, %status, "rollback phase reported an error");
                Err(status)
            }
        }
    }

    async fn run(&self, requests: &mut [Request]) -> Result<(), (ErrorStatus, i32)> {
        let all = self.batches.len();

        // RESERVE1 / RESERVE2: any failure releases everything.
        for mode in [Mode::SetReserve1, Mode::SetReserve2] {
            if let Err((_, status, index)) = self.phase(mode, requests, all).await {
                let _ = self.rollback_phase(Mode::SetFree, requests, all).await;
                return Err((status, index));
            }
        }

        // ACTION: failure undoes the applied changes, then frees.
        if let Err((_, status, index)) = self.phase(Mode::SetAction, requests, all).await {
            let _ = self.rollback_phase(Mode::SetUndo, requests, all).await;
            let _ = self.rollback_phase(Mode::SetFree, requests, all).await;
            return Err((status, index));
        }

        // COMMIT: failure undoes every batch that reached commit.
        if let Err((failed, _, index)) = self.phase(Mode::SetCommit, requests, all).await {
            let undone = self
                .rollback_phase(Mode::SetUndo, requests, failed + 1)
                .await;
            let status = if undone.is_err() {
                ErrorStatus::UndoFailed
            } else {
                ErrorStatus::CommitFailed
            };
            return Err((status, index));
        }

        Ok(())
    }
}
