//! Baby-steps decomposition of the classical SET phases.
//!
//! A handler that opts in sees each classical phase expanded into a fixed
//! sequence of finer steps, each with its own mode constant. The outer
//! transactional ordering (reserve, action, commit, rollback) is unchanged;
//! only the granularity below one phase differs.

use std::sync::Arc;

use crate::registry::Registration;

use super::Mode;
use super::chain::{HandlerNode, NextHandler};
use super::request::{Request, RequestInfo};
use super::traits::{BoxFuture, HandlerAccess, HandlerResult};

/// The fine-grained set steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BabyStep {
    PreRequest = 128,
    ObjectLookup = 129,
    CheckValue = 130,
    RowCreate = 131,
    UndoSetup = 132,
    SetValue = 133,
    CheckConsistency = 134,
    UndoSet = 135,
    Commit = 136,
    UndoCommit = 137,
    IrreversibleCommit = 138,
    UndoCleanup = 139,
    PostRequest = 140,
}

impl BabyStep {
    /// The raw mode constant.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// The steps a classical phase expands into, in issue order.
    pub fn expansion(mode: Mode) -> &'static [BabyStep] {
        match mode {
            Mode::SetReserve1 => &[
                BabyStep::PreRequest,
                BabyStep::ObjectLookup,
                BabyStep::CheckValue,
            ],
            Mode::SetReserve2 => &[BabyStep::RowCreate, BabyStep::UndoSetup],
            Mode::SetAction => &[BabyStep::SetValue, BabyStep::CheckConsistency],
            Mode::SetCommit => &[
                BabyStep::Commit,
                BabyStep::IrreversibleCommit,
                BabyStep::UndoCleanup,
                BabyStep::PostRequest,
            ],
            Mode::SetFree => &[BabyStep::UndoCleanup, BabyStep::PostRequest],
            Mode::SetUndo => &[
                BabyStep::UndoSet,
                BabyStep::UndoCommit,
                BabyStep::UndoCleanup,
                BabyStep::PostRequest,
            ],
            _ => &[],
        }
    }
}

impl std::fmt::Display for BabyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BabyStep::PreRequest => "PRE_REQUEST",
            BabyStep::ObjectLookup => "OBJECT_LOOKUP",
            BabyStep::CheckValue => "CHECK_VALUE",
            BabyStep::RowCreate => "ROW_CREATE",
            BabyStep::UndoSetup => "UNDO_SETUP",
            BabyStep::SetValue => "SET_VALUE",
            BabyStep::CheckConsistency => "CHECK_CONSISTENCY",
            BabyStep::UndoSet => "UNDO_SET",
            BabyStep::Commit => "COMMIT",
            BabyStep::UndoCommit => "UNDO_COMMIT",
            BabyStep::IrreversibleCommit => "IRREVERSIBLE_COMMIT",
            BabyStep::UndoCleanup => "UNDO_CLEANUP",
            BabyStep::PostRequest => "POST_REQUEST",
        };
        write!(f, "{}", name)
    }
}

/// A handler that processes set requests step by step.
///
/// `registered` names the steps the handler cares about; the helper skips
/// the rest. Read modes are not decomposed and flow past the helper to the
/// next node in the chain.
pub trait BabyStepsAccess: Send + Sync + 'static {
    /// The steps this handler implements.
    fn registered(&self) -> &[BabyStep];

    /// Process one step for a batch of requests.
    fn step<'a>(
        &'a self,
        step: BabyStep,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult>;
}

/// Create the baby-steps expansion node wrapping `leaf`.
pub fn baby_steps(leaf: Arc<dyn BabyStepsAccess>) -> HandlerNode {
    HandlerNode::new("baby_steps", Arc::new(BabyStepsHelper { leaf }))
}

struct BabyStepsHelper {
    leaf: Arc<dyn BabyStepsAccess>,
}

impl HandlerAccess for BabyStepsHelper {
    fn access<'a>(
        &'a self,
        _node: &'a HandlerNode,
        next: NextHandler<'a>,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if reqinfo.mode.is_read() {
                return next.call(reginfo, reqinfo, requests).await;
            }
            let registered = self.leaf.registered();
            for &step in BabyStep::expansion(reqinfo.mode) {
                if !registered.contains(&step) {
                    continue;
                }
                self.leaf.step(step, reginfo, reqinfo, &mut *requests).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerChain, RequestContext};
    use crate::oid;
    use crate::varbind::VarBind;
    use std::sync::Mutex;

    struct StepRecorder {
        steps: Vec<BabyStep>,
        log: Arc<Mutex<Vec<BabyStep>>>,
    }

    impl BabyStepsAccess for StepRecorder {
        fn registered(&self) -> &[BabyStep] {
            &self.steps
        }

        fn step<'a>(
            &'a self,
            step: BabyStep,
            _reginfo: &'a Registration,
            _reqinfo: &'a RequestInfo,
            _requests: &'a mut [Request],
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                self.log.lock().unwrap().push(step);
                Ok(())
            })
        }
    }

    fn run(mode: Mode, registered: Vec<BabyStep>) -> Vec<BabyStep> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::single(baby_steps(Arc::new(StepRecorder {
            steps: registered,
            log: Arc::clone(&log),
        })));
        let reg = Registration::new("bs", oid!(1, 3), chain);
        let reqinfo = RequestInfo::new(mode, 1, RequestContext::default());
        let mut requests = vec![Request::new(VarBind::null(oid!(1, 3, 1)), 0, 1)];
        futures::executor::block_on(reg.chain().call(&reg, &reqinfo, &mut requests)).unwrap();
        let result = log.lock().unwrap().clone();
        result
    }

    #[test]
    fn test_reserve1_expansion() {
        let all = BabyStep::expansion(Mode::SetReserve1).to_vec();
        assert_eq!(
            run(Mode::SetReserve1, all.clone()),
            vec![
                BabyStep::PreRequest,
                BabyStep::ObjectLookup,
                BabyStep::CheckValue
            ]
        );
    }

    #[test]
    fn test_unregistered_steps_skipped() {
        let only_check = vec![BabyStep::CheckValue];
        assert_eq!(run(Mode::SetReserve1, only_check), vec![BabyStep::CheckValue]);
    }

    #[test]
    fn test_commit_expansion_order() {
        let all = BabyStep::expansion(Mode::SetCommit).to_vec();
        assert_eq!(
            run(Mode::SetCommit, all),
            vec![
                BabyStep::Commit,
                BabyStep::IrreversibleCommit,
                BabyStep::UndoCleanup,
                BabyStep::PostRequest
            ]
        );
    }

    #[test]
    fn test_mode_constants_distinct() {
        let steps = [
            BabyStep::PreRequest,
            BabyStep::ObjectLookup,
            BabyStep::CheckValue,
            BabyStep::RowCreate,
            BabyStep::UndoSetup,
            BabyStep::SetValue,
            BabyStep::CheckConsistency,
            BabyStep::UndoSet,
            BabyStep::Commit,
            BabyStep::UndoCommit,
            BabyStep::IrreversibleCommit,
            BabyStep::UndoCleanup,
            BabyStep::PostRequest,
        ];
        let mut values: Vec<i32> = steps.iter().map(|s| s.as_i32()).collect();
        values.dedup();
        assert_eq!(values.len(), steps.len());
        assert_eq!(BabyStep::PreRequest.as_i32(), 128);
        assert_eq!(BabyStep::PostRequest.as_i32(), 140);
    }
}
