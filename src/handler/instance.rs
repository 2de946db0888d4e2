//! Stock handler nodes: `instance`, `debug`, `bulk_to_next`.

use std::sync::Arc;

use tracing::debug;

use crate::error::ErrorStatus;
use crate::registry::Registration;
use crate::value::Value;
use crate::varbind::VarBind;

use super::chain::{HandlerNode, NextHandler, NodeFlags};
use super::request::{Request, RequestInfo};
use super::traits::{BoxFuture, HandlerAccess, HandlerResult};
use super::Mode;

/// Scalar instance helper.
///
/// Registered in front of a leaf that serves exactly one instance OID (the
/// registration root). The helper answers the mechanical cases so the leaf
/// only ever sees exact GET (or SET) requests for its own instance:
///
/// - GET for any other OID is answered with `noSuchInstance`;
/// - GETNEXT from below the instance is converted into a GET for it;
/// - GETNEXT at or past the instance stays unanswered so the dispatcher
///   advances to the following subtree;
/// - the first SET phase rejects foreign OIDs with `noCreation`.
pub fn instance() -> HandlerNode {
    HandlerNode::with_flags("instance", Arc::new(InstanceHelper), NodeFlags::INSTANCE)
}

struct InstanceHelper;

impl HandlerAccess for InstanceHelper {
    fn access<'a>(
        &'a self,
        _node: &'a HandlerNode,
        next: NextHandler<'a>,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            for request in requests.iter_mut() {
                match reqinfo.mode {
                    Mode::Get => {
                        if request.varbind.oid == reginfo.root {
                            next.call_one(reginfo, reqinfo, request).await?;
                        } else {
                            request.set_value(Value::NoSuchInstance);
                        }
                    }
                    Mode::GetNext | Mode::GetBulk => {
                        if request.varbind.oid < reginfo.root {
                            let original = request.varbind.oid.clone();
                            request.varbind = VarBind::null(reginfo.root.clone());
                            let as_get = reqinfo.with_mode(Mode::Get);
                            next.call_one(reginfo, &as_get, request).await?;
                            if !request.processed {
                                // Leaf had nothing; put the name back so the
                                // dispatcher keys its subtree advance off it.
                                request.varbind = VarBind::null(original);
                            }
                        }
                        // At or past the instance: leave unanswered.
                    }
                    Mode::SetReserve1 => {
                        if request.varbind.oid == reginfo.root {
                            next.call_one(reginfo, reqinfo, request).await?;
                        } else {
                            request.set_error(ErrorStatus::NoCreation);
                        }
                    }
                    _ => {
                        // Remaining SET phases only reach requests that
                        // passed RESERVE1.
                        if request.varbind.oid == reginfo.root {
                            next.call_one(reginfo, reqinfo, request).await?;
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

/// Debug tracer node.
///
/// Logs every batch flowing through the chain, calls the rest of the chain,
/// then logs the outcome per request.
pub fn debug() -> HandlerNode {
    HandlerNode::new("debug", Arc::new(DebugHelper))
}

struct DebugHelper;

impl HandlerAccess for DebugHelper {
    fn access<'a>(
        &'a self,
        _node: &'a HandlerNode,
        next: NextHandler<'a>,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            debug!(
                registration = reginfo.name.as_str(),
                root = %reginfo.root,
                mode = %reqinfo.mode,
                requests = requests.len(),
                "handler batch enter"
            );
            for request in requests.iter() {
                debug!(index = request.index, varbind = %request.varbind, "  request");
            }
            let ret = next.call(reginfo, reqinfo, requests).await;
            for request in requests.iter() {
                debug!(
                    index = request.index,
                    varbind = %request.varbind,
                    status = %request.status,
                    processed = request.processed,
                    "  result"
                );
            }
            debug!(
                registration = reginfo.name.as_str(),
                ok = ret.is_ok(),
                "handler batch exit"
            );
            ret
        })
    }
}

/// GETBULK-to-GETNEXT conversion node.
///
/// Handlers that only implement GETNEXT register behind this node; a bulk
/// pass arrives as a plain GETNEXT. Repetition is driven by the dispatch
/// loop, so a single conversion per pass suffices.
pub fn bulk_to_next() -> HandlerNode {
    HandlerNode::new("bulk_to_next", Arc::new(BulkToNext))
}

struct BulkToNext;

impl HandlerAccess for BulkToNext {
    fn access<'a>(
        &'a self,
        _node: &'a HandlerNode,
        next: NextHandler<'a>,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if reqinfo.mode == Mode::GetBulk {
                let as_next = reqinfo.with_mode(Mode::GetNext);
                next.call(reginfo, &as_next, requests).await
            } else {
                next.call(reginfo, reqinfo, requests).await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerChain, RequestContext};
    use crate::oid;
    use crate::oid::Oid;

    /// Leaf serving one integer at the registration root, GET mode only.
    struct ScalarLeaf {
        value: i32,
    }

    impl HandlerAccess for ScalarLeaf {
        fn access<'a>(
            &'a self,
            _node: &'a HandlerNode,
            _next: NextHandler<'a>,
            reginfo: &'a Registration,
            reqinfo: &'a RequestInfo,
            requests: &'a mut [Request],
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                for request in requests.iter_mut() {
                    if reqinfo.mode == Mode::Get && request.varbind.oid == reginfo.root {
                        request.set_value(Value::Integer(self.value));
                    }
                }
                Ok(())
            })
        }
    }

    fn scalar_registration(root: Oid, value: i32) -> Registration {
        let mut chain = HandlerChain::single(HandlerNode::new(
            "scalar_leaf",
            Arc::new(ScalarLeaf { value }),
        ));
        chain.inject(instance());
        Registration::new("scalar", root, chain)
    }

    fn run_one(reg: &Registration, mode: Mode, oid: Oid) -> Request {
        let reqinfo = RequestInfo::new(mode, 1, RequestContext::default());
        let mut requests = vec![Request::new(VarBind::null(oid), 0, 1)];
        futures::executor::block_on(reg.chain().call(reg, &reqinfo, &mut requests)).unwrap();
        requests.pop().unwrap()
    }

    #[test]
    fn test_instance_get_exact() {
        let reg = scalar_registration(oid!(1, 3, 6, 1, 9, 1, 0), 42);
        let req = run_one(&reg, Mode::Get, oid!(1, 3, 6, 1, 9, 1, 0));
        assert_eq!(req.varbind.value, Value::Integer(42));
    }

    #[test]
    fn test_instance_get_miss_is_no_such_instance() {
        let reg = scalar_registration(oid!(1, 3, 6, 1, 9, 1, 0), 42);
        let req = run_one(&reg, Mode::Get, oid!(1, 3, 6, 1, 9, 1, 0, 5));
        assert_eq!(req.varbind.value, Value::NoSuchInstance);
    }

    #[test]
    fn test_instance_getnext_from_below() {
        let reg = scalar_registration(oid!(1, 3, 6, 1, 9, 1, 0), 42);
        let req = run_one(&reg, Mode::GetNext, oid!(1, 3, 6, 1, 9));
        assert!(req.processed);
        assert_eq!(req.varbind.oid, oid!(1, 3, 6, 1, 9, 1, 0));
        assert_eq!(req.varbind.value, Value::Integer(42));
    }

    #[test]
    fn test_instance_getnext_at_instance_unanswered() {
        let reg = scalar_registration(oid!(1, 3, 6, 1, 9, 1, 0), 42);
        let req = run_one(&reg, Mode::GetNext, oid!(1, 3, 6, 1, 9, 1, 0));
        assert!(!req.processed);
        // Name untouched so the dispatcher can keep walking
        assert_eq!(req.varbind.oid, oid!(1, 3, 6, 1, 9, 1, 0));
    }

    #[test]
    fn test_instance_set_reserve1_foreign_oid() {
        let reg = scalar_registration(oid!(1, 3, 6, 1, 9, 1, 0), 42);
        let req = run_one(&reg, Mode::SetReserve1, oid!(1, 3, 6, 1, 9, 2, 0));
        assert_eq!(req.status, ErrorStatus::NoCreation);
    }

    #[test]
    fn test_bulk_to_next_converts_mode() {
        struct ModeProbe;
        impl HandlerAccess for ModeProbe {
            fn access<'a>(
                &'a self,
                _node: &'a HandlerNode,
                _next: NextHandler<'a>,
                _reginfo: &'a Registration,
                reqinfo: &'a RequestInfo,
                requests: &'a mut [Request],
            ) -> BoxFuture<'a, HandlerResult> {
                Box::pin(async move {
                    for request in requests.iter_mut() {
                        request.set_value(Value::Integer(reqinfo.mode.as_i32()));
                    }
                    Ok(())
                })
            }
        }

        let mut chain = HandlerChain::single(HandlerNode::new("probe", Arc::new(ModeProbe)));
        chain.inject(bulk_to_next());
        let reg = Registration::new("probe", oid!(1, 3), chain);

        let reqinfo = RequestInfo::new(Mode::GetBulk, 1, RequestContext::default());
        let mut requests = vec![Request::new(VarBind::null(oid!(1, 3, 1)), 0, 1)];
        futures::executor::block_on(reg.chain().call(&reg, &reqinfo, &mut requests)).unwrap();
        assert_eq!(
            requests[0].varbind.value,
            Value::Integer(Mode::GetNext.as_i32())
        );
    }
}
