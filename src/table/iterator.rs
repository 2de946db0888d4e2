//! Iterator-backed table rows.
//!
//! For data that lives outside the agent (kernel tables, files), a handler
//! supplies `first`/`next` callbacks instead of a materialized container.
//! The helper walks the iteration to locate the requested row; row order
//! does not need to be sorted, so GETNEXT scans for the smallest index
//! beyond the probe.

use std::any::Any;
use std::sync::Arc;

use crate::handler::{
    BoxFuture, HandlerAccess, HandlerNode, HandlerResult, Mode, NextHandler, Request, RequestInfo,
};
use crate::oid::Oid;
use crate::registry::Registration;
use crate::value::Value;
use crate::varbind::VarBind;

use super::{TABLE_DATA_NAME, TableRequestInfo};

/// Name under which the located row's payload is attached to requests.
pub const ITERATOR_DATA_NAME: &str = "table_iterator_row";

/// One row produced by an iteration step.
#[derive(Clone)]
pub struct IteratorRow {
    /// Encoded index arcs (without column).
    pub index: Oid,
    /// Payload threaded through to the leaf as its data context.
    pub data: Arc<dyn Any + Send + Sync>,
}

impl IteratorRow {
    /// Create a row handle.
    pub fn new(index: Oid, data: Arc<dyn Any + Send + Sync>) -> Self {
        Self { index, data }
    }
}

impl std::fmt::Debug for IteratorRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IteratorRow")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Row iteration callbacks supplied by the sub-handler.
pub trait TableIterator: Send + Sync + 'static {
    /// The first row, in the iterator's own order.
    fn first(&self) -> Option<IteratorRow>;
    /// The row after `current`, or `None` at the end.
    fn next(&self, current: &IteratorRow) -> Option<IteratorRow>;
}

/// Create the iterator helper node.
///
/// Inject behind the [`table`](super::table) helper: the chain reads
/// `[table, table_iterator, leaf]`.
pub fn table_iterator(iterator: Arc<dyn TableIterator>) -> HandlerNode {
    HandlerNode::new("table_iterator", Arc::new(IteratorHelper { iterator }))
}

struct IteratorHelper {
    iterator: Arc<dyn TableIterator>,
}

impl IteratorHelper {
    /// Scan for the exact row.
    fn locate(&self, index: &Oid) -> Option<IteratorRow> {
        let mut cursor = self.iterator.first();
        while let Some(row) = cursor {
            if row.index == *index {
                return Some(row);
            }
            cursor = self.iterator.next(&row);
        }
        None
    }

    /// Scan for the smallest index strictly greater than `after`, or the
    /// smallest overall when `after` is empty.
    fn locate_next(&self, after: &Oid) -> Option<IteratorRow> {
        let mut best: Option<IteratorRow> = None;
        let mut cursor = self.iterator.first();
        while let Some(row) = cursor {
            if after.is_empty() || row.index > *after {
                let better = match &best {
                    Some(b) => row.index < b.index,
                    None => true,
                };
                if better {
                    best = Some(row.clone());
                }
            }
            cursor = self.iterator.next(&row);
        }
        best
    }
}

impl HandlerAccess for IteratorHelper {
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
                let Some(info) = request.data.get::<TableRequestInfo>(TABLE_DATA_NAME).cloned()
                else {
                    continue;
                };
                match reqinfo.mode {
                    Mode::Get | Mode::SetReserve1 => match self.locate(&info.index_oid) {
                        Some(row) => {
                            request.data.remove_entry(ITERATOR_DATA_NAME);
                            request.data.insert(ITERATOR_DATA_NAME, row);
                            next.call_one(reginfo, reqinfo, request).await?;
                        }
                        None => {
                            if reqinfo.mode == Mode::Get {
                                request.set_value(Value::NoSuchInstance);
                            }
                            // SET on a missing row stays unanswered here;
                            // creation policy belongs to the leaf.
                            else {
                                next.call_one(reginfo, reqinfo, request).await?;
                            }
                        }
                    },
                    Mode::GetNext | Mode::GetBulk => {
                        let Some(row) = self.locate_next(&info.index_oid) else {
                            continue;
                        };
                        let answer_oid =
                            TableRequestInfo::oid_for(&reginfo.root, info.column, &row.index);
                        request.varbind = VarBind::null(answer_oid);
                        request.data.remove_entry(ITERATOR_DATA_NAME);
                        request.data.insert(ITERATOR_DATA_NAME, row);
                        let as_get = reqinfo.with_mode(Mode::Get);
                        next.call_one(reginfo, &as_get, request).await?;
                    }
                    _ => {
                        next.call_one(reginfo, reqinfo, request).await?;
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    /// Unsorted fixed rows.
    struct FixedRows {
        rows: Vec<(u32, u32)>, // (index arc, payload)
    }

    impl TableIterator for FixedRows {
        fn first(&self) -> Option<IteratorRow> {
            self.rows.first().map(|&(idx, tag)| {
                IteratorRow::new(Oid::from_arcs(&[idx]), Arc::new(tag))
            })
        }

        fn next(&self, current: &IteratorRow) -> Option<IteratorRow> {
            let pos = self
                .rows
                .iter()
                .position(|&(idx, _)| Oid::from_arcs(&[idx]) == current.index)?;
            self.rows.get(pos + 1).map(|&(idx, tag)| {
                IteratorRow::new(Oid::from_arcs(&[idx]), Arc::new(tag))
            })
        }
    }

    fn helper(rows: Vec<(u32, u32)>) -> IteratorHelper {
        IteratorHelper {
            iterator: Arc::new(FixedRows { rows }),
        }
    }

    #[test]
    fn test_locate_exact() {
        let h = helper(vec![(3, 30), (1, 10), (2, 20)]);
        let row = h.locate(&oid!(1)).unwrap();
        assert_eq!(*row.data.downcast_ref::<u32>().unwrap(), 10);
        assert!(h.locate(&oid!(9)).is_none());
    }

    #[test]
    fn test_locate_next_unsorted() {
        // Rows arrive out of order; the helper finds the smallest > probe
        let h = helper(vec![(3, 30), (1, 10), (5, 50)]);
        let row = h.locate_next(&oid!(1)).unwrap();
        assert_eq!(row.index, oid!(3));
        let row = h.locate_next(&oid!(3)).unwrap();
        assert_eq!(row.index, oid!(5));
        assert!(h.locate_next(&oid!(5)).is_none());
    }

    #[test]
    fn test_locate_next_from_empty_probe() {
        let h = helper(vec![(3, 30), (1, 10)]);
        let row = h.locate_next(&Oid::new()).unwrap();
        assert_eq!(row.index, oid!(1));
    }

    #[test]
    fn test_locate_next_empty_table() {
        let h = helper(vec![]);
        assert!(h.locate_next(&Oid::new()).is_none());
    }
}
