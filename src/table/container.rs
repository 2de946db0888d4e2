//! Container-backed table rows.
//!
//! The container helper resolves each request's row before the leaf runs:
//! exact lookup for GET and the SET phases, ordered successor lookup for
//! GETNEXT. The resolved [`Row`] is attached as request data; the leaf
//! reads the row payload and produces (or accepts) column values.

use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::error::ErrorStatus;
use crate::handler::{
    BoxFuture, HandlerAccess, HandlerNode, HandlerResult, Mode, NextHandler, Request, RequestInfo,
};
use crate::oid::Oid;
use crate::registry::{Registration, RegistrationModes};
use crate::value::Value;
use crate::varbind::VarBind;

use super::{TABLE_DATA_NAME, TableRequestInfo, build_index_oid};

/// Name under which the resolved [`Row`] is attached to requests.
pub const ROW_DATA_NAME: &str = "table_container_row";

/// How request indexes are turned into container keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Key on the raw index arcs of the request OID.
    #[default]
    OidIndex,
    /// Key on the re-encoded parsed index values. Normalizes encodings
    /// that differ from their canonical arc form.
    VarbindIndex,
}

/// One table row: its index and an opaque payload for the leaf.
#[derive(Clone)]
pub struct Row {
    /// Encoded index arcs (without column).
    pub index: Oid,
    /// Leaf-owned payload.
    pub data: Arc<dyn Any + Send + Sync>,
}

impl Row {
    /// Create a row.
    pub fn new(index: Oid, data: Arc<dyn Any + Send + Sync>) -> Self {
        Self { index, data }
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row").field("index", &self.index).finish_non_exhaustive()
    }
}

/// Associative row storage ordered by index.
pub trait Container: Send + 'static {
    /// Exact lookup.
    fn find(&self, index: &Oid) -> Option<Row>;
    /// First row whose index is strictly greater.
    fn find_next(&self, index: &Oid) -> Option<Row>;
    /// First row in index order.
    fn first(&self) -> Option<Row>;
    /// Insert or replace a row.
    fn insert(&mut self, row: Row);
    /// Remove a row by index.
    fn remove(&mut self, index: &Oid) -> Option<Row>;
    /// Row count.
    fn len(&self) -> usize;
    /// True if no rows are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sorted-vector container with binary-search lookup.
#[derive(Default)]
pub struct SortedRowContainer {
    entries: Vec<(Oid, Row)>,
}

impl SortedRowContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate rows in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.entries.iter().map(|(_, row)| row)
    }
}

impl Container for SortedRowContainer {
    fn find(&self, index: &Oid) -> Option<Row> {
        self.entries
            .binary_search_by(|(o, _)| o.cmp(index))
            .ok()
            .map(|idx| self.entries[idx].1.clone())
    }

    fn find_next(&self, index: &Oid) -> Option<Row> {
        match self.entries.binary_search_by(|(o, _)| o.cmp(index)) {
            Ok(idx) => self.entries.get(idx + 1),
            Err(idx) => self.entries.get(idx),
        }
        .map(|(_, row)| row.clone())
    }

    fn first(&self) -> Option<Row> {
        self.entries.first().map(|(_, row)| row.clone())
    }

    fn insert(&mut self, row: Row) {
        match self.entries.binary_search_by(|(o, _)| o.cmp(&row.index)) {
            Ok(idx) => self.entries[idx] = (row.index.clone(), row),
            Err(idx) => self.entries.insert(idx, (row.index.clone(), row)),
        }
    }

    fn remove(&mut self, index: &Oid) -> Option<Row> {
        match self.entries.binary_search_by(|(o, _)| o.cmp(index)) {
            Ok(idx) => Some(self.entries.remove(idx).1),
            Err(_) => None,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Shared handle to a row container.
///
/// Registrations share rows only when handed the same handle; mutation
/// happens during SET phases and is visible to reads after COMMIT.
pub type SharedContainer = Arc<Mutex<dyn Container>>;

/// Wrap a container for registration.
pub fn shared<C: Container>(container: C) -> SharedContainer {
    Arc::new(Mutex::new(container))
}

/// Create the container helper node.
///
/// Inject behind the [`table`](super::table) helper: the chain reads
/// `[table, table_container, leaf]`.
pub fn table_container(container: SharedContainer, key_type: KeyType) -> HandlerNode {
    HandlerNode::new(
        "table_container",
        Arc::new(ContainerHelper {
            container,
            key_type,
        }),
    )
}

struct ContainerHelper {
    container: SharedContainer,
    key_type: KeyType,
}

impl ContainerHelper {
    fn key_for(&self, info: &TableRequestInfo) -> Oid {
        match self.key_type {
            KeyType::OidIndex => info.index_oid.clone(),
            // Re-encode the parsed values; fall back to the raw arcs when
            // the parse failed.
            KeyType::VarbindIndex => {
                build_index_from_values(info).unwrap_or_else(|| info.index_oid.clone())
            }
        }
    }
}

/// Poison-tolerant lock: a panicked writer leaves rows readable.
fn lock(container: &SharedContainer) -> std::sync::MutexGuard<'_, dyn Container> {
    container.lock().unwrap_or_else(|e| e.into_inner())
}

fn build_index_from_values(info: &TableRequestInfo) -> Option<Oid> {
    // The templates are not in scope here; parsed values re-encode through
    // their own kinds.
    let templates: Vec<super::IndexTemplate> = info
        .indexes
        .iter()
        .map(|v| super::IndexTemplate::new(v.kind()))
        .collect();
    build_index_oid(&info.indexes, &templates)
}

impl HandlerAccess for ContainerHelper {
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
                    Mode::Get => {
                        let key = self.key_for(&info);
                        let row = lock(&self.container).find(&key);
                        match row {
                            Some(row) => {
                                request.data.remove_entry(ROW_DATA_NAME);
                                request.data.insert(ROW_DATA_NAME, row);
                                next.call_one(reginfo, reqinfo, request).await?;
                            }
                            None => request.set_value(Value::NoSuchInstance),
                        }
                    }
                    Mode::GetNext | Mode::GetBulk => {
                        let row = {
                            let container =
                                lock(&self.container);
                            if info.index_oid.is_empty() {
                                container.first()
                            } else {
                                container.find_next(&info.index_oid)
                            }
                        };
                        let Some(row) = row else {
                            // No row in this column; the table helper
                            // advances to the next column.
                            continue;
                        };
                        let answer_oid =
                            TableRequestInfo::oid_for(&reginfo.root, info.column, &row.index);
                        request.varbind = VarBind::null(answer_oid);
                        request.data.remove_entry(ROW_DATA_NAME);
                        request.data.insert(ROW_DATA_NAME, row);
                        let as_get = reqinfo.with_mode(Mode::Get);
                        next.call_one(reginfo, &as_get, request).await?;
                    }
                    Mode::SetReserve1 => {
                        let key = self.key_for(&info);
                        let row = lock(&self.container).find(&key);
                        match row {
                            Some(row) => {
                                request.data.remove_entry(ROW_DATA_NAME);
                                request.data.insert(ROW_DATA_NAME, row);
                                next.call_one(reginfo, reqinfo, request).await?;
                            }
                            None if reginfo.modes.contains(RegistrationModes::NOT_CREATE) => {
                                request.set_error(ErrorStatus::NoCreation);
                            }
                            None => {
                                // Row absent and creation allowed: the leaf
                                // decides whether to populate one.
                                next.call_one(reginfo, reqinfo, request).await?;
                            }
                        }
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

/// Convenience: insert a row built from an integer index.
pub fn integer_row(index: i32, data: Arc<dyn Any + Send + Sync>) -> Row {
    Row::new(Oid::from_arcs(&[index as u32]), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn row(arcs: &[u32], tag: u32) -> Row {
        Row::new(Oid::from_arcs(arcs), Arc::new(tag))
    }

    fn tag_of(row: &Row) -> u32 {
        *row.data.downcast_ref::<u32>().unwrap()
    }

    #[test]
    fn test_sorted_container_basic() {
        let mut c = SortedRowContainer::new();
        c.insert(row(&[3], 30));
        c.insert(row(&[1], 10));
        c.insert(row(&[2], 20));

        assert_eq!(c.len(), 3);
        assert_eq!(tag_of(&c.find(&oid!(2)).unwrap()), 20);
        assert!(c.find(&oid!(4)).is_none());
        assert_eq!(tag_of(&c.first().unwrap()), 10);
    }

    #[test]
    fn test_sorted_container_find_next() {
        let mut c = SortedRowContainer::new();
        c.insert(row(&[1], 10));
        c.insert(row(&[3], 30));

        // Exact hit advances to the successor
        assert_eq!(tag_of(&c.find_next(&oid!(1)).unwrap()), 30);
        // Between rows lands on the next
        assert_eq!(tag_of(&c.find_next(&oid!(1, 2)).unwrap()), 30);
        // Nothing past the last row
        assert!(c.find_next(&oid!(3)).is_none());
    }

    #[test]
    fn test_sorted_container_replace_and_remove() {
        let mut c = SortedRowContainer::new();
        c.insert(row(&[5], 1));
        c.insert(row(&[5], 2));
        assert_eq!(c.len(), 1);
        assert_eq!(tag_of(&c.find(&oid!(5)).unwrap()), 2);

        assert_eq!(tag_of(&c.remove(&oid!(5)).unwrap()), 2);
        assert!(c.is_empty());
        assert!(c.remove(&oid!(5)).is_none());
    }

    #[test]
    fn test_multi_arc_index_ordering() {
        let mut c = SortedRowContainer::new();
        c.insert(row(&[1, 2], 12));
        c.insert(row(&[1], 1));
        c.insert(row(&[2], 2));

        // Prefix orders before extension
        assert_eq!(tag_of(&c.first().unwrap()), 1);
        assert_eq!(tag_of(&c.find_next(&oid!(1)).unwrap()), 12);
        assert_eq!(tag_of(&c.find_next(&oid!(1, 2)).unwrap()), 2);
    }
}
