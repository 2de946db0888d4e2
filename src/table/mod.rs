//! Table helpers.
//!
//! A table is a registration rooted at its entry OID; request OIDs continue
//! with a column number and the encoded row index. The `table` helper node
//! validates the column, decomposes the OID into `(column, index)`, attaches
//! a [`TableRequestInfo`] for the nodes below it, and drives the
//! next-column retry loop for GETNEXT.
//!
//! Two row-supplying helpers sit below it: [`container`] rows held in a
//! sorted container, and [`iterator`] rows produced by first/next callbacks.

pub mod container;
pub mod iterator;

pub use container::{Container, KeyType, Row, SortedRowContainer, table_container};
pub use iterator::{IteratorRow, TableIterator, table_iterator};

use std::sync::Arc;

use tracing::trace;

use crate::error::ErrorStatus;
use crate::handler::{
    BoxFuture, HandlerAccess, HandlerNode, HandlerResult, Mode, NextHandler, Request, RequestInfo,
};
use crate::oid::Oid;
use crate::registry::Registration;
use crate::value::{Value, ValueKind};

/// Name under which [`TableRequestInfo`] is attached to requests.
pub const TABLE_DATA_NAME: &str = "table";

/// One index object of a table, by kind.
///
/// `implied` applies to the last variable-length index only: its length
/// subid is omitted and it consumes the rest of the OID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexTemplate {
    /// Value kind of the index object.
    pub kind: ValueKind,
    /// IMPLIED marker for the final string/OID index.
    pub implied: bool,
}

impl IndexTemplate {
    /// A plain index of the given kind.
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            implied: false,
        }
    }

    /// An IMPLIED variable-length index.
    pub fn implied(kind: ValueKind) -> Self {
        Self {
            kind,
            implied: true,
        }
    }
}

/// Static description of a table registration.
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// Index objects, in MIB order.
    pub indexes: Vec<IndexTemplate>,
    /// Lowest accessible column number.
    pub min_column: u32,
    /// Highest accessible column number.
    pub max_column: u32,
    /// Accessible columns when the range is sparse, ascending. `None`
    /// means every column in `[min_column, max_column]` exists.
    pub valid_columns: Option<Vec<u32>>,
}

impl TableInfo {
    /// Describe a dense table.
    pub fn new(indexes: Vec<IndexTemplate>, min_column: u32, max_column: u32) -> Self {
        Self {
            indexes,
            min_column,
            max_column,
            valid_columns: None,
        }
    }

    /// Restrict to a sparse set of columns (must be ascending).
    pub fn with_valid_columns(mut self, columns: Vec<u32>) -> Self {
        self.valid_columns = Some(columns);
        self
    }

    /// True if `column` is accessible.
    pub fn column_valid(&self, column: u32) -> bool {
        if column < self.min_column || column > self.max_column {
            return false;
        }
        match &self.valid_columns {
            Some(cols) => cols.binary_search(&column).is_ok(),
            None => true,
        }
    }

    /// The first accessible column.
    pub fn first_column(&self) -> u32 {
        match &self.valid_columns {
            Some(cols) => cols.first().copied().unwrap_or(self.min_column),
            None => self.min_column,
        }
    }

    /// The accessible column after `column`, if any.
    pub fn next_column(&self, column: u32) -> Option<u32> {
        match &self.valid_columns {
            Some(cols) => cols.iter().copied().find(|&c| c > column),
            None => {
                let next = (column + 1).max(self.min_column);
                (next <= self.max_column).then_some(next)
            }
        }
    }
}

/// Per-request decomposition attached by the `table` helper.
#[derive(Debug, Clone)]
pub struct TableRequestInfo {
    /// Requested column, already validated against the table description.
    pub column: u32,
    /// Raw index arcs following the column.
    pub index_oid: Oid,
    /// Index values parsed against the templates; empty when the index is
    /// absent or malformed (GETNEXT probes may carry partial indexes).
    pub indexes: Vec<Value>,
}

impl TableRequestInfo {
    /// Build the full OID for this table position under `root`.
    pub fn build_oid(&self, root: &Oid) -> Oid {
        root.extend(self.column).extend_from_slice(self.index_oid.arcs())
    }

    /// Build the full OID for `column` and a row index under `root`.
    pub fn oid_for(root: &Oid, column: u32, index: &Oid) -> Oid {
        root.extend(column).extend_from_slice(index.arcs())
    }
}

/// Parse index arcs against the templates.
///
/// Returns the decoded index values, or `None` when the arcs do not match
/// the templates exactly (short, long, or malformed).
pub fn parse_index_oid(arcs: &[u32], templates: &[IndexTemplate]) -> Option<Vec<Value>> {
    let mut values = Vec::with_capacity(templates.len());
    let mut pos = 0usize;
    for (n, template) in templates.iter().enumerate() {
        let last = n + 1 == templates.len();
        match template.kind {
            ValueKind::Integer => {
                let arc = *arcs.get(pos)?;
                values.push(Value::Integer(arc as i32));
                pos += 1;
            }
            ValueKind::Gauge32 | ValueKind::Counter32 | ValueKind::TimeTicks => {
                let arc = *arcs.get(pos)?;
                let value = match template.kind {
                    ValueKind::Gauge32 => Value::Gauge32(arc),
                    ValueKind::Counter32 => Value::Counter32(arc),
                    _ => Value::TimeTicks(arc),
                };
                values.push(value);
                pos += 1;
            }
            ValueKind::IpAddress => {
                if arcs.len() < pos + 4 {
                    return None;
                }
                let mut addr = [0u8; 4];
                for (i, octet) in addr.iter_mut().enumerate() {
                    let arc = arcs[pos + i];
                    if arc > 255 {
                        return None;
                    }
                    *octet = arc as u8;
                }
                values.push(Value::IpAddress(addr));
                pos += 4;
            }
            ValueKind::OctetString => {
                let (len, start) = if template.implied && last {
                    (arcs.len() - pos, pos)
                } else {
                    let len = *arcs.get(pos)? as usize;
                    (len, pos + 1)
                };
                if arcs.len() < start + len {
                    return None;
                }
                let mut bytes = Vec::with_capacity(len);
                for &arc in &arcs[start..start + len] {
                    if arc > 255 {
                        return None;
                    }
                    bytes.push(arc as u8);
                }
                values.push(Value::OctetString(bytes.into()));
                pos = start + len;
            }
            ValueKind::ObjectIdentifier => {
                let (len, start) = if template.implied && last {
                    (arcs.len() - pos, pos)
                } else {
                    let len = *arcs.get(pos)? as usize;
                    (len, pos + 1)
                };
                if arcs.len() < start + len {
                    return None;
                }
                values.push(Value::ObjectIdentifier(Oid::from_arcs(
                    &arcs[start..start + len],
                )));
                pos = start + len;
            }
            _ => return None,
        }
    }
    if pos != arcs.len() {
        return None;
    }
    Some(values)
}

/// Encode index values into arcs per the templates.
///
/// Returns `None` on a kind mismatch.
pub fn build_index_oid(values: &[Value], templates: &[IndexTemplate]) -> Option<Oid> {
    if values.len() != templates.len() {
        return None;
    }
    let mut arcs: Vec<u32> = Vec::new();
    for (n, (value, template)) in values.iter().zip(templates).enumerate() {
        let last = n + 1 == templates.len();
        match (template.kind, value) {
            (ValueKind::Integer, Value::Integer(v)) => arcs.push(*v as u32),
            (ValueKind::Gauge32, Value::Gauge32(v))
            | (ValueKind::Counter32, Value::Counter32(v))
            | (ValueKind::TimeTicks, Value::TimeTicks(v)) => arcs.push(*v),
            (ValueKind::IpAddress, Value::IpAddress(addr)) => {
                arcs.extend(addr.iter().map(|&b| u32::from(b)));
            }
            (ValueKind::OctetString, Value::OctetString(bytes)) => {
                if !(template.implied && last) {
                    arcs.push(bytes.len() as u32);
                }
                arcs.extend(bytes.iter().map(|&b| u32::from(b)));
            }
            (ValueKind::ObjectIdentifier, Value::ObjectIdentifier(oid)) => {
                if !(template.implied && last) {
                    arcs.push(oid.len() as u32);
                }
                arcs.extend_from_slice(oid.arcs());
            }
            _ => return None,
        }
    }
    Some(Oid::from_arcs(&arcs))
}

/// Create the `table` helper node for the given table description.
///
/// Inject it in front of a row-supplying helper or a leaf that understands
/// [`TableRequestInfo`].
pub fn table(info: TableInfo) -> HandlerNode {
    HandlerNode::new("table", Arc::new(TableHelper { info: Arc::new(info) }))
}

struct TableHelper {
    info: Arc<TableInfo>,
}

impl TableHelper {
    /// Decompose an exact-position OID (GET/SET). Returns the parsed info
    /// or the error/exception to answer with.
    fn decompose_exact(
        &self,
        root: &Oid,
        oid: &Oid,
    ) -> std::result::Result<TableRequestInfo, Value> {
        let Some(rest) = oid.strip_prefix(root) else {
            return Err(Value::NoSuchObject);
        };
        let Some(&column) = rest.first() else {
            return Err(Value::NoSuchObject);
        };
        if !self.info.column_valid(column) {
            return Err(Value::NoSuchObject);
        }
        let index_arcs = &rest[1..];
        let Some(indexes) = parse_index_oid(index_arcs, &self.info.indexes) else {
            return Err(Value::NoSuchInstance);
        };
        Ok(TableRequestInfo {
            column,
            index_oid: Oid::from_arcs(index_arcs),
            indexes,
        })
    }

    /// Position a GETNEXT probe: the column to search and the index to
    /// search past. `None` means the whole table lies behind the OID.
    fn position_next(&self, root: &Oid, oid: &Oid) -> Option<TableRequestInfo> {
        let rest = match oid.strip_prefix(root) {
            Some(rest) => rest,
            None => {
                // Before the table: start at the first column, first row.
                if oid < root {
                    &[][..]
                } else {
                    return None;
                }
            }
        };
        let (column, index_arcs) = match rest.first() {
            None => (self.info.first_column(), &[][..]),
            Some(&c) if c < self.info.min_column => (self.info.first_column(), &[][..]),
            Some(&c) if c > self.info.max_column => return None,
            Some(&c) => {
                if self.info.column_valid(c) {
                    (c, &rest[1..])
                } else {
                    // Skip forward past an inaccessible column.
                    match self.info.next_column(c) {
                        Some(next) => (next, &[][..]),
                        None => return None,
                    }
                }
            }
        };
        let indexes = parse_index_oid(index_arcs, &self.info.indexes).unwrap_or_default();
        Some(TableRequestInfo {
            column,
            index_oid: Oid::from_arcs(index_arcs),
            indexes,
        })
    }
}

impl HandlerAccess for TableHelper {
    fn access<'a>(
        &'a self,
        _node: &'a HandlerNode,
        next: NextHandler<'a>,
        reginfo: &'a Registration,
        reqinfo: &'a RequestInfo,
        requests: &'a mut [Request],
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let mode = reqinfo.mode;
            for request in requests.iter_mut() {
                match mode {
                    Mode::Get | Mode::SetReserve1 => {
                        match self.decompose_exact(&reginfo.root, &request.varbind.oid) {
                            Ok(info) => {
                                trace!(column = info.column, index = %info.index_oid, "table decompose");
                                request.data.insert(TABLE_DATA_NAME, info);
                                next.call_one(reginfo, reqinfo, request).await?;
                            }
                            Err(exception) => {
                                if mode == Mode::Get {
                                    request.set_value(exception);
                                } else {
                                    request.set_error(ErrorStatus::NotWritable);
                                }
                            }
                        }
                    }
                    Mode::GetNext | Mode::GetBulk => {
                        let Some(mut info) =
                            self.position_next(&reginfo.root, &request.varbind.oid)
                        else {
                            // Past the table; dispatcher advances subtree.
                            continue;
                        };
                        // Retry with the first row of each following column
                        // until a row is found or columns run out.
                        loop {
                            request.data.remove_entry(TABLE_DATA_NAME);
                            let column = info.column;
                            request.data.insert(TABLE_DATA_NAME, info.clone());
                            next.call_one(reginfo, reqinfo, request).await?;
                            if request.processed {
                                break;
                            }
                            match self.info.next_column(column) {
                                Some(next_column) => {
                                    info = TableRequestInfo {
                                        column: next_column,
                                        index_oid: Oid::new(),
                                        indexes: Vec::new(),
                                    };
                                }
                                None => break,
                            }
                        }
                    }
                    _ => {
                        // Later SET phases: the reserve pass already
                        // attached the decomposition.
                        if request.data.get::<TableRequestInfo>(TABLE_DATA_NAME).is_some() {
                            next.call_one(reginfo, reqinfo, request).await?;
                        }
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

    fn int_index() -> Vec<IndexTemplate> {
        vec![IndexTemplate::new(ValueKind::Integer)]
    }

    #[test]
    fn test_parse_integer_index() {
        let values = parse_index_oid(&[7], &int_index()).unwrap();
        assert_eq!(values, vec![Value::Integer(7)]);
        assert!(parse_index_oid(&[], &int_index()).is_none());
        assert!(parse_index_oid(&[7, 8], &int_index()).is_none());
    }

    #[test]
    fn test_parse_string_index() {
        let templates = vec![IndexTemplate::new(ValueKind::OctetString)];
        let values = parse_index_oid(&[3, 102, 111, 111], &templates).unwrap();
        assert_eq!(values, vec![Value::OctetString("foo".into())]);
        // Length mismatch
        assert!(parse_index_oid(&[5, 102, 111, 111], &templates).is_none());
        // Arc above 255 is not an octet
        assert!(parse_index_oid(&[1, 300], &templates).is_none());
    }

    #[test]
    fn test_parse_implied_string_index() {
        let templates = vec![IndexTemplate::implied(ValueKind::OctetString)];
        let values = parse_index_oid(&[102, 111, 111], &templates).unwrap();
        assert_eq!(values, vec![Value::OctetString("foo".into())]);
    }

    #[test]
    fn test_parse_compound_index() {
        let templates = vec![
            IndexTemplate::new(ValueKind::Integer),
            IndexTemplate::new(ValueKind::IpAddress),
        ];
        let values = parse_index_oid(&[9, 10, 0, 0, 1], &templates).unwrap();
        assert_eq!(
            values,
            vec![Value::Integer(9), Value::IpAddress([10, 0, 0, 1])]
        );
    }

    #[test]
    fn test_build_index_roundtrip() {
        let templates = vec![
            IndexTemplate::new(ValueKind::Integer),
            IndexTemplate::new(ValueKind::OctetString),
        ];
        let values = vec![Value::Integer(4), Value::OctetString("ab".into())];
        let index = build_index_oid(&values, &templates).unwrap();
        assert_eq!(index.arcs(), &[4, 2, 97, 98]);
        assert_eq!(parse_index_oid(index.arcs(), &templates).unwrap(), values);
    }

    #[test]
    fn test_build_index_oid_index() {
        let templates = vec![IndexTemplate::new(ValueKind::ObjectIdentifier)];
        let values = vec![Value::ObjectIdentifier(oid!(1, 3, 6))];
        let index = build_index_oid(&values, &templates).unwrap();
        assert_eq!(index.arcs(), &[3, 1, 3, 6]);
    }

    #[test]
    fn test_column_validity() {
        let info = TableInfo::new(int_index(), 2, 6);
        assert!(!info.column_valid(1));
        assert!(info.column_valid(2));
        assert!(info.column_valid(6));
        assert!(!info.column_valid(7));
        assert_eq!(info.first_column(), 2);
        assert_eq!(info.next_column(2), Some(3));
        assert_eq!(info.next_column(6), None);
    }

    #[test]
    fn test_sparse_columns() {
        let info = TableInfo::new(int_index(), 2, 9).with_valid_columns(vec![2, 5, 9]);
        assert!(info.column_valid(2));
        assert!(!info.column_valid(3));
        assert!(info.column_valid(9));
        assert_eq!(info.next_column(2), Some(5));
        assert_eq!(info.next_column(5), Some(9));
        assert_eq!(info.next_column(9), None);
        assert_eq!(info.first_column(), 2);
    }

    #[test]
    fn test_table_request_info_build_oid() {
        let info = TableRequestInfo {
            column: 3,
            index_oid: oid!(7, 7),
            indexes: vec![],
        };
        assert_eq!(
            info.build_oid(&oid!(1, 3, 6, 1, 9, 1)),
            oid!(1, 3, 6, 1, 9, 1, 3, 7, 7)
        );
    }
}
