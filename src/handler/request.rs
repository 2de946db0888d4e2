//! Per-request state threaded through a handler chain.

use std::any::Any;
use std::net::SocketAddr;

use bytes::Bytes;
use tracing::warn;

use crate::error::ErrorStatus;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

use super::Mode;

/// Named, type-erased payload entries attached to a request by helpers.
///
/// Entries are dropped with the request. Inserting a duplicate name logs a
/// warning and leaves the existing entry in place.
#[derive(Default)]
pub struct DataMap {
    entries: Vec<(String, Box<dyn Any + Send>)>,
}

impl DataMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a payload under `name`.
    ///
    /// If the name is already present the existing entry wins and the new
    /// payload is dropped.
    pub fn insert<T: Any + Send>(&mut self, name: impl Into<String>, payload: T) {
        let name = name.into();
        if self.entries.iter().any(|(n, _)| *n == name) {
            warn!(name = %name, "duplicate request data entry ignored");
            return;
        }
        self.entries.push((name, Box::new(payload)));
    }

    /// Borrow the payload stored under `name`, if it has the right type.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, payload)| payload.downcast_ref())
    }

    /// Mutably borrow the payload stored under `name`.
    pub fn get_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .and_then(|(_, payload)| payload.downcast_mut())
    }

    /// Remove and return the payload stored under `name`.
    pub fn remove<T: Any>(&mut self, name: &str) -> Option<Box<T>> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        let (_, payload) = self.entries.remove(pos);
        payload.downcast().ok()
    }

    /// Remove an entry regardless of its type. Returns whether it existed.
    pub fn remove_entry(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries are attached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for DataMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(n, _)| n))
            .finish()
    }
}

/// Security and framing context of the PDU a request arrived in.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Source address of the request, when it arrived over a transport.
    pub source: Option<SocketAddr>,
    /// Protocol version.
    pub version: Version,
    /// Community string (security parameters for v1/v2c).
    pub community: Bytes,
    /// Registration context name the request resolved to.
    pub context_name: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            source: None,
            version: Version::V2c,
            community: Bytes::new(),
            context_name: String::new(),
        }
    }
}

/// Per-PDU information shared by every request in a batch.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// The processing mode for this pass over the chain.
    pub mode: Mode,
    /// Transaction id of the owning PDU; late completions whose id no
    /// longer matches a live transaction are discarded.
    pub transaction_id: u64,
    /// Security and framing context.
    pub context: RequestContext,
}

impl RequestInfo {
    /// Create request info.
    pub fn new(mode: Mode, transaction_id: u64, context: RequestContext) -> Self {
        Self {
            mode,
            transaction_id,
            context,
        }
    }

    /// A copy of this info with a different mode.
    ///
    /// Helpers that convert one mode into another (GETBULK into GETNEXT,
    /// GETNEXT into GET) pass the converted copy down the chain.
    pub fn with_mode(&self, mode: Mode) -> Self {
        Self {
            mode,
            transaction_id: self.transaction_id,
            context: self.context.clone(),
        }
    }
}

/// One variable binding being processed, with its bookkeeping.
#[derive(Debug)]
pub struct Request {
    /// The variable under processing. Handlers answer by replacing the
    /// value (GET) or the whole binding (GETNEXT).
    pub varbind: VarBind,
    /// Position in the original PDU, used to reassemble response order.
    pub index: usize,
    /// Per-request error status.
    pub status: ErrorStatus,
    /// Set once a handler has produced an answer or error.
    pub processed: bool,
    /// Set when a handler deferred completion out of line.
    pub delegated: bool,
    /// Transaction id of the owning PDU.
    pub transaction_id: u64,
    /// Helper-attached payloads, freed with the request.
    pub data: DataMap,
}

impl Request {
    /// Create a request for one varbind.
    pub fn new(varbind: VarBind, index: usize, transaction_id: u64) -> Self {
        Self {
            varbind,
            index,
            status: ErrorStatus::NoError,
            processed: false,
            delegated: false,
            transaction_id,
            data: DataMap::new(),
        }
    }

    /// Answer a GET: replace the value, keep the name.
    pub fn set_value(&mut self, value: Value) {
        self.varbind.value = value;
        self.processed = true;
    }

    /// Answer a GETNEXT: replace name and value.
    pub fn set_varbind(&mut self, varbind: VarBind) {
        self.varbind = varbind;
        self.processed = true;
    }

    /// Record an error for this request.
    ///
    /// The first error sticks; later attempts do not overwrite it.
    pub fn set_error(&mut self, status: ErrorStatus) {
        if self.status.is_ok() {
            self.status = status;
        }
        self.processed = true;
    }

    /// Mark this request as delegated to an out-of-line completion.
    pub fn mark_delegated(&mut self) {
        self.delegated = true;
    }

    /// Clear the delegation mark (completion arrived).
    pub fn clear_delegated(&mut self) {
        self.delegated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn request() -> Request {
        Request::new(VarBind::null(oid!(1, 3, 6, 1, 1)), 0, 7)
    }

    #[test]
    fn test_data_map_insert_get() {
        let mut map = DataMap::new();
        map.insert("table", 42u32);
        assert_eq!(map.get::<u32>("table"), Some(&42));
        // Wrong type reads as absent
        assert_eq!(map.get::<String>("table"), None);
        assert_eq!(map.get::<u32>("other"), None);
    }

    #[test]
    fn test_data_map_duplicate_keeps_existing() {
        let mut map = DataMap::new();
        map.insert("k", 1u32);
        map.insert("k", 2u32);
        assert_eq!(map.get::<u32>("k"), Some(&1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_data_map_remove() {
        let mut map = DataMap::new();
        map.insert("k", String::from("payload"));
        let taken = map.remove::<String>("k").unwrap();
        assert_eq!(*taken, "payload");
        assert!(map.is_empty());
        assert!(map.remove::<String>("k").is_none());
    }

    #[test]
    fn test_request_set_value() {
        let mut req = request();
        assert!(!req.processed);
        req.set_value(Value::Integer(9));
        assert!(req.processed);
        assert_eq!(req.varbind.value, Value::Integer(9));
        assert_eq!(req.varbind.oid, oid!(1, 3, 6, 1, 1));
    }

    #[test]
    fn test_request_first_error_sticks() {
        let mut req = request();
        req.set_error(ErrorStatus::WrongType);
        req.set_error(ErrorStatus::GenErr);
        assert_eq!(req.status, ErrorStatus::WrongType);
    }

    #[test]
    fn test_request_info_with_mode() {
        let info = RequestInfo::new(Mode::GetBulk, 3, RequestContext::default());
        let converted = info.with_mode(Mode::GetNext);
        assert_eq!(converted.mode, Mode::GetNext);
        assert_eq!(converted.transaction_id, 3);
        assert_eq!(info.mode, Mode::GetBulk);
    }
}
