//! OID subtree registry.
//!
//! Per context, registrations are kept in a `BTreeMap` keyed by their root
//! OID; parallel registrations at the same root are ordered by priority
//! (lowest wins). Lookup resolves the longest registered prefix of a target
//! OID; GETNEXT resolution walks the map in OID order.

mod registration;

pub use registration::{DEFAULT_PRIORITY, Registration, RegistrationModes};

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, RegistryErrorKind, Result};
use crate::handler::Mode;
use crate::oid::Oid;

/// Notification emitted on registration changes.
#[derive(Debug, Clone)]
pub struct RegistrationEvent {
    /// True for register, false for unregister.
    pub registered: bool,
    /// Context the change applies to.
    pub context: String,
    /// Root OID of the (original, unexpanded) registration.
    pub root: Oid,
    /// Diagnostic name.
    pub name: String,
    /// Priority.
    pub priority: i32,
}

type Observer = Box<dyn Fn(&RegistrationEvent) + Send + Sync>;

#[derive(Default)]
struct SubtreeNode {
    /// Parallel registrations at this root, priority ascending.
    regs: Vec<Arc<Registration>>,
}

/// The per-context forest of subtree registrations.
#[derive(Default)]
pub struct Registry {
    contexts: HashMap<String, BTreeMap<Oid, SubtreeNode>>,
    observers: Vec<Observer>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to registration changes.
    ///
    /// Observers run synchronously inside register/unregister, which are
    /// serialized with dispatch.
    pub fn add_observer(&mut self, observer: impl Fn(&RegistrationEvent) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&self, event: &RegistrationEvent) {
        for observer in &self.observers {
            observer(event);
        }
    }

    /// Register a handler chain for a subtree.
    ///
    /// Fails with `DuplicateRegistration` when any covered root already
    /// holds a registration at the same priority, with `InvalidRange` for
    /// malformed range parameters, and with `RegistrationFailed` for an
    /// empty chain. On failure nothing is inserted.
    pub fn register(&mut self, reg: Registration) -> Result<()> {
        if reg.chain().is_empty() {
            return Err(Error::registry(RegistryErrorKind::RegistrationFailed));
        }
        if reg.root.is_empty() {
            return Err(Error::registry(RegistryErrorKind::RegistrationFailed));
        }
        if reg.range_subid > 0 {
            let idx = reg.range_subid - 1;
            if idx >= reg.root.len() || reg.range_upper_bound < reg.root.arcs()[idx] {
                return Err(Error::registry(RegistryErrorKind::InvalidRange));
            }
        }

        let roots = reg.covered_roots();
        let tree = self.contexts.entry(reg.context.clone()).or_default();

        // All-or-nothing: check every covered root before touching the tree.
        for root in &roots {
            if let Some(node) = tree.get(root)
                && node.regs.iter().any(|r| r.priority == reg.priority)
            {
                return Err(Error::registry(RegistryErrorKind::DuplicateRegistration));
            }
        }

        let event = RegistrationEvent {
            registered: true,
            context: reg.context.clone(),
            root: reg.root.clone(),
            name: reg.name.clone(),
            priority: reg.priority,
        };

        for root in roots {
            let entry = Arc::new(reg.clone_for_root(root.clone()));
            let node = tree.entry(root).or_default();
            let pos = node
                .regs
                .partition_point(|r| r.priority < entry.priority);
            node.regs.insert(pos, entry);
        }

        info!(
            name = %event.name,
            root = %event.root,
            priority = event.priority,
            context = %event.context,
            "registered subtree"
        );
        self.notify(&event);
        Ok(())
    }

    /// Remove the registration at (context, root, priority).
    ///
    /// For a range registration, `root` is the original (lowest) root; the
    /// full covered range is removed.
    pub fn unregister(&mut self, context: &str, root: &Oid, priority: i32) -> Result<()> {
        let tree = self
            .contexts
            .get_mut(context)
            .ok_or_else(|| Error::registry(RegistryErrorKind::NotRegistered))?;

        let reg = tree
            .get(root)
            .and_then(|node| node.regs.iter().find(|r| r.priority == priority))
            .cloned()
            .ok_or_else(|| Error::registry(RegistryErrorKind::NotRegistered))?;

        for covered in reg.covered_roots() {
            if let Some(node) = tree.get_mut(&covered) {
                node.regs.retain(|r| r.priority != priority);
                if node.regs.is_empty() {
                    tree.remove(&covered);
                }
            }
        }
        if tree.is_empty() {
            self.contexts.remove(context);
        }

        let event = RegistrationEvent {
            registered: false,
            context: context.to_string(),
            root: root.clone(),
            name: reg.name.clone(),
            priority,
        };
        info!(
            name = %event.name,
            root = %event.root,
            priority = priority,
            "unregistered subtree"
        );
        self.notify(&event);
        Ok(())
    }

    /// Find the registration serving `oid` in `context` for `mode`.
    ///
    /// The longest registered prefix wins; among parallel registrations at
    /// that root, the lowest priority whose modes accept `mode`. Roots whose
    /// registrations all refuse the mode fall through to shorter prefixes.
    pub fn find(&self, context: &str, oid: &Oid, mode: Mode) -> Option<Arc<Registration>> {
        let tree = self.contexts.get(context)?;
        let mut probe = oid.clone();
        while !probe.is_empty() {
            if let Some(node) = tree.get(&probe)
                && let Some(reg) = node.regs.iter().find(|r| r.accepts_mode(mode))
            {
                debug!(oid = %oid, root = %probe, reg = %reg.name, "subtree lookup hit");
                return Some(Arc::clone(reg));
            }
            probe.truncate(probe.len() - 1);
        }
        None
    }

    /// The first registration whose root is strictly greater than `oid`.
    ///
    /// Used by the GETNEXT walk to advance to the following subtree.
    pub fn find_next(&self, context: &str, oid: &Oid, mode: Mode) -> Option<Arc<Registration>> {
        let tree = self.contexts.get(context)?;
        let mut range = tree.range::<Oid, _>((Bound::Excluded(oid), Bound::Unbounded));
        loop {
            let (_, node) = range.next()?;
            if let Some(reg) = node.regs.iter().find(|r| r.accepts_mode(mode)) {
                return Some(Arc::clone(reg));
            }
        }
    }

    /// Names of all contexts with at least one registration.
    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.keys().map(String::as_str).collect()
    }

    /// Number of subtree nodes in a context.
    pub fn subtree_count(&self, context: &str) -> usize {
        self.contexts.get(context).map_or(0, BTreeMap::len)
    }

    /// Find a registration by exact root and priority (diagnostics and
    /// handler injection by name).
    pub fn get(&self, context: &str, root: &Oid, priority: i32) -> Option<Arc<Registration>> {
        self.contexts
            .get(context)?
            .get(root)?
            .regs
            .iter()
            .find(|r| r.priority == priority)
            .cloned()
    }

    /// Find the lowest-priority registration at an exact root.
    pub fn get_any(&self, context: &str, root: &Oid) -> Option<Arc<Registration>> {
        self.contexts.get(context)?.get(root)?.regs.first().cloned()
    }

    /// Find a registration by its diagnostic name, searching every context.
    ///
    /// Range expansions share one name; the entry at the original root is
    /// returned (the lowest covered root).
    pub fn find_by_name(&self, name: &str) -> Option<(String, Arc<Registration>)> {
        for (context, tree) in &self.contexts {
            if let Some(reg) = tree
                .values()
                .flat_map(|node| node.regs.iter())
                .filter(|r| r.name == name)
                .min_by(|a, b| a.root.cmp(&b.root))
            {
                return Some((context.clone(), Arc::clone(reg)));
            }
        }
        None
    }

    /// Replace a registration's entry in place (handler injection).
    ///
    /// The caller obtains the registration, clones and modifies it, and
    /// swaps it back under the same root and priority.
    pub fn replace(&mut self, context: &str, updated: Registration) -> Result<()> {
        let tree = self
            .contexts
            .get_mut(context)
            .ok_or_else(|| Error::registry(RegistryErrorKind::NotRegistered))?;
        for covered in updated.covered_roots() {
            let node = tree
                .get_mut(&covered)
                .ok_or_else(|| Error::registry(RegistryErrorKind::NotRegistered))?;
            let slot = node
                .regs
                .iter_mut()
                .find(|r| r.priority == updated.priority)
                .ok_or_else(|| Error::registry(RegistryErrorKind::NotRegistered))?;
            *slot = Arc::new(updated.clone_for_root(covered.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (context, tree) in &self.contexts {
            map.entry(&context, &tree.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerChain, HandlerNode, NextHandler, Request, RequestInfo};
    use crate::handler::{BoxFuture, HandlerAccess, HandlerResult};
    use crate::oid;

    struct Nop;
    impl HandlerAccess for Nop {
        fn access<'a>(
            &'a self,
            _node: &'a HandlerNode,
            _next: NextHandler<'a>,
            _reginfo: &'a Registration,
            _reqinfo: &'a RequestInfo,
            _requests: &'a mut [Request],
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async { Ok(()) })
        }
    }

    fn reg(name: &str, root: Oid) -> Registration {
        Registration::new(
            name,
            root,
            HandlerChain::single(HandlerNode::new("leaf", Arc::new(Nop))),
        )
    }

    #[test]
    fn test_register_and_find() {
        let mut registry = Registry::new();
        registry.register(reg("sys", oid!(1, 3, 6, 1, 2, 1, 1))).unwrap();

        let hit = registry
            .find("", &oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Mode::Get)
            .unwrap();
        assert_eq!(hit.name, "sys");

        assert!(registry.find("", &oid!(1, 3, 6, 1, 2, 1, 2), Mode::Get).is_none());
        assert!(registry.find("other", &oid!(1, 3, 6, 1, 2, 1, 1, 1), Mode::Get).is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut registry = Registry::new();
        registry.register(reg("broad", oid!(1, 3, 6, 1))).unwrap();
        registry.register(reg("narrow", oid!(1, 3, 6, 1, 4, 1))).unwrap();

        let hit = registry.find("", &oid!(1, 3, 6, 1, 4, 1, 9, 9), Mode::Get).unwrap();
        assert_eq!(hit.name, "narrow");

        let hit = registry.find("", &oid!(1, 3, 6, 1, 2, 1), Mode::Get).unwrap();
        assert_eq!(hit.name, "broad");
    }

    #[test]
    fn test_priority_order() {
        let mut registry = Registry::new();
        let root = oid!(1, 3, 6, 1, 4, 1, 42);
        registry.register(reg("h1", root.clone()).with_priority(10)).unwrap();
        registry.register(reg("h2", root.clone()).with_priority(5)).unwrap();

        // Lowest priority wins
        let hit = registry.find("", &root, Mode::Get).unwrap();
        assert_eq!(hit.name, "h2");

        registry.unregister("", &root, 5).unwrap();
        let hit = registry.find("", &root, Mode::Get).unwrap();
        assert_eq!(hit.name, "h1");
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let mut registry = Registry::new();
        let root = oid!(1, 3, 6, 1, 4, 1, 42);
        registry.register(reg("first", root.clone()).with_priority(7)).unwrap();
        let err = registry
            .register(reg("second", root.clone()).with_priority(7))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Registry {
                kind: RegistryErrorKind::DuplicateRegistration
            }
        ));
        // Original registration untouched
        assert_eq!(registry.find("", &root, Mode::Get).unwrap().name, "first");
    }

    #[test]
    fn test_mode_filtering_falls_through() {
        let mut registry = Registry::new();
        registry
            .register(
                reg("writable-parent", oid!(1, 3, 6, 1))
                    .with_modes(RegistrationModes::RWRITE),
            )
            .unwrap();
        registry
            .register(
                reg("readonly-child", oid!(1, 3, 6, 1, 5))
                    .with_modes(RegistrationModes::RONLY),
            )
            .unwrap();

        // Reads hit the child
        let hit = registry.find("", &oid!(1, 3, 6, 1, 5, 1), Mode::Get).unwrap();
        assert_eq!(hit.name, "readonly-child");
        // Writes fall through to the parent
        let hit = registry
            .find("", &oid!(1, 3, 6, 1, 5, 1), Mode::SetReserve1)
            .unwrap();
        assert_eq!(hit.name, "writable-parent");
    }

    #[test]
    fn test_range_registration() {
        let mut registry = Registry::new();
        // Covers 1.3.6.1.2 through 1.3.6.1.4 via arc 5
        registry
            .register(reg("ranged", oid!(1, 3, 6, 1, 2)).with_range(5, 4))
            .unwrap();

        assert_eq!(registry.subtree_count(""), 3);
        for arc in 2..=4 {
            let hit = registry.find("", &oid!(1, 3, 6, 1, arc, 9), Mode::Get).unwrap();
            assert_eq!(hit.name, "ranged");
            assert_eq!(hit.root, oid!(1, 3, 6, 1, arc));
        }
        assert!(registry.find("", &oid!(1, 3, 6, 1, 5, 9), Mode::Get).is_none());

        // Unregister removes the whole covered range
        registry.unregister("", &oid!(1, 3, 6, 1, 2), DEFAULT_PRIORITY).unwrap();
        assert_eq!(registry.subtree_count(""), 0);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let mut registry = Registry::new();
        // Upper bound below the ranged arc value
        let err = registry
            .register(reg("bad", oid!(1, 3, 6, 1, 9)).with_range(5, 3))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Registry {
                kind: RegistryErrorKind::InvalidRange
            }
        ));
        // Subid index out of bounds
        assert!(
            registry
                .register(reg("bad2", oid!(1, 3)).with_range(7, 9))
                .is_err()
        );
    }

    #[test]
    fn test_find_next_in_oid_order() {
        let mut registry = Registry::new();
        registry.register(reg("a", oid!(1, 3, 6, 1, 2))).unwrap();
        registry.register(reg("b", oid!(1, 3, 6, 1, 6))).unwrap();

        let next = registry.find_next("", &oid!(1, 3, 6, 1, 2), Mode::GetNext).unwrap();
        assert_eq!(next.name, "b");

        let next = registry.find_next("", &oid!(1, 3, 6, 1), Mode::GetNext).unwrap();
        assert_eq!(next.name, "a");

        assert!(registry.find_next("", &oid!(1, 3, 6, 1, 6), Mode::GetNext).is_none());
    }

    #[test]
    fn test_observer_events() {
        use std::sync::Mutex;
        let events: Arc<Mutex<Vec<(bool, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut registry = Registry::new();
        registry.add_observer(move |event| {
            sink.lock().unwrap().push((event.registered, event.name.clone()));
        });

        let root = oid!(1, 3, 6, 1, 4, 1, 42);
        registry.register(reg("observed", root.clone())).unwrap();
        registry.unregister("", &root, DEFAULT_PRIORITY).unwrap();

        let log = events.lock().unwrap();
        assert_eq!(log.as_slice(), &[
            (true, "observed".to_string()),
            (false, "observed".to_string())
        ]);
    }

    #[test]
    fn test_contexts_are_isolated() {
        let mut registry = Registry::new();
        registry
            .register(reg("ctx-a", oid!(1, 3, 6, 1)).with_context("alpha"))
            .unwrap();

        assert!(registry.find("", &oid!(1, 3, 6, 1, 1), Mode::Get).is_none());
        assert!(registry.find("alpha", &oid!(1, 3, 6, 1, 1), Mode::Get).is_some());
    }

    #[test]
    fn test_empty_chain_rejected() {
        let mut registry = Registry::new();
        let bad = Registration::new("empty", oid!(1, 3, 6), HandlerChain::new());
        assert!(registry.register(bad).is_err());
    }
}
