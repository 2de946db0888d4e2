//! Handler registrations.

use std::time::Duration;

use crate::handler::{HandlerChain, Mode};
use crate::oid::Oid;

/// Priority used when a registration does not specify one. Lower wins.
pub const DEFAULT_PRIORITY: i32 = 127;

bitflags::bitflags! {
    /// Capabilities of a registration, consulted at lookup time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegistrationModes: u32 {
        /// Serves GET and GETNEXT.
        const GET_AND_GETNEXT = 0x01;
        /// Serves SET.
        const SET = 0x02;
        /// Serves GETBULK natively.
        const GET_BULK = 0x04;
        /// Row creation through SET is refused.
        const NOT_CREATE = 0x08;
        /// The chain contains a baby-steps expansion node.
        const BABY_STEP = 0x10;
    }
}

impl RegistrationModes {
    /// Read-only capability set.
    pub const RONLY: Self = Self::GET_AND_GETNEXT.union(Self::GET_BULK);
    /// Read-write capability set.
    pub const RWRITE: Self = Self::RONLY.union(Self::SET);
}

/// A handler chain bound to an OID subtree.
///
/// A registration with `range_subid > 0` covers every root obtained by
/// substituting arc `range_subid` (1-based) with the values up to
/// `range_upper_bound`; the registry expands it into one node per covered
/// sub-identifier at registration time.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Diagnostic name.
    pub name: String,
    /// Root of the covered subtree.
    pub root: Oid,
    /// Priority among registrations at the same root; lowest wins.
    pub priority: i32,
    /// 1-based index of the ranged arc, or 0 for a plain registration.
    pub range_subid: usize,
    /// Inclusive upper bound for the ranged arc.
    pub range_upper_bound: u32,
    /// Context name; the empty string is the default context.
    pub context: String,
    /// Deadline for one pass over the chain; `GenErr` on expiry.
    pub timeout: Option<Duration>,
    /// Capability set.
    pub modes: RegistrationModes,
    chain: HandlerChain,
}

impl Registration {
    /// Create a read-write registration with default priority.
    pub fn new(name: impl Into<String>, root: Oid, chain: HandlerChain) -> Self {
        Self {
            name: name.into(),
            root,
            priority: DEFAULT_PRIORITY,
            range_subid: 0,
            range_upper_bound: 0,
            context: String::new(),
            timeout: None,
            modes: RegistrationModes::RWRITE,
            chain,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the capability modes.
    pub fn with_modes(mut self, modes: RegistrationModes) -> Self {
        self.modes = modes;
        self
    }

    /// Set the context name.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the per-pass timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Make this a range registration over arc `range_subid` (1-based) up
    /// to `upper_bound` inclusive.
    pub fn with_range(mut self, range_subid: usize, upper_bound: u32) -> Self {
        self.range_subid = range_subid;
        self.range_upper_bound = upper_bound;
        self
    }

    /// The handler chain.
    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    /// Mutable access for handler injection.
    pub fn chain_mut(&mut self) -> &mut HandlerChain {
        &mut self.chain
    }

    /// Whether this registration serves the given mode.
    pub fn accepts_mode(&self, mode: Mode) -> bool {
        match mode {
            Mode::Get | Mode::GetNext => self.modes.contains(RegistrationModes::GET_AND_GETNEXT),
            Mode::GetBulk => self
                .modes
                .intersects(RegistrationModes::GET_BULK | RegistrationModes::GET_AND_GETNEXT),
            _ => self.modes.contains(RegistrationModes::SET),
        }
    }

    /// A clone of this registration rooted at one covered sub-identifier.
    ///
    /// The handler chain is shared; range fields are preserved so the
    /// original coverage can be recomputed at unregistration.
    pub(crate) fn clone_for_root(&self, root: Oid) -> Self {
        let mut clone = self.clone();
        clone.root = root;
        clone
    }

    /// Every root this registration covers, in OID order.
    pub(crate) fn covered_roots(&self) -> Vec<Oid> {
        if self.range_subid == 0 {
            return vec![self.root.clone()];
        }
        let idx = self.range_subid - 1;
        let from = self.root.arcs()[idx];
        (from..=self.range_upper_bound)
            .map(|v| {
                let mut arcs = self.root.arcs().to_vec();
                arcs[idx] = v;
                Oid::from_arcs(&arcs)
            })
            .collect()
    }
}
