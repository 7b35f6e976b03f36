use std::fmt::Display;

use crate::{common::AccessKindMask, trace::TraceEvent};

/// Stops the simulator before an access to block `addr` whose kind is in `kind`.
#[derive(Clone, Copy)]
pub struct BreakPoint {
    /// block address under the L1 geometry
    pub addr: u32,
    pub kind: AccessKindMask,
}

impl Display for BreakPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x} on {}", self.addr, self.kind)
    }
}

impl BreakPoint {
    pub fn new(addr: u32, kind: AccessKindMask) -> Self {
        Self { addr, kind }
    }
    /// `block` is the L1 block address of `event`.
    pub fn matches(&self, block: u32, event: &TraceEvent) -> bool {
        self.addr == block && self.kind.contains(event.kind.into())
    }
}

impl std::borrow::Borrow<u32> for BreakPoint {
    fn borrow(&self) -> &u32 {
        &self.addr
    }
}
