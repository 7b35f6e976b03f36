use std::{collections::HashMap, fmt};

use bitmask_enum::bitmask;

use crate::{breakpoint::BreakPoint, hierarchy::AccessKind};

#[derive(Default)]
pub struct RunStep {
    step: Option<usize>,
}

impl RunStep {
    pub fn new(step: Option<usize>) -> Self {
        Self { step }
    }

    pub fn get_step(&self) -> usize {
        self.step.unwrap_or(1)
    }
}

#[derive(Default)]
pub enum ExecuteMode {
    #[default]
    Run,
    RunStep(RunStep),
}

impl fmt::Display for ExecuteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteMode::Run => write!(f, "running to end of trace"),
            ExecuteMode::RunStep(r) => {
                write!(f, "stepping by {}", r.get_step())
            }
        }
    }
}

#[derive(Default)]
pub struct SimulationOption {
    /// print every access with its states
    pub do_trace: bool,
    pub mode: ExecuteMode,
    /// keyed by L1 block address
    pub breakpoints: HashMap<u32, BreakPoint>,
}

#[bitmask(u8)]
pub enum AccessKindMask {
    Read,
    Write,
}

impl From<AccessKind> for AccessKindMask {
    fn from(kind: AccessKind) -> Self {
        match kind {
            AccessKind::Read => AccessKindMask::Read,
            AccessKind::Write => AccessKindMask::Write,
        }
    }
}

impl fmt::Display for AccessKindMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::Read) {
            write!(f, "read")?;
            if self.contains(Self::Write) {
                write!(f, "/write")?;
            }
        } else if self.contains(Self::Write) {
            write!(f, "write")?;
        }
        Ok(())
    }
}
