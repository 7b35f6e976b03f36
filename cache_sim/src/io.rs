use std::io::{self, Write};

use thiserror::Error;

use crate::hierarchy::{AccessOutcome, AccessState};

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write access states: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, OutputError>;

/// Sink for the per-access `(L1, L2)` state pair.
pub trait Output {
    fn record(&mut self, outcome: &AccessOutcome) -> Result<()>;
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// `<L1 state> <L2 state>` per line, states as their integer codes.
pub struct TextOutput<W> {
    inner: W,
}

impl<W: Write> TextOutput<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Output for TextOutput<W> {
    fn record(&mut self, outcome: &AccessOutcome) -> Result<()> {
        writeln!(self.inner, "{} {}", outcome.l1, outcome.l2)?;
        Ok(())
    }
    fn finish(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// keeps every state pair in memory.
#[derive(Default)]
pub struct VecOutput {
    content: Vec<(AccessState, AccessState)>,
}

impl VecOutput {
    pub fn new() -> Self {
        Self {
            content: Vec::new(),
        }
    }
    pub fn into_inner(self) -> Vec<(AccessState, AccessState)> {
        self.content
    }
    pub fn as_slice(&self) -> &[(AccessState, AccessState)] {
        &self.content
    }
}

impl Output for VecOutput {
    fn record(&mut self, outcome: &AccessOutcome) -> Result<()> {
        self.content.push((outcome.l1, outcome.l2));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_output() {
        let mut out = TextOutput::new(Vec::new());
        out.record(&AccessOutcome {
            l1: AccessState::ReadMiss,
            l2: AccessState::ReadHit,
            write_back: None,
        })
        .unwrap();
        out.record(&AccessOutcome {
            l1: AccessState::WriteHit,
            ..Default::default()
        })
        .unwrap();
        out.finish().unwrap();
        assert_eq!("2 1\n3 0\n", String::from_utf8(out.into_inner()).unwrap());
    }
}
