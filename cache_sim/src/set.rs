use std::fmt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub tag: u32,
    pub valid: bool,
    pub dirty: bool,
}

impl Line {
    fn holds(&self, tag: u32) -> bool {
        self.valid && self.tag == tag
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "{:#010x}", self.tag)?;
            if self.dirty {
                write!(f, " (dirty)")?;
            }
            Ok(())
        } else {
            write!(f, "-")
        }
    }
}

/// Lines sharing one index, with a round-robin victim cursor.
#[derive(Debug, Clone)]
pub struct CacheSet {
    lines: Vec<Line>,
    cursor: usize,
}

impl CacheSet {
    pub fn new(ways: usize) -> Self {
        Self {
            lines: vec![Line::default(); ways.max(1)],
            cursor: 0,
        }
    }
    pub fn ways(&self) -> usize {
        self.lines.len()
    }
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }
    /// slot the next fill will overwrite.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
    /// slot of the valid line holding `tag`.
    pub fn find(&self, tag: u32) -> Option<usize> {
        self.lines.iter().position(|l| l.holds(tag))
    }
    pub fn victim(&self) -> &Line {
        &self.lines[self.cursor]
    }
    pub fn mark_dirty(&mut self, way: usize) {
        self.lines[way].dirty = true;
    }
    /// installs `tag` at the victim slot and advances the cursor. returns the slot used.
    pub fn fill(&mut self, tag: u32) -> usize {
        let way = self.cursor;
        self.lines[way] = Line {
            tag,
            valid: true,
            dirty: false,
        };
        self.cursor = (self.cursor + 1) % self.lines.len();
        way
    }
}
