//! Memory access trace: one `<R|W> <hex address>` per line.

use std::{fmt, io::BufRead};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, hex_digit1, space0, space1},
    combinator::{eof, map_res, opt, peek, value},
    IResult,
};
use thiserror::Error;

use crate::hierarchy::AccessKind;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("trace line {line}: expected `<R|W> <hex address>`, found `{content}`")]
    Format { line: usize, content: String },
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
}

/// what a trace source yields.
pub type TraceItem = Result<TraceEvent, TraceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: AccessKind,
    pub addr: u32,
}

impl TraceEvent {
    pub fn read(addr: u32) -> Self {
        Self {
            kind: AccessKind::Read,
            addr,
        }
    }
    pub fn write(addr: u32) -> Self {
        Self {
            kind: AccessKind::Write,
            addr,
        }
    }
    /// parses one trace line. trailing fields after the address are ignored.
    pub fn parse(line: &str) -> Option<Self> {
        trace_line(line).ok().map(|(_, e)| e)
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#010x}", self.kind, self.addr)
    }
}

fn access_kind(input: &str) -> IResult<&str, AccessKind> {
    alt((
        value(AccessKind::Read, char('R')),
        value(AccessKind::Write, char('W')),
    ))(input)
}

fn hex_addr(input: &str) -> IResult<&str, u32> {
    let (input, _) = opt(alt((tag("0x"), tag("0X"))))(input)?;
    map_res(hex_digit1, |h| u32::from_str_radix(h, 16))(input)
}

fn trace_line(input: &str) -> IResult<&str, TraceEvent> {
    let (input, _) = space0(input)?;
    let (input, kind) = access_kind(input)?;
    let (input, _) = space1(input)?;
    let (input, addr) = hex_addr(input)?;
    let (input, _) = peek(alt((space1, eof)))(input)?;
    Ok((input, TraceEvent { kind, addr }))
}

/// Yields events until end of input or the first malformed line; nothing after an error.
/// A line that is not valid UTF-8 is malformed.
pub struct TraceReader<R> {
    inner: R,
    line_no: usize,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_no: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    fn parse_line(&self) -> TraceItem {
        let raw = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf[..]);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        std::str::from_utf8(raw)
            .ok()
            .and_then(TraceEvent::parse)
            .ok_or_else(|| TraceError::Format {
                line: self.line_no,
                content: String::from_utf8_lossy(raw).into_owned(),
            })
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = TraceItem;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.buf.clear();
        match self.inner.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.line_no += 1;
                let item = self.parse_line();
                self.done = item.is_err();
                Some(item)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}
