//! Geometry file: one `<label> <block size> <ways> <capacity KiB>` line per level, L1 first.

use std::fmt;

use nom::{
    bytes::complete::take_till1,
    character::complete::{space0, space1, u32 as dec_u32},
    combinator::all_consuming,
    IResult,
};

use crate::geometry::{CacheGeometry, ConfigError, Result};

pub const NUM_LEVELS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelConfig {
    pub label: String,
    pub geometry: CacheGeometry,
}

impl fmt::Display for LevelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.geometry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyConfig {
    pub l1: LevelConfig,
    pub l2: LevelConfig,
}

struct RawLevel<'a> {
    label: &'a str,
    block_size: u32,
    ways: u32,
    capacity_kib: u32,
}

fn level_line(input: &str) -> IResult<&str, RawLevel<'_>> {
    let (input, _) = space0(input)?;
    let (input, label) = take_till1(|c: char| c.is_whitespace())(input)?;
    let (input, _) = space1(input)?;
    let (input, block_size) = dec_u32(input)?;
    let (input, _) = space1(input)?;
    let (input, ways) = dec_u32(input)?;
    let (input, _) = space1(input)?;
    let (input, capacity_kib) = dec_u32(input)?;
    let (input, _) = space0(input)?;
    Ok((
        input,
        RawLevel {
            label,
            block_size,
            ways,
            capacity_kib,
        },
    ))
}

fn is_skipped(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

impl HierarchyConfig {
    /// parses and validates both levels. nothing is built if either level is rejected.
    pub fn parse(src: &str) -> Result<Self> {
        let mut levels = Vec::with_capacity(NUM_LEVELS);
        for (i, line) in src.lines().enumerate().filter(|(_, l)| !is_skipped(l)) {
            let line_no = i + 1;
            if levels.len() == NUM_LEVELS {
                return Err(ConfigError::TrailingLevel { line: line_no });
            }
            let (_, raw) = all_consuming(level_line)(line).map_err(|_| ConfigError::Syntax {
                line: line_no,
                content: line.to_owned(),
            })?;
            let geometry = CacheGeometry::from_kib(raw.block_size, raw.ways, raw.capacity_kib)?;
            levels.push(LevelConfig {
                label: raw.label.to_owned(),
                geometry,
            });
        }
        let mut levels = levels.into_iter();
        match (levels.next(), levels.next()) {
            (Some(l1), Some(l2)) => Ok(Self { l1, l2 }),
            _ => Err(ConfigError::MissingLevel {
                expected: NUM_LEVELS,
            }),
        }
    }
}

impl fmt::Display for HierarchyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.l1)?;
        write!(f, "{}", self.l2)
    }
}
