//! Cache geometry and address decomposition.

use std::fmt;

use thiserror::Error;

use crate::bin::{self, ADDR_BITS};

pub const KIB: u32 = 1024;

/// lines are allocated up front, so one level holds at most this many.
pub const MAX_LINES: u32 = 1 << 24;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be a power of two, found {value}")]
    NotPowerOfTwo { field: &'static str, value: u32 },
    #[error("{field} must not be zero")]
    ZeroSize { field: &'static str },
    #[error("block size {block_size} exceeds capacity {capacity}")]
    BlockExceedsCapacity { block_size: u32, capacity: u32 },
    #[error("one set ({ways} ways of {block_size} bytes) exceeds capacity {capacity}")]
    SetExceedsCapacity {
        block_size: u32,
        ways: u32,
        capacity: u32,
    },
    #[error("capacity of {kib} KiB does not fit in a 32-bit byte count")]
    CapacityOverflow { kib: u32 },
    #[error("{lines} lines exceed the limit of {max} lines per level")]
    TooManyLines { lines: u32, max: u32 },
    #[error("line {line}: expected `<label> <block size> <ways> <capacity KiB>`, found `{content}`")]
    Syntax { line: usize, content: String },
    #[error("expected {expected} cache levels in config")]
    MissingLevel { expected: usize },
    #[error("line {line}: unexpected extra cache level")]
    TrailingLevel { line: usize },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// placement policy, selected by the `ways` field of the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    DirectMapped,
    SetAssociative,
    FullyAssociative,
}

impl Placement {
    pub fn from_ways(ways: u32) -> Self {
        match ways {
            0 => Placement::FullyAssociative,
            1 => Placement::DirectMapped,
            _ => Placement::SetAssociative,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::DirectMapped => write!(f, "direct-mapped"),
            Placement::SetAssociative => write!(f, "set-associative"),
            Placement::FullyAssociative => write!(f, "fully-associative"),
        }
    }
}

/// fields of one address under a given geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub tag: u32,
    pub index: u32,
    pub offset: u32,
}

/// Immutable shape of one cache level.
///
/// `ways` is the number of lines per set after resolving the placement: for a fully
/// associative cache it is the total number of lines, and there is exactly one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    block_size: u32,
    ways: u32,
    capacity: u32,
    placement: Placement,
    offset_bits: u32,
    index_bits: u32,
    tag_bits: u32,
}

fn pow2(field: &'static str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(ConfigError::ZeroSize { field });
    }
    bin::log2_exact(value).ok_or(ConfigError::NotPowerOfTwo { field, value })
}

impl CacheGeometry {
    /// `ways`: 0 = fully associative, 1 = direct mapped, otherwise set associative.
    pub fn new(block_size: u32, ways: u32, capacity: u32) -> Result<Self> {
        let offset_bits = pow2("block size", block_size)?;
        let capacity_bits = pow2("capacity", capacity)?;
        if block_size > capacity {
            return Err(ConfigError::BlockExceedsCapacity {
                block_size,
                capacity,
            });
        }
        let lines = capacity >> offset_bits;
        if lines > MAX_LINES {
            return Err(ConfigError::TooManyLines {
                lines,
                max: MAX_LINES,
            });
        }
        let placement = Placement::from_ways(ways);
        let (ways, index_bits) = match placement {
            Placement::FullyAssociative => (lines, 0),
            Placement::DirectMapped | Placement::SetAssociative => {
                let way_bits = pow2("ways", ways)?;
                if offset_bits + way_bits > capacity_bits {
                    return Err(ConfigError::SetExceedsCapacity {
                        block_size,
                        ways,
                        capacity,
                    });
                }
                (ways, capacity_bits - way_bits - offset_bits)
            }
        };
        let tag_bits = ADDR_BITS - index_bits - offset_bits;
        Ok(Self {
            block_size,
            ways,
            capacity,
            placement,
            offset_bits,
            index_bits,
            tag_bits,
        })
    }

    /// same as [`CacheGeometry::new`] with the capacity given in KiB.
    pub fn from_kib(block_size: u32, ways: u32, capacity_kib: u32) -> Result<Self> {
        let capacity = capacity_kib
            .checked_mul(KIB)
            .ok_or(ConfigError::CapacityOverflow { kib: capacity_kib })?;
        Self::new(block_size, ways, capacity)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }
    pub fn ways(&self) -> u32 {
        self.ways
    }
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
    pub fn placement(&self) -> Placement {
        self.placement
    }
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }
    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }
    pub fn tag_bits(&self) -> u32 {
        self.tag_bits
    }
    pub fn sets_count(&self) -> usize {
        1usize << self.index_bits
    }

    pub fn decode(&self, addr: u32) -> DecodedAddress {
        let index_start = self.offset_bits;
        let tag_start = self.offset_bits + self.index_bits;
        DecodedAddress {
            tag: bin::extract(addr, tag_start..ADDR_BITS),
            index: bin::extract(addr, index_start..tag_start),
            offset: bin::extract(addr, 0..index_start),
        }
    }

    /// block address for `tag` in set `index`, offset zero.
    pub fn compose(&self, tag: u32, index: u32) -> u32 {
        bin::deposit(tag, self.offset_bits + self.index_bits) | bin::deposit(index, self.offset_bits)
    }
}

impl fmt::Display for CacheGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} cache, {} bytes ({} KiB)",
            self.placement,
            self.capacity,
            self.capacity / KIB
        )?;
        writeln!(f, "  sets: {:>8}", self.sets_count())?;
        writeln!(f, "  ways: {:>8}", self.ways)?;
        writeln!(f, "  block: {:>7} bytes", self.block_size)?;
        write!(
            f,
            "  bits: tag {} / index {} / offset {}",
            self.tag_bits, self.index_bits, self.offset_bits
        )
    }
}
