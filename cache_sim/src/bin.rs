use std::ops::Range;

/// number of bits in an address.
pub const ADDR_BITS: u32 = u32::BITS;

/// mask of the lowest `width` bits. `width` may be the full address width.
#[inline]
pub const fn low_mask(width: u32) -> u32 {
    if width >= ADDR_BITS {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// extracts bits `r.start..r.end` (half-open, bit 0 is LSB) and shifts them down.
#[inline]
pub const fn extract(bin: u32, r: Range<u32>) -> u32 {
    if r.start >= ADDR_BITS {
        0
    } else {
        (bin >> r.start) & low_mask(r.end - r.start)
    }
}

/// places `value` at bit `start`. bits shifted past the MSB are dropped.
#[inline]
pub const fn deposit(value: u32, start: u32) -> u32 {
    if start >= ADDR_BITS {
        0
    } else {
        value << start
    }
}

/// `log2(n)` when `n` is a power of two.
#[inline]
pub const fn log2_exact(n: u32) -> Option<u32> {
    if n.is_power_of_two() {
        Some(n.trailing_zeros())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_mask() {
        assert_eq!(0, low_mask(0));
        assert_eq!(0b11111, low_mask(5));
        assert_eq!(u32::MAX, low_mask(32));
    }
    #[test]
    fn test_extract() {
        assert_eq!(0b1, extract(0b100000, 5..6));
        assert_eq!(0xAB, extract(0x00AB_0000, 16..24));
        assert_eq!(0, extract(0xFFFF_FFFF, 3..3));
        // whole word as tag
        assert_eq!(0xDEAD_BEEF, extract(0xDEAD_BEEF, 0..32));
        assert_eq!(0, extract(0xDEAD_BEEF, 32..32));
    }
    #[test]
    fn test_deposit_roundtrip() {
        let addr = 0x1234_5678u32;
        let tag = extract(addr, 13..32);
        let index = extract(addr, 5..13);
        let rebuilt = deposit(tag, 13) | deposit(index, 5);
        assert_eq!(addr & !low_mask(5), rebuilt, "rebuilt: {rebuilt:#010x}");
        assert_eq!(0, deposit(0xFFFF, 32));
    }
    #[test]
    fn test_log2_exact() {
        assert_eq!(Some(0), log2_exact(1));
        assert_eq!(Some(13), log2_exact(8192));
        assert_eq!(None, log2_exact(0));
        assert_eq!(None, log2_exact(96));
    }
}
