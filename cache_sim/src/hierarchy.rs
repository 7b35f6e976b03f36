use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    geometry::CacheGeometry,
    level::{Cache, CacheLevel},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// Result of one access at one level. The discriminant is the output encoding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessState {
    #[default]
    NoAction = 0,
    ReadHit = 1,
    ReadMiss = 2,
    WriteHit = 3,
    WriteMiss = 4,
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "R"),
            AccessKind::Write => write!(f, "W"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessOutcome {
    pub l1: AccessState,
    pub l2: AccessState,
    /// block address of a dirty L1 victim pushed into L2.
    pub write_back: Option<u32>,
}

/// Two-level cache hierarchy. Each access is fully resolved before the next.
pub struct HierarchyController {
    l1: Cache,
    l2: Cache,
    #[cfg(feature = "stat")]
    l1_stat: stat::LevelStat,
    #[cfg(feature = "stat")]
    l2_stat: stat::LevelStat,
}

impl HierarchyController {
    pub fn new(l1: CacheGeometry, l2: CacheGeometry) -> Self {
        log::info!(
            "L1: {}, {} sets x {} ways, tag/index/offset = {}/{}/{}",
            l1.placement(),
            l1.sets_count(),
            l1.ways(),
            l1.tag_bits(),
            l1.index_bits(),
            l1.offset_bits()
        );
        log::info!(
            "L2: {}, {} sets x {} ways, tag/index/offset = {}/{}/{}",
            l2.placement(),
            l2.sets_count(),
            l2.ways(),
            l2.tag_bits(),
            l2.index_bits(),
            l2.offset_bits()
        );
        Self {
            l1: Cache::new(l1),
            l2: Cache::new(l2),
            #[cfg(feature = "stat")]
            l1_stat: Default::default(),
            #[cfg(feature = "stat")]
            l2_stat: Default::default(),
        }
    }

    pub fn l1(&self) -> &Cache {
        &self.l1
    }
    pub fn l2(&self) -> &Cache {
        &self.l2
    }

    pub fn access(&mut self, kind: AccessKind, addr: u32) -> AccessOutcome {
        let outcome = match kind {
            AccessKind::Read => self.read(addr),
            AccessKind::Write => self.write(addr),
        };
        log::trace!(
            "{kind} {addr:#010x}: L1 {:?} L2 {:?}",
            outcome.l1,
            outcome.l2
        );
        #[cfg(feature = "stat")]
        {
            self.l1_stat.record(outcome.l1);
            self.l2_stat.record(outcome.l2);
            if outcome.write_back.is_some() {
                self.l2_stat.write_backs += 1;
            }
        }
        outcome
    }

    fn read(&mut self, addr: u32) -> AccessOutcome {
        let mut outcome = AccessOutcome::default();
        if self.l1.probe_read(addr) {
            outcome.l1 = AccessState::ReadHit;
            return outcome;
        }
        outcome.l1 = AccessState::ReadMiss;
        if self.l2.probe_read(addr) {
            outcome.l2 = AccessState::ReadHit;
        } else {
            outcome.l2 = AccessState::ReadMiss;
            self.l2.fill(addr);
            #[cfg(feature = "stat")]
            {
                self.l2_stat.fills += 1;
            }
        }
        if self.l1.is_resident_dirty(addr) {
            let victim = self.l1.evicted_address(addr);
            log::debug!("write back dirty L1 block {victim:#010x} to L2");
            self.l2.fill(victim);
            outcome.write_back = Some(victim);
            #[cfg(feature = "stat")]
            {
                self.l2_stat.fills += 1;
            }
        }
        self.l1.fill(addr);
        #[cfg(feature = "stat")]
        {
            self.l1_stat.fills += 1;
        }
        outcome
    }

    /// write misses are reported but never allocate at either level.
    fn write(&mut self, addr: u32) -> AccessOutcome {
        let mut outcome = AccessOutcome::default();
        if self.l1.probe_write(addr) {
            outcome.l1 = AccessState::WriteHit;
            return outcome;
        }
        outcome.l1 = AccessState::WriteMiss;
        outcome.l2 = if self.l2.probe_write(addr) {
            AccessState::WriteHit
        } else {
            AccessState::WriteMiss
        };
        outcome
    }
}

#[cfg(feature = "stat")]
impl AddStats for HierarchyController {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.l1_stat.named("L1 cache stat")));
        buf.push(Box::new(self.l2_stat.named("L2 cache stat")));
    }
}

#[cfg(feature = "stat")]
impl HierarchyController {
    pub fn level_stats(&self) -> (stat::LevelStat, stat::LevelStat) {
        (self.l1_stat, self.l2_stat)
    }
}

#[cfg(feature = "stat")]
pub mod stat {
    use std::fmt;

    use serde::Serialize;

    use super::AccessState;
    use crate::stat::*;

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct LevelStat {
        pub read_hits: usize,
        pub read_misses: usize,
        pub write_hits: usize,
        pub write_misses: usize,
        pub fills: usize,
        /// dirty victims received from the level above.
        pub write_backs: usize,
    }

    impl LevelStat {
        pub fn record(&mut self, state: AccessState) {
            match state {
                AccessState::NoAction => (),
                AccessState::ReadHit => self.read_hits += 1,
                AccessState::ReadMiss => self.read_misses += 1,
                AccessState::WriteHit => self.write_hits += 1,
                AccessState::WriteMiss => self.write_misses += 1,
            }
        }
        pub fn accesses(&self) -> usize {
            self.read_hits + self.read_misses + self.write_hits + self.write_misses
        }
        pub fn hits(&self) -> usize {
            self.read_hits + self.write_hits
        }
        pub fn named(self, header: &'static str) -> NamedLevelStat {
            NamedLevelStat { header, stat: self }
        }
    }

    pub struct NamedLevelStat {
        header: &'static str,
        stat: LevelStat,
    }

    impl Stat for NamedLevelStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ NamedLevelStat {
        fn header(&self) -> &'static str {
            self.header
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for &'_ NamedLevelStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = &self.stat;
            let total = s.accesses();
            let pct = |n: usize| {
                if total == 0 {
                    format!("{:.6}", 0.)
                } else {
                    format!("{:.6}", 100. * n as f64 / total as f64)
                }
            };
            macro_rules! output {
                ($field:ident => $name:literal) => {{
                    let n = s.$field;
                    writeln!(f, "  {:>12}: {n:>10} ({:>10}%)", $name, pct(n))
                }};
            }
            output!(read_hits => "read hit")?;
            output!(read_misses => "read miss")?;
            output!(write_hits => "write hit")?;
            output!(write_misses => "write miss")?;
            writeln!(f, "  {:>12}: {:>10} ({:>10}%)", "hit", s.hits(), pct(s.hits()))?;
            writeln!(f, "  {:>12}: {:>10}", "fills", s.fills)?;
            write!(f, "  {:>12}: {:>10}", "write backs", s.write_backs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccessKind::*;
    use AccessState::*;

    fn controller() -> HierarchyController {
        HierarchyController::new(
            CacheGeometry::from_kib(32, 1, 8).unwrap(),
            CacheGeometry::from_kib(32, 4, 64).unwrap(),
        )
    }

    fn states(h: &mut HierarchyController, kind: AccessKind, addr: u32) -> (AccessState, AccessState) {
        let o = h.access(kind, addr);
        (o.l1, o.l2)
    }

    #[test]
    fn test_encoding() {
        let codes: Vec<u8> = [NoAction, ReadHit, ReadMiss, WriteHit, WriteMiss]
            .into_iter()
            .map(u8::from)
            .collect();
        assert_eq!(vec![0, 1, 2, 3, 4], codes);
        assert_eq!(WriteHit, AccessState::try_from(3u8).unwrap());
        assert!(AccessState::try_from(5u8).is_err());
        assert_eq!("4", WriteMiss.to_string());
    }

    #[test]
    fn test_read_miss_fills_both() {
        let mut h = controller();
        assert_eq!((ReadMiss, ReadMiss), states(&mut h, Read, 0x1000));
        assert!(h.l1().probe_read(0x1000));
        assert!(h.l2().probe_read(0x1000));
        assert_eq!((ReadHit, NoAction), states(&mut h, Read, 0x1010));
    }

    #[test]
    fn test_l1_hit_skips_l2() {
        // L2 has a single line, so it loses 0x40 while L1 keeps it
        let mut h = HierarchyController::new(
            CacheGeometry::from_kib(32, 1, 8).unwrap(),
            CacheGeometry::new(32, 0, 32).unwrap(),
        );
        h.access(Read, 0x40);
        h.access(Read, 0x80);
        assert!(!h.l2().probe_read(0x40));
        assert_eq!((ReadHit, NoAction), states(&mut h, Read, 0x40));
        assert_eq!((WriteHit, NoAction), states(&mut h, Write, 0x40));
    }

    #[test]
    fn test_l2_hit_after_l1_conflict() {
        let mut h = controller();
        h.access(Read, 0x0000_0000);
        // same L1 index, different L2 set
        h.access(Read, 0x0000_2000);
        assert_eq!((ReadMiss, ReadHit), states(&mut h, Read, 0x0000_0000));
    }

    #[test]
    fn test_write_miss_no_allocate() {
        let mut h = controller();
        assert_eq!((WriteMiss, WriteMiss), states(&mut h, Write, 0x20));
        assert!(!h.l1().probe_read(0x20));
        assert!(!h.l2().probe_read(0x20));
        assert_eq!((ReadMiss, ReadMiss), states(&mut h, Read, 0x20));
    }

    #[test]
    fn test_write_hit_in_l2_only() {
        let mut h = controller();
        h.access(Read, 0x0000_0000);
        h.access(Read, 0x0000_2000);
        // 0x0 was evicted from L1 but is still in L2
        assert_eq!((WriteMiss, WriteHit), states(&mut h, Write, 0x0000_0000));
        assert!(!h.l1().probe_read(0x0000_0000));
    }

    #[test]
    fn test_dirty_victim_written_back() {
        // L1 direct mapped 8 KiB, L2 fully associative with 2 lines
        let mut h = HierarchyController::new(
            CacheGeometry::from_kib(32, 1, 8).unwrap(),
            CacheGeometry::new(32, 0, 64).unwrap(),
        );
        h.access(Read, 0x0000_0000);
        assert_eq!((WriteHit, NoAction), states(&mut h, Write, 0x0000_0004));
        assert!(h.l1().is_resident_dirty(0x0000_2000));
        let o = h.access(Read, 0x0000_2000);
        assert_eq!((ReadMiss, ReadMiss), (o.l1, o.l2));
        assert_eq!(Some(0x0000_0000), o.write_back);
        // L2 now holds the new block and the written-back victim
        assert!(h.l2().probe_read(0x0000_2000));
        assert!(h.l2().probe_read(0x0000_0000));
        assert!(!h.l1().is_resident_dirty(0x0000_2000));
        assert!(h.l1().probe_read(0x0000_2000));
    }

    #[test]
    fn test_clean_victim_not_written_back() {
        let mut h = controller();
        h.access(Read, 0x0000_0000);
        let o = h.access(Read, 0x0000_2000);
        assert_eq!(None, o.write_back);
    }

    #[cfg(feature = "stat")]
    #[test]
    fn test_level_stats() {
        let mut h = controller();
        h.access(Read, 0x0);
        h.access(Read, 0x0);
        h.access(Write, 0x0);
        h.access(Write, 0x20);
        let (l1, l2) = h.level_stats();
        assert_eq!((1, 1, 1, 1), (l1.read_hits, l1.read_misses, l1.write_hits, l1.write_misses));
        assert_eq!(1, l1.fills);
        assert_eq!((0, 1, 0, 1), (l2.read_hits, l2.read_misses, l2.write_hits, l2.write_misses));
        assert_eq!(2, l2.accesses());
        assert_eq!(2, l1.hits());
    }
}
