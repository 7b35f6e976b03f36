//! One level of the hierarchy, in three placement flavours.

use crate::{
    geometry::{CacheGeometry, Placement},
    set::CacheSet,
};

/// Operations the hierarchy controller needs from a cache level.
///
/// `is_resident_dirty`, `evicted_address` and `fill` all refer to the victim slot of the set
/// `addr` maps to, not to the line holding `addr`'s tag.
pub trait CacheLevel {
    fn geometry(&self) -> &CacheGeometry;
    /// hit iff a valid line in the selected set holds the tag. never mutates.
    fn probe_read(&self, addr: u32) -> bool;
    /// same match as `probe_read`; a hit marks the line dirty.
    fn probe_write(&mut self, addr: u32) -> bool;
    fn is_resident_dirty(&self, addr: u32) -> bool;
    /// installs a clean valid line at the victim slot and advances the victim cursor.
    fn fill(&mut self, addr: u32);
    /// block address of the line currently in the victim slot.
    fn evicted_address(&self, addr: u32) -> u32;
    fn set(&self, index: usize) -> Option<&CacheSet>;
}

pub struct DirectMapped {
    geometry: CacheGeometry,
    sets: Vec<CacheSet>,
}

impl DirectMapped {
    pub fn new(geometry: CacheGeometry) -> Self {
        Self {
            sets: vec![CacheSet::new(1); geometry.sets_count()],
            geometry,
        }
    }
}

impl CacheLevel for DirectMapped {
    fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }
    fn probe_read(&self, addr: u32) -> bool {
        let d = self.geometry.decode(addr);
        let line = self.sets[d.index as usize].victim();
        line.valid && line.tag == d.tag
    }
    fn probe_write(&mut self, addr: u32) -> bool {
        let hit = self.probe_read(addr);
        if hit {
            let d = self.geometry.decode(addr);
            self.sets[d.index as usize].mark_dirty(0);
        }
        hit
    }
    fn is_resident_dirty(&self, addr: u32) -> bool {
        let d = self.geometry.decode(addr);
        self.sets[d.index as usize].victim().dirty
    }
    fn fill(&mut self, addr: u32) {
        let d = self.geometry.decode(addr);
        self.sets[d.index as usize].fill(d.tag);
    }
    fn evicted_address(&self, addr: u32) -> u32 {
        let d = self.geometry.decode(addr);
        let line = self.sets[d.index as usize].victim();
        self.geometry.compose(line.tag, d.index)
    }
    fn set(&self, index: usize) -> Option<&CacheSet> {
        self.sets.get(index)
    }
}

pub struct SetAssociative {
    geometry: CacheGeometry,
    sets: Vec<CacheSet>,
}

impl SetAssociative {
    pub fn new(geometry: CacheGeometry) -> Self {
        Self {
            sets: vec![CacheSet::new(geometry.ways() as usize); geometry.sets_count()],
            geometry,
        }
    }
}

impl CacheLevel for SetAssociative {
    fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }
    fn probe_read(&self, addr: u32) -> bool {
        let d = self.geometry.decode(addr);
        self.sets[d.index as usize].find(d.tag).is_some()
    }
    fn probe_write(&mut self, addr: u32) -> bool {
        let d = self.geometry.decode(addr);
        let set = &mut self.sets[d.index as usize];
        match set.find(d.tag) {
            Some(way) => {
                set.mark_dirty(way);
                true
            }
            None => false,
        }
    }
    fn is_resident_dirty(&self, addr: u32) -> bool {
        let d = self.geometry.decode(addr);
        self.sets[d.index as usize].victim().dirty
    }
    fn fill(&mut self, addr: u32) {
        let d = self.geometry.decode(addr);
        self.sets[d.index as usize].fill(d.tag);
    }
    fn evicted_address(&self, addr: u32) -> u32 {
        let d = self.geometry.decode(addr);
        let victim = self.sets[d.index as usize].victim();
        self.geometry.compose(victim.tag, d.index)
    }
    fn set(&self, index: usize) -> Option<&CacheSet> {
        self.sets.get(index)
    }
}

/// a single set spanning the whole cache; the index field is empty.
pub struct FullyAssociative {
    geometry: CacheGeometry,
    lines: CacheSet,
}

impl FullyAssociative {
    pub fn new(geometry: CacheGeometry) -> Self {
        Self {
            lines: CacheSet::new(geometry.ways() as usize),
            geometry,
        }
    }
    fn tag(&self, addr: u32) -> u32 {
        self.geometry.decode(addr).tag
    }
}

impl CacheLevel for FullyAssociative {
    fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }
    fn probe_read(&self, addr: u32) -> bool {
        self.lines.find(self.tag(addr)).is_some()
    }
    fn probe_write(&mut self, addr: u32) -> bool {
        match self.lines.find(self.tag(addr)) {
            Some(way) => {
                self.lines.mark_dirty(way);
                true
            }
            None => false,
        }
    }
    fn is_resident_dirty(&self, _: u32) -> bool {
        self.lines.victim().dirty
    }
    fn fill(&mut self, addr: u32) {
        let tag = self.tag(addr);
        self.lines.fill(tag);
    }
    fn evicted_address(&self, _: u32) -> u32 {
        self.geometry.compose(self.lines.victim().tag, 0)
    }
    fn set(&self, index: usize) -> Option<&CacheSet> {
        (index == 0).then_some(&self.lines)
    }
}

/// Closed set of level implementations, chosen from the geometry's placement.
pub enum Cache {
    DirectMapped(DirectMapped),
    SetAssociative(SetAssociative),
    FullyAssociative(FullyAssociative),
}

impl Cache {
    pub fn new(geometry: CacheGeometry) -> Self {
        match geometry.placement() {
            Placement::DirectMapped => Cache::DirectMapped(DirectMapped::new(geometry)),
            Placement::SetAssociative => Cache::SetAssociative(SetAssociative::new(geometry)),
            Placement::FullyAssociative => Cache::FullyAssociative(FullyAssociative::new(geometry)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident.$method:ident($($arg:expr),*)) => {
        match $self {
            Cache::DirectMapped(c) => c.$method($($arg),*),
            Cache::SetAssociative(c) => c.$method($($arg),*),
            Cache::FullyAssociative(c) => c.$method($($arg),*),
        }
    };
}

impl CacheLevel for Cache {
    fn geometry(&self) -> &CacheGeometry {
        dispatch!(self.geometry())
    }
    fn probe_read(&self, addr: u32) -> bool {
        dispatch!(self.probe_read(addr))
    }
    fn probe_write(&mut self, addr: u32) -> bool {
        dispatch!(self.probe_write(addr))
    }
    fn is_resident_dirty(&self, addr: u32) -> bool {
        dispatch!(self.is_resident_dirty(addr))
    }
    fn fill(&mut self, addr: u32) {
        dispatch!(self.fill(addr))
    }
    fn evicted_address(&self, addr: u32) -> u32 {
        dispatch!(self.evicted_address(addr))
    }
    fn set(&self, index: usize) -> Option<&CacheSet> {
        dispatch!(self.set(index))
    }
}
