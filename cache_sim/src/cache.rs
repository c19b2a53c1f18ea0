use std::{fmt, mem};

use serde::Serialize;
use thiserror::Error;

use crate::config::{Geometry, MAX_ADDRESS_BITS};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid geometry {geometry}: E must be positive and s + b at most {max}", max = MAX_ADDRESS_BITS)]
    InvalidGeometry { geometry: Geometry },
    #[error("cannot allocate 2^{set_bits} sets of {associativity} lines")]
    Allocation { set_bits: u32, associativity: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheLine {
    valid: bool,
    tag: u64,
    /// logical time of the last access, only compared against other lines
    last_used: u64,
}

impl CacheLine {
    pub fn is_valid(&self) -> bool {
        self.valid
    }
    pub fn tag(&self) -> u64 {
        self.tag
    }
    pub fn last_used(&self) -> u64 {
        self.last_used
    }
    fn fill(&mut self, tag: u64, now: u64) {
        self.valid = true;
        self.tag = tag;
        self.last_used = now;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessResult {
    Hit,
    /// filled a line that was still invalid
    Miss,
    /// set was full, the least recently used line was replaced
    MissEviction,
}

impl AccessResult {
    pub fn is_eviction(self) -> bool {
        matches!(self, Self::MissEviction)
    }
}

impl fmt::Display for AccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessResult::Hit => write!(f, "hit"),
            AccessResult::Miss => write!(f, "miss"),
            AccessResult::MissEviction => write!(f, "miss eviction"),
        }
    }
}

#[derive(Debug)]
pub struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    fn new(associativity: usize) -> Option<Self> {
        let mut lines = Vec::new();
        lines.try_reserve_exact(associativity).ok()?;
        lines.resize(associativity, CacheLine::default());
        Some(Self { lines })
    }

    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    /// one scan decides between hit and the first invalid line.
    fn access(&mut self, tag: u64, now: u64) -> (AccessResult, Option<u64>) {
        let mut free = None;
        for (index, line) in self.lines.iter_mut().enumerate() {
            if line.valid {
                if line.tag == tag {
                    line.last_used = now;
                    return (AccessResult::Hit, None);
                }
            } else if free.is_none() {
                free = Some(index);
            }
        }
        if let Some(index) = free {
            self.lines[index].fill(tag, now);
            return (AccessResult::Miss, None);
        }
        let victim = self.lru_index();
        let evicted = self.lines[victim].tag;
        self.lines[victim].fill(tag, now);
        (AccessResult::MissEviction, Some(evicted))
    }

    /// index of the line with the smallest `last_used`; the lowest index wins ties.
    fn lru_index(&self) -> usize {
        self.lines
            .iter()
            .enumerate()
            .min_by_key(|(_, line)| line.last_used)
            .map_or(0, |(index, _)| index)
    }
}

/// final counters of a simulation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl Summary {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} evictions:{}",
            self.hits, self.misses, self.evictions
        )
    }
}

/// set-associative cache with LRU replacement.
#[derive(Debug)]
pub struct Cache {
    sets: Vec<CacheSet>,
    geometry: Geometry,
    hits: u64,
    misses: u64,
    evictions: u64,
    timestamp: u64,
}

impl Cache {
    pub fn new(geometry: Geometry) -> Result<Self, CacheError> {
        if geometry.associativity == 0 || !geometry.fits_address() {
            return Err(CacheError::InvalidGeometry { geometry });
        }
        let alloc_err = || CacheError::Allocation {
            set_bits: geometry.set_bits,
            associativity: geometry.associativity,
        };
        let num_sets = geometry.num_sets().ok_or_else(alloc_err)?;
        let total_bytes = num_sets
            .checked_mul(geometry.associativity)
            .and_then(|lines| lines.checked_mul(mem::size_of::<CacheLine>()))
            .ok_or_else(alloc_err)?;
        if total_bytes > isize::MAX as usize {
            return Err(alloc_err());
        }
        let mut sets = Vec::new();
        sets.try_reserve_exact(num_sets).map_err(|_| alloc_err())?;
        for _ in 0..num_sets {
            sets.push(CacheSet::new(geometry.associativity).ok_or_else(alloc_err)?);
        }
        log::info!(
            "cache {geometry}: {num_sets} sets x {} lines ({} bytes of data)",
            geometry.associativity,
            geometry.capacity_bytes().unwrap_or(u64::MAX)
        );
        Ok(Self {
            sets,
            geometry,
            hits: 0,
            misses: 0,
            evictions: 0,
            timestamp: 0,
        })
    }

    pub fn access(&mut self, addr: u64) -> AccessResult {
        self.timestamp += 1;
        let (set_index, tag) = self.geometry.decompose(addr);
        let (result, evicted) = self.sets[set_index].access(tag, self.timestamp);
        match result {
            AccessResult::Hit => self.hits += 1,
            AccessResult::Miss => self.misses += 1,
            AccessResult::MissEviction => {
                self.misses += 1;
                self.evictions += 1;
            }
        }
        if let Some(evicted) = evicted {
            log::trace!("set {set_index}: tag {evicted:#x} evicted by {tag:#x}");
        }
        result
    }

    pub fn summary(&self) -> Summary {
        Summary {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn sets(&self) -> &[CacheSet] {
        &self.sets
    }

    /// number of accesses performed so far.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}
