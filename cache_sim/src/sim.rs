use std::fmt;

use anyhow::Result;
use thiserror::Error;

use crate::{
    cache::{AccessResult, Cache, CacheError, Summary},
    config::{ConfigError, Geometry},
    trace::{Op, TraceError, TraceRecord},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

impl SimError {
    /// process exit status reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SimError::Config(_) | SimError::Cache(CacheError::InvalidGeometry { .. }) => 2,
            SimError::Cache(CacheError::Allocation { .. }) => 3,
            SimError::Trace(TraceError::Unavailable(_)) => 4,
            SimError::Trace(TraceError::Malformed { .. }) => 5,
        }
    }
}

/// cache accesses caused by a single trace record, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordOutcome {
    results: [AccessResult; 2],
    len: usize,
}

impl RecordOutcome {
    fn skipped() -> Self {
        Self {
            results: [AccessResult::Hit; 2],
            len: 0,
        }
    }
    fn push(&mut self, result: AccessResult) {
        self.results[self.len] = result;
        self.len += 1;
    }
    pub fn results(&self) -> &[AccessResult] {
        &self.results[..self.len]
    }
    pub fn is_skipped(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for r in self.results() {
            write!(f, "{sep}{r}")?;
            sep = " ";
        }
        Ok(())
    }
}

/// replays trace records against a cache.
pub struct Simulator {
    cache: Cache,
    #[cfg(feature = "stat")]
    stat_builder: stat::SimStatBuilder,
}

impl Simulator {
    pub fn new(geometry: Geometry) -> Result<Self, CacheError> {
        Ok(Self {
            cache: Cache::new(geometry)?,
            #[cfg(feature = "stat")]
            stat_builder: stat::SimStatBuilder::new(),
        })
    }

    /// feeds one record to the cache. `M` is a load followed by a store to the same address.
    pub fn step(&mut self, record: &TraceRecord) -> RecordOutcome {
        let mut outcome = RecordOutcome::skipped();
        match record.op {
            Op::Load | Op::Store | Op::Modify => {
                for _ in 0..record.op.access_count() {
                    let result = self.cache.access(record.addr);
                    self.note_access(record.addr, result);
                    outcome.push(result);
                }
            }
            Op::Other(c) => {
                log::debug!("skipping record with operation `{}`", c as char);
            }
        }
        self.note_record(&outcome);
        log::debug!("{record} {outcome}");
        outcome
    }

    pub fn run<I>(&mut self, records: I) -> Summary
    where
        I: IntoIterator<Item = TraceRecord>,
    {
        for record in records {
            self.step(&record);
        }
        self.finish()
    }

    /// like [`Simulator::run`], calling `on_record` after every record. stops at the first error of `on_record`.
    pub fn run_with<I, F>(&mut self, records: I, mut on_record: F) -> Result<Summary>
    where
        I: IntoIterator<Item = TraceRecord>,
        F: FnMut(&TraceRecord, &RecordOutcome) -> Result<()>,
    {
        for record in records {
            let outcome = self.step(&record);
            on_record(&record, &outcome)?;
        }
        Ok(self.finish())
    }

    fn finish(&mut self) -> Summary {
        #[cfg(feature = "stat")]
        self.stat_builder.stop_timer();
        let summary = self.summary();
        log::info!("finished simulation. {summary}");
        summary
    }

    pub fn summary(&self) -> Summary {
        self.cache.summary()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    cfg_if::cfg_if! {
        if #[cfg(feature = "stat")] {
            fn note_access(&mut self, addr: u64, result: AccessResult) {
                let (set_index, _) = self.cache.geometry().decompose(addr);
                self.stat_builder.access(set_index, result);
            }
            fn note_record(&mut self, outcome: &RecordOutcome) {
                self.stat_builder.record(outcome.is_skipped());
            }
        } else {
            fn note_access(&mut self, _: u64, _: AccessResult) {}
            fn note_record(&mut self, _: &RecordOutcome) {}
        }
    }
}

#[cfg(feature = "stat")]
impl Simulator {
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

#[cfg(feature = "stat")]
impl AddStats for Simulator {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.stat_builder.finish()));
        buf.push(Box::new(stat::CacheStat::new(self.summary())));
        buf.push(Box::new(self.stat_builder.set_stat()));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::{collections::BTreeMap, time};

    use super::*;
    use crate::stat::*;

    pub struct SimStatBuilder {
        begin: time::Instant,
        records: u64,
        skipped: u64,
        elapsed: Option<time::Duration>,
        sets: BTreeMap<usize, SetCounts>,
    }

    impl SimStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: time::Instant::now(),
                records: 0,
                skipped: 0,
                elapsed: None,
                sets: BTreeMap::new(),
            }
        }
        pub fn record(&mut self, skipped: bool) {
            self.records += 1;
            if skipped {
                self.skipped += 1;
            }
        }
        pub fn access(&mut self, set_index: usize, result: AccessResult) {
            self.sets.entry(set_index).or_default().update_stat(result);
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = Some(time::Instant::now() - self.begin)
        }
        pub fn finish(&self) -> SimStat {
            SimStat {
                records: self.records,
                skipped: self.skipped,
                elapsed: self.elapsed.unwrap_or_else(|| self.begin.elapsed()),
            }
        }
        pub fn set_stat(&self) -> SetStat {
            SetStat {
                sets: self.sets.clone(),
            }
        }
    }

    impl Default for SimStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct SimStat {
        records: u64,
        skipped: u64,
        elapsed: time::Duration,
    }

    impl Stat for SimStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ SimStat {
        fn header(&self) -> &'static str {
            "simulator stat"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for &'_ SimStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let ms = format!("{} ms", self.elapsed.as_millis());
            writeln!(f, "  elapsed total: {ms:>9}")?;
            let records = format!("#{}", self.records);
            writeln!(f, "  records total: {records:>9}")?;
            let skipped = format!("#{}", self.skipped);
            writeln!(f, "        skipped: {skipped:>9}")
        }
    }

    pub struct CacheStat {
        summary: Summary,
    }

    impl CacheStat {
        pub fn new(summary: Summary) -> Self {
            Self { summary }
        }
    }

    impl Stat for CacheStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(CacheStatView::new(self))
        }
    }

    pub struct CacheStatView<'a> {
        stat: &'a CacheStat,
    }

    impl<'a> CacheStatView<'a> {
        pub fn new(stat: &'a CacheStat) -> Self {
            Self { stat }
        }
    }

    impl StatView for CacheStatView<'_> {
        fn header(&self) -> &'static str {
            "cache stat"
        }
        fn width(&self) -> usize {
            36
        }
    }

    impl fmt::Display for CacheStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let Summary {
                hits,
                misses,
                evictions,
            } = self.stat.summary;
            let total = hits + misses;
            let hit_pct = format!("{:.6}", percent(hits, total));
            let miss_pct = format!("{:.6}", percent(misses, total));
            let evict_pct = format!("{:.6}", percent(evictions, total));
            writeln!(f, "        hit: {hits:>10} ({hit_pct:>10}%)")?;
            writeln!(f, "       miss: {misses:>10} ({miss_pct:>10}%)")?;
            writeln!(f, "   eviction: {evictions:>10} ({evict_pct:>10}%)")
        }
    }

    #[derive(Clone, Copy, Default)]
    pub struct SetCounts {
        hit_count: u64,
        miss_count: u64,
        eviction_count: u64,
    }

    impl SetCounts {
        pub fn update_stat(&mut self, result: AccessResult) {
            match result {
                AccessResult::Hit => self.hit_count += 1,
                AccessResult::Miss => self.miss_count += 1,
                AccessResult::MissEviction => {
                    self.miss_count += 1;
                    self.eviction_count += 1;
                }
            }
        }
    }

    /// per-set counters of the sets that were accessed at least once.
    pub struct SetStat {
        sets: BTreeMap<usize, SetCounts>,
    }

    impl Stat for SetStat {
        fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
            Box::new(SetStatView::new(self, max_width))
        }
    }

    pub struct SetStatView<'a> {
        stat: &'a SetStat,
        chunk_size: usize,
    }

    impl<'a> SetStatView<'a> {
        pub fn new(stat: &'a SetStat, max_width: usize) -> Self {
            Self {
                stat,
                chunk_size: Self::chunk_size(max_width),
            }
        }
    }

    impl StatView for SetStatView<'_> {
        fn header(&self) -> &'static str {
            "per set hit/miss/eviction"
        }
        fn width(&self) -> usize {
            Self::width_by_chunk_size(self.chunk_size)
        }
    }

    impl<'a> Width for SetStatView<'a> {
        fn width_by_chunk_size(chunk_size: usize) -> usize {
            chunk_size * 32 + (chunk_size - 1) * 2 + 2
        }
    }

    impl fmt::Display for SetStatView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let map: Vec<_> = self
                .stat
                .sets
                .iter()
                .map(|(index, c)| {
                    let counts = format!("{}/{}/{}", c.hit_count, c.miss_count, c.eviction_count);
                    format!("{index:>8}: {counts:>22}")
                })
                .collect();
            for chunk in map.chunks(self.chunk_size) {
                let s = chunk.join(", ");
                writeln!(f, "  {s}")?;
            }
            Ok(())
        }
    }
}
