//! Process-wide profiling sink.
//!
//! Samples are accumulated in atomic counters, so recording never blocks and can be done from
//! any thread. When the sink is disabled, [`record`] does nothing.
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pack,
    PackX,
    PackY,
    PackZ,
    Unpack,
    Wait,
    WaitX,
    WaitY,
    WaitZ,
    Allreduce,
    Spmv,
    Mg,
}

impl Category {
    pub const ALL: [Category; NUM_CATEGORIES] = [
        Category::Pack,
        Category::PackX,
        Category::PackY,
        Category::PackZ,
        Category::Unpack,
        Category::Wait,
        Category::WaitX,
        Category::WaitY,
        Category::WaitZ,
        Category::Allreduce,
        Category::Spmv,
        Category::Mg,
    ];

    pub fn name(&self) -> &'static str {
        use Category::*;

        match self {
            Pack => "pack",
            PackX => "pack_x",
            PackY => "pack_y",
            PackZ => "pack_z",
            Unpack => "unpack",
            Wait => "wait",
            WaitX => "wait_x",
            WaitY => "wait_y",
            WaitZ => "wait_z",
            Allreduce => "allreduce",
            Spmv => "spmv",
            Mg => "mg",
        }
    }
}

const NUM_CATEGORIES: usize = 12;

struct Sink {
    enabled: AtomicBool,
    nanos: [AtomicU64; NUM_CATEGORIES],
    counts: [AtomicU64; NUM_CATEGORIES],
}

lazy_static::lazy_static! {
    static ref SINK: Sink = Sink {
        enabled: AtomicBool::new(true),
        nanos: Default::default(),
        counts: Default::default(),
    };
}

pub fn set_enabled(enabled: bool) {
    SINK.enabled.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    SINK.enabled.load(Ordering::Relaxed)
}

/// Adds one sample of `elapsed` to `category`.
#[inline]
pub fn record(category: Category, elapsed: Duration) {
    if !is_enabled() {
        return;
    }

    let index = category as usize;
    SINK.nanos[index].fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    SINK.counts[index].fetch_add(1, Ordering::Relaxed);
}

/// Records the elapsed time under every category in `categories`.
#[inline]
pub fn record_all(categories: &[Category], elapsed: Duration) {
    for &category in categories {
        record(category, elapsed);
    }
}

/// Runs `fun` and records its wall time under `category`.
pub fn timed<F: FnOnce() -> R, R>(category: Category, fun: F) -> R {
    let before = Instant::now();
    let result = fun();
    record(category, before.elapsed());
    result
}

pub fn reset() {
    for i in 0..NUM_CATEGORIES {
        SINK.nanos[i].store(0, Ordering::Relaxed);
        SINK.counts[i].store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileEntry {
    pub category: Category,
    pub seconds: f64,
    pub samples: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub entries: Vec<ProfileEntry>,
}

impl ProfileReport {
    pub fn get(&self, category: Category) -> Option<&ProfileEntry> {
        self.entries.iter().find(|e| e.category == category)
    }
}

/// Returns the current totals of every category.
pub fn snapshot() -> ProfileReport {
    let entries = Category::ALL
        .iter()
        .map(|&category| {
            let index = category as usize;
            ProfileEntry {
                category,
                seconds: SINK.nanos[index].load(Ordering::Relaxed) as f64 * 1e-9,
                samples: SINK.counts[index].load(Ordering::Relaxed),
            }
        })
        .collect();

    ProfileReport { entries }
}
