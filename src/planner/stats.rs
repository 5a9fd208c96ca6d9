//! Process-wide plan-cache-use counters. See spec.md §5, §9 "lazy stats
//! singleton".

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;

use crate::planner::cache::CacheOutcome;

static GLOBAL: OnceCell<PlannerStats> = OnceCell::new();

/// Counters tracking how often `PlannerFacade::plan` served from cache,
/// missed, or failed, plus how often large-mode sampling fired.
#[derive(Debug, Default)]
pub struct PlannerStats {
	hits: AtomicU64,
	misses: AtomicU64,
	fails: AtomicU64,
	large_mode_samples: AtomicU64,
}

/// A point-in-time read of [`PlannerStats`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlannerStatsSnapshot {
	pub hits: u64,
	pub misses: u64,
	pub fails: u64,
	pub large_mode_samples: u64,
}

impl PlannerStats {
	/// Returns the process-wide instance, creating it on first call. One
	/// guarded initializer replaces the source's double-checked locking.
	pub fn global() -> &'static PlannerStats {
		GLOBAL.get_or_init(PlannerStats::default)
	}

	pub fn record_outcome(&self, outcome: CacheOutcome) {
		let counter = match outcome {
			CacheOutcome::Hit => &self.hits,
			CacheOutcome::Miss => &self.misses,
			CacheOutcome::Fail => &self.fails,
		};
		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_large_mode_sample(&self) {
		self.large_mode_samples.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> PlannerStatsSnapshot {
		PlannerStatsSnapshot {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			fails: self.fails.load(Ordering::Relaxed),
			large_mode_samples: self.large_mode_samples.load(Ordering::Relaxed),
		}
	}
}
