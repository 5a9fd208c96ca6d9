//! Environment-tunable constants, following the `lazy_env_parse!` idiom used
//! throughout this codebase's configuration surface.

use once_cell::sync::Lazy;

/// Maximum age, in milliseconds, a buffer is allowed to sit unflushed before
/// [`crate::stream::TupleStream::periodic_flush`] forces a new block.
///
/// See spec.md §4.7.
pub static MAX_BUFFER_AGE_MS: Lazy<i64> =
	lazy_env_parse!("STREAMDB_MAX_BUFFER_AGE_MS", i64, 4000);

/// Fraction, in `[0, 1]`, of read-only ad-hoc queries forced through the
/// "large" query path, for test coverage of that path. See spec.md §6.
pub static LARGE_MODE_RATIO: Lazy<f64> =
	lazy_env_parse!("STREAMDB_LARGE_MODE_RATIO", f64, 0.0);

/// Default capacity, in bytes, of newly allocated [`crate::stream::StreamBlock`]s.
pub static DEFAULT_BLOCK_CAPACITY: Lazy<usize> =
	lazy_env_parse!("STREAMDB_DEFAULT_BLOCK_CAPACITY", usize, 2 * 1024 * 1024);

/// Maximum number of entries retained in each level of the [`crate::planner::PlanCache`].
pub static PLAN_CACHE_SIZE: Lazy<usize> =
	lazy_env_parse!("STREAMDB_PLAN_CACHE_SIZE", usize, 1000);
