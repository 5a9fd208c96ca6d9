//! `PlannerFacade`: spec.md §4.10.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;

use crate::err::{Error, Result};
use crate::planner::cache::{
	AdHocPlannedStatement, AdmissionDecision, BoundPlan, CacheOutcome, CompiledPlan, PlanCache,
};
use crate::planner::stats::PlannerStats;
use crate::stream::ColumnValue;

const TARGET: &str = "streamdb::planner::facade";

/// Whether the caller already knows which partition a statement targets, or
/// the planner must infer it. Forced partitioning disqualifies caching
/// (spec.md §3, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partitioning {
	Inferred,
	Forced,
}

/// The out-of-scope SQL parser/optimizer collaborator (spec.md §1).
#[async_trait]
pub trait Planner: Send + Sync {
	async fn plan(&self, sql: &str) -> Result<CompiledPlan>;
}

/// Serializes planning calls, consults the cache, and invokes the external
/// [`Planner`]. See spec.md §2, §4.10, §5.
pub struct PlannerFacade {
	planner: Box<dyn Planner>,
	serialize: Mutex<()>,
	cache: PlanCache,
	catalog_hash: u64,
	stats: &'static PlannerStats,
}

impl PlannerFacade {
	pub fn new(planner: Box<dyn Planner>, catalog_hash: u64) -> Self {
		Self {
			planner,
			serialize: Mutex::new(()),
			cache: PlanCache::new(),
			catalog_hash,
			stats: PlannerStats::global(),
		}
	}

	pub fn cache(&self) -> &PlanCache {
		&self.cache
	}

	pub fn stats(&self) -> &'static PlannerStats {
		self.stats
	}

	/// `swap_tables` is accepted and forwarded to nothing: the observed
	/// behavior never wires it to any effect, mirroring the documented
	/// no-op `sync` flag on `TupleStream::commit` (spec.md §9).
	#[allow(clippy::too_many_arguments)]
	pub async fn plan(
		&self,
		sql: &str,
		partitioning: Partitioning,
		explain: bool,
		user_params: &[ColumnValue],
		_swap_tables: bool,
		mut large: bool,
	) -> Result<(AdHocPlannedStatement, CacheOutcome)> {
		let ratio = *crate::cnf::LARGE_MODE_RATIO;
		if ratio > 0.0 && !large && rand::thread_rng().gen_bool(ratio.clamp(0.0, 1.0)) {
			large = true;
			self.stats.record_large_mode_sample();
			trace!(target: TARGET, sql, "large-mode sampling forced this query");
		}

		let sql = sql.trim();
		if sql.is_empty() {
			return Err(Error::Planning("cannot plan an empty statement".to_string()));
		}

		let cacheable_shape = partitioning == Partitioning::Inferred && !large;

		if cacheable_shape {
			if let Some(stmt) = self.cache.get_with_sql(sql) {
				self.stats.record_outcome(CacheOutcome::Hit);
				trace!(target: TARGET, sql, "literal cache hit");
				return Ok((stmt, CacheOutcome::Hit));
			}
		}

		let compiled = {
			let _guard = self.serialize.lock().await;
			self.planner.plan(sql).await
		};
		let compiled = match compiled {
			Ok(c) => c,
			Err(e) => {
				self.stats.record_outcome(CacheOutcome::Fail);
				return Err(e);
			}
		};

		let wrong_param_count = compiled.placeholder_count != user_params.len();
		if wrong_param_count && !explain {
			self.stats.record_outcome(CacheOutcome::Fail);
			return Err(Error::Planning(format!(
				"parameter count mismatch: statement expects {}, caller supplied {}",
				compiled.placeholder_count,
				user_params.len()
			)));
		}

		let decision = AdmissionDecision {
			wrong_param_count,
			forced_partitioning: partitioning == Partitioning::Forced,
			large,
		};

		if cacheable_shape && !wrong_param_count {
			if let Some(variants) = self.cache.get_with_parsed_token(&compiled.parsed_token) {
				let candidate_literals: &[ColumnValue] = if compiled.is_parameterized {
					&compiled.extracted_literals
				} else {
					user_params
				};
				if let Some(matched) = variants.iter().find(|v| v.allows_params(candidate_literals)) {
					// Reuse the matched variant's compiled plan, but bind it to
					// *this* call's literals, not the ones the variant was
					// first created with (spec.md §4.10 step 6).
					let stmt = AdHocPlannedStatement {
						core_plan: matched.core_plan.clone(),
						bound_constants: candidate_literals.to_vec(),
						catalog_hash: self.catalog_hash,
					};
					self.cache.put(sql, &compiled.parsed_token, stmt.clone(), None, &decision);
					self.stats.record_outcome(CacheOutcome::Hit);
					trace!(target: TARGET, sql, "parameterized cache hit");
					return Ok((stmt, CacheOutcome::Hit));
				}
			}
		}

		let bound_constants = if compiled.is_parameterized {
			compiled.extracted_literals.clone()
		} else {
			user_params.to_vec()
		};
		let core_plan = Arc::new(compiled.clone());
		let stmt = AdHocPlannedStatement {
			core_plan: core_plan.clone(),
			bound_constants: bound_constants.clone(),
			catalog_hash: self.catalog_hash,
		};
		let variant = BoundPlan::new(core_plan, bound_constants);
		self.cache.put(sql, &compiled.parsed_token, stmt.clone(), Some(variant), &decision);
		self.stats.record_outcome(CacheOutcome::Miss);
		trace!(target: TARGET, sql, "planned fresh statement");
		Ok((stmt, CacheOutcome::Miss))
	}
}
