//! The two-level ad-hoc plan cache: spec.md §3 "PlanCache entries", §4.9.

use std::sync::Arc;

use quick_cache::sync::Cache;
use quick_cache::UnitWeighter;

use crate::stream::{ColumnType, ColumnValue};

const TARGET: &str = "streamdb::planner::cache";

/// The output of the external parser/optimizer for one SQL string.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
	/// SQL with literal constants replaced by placeholders; the
	/// parameterized cache key.
	pub parsed_token: String,
	/// Number of `?` placeholders found in the statement as written.
	pub placeholder_count: usize,
	/// Literal constants the optimizer extracted while producing
	/// `parsed_token`, in placeholder order. Empty if the statement was
	/// already written with placeholders (`is_parameterized == false`).
	pub extracted_literals: Vec<ColumnValue>,
	/// Whether `parsed_token` differs from the original SQL, i.e. the
	/// optimizer did the parameterizing rather than the caller.
	pub is_parameterized: bool,
}

fn literal_type(v: &ColumnValue) -> Option<ColumnType> {
	match v {
		ColumnValue::Null => None,
		ColumnValue::Boolean(_) => Some(ColumnType::Boolean),
		ColumnValue::BigInt(_) => Some(ColumnType::BigInt),
		ColumnValue::Double(_) => Some(ColumnType::Double),
		ColumnValue::Text(_) => Some(ColumnType::Text),
		ColumnValue::Varbinary(_) => Some(ColumnType::Varbinary),
	}
}

/// A compiled plan specialized to one set of bound constants, cached under a
/// `parsed_token`. See spec.md §3, §4.9, GLOSSARY "Bound plan".
#[derive(Debug, Clone)]
pub struct BoundPlan {
	pub core_plan: Arc<CompiledPlan>,
	pub bound_constants: Vec<ColumnValue>,
	/// The type each `bound_constants` slot was bound with, at variant
	/// creation time; `None` means that slot was bound `NULL` and matches
	/// any type on replay.
	param_schema: Vec<Option<ColumnType>>,
}

impl BoundPlan {
	pub fn new(core_plan: Arc<CompiledPlan>, bound_constants: Vec<ColumnValue>) -> Self {
		let param_schema = bound_constants.iter().map(literal_type).collect();
		Self {
			core_plan,
			bound_constants,
			param_schema,
		}
	}

	/// True when every value in `literals` is type-compatible with this
	/// variant's placeholder schema (spec.md §4.9).
	pub fn allows_params(&self, literals: &[ColumnValue]) -> bool {
		if literals.len() != self.param_schema.len() {
			return false;
		}
		literals.iter().zip(&self.param_schema).all(|(v, expected)| match expected {
			None => true,
			Some(ty) => literal_type(v) == Some(*ty),
		})
	}
}

/// A fully resolved, ready-to-execute plan, keyed in the literal cache by
/// its originating SQL text. See spec.md §4.9, §4.10 step 7.
#[derive(Debug, Clone)]
pub struct AdHocPlannedStatement {
	pub core_plan: Arc<CompiledPlan>,
	pub bound_constants: Vec<ColumnValue>,
	pub catalog_hash: u64,
}

/// Whether a `plan()` call served from cache, missed and recompiled, or
/// failed outright. Reported to [`crate::planner::stats::PlannerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
	Hit,
	Miss,
	Fail,
}

/// The three conditions that disqualify a plan from caching (spec.md §3,
/// §4.9).
#[derive(Debug, Clone, Copy)]
pub struct AdmissionDecision {
	pub wrong_param_count: bool,
	pub forced_partitioning: bool,
	pub large: bool,
}

impl AdmissionDecision {
	fn admits(&self) -> bool {
		!(self.wrong_param_count || self.forced_partitioning || self.large)
	}
}

type LiteralCache = Cache<String, AdHocPlannedStatement, UnitWeighter>;
type ParameterizedCache = Cache<String, Arc<Vec<BoundPlan>>, UnitWeighter>;

/// Two independent bounded caches: exact SQL text, and parameterized token.
/// See spec.md §3 "PlanCache entries", §4.9.
pub struct PlanCache {
	literal: LiteralCache,
	parameterized: ParameterizedCache,
}

impl PlanCache {
	pub fn new() -> Self {
		let cap = *crate::cnf::PLAN_CACHE_SIZE;
		Self {
			literal: Cache::with_weighter(cap, cap as u64, UnitWeighter),
			parameterized: Cache::with_weighter(cap, cap as u64, UnitWeighter),
		}
	}

	pub fn get_with_sql(&self, sql: &str) -> Option<AdHocPlannedStatement> {
		self.literal.get(sql)
	}

	pub fn get_with_parsed_token(&self, token: &str) -> Option<Arc<Vec<BoundPlan>>> {
		self.parameterized.get(token)
	}

	/// Inserts `stmt` into the literal cache, and `variant` (if any) into the
	/// parameterized cache's variant list for `parsed_token`, subject to
	/// `decision`.
	pub fn put(
		&self,
		sql: &str,
		parsed_token: &str,
		stmt: AdHocPlannedStatement,
		variant: Option<BoundPlan>,
		decision: &AdmissionDecision,
	) {
		if !decision.admits() {
			trace!(target: TARGET, sql, wrong_param_count = decision.wrong_param_count, forced_partitioning = decision.forced_partitioning, large = decision.large, "admission rejected");
			return;
		}
		self.literal.insert(sql.to_string(), stmt);
		if let Some(variant) = variant {
			let mut variants = self
				.parameterized
				.get(parsed_token)
				.map(|existing| (*existing).clone())
				.unwrap_or_default();
			variants.push(variant);
			self.parameterized.insert(parsed_token.to_string(), Arc::new(variants));
		}
	}

	pub fn literal_size(&self) -> u64 {
		self.literal.len() as u64
	}

	pub fn core_size(&self) -> u64 {
		self.parameterized.len() as u64
	}
}

impl Default for PlanCache {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn plan(token: &str) -> Arc<CompiledPlan> {
		Arc::new(CompiledPlan {
			parsed_token: token.to_string(),
			placeholder_count: 1,
			extracted_literals: vec![ColumnValue::BigInt(1)],
			is_parameterized: true,
		})
	}

	#[test]
	fn admission_rejects_forced_and_large() {
		let cache = PlanCache::new();
		let core = plan("SELECT * FROM T WHERE id=?");
		let stmt = AdHocPlannedStatement {
			core_plan: core.clone(),
			bound_constants: vec![ColumnValue::BigInt(1)],
			catalog_hash: 1,
		};
		let decision = AdmissionDecision {
			wrong_param_count: false,
			forced_partitioning: true,
			large: false,
		};
		cache.put("SELECT * FROM T WHERE id=1", &core.parsed_token, stmt, None, &decision);
		assert!(cache.get_with_sql("SELECT * FROM T WHERE id=1").is_none());
		assert_eq!(cache.literal_size(), 0);
	}

	#[test]
	fn bound_plan_matches_by_type_not_value() {
		let core = plan("SELECT * FROM T WHERE id=?");
		let bound = BoundPlan::new(core, vec![ColumnValue::BigInt(1)]);
		assert!(bound.allows_params(&[ColumnValue::BigInt(999)]));
		assert!(!bound.allows_params(&[ColumnValue::Text("x".into())]));
		assert!(!bound.allows_params(&[ColumnValue::BigInt(1), ColumnValue::BigInt(2)]));
	}
}
