use async_trait::async_trait;
use streamdb_export::err::Result;
use streamdb_export::planner::{CacheOutcome, CompiledPlan, Partitioning, Planner, PlannerFacade};
use streamdb_export::stream::ColumnValue;

/// A toy optimizer good enough to exercise the cache paths: it parameterizes
/// a single trailing `id=<int>` predicate and otherwise echoes the SQL back
/// as already-parameterized if it contains a `?`.
struct ToyOptimizer;

#[async_trait]
impl Planner for ToyOptimizer {
	async fn plan(&self, sql: &str) -> Result<CompiledPlan> {
		if let Some(eq) = sql.find("id=") {
			let rest = &sql[eq + 3..];
			let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
			if !digits.is_empty() {
				let parsed_token = format!("{}id=?{}", &sql[..eq], &rest[digits.len()..]);
				return Ok(CompiledPlan {
					parsed_token,
					placeholder_count: 0,
					extracted_literals: vec![ColumnValue::BigInt(digits.parse().unwrap())],
					is_parameterized: true,
				});
			}
		}
		Ok(CompiledPlan {
			parsed_token: sql.to_string(),
			placeholder_count: sql.matches('?').count(),
			extracted_literals: Vec::new(),
			is_parameterized: false,
		})
	}
}

#[tokio::test]
async fn plan_cache_hit_on_identical_sql() {
	let facade = PlannerFacade::new(Box::new(ToyOptimizer), 0xC0FFEE);
	let sql = "SELECT * FROM widgets WHERE id=1";

	let (_, first) = facade.plan(sql, Partitioning::Inferred, false, &[], false, false).await.unwrap();
	assert_eq!(first, CacheOutcome::Miss);

	let (stmt, second) = facade.plan(sql, Partitioning::Inferred, false, &[], false, false).await.unwrap();
	assert_eq!(second, CacheOutcome::Hit);
	assert_eq!(stmt.catalog_hash, 0xC0FFEE);
}

#[tokio::test]
async fn parameterized_cache_binds_a_fresh_constant() {
	let facade = PlannerFacade::new(Box::new(ToyOptimizer), 1);

	facade
		.plan("SELECT * FROM widgets WHERE id=1", Partitioning::Inferred, false, &[], false, false)
		.await
		.unwrap();

	let (stmt, outcome) = facade
		.plan("SELECT * FROM widgets WHERE id=2", Partitioning::Inferred, false, &[], false, false)
		.await
		.unwrap();

	assert_eq!(outcome, CacheOutcome::Hit, "same parsed_token, new literal -> parameterized hit");
	assert_eq!(stmt.bound_constants, vec![ColumnValue::BigInt(2)]);
	assert_eq!(facade.cache().core_size(), 1);
}

#[tokio::test]
async fn forced_partitioning_and_large_mode_are_never_admitted() {
	let facade = PlannerFacade::new(Box::new(ToyOptimizer), 1);
	let sql = "SELECT * FROM widgets WHERE id=1";

	facade.plan(sql, Partitioning::Forced, false, &[], false, false).await.unwrap();
	assert_eq!(facade.cache().literal_size(), 0);

	facade.plan(sql, Partitioning::Inferred, false, &[], false, true).await.unwrap();
	assert_eq!(facade.cache().literal_size(), 0);
}

#[tokio::test]
async fn explain_mode_tolerates_param_mismatch_but_skips_cache() {
	let facade = PlannerFacade::new(Box::new(ToyOptimizer), 1);
	let (_, outcome) = facade
		.plan("SELECT * FROM widgets WHERE x=?", Partitioning::Inferred, true, &[], false, false)
		.await
		.unwrap();
	assert_eq!(outcome, CacheOutcome::Miss);
	assert_eq!(facade.cache().literal_size(), 0);
}

#[tokio::test]
async fn wrong_param_count_outside_explain_is_a_planning_error() {
	let facade = PlannerFacade::new(Box::new(ToyOptimizer), 1);
	let err = facade
		.plan("SELECT * FROM widgets WHERE x=?", Partitioning::Inferred, false, &[], false, false)
		.await
		.unwrap_err();
	assert!(matches!(err, streamdb_export::Error::Planning(_)));
}

#[tokio::test]
async fn empty_sql_is_rejected() {
	let facade = PlannerFacade::new(Box::new(ToyOptimizer), 1);
	let err = facade.plan("   ", Partitioning::Inferred, false, &[], false, false).await.unwrap_err();
	assert!(matches!(err, streamdb_export::Error::Planning(_)));
}
