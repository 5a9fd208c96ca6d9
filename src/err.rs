use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the export tuple stream and the ad-hoc plan cache.
///
/// [`Error::Invariant`] is returned, never panicked, for conditions the spec
/// calls "fatal" (txn-id regression, rollback past the tail, oversized rows,
/// generation regression, capacity changes after first use). Returning a
/// typed error rather than aborting keeps this crate usable as a library;
/// callers that embed it are expected to treat `Error::Invariant` as fatal
/// and escalate at a higher level.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// A precondition the spec documents as an invariant was violated.
	#[error("invariant violation: {0}")]
	Invariant(String),

	/// The external parser/optimizer rejected the statement, or the
	/// parameter count did not match (outside explain mode).
	#[error("failed to plan statement: {0}")]
	Planning(String),

	/// The external optimizer raised an unexpected internal error while
	/// compiling a plan.
	#[error("internal error compiling plan: {0}")]
	Compile(String),

	/// The top-end sink rejected or failed to accept a pushed block.
	#[error("top end sink failed: {0}")]
	Sink(String),
}
