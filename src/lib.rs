//! The per-partition transactional export tuple stream, and the ad-hoc plan
//! cache that shares its implementation budget.
//!
//! See `SPEC_FULL.md` at the repository root for the full requirements this
//! crate implements.

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

#[doc(hidden)]
pub mod cnf;
#[doc(hidden)]
pub mod err;
pub mod planner;
pub mod stream;

pub use err::{Error, Result};
