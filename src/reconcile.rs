//! Reconciliation Engine
//!
//! Folds the decoded events of one in-flight exchange into the transcript.
//! Events are applied strictly in arrival order through the pure [`apply`]
//! function; the caller executes the returned effects against the store.

mod apply;
mod effect;
mod exchange;

#[cfg(test)]
mod proptests;

pub use apply::{apply, Reconciled};
pub use effect::Effect;
pub use exchange::{ExchangeContext, ExchangePhase};
