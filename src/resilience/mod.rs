//! Resilience patterns for the Canvas client: call scoping, backoff and
//! adaptive rate governing.

mod backoff;
mod governor;
mod scope;

pub use backoff::BackoffPolicy;
pub use governor::{
    RateGovernor, RateTier, CRITICAL_RATE, CRITICAL_THRESHOLD, WARNING_RATE, WARNING_THRESHOLD,
};
pub use scope::CallScope;
