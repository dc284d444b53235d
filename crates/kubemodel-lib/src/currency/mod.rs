//! Currency exchange-rate caching
//!
//! Only the rate cache lives here; fetching and converting rates is left to
//! the caller.

mod cache;

pub use cache::{CachedRates, RateCache, DEFAULT_RATE_TTL};
