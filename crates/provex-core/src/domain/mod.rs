//! # Domain Types
//!
//! Small validated value types shared by standard models and provider
//! adapters.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker symbol |
//! | [`UtcDateTime`] | RFC3339 timestamp pinned to UTC |
//! | [`parse_date`] / [`format_date`] | ISO `YYYY-MM-DD` calendar dates |

mod symbol;
mod timestamp;

pub use symbol::Symbol;
pub use timestamp::{format_date, parse_date, today_utc, UtcDateTime};
