//! Live usage counting.
//!
//! The policy engine never trusts cached counts: every decision goes through
//! [`UsageAccessor`], which re-queries the [`UsageSource`] on each call.
//! "Bookings this month" counts orders created since the first instant of the
//! current calendar month in UTC.

mod accessor;
mod in_memory;
mod source;

pub use accessor::{UsageAccessor, current_month_start};
pub use in_memory::InMemoryUsageSource;
pub use source::{UsageSnapshot, UsageSource};
