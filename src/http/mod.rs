//! JSON routes over a [`SubscriptionPolicy`](crate::SubscriptionPolicy).
//!
//! ```rust,ignore
//! let policy = Arc::new(SubscriptionPolicy::new(store, usage));
//! let app = Router::new().nest("/billing", waymark::http::routes(policy));
//! ```

pub mod response;
pub mod routes;

pub use response::{ApiResponse, ApiResult};
pub use routes::routes;
