pub mod auth;
pub mod timing;

pub use auth::{Caller, CallerAuth};
pub use timing::{RequestId, TimingMiddleware};
