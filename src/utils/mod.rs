pub mod fingerprint;
pub mod ip;
pub mod retry;
pub mod time_range;

pub use fingerprint::{fingerprint, is_fingerprint};
pub use ip::{client_address, client_address_from_request};
pub use time_range::TimeRange;
