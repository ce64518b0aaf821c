//! 滑动窗口限流
//!
//! 计数器存放在共享存储中，多实例部署共享同一份配额。

mod sliding_window;

pub use sliding_window::{Admission, RateLimiter, RateLimiters};
