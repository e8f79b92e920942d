pub mod content;
pub mod history;
pub mod lifecycle;
pub mod limiter;
pub mod membership;
pub mod service;
pub mod targets;
pub mod worker;
