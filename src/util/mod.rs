pub mod backoff;

pub use backoff::{calculate_backoff_millis, BackoffConfig, RANDOM_FACTOR};
