use rand::Rng;

pub const DEFAULT_INTERVAL_MILLIS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;
pub const DEFAULT_MAX_BACKOFF_MILLIS: u64 = 60 * 1_000;
pub const RANDOM_FACTOR: f64 = 0.5;

/// Exponential backoff parameters used between retried transaction attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub interval_millis: u64,
    pub backoff_factor: f64,
    pub max_millis: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            interval_millis: DEFAULT_INTERVAL_MILLIS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_millis: DEFAULT_MAX_BACKOFF_MILLIS,
        }
    }
}

/// Delay before retry number `retry` (1-based). The first retry runs immediately.
pub fn calculate_backoff_millis(retry: u32, config: BackoffConfig) -> u64 {
    if retry <= 1 {
        return 0;
    }
    calculate_backoff_with_rng(retry - 2, config, &mut rand::thread_rng())
}

fn calculate_backoff_with_rng<R: Rng + ?Sized>(backoff_count: u32, config: BackoffConfig, rng: &mut R) -> u64 {
    let base = (config.interval_millis as f64) * config.backoff_factor.powi(backoff_count as i32);
    let jitter = RANDOM_FACTOR * base * rng.gen_range(-1.0..=1.0);
    let value = (base + jitter).round().clamp(0.0, config.max_millis as f64);
    value as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn first_retry_is_immediate() {
        assert_eq!(calculate_backoff_millis(1, BackoffConfig::default()), 0);
    }

    #[test]
    fn backoff_is_capped() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = BackoffConfig::default();
        let value = calculate_backoff_with_rng(40, config, &mut rng);
        assert!(value <= config.max_millis);
    }

    #[test]
    fn backoff_grows_with_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let first = calculate_backoff_with_rng(0, BackoffConfig::default(), &mut rng);
        let mut rng = StdRng::seed_from_u64(1);
        let later = calculate_backoff_with_rng(4, BackoffConfig::default(), &mut rng);
        assert!(later >= first);
    }
}
