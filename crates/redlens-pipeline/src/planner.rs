//! Batch partitioning and crawler timeout sizing.

use std::time::Duration;

use redlens_core::AppConfig;

/// Tunables for [`TimeoutPolicy::calculate_timeout`].
///
/// ```text
/// per_blogger = notes * secs_per_note + overhead_per_blogger
/// timeout     = clamp(batch_len * per_blogger * multiplier, floor, ceiling)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    pub secs_per_note: u64,
    pub overhead_per_blogger_secs: u64,
    pub multiplier: f64,
    pub floor_secs: u64,
    pub ceiling_secs: u64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            secs_per_note: 4,
            overhead_per_blogger_secs: 60,
            multiplier: 1.5,
            floor_secs: 300,
            ceiling_secs: 7200,
        }
    }
}

impl TimeoutPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            secs_per_note: config.secs_per_note,
            overhead_per_blogger_secs: config.overhead_per_blogger_secs,
            multiplier: config.timeout_multiplier,
            floor_secs: config.timeout_floor_secs,
            ceiling_secs: config.timeout_ceiling_secs,
        }
    }

    /// Wall-clock budget for one crawler invocation covering `batch_len`
    /// bloggers at `notes_per_blogger` notes each.
    ///
    /// Non-decreasing in both arguments and always within
    /// `[floor_secs, ceiling_secs]`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn calculate_timeout(&self, batch_len: usize, notes_per_blogger: u32) -> Duration {
        let per_blogger = u64::from(notes_per_blogger)
            .saturating_mul(self.secs_per_note)
            .saturating_add(self.overhead_per_blogger_secs);
        let raw = (batch_len as u64).saturating_mul(per_blogger);
        let scaled = (raw as f64 * self.multiplier).ceil();

        let floor = self.floor_secs.min(self.ceiling_secs);
        let secs = if scaled.is_nan() || scaled <= floor as f64 {
            floor
        } else if scaled >= self.ceiling_secs as f64 {
            self.ceiling_secs
        } else {
            scaled as u64
        };
        Duration::from_secs(secs)
    }
}

/// Splits `items` into consecutive chunks of at most `batch_size`, keeping
/// order. A `batch_size` of zero is treated as one.
#[must_use]
pub fn plan_batches<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(batch_size.max(1))
        .map(<[T]>::to_vec)
        .collect()
}
