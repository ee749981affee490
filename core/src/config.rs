//! Declarative fuse configuration

use crate::clock::{Clock, SystemClock};
use crate::errors::CircuitError;
use crate::fuse::{
    ExecutionCountFuse, FixedWindowCountFuse, Fuse, SlidingWindowCountFuse,
    SlidingWindowLimitFuse, TimedWindowCountFuse, validate_count, validate_duration,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fuse kind and its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuseConfig {
    /// Trip after `limit` admitted calls
    ExecutionCount { limit: usize },

    /// Count calls per fixed window; the call reaching `threshold` is rejected
    FixedWindowCount {
        threshold: usize,
        duration: Duration,
        /// Align windows to this instant instead of the first call
        window_start: Option<Instant>,
    },

    /// Count calls within a sliding window; the call reaching `threshold` is rejected
    SlidingWindowCount { threshold: usize, duration: Duration },

    /// Sliding window where the call reaching `limit` still passes
    SlidingWindowLimit { limit: usize, window: Duration },

    /// Counter checked and cleared by a background tick every `duration`
    TimedWindowCount { threshold: usize, duration: Duration },
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self::ExecutionCount { limit: 5 }
    }
}

impl FuseConfig {
    /// Short name of the fuse this config builds
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutionCount { .. } => "execution_count",
            Self::FixedWindowCount { .. } => "fixed_window_count",
            Self::SlidingWindowCount { .. } => "sliding_window_count",
            Self::SlidingWindowLimit { .. } => "sliding_window_limit",
            Self::TimedWindowCount { .. } => "timed_window_count",
        }
    }

    /// Check parameters without building anything
    pub fn validate(&self) -> Result<(), CircuitError> {
        match *self {
            Self::ExecutionCount { limit } => validate_count("limit", limit),
            Self::FixedWindowCount {
                threshold,
                duration,
                ..
            }
            | Self::SlidingWindowCount {
                threshold,
                duration,
            }
            | Self::TimedWindowCount {
                threshold,
                duration,
            } => {
                validate_count("threshold", threshold)?;
                validate_duration("duration", duration)
            }
            Self::SlidingWindowLimit { limit, window } => {
                validate_count("limit", limit)?;
                validate_duration("window", window)
            }
        }
    }

    pub fn build(&self) -> Result<Box<dyn Fuse>, CircuitError> {
        self.build_with_clock(SystemClock::shared())
    }

    /// Build with a custom time source
    ///
    /// The timed window fuse is driven by a real thread and ignores `clock`.
    pub fn build_with_clock(&self, clock: Arc<dyn Clock>) -> Result<Box<dyn Fuse>, CircuitError> {
        let fuse: Box<dyn Fuse> = match *self {
            Self::ExecutionCount { limit } => Box::new(ExecutionCountFuse::new(limit)?),
            Self::FixedWindowCount {
                threshold,
                duration,
                window_start,
            } => Box::new(FixedWindowCountFuse::with_clock(
                threshold,
                duration,
                window_start,
                clock,
            )?),
            Self::SlidingWindowCount {
                threshold,
                duration,
            } => Box::new(SlidingWindowCountFuse::with_clock(threshold, duration, clock)?),
            Self::SlidingWindowLimit { limit, window } => {
                Box::new(SlidingWindowLimitFuse::with_clock(limit, window, clock)?)
            }
            Self::TimedWindowCount {
                threshold,
                duration,
            } => Box::new(TimedWindowCountFuse::new(threshold, duration)?),
        };
        Ok(fuse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::FuseStatus;

    #[test]
    fn test_config_defaults() {
        let config = FuseConfig::default();
        assert_eq!(config, FuseConfig::ExecutionCount { limit: 5 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = FuseConfig::SlidingWindowLimit {
            limit: 3,
            window: Duration::ZERO,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, CircuitError::invalid("window", "must be greater than 0"));

        let err = FuseConfig::TimedWindowCount {
            threshold: 0,
            duration: Duration::from_secs(1),
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            CircuitError::invalid("threshold", "must be greater than 0")
        );
    }

    #[test]
    fn test_build_every_kind() {
        let configs = [
            FuseConfig::ExecutionCount { limit: 3 },
            FuseConfig::FixedWindowCount {
                threshold: 3,
                duration: Duration::from_secs(1),
                window_start: None,
            },
            FuseConfig::SlidingWindowCount {
                threshold: 3,
                duration: Duration::from_secs(1),
            },
            FuseConfig::SlidingWindowLimit {
                limit: 3,
                window: Duration::from_secs(1),
            },
            FuseConfig::TimedWindowCount {
                threshold: 3,
                duration: Duration::from_secs(1),
            },
        ];

        for config in &configs {
            let fuse = config.build().unwrap();
            assert_eq!(fuse.kind(), config.kind());
            assert!(fuse.try_pass(&[]));
            fuse.dispose();
        }
    }

    #[test]
    fn test_build_with_clock_drives_windows() {
        let clock = MockClock::new(Instant::now());
        let config = FuseConfig::SlidingWindowCount {
            threshold: 2,
            duration: Duration::from_secs(1),
        };
        let fuse = config.build_with_clock(Arc::new(clock.clone())).unwrap();

        assert!(fuse.try_pass(&[]));
        clock.advance(Duration::from_secs(2));
        assert!(fuse.try_pass(&[]));
        assert_eq!(fuse.status(), FuseStatus::Normal);
    }
}
