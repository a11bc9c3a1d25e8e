use std::time::Duration;

use retouch_backend::ConfigError;

/// Default delay between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4000);
/// Default delay before the first poll.
const DEFAULT_POLL_START_DELAY: Duration = Duration::from_millis(1000);
/// Default period of the synthetic progress timer.
const DEFAULT_PROGRESS_TICK: Duration = Duration::from_millis(200);
const DEFAULT_PROGRESS_CAP: u8 = 90;

/// Timing of the polling and progress timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
    pub poll_start_delay: Duration,
    pub progress_tick: Duration,
    /// Added to the displayed progress on every tick.
    pub progress_step: u8,
    /// The synthetic timer never moves progress past this value.
    pub progress_cap: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_start_delay: DEFAULT_POLL_START_DELAY,
            progress_tick: DEFAULT_PROGRESS_TICK,
            progress_step: 1,
            progress_cap: DEFAULT_PROGRESS_CAP,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `RETOUCH_POLL_INTERVAL_MS`    | `4000`  |
    /// | `RETOUCH_POLL_START_DELAY_MS` | `1000`  |
    /// | `RETOUCH_PROGRESS_TICK_MS`    | `200`   |
    /// | `RETOUCH_PROGRESS_CAP`        | `90`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var).filter(|v| !v.trim().is_empty()) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(0) => Err(invalid(var, &raw, "must be greater than zero")),
                    Ok(ms) => Ok(Duration::from_millis(ms)),
                    Err(e) => Err(invalid(var, &raw, &e.to_string())),
                },
            }
        };

        let progress_cap = match lookup("RETOUCH_PROGRESS_CAP").filter(|v| !v.trim().is_empty()) {
            None => defaults.progress_cap,
            Some(raw) => match raw.trim().parse::<u8>() {
                Ok(cap) if cap < 100 => cap,
                Ok(_) => return Err(invalid("RETOUCH_PROGRESS_CAP", &raw, "must be below 100")),
                Err(e) => return Err(invalid("RETOUCH_PROGRESS_CAP", &raw, &e.to_string())),
            },
        };

        let config = Self {
            poll_interval: millis("RETOUCH_POLL_INTERVAL_MS", defaults.poll_interval)?,
            poll_start_delay: millis("RETOUCH_POLL_START_DELAY_MS", defaults.poll_start_delay)?,
            progress_tick: millis("RETOUCH_PROGRESS_TICK_MS", defaults.progress_tick)?,
            progress_step: defaults.progress_step,
            progress_cap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject timings the timers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "0", "must be greater than zero"));
        }
        if self.progress_tick.is_zero() {
            return Err(invalid("progress_tick", "0", "must be greater than zero"));
        }
        if self.progress_cap >= 100 {
            return Err(invalid(
                "progress_cap",
                &self.progress_cap.to_string(),
                "must be below 100",
            ));
        }
        Ok(())
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
