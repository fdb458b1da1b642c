use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::SystemTime;

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("Invalid timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

/// Wall-clock formatting for telemetry and detection logs
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    timezone: Tz,
}

impl Clock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn from_name(tz_name: &str) -> Self {
        Self::new(resolve_timezone(tz_name))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn local(&self, at: SystemTime) -> DateTime<Tz> {
        DateTime::<Utc>::from(at).with_timezone(&self.timezone)
    }

    /// ISO-8601 local time with microseconds, e.g. `2024-03-01T14:05:09.123456`
    pub fn iso(&self, at: SystemTime) -> String {
        self.local(at).format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }

    /// Second-resolution stamp used in detection log lines
    pub fn log_stamp(&self, at: SystemTime) -> String {
        self.local(at).format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(chrono_tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone("Not/AZone"), chrono_tz::UTC);
        assert_eq!(resolve_timezone("Europe/Madrid"), chrono_tz::Europe::Madrid);
    }

    #[test]
    fn test_formats() {
        let at = UNIX_EPOCH + Duration::from_micros(1_700_000_000_123_456);
        let clock = Clock::default();

        assert_eq!(clock.iso(at), "2023-11-14T22:13:20.123456");
        assert_eq!(clock.log_stamp(at), "2023-11-14 22:13:20");

        let madrid = Clock::from_name("Europe/Madrid");
        assert_eq!(madrid.log_stamp(at), "2023-11-14 23:13:20");
    }
}
