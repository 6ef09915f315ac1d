use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::warn;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Uses the `iana-time-zone` crate directly, with no subprocess calls.
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Handles timezone-aware timestamp parsing for telemetry files.
pub struct TimezoneHandler {
    default_tz: Tz,
}

impl TimezoneHandler {
    /// Create a handler with the given IANA timezone name as the default.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to UTC
    /// and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimezoneHandler: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { default_tz: tz }
    }

    /// Parse an ISO 8601 / RFC 3339 timestamp string into a UTC [`DateTime`].
    ///
    /// Handles the common `Z`-suffix form and any fixed UTC offset. Naive
    /// timestamps without timezone information are interpreted in the
    /// handler's default timezone. Returns `None` for empty strings or
    /// unrecognised formats.
    pub fn parse_timestamp(&self, s: &str) -> Option<DateTime<Utc>> {
        if s.is_empty() {
            return None;
        }

        // Replace trailing 'Z' with '+00:00'.
        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        // Try naive datetime without timezone, interpreted as `default_tz`.
        const FMTS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
        ];
        for fmt in FMTS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                use chrono::TimeZone as _;
                if let chrono::LocalResult::Single(dt) = self.default_tz.from_local_datetime(&naive)
                {
                    return Some(dt.with_timezone(&Utc));
                }
            }
        }

        warn!("TimezoneHandler: could not parse timestamp \"{}\"", s);
        None
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }

    /// Expose the configured default timezone.
    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }
}

// ── Interval flooring ─────────────────────────────────────────────────────────

/// Floor a UTC timestamp to the start of its enclosing interval.
///
/// Buckets are anchored at absolute clock boundaries, so with an hourly
/// interval both 10:01 and 10:59 land in the 10:00 bucket. Falls back to
/// the input unchanged if the interval cannot be applied.
pub fn floor_to_interval(dt: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    dt.duration_trunc(interval).unwrap_or(dt)
}

// ── Tests ──────────────────────────────────────────────────────────────────────


// Re-export chrono items used in tests.
#[allow(unused_imports)]
use chrono::Timelike;
