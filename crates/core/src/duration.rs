use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::ConfigurationError;
use crate::intent::RawDuration;
use crate::resolver::NameResolver;

/// ISO-8601 duration grammar in the `PnDTnHnMn.nS` form.
static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([-+]?)P(?:([-+]?[0-9]+)D)?(T(?:([-+]?[0-9]+)H)?(?:([-+]?[0-9]+)M)?(?:([-+]?[0-9]+)(?:[.,]([0-9]{0,9}))?S)?)?$",
    )
    .expect("ISO duration regex is valid")
});

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Turns a declared duration (raw millis and/or text) into a [`Duration`].
#[derive(Debug, Clone, Default)]
pub struct DurationResolver {
    values: NameResolver,
}

impl DurationResolver {
    pub fn new(values: NameResolver) -> Self {
        Self { values }
    }

    /// Resolve a declared duration.
    ///
    /// A non-negative raw value wins and is read as milliseconds. Otherwise a
    /// non-blank text has its placeholders substituted and is parsed first as
    /// a plain millisecond count, then as an ISO-8601 duration. With neither
    /// set, `default` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidDuration`] naming `field` when the
    /// text parses as neither form, or denotes a negative duration.
    pub fn resolve(
        &self,
        raw: &RawDuration,
        default: Duration,
        field: &str,
    ) -> Result<Duration, ConfigurationError> {
        if let Ok(millis) = u64::try_from(raw.millis) {
            return Ok(Duration::from_millis(millis));
        }
        if raw.text.trim().is_empty() {
            return Ok(default);
        }

        // Surrounding whitespace is not trimmed and fails both forms.
        let text = self.values.resolve(&raw.text);
        let invalid = || ConfigurationError::InvalidDuration {
            field: field.to_owned(),
            value: text.clone(),
        };

        match text.parse::<i64>() {
            Ok(millis) => u64::try_from(millis)
                .map(Duration::from_millis)
                .map_err(|_| invalid()),
            Err(_) => parse_iso8601(&text).ok_or_else(invalid),
        }
    }
}

/// Parse an ISO-8601 duration such as `PT15M`, `P1DT2H` or `PT0.5S`.
///
/// Returns `None` for malformed input and for negative totals.
pub fn parse_iso8601(text: &str) -> Option<Duration> {
    let caps = ISO_DURATION.captures(text)?;

    let days = caps.get(2);
    let time = caps.get(3);
    let hours = caps.get(4);
    let minutes = caps.get(5);
    let seconds = caps.get(6);
    let fraction = caps.get(7);

    // "P" and "PT" alone carry no component.
    if days.is_none() && hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }
    if time.is_some_and(|t| t.len() == 1) {
        return None;
    }

    let component = |m: Option<regex::Match<'_>>, unit_secs: i128| -> Option<i128> {
        match m {
            Some(m) => m
                .as_str()
                .parse::<i64>()
                .ok()
                .map(|v| i128::from(v) * unit_secs * NANOS_PER_SECOND),
            None => Some(0),
        }
    };

    let mut total = component(days, 86_400)?
        + component(hours, 3_600)?
        + component(minutes, 60)?
        + component(seconds, 1)?;

    if let Some(fraction) = fraction.filter(|f| !f.as_str().is_empty()) {
        let digits = fraction.as_str();
        let padded = format!("{digits:0<9}");
        let nanos: i128 = padded.parse().ok()?;
        let negative_seconds = seconds.is_some_and(|s| s.as_str().starts_with('-'));
        total += if negative_seconds { -nanos } else { nanos };
    }

    if caps.get(1).is_some_and(|s| s.as_str() == "-") {
        total = -total;
    }

    let total = u128::try_from(total).ok()?;
    let secs = u64::try_from(total / NANOS_PER_SECOND.unsigned_abs()).ok()?;
    let nanos = u32::try_from(total % NANOS_PER_SECOND.unsigned_abs()).ok()?;
    Some(Duration::new(secs, nanos))
}
