//! Recurrence scheduling for triggers with an `interval`.

use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};

use super::models::TriggerDefinition;
use crate::kernel::error::WorkerError;

/// An ISO-8601 duration (`PnYnMnWnDTnHnMnS`). Calendar parts are applied
/// as calendar arithmetic, time parts as exact durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsoDuration {
    pub months: u32,
    pub days: i64,
    pub seconds: i64,
}

impl IsoDuration {
    /// `date + self`, or `None` on overflow.
    pub fn add_to(&self, date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = date.checked_add_months(Months::new(self.months))?;
        let date = date.checked_add_signed(Duration::try_days(self.days)?)?;
        date.checked_add_signed(Duration::try_seconds(self.seconds)?)
    }
}

impl FromStr for IsoDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid ISO-8601 duration: {:?}", s);

        let body = s.strip_prefix('P').ok_or_else(invalid)?;
        let (date_part, time_part) = match body.split_once('T') {
            Some((date, time)) => {
                if time.is_empty() {
                    return Err(invalid());
                }
                (date, Some(time))
            }
            None => (body, None),
        };

        let mut duration = IsoDuration::default();
        let mut seen_component = false;

        for (value, unit) in components(date_part).ok_or_else(invalid)? {
            seen_component = true;
            match unit {
                'Y' => {
                    let months = value.checked_mul(12).ok_or_else(invalid)?;
                    duration.months = duration.months.checked_add(months).ok_or_else(invalid)?;
                }
                'M' => duration.months = duration.months.checked_add(value).ok_or_else(invalid)?,
                'W' => duration.days += i64::from(value) * 7,
                'D' => duration.days += i64::from(value),
                _ => return Err(invalid()),
            }
        }

        if let Some(time_part) = time_part {
            for (value, unit) in components(time_part).ok_or_else(invalid)? {
                seen_component = true;
                let value = i64::from(value);
                match unit {
                    'H' => duration.seconds += value * 3600,
                    'M' => duration.seconds += value * 60,
                    'S' => duration.seconds += value,
                    _ => return Err(invalid()),
                }
            }
        }

        if !seen_component {
            return Err(invalid());
        }

        Ok(duration)
    }
}

/// Splits `3Y2M` into `[(3, 'Y'), (2, 'M')]`. Returns `None` on any
/// malformed component.
fn components(part: &str) -> Option<Vec<(u32, char)>> {
    let mut parsed = Vec::new();
    let mut digits = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            parsed.push((digits.parse().ok()?, c));
            digits.clear();
        }
    }

    if !digits.is_empty() {
        return None;
    }

    Some(parsed)
}

/// Next instant a recurring trigger becomes eligible.
///
/// - `Ok(None)`: the trigger has no interval.
/// - no previous execution: the Unix epoch, i.e. immediately eligible.
/// - previous execution before `start_date`: `start_date`, unless the
///   previous execution plus one interval already passes `start_date`, in
///   which case `start_date + interval`.
/// - otherwise: previous execution plus one interval.
///
/// # Errors
///
/// [`WorkerError::InvalidDuration`] if the interval cannot be parsed.
pub fn next_execution(
    definition: &TriggerDefinition,
    last_execution: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, WorkerError> {
    let Some(interval) = definition.interval.as_deref() else {
        return Ok(None);
    };

    let duration: IsoDuration = interval.parse().map_err(|_| WorkerError::InvalidDuration {
        interval: interval.to_string(),
    })?;
    let overflow = || WorkerError::InvalidDuration {
        interval: interval.to_string(),
    };

    let Some(last) = last_execution else {
        return Ok(Some(DateTime::<Utc>::UNIX_EPOCH));
    };

    let start = definition.start_date();
    let candidate = duration.add_to(last).ok_or_else(overflow)?;

    if last < start {
        if candidate > start {
            return duration.add_to(start).map(Some).ok_or_else(overflow);
        }
        return Ok(Some(start));
    }

    Ok(Some(candidate))
}
