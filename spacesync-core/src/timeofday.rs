//! Wall-clock parsing for timetable slots and free-room queries.
//!
//! Everything is normalized to minutes since midnight. Both 24-hour ("15:30")
//! and 12-hour ("3:30 pm", "3:30PM") forms are accepted.

const NOON: u32 = 12 * 60;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TimeParseError {
    #[error("Empty time")]
    Empty,
    #[error("Invalid time of day: {0}")]
    Invalid(String),
    #[error("Invalid time range: {0}")]
    InvalidRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

fn split_meridiem(input: &str) -> (&str, Option<Meridiem>) {
    let lower = input.to_ascii_lowercase();
    if lower.ends_with("am") {
        (input[..input.len() - 2].trim_end(), Some(Meridiem::Am))
    } else if lower.ends_with("pm") {
        (input[..input.len() - 2].trim_end(), Some(Meridiem::Pm))
    } else {
        (input, None)
    }
}

fn parse_with_meridiem(input: &str) -> Result<(u32, Option<Meridiem>), TimeParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError::Empty);
    }
    let invalid = || TimeParseError::Invalid(trimmed.to_string());

    let (clock, meridiem) = split_meridiem(trimmed);
    let (h, m) = match clock.split_once([':', '.']) {
        Some((h, m)) => (h.trim(), m.trim()),
        None => (clock.trim(), "0"),
    };
    let mut hours: u32 = h.parse().map_err(|_| invalid())?;
    let minutes: u32 = m.parse().map_err(|_| invalid())?;
    if minutes > 59 {
        return Err(invalid());
    }

    match meridiem {
        Some(_) if hours == 0 || hours > 12 => return Err(invalid()),
        Some(Meridiem::Pm) if hours < 12 => hours += 12,
        Some(Meridiem::Am) if hours == 12 => hours = 0,
        None if hours > 23 => return Err(invalid()),
        _ => {}
    }

    Ok((hours * 60 + minutes, meridiem))
}

/// Minutes since midnight for a single wall-clock time.
pub fn to_minutes(input: &str) -> Result<u32, TimeParseError> {
    parse_with_meridiem(input).map(|(minutes, _)| minutes)
}

/// An inclusive `[start, end]` interval in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    /// Parses "12:30 to 3:30" style ranges. A bare end earlier than the start is
    /// read as an afternoon time, which is how timetables write "12:30 to 1:30".
    pub fn parse(input: &str) -> Result<Self, TimeParseError> {
        let lower = input.to_ascii_lowercase();
        let (start, end) = match lower.find(" to ") {
            Some(idx) => (&input[..idx], &input[idx + 4..]),
            None => input
                .split_once('-')
                .ok_or_else(|| TimeParseError::InvalidRange(input.to_string()))?,
        };

        let (start, _) = parse_with_meridiem(start)?;
        let (mut end, end_meridiem) = parse_with_meridiem(end)?;
        if end < start && end_meridiem.is_none() && end < NOON {
            end += NOON;
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, minutes: u32) -> bool {
        self.start <= minutes && minutes <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_four_hour() {
        assert_eq!(to_minutes("13:00"), Ok(780));
        assert_eq!(to_minutes("9:30"), Ok(570));
        assert_eq!(to_minutes("0:05"), Ok(5));
        assert_eq!(to_minutes("14"), Ok(840));
    }

    #[test]
    fn test_twelve_hour() {
        assert_eq!(to_minutes("1:00 pm"), Ok(780));
        assert_eq!(to_minutes("1:00PM"), Ok(780));
        assert_eq!(to_minutes("12:15 am"), Ok(15));
        assert_eq!(to_minutes("12:15 pm"), Ok(735));
        assert_eq!(to_minutes("9:30am"), Ok(570));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(to_minutes("  "), Err(TimeParseError::Empty));
        assert!(to_minutes("noon").is_err());
        assert!(to_minutes("25:00").is_err());
        assert!(to_minutes("10:75").is_err());
        assert!(to_minutes("13:00 pm").is_err());
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let range = TimeRange::parse("12:30 to 15:30").unwrap();
        assert!(range.contains(to_minutes("12:30").unwrap()));
        assert!(range.contains(to_minutes("13:00").unwrap()));
        assert!(range.contains(to_minutes("15:30").unwrap()));
        assert!(!range.contains(to_minutes("15:31").unwrap()));
    }

    #[test]
    fn test_range_afternoon_end() {
        let range = TimeRange::parse("12:30 to 3:30").unwrap();
        assert_eq!(range, TimeRange { start: 750, end: 930 });
        assert!(range.contains(to_minutes("1:00 pm").unwrap()));
    }

    #[test]
    fn test_range_with_dash() {
        let range = TimeRange::parse("9:30-11:30").unwrap();
        assert_eq!(range, TimeRange { start: 570, end: 690 });
        assert!(TimeRange::parse("9:30").is_err());
    }
}
