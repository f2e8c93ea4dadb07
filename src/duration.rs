//! Utility to display durations

use std::io;
use trace_tree::{event, TimeStamp};

/// Duration in nanoseconds
pub type Duration = f64;

/// One nanosecond
pub const NANOSECOND: Duration = 1.0;
/// One microsecond
pub const MICROSECOND: Duration = 1000.0 * NANOSECOND;
/// One millisecond
pub const MILLISECOND: Duration = 1000.0 * MICROSECOND;
/// One second
pub const SECOND: Duration = 1000.0 * MILLISECOND;
/// One minute
pub const MINUTE: Duration = 60.0 * SECOND;
/// One hour
pub const HOUR: Duration = 60.0 * MINUTE;
/// One day
pub const DAY: Duration = 24.0 * HOUR;

/// Convert a tick count into a Duration
pub fn from_ticks(ticks: TimeStamp) -> Duration {
    event::ticks_to_nanoseconds(ticks)
}

/// Display a duration in a human-readable format
pub fn display_duration(output: impl io::Write, duration: Duration) -> io::Result<()> {
    display_duration_impl(output, duration, None)
}

/// Implementation of display_duration that allows for HH:MM:SS format
fn display_duration_impl(
    mut output: impl io::Write,
    duration: Duration,
    force_hms: Option<ForceHMS>,
) -> io::Result<()> {
    if duration >= 23.0 * HOUR + 59.0 * MINUTE + 59.995 * SECOND {
        let mut days = (duration / DAY).floor();
        let mut remainder = duration - days * DAY;
        if remainder >= 23.0 * HOUR + 59.0 * MINUTE + 59.995 * SECOND {
            days += 1.0;
            remainder = 0.0;
        }
        write!(output, "{days}d ")?;
        display_duration_impl(output, remainder, Some(ForceHMS::Hour))
    } else if force_hms == Some(ForceHMS::Hour) || duration >= 59.0 * MINUTE + 59.995 * SECOND {
        let mut hours = (duration / HOUR).floor();
        let mut remainder = duration - hours * HOUR;
        if remainder >= 59.0 * MINUTE + 59.995 * SECOND {
            hours += 1.0;
            remainder = 0.0;
        }
        if force_hms == Some(ForceHMS::Hour) {
            write!(output, "{hours:02}:")?;
        } else {
            write!(output, "{hours}:")?;
        }
        display_duration_impl(output, remainder, Some(ForceHMS::Minute))
    } else if force_hms == Some(ForceHMS::Minute) || duration >= 59.995 * SECOND {
        let mut minutes = (duration / MINUTE).floor();
        let mut remainder = duration - minutes * MINUTE;
        if remainder >= 59.995 * SECOND {
            minutes += 1.0;
            remainder = 0.0;
        }
        if force_hms == Some(ForceHMS::Minute) {
            write!(output, "{minutes:02}:")?;
        } else {
            write!(output, "{minutes}:")?;
        }
        display_duration_impl(output, remainder, Some(ForceHMS::Second))
    } else if duration >= 0.999995 * SECOND || force_hms == Some(ForceHMS::Second) {
        if force_hms == Some(ForceHMS::Second) {
            write!(output, "{:05.2}", duration / SECOND)?;
        } else {
            write!(output, "{:.2}s", duration / SECOND)?;
        }
        Ok(())
    } else if duration >= 0.999995 * MILLISECOND {
        write!(output, "{:.2}ms", duration / MILLISECOND)
    } else if duration >= MICROSECOND {
        write!(output, "{:.2}µs", duration / MICROSECOND)
    } else {
        write!(output, "{}ns", duration / NANOSECOND)
    }
}
//
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ForceHMS {
    Hour,
    Minute,
    Second,
}
