use chrono::{DateTime, Utc};
use rrule::RRuleSet;

/// Compute the next occurrence strictly after `after`, in the schedule's
/// own timezone, falling back to `None` when the rule is exhausted or
/// fails to parse (a malformed rule should never crash the scheduler loop).
pub fn next_run_after(rrule_expr: &str, timezone: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz: chrono_tz::Tz = timezone.parse().unwrap_or(chrono_tz::UTC);
    let dtstart = after.with_timezone(&tz);
    let ical = format!("DTSTART:{}\nRRULE:{}", dtstart.format("%Y%m%dT%H%M%S"), rrule_expr);
    let set: RRuleSet = ical.parse().ok()?;

    let result = set.after(dtstart).all(1);
    result.dates.first().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn computes_next_hourly_occurrence() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_run_after("FREQ=HOURLY;INTERVAL=6", "UTC", after);
        assert!(next.is_some());
        assert!(next.unwrap() > after);
    }

    #[test]
    fn malformed_rule_returns_none() {
        assert!(next_run_after("NOT_A_RULE", "UTC", Utc::now()).is_none());
    }
}
