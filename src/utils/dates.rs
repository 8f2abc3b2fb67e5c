use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};

/// Calendar-month addition with end-of-month clamping: Jan 31 + 1 month is
/// Feb 28 (Feb 29 in leap years), Mar 31 + 1 month is Apr 30. This is the
/// billing-period semantics; durations are never fixed 30-day blocks.
pub fn add_months(at: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    at.checked_add_months(Months::new(months))
        .expect("date out of range")
}

/// Midnight UTC at the start of the given calendar day. Day-granular rules
/// ("expires today", "due in exactly 3 days") are evaluated as half-open
/// [day_start(d), day_start(d + 1)) ranges.
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn add_months_plain() {
        assert_eq!(
            add_months(utc("2026-01-15T00:00:00Z"), 1),
            utc("2026-02-15T00:00:00Z")
        );
        assert_eq!(
            add_months(utc("2026-01-15T10:30:00Z"), 3),
            utc("2026-04-15T10:30:00Z")
        );
    }

    #[test]
    fn add_months_clamps_to_end_of_month() {
        assert_eq!(
            add_months(utc("2026-01-31T00:00:00Z"), 1),
            utc("2026-02-28T00:00:00Z")
        );
        // 2028 is a leap year.
        assert_eq!(
            add_months(utc("2028-01-31T00:00:00Z"), 1),
            utc("2028-02-29T00:00:00Z")
        );
        assert_eq!(
            add_months(utc("2026-03-31T00:00:00Z"), 1),
            utc("2026-04-30T00:00:00Z")
        );
    }

    #[test]
    fn add_twelve_months_is_one_year() {
        assert_eq!(
            add_months(utc("2026-06-01T00:00:00Z"), 12),
            utc("2027-06-01T00:00:00Z")
        );
    }

    #[test]
    fn day_start_ranges() {
        let day = "2026-02-15".parse().unwrap();
        let from = day_start(day);
        let to = day_start(day + Duration::days(1));
        assert_eq!(from, utc("2026-02-15T00:00:00Z"));
        assert!(utc("2026-02-15T23:59:59Z") < to);
        assert!(utc("2026-02-16T00:00:00Z") >= to);
    }
}
