//! Five-field cron evaluation (min hour dom month dow) with `@` shortcuts,
//! computed in the task's timezone.
//!
//! DST handling when mapping a matching local minute back to an instant:
//! spring-forward gaps are skipped, fall-back overlaps take the earliest
//! (pre-transition) mapping.

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike, Utc};

/// The timezone a task's schedule is evaluated in.
#[derive(Debug, Clone, Copy)]
pub enum TaskZone {
    /// The system's local timezone (the default).
    Local,
    Named(chrono_tz::Tz),
}

/// Parse an optional IANA name; `None` and unknown names fall back to
/// the local zone.
pub fn parse_zone(name: Option<&str>) -> TaskZone {
    match name {
        Some(name) => match name.parse::<chrono_tz::Tz>() {
            Ok(tz) => TaskZone::Named(tz),
            Err(_) => {
                tracing::warn!(timezone = name, "unknown timezone, using local");
                TaskZone::Local
            }
        },
        None => TaskZone::Local,
    }
}

/// Expand `@hourly` / `@daily` / `@weekly` / `@monthly` to five fields.
/// Daily-style shortcuts fire at 08:00 (Monday / the 1st respectively).
pub fn expand_shortcut(expr: &str) -> Option<&'static str> {
    match expr.trim() {
        "@hourly" => Some("0 * * * *"),
        "@daily" => Some("0 8 * * *"),
        "@weekly" => Some("0 8 * * 1"),
        "@monthly" => Some("0 8 1 * *"),
        _ => None,
    }
}

/// Validate a schedule expression, returning its five-field form.
pub fn parse_cron(expr: &str) -> Result<String, String> {
    let expanded = expand_shortcut(expr)
        .map(str::to_string)
        .unwrap_or_else(|| expr.trim().to_string());
    let fields: Vec<&str> = expanded.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "Invalid cron expression '{expr}': expected 5 fields or a @shortcut"
        ));
    }
    let ranges: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 7)];
    for (field, (lo, hi)) in fields.iter().zip(ranges) {
        if !field_is_valid(field, lo, hi) {
            return Err(format!("Invalid cron field '{field}' in '{expr}'"));
        }
    }
    Ok(expanded)
}

fn field_is_valid(field: &str, lo: u32, hi: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        return step.parse::<u32>().is_ok_and(|n| n > 0);
    }
    field.split(',').all(|part| {
        if let Some((start, end)) = part.split_once('-') {
            matches!(
                (start.parse::<u32>(), end.parse::<u32>()),
                (Ok(s), Ok(e)) if s >= lo && e <= hi && s <= e
            )
        } else {
            part.parse::<u32>().is_ok_and(|n| n >= lo && n <= hi)
        }
    })
}

/// Match one cron field against a value. Supports `*`, `*/n`, lists,
/// ranges, and literals.
fn field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
        return false;
    }
    for part in field.split(',') {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                if value >= s && value <= e {
                    return true;
                }
            }
        } else if part.parse::<u32>() == Ok(value) {
            return true;
        }
    }
    false
}

/// Match a naive local datetime against a five-field expression.
fn matches_naive(fields: &[&str], dt: &NaiveDateTime) -> bool {
    // Day-of-week: 0 and 7 both mean Sunday.
    let dow = dt.weekday().num_days_from_sunday();
    let dow_match = field_matches(fields[4], dow) || (dow == 0 && field_matches(fields[4], 7));
    field_matches(fields[0], dt.minute())
        && field_matches(fields[1], dt.hour())
        && field_matches(fields[2], dt.day())
        && field_matches(fields[3], dt.month())
        && dow_match
}

fn next_in_zone<Tz: TimeZone>(
    fields: &[&str],
    after: &DateTime<Utc>,
    tz: &Tz,
) -> Option<DateTime<Utc>> {
    // Advance to the next whole local minute strictly after `after`.
    let local_after = after.with_timezone(tz).naive_local();
    let mut candidate = local_after + chrono::Duration::seconds(60 - local_after.second() as i64);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    // Scan at most one year of minutes.
    let max_checks = 366 * 24 * 60;
    for _ in 0..max_checks {
        if matches_naive(fields, &candidate) {
            match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => {
                    return Some(earliest.with_timezone(&Utc));
                }
                // Spring-forward gap: this local minute doesn't exist.
                chrono::LocalResult::None => {}
            }
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}

/// Compute the next occurrence strictly after `after`, evaluated in the
/// given zone. Returns `None` for unparseable expressions or when no
/// occurrence exists within a year.
pub fn cron_next(expr: &str, after: &DateTime<Utc>, zone: TaskZone) -> Option<DateTime<Utc>> {
    let expanded = parse_cron(expr).ok()?;
    let fields: Vec<&str> = expanded.split_whitespace().collect();
    match zone {
        TaskZone::Local => next_in_zone(&fields, after, &Local),
        TaskZone::Named(tz) => next_in_zone(&fields, after, &tz),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn next_utc(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        cron_next(expr, &after, TaskZone::Named(chrono_tz::UTC)).unwrap()
    }

    #[test]
    fn shortcuts_expand() {
        assert_eq!(expand_shortcut("@hourly"), Some("0 * * * *"));
        assert_eq!(expand_shortcut("@daily"), Some("0 8 * * *"));
        assert_eq!(expand_shortcut("@weekly"), Some("0 8 * * 1"));
        assert_eq!(expand_shortcut("@monthly"), Some("0 8 1 * *"));
        assert_eq!(expand_shortcut("0 * * * *"), None);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_cron("not a cron").is_err());
        assert!(parse_cron("61 * * * *").is_err());
        assert!(parse_cron("* 25 * * *").is_err());
        assert!(parse_cron("* * * * * *").is_err());
        assert!(parse_cron("@fortnightly").is_err());
        assert!(parse_cron("*/0 * * * *").is_err());
    }

    #[test]
    fn parse_accepts_full_grammar() {
        for expr in [
            "* * * * *",
            "*/5 * * * *",
            "0,15,30,45 * * * *",
            "30 9-17 * * 1-5",
            "0 8 1 * *",
            "@daily",
        ] {
            assert!(parse_cron(expr).is_ok(), "{expr} should parse");
        }
    }

    #[test]
    fn next_is_strictly_after() {
        let from = utc(2026, 6, 15, 10, 0);
        for expr in ["0 * * * *", "*/5 * * * *", "@daily", "30 9 * * 1-5", "@monthly"] {
            let next = next_utc(expr, from);
            assert!(next > from, "{expr}: {next} must be > {from}");
        }
    }

    #[test]
    fn hourly_minute_zero() {
        let next = next_utc("@hourly", utc(2026, 6, 15, 10, 20));
        assert_eq!(next, utc(2026, 6, 15, 11, 0));
    }

    #[test]
    fn daily_at_eight() {
        let next = next_utc("@daily", utc(2026, 6, 15, 9, 0));
        assert_eq!(next, utc(2026, 6, 16, 8, 0));
        let next = next_utc("@daily", utc(2026, 6, 15, 6, 0));
        assert_eq!(next, utc(2026, 6, 15, 8, 0));
    }

    #[test]
    fn weekly_on_monday() {
        // 2026-06-15 is a Monday.
        let next = next_utc("@weekly", utc(2026, 6, 15, 9, 0));
        assert_eq!(next, utc(2026, 6, 22, 8, 0));
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn monthly_on_the_first() {
        let next = next_utc("@monthly", utc(2026, 6, 15, 9, 0));
        assert_eq!(next, utc(2026, 7, 1, 8, 0));
    }

    #[test]
    fn dow_seven_is_sunday() {
        // 2026-06-21 is a Sunday.
        let next = next_utc("0 12 * * 7", utc(2026, 6, 15, 0, 0));
        assert_eq!(next, utc(2026, 6, 21, 12, 0));
    }

    #[test]
    fn ranges_and_lists() {
        let next = next_utc("0 9-11 * * *", utc(2026, 6, 15, 10, 30));
        assert_eq!(next, utc(2026, 6, 15, 11, 0));
        let next = next_utc("15,45 * * * *", utc(2026, 6, 15, 10, 20));
        assert_eq!(next.minute(), 45);
    }

    #[test]
    fn spring_forward_gap_is_skipped() {
        // US/Eastern 2026-03-08: 02:30 local does not exist.
        let zone = TaskZone::Named(chrono_tz::US::Eastern);
        let after = utc(2026, 3, 8, 5, 0); // midnight ET
        let next = cron_next("30 2 * * *", &after, zone).unwrap();
        // Next existing 02:30 ET is the following day (EDT, UTC-4).
        assert_eq!(next, utc(2026, 3, 9, 6, 30));
    }

    #[test]
    fn fall_back_takes_earliest_mapping() {
        // US/Eastern 2026-11-01: 01:30 local occurs twice.
        let zone = TaskZone::Named(chrono_tz::US::Eastern);
        let after = utc(2026, 11, 1, 4, 0); // 00:00 EDT
        let next = cron_next("30 1 * * *", &after, zone).unwrap();
        // Earliest mapping: 01:30 EDT = 05:30 UTC.
        assert_eq!(next, utc(2026, 11, 1, 5, 30));
    }

    #[test]
    fn unknown_zone_falls_back_to_local() {
        assert!(matches!(parse_zone(Some("Not/AZone")), TaskZone::Local));
        assert!(matches!(parse_zone(None), TaskZone::Local));
        assert!(matches!(
            parse_zone(Some("Europe/Berlin")),
            TaskZone::Named(_)
        ));
    }

    #[test]
    fn local_zone_produces_a_next_run() {
        let next = cron_next("*/5 * * * *", &Utc::now(), TaskZone::Local);
        assert!(next.is_some());
        assert!(next.unwrap() > Utc::now() - chrono::Duration::minutes(6));
    }
}
