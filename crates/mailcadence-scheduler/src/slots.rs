//! Slot scheduler: maps a batch of N messages onto future send times.
//!
//! Rules:
//! - sends only happen Monday through Thursday
//! - at most `daily_limit` sends per allowed day
//! - each day's sends are spread evenly across `[window_start, window_end)`,
//!   truncated to whole minutes
//!
//! Pure: "now" and the time zone come in as a `DateTime<Tz>`, nothing is read
//! from the clock or the disk.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, TimeZone, Weekday};
use mailcadence_core::config::ScheduleConfig;
use mailcadence_core::error::{MailCadenceError, Result};

/// Scheduling parameters for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParams {
    /// Inclusive floor; `None` (or a past date) means today.
    pub start_date: Option<NaiveDate>,
    /// `HH:MM`
    pub window_start: String,
    /// `HH:MM`
    pub window_end: String,
    pub daily_limit: u32,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        let config = ScheduleConfig::default();
        Self {
            start_date: None,
            window_start: config.window_start,
            window_end: config.window_end,
            daily_limit: config.daily_limit,
        }
    }
}

impl ScheduleParams {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let start_date = config.start_date.as_deref().map(parse_date).transpose()?;
        Ok(Self {
            start_date,
            window_start: config.window_start.clone(),
            window_end: config.window_end.clone(),
            daily_limit: config.daily_limit,
        })
    }
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
        MailCadenceError::InvalidScheduleParameters(format!("start date '{s}': {e}"))
    })
}

/// Parse `HH:MM` into minutes after midnight.
pub fn parse_time_of_day(s: &str) -> Result<u32> {
    let invalid = || {
        MailCadenceError::InvalidScheduleParameters(format!(
            "time of day '{s}' is not HH:MM"
        ))
    };
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || m.len() != 2 {
        return Err(invalid());
    }
    let h: u32 = h.parse().map_err(|_| invalid())?;
    let m: u32 = m.parse().map_err(|_| invalid())?;
    if h > 23 || m > 59 {
        return Err(invalid());
    }
    Ok(h * 60 + m)
}

/// Monday through Thursday. Fixed policy.
pub fn is_allowed_day(date: NaiveDate) -> bool {
    matches!(
        date.weekday(),
        Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu
    )
}

/// First allowed day on or after `date`; `None` past the last representable date.
pub fn next_allowed_day(date: NaiveDate) -> Option<NaiveDate> {
    let mut d = date;
    while !is_allowed_day(d) {
        d = d.succ_opt()?;
    }
    Some(d)
}

fn out_of_range(count: usize) -> MailCadenceError {
    MailCadenceError::InvalidScheduleParameters(format!(
        "{count} slots run past the last representable date"
    ))
}

/// Validated send window in minutes after midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotWindow {
    start: u32,
    end: u32,
    daily_limit: u32,
}

impl SlotWindow {
    fn from_params(params: &ScheduleParams) -> Result<Self> {
        if params.daily_limit == 0 {
            return Err(MailCadenceError::InvalidScheduleParameters(
                "daily limit must be a positive integer".into(),
            ));
        }
        let start = parse_time_of_day(&params.window_start)?;
        let end = parse_time_of_day(&params.window_end)?;
        if end <= start {
            return Err(MailCadenceError::InvalidScheduleParameters(format!(
                "send window {}-{} is empty",
                params.window_start, params.window_end
            )));
        }
        Ok(Self {
            start,
            end,
            daily_limit: params.daily_limit,
        })
    }

    /// Minutes after midnight of slot `k` (0-based within its day).
    ///
    /// Exact form of `start + floor(k * (end - start) / limit)`, so fractional
    /// spacing never drifts across a day.
    fn slot_minute(&self, k: u32) -> u32 {
        let duration = u64::from(self.end - self.start);
        let offset = duration * u64::from(k) / u64::from(self.daily_limit);
        // offset < duration because k < daily_limit
        self.start + offset as u32
    }
}

/// Produce `count` send times (epoch ms), non-decreasing, for one batch.
///
/// Fails with `InvalidScheduleParameters` before producing anything when the
/// daily limit is zero, a time of day is malformed or the window is empty.
pub fn schedule<Tz: TimeZone>(
    count: usize,
    params: &ScheduleParams,
    now: &DateTime<Tz>,
) -> Result<Vec<i64>> {
    let window = SlotWindow::from_params(params)?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let tz = now.timezone();
    let today = now.date_naive();
    let mut day = next_allowed_day(params.start_date.map_or(today, |d| d.max(today)))
        .ok_or_else(|| out_of_range(count))?;

    // 4 allowed days per 7, plus slack for the first partial week
    let allowed_days = count.div_ceil(window.daily_limit as usize) as u64;
    let span = allowed_days.saturating_mul(7) / 4 + 7;
    let horizon = u64::try_from((NaiveDate::MAX - day).num_days()).unwrap_or(0);
    if span > horizon {
        return Err(out_of_range(count));
    }

    let mut on_day = 0u32;
    let mut out = Vec::new();

    while out.len() < count {
        if on_day >= window.daily_limit {
            day = day
                .checked_add_days(Days::new(1))
                .and_then(next_allowed_day)
                .ok_or_else(|| out_of_range(count))?;
            on_day = 0;
        }
        let minute = window.slot_minute(on_day);
        let naive = day
            .and_hms_opt(minute / 60, minute % 60, 0)
            .ok_or_else(|| {
                MailCadenceError::InvalidScheduleParameters(format!(
                    "slot {minute} minutes after midnight on {day}"
                ))
            })?;
        out.push(localize(&tz, naive)?.timestamp_millis());
        on_day += 1;
    }

    tracing::debug!(
        "🗓️ Scheduled {} slots from {} ({}/day, {}-{})",
        count,
        out.first().copied().unwrap_or_default(),
        window.daily_limit,
        params.window_start,
        params.window_end
    );
    Ok(out)
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earliest
/// instant; times inside a DST gap move forward to the first valid minute.
fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Ok(dt);
    }
    (1..=180)
        .find_map(|m| {
            let shifted = naive.checked_add_signed(Duration::minutes(m))?;
            tz.from_local_datetime(&shifted).earliest()
        })
        .ok_or_else(|| {
            MailCadenceError::InvalidScheduleParameters(format!(
                "local time {naive} does not exist in the configured time zone"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike, Utc};
    use std::collections::HashMap;

    fn params(start: &str, ws: &str, we: &str, limit: u32) -> ScheduleParams {
        ScheduleParams {
            start_date: Some(parse_date(start).unwrap()),
            window_start: ws.into(),
            window_end: we.into(),
            daily_limit: limit,
        }
    }

    /// Wednesday 2025-01-01 08:00 UTC.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
    }

    fn utc(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_monday_batch_spills_into_tuesday() {
        // 2025-01-06 is a Monday
        let p = params("2025-01-06", "09:00", "18:00", 3);
        let slots = schedule(5, &p, &now()).unwrap();
        let expected = [
            Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 6, 15, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 7, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 7, 12, 0, 0).unwrap(),
        ];
        let expected: Vec<i64> = expected.iter().map(|d| d.timestamp_millis()).collect();
        assert_eq!(slots, expected);
    }

    #[test]
    fn test_zero_count_is_empty() {
        let p = params("2025-01-06", "09:00", "18:00", 3);
        assert!(schedule(0, &p, &now()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_daily_limit_rejected() {
        let p = params("2025-01-06", "09:00", "18:00", 0);
        let err = schedule(5, &p, &now()).unwrap_err();
        assert!(matches!(err, MailCadenceError::InvalidScheduleParameters(_)));
        // rejected even when nothing would be scheduled
        assert!(schedule(0, &p, &now()).is_err());
    }

    #[test]
    fn test_malformed_times_rejected() {
        for (ws, we) in [("9am", "18:00"), ("09:00", "24:00"), ("12:60", "18:00"), ("", "18:00"), ("09:0", "18:00")] {
            let p = params("2025-01-06", ws, we, 3);
            assert!(
                matches!(
                    schedule(1, &p, &now()),
                    Err(MailCadenceError::InvalidScheduleParameters(_))
                ),
                "{ws}-{we} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_window_rejected() {
        let p = params("2025-01-06", "18:00", "09:00", 3);
        assert!(schedule(1, &p, &now()).is_err());
        let p = params("2025-01-06", "09:00", "09:00", 3);
        assert!(schedule(1, &p, &now()).is_err());
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("09:00").unwrap(), 540);
        assert_eq!(parse_time_of_day("9:30").unwrap(), 570);
        assert_eq!(parse_time_of_day(" 23:59 ").unwrap(), 1439);
        assert!(parse_time_of_day("0900").is_err());
    }

    #[test]
    fn test_past_start_clamps_to_today() {
        // today is Wednesday 2025-01-01
        let p = params("2024-06-03", "09:00", "18:00", 2);
        let slots = schedule(1, &p, &now()).unwrap();
        assert_eq!(utc(slots[0]), Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_start_defaults_to_today() {
        let mut p = params("2025-01-01", "10:00", "11:00", 1);
        p.start_date = None;
        let slots = schedule(1, &p, &now()).unwrap();
        assert_eq!(utc(slots[0]), Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_friday_start_moves_to_monday() {
        // 2025-01-10 is a Friday
        let p = params("2025-01-10", "09:00", "18:00", 2);
        let slots = schedule(1, &p, &now()).unwrap();
        assert_eq!(utc(slots[0]).date_naive(), parse_date("2025-01-13").unwrap());
    }

    #[test]
    fn test_thursday_overflow_skips_weekend() {
        // 2025-01-09 is a Thursday
        let p = params("2025-01-09", "09:00", "17:00", 2);
        let days: Vec<NaiveDate> = schedule(4, &p, &now())
            .unwrap()
            .into_iter()
            .map(|ms| utc(ms).date_naive())
            .collect();
        let thu = parse_date("2025-01-09").unwrap();
        let mon = parse_date("2025-01-13").unwrap();
        assert_eq!(days, vec![thu, thu, mon, mon]);
    }

    #[test]
    fn test_fractional_interval_truncates() {
        // 60 minutes / 7 slots
        let p = params("2025-01-06", "09:00", "10:00", 7);
        let minutes: Vec<u32> = schedule(7, &p, &now())
            .unwrap()
            .into_iter()
            .map(|ms| utc(ms).minute())
            .collect();
        assert_eq!(minutes, vec![0, 8, 17, 25, 34, 42, 51]);
        for ms in schedule(7, &p, &now()).unwrap() {
            assert_eq!(utc(ms).second(), 0);
            assert_eq!(ms % 1000, 0);
        }
    }

    #[test]
    fn test_respects_local_time_zone() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let now = ist.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let p = params("2025-01-06", "09:00", "18:00", 3);
        let slots = schedule(1, &p, &now).unwrap();
        let local = DateTime::from_timestamp_millis(slots[0]).unwrap().with_timezone(&ist);
        assert_eq!((local.hour(), local.minute()), (9, 0));
        assert_eq!(local.date_naive(), parse_date("2025-01-06").unwrap());
    }

    #[test]
    fn test_invariants_hold_across_inputs() {
        let windows = [("09:00", "18:00"), ("08:15", "08:45"), ("00:00", "23:59"), ("13:07", "13:10")];
        for (ws, we) in windows {
            for limit in [1u32, 2, 3, 7, 30, 100] {
                for count in [0usize, 1, 5, 29, 64] {
                    let p = params("2025-01-02", ws, we, limit);
                    let slots = schedule(count, &p, &now()).unwrap();
                    assert_eq!(slots.len(), count);
                    assert!(slots.windows(2).all(|w| w[0] <= w[1]));

                    let start = parse_time_of_day(ws).unwrap();
                    let end = parse_time_of_day(we).unwrap();
                    let mut per_day: HashMap<NaiveDate, u32> = HashMap::new();
                    for ms in &slots {
                        let dt = utc(*ms);
                        assert!(is_allowed_day(dt.date_naive()));
                        let minute = dt.hour() * 60 + dt.minute();
                        assert!(minute >= start && minute < end, "{ws}-{we} limit {limit}");
                        *per_day.entry(dt.date_naive()).or_default() += 1;
                    }
                    assert!(per_day.values().all(|n| *n <= limit));
                }
            }
        }
    }

    #[test]
    fn test_params_from_config() {
        let config = ScheduleConfig {
            start_date: Some("2025-01-06".into()),
            ..Default::default()
        };
        let p = ScheduleParams::from_config(&config).unwrap();
        assert_eq!(p.start_date, Some(parse_date("2025-01-06").unwrap()));
        assert_eq!(p.daily_limit, 30);

        let bad = ScheduleConfig {
            start_date: Some("06/01/2025".into()),
            ..Default::default()
        };
        assert!(ScheduleParams::from_config(&bad).is_err());
        assert_eq!(ScheduleParams::default().window_start, "09:00");
    }

    #[test]
    fn test_dst_gap_moves_to_first_valid_minute() {
        use chrono_tz::Asia::Tehran;
        // Tehran skipped 00:00-01:00 on Monday 2021-03-22
        let now = Tehran.with_ymd_and_hms(2021, 3, 20, 12, 0, 0).unwrap();
        let p = params("2021-03-22", "00:00", "02:00", 4);
        let slots = schedule(4, &p, &now).unwrap();
        let local: Vec<(u32, u32)> = slots
            .iter()
            .map(|ms| {
                let dt = utc(*ms).with_timezone(&Tehran);
                (dt.hour(), dt.minute())
            })
            .collect();
        assert_eq!(local, vec![(1, 0), (1, 0), (1, 0), (1, 30)]);
        let one_am = Utc.with_ymd_and_hms(2021, 3, 21, 20, 30, 0).unwrap();
        assert_eq!(slots[0], one_am.timestamp_millis());
        assert!(slots.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ambiguous_time_takes_earliest_instant() {
        use chrono_tz::Africa::Cairo;
        // Cairo repeats 23:00-24:00 on Thursday 2025-10-30 (+03:00, then +02:00)
        let now = Cairo.with_ymd_and_hms(2025, 10, 27, 10, 0, 0).unwrap();
        let p = params("2025-10-30", "23:30", "23:59", 1);
        let slots = schedule(1, &p, &now).unwrap();
        let earliest = Utc.with_ymd_and_hms(2025, 10, 30, 20, 30, 0).unwrap();
        assert_eq!(slots, vec![earliest.timestamp_millis()]);
    }

    #[test]
    fn test_huge_count_is_rejected_not_panicking() {
        let p = params("2025-01-06", "09:00", "18:00", 1);
        let err = schedule(usize::MAX, &p, &now()).unwrap_err();
        assert!(matches!(err, MailCadenceError::InvalidScheduleParameters(_)));
    }

    #[test]
    fn test_start_near_last_date_is_rejected() {
        let p = ScheduleParams {
            start_date: NaiveDate::MAX.checked_sub_days(Days::new(10)),
            daily_limit: 1,
            ..Default::default()
        };
        assert!(matches!(
            schedule(30, &p, &now()),
            Err(MailCadenceError::InvalidScheduleParameters(_))
        ));
    }
}
