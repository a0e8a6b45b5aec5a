// src/sched/cron.rs
//! Five-field cron expressions (minute hour day-of-month month
//! day-of-week), the subset the trigger policies need: `*`, numbers,
//! ranges, lists and `*/n` steps. Day-of-week uses 0 = Sunday.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};

#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: u64,
    hours: u32,
    days_of_month: u32,
    months: u16,
    days_of_week: u8,
    dom_star: bool,
    dow_star: bool,
    expr: String,
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<u64> {
    let mut mask: u64 = 0;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => (
                r,
                s.parse::<u32>()
                    .with_context(|| format!("bad step in '{part}'"))?,
            ),
            None => (part, 1),
        };
        if step == 0 {
            bail!("step of 0 in '{part}'");
        }
        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                a.parse::<u32>().with_context(|| format!("bad range in '{part}'"))?,
                b.parse::<u32>().with_context(|| format!("bad range in '{part}'"))?,
            )
        } else {
            let v = range
                .parse::<u32>()
                .with_context(|| format!("bad value in '{part}'"))?;
            (v, v)
        };
        if lo < min || hi > max || lo > hi {
            bail!("value out of range in '{part}' (allowed {min}-{max})");
        }
        let mut v = lo;
        while v <= hi {
            mask |= 1u64 << v;
            v += step;
        }
    }
    Ok(mask)
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            bail!("cron expression needs 5 fields, got {}: '{expr}'", fields.len());
        }
        Ok(Self {
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)? as u32,
            days_of_month: parse_field(fields[2], 1, 31)? as u32,
            months: parse_field(fields[3], 1, 12)? as u16,
            days_of_week: parse_field(fields[4], 0, 6)? as u8,
            dom_star: fields[2] == "*",
            dow_star: fields[4] == "*",
            expr: expr.to_string(),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom_ok = self.days_of_month & (1 << t.day()) != 0;
        let dow_ok = self.days_of_week & (1 << t.weekday().num_days_from_sunday()) != 0;
        // Standard cron rule: when both day fields are restricted,
        // either may satisfy the schedule.
        match (self.dom_star, self.dow_star) {
            (false, false) => dom_ok || dow_ok,
            (false, true) => dom_ok,
            (true, false) => dow_ok,
            (true, true) => true,
        }
    }

    pub fn matches(&self, t: &DateTime<Utc>) -> bool {
        self.minutes & (1u64 << t.minute()) != 0
            && self.hours & (1 << t.hour()) != 0
            && self.months & (1 << t.month()) != 0
            && self.day_matches(t)
    }

    /// First matching minute strictly after `after`. Bounded to a
    /// ~400-day scan so an unsatisfiable spec (e.g. Feb 31) returns
    /// None instead of spinning.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = Utc
            .with_ymd_and_hms(after.year(), after.month(), after.day(), after.hour(), after.minute(), 0)
            .single()?
            + ChronoDuration::minutes(1);
        let horizon = after + ChronoDuration::days(400);

        while t <= horizon {
            if self.months & (1 << t.month()) == 0 || !self.day_matches(&t) {
                // skip to the start of the next day
                t = Utc
                    .with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0)
                    .single()?
                    + ChronoDuration::days(1);
                continue;
            }
            if self.hours & (1 << t.hour()) == 0 {
                t = Utc
                    .with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), 0, 0)
                    .single()?
                    + ChronoDuration::hours(1);
                continue;
            }
            if self.minutes & (1u64 << t.minute()) == 0 {
                t += ChronoDuration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }
}

impl std::fmt::Display for CronExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}
