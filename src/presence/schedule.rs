use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveTime, TimeZone, Weekday};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Which edge of the configured window fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEdge {
    Start,
    End,
}

/// Parses an "HH:MM" time-of-day string. Anything else yields `None`.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    let hours: u32 = h.trim().parse().ok()?;
    let minutes: u32 = m.trim().parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// Next weekday (Mon-Fri) occurrence of `time` strictly after `now`, in the
/// host's local timezone.
pub fn next_occurrence(now: DateTime<Local>, time: NaiveTime) -> DateTime<Local> {
    let mut date = now.date_naive();
    if now.time() >= time {
        date = date.succ_opt().expect("date out of range");
    }
    loop {
        let weekday = !matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        if weekday {
            match Local.from_local_datetime(&date.and_time(time)) {
                LocalResult::Single(dt) => return dt,
                LocalResult::Ambiguous(dt, _) => return dt,
                // The local time does not exist on this day (DST gap).
                LocalResult::None => {}
            }
        }
        date = date.succ_opt().expect("date out of range");
    }
}

#[derive(Default)]
struct EdgeJob {
    rule: Option<NaiveTime>,
    task: Option<JoinHandle<()>>,
}

/// Weekday-only recurring start/end triggers.
///
/// Each configured edge runs as a task sleeping until the rule's next
/// occurrence, then delivering a [`ScheduleEdge`] on the channel handed out
/// by [`Schedule::new`]. The owner reacts by toggling its enable flag; the
/// schedule itself never mutates anything.
pub struct Schedule {
    tx: mpsc::UnboundedSender<ScheduleEdge>,
    start: Mutex<EdgeJob>,
    end: Mutex<EdgeJob>,
}

impl Schedule {
    /// Builds the schedule and spawns jobs for whichever edges parse. Must be
    /// called within a tokio runtime.
    pub fn new(
        start: Option<&str>,
        end: Option<&str>,
    ) -> (Self, mpsc::UnboundedReceiver<ScheduleEdge>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let schedule = Self {
            tx,
            start: Mutex::new(EdgeJob::default()),
            end: Mutex::new(EdgeJob::default()),
        };
        schedule.apply(ScheduleEdge::Start, start);
        schedule.apply(ScheduleEdge::End, end);
        (schedule, rx)
    }

    /// Replaces the rules with the given edge times, clearing an edge when
    /// its time is absent. Returns whether any rule actually changed. Never
    /// fires a trigger immediately; only at the next natural occurrence.
    pub fn reschedule(&self, start: Option<&str>, end: Option<&str>) -> bool {
        let start_changed = self.apply(ScheduleEdge::Start, start);
        let end_changed = self.apply(ScheduleEdge::End, end);
        start_changed || end_changed
    }

    /// Next future firing instant of the start edge, for display.
    pub fn next_start(&self) -> Option<DateTime<Local>> {
        self.next(ScheduleEdge::Start)
    }

    /// Next future firing instant of the end edge, for display.
    pub fn next_end(&self) -> Option<DateTime<Local>> {
        self.next(ScheduleEdge::End)
    }

    fn next(&self, edge: ScheduleEdge) -> Option<DateTime<Local>> {
        let rule = self.job(edge).lock().expect("schedule lock poisoned").rule?;
        Some(next_occurrence(Local::now(), rule))
    }

    fn job(&self, edge: ScheduleEdge) -> &Mutex<EdgeJob> {
        match edge {
            ScheduleEdge::Start => &self.start,
            ScheduleEdge::End => &self.end,
        }
    }

    fn apply(&self, edge: ScheduleEdge, time: Option<&str>) -> bool {
        let rule = match time {
            Some(s) => match parse_time(s) {
                Some(t) => Some(t),
                None => {
                    warn!("Ignoring malformed schedule time {:?} for {:?} edge", s, edge);
                    None
                }
            },
            None => None,
        };

        let mut job = self.job(edge).lock().expect("schedule lock poisoned");
        if job.rule == rule {
            return false;
        }
        if let Some(task) = job.task.take() {
            task.abort();
        }
        job.rule = rule;
        if let Some(time) = rule {
            info!(
                "Schedule {:?} edge set to {} on weekdays; next firing at {}",
                edge,
                time,
                next_occurrence(Local::now(), time)
            );
            job.task = Some(self.spawn_job(edge, time));
        }
        true
    }

    fn spawn_job(&self, edge: ScheduleEdge, time: NaiveTime) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            loop {
                let now = Local::now();
                let next = next_occurrence(now, time);
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                if tx.send(edge).is_err() {
                    return;
                }
                // Skip past the minute that just fired so the recomputation
                // lands on the next occurrence, not this one again.
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        })
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        for job in [&self.start, &self.end] {
            if let Ok(mut job) = job.lock() {
                if let Some(task) = job.task.take() {
                    task.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_times() {
        assert_eq!(parse_time("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_time("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
    }

    #[test]
    fn rejects_malformed_times() {
        assert_eq!(parse_time(""), None);
        assert_eq!(parse_time("0900"), None);
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("09:61"), None);
        assert_eq!(parse_time("soon"), None);
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn same_day_when_time_is_still_ahead() {
        // 2024-01-08 was a Monday.
        let now = local(2024, 1, 8, 8, 0);
        let next = next_occurrence(now, parse_time("09:00").unwrap());
        assert_eq!(next, local(2024, 1, 8, 9, 0));
    }

    #[test]
    fn next_day_when_time_has_passed() {
        let now = local(2024, 1, 8, 9, 30);
        let next = next_occurrence(now, parse_time("09:00").unwrap());
        assert_eq!(next, local(2024, 1, 9, 9, 0));
    }

    #[test]
    fn exact_minute_rolls_to_the_next_day() {
        let now = local(2024, 1, 8, 9, 0);
        let next = next_occurrence(now, parse_time("09:00").unwrap());
        assert_eq!(next, local(2024, 1, 9, 9, 0));
    }

    #[test]
    fn weekends_are_skipped() {
        // 2024-01-12 was a Friday; 18:00 already past rolls to Monday.
        let now = local(2024, 1, 12, 19, 0);
        let next = next_occurrence(now, parse_time("18:00").unwrap());
        assert_eq!(next, local(2024, 1, 15, 18, 0));
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn saturday_rolls_to_monday() {
        let now = local(2024, 1, 13, 8, 0);
        let next = next_occurrence(now, parse_time("09:00").unwrap());
        assert_eq!(next, local(2024, 1, 15, 9, 0));
    }

    #[tokio::test]
    async fn reschedule_reports_changes() {
        let (schedule, _rx) = Schedule::new(Some("09:00"), Some("18:00"));

        assert!(!schedule.reschedule(Some("09:00"), Some("18:00")));
        assert!(schedule.reschedule(Some("10:00"), Some("18:00")));
        assert!(schedule.reschedule(Some("10:00"), None));
        assert!(!schedule.reschedule(Some("10:00"), None));
    }

    #[tokio::test]
    async fn malformed_time_disables_the_edge() {
        let (schedule, _rx) = Schedule::new(Some("nonsense"), Some("18:00"));
        assert_eq!(schedule.next_start(), None);
        assert!(schedule.next_end().is_some());
    }

    #[tokio::test]
    async fn next_instants_land_on_weekdays_at_the_rule_time() {
        let (schedule, _rx) = Schedule::new(Some("09:00"), None);
        let next = schedule.next_start().unwrap();
        assert!(next > Local::now());
        assert!(next.weekday().number_from_monday() <= 5);
        assert_eq!(next.time(), parse_time("09:00").unwrap());
    }
}
