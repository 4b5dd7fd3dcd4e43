pub mod store;

use chrono::{DateTime, Days, Duration, NaiveTime, TimeZone, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::correction::{CorrectionResult, SourceType};

const PREVIEW_CHARS: usize = 100;
// zone transitions fall on quarter hours
const DST_STEP_MINUTES: i64 = 15;

/// Time window offered by the history screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKeyword {
    All,
    Today,
    ThreeDays,
    Week,
}

impl FilterKeyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKeyword::All => "all",
            FilterKeyword::Today => "today",
            FilterKeyword::ThreeDays => "3days",
            FilterKeyword::Week => "week",
        }
    }

    /// Unrecognized keywords fall back to `all`.
    pub fn parse(value: &str) -> Self {
        match value {
            "all" => FilterKeyword::All,
            "today" => FilterKeyword::Today,
            "3days" => FilterKeyword::ThreeDays,
            "week" => FilterKeyword::Week,
            other => {
                debug!(filter = other, "unrecognized history filter, using all");
                FilterKeyword::All
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub owner: Uuid,
    pub content: String,
    pub result: CorrectionResult,
    pub source_type: SourceType,
    pub created_at: DateTime<Utc>,
}

/// Earliest `created_at` included by `filter`, evaluated at `now`.
///
/// Day windows use calendar arithmetic in `now`'s time zone, so `3days` at
/// 10:00 on March 1st is 10:00 on February 27th (or 26th in non-leap years).
pub fn cutoff_for<Tz: TimeZone>(filter: FilterKeyword, now: &DateTime<Tz>) -> DateTime<Tz> {
    match filter {
        FilterKeyword::Today => start_of_day(now),
        FilterKeyword::ThreeDays => days_before(now, 3),
        FilterKeyword::Week => days_before(now, 7),
        FilterKeyword::All => DateTime::<Utc>::default().with_timezone(&now.timezone()),
    }
}

/// First existing local instant of `now`'s day. When a DST jump skips
/// midnight this is the end of the gap.
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let zone = now.timezone();
    let local_now = now.naive_local();
    let mut candidate = now.date_naive().and_time(NaiveTime::MIN);

    while candidate <= local_now {
        if let Some(start) = zone.from_local_datetime(&candidate).earliest() {
            return start;
        }
        candidate += Duration::minutes(DST_STEP_MINUTES);
    }
    now.clone()
}

/// Same wall-clock time `days` calendar days earlier. If that time does not
/// exist locally the window is measured in elapsed hours instead.
fn days_before<Tz: TimeZone>(now: &DateTime<Tz>, days: u64) -> DateTime<Tz> {
    now.clone()
        .checked_sub_days(Days::new(days))
        .unwrap_or_else(|| now.clone() - Duration::days(days as i64))
}

/// Entries of `owner` inside the `filter` window, most recent first.
///
/// Works on unfiltered, unsorted input; equal timestamps keep their input order.
pub fn list<Tz: TimeZone>(
    entries: Vec<HistoryEntry>,
    owner: Uuid,
    filter: FilterKeyword,
    now: &DateTime<Tz>,
) -> Vec<HistoryEntry> {
    let cutoff = cutoff_for(filter, now).with_timezone(&Utc);

    let mut kept: Vec<HistoryEntry> = entries
        .into_iter()
        .filter(|entry| entry.owner == owner && entry.created_at >= cutoff)
        .collect();
    kept.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    kept
}

/// Short excerpt for list views.
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}
