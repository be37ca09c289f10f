//! Filter engine: date/restaurant and star-rating predicates over the full
//! record set, plus the helpers that build filter state (date presets,
//! restaurant listing).

use crate::types::{DateRange, FilterState, RestaurantSummary, ReviewRecord};
use crate::util::{friendly_restaurant_name, round_half_up};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use std::collections::{BTreeSet, HashMap};

/// Keep records inside the inclusive date range whose restaurant is
/// selected. An empty restaurant selection keeps every restaurant.
pub fn filter_by_date_and_restaurant<'a>(
    records: &'a [ReviewRecord],
    state: &FilterState,
) -> Vec<&'a ReviewRecord> {
    records
        .iter()
        .filter(|r| state.date_range.contains(r.timestamp))
        .filter(|r| {
            state.selected_restaurant_ids.is_empty()
                || state.selected_restaurant_ids.contains(&r.restaurant_id)
        })
        .collect()
}

/// Keep records whose rounded score is a selected rating. An empty
/// selection keeps nothing.
pub fn filter_by_star_rating<'a>(
    filtered: &[&'a ReviewRecord],
    selected: &BTreeSet<u8>,
) -> Vec<&'a ReviewRecord> {
    filtered
        .iter()
        .copied()
        .filter(|r| {
            let rounded = round_half_up(r.sentiment_score);
            u8::try_from(rounded).map_or(false, |star| selected.contains(&star))
        })
        .collect()
}

/// Distinct restaurants in the full dataset, most reviewed first. Ties keep
/// first-appearance order.
pub fn unique_restaurants(records: &[ReviewRecord]) -> Vec<RestaurantSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<RestaurantSummary> = Vec::new();
    for r in records {
        let slot = *index.entry(r.restaurant_id.as_str()).or_insert_with(|| {
            out.push(RestaurantSummary {
                id: r.restaurant_id.clone(),
                name: friendly_restaurant_name(&r.restaurant_id),
                review_count: 0,
            });
            out.len() - 1
        });
        out[slot].review_count += 1;
    }
    out.sort_by(|a, b| b.review_count.cmp(&a.review_count));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePreset {
    Today,
    Yesterday,
    Last7Days,
    #[default]
    Last30Days,
    ThisWeek,
    ThisMonth,
    Last90Days,
}

impl DatePreset {
    /// Resolve against `now`. Day boundaries are UTC.
    pub fn range(self, now: DateTime<Utc>) -> DateRange {
        let today = now.date_naive();
        let start_of = |days_back: i64| start_of_day(now - Duration::days(days_back));
        let to = end_of_day(now);
        match self {
            DatePreset::Today => DateRange::new(start_of(0), to),
            DatePreset::Yesterday => {
                let y = now - Duration::days(1);
                DateRange::new(start_of_day(y), end_of_day(y))
            }
            DatePreset::Last7Days => DateRange::new(start_of(7), to),
            DatePreset::Last30Days => DateRange::new(start_of(30), to),
            DatePreset::ThisWeek => {
                let back = today.weekday().num_days_from_monday() as i64;
                DateRange::new(start_of(back), to)
            }
            DatePreset::ThisMonth => {
                let back = (today.day() - 1) as i64;
                DateRange::new(start_of(back), to)
            }
            DatePreset::Last90Days => DateRange::new(start_of(90), to),
        }
    }
}

pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(at) + Duration::days(1) - Duration::milliseconds(1)
}
