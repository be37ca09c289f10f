use crate::metrics::{average_rating, is_critical, is_positive};
use crate::types::{
    CategoryScores, CriticalReviewRow, CustomerAggregate, CustomerEngagement, CustomerRow,
    DistributionRow, MonthlyTrend, PerformanceIndicators, RatingBucket, ReviewRecord, Season,
    SeasonRow, SeasonalBucket, Segment, TrendDelta, TrendRow, ALL_STAR_RATINGS,
};
use crate::util::{average, format_number, percentage, round_half_up};
use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeMap, HashMap};

pub const CRITICAL_REVIEW_LIMIT: usize = 5;
pub const TREND_MONTHS: usize = 6;
pub const TOP_CUSTOMER_LIMIT: usize = 10;
pub const HIGHLY_ENGAGED_REVIEWS: usize = 3;
pub const MAX_CONSISTENCY: f64 = 5.0;

// Applied when no review in the view has text for the category.
pub const FOOD_PENALTY: f64 = 0.9;
pub const SERVICE_PENALTY: f64 = 0.95;
pub const ATMOSPHERE_PENALTY: f64 = 0.85;
pub const ENTERTAINMENT_PENALTY: f64 = 0.8;

/// Count per rounded rating, always five buckets in rating order.
pub fn sentiment_distribution(view: &[&ReviewRecord]) -> Vec<RatingBucket> {
    ALL_STAR_RATINGS
        .iter()
        .map(|&rating| RatingBucket {
            rating,
            count: view
                .iter()
                .filter(|r| round_half_up(r.sentiment_score) == rating as i64)
                .count(),
        })
        .collect()
}

/// The most recent critical reviews, newest first.
pub fn critical_reviews<'a>(view: &[&'a ReviewRecord]) -> Vec<&'a ReviewRecord> {
    let mut critical: Vec<&ReviewRecord> =
        view.iter().copied().filter(|r| is_critical(r)).collect();
    critical.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    critical.truncate(CRITICAL_REVIEW_LIMIT);
    critical
}

/// Every category shares the view's mean score; a category without any
/// text feedback is discounted by its fixed penalty.
pub fn category_scores(view: &[&ReviewRecord]) -> CategoryScores {
    let avg = average_rating(view);
    let score = |has_text: fn(&ReviewRecord) -> bool, penalty: f64| {
        if view.iter().any(|r| has_text(r)) {
            avg
        } else {
            avg * penalty
        }
    };
    CategoryScores {
        food: score(|r: &ReviewRecord| !r.food_quality.trim().is_empty(), FOOD_PENALTY),
        service: score(|r: &ReviewRecord| !r.service.trim().is_empty(), SERVICE_PENALTY),
        atmosphere: score(|r: &ReviewRecord| !r.atmosphere.trim().is_empty(), ATMOSPHERE_PENALTY),
        entertainment: score(
            |r: &ReviewRecord| !r.music_and_entertainment.trim().is_empty(),
            ENTERTAINMENT_PENALTY,
        ),
    }
}

/// Monthly rollup of the view, oldest first, limited to the latest months.
pub fn performance_trends(view: &[&ReviewRecord]) -> Vec<MonthlyTrend> {
    let mut by_month: BTreeMap<String, Vec<&ReviewRecord>> = BTreeMap::new();
    for &r in view {
        by_month
            .entry(r.timestamp.format("%Y-%m").to_string())
            .or_default()
            .push(r);
    }
    let mut trends: Vec<MonthlyTrend> = by_month
        .into_iter()
        .map(|(month, reviews)| MonthlyTrend {
            month,
            average_rating: average_rating(&reviews),
            total_reviews: reviews.len(),
            positive_rate: percentage(
                reviews.iter().filter(|r| is_positive(r)).count(),
                reviews.len(),
            ),
        })
        .collect();
    let skip = trends.len().saturating_sub(TREND_MONTHS);
    trends.split_off(skip)
}

/// Change of each month against the previous entry of `trends`.
pub fn trend_deltas(trends: &[MonthlyTrend]) -> Vec<TrendDelta> {
    trends
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let (rating_change, volume_change) = match i.checked_sub(1).map(|p| &trends[p]) {
                Some(prev) => (
                    t.average_rating - prev.average_rating,
                    t.total_reviews as i64 - prev.total_reviews as i64,
                ),
                None => (0.0, 0),
            };
            TrendDelta {
                month: t.month.clone(),
                rating_change,
                volume_change,
            }
        })
        .collect()
}

/// Headline figures over the trend window. Ties for the best month keep
/// the earliest one.
pub fn performance_indicators(trends: &[MonthlyTrend]) -> PerformanceIndicators {
    if trends.is_empty() {
        return PerformanceIndicators::default();
    }

    let monthly_growth = match trends {
        [.., prev, last] if prev.total_reviews > 0 => {
            (last.total_reviews as f64 / prev.total_reviews as f64 - 1.0) * 100.0
        }
        _ => 0.0,
    };

    let mut best = &trends[0];
    for t in &trends[1..] {
        if t.average_rating > best.average_rating {
            best = t;
        }
    }

    let drift: f64 = trends
        .windows(2)
        .map(|w| (w[1].average_rating - w[0].average_rating).abs())
        .sum();
    let steps = (trends.len() - 1).max(1);

    PerformanceIndicators {
        monthly_growth,
        best_month: Some(best.month.clone()),
        consistency_score: MAX_CONSISTENCY - drift / steps as f64,
        peak_rating: trends
            .iter()
            .map(|t| t.average_rating)
            .fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Count and mean score per meteorological season. Called with the whole
/// dataset, not the filtered view.
pub fn seasonal_buckets(records: &[ReviewRecord]) -> Vec<SeasonalBucket> {
    let mut scores: HashMap<Season, Vec<f64>> = HashMap::new();
    for r in records {
        scores
            .entry(Season::of_month(r.timestamp.month()))
            .or_default()
            .push(r.sentiment_score);
    }
    Season::ALL
        .iter()
        .map(|&season| {
            let s = scores.get(&season).map(Vec::as_slice).unwrap_or(&[]);
            SeasonalBucket {
                season,
                review_count: s.len(),
                average_rating: average(s),
            }
        })
        .collect()
}

/// Customers ranked by review count. Ties keep first-appearance order.
pub fn top_customers(view: &[&ReviewRecord]) -> Vec<CustomerAggregate> {
    struct Acc<'a> {
        first: &'a ReviewRecord,
        scores: Vec<f64>,
        last_visit: DateTime<Utc>,
    }

    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Acc> = Vec::new();
    for &r in view {
        match index.get(r.customer_id.as_str()) {
            Some(&slot) => {
                let acc = &mut groups[slot];
                acc.scores.push(r.sentiment_score);
                acc.last_visit = acc.last_visit.max(r.timestamp);
            }
            None => {
                index.insert(r.customer_id.as_str(), groups.len());
                groups.push(Acc {
                    first: r,
                    scores: vec![r.sentiment_score],
                    last_visit: r.timestamp,
                });
            }
        }
    }

    let mut customers: Vec<CustomerAggregate> = groups
        .into_iter()
        .map(|acc| CustomerAggregate {
            customer_id: acc.first.customer_id.clone(),
            customer_name: acc.first.customer_name.clone(),
            customer_email: acc.first.customer_email.clone(),
            total_reviews: acc.scores.len(),
            average_rating: average(&acc.scores),
            last_visit: acc.last_visit,
        })
        .collect();
    customers.sort_by(|a, b| b.total_reviews.cmp(&a.total_reviews));
    customers.truncate(TOP_CUSTOMER_LIMIT);
    customers
}

/// Split the ranked customers by how often they reviewed. Percentages are
/// of `top.len()`, 0 when the list is empty.
pub fn customer_engagement(top: &[CustomerAggregate]) -> CustomerEngagement {
    let segment = |keep: &dyn Fn(usize) -> bool| {
        let customers = top.iter().filter(|c| keep(c.total_reviews)).count();
        Segment {
            customers,
            percent: percentage(customers, top.len()),
        }
    };
    CustomerEngagement {
        single_review: segment(&|n| n == 1),
        repeat: segment(&|n| n > 1),
        highly_engaged: segment(&|n| n >= HIGHLY_ENGAGED_REVIEWS),
    }
}

pub fn distribution_rows(buckets: &[RatingBucket]) -> Vec<DistributionRow> {
    let total: usize = buckets.iter().map(|b| b.count).sum();
    buckets
        .iter()
        .rev()
        .map(|b| DistributionRow {
            rating: b.rating,
            count: b.count,
            share: format!("{}%", format_number(percentage(b.count, total), 1)),
        })
        .collect()
}

pub fn trend_rows(trends: &[MonthlyTrend]) -> Vec<TrendRow> {
    trends
        .iter()
        .zip(trend_deltas(trends))
        .map(|(t, d)| TrendRow {
            month: t.month.clone(),
            average_rating: format_number(t.average_rating, 2),
            total_reviews: t.total_reviews,
            positive_rate: format_number(t.positive_rate, 1),
            rating_change: signed(d.rating_change, 2),
            volume_change: signed(d.volume_change as f64, 0),
        })
        .collect()
}

fn signed(value: f64, decimals: usize) -> String {
    if value > 0.0 {
        format!("+{}", format_number(value, decimals))
    } else {
        format_number(value, decimals)
    }
}

pub fn season_rows(buckets: &[SeasonalBucket]) -> Vec<SeasonRow> {
    buckets
        .iter()
        .map(|b| SeasonRow {
            season: b.season.label().to_string(),
            review_count: b.review_count,
            average_rating: format_number(b.average_rating, 2),
        })
        .collect()
}

pub fn customer_rows(customers: &[CustomerAggregate]) -> Vec<CustomerRow> {
    customers
        .iter()
        .enumerate()
        .map(|(idx, c)| CustomerRow {
            rank: idx + 1,
            customer_name: c.customer_name.clone(),
            customer_email: c.customer_email.clone(),
            total_reviews: c.total_reviews,
            average_rating: format_number(c.average_rating, 1),
            last_visit: c.last_visit.format("%Y-%m-%d").to_string(),
        })
        .collect()
}

pub fn critical_rows(reviews: &[&ReviewRecord]) -> Vec<CriticalReviewRow> {
    reviews
        .iter()
        .map(|r| CriticalReviewRow {
            date: r.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            customer_name: r.customer_name.clone(),
            restaurant_id: r.restaurant_id.clone(),
            sentiment_score: format_number(r.sentiment_score, 1),
            summary: r.summary.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, review};

    fn refs(data: &[ReviewRecord]) -> Vec<&ReviewRecord> {
        data.iter().collect()
    }

    #[test]
    fn distribution_has_five_buckets_summing_to_view() {
        let data: Vec<ReviewRecord> = [1.0, 1.4, 2.5, 4.49, 4.5, 5.0, 3.0]
            .iter()
            .enumerate()
            .map(|(i, s)| review(&i.to_string(), "c", *s, at(2024, 1, 1)))
            .collect();
        let buckets = sentiment_distribution(&refs(&data));
        let counts: Vec<usize> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 0, 2, 1, 2]);
        assert_eq!(counts.iter().sum::<usize>(), data.len());

        let empty = sentiment_distribution(&[]);
        assert_eq!(empty.len(), 5);
        assert!(empty.iter().all(|b| b.count == 0));
    }

    #[test]
    fn critical_reviews_are_newest_first_and_capped() {
        let data: Vec<ReviewRecord> = (1..=8)
            .map(|d| {
                let score = if d == 4 { 3.0 } else { 1.0 };
                review(&format!("r{}", d), "c", score, at(2024, 2, d))
            })
            .collect();
        let critical = critical_reviews(&refs(&data));
        let ids: Vec<&str> = critical.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r8", "r7", "r6", "r5", "r3"]);
    }

    #[test]
    fn category_penalties_apply_without_text() {
        let mut a = review("a", "c", 4.0, at(2024, 1, 1));
        a.food_quality = "Tasty".into();
        a.service = "   ".into();
        let b = review("b", "c", 2.0, at(2024, 1, 2));
        let data = vec![a, b];
        let scores = category_scores(&refs(&data));
        assert_eq!(scores.food, 3.0);
        assert!((scores.service - 3.0 * 0.95).abs() < 1e-9);
        assert!((scores.atmosphere - 3.0 * 0.85).abs() < 1e-9);
        assert!((scores.entertainment - 3.0 * 0.8).abs() < 1e-9);

        assert_eq!(category_scores(&[]), CategoryScores::default());
    }

    #[test]
    fn trends_keep_last_six_months_in_order() {
        let data: Vec<ReviewRecord> = (1..=8)
            .flat_map(|m| {
                vec![
                    review(&format!("{}a", m), "c", 5.0, at(2024, m, 3)),
                    review(&format!("{}b", m), "c", 2.0, at(2024, m, 9)),
                ]
            })
            .collect();
        let trends = performance_trends(&refs(&data));
        let months: Vec<&str> = trends.iter().map(|t| t.month.as_str()).collect();
        assert_eq!(months, vec!["2024-03", "2024-04", "2024-05", "2024-06", "2024-07", "2024-08"]);
        assert_eq!(trends[0].total_reviews, 2);
        assert_eq!(trends[0].average_rating, 3.5);
        assert_eq!(trends[0].positive_rate, 50.0);
    }

    #[test]
    fn trends_sort_across_years() {
        let data = vec![
            review("a", "c", 4.0, at(2024, 1, 5)),
            review("b", "c", 4.0, at(2023, 12, 5)),
        ];
        let months: Vec<String> =
            performance_trends(&refs(&data)).into_iter().map(|t| t.month).collect();
        assert_eq!(months, vec!["2023-12", "2024-01"]);
    }

    #[test]
    fn seasons_cover_every_month() {
        let data = vec![
            review("a", "c", 5.0, at(2024, 3, 1)),
            review("b", "c", 3.0, at(2024, 5, 1)),
            review("c", "c", 2.0, at(2024, 7, 1)),
            review("d", "c", 1.0, at(2024, 12, 1)),
            review("e", "c", 3.0, at(2024, 1, 1)),
        ];
        let seasons = seasonal_buckets(&data);
        assert_eq!(seasons.len(), 4);
        assert_eq!(seasons[0].season, Season::Spring);
        assert_eq!(seasons[0].review_count, 2);
        assert_eq!(seasons[0].average_rating, 4.0);
        assert_eq!(seasons[1].review_count, 1);
        assert_eq!(seasons[2].review_count, 0);
        assert_eq!(seasons[2].average_rating, 0.0);
        assert_eq!(seasons[3].review_count, 2);
        assert_eq!(seasons[3].average_rating, 2.0);
    }

    #[test]
    fn top_customers_ranked_and_capped() {
        let mut data = Vec::new();
        for c in 0..12 {
            for n in 0..=c {
                let day = at(2024, 1, 1 + n as u32);
                data.push(review(&format!("{}-{}", c, n), &format!("c{}", c), 4.0, day));
            }
        }
        let top = top_customers(&refs(&data));
        assert_eq!(top.len(), TOP_CUSTOMER_LIMIT);
        assert_eq!(top[0].customer_id, "c11");
        assert_eq!(top[0].total_reviews, 12);
        assert_eq!(top[0].last_visit, at(2024, 1, 12));
        assert!(top.windows(2).all(|w| w[0].total_reviews >= w[1].total_reviews));
    }

    #[test]
    fn top_customer_details_come_from_first_review() {
        let mut first = review("a", "c1", 5.0, at(2024, 3, 1));
        first.customer_name = "Ana".into();
        let mut second = review("b", "c1", 1.0, at(2024, 1, 1));
        second.customer_name = "Ana M.".into();
        let data = vec![first, second];
        let top = top_customers(&refs(&data));
        assert_eq!(top[0].customer_name, "Ana");
        assert_eq!(top[0].average_rating, 3.0);
        assert_eq!(top[0].last_visit, at(2024, 3, 1));
    }

    fn month(month: &str, average_rating: f64, total_reviews: usize) -> MonthlyTrend {
        MonthlyTrend {
            month: month.into(),
            average_rating,
            total_reviews,
            positive_rate: 0.0,
        }
    }

    fn ranked(counts: &[usize]) -> Vec<CustomerAggregate> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &n)| CustomerAggregate {
                customer_id: format!("c{}", i),
                customer_name: String::new(),
                customer_email: String::new(),
                total_reviews: n,
                average_rating: 4.0,
                last_visit: at(2024, 1, 1),
            })
            .collect()
    }

    #[test]
    fn indicators_over_three_months() {
        let trends = vec![
            month("2024-01", 3.0, 4),
            month("2024-02", 4.5, 10),
            month("2024-03", 4.0, 5),
        ];
        let ind = performance_indicators(&trends);
        assert_eq!(ind.monthly_growth, -50.0);
        assert_eq!(ind.best_month.as_deref(), Some("2024-02"));
        assert_eq!(ind.consistency_score, 4.0);
        assert_eq!(ind.peak_rating, 4.5);
    }

    #[test]
    fn indicators_for_short_windows() {
        let empty = performance_indicators(&[]);
        assert_eq!(empty.monthly_growth, 0.0);
        assert_eq!(empty.best_month, None);
        assert_eq!(empty.consistency_score, 5.0);
        assert_eq!(empty.peak_rating, 0.0);

        let single = performance_indicators(&[month("2024-05", 3.5, 2)]);
        assert_eq!(single.monthly_growth, 0.0);
        assert_eq!(single.best_month.as_deref(), Some("2024-05"));
        assert_eq!(single.consistency_score, 5.0);
        assert_eq!(single.peak_rating, 3.5);
    }

    #[test]
    fn best_month_tie_keeps_earliest() {
        let trends = vec![month("2024-01", 4.0, 1), month("2024-02", 4.0, 1)];
        assert_eq!(performance_indicators(&trends).best_month.as_deref(), Some("2024-01"));
    }

    #[test]
    fn deltas_compare_with_previous_month() {
        let trends = vec![
            month("2024-01", 3.0, 4),
            month("2024-02", 4.5, 10),
            month("2024-03", 4.0, 5),
        ];
        let deltas = trend_deltas(&trends);
        assert_eq!(deltas[0].rating_change, 0.0);
        assert_eq!(deltas[0].volume_change, 0);
        assert_eq!(deltas[1].rating_change, 1.5);
        assert_eq!(deltas[1].volume_change, 6);
        assert_eq!(deltas[2].rating_change, -0.5);
        assert_eq!(deltas[2].volume_change, -5);

        let rows = trend_rows(&trends);
        assert_eq!(rows[0].rating_change, "0.00");
        assert_eq!(rows[1].rating_change, "+1.50");
        assert_eq!(rows[1].volume_change, "+6");
        assert_eq!(rows[2].volume_change, "-5");
    }

    #[test]
    fn engagement_segments_are_shares_of_ranked_list() {
        let e = customer_engagement(&ranked(&[5, 3, 2, 1]));
        assert_eq!(e.single_review, Segment { customers: 1, percent: 25.0 });
        assert_eq!(e.repeat, Segment { customers: 3, percent: 75.0 });
        assert_eq!(e.highly_engaged, Segment { customers: 2, percent: 50.0 });

        assert_eq!(customer_engagement(&[]), CustomerEngagement::default());
    }

    #[test]
    fn distribution_rows_list_highest_rating_first() {
        let buckets = vec![
            RatingBucket { rating: 1, count: 1 },
            RatingBucket { rating: 2, count: 0 },
            RatingBucket { rating: 3, count: 0 },
            RatingBucket { rating: 4, count: 0 },
            RatingBucket { rating: 5, count: 3 },
        ];
        let rows = distribution_rows(&buckets);
        assert_eq!(rows[0].rating, 5);
        assert_eq!(rows[0].share, "75.0%");
        assert_eq!(rows[4].share, "25.0%");
    }
}
