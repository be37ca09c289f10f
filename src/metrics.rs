use crate::types::{CustomerAggregate, LoyaltyStats, ReviewRecord, ScalarMetrics};
use crate::util::{average, percentage};
use std::collections::HashSet;

pub const POSITIVE_THRESHOLD: f64 = 4.0;
pub const CRITICAL_THRESHOLD: f64 = 2.0;

pub fn is_positive(r: &ReviewRecord) -> bool {
    r.sentiment_score >= POSITIVE_THRESHOLD
}

pub fn is_critical(r: &ReviewRecord) -> bool {
    r.sentiment_score <= CRITICAL_THRESHOLD
}

/// Mean score of a view, 0 when empty.
pub fn average_rating(view: &[&ReviewRecord]) -> f64 {
    average(&view.iter().map(|r| r.sentiment_score).collect::<Vec<_>>())
}

pub fn compute_metrics(view: &[&ReviewRecord]) -> ScalarMetrics {
    let total_reviews = view.len();
    let positive = view.iter().filter(|r| is_positive(r)).count();
    let customers: HashSet<&str> = view.iter().map(|r| r.customer_id.as_str()).collect();
    ScalarMetrics {
        total_reviews,
        average_rating: average_rating(view),
        positive_rate: percentage(positive, total_reviews),
        critical_issues: view.iter().filter(|r| is_critical(r)).count(),
        unique_customers: customers.len(),
    }
}

/// Loyalty ratios for a view. `records` is the whole dataset: reviews per
/// customer and the feedback share are measured against it, while the
/// customer counts come from the view.
pub fn loyalty_stats(
    records: &[ReviewRecord],
    metrics: &ScalarMetrics,
    top_customers: &[CustomerAggregate],
) -> LoyaltyStats {
    let returning_customers = top_customers.iter().filter(|c| c.total_reviews > 1).count();
    let with_suggestions = records
        .iter()
        .filter(|r| !r.improvement_suggestions.trim().is_empty())
        .count();
    let reviews_per_customer = if metrics.unique_customers == 0 {
        0.0
    } else {
        records.len() as f64 / metrics.unique_customers as f64
    };
    LoyaltyStats {
        returning_customers,
        reviews_per_customer,
        return_rate: percentage(returning_customers, metrics.unique_customers),
        most_active_reviews: top_customers.first().map_or(0, |c| c.total_reviews),
        feedback_share: percentage(with_suggestions, records.len()),
    }
}
