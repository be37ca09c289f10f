use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tabled::Tabled;

/// One spreadsheet row as exported to CSV. Every column is optional and read
/// as text; typing happens in the normalizer.
#[derive(Debug, Default, Deserialize)]
pub struct RawRow {
    pub id: Option<String>,
    pub review_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub summary: Option<String>,
    pub food_quality: Option<String>,
    pub service: Option<String>,
    pub atmosphere: Option<String>,
    pub music_and_entertainment: Option<String>,
    pub sentiment_score: Option<String>,
    pub timestamp: Option<String>,
    pub improvement_suggestions: Option<String>,
    pub specific_points: Option<String>,
    pub restaurant_id: Option<String>,
}

/// A fully populated review. Never mutated after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub id: String,
    pub review_id: String,
    pub customer_id: String,
    pub restaurant_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub summary: String,
    pub food_quality: String,
    pub service: String,
    pub atmosphere: String,
    pub music_and_entertainment: String,
    pub improvement_suggestions: String,
    pub specific_points: String,
    pub sentiment_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Inclusive instant range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

/// Current dashboard filter selection.
///
/// An empty restaurant set means every restaurant; an empty star set means
/// no rating is selected and star-filtered views come out empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub date_range: DateRange,
    pub selected_restaurant_ids: BTreeSet<String>,
    pub selected_star_ratings: BTreeSet<u8>,
}

pub const ALL_STAR_RATINGS: [u8; 5] = [1, 2, 3, 4, 5];

impl FilterState {
    /// No restaurant restriction and every star rating selected.
    pub fn new(date_range: DateRange) -> Self {
        Self {
            date_range,
            selected_restaurant_ids: BTreeSet::new(),
            selected_star_ratings: ALL_STAR_RATINGS.into_iter().collect(),
        }
    }

    pub fn toggle_restaurant(&mut self, restaurant_id: &str) {
        if !self.selected_restaurant_ids.remove(restaurant_id) {
            self.selected_restaurant_ids.insert(restaurant_id.to_string());
        }
    }

    pub fn clear_restaurant_filter(&mut self) {
        self.selected_restaurant_ids.clear();
    }

    /// Ratings outside 1..=5 are ignored.
    pub fn toggle_star_rating(&mut self, rating: u8) {
        if !ALL_STAR_RATINGS.contains(&rating) {
            return;
        }
        if !self.selected_star_ratings.remove(&rating) {
            self.selected_star_ratings.insert(rating);
        }
    }

    pub fn select_all_star_ratings(&mut self) {
        self.selected_star_ratings = ALL_STAR_RATINGS.into_iter().collect();
    }

    pub fn clear_star_ratings(&mut self) {
        self.selected_star_ratings.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScalarMetrics {
    pub total_reviews: usize,
    pub average_rating: f64,
    pub positive_rate: f64,
    pub critical_issues: usize,
    pub unique_customers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingBucket {
    pub rating: u8,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryScores {
    pub food: f64,
    pub service: f64,
    pub atmosphere: f64,
    pub entertainment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    /// `YYYY-MM`, UTC.
    pub month: String,
    pub average_rating: f64,
    pub total_reviews: usize,
    pub positive_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Fall, Season::Winter];

    pub fn label(self) -> &'static str {
        match self {
            Season::Spring => "Spring (Mar-May)",
            Season::Summer => "Summer (Jun-Aug)",
            Season::Fall => "Fall (Sep-Nov)",
            Season::Winter => "Winter (Dec-Feb)",
        }
    }

    /// Calendar month numbered 1..=12.
    pub fn of_month(month: u32) -> Season {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalBucket {
    pub season: Season,
    pub review_count: usize,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerAggregate {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub total_reviews: usize,
    pub average_rating: f64,
    pub last_visit: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestaurantSummary {
    pub id: String,
    pub name: String,
    pub review_count: usize,
}

/// Customer-facing ratios. `reviews_per_customer` and `feedback_share` are
/// taken over the whole dataset; the rest over the filtered view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoyaltyStats {
    /// Ranked customers with more than one review.
    pub returning_customers: usize,
    pub reviews_per_customer: f64,
    /// `returning_customers` as a percentage of unique customers in the view.
    pub return_rate: f64,
    /// Review count of the top ranked customer.
    pub most_active_reviews: usize,
    /// Percentage of all reviews carrying an improvement suggestion.
    pub feedback_share: f64,
}

/// Month-over-month change of one trend entry; zero for the first month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendDelta {
    pub month: String,
    pub rating_change: f64,
    pub volume_change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceIndicators {
    /// Review volume of the latest month against the one before, in percent.
    pub monthly_growth: f64,
    pub best_month: Option<String>,
    /// 5 minus the mean absolute month-over-month rating change.
    pub consistency_score: f64,
    pub peak_rating: f64,
}

impl Default for PerformanceIndicators {
    fn default() -> Self {
        Self {
            monthly_growth: 0.0,
            best_month: None,
            consistency_score: 5.0,
            peak_rating: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Segment {
    pub customers: usize,
    /// Share of the ranked customer list.
    pub percent: f64,
}

/// How the ranked customers split by review count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerEngagement {
    pub single_review: Segment,
    pub repeat: Segment,
    pub highly_engaged: Segment,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DistributionRow {
    #[serde(rename = "Rating")]
    #[tabled(rename = "Rating")]
    pub rating: u8,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Share")]
    #[tabled(rename = "Share")]
    pub share: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct TrendRow {
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: String,
    #[serde(rename = "AvgRating")]
    #[tabled(rename = "AvgRating")]
    pub average_rating: String,
    #[serde(rename = "TotalReviews")]
    #[tabled(rename = "TotalReviews")]
    pub total_reviews: usize,
    #[serde(rename = "PositiveRate")]
    #[tabled(rename = "PositiveRate")]
    pub positive_rate: String,
    #[serde(rename = "RatingChange")]
    #[tabled(rename = "RatingChange")]
    pub rating_change: String,
    #[serde(rename = "VolumeChange")]
    #[tabled(rename = "VolumeChange")]
    pub volume_change: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SeasonRow {
    #[serde(rename = "Season")]
    #[tabled(rename = "Season")]
    pub season: String,
    #[serde(rename = "Reviews")]
    #[tabled(rename = "Reviews")]
    pub review_count: usize,
    #[serde(rename = "AvgRating")]
    #[tabled(rename = "AvgRating")]
    pub average_rating: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CustomerRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Customer")]
    #[tabled(rename = "Customer")]
    pub customer_name: String,
    #[serde(rename = "Email")]
    #[tabled(rename = "Email")]
    pub customer_email: String,
    #[serde(rename = "Reviews")]
    #[tabled(rename = "Reviews")]
    pub total_reviews: usize,
    #[serde(rename = "AvgRating")]
    #[tabled(rename = "AvgRating")]
    pub average_rating: String,
    #[serde(rename = "LastVisit")]
    #[tabled(rename = "LastVisit")]
    pub last_visit: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CriticalReviewRow {
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: String,
    #[serde(rename = "Customer")]
    #[tabled(rename = "Customer")]
    pub customer_name: String,
    #[serde(rename = "Restaurant")]
    #[tabled(rename = "Restaurant")]
    pub restaurant_id: String,
    #[serde(rename = "Score")]
    #[tabled(rename = "Score")]
    pub sentiment_score: String,
    #[serde(rename = "Summary")]
    #[tabled(rename = "Summary")]
    pub summary: String,
}

/// Written to `summary.json`.
#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub metrics: ScalarMetrics,
    pub category_scores: CategoryScores,
    pub loyalty: LoyaltyStats,
    pub indicators: PerformanceIndicators,
    pub engagement: CustomerEngagement,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub selected_restaurants: Vec<String>,
    pub selected_star_ratings: Vec<u8>,
}
