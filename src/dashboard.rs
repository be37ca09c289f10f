//! Load state and view assembly.
//!
//! The dataset moves through `Idle -> Loading -> Ready | Failed`. Views are
//! only computed in `Ready`, always from scratch for the filter state passed
//! in, so repeated or out-of-order recomputation is harmless.

use crate::comments::{extract_comments, Category, CategoryComments};
use crate::error::{NotReady, Remediation};
use crate::filters::{filter_by_date_and_restaurant, filter_by_star_rating, unique_restaurants};
use crate::metrics::{compute_metrics, loyalty_stats};
use crate::reports::{
    category_scores, critical_reviews, customer_engagement, performance_indicators,
    performance_trends, seasonal_buckets, sentiment_distribution, top_customers,
};
use crate::types::{
    CategoryScores, CustomerAggregate, CustomerEngagement, FilterState, LoyaltyStats, MonthlyTrend,
    PerformanceIndicators, RatingBucket, RestaurantSummary, ReviewRecord, ScalarMetrics,
    SeasonalBucket, SummaryStats,
};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready(Vec<ReviewRecord>),
    Failed { message: String, remediation: String },
}

/// Every derived view for one filter state.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView<'a> {
    pub filtered: Vec<&'a ReviewRecord>,
    pub star_filtered: Vec<&'a ReviewRecord>,
    pub metrics: ScalarMetrics,
    pub distribution: Vec<RatingBucket>,
    pub critical: Vec<&'a ReviewRecord>,
    pub category_scores: CategoryScores,
    pub trends: Vec<MonthlyTrend>,
    pub indicators: PerformanceIndicators,
    /// Computed over the whole dataset, ignoring every filter.
    pub seasons: Vec<SeasonalBucket>,
    pub top_customers: Vec<CustomerAggregate>,
    pub engagement: CustomerEngagement,
    pub loyalty: LoyaltyStats,
}

impl<'a> DashboardView<'a> {
    pub fn comments(&self, category: Category) -> CategoryComments<'a> {
        extract_comments(&self.star_filtered, category)
    }

    pub fn summary_stats(&self, filter: &FilterState) -> SummaryStats {
        SummaryStats {
            metrics: self.metrics.clone(),
            category_scores: self.category_scores.clone(),
            loyalty: self.loyalty.clone(),
            indicators: self.indicators.clone(),
            engagement: self.engagement.clone(),
            from: filter.date_range.from,
            to: filter.date_range.to,
            selected_restaurants: filter.selected_restaurant_ids.iter().cloned().collect(),
            selected_star_ratings: filter.selected_star_ratings.iter().copied().collect(),
        }
    }
}

#[derive(Debug)]
pub struct Dashboard {
    state: LoadState,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        Self { state: LoadState::Idle }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn records(&self) -> Option<&[ReviewRecord]> {
        match &self.state {
            LoadState::Ready(records) => Some(records.as_slice()),
            _ => None,
        }
    }

    /// Run `load` and move to `Ready` or `Failed`. A failed reload of an
    /// already loaded dashboard keeps the previous data; the error is still
    /// returned to the caller.
    pub fn load_with<F, E>(&mut self, load: F) -> Result<usize, E>
    where
        F: FnOnce() -> Result<Vec<ReviewRecord>, E>,
        E: fmt::Display + Remediation,
    {
        let previous = std::mem::replace(&mut self.state, LoadState::Loading);
        match load() {
            Ok(records) => {
                let n = records.len();
                info!(records = n, "dashboard ready");
                self.state = LoadState::Ready(records);
                Ok(n)
            }
            Err(e) => {
                warn!(error = %e, "dashboard load failed");
                self.state = match previous {
                    ready @ LoadState::Ready(_) => ready,
                    _ => LoadState::Failed {
                        message: e.to_string(),
                        remediation: e.remediation().to_string(),
                    },
                };
                Err(e)
            }
        }
    }

    pub fn restaurants(&self) -> Result<Vec<RestaurantSummary>, NotReady> {
        self.records().map(unique_restaurants).ok_or(NotReady)
    }

    pub fn view(&self, filter: &FilterState) -> Result<DashboardView<'_>, NotReady> {
        let records = self.records().ok_or(NotReady)?;
        Ok(build_view(records, filter))
    }
}

pub fn build_view<'a>(records: &'a [ReviewRecord], filter: &FilterState) -> DashboardView<'a> {
    let filtered = filter_by_date_and_restaurant(records, filter);
    let star_filtered = filter_by_star_rating(&filtered, &filter.selected_star_ratings);
    let metrics = compute_metrics(&filtered);
    let top = top_customers(&filtered);
    let loyalty = loyalty_stats(records, &metrics, &top);
    let trends = performance_trends(&filtered);
    debug!(
        total = records.len(),
        filtered = filtered.len(),
        star_filtered = star_filtered.len(),
        "computed dashboard view"
    );
    DashboardView {
        distribution: sentiment_distribution(&filtered),
        critical: critical_reviews(&filtered),
        category_scores: category_scores(&filtered),
        indicators: performance_indicators(&trends),
        trends,
        seasons: seasonal_buckets(records),
        engagement: customer_engagement(&top),
        top_customers: top,
        loyalty,
        metrics,
        filtered,
        star_filtered,
    }
}
