//! Restaurant review analytics.
//!
//! A review export is normalized into [`types::ReviewRecord`]s once, then
//! every dashboard view is recomputed from scratch for the current
//! [`types::FilterState`]. Filtered text can optionally be summarized by an
//! external LLM through [`summarize::Summarizer`].

pub mod comments;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filters;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod reports;
pub mod summarize;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
