use crate::types::ReviewRecord;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Free-text feedback dimension of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Service,
    Atmosphere,
    Music,
    Specific,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Food,
        Category::Service,
        Category::Atmosphere,
        Category::Music,
        Category::Specific,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Service => "service",
            Category::Atmosphere => "atmosphere",
            Category::Music => "music",
            Category::Specific => "specific",
        }
    }

    /// Human-readable subject used in prompts and headings.
    pub fn subject(self) -> &'static str {
        match self {
            Category::Food => "food quality",
            Category::Service => "service",
            Category::Atmosphere => "atmosphere",
            Category::Music => "music and entertainment",
            Category::Specific => "specific points",
        }
    }

    pub fn text(self, r: &ReviewRecord) -> &str {
        match self {
            Category::Food => &r.food_quality,
            Category::Service => &r.service,
            Category::Atmosphere => &r.atmosphere,
            Category::Music => &r.music_and_entertainment,
            Category::Specific => &r.specific_points,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Non-empty comments for one category, in view order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryComments<'a> {
    pub category: Category,
    pub comments: Vec<&'a str>,
}

impl<'a> CategoryComments<'a> {
    /// Untruncated number of comments; a summary is only requested when
    /// this is non-zero.
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn sample(&self, limit: usize) -> &[&'a str] {
        &self.comments[..self.comments.len().min(limit)]
    }
}

pub fn extract_comments<'a>(view: &[&'a ReviewRecord], category: Category) -> CategoryComments<'a> {
    CategoryComments {
        category,
        comments: view
            .iter()
            .map(|&r| category.text(r))
            .filter(|t| !t.trim().is_empty())
            .collect(),
    }
}
