//! Narrative summaries of the star-filtered view from an external LLM.
//!
//! The aggregation core only builds prompts and interprets replies; the
//! network call sits behind the [`Summarizer`] trait so it can be swapped
//! for a fake in tests. At most one request per [`AnalysisKey`] may be
//! pending at a time. There is no retry and no cancellation.

use crate::comments::{extract_comments, Category, CategoryComments};
use crate::config::SummarizerConfig;
use crate::error::SummaryError;
use crate::metrics::{average_rating, is_critical, is_positive};
use crate::types::ReviewRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

pub const OVERVIEW_MAX_TOKENS: u32 = 1000;
pub const CATEGORY_MAX_TOKENS: u32 = 800;
pub const DEFAULT_SUMMARY_SCORE: u8 = 3;
pub const NO_FEEDBACK_SUMMARY: &str =
    "No feedback available for this category in the selected rating range.";

static SENTIMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)SENTIMENT SCORE:\s*(\d+)").expect("valid sentiment regex"));

/// Port to the text-completion service.
pub trait Summarizer {
    /// Whether a usable credential is configured. Checked before any request.
    fn has_credential(&self) -> bool;

    /// Send one prompt and return the reply text.
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummaryError>;
}

impl<S: Summarizer + ?Sized> Summarizer for &S {
    fn has_credential(&self) -> bool {
        (**self).has_credential()
    }

    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummaryError> {
        (**self).complete(prompt, max_tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKey {
    Overall,
    Category(Category),
}

impl fmt::Display for AnalysisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKey::Overall => f.write_str("overall"),
            AnalysisKey::Category(c) => write!(f, "{}", c),
        }
    }
}

/// Set of analysis keys with a request currently pending.
#[derive(Debug, Default)]
pub struct InFlight {
    keys: Mutex<HashSet<AnalysisKey>>,
}

impl InFlight {
    pub fn try_begin(&self, key: AnalysisKey) -> Result<InFlightGuard<'_>, SummaryError> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key) {
            return Err(SummaryError::AlreadyInFlight(key));
        }
        Ok(InFlightGuard { owner: self, key })
    }

    pub fn is_pending(&self, key: AnalysisKey) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key)
    }
}

/// Releases its key on drop, whether the request succeeded or not.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    owner: &'a InFlight,
    key: AnalysisKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Figures and comment samples fed into the overall analysis prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewDigest {
    pub total_reviews: usize,
    pub average_rating: f64,
    pub positive_reviews: usize,
    pub negative_reviews: usize,
    pub selected_star_ratings: Vec<u8>,
    pub complaints: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub food: Vec<String>,
    pub service: Vec<String>,
    pub atmosphere: Vec<String>,
    pub music: Vec<String>,
    pub specific_points: Vec<String>,
}

impl OverviewDigest {
    pub fn from_view(view: &[&ReviewRecord], selected_star_ratings: &BTreeSet<u8>) -> Self {
        let sample = |category: Category, limit: usize| -> Vec<String> {
            extract_comments(view, category)
                .sample(limit)
                .iter()
                .map(|s| s.to_string())
                .collect()
        };
        OverviewDigest {
            total_reviews: view.len(),
            average_rating: average_rating(view),
            positive_reviews: view.iter().filter(|r| is_positive(r)).count(),
            negative_reviews: view.iter().filter(|r| is_critical(r)).count(),
            selected_star_ratings: selected_star_ratings.iter().copied().collect(),
            complaints: view
                .iter()
                .filter(|r| is_critical(r))
                .map(|r| r.summary.clone())
                .take(5)
                .collect(),
            improvement_suggestions: view
                .iter()
                .filter(|r| !r.improvement_suggestions.trim().is_empty())
                .map(|r| r.improvement_suggestions.clone())
                .take(5)
                .collect(),
            food: sample(Category::Food, 3),
            service: sample(Category::Service, 3),
            atmosphere: sample(Category::Atmosphere, 3),
            music: sample(Category::Music, 3),
            specific_points: sample(Category::Specific, 5),
        }
    }
}

pub fn overview_prompt(d: &OverviewDigest) -> String {
    let ratings: Vec<String> = d.selected_star_ratings.iter().map(|r| r.to_string()).collect();
    let mut p = String::new();
    p.push_str(
        "You are a restaurant analytics expert. \
         Analyze this customer feedback and give actionable insights.\n\n",
    );
    p.push_str(&format!("Total reviews: {}\n", d.total_reviews));
    p.push_str(&format!("Average rating: {:.1}/5\n", d.average_rating));
    p.push_str(&format!("Positive reviews: {}\n", d.positive_reviews));
    p.push_str(&format!("Negative reviews: {}\n", d.negative_reviews));
    p.push_str(&format!("Star ratings included: {}\n", ratings.join(", ")));
    for (title, lines) in [
        ("Recent complaints", &d.complaints),
        ("Improvement suggestions", &d.improvement_suggestions),
        ("Food quality feedback", &d.food),
        ("Service feedback", &d.service),
        ("Atmosphere feedback", &d.atmosphere),
        ("Music and entertainment feedback", &d.music),
        ("Specific customer points", &d.specific_points),
    ] {
        p.push_str(&format!("\n{}:\n{}\n", title, lines.join("\n")));
    }
    p.push_str(
        "\nReply with:\n\
         1. Key strengths to keep\n\
         2. The top three areas to improve\n\
         3. Concrete recommendations, each with a High/Medium/Low priority\n\
         Keep it short.",
    );
    p
}

pub fn category_prompt(comments: &CategoryComments<'_>) -> String {
    let subject = comments.category.subject();
    format!(
        "You are given customer comments about the {subject} of a restaurant.\n\
         Identify recurring themes, compliments and complaints, then summarize the overall \
         {subject} experience in at least five sentences. \
         Only consider what is said about {subject}.\n\
         Finish with a new line of the form \"SENTIMENT SCORE: <n>\" where n is 1 (very negative) \
         to 5 (very positive).\n\n\
         Comments:\n\n{}",
        comments.comments.join("\n\n")
    )
}

/// Split a trailing `SENTIMENT SCORE: n` marker off a reply. Without a
/// marker in 1..=5 the whole reply is the summary and the score is 3.
pub fn parse_sentiment_response(content: &str) -> (String, u8) {
    let parsed = SENTIMENT_LINE.captures(content).and_then(|caps| {
        let score = caps.get(1)?.as_str().parse::<u8>().ok()?;
        (1..=5).contains(&score).then_some(score)
    });
    match parsed {
        Some(score) => (SENTIMENT_LINE.replace(content, "").trim().to_string(), score),
        None => (content.to_string(), DEFAULT_SUMMARY_SCORE),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryAnalysis {
    pub category: Category,
    pub summary: String,
    pub sentiment_score: u8,
    pub comment_count: usize,
}

/// Runs overall and per-category analyses against one summarizer.
pub struct Analyst<S> {
    summarizer: S,
    in_flight: InFlight,
}

impl<S: Summarizer> Analyst<S> {
    pub fn new(summarizer: S) -> Self {
        Self {
            summarizer,
            in_flight: InFlight::default(),
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn overall(
        &self,
        star_filtered: &[&ReviewRecord],
        selected_star_ratings: &BTreeSet<u8>,
    ) -> Result<String, SummaryError> {
        if !self.summarizer.has_credential() {
            return Err(SummaryError::MissingCredential);
        }
        let _guard = self.in_flight.try_begin(AnalysisKey::Overall)?;
        let digest = OverviewDigest::from_view(star_filtered, selected_star_ratings);
        info!(reviews = digest.total_reviews, "requesting overall analysis");
        self.summarizer
            .complete(&overview_prompt(&digest), OVERVIEW_MAX_TOKENS)
            .map_err(|e| {
                warn!(error = %e, "overall analysis failed");
                e
            })
    }

    pub fn category(
        &self,
        star_filtered: &[&ReviewRecord],
        category: Category,
    ) -> Result<CategoryAnalysis, SummaryError> {
        if !self.summarizer.has_credential() {
            return Err(SummaryError::MissingCredential);
        }
        let comments = extract_comments(star_filtered, category);
        if comments.comment_count() == 0 {
            return Ok(CategoryAnalysis {
                category,
                summary: NO_FEEDBACK_SUMMARY.to_string(),
                sentiment_score: DEFAULT_SUMMARY_SCORE,
                comment_count: 0,
            });
        }
        let key = AnalysisKey::Category(category);
        let _guard = self.in_flight.try_begin(key)?;
        info!(%category, comments = comments.comment_count(), "requesting category analysis");
        let content = self
            .summarizer
            .complete(&category_prompt(&comments), CATEGORY_MAX_TOKENS)
            .map_err(|e| {
                warn!(%category, error = %e, "category analysis failed");
                e
            })?;
        let (summary, sentiment_score) = parse_sentiment_response(&content);
        Ok(CategoryAnalysis {
            category,
            summary,
            sentiment_score,
            comment_count: comments.comment_count(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiSummarizer {
    config: SummarizerConfig,
    client: reqwest::blocking::Client,
}

impl OpenAiSummarizer {
    pub fn new(config: SummarizerConfig) -> Result<Self, SummaryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SummaryError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }
}

impl Summarizer for OpenAiSummarizer {
    fn has_credential(&self) -> bool {
        !self.config.is_missing_credential()
    }

    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummaryError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens,
            temperature: self.config.temperature,
        };
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(self.config.api_key())
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    SummaryError::Transport(format!(
                        "timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else {
                    SummaryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(SummaryError::Api {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| SummaryError::Transport(format!("malformed response: {}", e)))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(SummaryError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, review};
    use std::cell::RefCell;

    /// Records prompts and answers with a canned reply.
    struct FakeSummarizer {
        key: bool,
        reply: Result<String, u16>,
        prompts: RefCell<Vec<(String, u32)>>,
    }

    impl FakeSummarizer {
        fn replying(reply: &str) -> Self {
            Self {
                key: true,
                reply: Ok(reply.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Summarizer for FakeSummarizer {
        fn has_credential(&self) -> bool {
            self.key
        }

        fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummaryError> {
            self.prompts.borrow_mut().push((prompt.to_string(), max_tokens));
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(status) => Err(SummaryError::Api { status: *status, message: "nope".into() }),
            }
        }
    }

    fn sample_view() -> Vec<ReviewRecord> {
        let mut a = review("a", "c1", 5.0, at(2024, 4, 1));
        a.food_quality = "Perfect steak".into();
        a.improvement_suggestions = "More parking".into();
        let mut b = review("b", "c2", 1.0, at(2024, 4, 2));
        b.summary = "Waited an hour".into();
        b.service = "Slow and rude".into();
        b.food_quality = "Cold fries".into();
        vec![a, b]
    }

    #[test]
    fn parses_trailing_score() {
        let (summary, score) = parse_sentiment_response("Mostly good.\n\nSENTIMENT SCORE: 4");
        assert_eq!(summary, "Mostly good.");
        assert_eq!(score, 4);

        let (summary, score) = parse_sentiment_response("Fine.\nsentiment score:2\n");
        assert_eq!(summary, "Fine.");
        assert_eq!(score, 2);
    }

    #[test]
    fn missing_or_invalid_score_keeps_full_text() {
        let (summary, score) = parse_sentiment_response("No marker here.");
        assert_eq!(summary, "No marker here.");
        assert_eq!(score, 3);

        let text = "Great.\nSENTIMENT SCORE: 9";
        assert_eq!(parse_sentiment_response(text), (text.to_string(), 3));
    }

    #[test]
    fn in_flight_rejects_duplicates_and_releases() {
        let flights = InFlight::default();
        let food = AnalysisKey::Category(Category::Food);
        let guard = flights.try_begin(food).unwrap();
        assert!(matches!(
            flights.try_begin(food),
            Err(SummaryError::AlreadyInFlight(k)) if k == food
        ));
        assert!(flights.try_begin(AnalysisKey::Overall).is_ok());
        drop(guard);
        assert!(!flights.is_pending(food));
        assert!(flights.try_begin(food).is_ok());
    }

    #[test]
    fn missing_credential_never_calls_out() {
        let mut fake = FakeSummarizer::replying("x");
        fake.key = false;
        let analyst = Analyst::new(&fake);
        let data = sample_view();
        let view: Vec<&ReviewRecord> = data.iter().collect();

        assert!(matches!(
            analyst.overall(&view, &BTreeSet::new()),
            Err(SummaryError::MissingCredential)
        ));
        assert!(matches!(
            analyst.category(&view, Category::Food),
            Err(SummaryError::MissingCredential)
        ));
        assert!(fake.prompts.borrow().is_empty());
    }

    #[test]
    fn category_without_comments_is_answered_locally() {
        let fake = FakeSummarizer::replying("x");
        let analyst = Analyst::new(&fake);
        let data = sample_view();
        let view: Vec<&ReviewRecord> = data.iter().collect();

        let result = analyst.category(&view, Category::Music).unwrap();
        assert_eq!(result.summary, NO_FEEDBACK_SUMMARY);
        assert_eq!(result.sentiment_score, 3);
        assert_eq!(result.comment_count, 0);
        assert!(fake.prompts.borrow().is_empty());
    }

    #[test]
    fn category_analysis_sends_every_comment() {
        let fake = FakeSummarizer::replying("Mixed feelings.\nSENTIMENT SCORE: 3");
        let analyst = Analyst::new(&fake);
        let data = sample_view();
        let view: Vec<&ReviewRecord> = data.iter().collect();

        let result = analyst.category(&view, Category::Food).unwrap();
        assert_eq!(result.comment_count, 2);
        assert_eq!(result.summary, "Mixed feelings.");
        let prompts = fake.prompts.borrow();
        assert_eq!(prompts[0].1, CATEGORY_MAX_TOKENS);
        assert!(prompts[0].0.contains("Perfect steak\n\nCold fries"));
        assert!(prompts[0].0.contains("food quality"));
    }

    #[test]
    fn key_is_released_after_failure() {
        let mut fake = FakeSummarizer::replying("x");
        fake.reply = Err(500);
        let analyst = Analyst::new(&fake);
        let data = sample_view();
        let view: Vec<&ReviewRecord> = data.iter().collect();

        let err = analyst.category(&view, Category::Service).unwrap_err();
        assert!(matches!(err, SummaryError::Api { status: 500, .. }));
        assert!(!analyst.in_flight().is_pending(AnalysisKey::Category(Category::Service)));
        assert!(analyst.category(&view, Category::Service).is_err());
        assert_eq!(fake.prompts.borrow().len(), 2);
    }

    #[test]
    fn overview_digest_samples_and_counts() {
        let data = sample_view();
        let view: Vec<&ReviewRecord> = data.iter().collect();
        let stars: BTreeSet<u8> = [1, 5].into_iter().collect();
        let d = OverviewDigest::from_view(&view, &stars);
        assert_eq!(d.total_reviews, 2);
        assert_eq!(d.average_rating, 3.0);
        assert_eq!(d.positive_reviews, 1);
        assert_eq!(d.negative_reviews, 1);
        assert_eq!(d.complaints, vec!["Waited an hour"]);
        assert_eq!(d.improvement_suggestions, vec!["More parking"]);
        assert_eq!(d.food, vec!["Perfect steak", "Cold fries"]);
        assert!(d.music.is_empty());

        let prompt = overview_prompt(&d);
        assert!(prompt.contains("Average rating: 3.0/5"));
        assert!(prompt.contains("Star ratings included: 1, 5"));
    }

    #[test]
    fn empty_view_digest_has_zero_average() {
        let d = OverviewDigest::from_view(&[], &BTreeSet::new());
        assert_eq!(d.total_reviews, 0);
        assert_eq!(d.average_rating, 0.0);
    }

    #[test]
    fn overall_uses_larger_token_budget() {
        let fake = FakeSummarizer::replying("Strengths: food.");
        let analyst = Analyst::new(&fake);
        let data = sample_view();
        let view: Vec<&ReviewRecord> = data.iter().collect();
        let text = analyst.overall(&view, &BTreeSet::new()).unwrap();
        assert_eq!(text, "Strengths: food.");
        assert_eq!(fake.prompts.borrow()[0].1, OVERVIEW_MAX_TOKENS);
    }
}
