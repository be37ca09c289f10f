// Entry point and high-level CLI flow.
//
// One run loads the review export, applies the filters given on the command
// line, prints every dashboard view, and optionally exports them and asks
// the summarization service for a narrative analysis.
use clap::{Parser, ValueEnum};
use review_dash::comments::Category;
use review_dash::config::{SummarizerConfig, DEFAULT_BASE_URL, DEFAULT_DATA_PATH, DEFAULT_MODEL};
use review_dash::dashboard::{Dashboard, DashboardView};
use review_dash::error::Remediation;
use review_dash::filters::{end_of_day, start_of_day, DatePreset};
use review_dash::loader::{self, LoadReport};
use review_dash::output;
use review_dash::reports;
use review_dash::summarize::{Analyst, OpenAiSummarizer};
use review_dash::types::{DateRange, FilterState};
use review_dash::util::{format_int, format_number, parse_date_safe};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Today,
    Yesterday,
    Last7days,
    Last30days,
    ThisWeek,
    ThisMonth,
    Last90days,
}

impl From<PresetArg> for DatePreset {
    fn from(p: PresetArg) -> Self {
        match p {
            PresetArg::Today => DatePreset::Today,
            PresetArg::Yesterday => DatePreset::Yesterday,
            PresetArg::Last7days => DatePreset::Last7Days,
            PresetArg::Last30days => DatePreset::Last30Days,
            PresetArg::ThisWeek => DatePreset::ThisWeek,
            PresetArg::ThisMonth => DatePreset::ThisMonth,
            PresetArg::Last90days => DatePreset::Last90Days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AnalyzeArg {
    Overall,
    Food,
    Service,
    Atmosphere,
    Music,
    Specific,
}

/// Restaurant review analytics dashboard
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Review export (CSV with a header row)
    #[arg(short, long, env = "REVIEWS_PATH", default_value = DEFAULT_DATA_PATH)]
    data: String,

    /// Date range preset, ignored for bounds given with --from/--to
    #[arg(long, value_enum, default_value = "last30days")]
    preset: PresetArg,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    /// Restrict to a restaurant id; repeat for several. Default: all
    #[arg(short, long = "restaurant")]
    restaurants: Vec<String>,

    /// Star ratings used for comment views and analysis
    #[arg(long, value_delimiter = ',', default_values_t = vec![1u8, 2, 3, 4, 5])]
    stars: Vec<u8>,

    /// Select no star rating at all
    #[arg(long, conflicts_with = "stars")]
    no_stars: bool,

    /// Write CSV/JSON exports into this directory
    #[arg(long)]
    export_dir: Option<String>,

    /// Ask the summarization service for an analysis
    #[arg(long, value_enum)]
    analyze: Vec<AnalyzeArg>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    api_base: String,

    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

fn build_filter(args: &Args) -> Result<FilterState, String> {
    let preset = DatePreset::from(args.preset).range(chrono::Utc::now());
    let from = match &args.from {
        Some(s) => start_of_day(day_arg(s, "--from")?),
        None => preset.from,
    };
    let to = match &args.to {
        Some(s) => end_of_day(day_arg(s, "--to")?),
        None => preset.to,
    };
    if from > to {
        return Err("--from must not be after --to".to_string());
    }

    let mut filter = FilterState::new(DateRange::new(from, to));
    for r in &args.restaurants {
        filter.toggle_restaurant(r);
    }
    filter.clear_star_ratings();
    if !args.no_stars {
        for &s in &args.stars {
            if !(1..=5).contains(&s) {
                return Err(format!("star rating {} is outside 1-5", s));
            }
            filter.selected_star_ratings.insert(s);
        }
    }
    Ok(filter)
}

fn day_arg(s: &str, flag: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    parse_date_safe(Some(s))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
        .ok_or_else(|| format!("{} expects YYYY-MM-DD, got '{}'", flag, s))
}

fn print_load_report(report: &LoadReport) {
    println!("Processing dataset... ({} reviews loaded)", format_int(report.total_rows));
    if report.decode_errors > 0 {
        println!(
            "Note: {} rows could not be decoded and were kept with default values.",
            format_int(report.decode_errors)
        );
    }
    if report.defaulted_timestamps > 0 {
        println!(
            "Info: {} rows had no usable timestamp and were dated at load time.",
            format_int(report.defaulted_timestamps)
        );
    }
    println!();
}

fn print_view(view: &DashboardView<'_>, filter: &FilterState) {
    let m = &view.metrics;
    println!(
        "Period: {} - {}",
        filter.date_range.from.format("%b %d"),
        filter.date_range.to.format("%b %d, %Y")
    );
    println!("Total reviews:    {}", format_int(m.total_reviews));
    println!("Average rating:   {}/5", format_number(m.average_rating, 1));
    println!("Positive rate:    {}%", format_number(m.positive_rate, 1));
    println!("Critical issues:  {}", format_int(m.critical_issues));
    println!("Unique customers: {}", format_int(m.unique_customers));
    let l = &view.loyalty;
    println!(
        "Returning customers: {} ({}% return rate)   Reviews/customer: {}   Most active: {}",
        format_int(l.returning_customers),
        format_number(l.return_rate, 1),
        format_number(l.reviews_per_customer, 1),
        format_int(l.most_active_reviews)
    );
    println!("Feedback collection: {}% have suggestions", format_number(l.feedback_share, 1));
    let e = &view.engagement;
    println!(
        "Engagement: single {} ({}%)  repeat {} ({}%)  3+ reviews {} ({}%)\n",
        e.single_review.customers,
        format_number(e.single_review.percent, 1),
        e.repeat.customers,
        format_number(e.repeat.percent, 1),
        e.highly_engaged.customers,
        format_number(e.highly_engaged.percent, 1)
    );

    let c = &view.category_scores;
    println!(
        "Category scores: food {}  service {}  atmosphere {}  entertainment {}\n",
        format_number(c.food, 1),
        format_number(c.service, 1),
        format_number(c.atmosphere, 1),
        format_number(c.entertainment, 1)
    );

    output::preview_table(
        "Sentiment Distribution",
        None,
        &reports::distribution_rows(&view.distribution),
        5,
    );
    output::preview_table(
        "Performance Trends",
        Some("last 6 months in range"),
        &reports::trend_rows(&view.trends),
        6,
    );
    let ind = &view.indicators;
    println!(
        "Monthly growth: {}%  Best month: {}  Consistency: {}  Peak: {}\n",
        format_number(ind.monthly_growth, 1),
        ind.best_month.as_deref().unwrap_or("N/A"),
        format_number(ind.consistency_score, 1),
        format_number(ind.peak_rating, 1)
    );
    output::preview_table(
        "Seasonal Patterns",
        Some("all reviews, filters not applied"),
        &reports::season_rows(&view.seasons),
        4,
    );
    output::preview_table(
        "Top Customers",
        None,
        &reports::customer_rows(&view.top_customers),
        10,
    );
    output::preview_table(
        "Recent Critical Reviews",
        None,
        &reports::critical_rows(&view.critical),
        5,
    );
}

fn export(
    dir: &Path,
    view: &DashboardView<'_>,
    filter: &FilterState,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    output::write_csv(
        &dir.join("sentiment_distribution.csv"),
        &reports::distribution_rows(&view.distribution),
    )?;
    output::write_csv(
        &dir.join("performance_trends.csv"),
        &reports::trend_rows(&view.trends),
    )?;
    output::write_csv(
        &dir.join("seasonal_patterns.csv"),
        &reports::season_rows(&view.seasons),
    )?;
    output::write_csv(
        &dir.join("top_customers.csv"),
        &reports::customer_rows(&view.top_customers),
    )?;
    output::write_csv(
        &dir.join("critical_reviews.csv"),
        &reports::critical_rows(&view.critical),
    )?;
    output::write_json(&dir.join("summary.json"), &view.summary_stats(filter))?;
    info!(dir = %dir.display(), "exports written");
    Ok(())
}

fn run_analyses(args: &Args, view: &DashboardView<'_>, filter: &FilterState) -> bool {
    let config = SummarizerConfig::new(args.api_key.clone())
        .with_model(args.model.clone())
        .with_base_url(args.api_base.clone())
        .with_timeout(Duration::from_secs(args.timeout_secs));
    let summarizer = match OpenAiSummarizer::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}\n{}", e, e.remediation());
            return false;
        }
    };
    let analyst = Analyst::new(summarizer);

    let mut ok = true;
    for target in &args.analyze {
        let result = match target {
            AnalyzeArg::Overall => analyst
                .overall(&view.star_filtered, &filter.selected_star_ratings)
                .map(|text| format!("Overall Analysis\n\n{}\n", text)),
            other => {
                let category = match other {
                    AnalyzeArg::Food => Category::Food,
                    AnalyzeArg::Service => Category::Service,
                    AnalyzeArg::Atmosphere => Category::Atmosphere,
                    AnalyzeArg::Music => Category::Music,
                    _ => Category::Specific,
                };
                analyst.category(&view.star_filtered, category).map(|a| {
                    format!(
                        "{} Analysis ({} comments, sentiment {}/5)\n\n{}\n",
                        category.subject(),
                        a.comment_count,
                        a.sentiment_score,
                        a.summary
                    )
                })
            }
        };
        match result {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error generating {:?} analysis: {}\n{}", target, e, e.remediation());
                ok = false;
            }
        }
    }
    ok
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    debug!(preset = ?args.preset, data = %args.data, "starting");

    let filter = match build_filter(&args) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    let mut dashboard = Dashboard::new();
    let mut load_report = None;
    let loaded = dashboard.load_with(|| {
        loader::load_and_normalize(&args.data).map(|(records, report)| {
            load_report = Some(report);
            records
        })
    });
    if let Err(e) = loaded {
        eprintln!("Failed to load data: {}\n{}", e, e.remediation());
        return ExitCode::FAILURE;
    }
    if let Some(report) = &load_report {
        print_load_report(report);
    }

    let view = match dashboard.view(&filter) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    print_view(&view, &filter);

    let mut ok = true;
    if let Some(dir) = &args.export_dir {
        if let Err(e) = export(Path::new(dir), &view, &filter) {
            eprintln!("Write error: {}", e);
            ok = false;
        }
    }
    if !args.analyze.is_empty() {
        ok &= run_analyses(&args, &view, &filter);
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
