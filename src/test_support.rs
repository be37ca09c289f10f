use crate::types::ReviewRecord;
use chrono::{DateTime, TimeZone, Utc};

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// A record with every text field empty.
pub fn review(id: &str, customer: &str, score: f64, timestamp: DateTime<Utc>) -> ReviewRecord {
    ReviewRecord {
        id: id.to_string(),
        review_id: id.to_string(),
        customer_id: customer.to_string(),
        restaurant_id: "restaurant_1".to_string(),
        customer_name: format!("Name {}", customer),
        customer_email: format!("{}@example.com", customer),
        customer_phone: String::new(),
        summary: String::new(),
        food_quality: String::new(),
        service: String::new(),
        atmosphere: String::new(),
        music_and_entertainment: String::new(),
        improvement_suggestions: String::new(),
        specific_points: String::new(),
        sentiment_score: score,
        timestamp,
    }
}
