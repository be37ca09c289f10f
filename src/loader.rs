use crate::error::LoadError;
use crate::types::{RawRow, ReviewRecord};
use crate::util::{parse_f64_safe, parse_timestamp_safe};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use tracing::{debug, info, warn};

pub const DEFAULT_RESTAURANT_ID: &str = "restaurant_1";
pub const DEFAULT_CUSTOMER_NAME: &str = "Anonymous";
pub const DEFAULT_SENTIMENT_SCORE: f64 = 3.0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    /// Rows the CSV layer could not decode; kept as all-default records.
    pub decode_errors: usize,
    pub defaulted_timestamps: usize,
    pub defaulted_scores: usize,
}

/// Read a review export from disk and normalize every row.
pub fn load_and_normalize(path: &str) -> Result<(Vec<ReviewRecord>, LoadReport), LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_string(),
        source,
    })?;
    let (records, report) = read_and_normalize(file, Utc::now()).map_err(|source| LoadError::Csv {
        path: path.to_string(),
        source,
    })?;
    info!(
        path,
        rows = report.total_rows,
        decode_errors = report.decode_errors,
        "loaded reviews"
    );
    Ok((records, report))
}

/// Decode CSV from any reader. `now` stands in for unparsable timestamps.
pub fn read_and_normalize<R: Read>(
    reader: R,
    now: DateTime<Utc>,
) -> Result<(Vec<ReviewRecord>, LoadReport), csv::Error> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    // Fail early on an unreadable header instead of per row.
    rdr.headers()?;

    let mut decode_errors = 0usize;
    let mut rows = Vec::new();
    for (idx, result) in rdr.deserialize::<RawRow>().enumerate() {
        let row = match result {
            Ok(r) => r,
            // The reader stops after an I/O error, so nothing past it is usable.
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e),
            Err(e) => {
                warn!(row = idx, error = %e, "undecodable row, using defaults");
                decode_errors += 1;
                RawRow::default()
            }
        };
        rows.push(row);
    }

    let (records, mut report) = normalize_rows(rows, now);
    report.decode_errors = decode_errors;
    Ok((records, report))
}

/// Turn raw rows into complete records, substituting defaults for anything
/// missing or malformed. Rows are never dropped and order is kept.
pub fn normalize_rows<I>(rows: I, now: DateTime<Utc>) -> (Vec<ReviewRecord>, LoadReport)
where
    I: IntoIterator<Item = RawRow>,
{
    let mut report = LoadReport::default();
    let mut out = Vec::new();

    for (index, row) in rows.into_iter().enumerate() {
        report.total_rows += 1;

        let timestamp = match parse_timestamp_safe(row.timestamp.as_deref()) {
            Some(ts) => ts,
            None => {
                report.defaulted_timestamps += 1;
                now
            }
        };
        let sentiment_score = match parse_f64_safe(row.sentiment_score.as_deref()) {
            Some(v) => v,
            None => {
                report.defaulted_scores += 1;
                DEFAULT_SENTIMENT_SCORE
            }
        };

        out.push(ReviewRecord {
            id: present(row.id).unwrap_or_else(|| format!("review_{}", index)),
            review_id: present(row.review_id).unwrap_or_else(|| format!("review_{}", index)),
            customer_id: present(row.customer_id).unwrap_or_else(|| format!("customer_{}", index)),
            restaurant_id: present(row.restaurant_id)
                .unwrap_or_else(|| DEFAULT_RESTAURANT_ID.to_string()),
            customer_name: present(row.customer_name)
                .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
            customer_email: present(row.customer_email).unwrap_or_default(),
            customer_phone: present(row.customer_phone).unwrap_or_default(),
            summary: present(row.summary).unwrap_or_default(),
            food_quality: present(row.food_quality).unwrap_or_default(),
            service: present(row.service).unwrap_or_default(),
            atmosphere: present(row.atmosphere).unwrap_or_default(),
            music_and_entertainment: present(row.music_and_entertainment).unwrap_or_default(),
            improvement_suggestions: present(row.improvement_suggestions).unwrap_or_default(),
            specific_points: present(row.specific_points).unwrap_or_default(),
            sentiment_score,
            timestamp,
        });
    }

    debug!(
        rows = report.total_rows,
        defaulted_timestamps = report.defaulted_timestamps,
        defaulted_scores = report.defaulted_scores,
        "normalized rows"
    );
    (out, report)
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_row_gets_every_default() {
        let (records, report) = normalize_rows(vec![RawRow::default()], now());
        let r = &records[0];
        assert_eq!(r.id, "review_0");
        assert_eq!(r.review_id, "review_0");
        assert_eq!(r.customer_id, "customer_0");
        assert_eq!(r.customer_name, "Anonymous");
        assert_eq!(r.restaurant_id, DEFAULT_RESTAURANT_ID);
        assert_eq!(r.customer_email, "");
        assert_eq!(r.food_quality, "");
        assert_eq!(r.sentiment_score, 3.0);
        assert_eq!(r.timestamp, now());
        assert_eq!(report.defaulted_timestamps, 1);
        assert_eq!(report.defaulted_scores, 1);
    }

    #[test]
    fn unparsable_timestamp_becomes_load_time() {
        let row = RawRow {
            timestamp: Some("not-a-date".into()),
            sentiment_score: Some("4".into()),
            ..Default::default()
        };
        let (records, _) = normalize_rows(vec![row], now());
        assert_eq!(records[0].timestamp, now());
        assert_eq!(records[0].sentiment_score, 4.0);
    }

    #[test]
    fn out_of_range_numeric_score_is_kept() {
        let row = RawRow { sentiment_score: Some("7".into()), ..Default::default() };
        let (records, report) = normalize_rows(vec![row], now());
        assert_eq!(records[0].sentiment_score, 7.0);
        assert_eq!(report.defaulted_scores, 0);
    }

    #[test]
    fn indexes_follow_row_position() {
        let rows = vec![
            RawRow { id: Some("abc".into()), ..Default::default() },
            RawRow::default(),
        ];
        let (records, _) = normalize_rows(rows, now());
        assert_eq!(records[0].id, "abc");
        assert_eq!(records[1].id, "review_1");
        assert_eq!(records[1].customer_id, "customer_1");
    }

    #[test]
    fn reads_csv_with_missing_columns_and_short_rows() {
        let csv = "\
id,customer_id,sentiment_score,timestamp,food_quality,restaurant_id
a,c1,5,2024-05-01T10:00:00Z,Great pasta,bistro
b,c2,oops
";
        let (records, report) = read_and_normalize(csv.as_bytes(), now()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(report.total_rows, 2);
        assert_eq!(records[0].food_quality, "Great pasta");
        assert_eq!(records[0].restaurant_id, "bistro");
        assert_eq!(records[0].customer_name, "Anonymous");
        assert_eq!(records[1].id, "b");
        assert_eq!(records[1].sentiment_score, 3.0);
        assert_eq!(records[1].timestamp, now());
        assert_eq!(records[1].restaurant_id, DEFAULT_RESTAURANT_ID);
    }

    /// Serves its chunks in order, failing once where a chunk is `None`.
    struct Flaky(Vec<Option<&'static [u8]>>);

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            match self.0.remove(0) {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone")),
            }
        }
    }

    #[test]
    fn read_failure_mid_file_is_an_error() {
        let reader = Flaky(vec![
            Some(&b"id,sentiment_score\n"[..]),
            None,
            Some(&b"a,5\nb,1\n"[..]),
        ]);
        let err = read_and_normalize(reader, now()).unwrap_err();
        assert!(matches!(err.kind(), csv::ErrorKind::Io(_)));
    }

    #[test]
    fn undecodable_row_is_kept_with_defaults() {
        let bytes: &[u8] = b"id,sentiment_score\n\xff\xfe,5\nb,1\n";
        let (records, report) = read_and_normalize(bytes, now()).unwrap();
        assert_eq!(report.decode_errors, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "review_0");
        assert_eq!(records[1].id, "b");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_and_normalize("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
