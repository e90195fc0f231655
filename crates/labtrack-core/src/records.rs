//! Test-record endpoints.
//!
//! Every call goes through [`ApiClient`], so an expired access token is
//! renewed transparently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::api::{ApiClient, ApiError, FieldError, PendingRequest};

pub const RECORDS_PATH: &str = "/api/test-records";
pub const BULK_RECORDS_PATH: &str = "/api/test-records/bulk";

/// A stored test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub id: Uuid,
    pub test_type: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub min_range: Option<f64>,
    #[serde(default)]
    pub max_range: Option<f64>,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Where a value falls relative to its reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus {
    Low,
    Normal,
    High,
    /// The record carries no reference range.
    NoRange,
}

impl std::fmt::Display for RangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RangeStatus::Low => "low",
            RangeStatus::Normal => "normal",
            RangeStatus::High => "high",
            RangeStatus::NoRange => "-",
        };
        f.write_str(label)
    }
}

impl TestRecord {
    pub fn status(&self) -> RangeStatus {
        range_status(self.value, self.min_range, self.max_range)
    }
}

fn range_status(value: f64, min: Option<f64>, max: Option<f64>) -> RangeStatus {
    match (min, max) {
        (None, None) => RangeStatus::NoRange,
        (Some(min), _) if value < min => RangeStatus::Low,
        (_, Some(max)) if value > max => RangeStatus::High,
        _ => RangeStatus::Normal,
    }
}

/// A record to be created.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTestRecord {
    pub test_type: String,
    pub value: f64,
    pub unit: String,
    pub min_range: Option<f64>,
    pub max_range: Option<f64>,
    pub date: DateTime<Utc>,
}

/// Row format of the bulk endpoint, which names its fields differently.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkTestRecord<'a> {
    test_category: &'a str,
    test_type: &'a str,
    test_value: f64,
    unit: &'a str,
    min_range: Option<f64>,
    max_range: Option<f64>,
    test_date: DateTime<Utc>,
    notes: Option<&'a str>,
}

impl<'a> BulkTestRecord<'a> {
    fn from_record(category: &'a str, record: &'a NewTestRecord) -> Self {
        Self {
            test_category: category,
            test_type: &record.test_type,
            test_value: record.value,
            unit: &record.unit,
            min_range: record.min_range,
            max_range: record.max_range,
            test_date: record.date,
            notes: None,
        }
    }
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    records: Vec<BulkTestRecord<'a>>,
}

#[derive(Clone)]
pub struct RecordsApi {
    client: ApiClient,
}

impl RecordsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Lists the signed-in user's records, newest first.
    pub async fn list(&self) -> Result<Vec<TestRecord>, ApiError> {
        self.client.get_json(RECORDS_PATH).await
    }

    pub async fn create(&self, record: &NewTestRecord) -> Result<TestRecord, ApiError> {
        let created: TestRecord = self.client.post_json(RECORDS_PATH, record).await?;
        tracing::debug!(id = %created.id, test_type = %created.test_type, "created test record");
        Ok(created)
    }

    /// Submits several records of one panel in a single request.
    pub async fn create_bulk(
        &self,
        category: &str,
        records: &[NewTestRecord],
    ) -> Result<(), ApiError> {
        if records.is_empty() {
            return Err(ApiError::Validation(vec![FieldError {
                loc: vec![json!("records")],
                msg: "at least one test record is required".to_string(),
                kind: None,
            }]));
        }

        let body = BulkRequest {
            records: records
                .iter()
                .map(|record| BulkTestRecord::from_record(category, record))
                .collect(),
        };
        self.client
            .send(PendingRequest::post(BULK_RECORDS_PATH).json(&body)?)
            .await?;
        tracing::debug!(count = records.len(), category, "submitted test records");
        Ok(())
    }
}

/// Timestamps arrive either as RFC 3339 or as naive UTC (`2024-03-01T08:30:00`).
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| format!("invalid timestamp: {raw}"))
    }
}

pub use timestamp::parse as parse_timestamp;
