//! Append-only submission of finished sessions to Firestore.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::auth::{TokenProvider, DATASTORE_SCOPE};
use crate::error::{RemoteError, SubmissionError};
use crate::models::{AnswerRecord, MusicParams, PromptPair, SummaryReport, UserPreferences};

pub const STORE_SERVICE: &str = "Firestore";
pub const DEFAULT_COLLECTION: &str = "user_responses";

/// Everything stored for one completed session
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub user_info: UserPreferences,
    pub music_params: Option<MusicParams>,
    pub music_prompt: Option<PromptPair>,
    pub test_answers: BTreeMap<String, AnswerRecord>,
    pub summary: Option<SummaryReport>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Firestore document body: `{"fields": {...}}` with typed values
    pub fn to_document(&self) -> Result<Value, SubmissionError> {
        let value = serde_json::to_value(self).map_err(|e| SubmissionError::Encode(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(SubmissionError::Encode("record did not serialize to an object".to_string()));
        };

        let mut fields: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), to_firestore_value(v))).collect();
        fields.insert(
            "submitted_at".to_string(),
            json!({ "timestampValue": self.submitted_at.to_rfc3339_opts(SecondsFormat::Micros, true) }),
        );

        Ok(json!({ "fields": fields }))
    }
}

/// Encode a JSON value as a Firestore typed value
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), to_firestore_value(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Destination for finished sessions
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Add a document and return its resource name
    async fn add(&self, collection: &str, document: &Value) -> Result<String, SubmissionError>;
}

#[derive(Deserialize)]
struct CreatedDocument {
    name: String,
}

/// Firestore REST client
pub struct FirestoreStore {
    http: reqwest::Client,
    project_id: String,
    credentials: Arc<dyn TokenProvider>,
    timeout: Duration,
}

impl FirestoreStore {
    pub fn new(project_id: impl Into<String>, credentials: Arc<dyn TokenProvider>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            project_id: project_id.into(),
            credentials,
            timeout,
        }
    }

    pub fn collection_url(&self, collection: &str) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents/{}",
            self.project_id, collection
        )
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn add(&self, collection: &str, document: &Value) -> Result<String, SubmissionError> {
        let token = self
            .credentials
            .access_token(DATASTORE_SCOPE)
            .await
            .map_err(SubmissionError::Credentials)?;

        let response = self
            .http
            .post(self.collection_url(collection))
            .bearer_auth(token)
            .timeout(self.timeout)
            .json(document)
            .send()
            .await
            .map_err(|e| SubmissionError::Store(RemoteError::from_reqwest(STORE_SERVICE, &e, self.timeout)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmissionError::Store(RemoteError::from_status(
                STORE_SERVICE,
                status.as_u16(),
                body,
            )));
        }

        let created: CreatedDocument = response
            .json()
            .await
            .map_err(|e| SubmissionError::Store(RemoteError::malformed(STORE_SERVICE, e.to_string())))?;

        info!("Stored submission as {}", created.name);
        Ok(created.name)
    }
}
