use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::ports::HttpPort;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const API_BASE: &str = "https://api.blockbax.com/v1";

/// Client for the Blockbax ingestion API: prior-ingestion check and
/// measurement submission.
pub struct IngestClient {
    http: Arc<dyn HttpPort>,
    project_id: String,
    api_key: String,
    ingest_url: String,
}

impl IngestClient {
    pub fn new(config: &Config, http: Arc<dyn HttpPort>) -> Self {
        Self {
            http,
            project_id: config.project_id.clone(),
            api_key: config.ingest_api_key.clone(),
            ingest_url: config.ingest_url.clone(),
        }
    }

    fn api_key_headers(&self) -> [(&'static str, String); 1] {
        [("Authorization", format!("ApiKey {}", self.api_key))]
    }

    /// Returns true if any measurement at or before 23:59:59 UTC yesterday
    /// already exists for any subject in the project.
    ///
    /// This is a coarse gate: it only ever looks at yesterday, and a hit for
    /// any subject suppresses the whole run, backfill included.
    #[instrument(skip(self))]
    pub async fn already_ingested(&self) -> Result<bool> {
        // 1. Collect subject ids in the project
        let subjects_url = format!("{API_BASE}/projects/{}/subjects", self.project_id);
        let response = self
            .http
            .post_json(&subjects_url, &json!({}), &self.api_key_headers())
            .await?;
        if !response.is_success() {
            return Err(RelayError::Api {
                message: format!("subject listing failed: HTTP {}", response.status),
            });
        }
        let body = response.json()?;
        let subject_ids: Vec<Value> = body["result"]
            .as_array()
            .map(|subjects| {
                subjects
                    .iter()
                    .filter_map(|s| s.get("id").cloned())
                    .collect()
            })
            .unwrap_or_default();
        debug!("Found {} subjects in project", subject_ids.len());

        // 2. Probe for any measurement up to the end of yesterday
        let yesterday_end = format!(
            "{}T23:59:59Z",
            (Utc::now() - Duration::days(1)).format("%Y-%m-%d")
        );
        let measurements_url = format!("{API_BASE}/projects/{}/measurements", self.project_id);
        let payload = json!({
            "subjectIds": subject_ids,
            "toDate": yesterday_end,
            "take": 1,
        });
        let response = self
            .http
            .post_json(&measurements_url, &payload, &self.api_key_headers())
            .await?;
        if !response.is_success() {
            return Err(RelayError::Api {
                message: format!("measurement search failed: HTTP {}", response.status),
            });
        }
        let body = response.json()?;
        Ok(body["result"].as_array().map_or(false, |r| !r.is_empty()))
    }

    /// Submit the ordered raw reading payload, unmodified, in one request.
    #[instrument(skip(self, payload))]
    pub async fn forward(&self, payload: &[Value]) -> Result<()> {
        let body = Value::Array(payload.to_vec());
        let response = self
            .http
            .post_json(&self.ingest_url, &body, &self.api_key_headers())
            .await?;
        if !response.is_success() {
            return Err(RelayError::Api {
                message: format!("measurement submission failed: HTTP {}", response.status),
            });
        }
        info!("Forwarded payload for {} meters", payload.len());
        Ok(())
    }
}
