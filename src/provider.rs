use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::ports::HttpPort;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const METERS_URL: &str = "https://api.hetmeetbedrijf.nl/uwmeetdata/api/Meter/MyMeters";
const RAW_DATA_URL: &str = "https://api.hetmeetbedrijf.nl/uwmeetdata/api/Data/GetDataRaw";

/// Client for the HetMeetbedrijf metering API: token grant, meter listing and
/// per-meter raw interval data.
pub struct ProviderClient {
    http: Arc<dyn HttpPort>,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl ProviderClient {
    pub fn new(config: &Config, http: Arc<dyn HttpPort>) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url.clone(),
        }
    }

    /// Exchange client credentials for a bearer token.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<String> {
        let payload = json!({
            "grant_type": "API",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        });
        let headers = [
            ("Content-Type", "application/json-patch+json".to_string()),
            ("accept", "*/*".to_string()),
        ];
        let response = self
            .http
            .post_json(&self.token_url, &payload, &headers)
            .await?;
        if !response.is_success() {
            return Err(RelayError::Auth {
                status: response.status,
            });
        }
        let body = response.json().map_err(|_| RelayError::Api {
            message: format!("token response not parseable: HTTP {}", response.status),
        })?;
        match body["token"].as_str() {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(RelayError::MissingField("token not found in response".into())),
        }
    }

    /// List all meters visible to the account. The provider's list may
    /// contain duplicates; ids are deduplicated preserving first-seen order.
    #[instrument(skip(self, token))]
    pub async fn list_meters(&self, token: &str) -> Result<Vec<String>> {
        debug!("Fetching meter list");
        let headers = bearer_headers(token);
        let response = self.http.get(METERS_URL, &headers).await?;
        if !response.is_success() {
            return Err(RelayError::Api {
                message: format!("meter list request failed: HTTP {}", response.status),
            });
        }
        let body = response.json().map_err(|_| RelayError::Api {
            message: format!("meter list not parseable: HTTP {}", response.status),
        })?;
        let records = body
            .get("meters")
            .and_then(Value::as_array)
            .ok_or_else(|| RelayError::Api {
                message: format!("unexpected meters response shape: {}", body),
            })?;

        let mut seen = HashSet::new();
        let mut meter_ids = Vec::new();
        for record in records {
            let Some(id) = record.get("id") else {
                continue;
            };
            let id = render_meter_id(id);
            if seen.insert(id.clone()) {
                meter_ids.push(id);
            }
        }
        info!("Enumerated {} unique meters", meter_ids.len());
        Ok(meter_ids)
    }

    /// Fetch raw interval readings for one UTC calendar day, one request per
    /// meter, in the given order. Fails fast on the first meter that errors;
    /// partial results are discarded.
    #[instrument(skip(self, token, meter_ids))]
    pub async fn fetch_raw_day(
        &self,
        token: &str,
        date: NaiveDate,
        meter_ids: &[String],
    ) -> Result<Vec<Value>> {
        let date_str = date.format("%Y%m%d").to_string();
        let headers = bearer_headers(token);
        let mut all_readings = Vec::with_capacity(meter_ids.len());
        for meter_id in meter_ids {
            let url = format!(
                "{RAW_DATA_URL}?meterID={meter_id}&channel=0&date={date_str}&rawInterval=true&companyId=0&inUTC=true"
            );
            let response = self.http.get(&url, &headers).await?;
            if !response.is_success() {
                return Err(RelayError::Api {
                    message: format!(
                        "raw data fetch for meter {} failed: HTTP {}",
                        meter_id, response.status
                    ),
                });
            }
            let reading = response.json().map_err(|_| RelayError::Api {
                message: format!(
                    "raw data for meter {} not parseable: HTTP {}",
                    meter_id, response.status
                ),
            })?;
            all_readings.push(reading);
        }
        info!(
            "Fetched raw data for {} meters on {}",
            all_readings.len(),
            date_str
        );
        Ok(all_readings)
    }
}

/// Meter ids are opaque; strings are used as-is, anything else keeps its
/// compact JSON rendering.
fn render_meter_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bearer_headers(token: &str) -> [(&'static str, String); 2] {
    [
        ("Authorization", format!("Bearer {token}")),
        ("accept", "text/plain".to_string()),
    ]
}
