use crate::config::Config;
use crate::error::Result;
use crate::ingest::IngestClient;
use crate::ports::HttpPort;
use crate::provider::ProviderClient;
use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

/// UTC calendar day `days_ago` days before today.
fn utc_day_ago(days_ago: i64) -> NaiveDate {
    (Utc::now() - Duration::days(days_ago)).date_naive()
}

/// Run one fetch-and-forward cycle, or a multi-day backfill.
///
/// Sequence: idempotency gate, authenticate, enumerate meters once, then
/// fetch and forward per day. Any error aborts the remaining work and is
/// returned to the caller; there is no retry anywhere.
pub async fn run(config: &Config, backfill_days: u32, http: Arc<dyn HttpPort>) -> Result<()> {
    let ingest = IngestClient::new(config, Arc::clone(&http));

    if ingest.already_ingested().await? {
        info!("Yesterday's data already submitted; skipping");
        return Ok(());
    }
    info!("No existing measurements for yesterday; proceeding with fetch and send");

    info!("Authenticating with HetMeetbedrijf...");
    let provider = ProviderClient::new(config, http);
    let token = provider.authenticate().await?;
    let meter_ids = provider.list_meters(&token).await?;

    if backfill_days > 0 {
        info!("Backfilling last {} days...", backfill_days);
        for days_ago in (1..=i64::from(backfill_days)).rev() {
            let date = utc_day_ago(days_ago);
            info!("Fetching power usage for {}...", date.format("%Y%m%d"));
            let readings = provider.fetch_raw_day(&token, date, &meter_ids).await?;
            info!("Sending data for {} to Blockbax...", date.format("%Y%m%d"));
            ingest.forward(&readings).await?;
        }
        info!("Backfill complete");
        return Ok(());
    }

    info!("Fetching power usage for yesterday...");
    let readings = provider
        .fetch_raw_day(&token, utc_day_ago(1), &meter_ids)
        .await?;
    info!("Sending data to Blockbax...");
    ingest.forward(&readings).await?;
    info!("Done");
    Ok(())
}
