use std::env;

/// Process configuration, read once at startup and passed by reference to
/// every component that needs it.
///
/// Missing variables load as empty strings rather than failing here; they
/// surface as authentication or request failures downstream.
#[derive(Debug, Clone)]
pub struct Config {
    /// Blockbax project the relay writes into.
    pub project_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub ingest_api_key: String,
    pub ingest_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            project_id: env::var("BLOCKBAX_PROJECT_ID").unwrap_or_default(),
            client_id: env::var("HETMEETBEDRIJF_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("HETMEETBEDRIJF_CLIENT_SECRET").unwrap_or_default(),
            token_url: env::var("HETMEETBEDRIJF_TOKEN_URL").unwrap_or_default(),
            ingest_api_key: env::var("BLOCKBAX_API_KEY").unwrap_or_default(),
            ingest_url: env::var("BLOCKBAX_URL").unwrap_or_default(),
        }
    }
}
