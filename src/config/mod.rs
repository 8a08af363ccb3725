use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the task queue
    pub redis_url: String,

    /// Bitstudio API key (try-on + image-edit endpoints)
    pub bitstudio_api_key: String,

    /// Bitstudio API base URL
    #[serde(default = "default_bitstudio_base_url")]
    pub bitstudio_base_url: String,

    /// Media vendor API key (background removal + video synthesis)
    pub media_api_key: String,

    /// Media vendor API base URL
    pub media_base_url: String,

    /// S3 bucket name for generated assets
    pub s3_bucket: String,

    /// S3 region label
    pub s3_region: String,

    /// S3 endpoint URL
    pub s3_endpoint: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    /// CDN domain prefixed onto stored object keys (e.g., "https://cdn.example.com")
    pub cdn_domain: String,

    /// Seconds between try-on status checks
    #[serde(default = "default_tryon_poll_interval_secs")]
    pub tryon_poll_interval_secs: u64,

    /// Status checks per interactive try-on job (2s x 15 = 30s budget)
    #[serde(default = "default_tryon_poll_attempts")]
    pub tryon_poll_attempts: u32,

    /// Status checks per catalog fan-out try-on job (2s x 30 = 60s budget)
    #[serde(default = "default_fanout_poll_attempts")]
    pub fanout_poll_attempts: u32,

    /// Seconds between video status checks
    #[serde(default = "default_video_poll_interval_secs")]
    pub video_poll_interval_secs: u64,

    /// Status checks per video job (10s x 60 = 10min budget)
    #[serde(default = "default_video_poll_attempts")]
    pub video_poll_attempts: u32,

    /// How long an interactive request waits for chord aggregation
    #[serde(default = "default_chord_collect_timeout_secs")]
    pub chord_collect_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_bitstudio_base_url() -> String {
    "https://api.bitstudio.ai".to_string()
}

fn default_tryon_poll_interval_secs() -> u64 {
    2
}

fn default_tryon_poll_attempts() -> u32 {
    15
}

fn default_fanout_poll_attempts() -> u32 {
    30
}

fn default_video_poll_interval_secs() -> u64 {
    10
}

fn default_video_poll_attempts() -> u32 {
    60
}

fn default_chord_collect_timeout_secs() -> u64 {
    90
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Poll budgets handed to the worker and route layers.
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            tryon_interval_secs: self.tryon_poll_interval_secs,
            tryon_attempts: self.tryon_poll_attempts,
            fanout_attempts: self.fanout_poll_attempts,
            video_interval_secs: self.video_poll_interval_secs,
            video_attempts: self.video_poll_attempts,
            chord_collect_timeout_secs: self.chord_collect_timeout_secs,
        }
    }
}

/// Per-workflow poll budgets, resolved once from config.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub tryon_interval_secs: u64,
    pub tryon_attempts: u32,
    pub fanout_attempts: u32,
    pub video_interval_secs: u64,
    pub video_attempts: u32,
    pub chord_collect_timeout_secs: u64,
}
