use std::time::Duration;

use archivist_core::RetryPolicy;
use clap::Parser;

/// Configuration for the archivist stack.
#[derive(Parser, Debug, Clone)]
#[command(name = "archivist")]
#[command(about = "Change-aware cache and versioned record store over a remote drive")]
pub struct Config {
    /// Base URL of the remote drive API
    #[arg(
        long,
        default_value = "https://www.googleapis.com/drive/v3",
        env = "DRIVE_API_BASE"
    )]
    pub drive_api_base: String,

    /// Bearer token for the remote drive API
    #[arg(long, env = "DRIVE_API_TOKEN")]
    pub drive_api_token: String,

    /// Remote folder id acting as the root scope
    #[arg(long, env = "ROOT_FOLDER_ID")]
    pub root_folder_id: String,

    /// Name of the ledger file inside the root folder
    #[arg(long, default_value = "versions.csv", env = "LEDGER_FILE_NAME")]
    pub ledger_file_name: String,

    /// Per-request timeout (seconds)
    #[arg(long, default_value = "30", env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Attempts per remote call before a transient failure is surfaced
    #[arg(long, default_value = "3", env = "RETRY_ATTEMPTS")]
    pub retry_attempts: u32,

    /// Base delay between retry attempts (milliseconds)
    #[arg(long, default_value = "500", env = "RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: u64,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}
