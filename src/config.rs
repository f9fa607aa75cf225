use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Paperloom";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the data directory (database, blobs, config file).
pub const DATA_DIR_ENV: &str = "PAPERLOOM_DATA_DIR";
/// Overrides the HTTP listen address.
pub const BIND_ENV: &str = "PAPERLOOM_BIND";
/// Overrides the pipeline config file location.
pub const CONFIG_ENV: &str = "PAPERLOOM_CONFIG";

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Get the application data directory.
/// `$PAPERLOOM_DATA_DIR` if set, else `<platform data dir>/Paperloom`.
pub fn app_data_dir() -> PathBuf {
    resolve_data_dir(std::env::var(DATA_DIR_ENV).ok())
}

fn resolve_data_dir(override_dir: Option<String>) -> PathBuf {
    match override_dir.filter(|d| !d.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME),
    }
}

/// SQLite database holding papers, the question bank and sessions.
pub fn database_path() -> PathBuf {
    app_data_dir().join("paperloom.db")
}

/// Content-addressed storage for uploaded PDFs.
pub fn blobs_dir() -> PathBuf {
    app_data_dir().join("blobs")
}

/// Pipeline tuning file. Missing file means defaults.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| app_data_dir().join("pipeline.json"))
}

pub fn bind_addr() -> String {
    std::env::var(BIND_ENV).unwrap_or_else(|_| DEFAULT_BIND.to_string())
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,paperloom_lib=debug,tower_http=info"
}
