use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub retailers_path: PathBuf,
    pub targets_path: PathBuf,
    pub output_path: PathBuf,
    /// Where page snapshots and screenshots land after unexpected failures.
    pub debug_dir: PathBuf,
    pub log_level: String,
    pub headless: bool,
    /// Browser executable; `None` lets the driver locate one.
    pub chrome_path: Option<PathBuf>,
}
