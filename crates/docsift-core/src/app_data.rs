//! Where docsift stores its own data (config and processed artifacts).

use std::path::PathBuf;

/// Directory name for persisted artifacts inside the app data directory.
pub const PROCESSED_DIR_NAME: &str = "processed";

/// Returns the directory where docsift stores config and processed documents.
/// On Linux: `~/.local/share/docsift/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Docsift", "docsift")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default artifact directory: `<app data>/processed`.
pub fn default_processed_dir() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(PROCESSED_DIR_NAME))
}
