//! Body archival.
//!
//! Copies of request and response bodies are written under
//! `<directory>/<YYYYMMDD>/emo_<prefix><unix-secs>.<ext>`, with the extension derived
//! from the content type. Failures are logged and never reach the client.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::config::ArchiveConfig;

/// Which body is being archived; determines the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    ApiRequest,
    Tts,
    ApiTts,
    Resource,
}

impl ArchiveKind {
    fn prefix(&self) -> &'static str {
        match self {
            ArchiveKind::ApiRequest => "apiReq_",
            ArchiveKind::Tts => "tts_",
            ArchiveKind::ApiTts => "apitts_",
            ArchiveKind::Resource => "res_",
        }
    }
}

/// File extension for a content type. Parameters such as `charset` are ignored.
pub fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/json" => "json",
        "application/octet-stream" => "wav",
        "audio/mpeg" => "mp3",
        _ => "bin",
    }
}

#[derive(Debug, Clone)]
pub struct BodyArchive {
    enabled: bool,
    directory: PathBuf,
}

impl BodyArchive {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            enabled: config.enabled,
            directory: PathBuf::from(&config.directory),
        }
    }

    fn path_for(&self, kind: ArchiveKind, content_type: &str, now: DateTime<Local>) -> PathBuf {
        self.directory.join(now.format("%Y%m%d").to_string()).join(format!(
            "emo_{}{}.{}",
            kind.prefix(),
            now.timestamp(),
            extension_for(content_type)
        ))
    }

    /// Write `body` to the archive. No-op when archival is disabled.
    pub async fn store(&self, kind: ArchiveKind, content_type: &str, body: &[u8]) {
        if !self.enabled {
            return;
        }
        let path = self.path_for(kind, content_type, Local::now());
        if let Err(e) = write_file(&path, body).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to archive body");
        } else {
            tracing::debug!(path = %path.display(), bytes = body.len(), "Archived body");
        }
    }
}

async fn write_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await
}
