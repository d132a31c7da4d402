use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const APP_DIR_NAME: &str = "playlist-dl";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ENV_YTDLP: &str = "PLAYLIST_DL_YTDLP";
pub const ENV_FFMPEG: &str = "PLAYLIST_DL_FFMPEG";

pub const DEFAULT_RETRIES: u32 = 10;
pub const DEFAULT_FRAGMENT_RETRIES: u32 = 20;
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 192;

/// User settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Folder pre-filled in the destination field
    pub download_dir: PathBuf,
    /// Explicit yt-dlp binary
    pub yt_dlp_path: Option<PathBuf>,
    /// Explicit ffmpeg binary or directory
    pub ffmpeg_location: Option<PathBuf>,
    pub retries: u32,
    pub fragment_retries: u32,
    pub audio_bitrate_kbps: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            yt_dlp_path: None,
            ffmpeg_location: None,
            retries: DEFAULT_RETRIES,
            fragment_retries: DEFAULT_FRAGMENT_RETRIES,
            audio_bitrate_kbps: DEFAULT_AUDIO_BITRATE_KBPS,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Reads the config file if present. A missing file yields `None`.
pub fn read_config(path: &Path) -> Result<Option<AppConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let cfg = toml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))?;
    Ok(Some(cfg))
}

/// Defaults, overlaid with the config file, overlaid with the environment.
pub fn load_config() -> Result<AppConfig> {
    let from_file = match default_config_path() {
        Some(path) => read_config(&path)?,
        None => None,
    };
    let mut cfg = from_file.unwrap_or_default();
    apply_env(&mut cfg, |key| std::env::var_os(key));
    Ok(cfg)
}

fn apply_env<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<std::ffi::OsString>,
{
    if let Some(path) = lookup(ENV_YTDLP).filter(|v| !v.is_empty()) {
        cfg.yt_dlp_path = Some(PathBuf::from(path));
    }
    if let Some(path) = lookup(ENV_FFMPEG).filter(|v| !v.is_empty()) {
        cfg.ffmpeg_location = Some(PathBuf::from(path));
    }
}
