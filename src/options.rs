//! Turns a validated request plus probe metadata into yt-dlp options.

use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::model::{DownloadRequest, OutputKind, PlaylistMetadata};
use crate::progress::PROGRESS_TEMPLATE;
use crate::sanitize::sanitize;

/// Per-file name inside the job folder
pub const FILE_TEMPLATE: &str = "%(playlist_index)02d - %(title)s.%(ext)s";

pub const AUDIO_CODEC: &str = "mp3";
pub const VIDEO_CONTAINER: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    ExtractAudio { codec: &'static str, bitrate_kbps: u32 },
    RemuxVideo { container: &'static str },
}

/// Engine-independent description of one download run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub url: String,
    /// Folder created for this job, `<dest>/<sanitized folder name>`
    pub folder: PathBuf,
    pub output_template: String,
    pub format: String,
    /// Container the merged streams are written to, if forced
    pub merge_output_format: Option<&'static str>,
    pub post_processors: Vec<PostProcessor>,
    pub ignore_errors: bool,
    pub geo_bypass: bool,
    pub retries: u32,
    pub fragment_retries: u32,
    pub cookie_file: Option<PathBuf>,
    pub ffmpeg_location: Option<PathBuf>,
}

/// Tunables that come from configuration rather than from the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub retries: u32,
    pub fragment_retries: u32,
    pub audio_bitrate_kbps: u32,
    pub ffmpeg_location: Option<PathBuf>,
}

impl BuildSettings {
    pub fn from_config(cfg: &AppConfig, ffmpeg_location: Option<PathBuf>) -> Self {
        Self {
            retries: cfg.retries,
            fragment_retries: cfg.fragment_retries,
            audio_bitrate_kbps: cfg.audio_bitrate_kbps,
            ffmpeg_location,
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            retries: crate::config::DEFAULT_RETRIES,
            fragment_retries: crate::config::DEFAULT_FRAGMENT_RETRIES,
            audio_bitrate_kbps: crate::config::DEFAULT_AUDIO_BITRATE_KBPS,
            ffmpeg_location: None,
        }
    }
}

/// `<dest>/<sanitize("<owner> - <title>")>`
pub fn job_folder(destination: &Path, metadata: &PlaylistMetadata) -> PathBuf {
    destination.join(sanitize(&metadata.folder_name()))
}

pub fn build(request: &DownloadRequest, metadata: &PlaylistMetadata, settings: &BuildSettings) -> EngineOptions {
    let folder = job_folder(&request.destination, metadata);
    let output_template = folder.join(FILE_TEMPLATE).to_string_lossy().into_owned();

    let (format, merge_output_format, post_processors) = match request.kind {
        OutputKind::AudioOnly => (
            "bestaudio/best".to_owned(),
            None,
            vec![PostProcessor::ExtractAudio {
                codec: AUDIO_CODEC,
                bitrate_kbps: settings.audio_bitrate_kbps,
            }],
        ),
        OutputKind::VideoWithMaxHeight(h) => (
            format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
            Some(VIDEO_CONTAINER),
            vec![PostProcessor::RemuxVideo {
                container: VIDEO_CONTAINER,
            }],
        ),
    };

    EngineOptions {
        url: request.url.clone(),
        folder,
        output_template,
        format,
        merge_output_format,
        post_processors,
        ignore_errors: true,
        geo_bypass: true,
        retries: settings.retries,
        fragment_retries: settings.fragment_retries,
        cookie_file: request.cookie_file.clone(),
        ffmpeg_location: settings.ffmpeg_location.clone(),
    }
}

impl EngineOptions {
    /// Command-line arguments for yt-dlp, URL last
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_owned(),
            self.format.clone(),
            "-o".to_owned(),
            self.output_template.clone(),
            "--yes-playlist".to_owned(),
            "--newline".to_owned(),
            "--progress-template".to_owned(),
            PROGRESS_TEMPLATE.to_owned(),
            "--retries".to_owned(),
            self.retries.to_string(),
            "--fragment-retries".to_owned(),
            self.fragment_retries.to_string(),
            "--hls-prefer-native".to_owned(),
        ];

        if let Some(container) = self.merge_output_format {
            args.push("--merge-output-format".to_owned());
            args.push(container.to_owned());
        }
        for pp in &self.post_processors {
            match pp {
                PostProcessor::ExtractAudio { codec, bitrate_kbps } => {
                    args.push("--extract-audio".to_owned());
                    args.push("--audio-format".to_owned());
                    args.push((*codec).to_owned());
                    args.push("--audio-quality".to_owned());
                    args.push(format!("{}K", bitrate_kbps));
                }
                PostProcessor::RemuxVideo { container } => {
                    args.push("--remux-video".to_owned());
                    args.push((*container).to_owned());
                }
            }
        }
        if self.ignore_errors {
            args.push("--ignore-errors".to_owned());
        }
        if self.geo_bypass {
            args.push("--geo-bypass".to_owned());
        }
        if let Some(cookies) = &self.cookie_file {
            args.push("--cookies".to_owned());
            args.push(cookies.to_string_lossy().into_owned());
        }
        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_owned());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        args.push(self.url.clone());
        args
    }
}
