use std::path::PathBuf;

/// Title used when the source reports none
pub const DEFAULT_TITLE: &str = "Playlist";
/// Owner used when the source has no playlist entries to attribute
pub const DEFAULT_ARTIST: &str = "Artist";
/// Owner used when the first entry names no uploader, artist or channel
pub const DEFAULT_VARIOUS: &str = "Various";

/// What the user wants out of the download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Best audio stream, re-encoded to mp3
    AudioOnly,
    /// Best video no taller than the given height, merged with best audio
    VideoWithMaxHeight(u32),
}

impl OutputKind {
    /// Choices offered in the format selector, in display order
    pub const CHOICES: [OutputKind; 5] = [
        OutputKind::AudioOnly,
        OutputKind::VideoWithMaxHeight(360),
        OutputKind::VideoWithMaxHeight(480),
        OutputKind::VideoWithMaxHeight(720),
        OutputKind::VideoWithMaxHeight(1080),
    ];

    pub fn label(&self) -> String {
        match self {
            OutputKind::AudioOnly => "MP3 (audio only)".to_owned(),
            OutputKind::VideoWithMaxHeight(h) => format!("MP4 ({}p)", h),
        }
    }
}

/// Raw form contents at the moment the user pressed Download
#[derive(Debug, Clone)]
pub struct SubmitForm {
    pub url: String,
    pub destination: String,
    pub kind: OutputKind,
    pub cookie_file: Option<PathBuf>,
}

/// A validated download job. Built once per submission and consumed by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    pub kind: OutputKind,
    pub cookie_file: Option<PathBuf>,
}

/// Naming information pulled from a metadata-only probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistMetadata {
    pub title: String,
    pub owner: String,
}

impl PlaylistMetadata {
    /// `"<owner> - <title>"`, before sanitizing
    pub fn folder_name(&self) -> String {
        format!("{} - {}", self.owner, self.title)
    }
}

/// Where a job currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Probing,
    Configuring,
    Running,
    Completed,
    Failed,
}

impl JobPhase {
    /// True while a job holds the relay and new submissions must be refused
    pub fn is_busy(&self) -> bool {
        matches!(self, JobPhase::Probing | JobPhase::Configuring | JobPhase::Running)
    }
}

/// Terminal result of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Files were written under this folder
    Success(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Message box content waiting to be shown by the GUI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
    /// Folder to offer in an "Open Folder" action
    pub folder: Option<PathBuf>,
}
