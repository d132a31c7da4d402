use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use async_trait::async_trait;
use log::{debug, info, warn};
use rust_embed::RustEmbed;
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc::UnboundedSender,
};

use crate::config::AppConfig;
use crate::model::{DEFAULT_ARTIST, DEFAULT_TITLE, DEFAULT_VARIOUS, PlaylistMetadata};
use crate::options::EngineOptions;
use crate::progress::{ProgressEvent, parse_progress_from_line};

/// Binaries bundled at build time. Empty unless someone drops yt-dlp into `assets/`.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

const YTDLP_BIN: &str = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
const FFMPEG_BIN: &str = if cfg!(target_os = "windows") { "ffmpeg.exe" } else { "ffmpeg" };

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process ran and reported failure. `message` is what yt-dlp printed.
    #[error("{message}")]
    Exited { code: Option<i32>, message: String },

    #[error("Could not decode yt-dlp output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The external extraction/download program.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Metadata-only lookup; no media is fetched
    async fn probe(&self, url: &str) -> Result<PlaylistMetadata, EngineError>;

    /// Blocking download. Progress is reported on `progress` as it arrives.
    async fn download(
        &self,
        options: &EngineOptions,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<DownloadReport, EngineError>;
}

/// What a download run that did not fail left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Files the engine reported as finished
    pub finished: usize,
    /// `ERROR:` lines for playlist items that were skipped
    pub skipped: Vec<String>,
}

/// Subset of `yt-dlp -J --flat-playlist` we care about
#[derive(Debug, Default, Deserialize)]
pub struct ProbeInfo {
    pub title: Option<String>,
    #[serde(flatten)]
    pub attribution: Attribution,
    #[serde(default)]
    pub entries: Option<Vec<Option<Attribution>>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Attribution {
    pub uploader: Option<String>,
    pub artist: Option<String>,
    pub channel: Option<String>,
}

impl Attribution {
    fn owner(&self) -> Option<&str> {
        [&self.uploader, &self.artist, &self.channel]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

impl ProbeInfo {
    /// Owner comes from the first entry, falling back to "Various" when that
    /// entry names nobody. Without a usable entry (single videos) the top
    /// level is read, falling back to "Artist".
    pub fn into_metadata(self) -> PlaylistMetadata {
        let first_entry = self
            .entries
            .as_ref()
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.as_ref());
        let owner = match first_entry {
            Some(entry) => entry.owner().unwrap_or(DEFAULT_VARIOUS).to_owned(),
            None => self.attribution.owner().unwrap_or(DEFAULT_ARTIST).to_owned(),
        };
        let title = self
            .title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_owned());
        PlaylistMetadata { title, owner }
    }
}

/// yt-dlp driven as a child process
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Config/env override, then the bundled binary, then `PATH`.
    pub fn locate(cfg: &AppConfig) -> std::io::Result<Self> {
        if let Some(path) = &cfg.yt_dlp_path {
            info!("Using configured yt-dlp at {}", path.display());
            return Ok(Self::new(path));
        }
        if let Some(path) = extract_bundled(YTDLP_BIN)? {
            info!("Using bundled yt-dlp extracted to {}", path.display());
            return Ok(Self::new(path));
        }
        info!("Using yt-dlp from PATH");
        Ok(Self::new(YTDLP_BIN))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            program: self.program.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl Engine for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<PlaylistMetadata, EngineError> {
        debug!("probe: {} -J --flat-playlist {}", self.program.display(), url);
        let out = self
            .command()
            .args(["-J", "--flat-playlist", "--skip-download", "--no-warnings", url])
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let errors: Vec<String> = stderr.lines().filter(|l| is_error_line(l)).map(str::to_owned).collect();
            let message = if errors.is_empty() {
                fallback_message(out.status, stderr.trim())
            } else {
                errors.join("\n")
            };
            return Err(EngineError::Exited {
                code: out.status.code(),
                message,
            });
        }

        let info: ProbeInfo = serde_json::from_slice(&out.stdout)?;
        Ok(info.into_metadata())
    }

    async fn download(
        &self,
        options: &EngineOptions,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<DownloadReport, EngineError> {
        let args = options.to_args();
        debug!("download: {} {:?}", self.program.display(), args);

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("yt-dlp stderr was not captured"))?;
        let stderr_task = tokio::spawn(collect_errors(stderr));

        // console code pages are not always UTF-8, so decode each line lossily
        let mut lines = BufReader::new(stdout).split(b'\n');
        let mut finished = 0;
        while let Some(raw) = lines.next_segment().await? {
            let line = String::from_utf8_lossy(&raw);
            match parse_progress_from_line(&line) {
                Some(event) => {
                    if matches!(event, ProgressEvent::Finished { .. }) {
                        finished += 1;
                    }
                    let _ = progress.send(event);
                }
                None => debug!("yt-dlp> {}", line.trim_end()),
            }
        }

        let status = child.wait().await?;
        let errors = stderr_task.await.unwrap_or_default();
        settle(status, errors, finished, options.ignore_errors)
    }
}

/// Maps the exit of a download run. With `ignore_errors`, a non-zero exit
/// after at least one finished file means some items were skipped.
fn settle(
    status: ExitStatus,
    errors: Vec<String>,
    finished: usize,
    ignore_errors: bool,
) -> Result<DownloadReport, EngineError> {
    if status.success() || (ignore_errors && finished > 0) {
        if !status.success() {
            warn!("yt-dlp exited with {} after {} finished file(s); treating failures as skipped", status, finished);
        }
        return Ok(DownloadReport {
            finished,
            skipped: errors,
        });
    }
    let message = if errors.is_empty() {
        fallback_message(status, "")
    } else {
        errors.join("\n")
    };
    Err(EngineError::Exited {
        code: status.code(),
        message,
    })
}

fn is_error_line(line: &str) -> bool {
    line.starts_with("ERROR:")
}

fn fallback_message(status: ExitStatus, stderr: &str) -> String {
    match stderr.lines().last() {
        Some(last) if !last.trim().is_empty() => last.trim().to_owned(),
        _ => format!("yt-dlp exited with {}", status),
    }
}

/// Drains stderr so the child never blocks on a full pipe; keeps the ERROR lines.
async fn collect_errors<R>(stderr: R) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut errors = Vec::new();
    let mut lines = BufReader::new(stderr).split(b'\n');
    while let Ok(Some(raw)) = lines.next_segment().await {
        let decoded = String::from_utf8_lossy(&raw);
        let line = decoded.trim_end();
        if is_error_line(line) {
            warn!("yt-dlp: {}", line);
            errors.push(line.to_owned());
        } else {
            debug!("yt-dlp stderr> {}", line);
        }
    }
    errors
}

/// Writes an embedded binary to the temp dir once and returns its path.
fn extract_bundled(bin: &str) -> std::io::Result<Option<PathBuf>> {
    let Some(data) = Asset::get(bin) else {
        return Ok(None);
    };
    let tmp = std::env::temp_dir().join(bin);
    if !tmp.exists() {
        let mut f = File::create(&tmp)?;
        f.write_all(&data.data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
    }
    Ok(Some(tmp))
}

/// Config/env override, then an ffmpeg shipped next to the executable.
/// `None` leaves yt-dlp to find a system install.
pub fn locate_media_tool(cfg: &AppConfig) -> Option<PathBuf> {
    if let Some(path) = &cfg.ffmpeg_location {
        return Some(path.clone());
    }
    let exe = std::env::current_exe().ok()?;
    bundled_media_tool(exe.parent()?)
}

fn bundled_media_tool(app_dir: &Path) -> Option<PathBuf> {
    let candidate = app_dir.join(FFMPEG_BIN);
    candidate.is_file().then_some(candidate)
}
