/// Marker yt-dlp prints in front of every line rendered from [`PROGRESS_TEMPLATE`]
const PROGRESS_PREFIX: &str = "[progress]|";

/// Template handed to `--progress-template`. Fields are `|`-separated and the
/// filename goes last since it may contain anything.
pub const PROGRESS_TEMPLATE: &str = "download:[progress]|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.fragment_index)s|%(progress.fragment_count)s|%(progress.filename)s";

/// One progress notification from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        downloaded: u64,
        total: Option<u64>,
        filename: Option<String>,
    },
    /// HLS/DASH sources that only report fragment counters
    DownloadingFragmented {
        fragment_index: u64,
        fragment_count: u64,
    },
    Finished {
        filename: Option<String>,
    },
    Unknown,
}

impl ProgressEvent {
    /// Completion in 0..=100, or `None` when the event says nothing about it
    pub fn percentage(&self) -> Option<f64> {
        match self {
            ProgressEvent::Downloading {
                downloaded,
                total: Some(total),
                ..
            } if *total > 0 => Some(*downloaded as f64 / *total as f64 * 100.0),
            ProgressEvent::DownloadingFragmented {
                fragment_index,
                fragment_count,
            } if *fragment_count > 0 => Some(*fragment_index as f64 / *fragment_count as f64 * 100.0),
            _ => None,
        }
    }

    /// Status line to show for this event
    pub fn status(&self) -> String {
        match self {
            ProgressEvent::Downloading { total: Some(_), filename, .. } => {
                format!("Downloading: {}", display_name(filename.as_deref()))
            }
            ProgressEvent::Downloading { total: None, .. } => "Calculating file size...".to_owned(),
            ProgressEvent::DownloadingFragmented {
                fragment_index,
                fragment_count,
            } => format!("Downloading fragment {}/{}", fragment_index, fragment_count),
            ProgressEvent::Finished { .. } => "Post-processing...".to_owned(),
            ProgressEvent::Unknown => "Working...".to_owned(),
        }
    }
}

/// Last path component, falling back to a generic word
fn display_name(filename: Option<&str>) -> &str {
    match filename {
        Some(name) => name.rsplit(['/', '\\']).next().unwrap_or(name),
        None => "file",
    }
}

/// Parses a line produced by [`PROGRESS_TEMPLATE`]. Any other output returns `None`.
pub fn parse_progress_from_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim_end().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.splitn(7, '|');
    let status = fields.next()?;
    let downloaded = number(fields.next());
    let total = number(fields.next());
    let estimate = number(fields.next());
    let fragment_index = number(fields.next());
    let fragment_count = number(fields.next());
    let filename = fields.next().filter(|f| *f != "NA" && !f.is_empty()).map(str::to_owned);

    let event = match status {
        "downloading" => match (total.or(estimate).filter(|t| *t > 0), fragment_count) {
            (Some(total), _) => ProgressEvent::Downloading {
                downloaded: downloaded.unwrap_or(0),
                total: Some(total),
                filename,
            },
            (None, Some(count)) if count > 0 => ProgressEvent::DownloadingFragmented {
                fragment_index: fragment_index.unwrap_or(0),
                fragment_count: count,
            },
            (None, _) => ProgressEvent::Downloading {
                downloaded: downloaded.unwrap_or(0),
                total: None,
                filename,
            },
        },
        "finished" => ProgressEvent::Finished { filename },
        _ => ProgressEvent::Unknown,
    };
    Some(event)
}

/// yt-dlp prints `NA` for missing fields and floats for estimates
fn number(field: Option<&str>) -> Option<u64> {
    let value: f64 = field?.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}
