//! Runs one download job at a time off the UI thread and publishes its
//! progress as a snapshot the GUI reads every frame.
//!
//! Phases go `Idle -> Probing -> Configuring -> Running -> Completed | Failed`.
//! A terminal phase lasts until the GUI takes the pending notice.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{info, warn};
use tokio::{runtime::Handle, sync::mpsc::unbounded_channel, task::JoinHandle};

use crate::downloader::{DownloadReport, Engine};
use crate::error::AppError;
use crate::model::{DownloadRequest, JobOutcome, JobPhase, Notice, NoticeLevel, SubmitForm};
use crate::options::{self, BuildSettings};
use crate::progress::ProgressEvent;
use crate::sanitize::sanitize;

/// What the GUI renders
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySnapshot {
    pub phase: JobPhase,
    /// 0..=100
    pub percent: f64,
    pub status: String,
}

impl Default for RelaySnapshot {
    fn default() -> Self {
        Self {
            phase: JobPhase::Idle,
            percent: 0.0,
            status: "Waiting for a URL...".to_owned(),
        }
    }
}

#[derive(Default)]
struct Shared {
    snapshot: RelaySnapshot,
    notice: Option<Notice>,
}

type SharedState = Arc<Mutex<Shared>>;

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Relay {
    engine: Arc<dyn Engine>,
    settings: BuildSettings,
    runtime: Handle,
    shared: SharedState,
}

impl Relay {
    pub fn new(engine: Arc<dyn Engine>, settings: BuildSettings, runtime: Handle) -> Self {
        Self {
            engine,
            settings,
            runtime,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        lock(&self.shared).snapshot.clone()
    }

    /// Hands the pending notice to the caller. Taking a notice after a job
    /// ended returns the relay to `Idle`.
    pub fn take_notice(&self) -> Option<Notice> {
        let mut shared = lock(&self.shared);
        let notice = shared.notice.take();
        if notice.is_some() && matches!(shared.snapshot.phase, JobPhase::Completed | JobPhase::Failed) {
            shared.snapshot.phase = JobPhase::Idle;
        }
        notice
    }

    /// Validates the form and starts a job in the background.
    ///
    /// Rejections are synchronous and also leave a warning notice behind.
    pub fn submit(&self, form: SubmitForm) -> Result<JoinHandle<JobOutcome>, AppError> {
        let request = match validate(form) {
            Ok(request) => request,
            Err(err) => return Err(self.reject(err)),
        };

        {
            let mut shared = lock(&self.shared);
            if shared.snapshot.phase.is_busy() {
                drop(shared);
                return Err(self.reject(AppError::Busy));
            }
            // an unread notice from the previous job counts as acknowledged
            shared.notice = None;
            shared.snapshot = RelaySnapshot {
                phase: JobPhase::Probing,
                percent: 0.0,
                status: "Starting download...".to_owned(),
            };
        }

        info!("Job accepted: {} -> {}", request.url, request.destination.display());
        let engine = Arc::clone(&self.engine);
        let settings = self.settings.clone();
        let shared = Arc::clone(&self.shared);
        Ok(self.runtime.spawn(async move {
            let inner = tokio::spawn(execute(engine, settings, Arc::clone(&shared), request));
            let result = match inner.await {
                Ok(result) => result,
                Err(join_err) => Err(AppError::Unexpected(join_err.to_string())),
            };
            finish(&shared, result)
        }))
    }

    /// Leaves a warning notice unless a finished job's notice is still unread.
    fn reject(&self, err: AppError) -> AppError {
        warn!("Submission rejected: {}", err);
        let mut shared = lock(&self.shared);
        let result_pending =
            shared.notice.is_some() && matches!(shared.snapshot.phase, JobPhase::Completed | JobPhase::Failed);
        if !result_pending {
            shared.notice = Some(Notice {
                level: NoticeLevel::Warning,
                title: "Warning".to_owned(),
                message: err.to_string(),
                folder: None,
            });
        }
        err
    }
}

/// Both URL and destination are required
pub fn validate(form: SubmitForm) -> Result<DownloadRequest, AppError> {
    let url = form.url.trim();
    let destination = form.destination.trim();
    if url.is_empty() || destination.is_empty() {
        return Err(AppError::Validation(
            "Please enter a URL and choose a destination folder.".to_owned(),
        ));
    }
    Ok(DownloadRequest {
        url: url.to_owned(),
        destination: PathBuf::from(destination),
        kind: form.kind,
        cookie_file: form.cookie_file,
    })
}

fn set_phase(shared: &Mutex<Shared>, phase: JobPhase, status: impl Into<String>) {
    let mut shared = lock(shared);
    shared.snapshot.phase = phase;
    shared.snapshot.status = status.into();
}

/// Folds one engine event into the snapshot. Percentage only moves when the
/// event carries a usable ratio.
fn apply(shared: &Mutex<Shared>, event: &ProgressEvent) {
    let mut shared = lock(shared);
    if let Some(percent) = event.percentage() {
        shared.snapshot.percent = percent.clamp(0.0, 100.0);
    }
    shared.snapshot.status = event.status();
}

async fn execute(
    engine: Arc<dyn Engine>,
    settings: BuildSettings,
    shared: SharedState,
    request: DownloadRequest,
) -> Result<(PathBuf, DownloadReport), AppError> {
    set_phase(&shared, JobPhase::Probing, "Analyzing link...");
    info!("Probing {} with {}", request.url, engine.name());
    let metadata = engine
        .probe(&request.url)
        .await
        .map_err(|e| AppError::ProbeFailed(e.to_string()))?;

    let folder_name = sanitize(&metadata.folder_name());
    set_phase(
        &shared,
        JobPhase::Configuring,
        format!("Downloading playlist: {}", folder_name),
    );
    let options = options::build(&request, &metadata, &settings);
    tokio::fs::create_dir_all(&options.folder).await?;

    set_phase(&shared, JobPhase::Running, format!("Downloading playlist: {}", folder_name));
    info!("Downloading into {}", options.folder.display());

    let (tx, mut rx) = unbounded_channel::<ProgressEvent>();
    let relay_state = Arc::clone(&shared);
    let consumer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            apply(&relay_state, &event);
        }
    });

    let result = engine.download(&options, tx).await;
    // the sender is gone once download returns, so this drains and ends
    let _ = consumer.await;
    let report = result?;

    Ok((options.folder, report))
}

fn finish(shared: &Mutex<Shared>, result: Result<(PathBuf, DownloadReport), AppError>) -> JobOutcome {
    let mut shared = lock(shared);
    match result {
        Ok((folder, report)) => {
            info!(
                "Job completed: {} ({} finished, {} skipped)",
                folder.display(),
                report.finished,
                report.skipped.len()
            );
            let saved = format!("Files saved in:\n{}", folder.display());
            let (status, notice) = if report.skipped.is_empty() {
                (
                    "Completed successfully!",
                    Notice {
                        level: NoticeLevel::Info,
                        title: "Success".to_owned(),
                        message: saved,
                        folder: Some(folder.clone()),
                    },
                )
            } else {
                (
                    "Completed with skipped items.",
                    Notice {
                        level: NoticeLevel::Warning,
                        title: "Completed with skipped items".to_owned(),
                        message: format!("{}\n\nSkipped:\n{}", saved, report.skipped.join("\n")),
                        folder: Some(folder.clone()),
                    },
                )
            };
            shared.snapshot = RelaySnapshot {
                phase: JobPhase::Completed,
                percent: 100.0,
                status: status.to_owned(),
            };
            shared.notice = Some(notice);
            JobOutcome::Success(folder)
        }
        Err(err) => {
            let message = err.to_string();
            warn!("Job failed: {}", message);
            shared.snapshot.phase = JobPhase::Failed;
            shared.snapshot.status = "Download failed.".to_owned();
            shared.notice = Some(Notice {
                level: NoticeLevel::Error,
                title: "Error".to_owned(),
                message: message.clone(),
                folder: None,
            });
            JobOutcome::Failed(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::EngineError;
    use crate::model::{OutputKind, PlaylistMetadata};
    use crate::options::EngineOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, mpsc::UnboundedSender};

    #[derive(Default)]
    struct Gate {
        started: Notify,
        release: Notify,
    }

    struct ScriptedEngine {
        probe: Result<PlaylistMetadata, String>,
        events: Vec<ProgressEvent>,
        download: Result<DownloadReport, String>,
        gate: Option<Arc<Gate>>,
        probe_calls: AtomicUsize,
        download_calls: AtomicUsize,
        seen_options: Mutex<Option<EngineOptions>>,
    }

    impl ScriptedEngine {
        fn new(owner: &str, title: &str) -> Self {
            Self {
                probe: Ok(PlaylistMetadata {
                    title: title.into(),
                    owner: owner.into(),
                }),
                events: Vec::new(),
                download: Ok(DownloadReport::default()),
                gate: None,
                probe_calls: AtomicUsize::new(0),
                download_calls: AtomicUsize::new(0),
                seen_options: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn probe(&self, _url: &str) -> Result<PlaylistMetadata, EngineError> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            self.probe.clone().map_err(|message| EngineError::Exited {
                code: Some(1),
                message,
            })
        }

        async fn download(
            &self,
            options: &EngineOptions,
            progress: UnboundedSender<ProgressEvent>,
        ) -> Result<DownloadReport, EngineError> {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_options.lock().unwrap() = Some(options.clone());
            if let Some(gate) = &self.gate {
                gate.started.notify_one();
                gate.release.notified().await;
            }
            for event in &self.events {
                progress.send(event.clone()).unwrap();
            }
            self.download.clone().map_err(|message| EngineError::Exited {
                code: Some(1),
                message,
            })
        }
    }

    fn form(url: &str, destination: &str) -> SubmitForm {
        SubmitForm {
            url: url.into(),
            destination: destination.into(),
            kind: OutputKind::AudioOnly,
            cookie_file: None,
        }
    }

    fn relay(engine: &Arc<ScriptedEngine>) -> Relay {
        let engine: Arc<dyn Engine> = engine.clone();
        Relay::new(engine, BuildSettings::default(), Handle::current())
    }

    #[tokio::test]
    async fn completes_and_creates_job_folder() {
        let dest = tempfile::tempdir().unwrap();
        let mut engine = ScriptedEngine::new("DJ X", "Chill Mix");
        engine.events = vec![
            ProgressEvent::Downloading {
                downloaded: 50,
                total: Some(200),
                filename: Some("01 - Intro.webm".into()),
            },
            ProgressEvent::DownloadingFragmented {
                fragment_index: 6,
                fragment_count: 12,
            },
        ];
        let engine = Arc::new(engine);
        let relay = relay(&engine);

        let outcome = relay
            .submit(form("https://example/playlist", dest.path().to_str().unwrap()))
            .unwrap()
            .await
            .unwrap();

        let folder = dest.path().join("DJ X - Chill Mix");
        assert_eq!(outcome, JobOutcome::Success(folder.clone()));
        assert!(folder.is_dir());

        let snap = relay.snapshot();
        assert_eq!(snap.phase, JobPhase::Completed);
        assert_eq!(snap.percent, 100.0);

        let seen = engine.seen_options.lock().unwrap().clone().unwrap();
        assert_eq!(seen.folder, folder);
        assert_eq!(seen.url, "https://example/playlist");

        let notice = relay.take_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(notice.folder, Some(folder));
        assert_eq!(relay.snapshot().phase, JobPhase::Idle);
    }

    #[tokio::test]
    async fn download_failure_is_surfaced_verbatim() {
        let dest = tempfile::tempdir().unwrap();
        let mut engine = ScriptedEngine::new("DJ X", "Chill Mix");
        engine.download = Err("ERROR: [youtube] x: Video unavailable".into());
        let engine = Arc::new(engine);
        let relay = relay(&engine);

        let outcome = relay
            .submit(form("https://example/playlist", dest.path().to_str().unwrap()))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::Failed("ERROR: [youtube] x: Video unavailable".into()));
        assert_eq!(relay.snapshot().phase, JobPhase::Failed);
        let notice = relay.take_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "ERROR: [youtube] x: Video unavailable");
        assert_eq!(relay.snapshot().phase, JobPhase::Idle);
        // partial output is not rolled back
        assert!(dest.path().join("DJ X - Chill Mix").is_dir());
    }

    #[tokio::test]
    async fn probe_failure_creates_nothing() {
        let dest = tempfile::tempdir().unwrap();
        let mut engine = ScriptedEngine::new("a", "b");
        engine.probe = Err("ERROR: Unsupported URL".into());
        let engine = Arc::new(engine);
        let relay = relay(&engine);

        let outcome = relay
            .submit(form("notaurl", dest.path().to_str().unwrap()))
            .unwrap()
            .await
            .unwrap();

        match outcome {
            JobOutcome::Failed(message) => assert!(message.contains("Unsupported URL")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.download_calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
        assert_eq!(relay.snapshot().phase, JobPhase::Failed);
    }

    #[tokio::test]
    async fn empty_fields_never_start_a_job() {
        let engine = Arc::new(ScriptedEngine::new("a", "b"));
        let relay = relay(&engine);

        for f in [form("", "/tmp/out"), form("https://example/playlist", "  "), form(" ", "")] {
            let err = relay.submit(f).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            let notice = relay.take_notice().unwrap();
            assert_eq!(notice.level, NoticeLevel::Warning);
        }
        assert_eq!(relay.snapshot().phase, JobPhase::Idle);
        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.download_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_submission_while_running_is_rejected() {
        let dest = tempfile::tempdir().unwrap();
        let gate = Arc::new(Gate::default());
        let mut engine = ScriptedEngine::new("DJ X", "Chill Mix");
        engine.gate = Some(Arc::clone(&gate));
        let engine = Arc::new(engine);
        let relay = relay(&engine);
        let dest_str = dest.path().to_str().unwrap();

        let first = relay.submit(form("https://example/playlist", dest_str)).unwrap();
        gate.started.notified().await;
        assert_eq!(relay.snapshot().phase, JobPhase::Running);
        assert!(relay.snapshot().phase.is_busy());

        let err = relay.submit(form("https://example/other", dest_str)).unwrap_err();
        assert!(matches!(err, AppError::Busy));
        assert_eq!(relay.snapshot().phase, JobPhase::Running);

        gate.release.notify_one();
        assert!(matches!(first.await.unwrap(), JobOutcome::Success(_)));
        assert_eq!(engine.probe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.download_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_job_after_unread_notice_is_accepted() {
        let dest = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new("DJ X", "Chill Mix"));
        let relay = relay(&engine);
        let dest_str = dest.path().to_str().unwrap();

        relay.submit(form("https://example/a", dest_str)).unwrap().await.unwrap();
        assert_eq!(relay.snapshot().phase, JobPhase::Completed);
        relay.submit(form("https://example/b", dest_str)).unwrap().await.unwrap();
        assert_eq!(engine.download_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn events_update_percent_and_status() {
        let shared = Mutex::new(Shared::default());
        apply(
            &shared,
            &ProgressEvent::Downloading {
                downloaded: 50,
                total: Some(200),
                filename: None,
            },
        );
        assert_eq!(lock(&shared).snapshot.percent, 25.0);

        apply(
            &shared,
            &ProgressEvent::Downloading {
                downloaded: 80,
                total: None,
                filename: None,
            },
        );
        let snap = lock(&shared).snapshot.clone();
        assert_eq!(snap.percent, 25.0);
        assert_eq!(snap.status, "Calculating file size...");

        apply(
            &shared,
            &ProgressEvent::DownloadingFragmented {
                fragment_index: 9,
                fragment_count: 12,
            },
        );
        assert_eq!(lock(&shared).snapshot.percent, 75.0);
    }

    #[test]
    fn validate_trims_input() {
        let request = validate(SubmitForm {
            url: "  https://example/playlist \n".into(),
            destination: " /tmp/out ".into(),
            kind: OutputKind::VideoWithMaxHeight(480),
            cookie_file: Some(PathBuf::from("/c.txt")),
        })
        .unwrap();
        assert_eq!(request.url, "https://example/playlist");
        assert_eq!(request.destination, PathBuf::from("/tmp/out"));
        assert_eq!(request.kind, OutputKind::VideoWithMaxHeight(480));
        assert_eq!(request.cookie_file, Some(PathBuf::from("/c.txt")));
    }

    #[tokio::test]
    async fn skipped_items_still_complete_with_a_warning() {
        let dest = tempfile::tempdir().unwrap();
        let mut engine = ScriptedEngine::new("DJ X", "Chill Mix");
        engine.download = Ok(DownloadReport {
            finished: 2,
            skipped: vec!["ERROR: [youtube] xyz: Private video".into()],
        });
        let engine = Arc::new(engine);
        let relay = relay(&engine);

        let outcome = relay
            .submit(form("https://example/playlist", dest.path().to_str().unwrap()))
            .unwrap()
            .await
            .unwrap();

        let folder = dest.path().join("DJ X - Chill Mix");
        assert_eq!(outcome, JobOutcome::Success(folder.clone()));
        let snap = relay.snapshot();
        assert_eq!(snap.phase, JobPhase::Completed);
        assert_eq!(snap.percent, 100.0);
        let notice = relay.take_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.folder, Some(folder));
        assert!(notice.message.contains("ERROR: [youtube] xyz: Private video"));
    }

    #[tokio::test]
    async fn rejection_keeps_unread_result_notice() {
        let dest = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new("DJ X", "Chill Mix"));
        let relay = relay(&engine);

        relay
            .submit(form("https://example/playlist", dest.path().to_str().unwrap()))
            .unwrap()
            .await
            .unwrap();
        let err = relay.submit(form("", "")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let notice = relay.take_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(notice.title, "Success");
        assert_eq!(relay.snapshot().phase, JobPhase::Idle);
        assert_eq!(relay.take_notice(), None);
    }
}
