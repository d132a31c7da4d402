//! Playlist downloader GUI: a thin egui front end over yt-dlp

// Configuration file and environment overrides
mod config;
// yt-dlp process binding
mod downloader;
// Error taxonomy surfaced to the user
mod error;
// Data models for requests, jobs and notices
mod model;
// yt-dlp argument building
mod options;
// Progress events and parsing
mod progress;
// Background job runner and shared progress state
mod relay;
// Folder-name cleanup
mod sanitize;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, anyhow};
// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
use egui::{Align2, Visuals};
use log::{debug, warn};
// FileDialog for folder and cookie file selection
use rfd::FileDialog;
use tokio::runtime::Runtime;

use downloader::{YtDlp, locate_media_tool};
use model::{Notice, NoticeLevel, OutputKind, SubmitForm};
use options::BuildSettings;
use relay::Relay;

/// Program entry point: loads config, prepares the engine and launches the GUI
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = config::load_config().context("Loading configuration")?;
    // Jobs run here; the runtime lives until the window closes
    let runtime = Runtime::new().context("Starting the async runtime")?;
    let engine = YtDlp::locate(&cfg).context("Preparing yt-dlp")?;
    let settings = BuildSettings::from_config(&cfg, locate_media_tool(&cfg));
    let relay = Relay::new(Arc::new(engine), settings, runtime.handle().clone());
    let app = MyApp::new(relay, cfg.download_dir.display().to_string());

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Playlist Downloader",
        options,
        Box::new(|cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(app)
        }),
    )
    .map_err(|e| anyhow!("GUI failed: {}", e))
}

/// Application state for the GUI
struct MyApp {
    /// Input field for the video or playlist URL
    url_input: String,
    /// Destination root for downloads
    download_folder: String,
    selected_kind: OutputKind,
    /// Optional cookies.txt passed to yt-dlp
    cookie_file: Option<PathBuf>,
    relay: Relay,
    /// Message box currently on screen
    notice: Option<Notice>,
}

impl MyApp {
    fn new(relay: Relay, download_folder: String) -> Self {
        Self {
            url_input: String::new(),
            download_folder,
            selected_kind: OutputKind::AudioOnly,
            cookie_file: None,
            relay,
            notice: None,
        }
    }

    fn submit(&mut self) {
        let form = SubmitForm {
            url: self.url_input.clone(),
            destination: self.download_folder.clone(),
            kind: self.selected_kind,
            cookie_file: self.cookie_file.clone(),
        };
        // rejections come back through the relay's notice
        if let Err(err) = self.relay.submit(form) {
            debug!("submit rejected: {}", err);
        }
    }

    fn show_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = &self.notice else {
            return;
        };
        let icon = match notice.level {
            NoticeLevel::Info => "✅",
            NoticeLevel::Warning => "⚠",
            NoticeLevel::Error => "❌",
        };
        let mut close = false;
        egui::Window::new(format!("{} {}", icon, notice.title))
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(&notice.message);
                ui.horizontal(|ui| {
                    if let Some(folder) = &notice.folder {
                        if ui.button("Open Folder").clicked() {
                            open_folder(folder.clone());
                        }
                    }
                    if ui.button("OK").clicked() {
                        close = true;
                    }
                });
            });
        if close {
            self.notice = None;
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        if self.notice.is_none() {
            self.notice = self.relay.take_notice();
        }
        let snapshot = self.relay.snapshot();
        let busy = snapshot.phase.is_busy();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Playlist Downloader");
            ui.add_space(8.0);

            ui.label("Video or playlist URL:");
            ui.add_enabled(!busy, egui::TextEdit::singleline(&mut self.url_input).desired_width(f32::INFINITY));

            ui.label("Download folder:");
            ui.horizontal(|ui| {
                ui.add_enabled(!busy, egui::TextEdit::singleline(&mut self.download_folder));
                if ui.add_enabled(!busy, egui::Button::new("Browse…")).clicked() {
                    if let Some(folder) = FileDialog::new().set_directory(&self.download_folder).pick_folder() {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });

            ui.horizontal(|ui| {
                ui.label("Format:");
                ui.add_enabled_ui(!busy, |ui| {
                    egui::ComboBox::from_id_source("format")
                        .selected_text(self.selected_kind.label())
                        .show_ui(ui, |ui| {
                            for kind in OutputKind::CHOICES {
                                ui.selectable_value(&mut self.selected_kind, kind, kind.label());
                            }
                        });
                });
            });

            ui.horizontal(|ui| {
                if ui.add_enabled(!busy, egui::Button::new("Import cookies.txt")).clicked() {
                    if let Some(file) = FileDialog::new().add_filter("Cookies file", &["txt"]).pick_file() {
                        self.cookie_file = Some(file);
                    }
                }
                match &self.cookie_file {
                    Some(file) => {
                        let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                        ui.label(format!("✓ Cookies: {}", name));
                        if ui.add_enabled(!busy, egui::Button::new("❌")).clicked() {
                            self.cookie_file = None;
                        }
                    }
                    None => {
                        ui.label("No cookies loaded");
                    }
                }
            });

            ui.add_space(8.0);
            // Disabled for the whole job so only one runs at a time
            if ui.add_enabled(!busy, egui::Button::new("⬇️ Download")).clicked() {
                self.submit();
            }

            ui.add_space(8.0);
            ui.add(egui::ProgressBar::new((snapshot.percent / 100.0) as f32).show_percentage());
            ui.label(&snapshot.status);
        });

        self.show_notice(ctx);

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

/// Platform file manager command
const FILE_MANAGER: &str = if cfg!(target_os = "windows") {
    "explorer"
} else if cfg!(target_os = "macos") {
    "open"
} else {
    "xdg-open"
};

/// Opens a folder in the platform file manager without blocking the UI
fn open_folder(folder: PathBuf) {
    std::thread::spawn(move || {
        if let Err(err) = launch_file_manager(FILE_MANAGER, &folder) {
            warn!("Could not open {} with {}: {}", folder.display(), FILE_MANAGER, err);
        }
    });
}

fn launch_file_manager(program: &str, folder: &Path) -> std::io::Result<()> {
    std::process::Command::new(program).arg(folder).spawn().map(|_| ())
}
