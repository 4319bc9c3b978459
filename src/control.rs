//! The ordinary decorated window. Lets the user flip the detection master
//! switch, see a periodically refreshed list of resolved verdicts, open the
//! frames directory, and trigger the Explain modal for any entry. Built as
//! the primary `eframe` viewport: a single always-present window with a
//! list and a details pane.

use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use eframe::egui;

use crate::classifier::EducationResponse;
use crate::config::Config;
use crate::model::Verdict;
use crate::overlay::{OverlaySurface, OverlayUiEvent};
use crate::session::ManagerMsg;

/// One row in the control surface's verdict list, refreshed by polling
/// `GET /analyze/<base-id>` every `classifier_poll_interval_ms`.
struct VerdictRow {
    base_id: String,
    verdict: Option<Verdict>,
}

enum EducationFetch {
    Idle,
    Loading { base_id: String },
    Loaded { base_id: String, response: EducationResponse },
    Failed { base_id: String, message: String },
}

pub struct ControlApp {
    config: Config,
    manager_tx: Sender<ManagerMsg>,
    detection_enabled: bool,
    rows: Vec<VerdictRow>,
    last_poll: Instant,
    overlay: OverlaySurface,
    ui_event_rx: Receiver<OverlayUiEvent>,
    education: EducationFetch,
}

impl ControlApp {
    pub fn new(
        config: Config,
        manager_tx: Sender<ManagerMsg>,
        overlay_command_rx: Receiver<crate::model::OverlayCommand>,
    ) -> Self {
        let (ui_event_tx, ui_event_rx) = std::sync::mpsc::channel();
        ControlApp {
            detection_enabled: config.detection_enabled,
            rows: known_base_ids(&config.frames_dir)
                .into_iter()
                .map(|base_id| VerdictRow { base_id, verdict: None })
                .collect(),
            last_poll: Instant::now(),
            overlay: OverlaySurface::new(overlay_command_rx, ui_event_tx),
            ui_event_rx,
            config,
            manager_tx,
            education: EducationFetch::Idle,
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.classifier_poll_interval_ms)
    }

    fn refresh_rows(&mut self) {
        for base_id in known_base_ids(&self.config.frames_dir) {
            if !self.rows.iter().any(|r| r.base_id == base_id) {
                self.rows.push(VerdictRow { base_id, verdict: None });
            }
        }
        for row in &mut self.rows {
            match crate::classifier::http::get_verdict(&self.config.api_base_url, &row.base_id) {
                Ok(Some(result)) => row.verdict = Some(Verdict::from_result(row.base_id.clone(), result)),
                Ok(None) => {}
                Err(e) => tracing::debug!("poll failed for {}: {e}", row.base_id),
            }
        }
    }

    fn handle_ui_events(&mut self) {
        while let Ok(event) = self.ui_event_rx.try_recv() {
            match event {
                OverlayUiEvent::ExplainClicked { post_id } => self.request_education(post_id),
            }
        }
    }

    fn request_education(&mut self, base_id: String) {
        self.education = EducationFetch::Loading { base_id: base_id.clone() };
        match crate::classifier::http::get_education(&self.config.api_base_url, &base_id) {
            Ok(response) => self.education = EducationFetch::Loaded { base_id, response },
            Err(e) => {
                self.education = EducationFetch::Failed {
                    base_id,
                    message: e.to_string(),
                }
            }
        }
    }

    fn render_education_modal(&mut self, ctx: &egui::Context) {
        let (title, body): (String, Vec<String>) = match &self.education {
            EducationFetch::Idle => return,
            EducationFetch::Loading { base_id } => (format!("Explain — {base_id}"), vec!["Loading…".into()]),
            EducationFetch::Loaded { base_id, response } => (
                format!("Explain — {base_id}"),
                std::iter::once(response.explanation.clone())
                    .chain(response.indicators.iter().map(|i| format!("• {i}")))
                    .collect(),
            ),
            EducationFetch::Failed { base_id, message } => {
                (format!("Explain — {base_id}"), vec![format!("Failed to load: {message}")])
            }
        };

        let mut open = true;
        egui::Window::new(title).open(&mut open).show(ctx, |ui| {
            for line in body {
                ui.label(line);
            }
        });
        if !open {
            self.education = EducationFetch::Idle;
        }
    }
}

impl ControlApp {
    fn render(&mut self, ctx: &egui::Context) {
        self.handle_ui_events();
        self.overlay.show(ctx);

        if self.last_poll.elapsed() >= self.poll_interval() {
            self.refresh_rows();
            self.last_poll = Instant::now();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Post Lens");

            if ui.checkbox(&mut self.detection_enabled, "Detection enabled").changed() {
                let _ = self
                    .manager_tx
                    .send(ManagerMsg::SetDetectionEnabled(self.detection_enabled));
            }

            ui.label(format!("Frames directory: {}", self.config.frames_dir.display()));
            if ui.button("Reload").clicked() {
                self.refresh_rows();
                self.last_poll = Instant::now();
            }

            ui.separator();

            egui::ScrollArea::vertical().show(ui, |ui| {
                for row in &self.rows {
                    ui.horizontal(|ui| {
                        ui.label(&row.base_id);
                        match &row.verdict {
                            Some(v) => ui.label(format!("{} ({:.0}%)", v.label.as_str(), v.confidence * 100.0)),
                            None => ui.label("pending…"),
                        };
                        if row.verdict.is_some() && ui.small_button("Explain").clicked() {
                            let base_id = row.base_id.clone();
                            self.request_education(base_id);
                        }
                    });
                }
            });
        });

        self.render_education_modal(ctx);
    }
}

impl eframe::App for ControlApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.render(ctx)));
        if let Err(payload) = result {
            let message = panic_message(&payload);
            tracing::error!("overlay render panicked, showing diagnostic frame: {message}");
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.colored_label(egui::Color32::RED, "Post Lens hit a rendering error.");
                ui.label(message);
                ui.label("Restart the app to recover.");
            });
        }

        ctx.request_repaint_after(Duration::from_millis(200));
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn known_base_ids(frames_dir: &std::path::Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(frames_dir) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter_map(|name| crate::model::base_id_from_filename(&name))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
