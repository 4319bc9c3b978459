//! A single `egui` viewport covering the primary display's work area:
//! undecorated, transparent, always-on-top, and mouse-passthrough by
//! default. It renders the current verdict badge anchored near the active
//! post's right edge and, if requested, a debug outline over the post's
//! actual captured rectangle.
//!
//! The overlay never drives state: it only renders whatever the session
//! manager's last `OverlayCommand` said to show, and reports UI-only events
//! (Explain clicked) back out over a channel. Mouse passthrough is turned
//! off only while the badge is expanded, so the Explain button stays
//! clickable without the rest of the screen losing click-through.

use std::sync::mpsc::{Receiver, Sender};

use eframe::egui;

use crate::model::{Label, OverlayCommand, OverlayState};

const DEFAULT_WORK_AREA: egui::Vec2 = egui::vec2(1920.0, 1080.0);

/// UI-originated events the overlay can't resolve on its own.
pub enum OverlayUiEvent {
    ExplainClicked { post_id: String },
}

pub struct OverlaySurface {
    command_rx: Receiver<OverlayCommand>,
    ui_event_tx: Sender<OverlayUiEvent>,
    state: OverlayState,
    expanded: bool,
}

impl OverlaySurface {
    pub fn new(command_rx: Receiver<OverlayCommand>, ui_event_tx: Sender<OverlayUiEvent>) -> Self {
        OverlaySurface {
            command_rx,
            ui_event_tx,
            state: OverlayState::hidden(),
            expanded: false,
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                OverlayCommand::Show(state) => {
                    if state.post_id != self.state.post_id {
                        self.expanded = false;
                    }
                    self.state = state;
                }
                OverlayCommand::Hide => {
                    self.state = OverlayState::hidden();
                    self.expanded = false;
                }
                OverlayCommand::SetDebug(on) => self.state.show_debug_box = on,
            }
        }
    }

    /// Called once per frame from the host `eframe::App::update`.
    pub fn show(&mut self, ctx: &egui::Context) {
        self.drain_commands();

        if !self.state.visible {
            return;
        }

        let work_area = ctx
            .input(|i| i.viewport().monitor_size)
            .unwrap_or(DEFAULT_WORK_AREA);

        let viewport = egui::ViewportBuilder::default()
            .with_inner_size(work_area)
            .with_position([0.0, 0.0])
            .with_decorations(false)
            .with_transparent(true)
            .with_always_on_top()
            .with_mouse_passthrough(true)
            .with_taskbar(false)
            .with_visible(true);

        let badge = self.state.clone();
        let expanded = self.expanded;

        ctx.show_viewport_immediate(
            egui::ViewportId::from_hash_of("post_lens_overlay"),
            viewport,
            |ctx, _class| {
                ctx.send_viewport_cmd(egui::ViewportCommand::MousePassthrough(!expanded));

                if badge.show_debug_box {
                    draw_debug_box(ctx, &badge);
                }

                self.render_badge(ctx, &badge);
            },
        );
    }

    fn render_badge(&mut self, ctx: &egui::Context, state: &OverlayState) {
        let badge_height = if self.expanded { 96.0 } else { 28.0 };
        let badge_width = if self.expanded { 220.0 } else { 160.0 };
        let pos = egui::pos2((state.x + state.w) as f32, state.y as f32);

        egui::Area::new(egui::Id::new("post_lens_badge"))
            .fixed_pos(pos)
            .show(ctx, |ui| {
                egui::Frame::default()
                    .fill(badge_background(state.label))
                    .corner_radius(4.0)
                    .inner_margin(egui::Margin::same(6))
                    .show(ui, |ui| {
                        ui.set_width(badge_width);
                        ui.set_min_height(badge_height);
                        ui.horizontal(|ui| {
                            ui.label(
                                egui::RichText::new(state.label.as_str())
                                    .color(egui::Color32::WHITE)
                                    .strong(),
                            );
                            if !state.label.is_analyzing() {
                                ui.label(
                                    egui::RichText::new(format!("{:.0}%", state.score * 100.0))
                                        .color(egui::Color32::WHITE),
                                );
                                let toggle_text = if self.expanded { "▲" } else { "▼" };
                                if ui.small_button(toggle_text).clicked() {
                                    self.expanded = !self.expanded;
                                }
                            }
                        });

                        if self.expanded {
                            ui.separator();
                            if ui.button("Explain").clicked() {
                                let _ = self.ui_event_tx.send(OverlayUiEvent::ExplainClicked {
                                    post_id: state.post_id.clone(),
                                });
                            }
                        }
                    });
            });
    }
}

fn badge_background(label: Label) -> egui::Color32 {
    match label {
        Label::Analyzing => egui::Color32::from_rgba_unmultiplied(90, 90, 90, 230),
        Label::LikelyReal => egui::Color32::from_rgba_unmultiplied(40, 130, 60, 230),
        Label::Unclear => egui::Color32::from_rgba_unmultiplied(120, 110, 30, 230),
        Label::PossiblyAi => egui::Color32::from_rgba_unmultiplied(170, 100, 20, 230),
        Label::LikelyAi => egui::Color32::from_rgba_unmultiplied(160, 30, 30, 230),
    }
}

/// Draws a red outline around the post's actual captured rectangle, so the
/// debug toggle can be used to verify capture/overlay alignment.
fn draw_debug_box(ctx: &egui::Context, state: &OverlayState) {
    let rect = egui::Rect::from_min_size(
        egui::pos2(state.x as f32, state.y as f32),
        egui::vec2(state.w as f32, state.h as f32),
    );
    egui::Area::new(egui::Id::new("post_lens_debug_box"))
        .fixed_pos(rect.min)
        .show(ctx, |ui| {
            ui.painter().rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(2.0, egui::Color32::RED),
                egui::StrokeKind::Middle,
            );
        });
}
