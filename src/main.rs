#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod cache;
mod capture;
mod classifier;
mod config;
mod control;
mod error;
mod hotkeys;
mod logging;
mod model;
mod overlay;
mod sensor;
mod session;
mod uploader;

fn main() -> eframe::Result<()> {
    let _log_guard = logging::init();
    tracing::info!("post-lens starting up");

    let config = config::load_config();
    if let Err(e) = std::fs::create_dir_all(&config.frames_dir) {
        tracing::error!("failed to create frames directory: {e}");
    }

    let (overlay_tx, overlay_rx) = std::sync::mpsc::channel();

    let manager_tx = session::spawn(config.clone(), overlay_tx.clone());

    {
        let config = config.clone();
        std::thread::spawn(move || uploader::run(config));
    }

    hotkeys::spawn(manager_tx.clone(), overlay_tx);

    let viewport = eframe::egui::ViewportBuilder::default()
        .with_inner_size([420.0, 360.0])
        .with_title("Post Lens")
        .with_resizable(true);

    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "Post Lens",
        options,
        Box::new(move |_cc| Ok(Box::new(control::ControlApp::new(config, manager_tx, overlay_rx)))),
    )
}
