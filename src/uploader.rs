//! Watches the frames directory for newly written JPEGs, groups them by
//! base post id, and submits one batch per id to the classifier. Uses
//! `notify-debouncer-mini` rather than the full debouncer — a flat, short
//! debounce window over a non-recursive directory is all this needs, no
//! rename tracking across a tree.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::model::base_id_from_filename;

/// Runs the uploader loop on the current thread. Intended to be spawned on
/// its own `std::thread`; never returns under normal operation.
pub fn run(config: Config) {
    let mut queues: HashMap<String, Vec<PathBuf>> = HashMap::new();
    let mut submitted: HashSet<String> = HashSet::new();

    seed_existing_frames(&config.frames_dir, &mut queues);
    drain_ready_queues(&config, &mut queues, &mut submitted);

    let (tx, rx) = mpsc::channel();
    let mut debouncer = match new_debouncer(Duration::from_millis(150), tx) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("frame uploader: failed to create watcher: {e}");
            return;
        }
    };

    if let Err(e) = debouncer
        .watcher()
        .watch(&config.frames_dir, RecursiveMode::NonRecursive)
    {
        tracing::error!(
            "frame uploader: failed to watch {}: {e}",
            config.frames_dir.display()
        );
        return;
    }
    info!("frame uploader watching {}", config.frames_dir.display());

    for result in rx {
        handle_debounce_result(result, &mut queues);
        drain_ready_queues(&config, &mut queues, &mut submitted);
    }
}

fn handle_debounce_result(result: DebounceEventResult, queues: &mut HashMap<String, Vec<PathBuf>>) {
    match result {
        Ok(events) => {
            for event in events {
                enqueue_frame(&event.path, queues);
            }
        }
        Err(e) => warn!("frame uploader: watch error: {e}"),
    }
}

fn enqueue_frame(path: &std::path::Path, queues: &mut HashMap<String, Vec<PathBuf>>) {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    let Some(base_id) = base_id_from_filename(filename) else {
        return;
    };
    debug!("frame uploader: queued {filename} for {base_id}");
    queues.entry(base_id).or_default().push(path.to_path_buf());
}

fn seed_existing_frames(frames_dir: &std::path::Path, queues: &mut HashMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(frames_dir) else {
        return;
    };
    for entry in entries.flatten() {
        enqueue_frame(&entry.path(), queues);
    }
}

/// Submits a batch for every base id whose queue has reached `batch_size`
/// frames and that has not already been submitted. At-most-once: a failed
/// submission is not retried either.
fn drain_ready_queues(
    config: &Config,
    queues: &mut HashMap<String, Vec<PathBuf>>,
    submitted: &mut HashSet<String>,
) {
    let ready: Vec<String> = queues
        .iter()
        .filter(|(base_id, frames)| {
            !submitted.contains(*base_id) && frames.len() >= config.batch_size
        })
        .map(|(base_id, _)| base_id.clone())
        .collect();

    for base_id in ready {
        let Some(mut frames) = queues.remove(&base_id) else {
            continue;
        };
        frames.sort();
        frames.truncate(config.batch_size);

        info!(
            "submitting batch of {} frames for {base_id}",
            frames.len()
        );
        match crate::classifier::http::submit_batch(&config.api_base_url, &base_id, &frames) {
            Ok(()) => info!("batch accepted for {base_id}"),
            Err(e) => warn!("batch submission failed for {base_id}: {e}; will not retry"),
        }
        submitted.insert(base_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_groups_frames_by_base_id() {
        let mut queues = HashMap::new();
        enqueue_frame(
            std::path::Path::new("post_1_1000_frame1_1700000001000.jpg"),
            &mut queues,
        );
        enqueue_frame(
            std::path::Path::new("post_1_1000_frame2_1700000002000.jpg"),
            &mut queues,
        );
        enqueue_frame(
            std::path::Path::new("post_2_2000_frame1_1700000003000.jpg"),
            &mut queues,
        );

        assert_eq!(queues.get("post_1").map(Vec::len), Some(2));
        assert_eq!(queues.get("post_2").map(Vec::len), Some(1));
    }

    #[test]
    fn unrelated_filenames_are_ignored() {
        let mut queues = HashMap::new();
        enqueue_frame(std::path::Path::new("not-a-frame.txt"), &mut queues);
        assert!(queues.is_empty());
    }

    #[test]
    fn submission_is_attempted_only_once_per_base_id() {
        let mut config = Config::default();
        config.api_base_url = "http://127.0.0.1:1".to_string(); // nothing listening; submit fails
        config.batch_size = 2;

        let mut queues = HashMap::new();
        enqueue_frame(std::path::Path::new("post_9_9000_frame1_1.jpg"), &mut queues);
        enqueue_frame(std::path::Path::new("post_9_9000_frame2_2.jpg"), &mut queues);

        let mut submitted = HashSet::new();
        drain_ready_queues(&config, &mut queues, &mut submitted);
        assert!(submitted.contains("post_9"));
        assert!(!queues.contains_key("post_9"));

        // A third frame arriving later must not re-trigger a submission.
        enqueue_frame(std::path::Path::new("post_9_9000_frame3_3.jpg"), &mut queues);
        drain_ready_queues(&config, &mut queues, &mut submitted);
        assert!(queues.contains_key("post_9"));
    }
}
