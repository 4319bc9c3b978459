//! REST calls to the classifier: batch submission, verdict polling, and the
//! education fetch. Multipart bodies are hand-built rather than pulled in
//! via a dedicated multipart crate.

use std::time::Duration;

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::error::UploadError;
use crate::model::ClassifierResult;

use super::EducationResponse;

lazy_static! {
    static ref AGENT: ureq::Agent = {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build();
        config.into()
    };
}

const MULTIPART_FIELD: &str = "files";

/// POSTs a batch of JPEG frames to `/analyze/<base_id>` as
/// `multipart/form-data`, one `files` part per frame.
pub fn submit_batch(base_url: &str, base_id: &str, frame_paths: &[std::path::PathBuf]) -> Result<(), UploadError> {
    let boundary = format!(
        "----PostLensBoundary{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );

    let mut body = Vec::new();
    for path in frame_paths {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("frame.jpg");

        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{MULTIPART_FIELD}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let url = format!("{}/analyze/{}", base_url.trim_end_matches('/'), base_id);
    debug!("submitting batch of {} frames to {url}", frame_paths.len());

    let result = AGENT
        .post(&url)
        .header(
            "Content-Type",
            &format!("multipart/form-data; boundary={boundary}"),
        )
        .send(&body);

    match result {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if (200..300).contains(&status) {
                Ok(())
            } else {
                warn!("classifier rejected batch for {base_id}: status {status}");
                Err(UploadError::Status(status))
            }
        }
        Err(e) => {
            warn!("failed to reach classifier for {base_id}: {e}");
            Err(UploadError::Connection(e.to_string()))
        }
    }
}

/// `GET /analyze/<base_id>`; `Ok(None)` on a 404 (not ready yet).
pub fn get_verdict(base_url: &str, base_id: &str) -> anyhow::Result<Option<ClassifierResult>> {
    let url = format!("{}/analyze/{}", base_url.trim_end_matches('/'), base_id);
    match AGENT.get(&url).call() {
        Ok(mut resp) => Ok(Some(resp.body_mut().read_json::<ClassifierResult>()?)),
        Err(ureq::Error::StatusCode(404)) => Ok(None),
        Err(e) => Err(anyhow::anyhow!("classifier GET failed for {base_id}: {e}")),
    }
}

/// `GET /educate/<base_id>`.
pub fn get_education(base_url: &str, base_id: &str) -> anyhow::Result<EducationResponse> {
    let url = format!("{}/educate/{}", base_url.trim_end_matches('/'), base_id);
    let mut resp = AGENT
        .get(&url)
        .call()
        .map_err(|e| anyhow::anyhow!("education request failed for {base_id}: {e}"))?;
    Ok(resp.body_mut().read_json::<EducationResponse>()?)
}

