//! Scan pipeline: capture a screenshot of a page and store it.

use chrono::Utc;
use critique_core::{CritiqueError, ObjectStore, ScreenshotClient};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::Services;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Object path, fed back into `/analyze` as `screenshotPath`.
    pub screenshot_path: String,
    pub screenshot_url: String,
}

/// Object paths are bucketed by capture date.
fn object_path() -> String {
    format!("{}/{}.png", Utc::now().format("%Y-%m-%d"), Uuid::new_v4())
}

pub async fn capture_and_store(
    client: &ScreenshotClient,
    objects: &dyn ObjectStore,
    url: &str,
) -> Result<ScanResult, CritiqueError> {
    let bytes = client.capture(url).await?;
    let path = object_path();
    objects.put(&path, &bytes).await?;
    let screenshot_url = objects.public_url(&path)?;

    tracing::info!(url = %url, path = %path, "Screenshot stored");
    Ok(ScanResult {
        screenshot_path: path,
        screenshot_url,
    })
}

/// Capture `url`. Provider failures are recorded as a `failed` analysis.
pub async fn run_scan(services: &Services, url: &str) -> Result<ScanResult, CritiqueError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(CritiqueError::BadRequest("url is required".into()));
    }

    let client = services.screenshots()?;
    match capture_and_store(client, services.objects.as_ref(), url).await {
        Ok(result) => Ok(result),
        Err(e) if e.is_upstream() => {
            if let Err(db_err) = services
                .store
                .record_failed_analysis(Some(url), &[], &json!({}), &e.to_string())
                .await
            {
                tracing::warn!(error = %db_err, "Failed to record failed scan");
            }
            Err(e)
        }
        Err(e) => Err(e),
    }
}
