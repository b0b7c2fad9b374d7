//! Review report download. The bytes are written exactly as the service returned them.

use crate::error::{Result, WaReviewError};
use crate::review::ReviewApi;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn default_report_path(workload_id: &str) -> PathBuf {
    PathBuf::from(format!("WA_Review_Report_{}.pdf", workload_id))
}

pub async fn download_report<A: ReviewApi + ?Sized>(
    api: &A,
    workload_id: &str,
    output: &Path,
) -> Result<usize> {
    let bytes = api.get_review_report(workload_id).await?;
    if bytes.is_empty() {
        return Err(WaReviewError::review_api(
            "GetLensReviewReport",
            "service returned an empty report",
        ));
    }
    tokio::fs::write(output, &bytes).await?;
    info!("Wrote {} byte report to {}", bytes.len(), output.display());
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::InMemoryReviewApi;

    #[tokio::test]
    async fn test_report_bytes_pass_through() {
        let payload = b"%PDF-1.4\n\x00\xffbinary".to_vec();
        let api = InMemoryReviewApi::new(10).with_report(payload.clone());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("r.pdf");
        let written = download_report(&api, "wl", &out).await.unwrap();
        assert_eq!(written, payload.len());
        assert_eq!(std::fs::read(&out).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_empty_report_is_an_error() {
        let api = InMemoryReviewApi::new(10);
        let dir = tempfile::tempdir().unwrap();
        assert!(download_report(&api, "wl", &dir.path().join("r.pdf")).await.is_err());
    }

    #[test]
    fn test_default_path() {
        assert_eq!(
            default_report_path("abc"),
            PathBuf::from("WA_Review_Report_abc.pdf")
        );
    }
}
