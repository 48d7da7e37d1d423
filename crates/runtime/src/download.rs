//! Default HTTP download strategy
//!
//! Streams to a `.part` file and renames into place on success, so a
//! failed or cancelled download never leaves a partial file at the final
//! path. `file://` URLs are copied locally, which keeps tests and
//! side-loaded models on the same path as real downloads.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use edgekit_core::{
    CancellationToken, DownloadStrategy, ErrorCode, ProgressCallback, Result, SdkError,
};

pub struct HttpDownloadStrategy {
    client: reqwest::Client,
}

impl HttpDownloadStrategy {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Per-read timeout; large models exceed any total timeout.
            .read_timeout(timeout)
            .build()
            .map_err(|e| {
                SdkError::new(ErrorCode::InvalidConfig, "failed to create HTTP client")
                    .with_source(e)
            })?;
        Ok(Self { client })
    }

    async fn download_file_url(&self, url: &str, dest: &Path) -> Result<u64> {
        let source = url.trim_start_matches("file://");
        let bytes = tokio::fs::copy(source, dest).await.map_err(|e| {
            SdkError::new(
                ErrorCode::DownloadFailed,
                format!("failed to copy local model file: {e}"),
            )
            .with_source(e)
        })?;
        Ok(bytes)
    }
}

#[async_trait]
impl DownloadStrategy for HttpDownloadStrategy {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        cancel.check()?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if url.starts_with("file://") {
            return self.download_file_url(url, dest).await;
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            let code = if e.is_timeout() {
                ErrorCode::NetworkTimeout
            } else {
                ErrorCode::NetworkUnavailable
            };
            SdkError::new(code, format!("download request failed: {e}")).with_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SdkError::new(
                ErrorCode::DownloadFailed,
                format!("download of {url} returned {status}"),
            )
            .with_http_status(status.as_u16()));
        }

        let total = response.content_length();
        let part_path = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&part_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(SdkError::new(ErrorCode::Cancelled, "download cancelled"));
            }

            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&part_path).await;
                    return Err(SdkError::new(
                        ErrorCode::NetworkUnavailable,
                        format!("download stream failed: {e}"),
                    )
                    .with_source(e));
                }
            };

            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(progress) = &progress {
                progress(downloaded, total);
            }
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&part_path, dest).await?;

        tracing::info!(url, bytes = downloaded, dest = %dest.display(), "Download complete");
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_url_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.gguf");
        std::fs::write(&source, b"model-bytes").unwrap();

        let strategy = HttpDownloadStrategy::new(std::time::Duration::from_secs(5)).unwrap();
        let dest = dir.path().join("out/weights.gguf");
        let bytes = strategy
            .download(
                &format!("file://{}", source.display()),
                &dest,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"model-bytes");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = HttpDownloadStrategy::new(std::time::Duration::from_secs(5)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = strategy
            .download(
                "https://host/never.gguf",
                &dir.path().join("never.gguf"),
                None,
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_local_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = HttpDownloadStrategy::new(std::time::Duration::from_secs(5)).unwrap();
        let err = strategy
            .download(
                "file:///does/not/exist.gguf",
                &dir.path().join("out.gguf"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DownloadFailed);
    }
}
