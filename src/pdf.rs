//! PDF download and text extraction.

use lopdf::Document;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("document is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("unreadable PDF: {0}")]
    Parse(#[from] lopdf::Error),
}

/// Anything that can turn a PDF URL into its text.
#[allow(async_fn_in_trait)]
pub trait PdfSource {
    async fn fetch_text(&self, url: &str) -> Result<String, PdfError>;
}

/// Downloads PDFs over HTTP and reads them with lopdf.
pub struct PdfDownloader {
    client: Client,
    max_bytes: usize,
}

impl PdfDownloader {
    pub fn new(client: Client, max_bytes: usize) -> Self {
        PdfDownloader { client, max_bytes }
    }

    fn check_size(&self, size: usize) -> Result<(), PdfError> {
        if size > self.max_bytes {
            return Err(PdfError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl PdfSource for PdfDownloader {
    async fn fetch_text(&self, url: &str) -> Result<String, PdfError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PdfError::Status(status.as_u16()));
        }
        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        let bytes = response.bytes().await?;
        self.check_size(bytes.len())?;
        debug!("Downloaded {} ({} bytes)", url, bytes.len());

        extract_text(&bytes)
    }
}

/// Text of every readable page, joined by newlines. Pages lopdf cannot decode are skipped.
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfError> {
    let doc = Document::load_mem(bytes)?;
    let mut parts = Vec::new();

    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Err(e) => debug!("Skipping page {}: {}", page_num, e),
        }
    }

    Ok(parts.join("\n"))
}
