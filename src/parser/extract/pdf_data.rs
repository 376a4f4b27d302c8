use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use super::entities::{self, Anchor, Entities};
use super::patterns::PatternSet;
use crate::pdf::{PdfError, PdfSource};

#[derive(Debug, Clone, Serialize)]
pub struct PdfRecord {
    pub url: String,
    pub text: String,
    pub extracted: Entities,
}

/// Absolute URLs of anchors pointing at `.pdf` files, deduplicated in page order.
pub fn pdf_links(anchors: &[Anchor], page_url: &str) -> Vec<String> {
    let base = Url::parse(page_url).ok();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in anchors {
        let href = anchor.href.trim();
        if !is_pdf_href(href) {
            continue;
        }
        let resolved = match &base {
            Some(base) => match base.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            None => href.to_string(),
        };
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }

    links
}

fn is_pdf_href(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or("");
    path.to_ascii_lowercase().ends_with(".pdf")
}

/// Fetch each link in turn and extract entities from the ones that succeed.
/// Failures are logged and dropped; they never stop the remaining links.
pub async fn ingest<S: PdfSource>(
    links: &[String],
    source: &S,
    patterns: &PatternSet,
) -> Vec<PdfRecord> {
    let mut outcomes: Vec<(&String, Result<String, PdfError>)> = Vec::with_capacity(links.len());
    for url in links {
        outcomes.push((url, source.fetch_text(url).await));
    }

    let records: Vec<PdfRecord> = outcomes
        .into_iter()
        .filter_map(|(url, outcome)| match outcome {
            Ok(text) => {
                let extracted = entities::extract(&text, &[], patterns);
                debug!("{}: {} entities", url, extracted.total());
                Some(PdfRecord {
                    url: url.clone(),
                    text,
                    extracted,
                })
            }
            Err(e) => {
                warn!("Skipping PDF {}: {}", url, e);
                None
            }
        })
        .collect();

    info!("Parsed {}/{} PDFs", records.len(), links.len());
    records
}
