pub mod extract;
pub mod page;

use crate::pdf::PdfSource;
use extract::patterns::PatternSet;
use extract::record::ResultRecord;
use extract::{ExtractError, ExtractOptions, PageInput};
use page::PageSnapshot;

/// Two-step pipeline: html → snapshot → extracted record.
pub async fn process_page<S: PdfSource>(
    url: &str,
    html: &str,
    pdfs: &S,
    patterns: &PatternSet,
    opts: &ExtractOptions,
) -> Result<(PageSnapshot, ResultRecord), ExtractError> {
    let snapshot = page::snapshot(url, html);
    let input = PageInput {
        url: &snapshot.url,
        text: &snapshot.text,
        anchors: &snapshot.anchors,
    };
    let record = extract::extract_page(&input, pdfs, patterns, opts).await?;
    Ok((snapshot, record))
}

// ── Tests ──
