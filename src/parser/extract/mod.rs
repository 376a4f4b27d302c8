pub mod donors;
pub mod entities;
pub mod patterns;
pub mod pdf_data;
pub mod record;

use thiserror::Error;
use tracing::info;

use crate::pdf::PdfSource;
use entities::Anchor;
use patterns::PatternSet;
use record::ResultRecord;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page text is empty for {url}")]
    EmptyPageText { url: String },
}

/// What the fetcher hands over for one page.
pub struct PageInput<'a> {
    pub url: &'a str,
    pub text: &'a str,
    pub anchors: &'a [Anchor],
}

pub struct ExtractOptions {
    /// Fetch at most this many of the discovered PDFs. `None` fetches all.
    pub max_pdfs: Option<usize>,
}

/// Page entities, donor profiles and PDF records for one page.
///
/// Fails only when the page has no text at all; everything downstream of that
/// degrades to empty collections.
pub async fn extract_page<S: PdfSource>(
    page: &PageInput<'_>,
    pdfs: &S,
    patterns: &PatternSet,
    opts: &ExtractOptions,
) -> Result<ResultRecord, ExtractError> {
    if page.text.trim().is_empty() {
        return Err(ExtractError::EmptyPageText {
            url: page.url.to_string(),
        });
    }

    let page_entities = entities::extract(page.text, page.anchors, patterns);
    let donors = donors::build_profiles(page.text, patterns);
    info!(
        "{}: {} emails, {} phones, {} addresses, {} donations, {} donors",
        page.url,
        page_entities.emails.len(),
        page_entities.phones.len(),
        page_entities.addresses.len(),
        page_entities.donations.len(),
        donors.len()
    );

    let links = pdf_data::pdf_links(page.anchors, page.url);
    let to_fetch = match opts.max_pdfs {
        Some(n) if n < links.len() => &links[..n],
        _ => &links[..],
    };
    let pdf_records = pdf_data::ingest(to_fetch, pdfs, patterns).await;

    Ok(ResultRecord::assemble(
        page_entities,
        links,
        pdf_records,
        page.text.to_string(),
        donors,
    ))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract::donors::DonorProfile;
    use crate::parser::extract::pdf_data::tests::FakePdfs;

    const ALL: ExtractOptions = ExtractOptions { max_pdfs: None };

    #[tokio::test]
    async fn john_smith_end_to_end() {
        let text = "John Smith\njohn.smith@example.com\n(555) 123-4567\nDonation: $1,250.00";
        let page = PageInput {
            url: "https://example.org/donors",
            text,
            anchors: &[],
        };
        let r = extract_page(&page, &FakePdfs::default(), &PatternSet::default(), &ALL)
            .await
            .unwrap();

        assert_eq!(r.emails.as_slice(), ["john.smith@example.com"]);
        assert_eq!(r.phones.as_slice(), ["555 123 4567"]);
        assert!(r.donations.contains("$1,250.00"));
        assert_eq!(
            r.donors,
            vec![DonorProfile {
                name: "John Smith".into(),
                emails: vec!["john.smith@example.com".into()],
                phones: vec!["555 123 4567".into()],
            }]
        );
        assert_eq!(r.raw_text, text);
        assert!(r.pdf_links.is_empty());
        assert!(r.pdf_data.is_empty());
    }

    #[tokio::test]
    async fn one_failing_pdf_of_three() {
        let anchors = vec![
            Anchor::new("/a.pdf", "A"),
            Anchor::new("/b.pdf", "B"),
            Anchor::new("/c.pdf", "C"),
        ];
        let page = PageInput {
            url: "https://example.org/",
            text: "Annual reports below",
            anchors: &anchors,
        };
        let pdfs = FakePdfs::with(&[
            ("https://example.org/a.pdf", "a@example.org"),
            ("https://example.org/c.pdf", "c@example.org"),
        ]);
        let r = extract_page(&page, &pdfs, &PatternSet::default(), &ALL)
            .await
            .unwrap();

        assert_eq!(r.pdf_links.len(), 3);
        assert_eq!(r.pdf_data.len(), 2);
        assert_eq!(r.raw_text, "Annual reports below");
    }

    #[tokio::test]
    async fn max_pdfs_limits_fetches_not_links() {
        let anchors = vec![Anchor::new("/a.pdf", "A"), Anchor::new("/b.pdf", "B")];
        let page = PageInput {
            url: "https://example.org/",
            text: "Reports",
            anchors: &anchors,
        };
        let pdfs = FakePdfs::with(&[
            ("https://example.org/a.pdf", "one"),
            ("https://example.org/b.pdf", "two"),
        ]);
        let opts = ExtractOptions { max_pdfs: Some(1) };
        let r = extract_page(&page, &pdfs, &PatternSet::default(), &opts)
            .await
            .unwrap();
        assert_eq!(r.pdf_links.len(), 2);
        assert_eq!(r.pdf_data.len(), 1);
    }

    #[tokio::test]
    async fn pdf_text_feeds_entities_not_donors() {
        let anchors = vec![Anchor::new("/list.pdf", "List")];
        let page = PageInput {
            url: "https://example.org/",
            text: "Our supporters",
            anchors: &anchors,
        };
        let pdfs = FakePdfs::with(&[("https://example.org/list.pdf", "Jane Doe\njane@example.org")]);
        let r = extract_page(&page, &pdfs, &PatternSet::default(), &ALL)
            .await
            .unwrap();
        assert!(r.donors.is_empty());
        assert!(r.emails.is_empty());
        assert_eq!(r.pdf_data[0].extracted.emails.as_slice(), ["jane@example.org"]);
    }

    #[tokio::test]
    async fn empty_page_text_is_fatal() {
        let page = PageInput {
            url: "https://example.org/blank",
            text: " \n\t ",
            anchors: &[Anchor::new("mailto:a@b.org", "")],
        };
        let err = extract_page(&page, &FakePdfs::default(), &PatternSet::default(), &ALL)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::EmptyPageText { ref url } if url == "https://example.org/blank"));
    }
}
