use serde::Serialize;

use super::donors::DonorProfile;
use super::entities::{Entities, EntitySet};
use super::pdf_data::PdfRecord;

/// Everything extracted from one page. Field names are the persisted JSON contract.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    #[serde(rename = "Emails")]
    pub emails: EntitySet,
    #[serde(rename = "Phones")]
    pub phones: EntitySet,
    #[serde(rename = "Addresses")]
    pub addresses: EntitySet,
    #[serde(rename = "Donations")]
    pub donations: EntitySet,
    #[serde(rename = "PDFLinks")]
    pub pdf_links: Vec<String>,
    #[serde(rename = "PDFData")]
    pub pdf_data: Vec<PdfRecord>,
    #[serde(rename = "RawText")]
    pub raw_text: String,
    #[serde(rename = "Donors")]
    pub donors: Vec<DonorProfile>,
}

impl ResultRecord {
    /// Page-level and PDF-level entities stay in separate buckets; nothing is
    /// deduplicated across them.
    pub fn assemble(
        page: Entities,
        pdf_links: Vec<String>,
        pdf_data: Vec<PdfRecord>,
        raw_text: String,
        donors: Vec<DonorProfile>,
    ) -> Self {
        let Entities {
            emails,
            phones,
            addresses,
            donations,
        } = page;
        ResultRecord {
            emails,
            phones,
            addresses,
            donations,
            pdf_links,
            pdf_data,
            raw_text,
            donors,
        }
    }
}
