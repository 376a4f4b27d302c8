use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::parser::extract::record::ResultRecord;
use crate::parser::page::PageSnapshot;

const CONTACT_HEADER: [&str; 9] = [
    "name",
    "first_name",
    "last_name",
    "type",
    "email",
    "phone",
    "address",
    "donation",
    "source_url",
];

#[derive(Debug)]
pub struct WrittenArtifacts {
    pub dir: PathBuf,
    /// The `data_<stamp>.json` result record.
    pub result: PathBuf,
    /// The `donors_<stamp>.csv` contact sheet.
    pub contacts: PathBuf,
}

/// One CSV line: a single contact value, attributed to a donor when one claimed it.
#[derive(Debug, PartialEq, Serialize)]
pub struct ContactRow<'a> {
    pub name: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub email: &'a str,
    pub phone: &'a str,
    pub address: &'a str,
    pub donation: &'a str,
    pub source_url: &'a str,
}

impl<'a> ContactRow<'a> {
    fn blank(kind: &'static str, source_url: &'a str) -> Self {
        ContactRow {
            name: "",
            first_name: "",
            last_name: "",
            kind,
            email: "",
            phone: "",
            address: "",
            donation: "",
            source_url,
        }
    }

    fn donor(name: &'a str, kind: &'static str, source_url: &'a str) -> Self {
        let (first_name, last_name) = name.split_once(' ').unwrap_or((name, ""));
        ContactRow {
            name,
            first_name,
            last_name: last_name.trim(),
            ..Self::blank(kind, source_url)
        }
    }
}

/// `<data_dir>/<host>` with `.` and `:` replaced by `_`.
pub fn domain_dir(data_dir: &Path, url: &str) -> PathBuf {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| {
            let host = u.host_str()?.to_string();
            Some(match u.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            })
        })
        .unwrap_or_else(|| "unknown".to_string());
    data_dir.join(host.replace(['.', ':'], "_"))
}

/// Write the result record and the page's auxiliary files, all sharing `stamp`.
pub fn write_all(
    data_dir: &Path,
    page: &PageSnapshot,
    record: &ResultRecord,
    stamp: &str,
) -> Result<WrittenArtifacts> {
    let dir = domain_dir(data_dir, &page.url);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let result = dir.join(format!("data_{}.json", stamp));
    write_json(&result, record)?;

    let contacts = dir.join(format!("donors_{}.csv", stamp));
    write_contacts(&contacts, &contact_rows(record, &page.url))?;

    write_text(&dir.join(format!("raw_html_{}.html", stamp)), &page.html)?;
    write_text(&dir.join(format!("dom_outline_{}.txt", stamp)), &page.outline)?;
    write_json(&dir.join(format!("links_{}.json", stamp)), &page.links)?;
    write_json(&dir.join(format!("scripts_{}.json", stamp)), &page.scripts)?;
    write_json(&dir.join(format!("stylesheets_{}.json", stamp)), &page.stylesheets)?;

    debug!("Wrote artifacts for {} to {}", page.url, dir.display());
    Ok(WrittenArtifacts {
        dir,
        result,
        contacts,
    })
}

/// Donor emails and phones first, in profile order. Then the page-level
/// emails and phones no donor claimed, then every address and donation amount.
pub fn contact_rows<'a>(record: &'a ResultRecord, source_url: &'a str) -> Vec<ContactRow<'a>> {
    let mut rows = Vec::new();
    let mut claimed: HashSet<&str> = HashSet::new();

    for donor in &record.donors {
        for email in &donor.emails {
            claimed.insert(email);
            rows.push(ContactRow {
                email,
                ..ContactRow::donor(&donor.name, "email", source_url)
            });
        }
        for phone in &donor.phones {
            claimed.insert(phone);
            rows.push(ContactRow {
                phone,
                ..ContactRow::donor(&donor.name, "phone", source_url)
            });
        }
    }

    for email in record.emails.as_slice() {
        if !claimed.contains(email.as_str()) {
            rows.push(ContactRow {
                email,
                ..ContactRow::blank("email", source_url)
            });
        }
    }
    for phone in record.phones.as_slice() {
        if !claimed.contains(phone.as_str()) {
            rows.push(ContactRow {
                phone,
                ..ContactRow::blank("phone", source_url)
            });
        }
    }
    for address in record.addresses.as_slice() {
        rows.push(ContactRow {
            address,
            ..ContactRow::blank("address", source_url)
        });
    }
    for donation in record.donations.as_slice() {
        rows.push(ContactRow {
            donation,
            ..ContactRow::blank("donation", source_url)
        });
    }

    rows
}

/// Header line is always written, so a page with no contacts still yields a valid sheet.
fn write_contacts(path: &Path, rows: &[ContactRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(CONTACT_HEADER)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_text(path, &json)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
