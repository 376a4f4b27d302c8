use anyhow::{Context, Result};
use quick_xml::events::Event;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

/// `<loc>` entries of one sitemap document.
#[derive(Debug, Default, PartialEq)]
pub struct SitemapEntries {
    /// Page URLs from a `<urlset>`.
    pub pages: Vec<String>,
    /// Child sitemaps from a `<sitemapindex>`.
    pub sitemaps: Vec<String>,
}

/// URLs under `base` worth scraping: sitemap pages whose URL mentions one of
/// `keywords`, or the base URL alone when nothing matches.
pub async fn discover(client: &Client, base: &Url, keywords: &[String]) -> Result<Vec<String>> {
    let root = sitemap_url(base)?;

    let all = match collect_pages(client, root.as_str()).await {
        Ok(pages) => pages,
        Err(e) => {
            warn!("No usable sitemap at {}: {:#}", root, e);
            Vec::new()
        }
    };
    info!("Total URLs in sitemap: {}", all.len());

    let filtered = filter_by_keywords(all, keywords);
    info!("Pages after keyword filtering: {}", filtered.len());

    if filtered.is_empty() {
        return Ok(vec![base.to_string()]);
    }
    Ok(filtered)
}

/// `sitemap.xml` directly under `base`, keeping any path prefix.
fn sitemap_url(base: &Url) -> Result<Url> {
    let mut root = base.clone();
    root.set_query(None);
    root.set_fragment(None);
    let joined = format!("{}/sitemap.xml", root.as_str().trim_end_matches('/'));
    Url::parse(&joined).with_context(|| format!("Failed to build sitemap URL from {}", base))
}

/// Pages of the sitemap at `url`, following a sitemap index one level down.
async fn collect_pages(client: &Client, url: &str) -> Result<Vec<String>> {
    let root = parse_sitemap(&fetch_xml(client, url).await?)?;
    let mut pages = root.pages;

    for child in root.sitemaps {
        debug!("Following child sitemap {}", child);
        match fetch_xml(client, &child).await.and_then(|xml| parse_sitemap(&xml)) {
            Ok(entries) => pages.extend(entries.pages),
            Err(e) => warn!("Skipping child sitemap {}: {:#}", child, e),
        }
    }
    Ok(pages)
}

async fn fetch_xml(client: &Client, url: &str) -> Result<String> {
    info!("Fetching sitemap: {}", url);
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("Failed to fetch sitemap {}", url))
}

/// Parse a urlset or sitemapindex document.
pub fn parse_sitemap(xml: &str) -> Result<SitemapEntries> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut entries = SitemapEntries::default();
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"url" => in_url = true,
                b"sitemap" => in_sitemap = true,
                b"loc" if in_url || in_sitemap => in_loc = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc => {
                let loc = e.unescape()?.trim().to_string();
                if !loc.is_empty() {
                    if in_sitemap {
                        entries.sitemaps.push(loc);
                    } else {
                        entries.pages.push(loc);
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"url" => in_url = false,
                b"sitemap" => in_sitemap = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

/// Keep URLs containing any keyword, case-insensitively, in sitemap order.
pub fn filter_by_keywords(urls: Vec<String>, keywords: &[String]) -> Vec<String> {
    let needles: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    urls.into_iter()
        .filter(|url| {
            let lower = url.to_lowercase();
            needles.iter().any(|k| lower.contains(k.as_str()))
        })
        .collect()
}

// ── Tests ──
