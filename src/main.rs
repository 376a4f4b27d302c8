mod artifacts;
mod db;
mod fetcher;
mod parser;
mod pdf;
mod settings;
mod sitemap;

use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use artifacts::WrittenArtifacts;
use fetcher::Fetcher;
use parser::extract::patterns::PatternSet;
use parser::extract::record::ResultRecord;
use parser::extract::ExtractOptions;
use pdf::PdfDownloader;
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "donor_scraper",
    about = "Extract donor and contact details from web pages and their linked PDFs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one page and write its artifacts
    Scrape {
        url: String,
        /// Max linked PDFs to download (default: all)
        #[arg(long)]
        max_pdfs: Option<usize>,
    },
    /// Discover donor/contact pages from a site's sitemap and queue them
    Sitemap {
        base_url: String,
        /// URL keyword to keep (repeatable; default from settings)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
    },
    /// Scrape queued pages one after another
    Run {
        /// Max pages to scrape (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show queue and run statistics
    Stats,
    /// Recent runs table
    History {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Scrape { url, max_pdfs } => {
            let url = fetcher::validate_url(&url)?;
            let session = Session::open(settings)?;
            let opts = ExtractOptions {
                max_pdfs: max_pdfs.or(session.settings.max_pdfs),
            };
            let (record, written) = session.scrape(url.as_str(), &opts).await?;
            print_summary(&record);
            println!("\nSaved to {}", written.result.display());
            println!("Contacts: {}", written.contacts.display());
            Ok(())
        }
        Commands::Sitemap { base_url, keywords } => {
            let base = fetcher::validate_url(&base_url)?;
            let keywords = if keywords.is_empty() {
                settings.keywords()
            } else {
                keywords
            };
            let conn = open_ledger(&settings)?;
            let fetcher = Fetcher::new(&settings)?;
            let urls = sitemap::discover(fetcher.client(), &base, &keywords).await?;
            let inserted = db::insert_pages(&conn, base.as_str(), &urls)?;
            println!("Queued {} new URLs ({} matched)", inserted, urls.len());
            for url in &urls {
                println!("  {}", url);
            }
            Ok(())
        }
        Commands::Run { limit } => {
            let session = Session::open(settings)?;
            let pages = db::fetch_unvisited(&session.conn, limit)?;
            if pages.is_empty() {
                println!("No queued pages. Run 'sitemap' first or all pages are scraped.");
                return Ok(());
            }
            println!("Scraping {} pages...", pages.len());
            let counts = session.run_queue(&pages).await?;
            println!(
                "Done: {} pages ({} ok, {} errors), {} donors found.",
                pages.len(),
                counts.ok,
                counts.errors,
                counts.donors
            );
            Ok(())
        }
        Commands::Stats => {
            let conn = open_ledger(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Queued:    {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Runs:      {}", s.runs);
            println!("Failed:    {}", s.failed_runs);
            println!("Donors:    {}", s.donors);
            Ok(())
        }
        Commands::History { limit } => {
            let conn = open_ledger(&settings)?;
            let rows = db::fetch_recent_runs(&conn, limit)?;
            if rows.is_empty() {
                println!("No runs yet.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<19} | {:<40} | {:<5} | {:>6} | {:>6} | {:>4} | {:>6}",
                "#", "Started", "URL", "Status", "Emails", "Phones", "PDFs", "Donors"
            );
            println!("{}", "-".repeat(108));

            for (i, r) in rows.iter().enumerate() {
                let started = truncate_plain(&r.started_at, 19);
                let status = if r.is_ok() { "ok" } else { "error" };
                println!(
                    "{:>3} | {:<19} | {:<40} | {:<5} | {:>6} | {:>6} | {:>4} | {:>6}",
                    i + 1,
                    started,
                    truncate(&r.url, 40),
                    status,
                    r.counts.emails,
                    r.counts.phones,
                    r.counts.pdfs_parsed,
                    r.counts.donors
                );
            }

            let failed: Vec<_> = rows.iter().filter(|r| !r.is_ok()).collect();
            if !failed.is_empty() {
                println!("\n--- Errors ---");
                for r in &failed {
                    println!(
                        "  {}: {}",
                        truncate(&r.url, 40),
                        truncate(r.error.as_deref().unwrap_or_default(), 60)
                    );
                }
            }

            println!("\n{} runs", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_ledger(settings: &Settings) -> Result<Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Everything one or more runs share: settings, ledger, clients, patterns.
struct Session {
    settings: Settings,
    conn: Connection,
    fetcher: Fetcher,
    pdfs: PdfDownloader,
    patterns: PatternSet,
}

#[derive(Default)]
struct QueueCounts {
    ok: usize,
    errors: usize,
    donors: usize,
}

impl Session {
    fn open(settings: Settings) -> Result<Self> {
        let conn = open_ledger(&settings)?;
        let fetcher = Fetcher::new(&settings)?;
        let pdfs = PdfDownloader::new(fetcher.client().clone(), settings.pdf_max_bytes);
        let patterns = PatternSet::with_overrides(&settings.pattern_overrides());
        for (kind, pattern) in patterns.named() {
            if pattern.is_enabled() {
                debug!("{} pattern: {}", kind, pattern.source());
            }
        }
        let disabled = patterns.disabled();
        if !disabled.is_empty() {
            warn!("Disabled patterns (will match nothing): {}", disabled.join(", "));
        }
        Ok(Session {
            settings,
            conn,
            fetcher,
            pdfs,
            patterns,
        })
    }

    /// One run: fetch, extract, write artifacts, then record the outcome in the
    /// ledger whether it succeeded or not.
    async fn scrape(
        &self,
        url: &str,
        opts: &ExtractOptions,
    ) -> Result<(ResultRecord, WrittenArtifacts)> {
        let started_at = Local::now().to_rfc3339();
        info!("Scraping {}", url);
        let fetched = self.fetcher.fetch_page(url).await;
        self.finish_run(url, started_at, fetched, opts).await
    }

    /// Everything after the fetch. Artifacts are only written once extraction
    /// has succeeded; the ledger row is written either way.
    async fn finish_run(
        &self,
        url: &str,
        started_at: String,
        fetched: Result<String>,
        opts: &ExtractOptions,
    ) -> Result<(ResultRecord, WrittenArtifacts)> {
        let outcome = match fetched {
            Ok(html) => self.extract_and_write(url, &html, opts).await,
            Err(e) => Err(e),
        };
        let finished_at = Local::now().to_rfc3339();

        let run = match &outcome {
            Ok((record, written)) => db::RunRow {
                url: url.to_string(),
                started_at,
                finished_at,
                error: None,
                counts: run_counts(record),
                output_path: Some(written.result.display().to_string()),
            },
            Err(e) => db::RunRow {
                url: url.to_string(),
                started_at,
                finished_at,
                error: Some(format!("{:#}", e)),
                counts: db::RunCounts::default(),
                output_path: None,
            },
        };
        db::insert_run(&self.conn, &run)?;
        outcome
    }

    async fn extract_and_write(
        &self,
        url: &str,
        html: &str,
        opts: &ExtractOptions,
    ) -> Result<(ResultRecord, WrittenArtifacts)> {
        let (snapshot, record) =
            parser::process_page(url, html, &self.pdfs, &self.patterns, opts).await?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let written = artifacts::write_all(&self.settings.data_dir, &snapshot, &record, &stamp)?;
        info!("Saved {} to {}", url, written.dir.display());
        Ok((record, written))
    }

    /// Scrape queued pages sequentially. A failed page is recorded and skipped.
    async fn run_queue(&self, pages: &[(i64, String)]) -> Result<QueueCounts> {
        use indicatif::{ProgressBar, ProgressStyle};

        let pb = ProgressBar::new(pages.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );

        let opts = ExtractOptions {
            max_pdfs: self.settings.max_pdfs,
        };
        let mut counts = QueueCounts::default();

        for (page_id, url) in pages {
            pb.set_message(truncate(url, 40));
            match self.scrape(url, &opts).await {
                Ok((record, _)) => {
                    counts.ok += 1;
                    counts.donors += record.donors.len();
                }
                Err(e) => {
                    counts.errors += 1;
                    pb.suspend(|| warn!("Failed {}: {:#}", url, e));
                }
            }
            db::mark_visited(&self.conn, *page_id)?;
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(counts)
    }
}

fn run_counts(record: &ResultRecord) -> db::RunCounts {
    db::RunCounts {
        emails: record.emails.len(),
        phones: record.phones.len(),
        addresses: record.addresses.len(),
        donations: record.donations.len(),
        pdf_links: record.pdf_links.len(),
        pdfs_parsed: record.pdf_data.len(),
        donors: record.donors.len(),
    }
}

fn print_summary(record: &ResultRecord) {
    println!(
        "Emails:    {} [{}]",
        record.emails.len(),
        record.emails.as_slice().join(", ")
    );
    println!(
        "Phones:    {} [{}]",
        record.phones.len(),
        record.phones.as_slice().join(", ")
    );
    println!("Addresses: {}", record.addresses.len());
    if !record.addresses.is_empty() {
        for address in record.addresses.as_slice() {
            println!("  {}", address);
        }
    }
    println!("Donations: {}", record.donations.len());
    println!(
        "PDFs:      {} linked, {} parsed",
        record.pdf_links.len(),
        record.pdf_data.len()
    );
    println!("Donors:    {}", record.donors.len());
    for donor in &record.donors {
        let contacts: Vec<&str> = donor
            .emails
            .iter()
            .chain(donor.phones.iter())
            .map(String::as_str)
            .collect();
        println!("  {} ({})", donor.name, contacts.join(", "));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

/// Cut without an ellipsis; used for fixed-width timestamps.
fn truncate_plain(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::settings::tests::settings_in;

    const URL: &str = "https://friends.example.org/donors";
    const NO_PDFS: ExtractOptions = ExtractOptions { max_pdfs: Some(0) };

    #[tokio::test]
    async fn blank_page_writes_nothing_but_ledger_row() {
        let tmp = TempDir::new().unwrap();
        let session = Session::open(settings_in(tmp.path())).unwrap();

        let html = "<html><body><script>var x = 1;</script>  </body></html>";
        let err = session
            .finish_run(URL, Local::now().to_rfc3339(), Ok(html.to_string()), &NO_PDFS)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("page text is empty"));

        assert!(!session.settings.data_dir.exists());

        let runs = db::fetch_recent_runs(&session.conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert!(!runs[0].is_ok());
        assert_eq!(runs[0].url, URL);
        assert!(runs[0].output_path.is_none());
        assert!(runs[0].error.as_deref().unwrap().contains("page text is empty"));
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let session = Session::open(settings_in(tmp.path())).unwrap();

        let fetched = Err(anyhow::anyhow!("Failed to fetch {}: HTTP status 404", URL));
        assert!(session
            .finish_run(URL, Local::now().to_rfc3339(), fetched, &NO_PDFS)
            .await
            .is_err());

        assert!(!session.settings.data_dir.exists());
        let stats = db::get_stats(&session.conn).unwrap();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.failed_runs, 1);
    }

    #[tokio::test]
    async fn donor_page_run_writes_artifacts_and_ok_row() {
        let tmp = TempDir::new().unwrap();
        let session = Session::open(settings_in(tmp.path())).unwrap();

        let html = std::fs::read_to_string("tests/fixtures/donor_page.html").unwrap();
        let (record, written) = session
            .finish_run(URL, Local::now().to_rfc3339(), Ok(html), &NO_PDFS)
            .await
            .unwrap();

        assert_eq!(record.donors.len(), 2);
        assert!(record.pdf_data.is_empty());
        assert!(written.result.exists());
        assert!(written.contacts.exists());
        assert_eq!(written.dir, session.settings.data_dir.join("friends_example_org"));

        let runs = db::fetch_recent_runs(&session.conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].is_ok());
        assert_eq!(runs[0].counts.donors, 2);
        assert_eq!(runs[0].counts.pdf_links, 2);
        assert_eq!(runs[0].counts.pdfs_parsed, 0);
        assert_eq!(
            runs[0].output_path.as_deref(),
            Some(written.result.display().to_string().as_str())
        );
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("https://friends.example.org", 8), "https://...");
        assert_eq!(truncate_plain("2024-05-01T10:00:00+02:00", 19), "2024-05-01T10:00:00");
    }

    #[test]
    fn durations() {
        use std::time::Duration;
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "donor_scraper",
            "sitemap",
            "https://x.org",
            "-k",
            "gala",
            "--keyword",
            "give",
        ])
        .unwrap();
        match cli.command {
            Commands::Sitemap { base_url, keywords } => {
                assert_eq!(base_url, "https://x.org");
                assert_eq!(keywords, vec!["gala", "give"]);
            }
            _ => panic!("expected sitemap"),
        }

        let cli = Cli::try_parse_from(["donor_scraper", "scrape", "https://x.org", "--max-pdfs", "2"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Scrape { max_pdfs: Some(2), .. }));
    }
}
