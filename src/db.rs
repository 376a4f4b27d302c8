use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            origin     TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS runs (
            id          INTEGER PRIMARY KEY,
            url         TEXT NOT NULL,
            started_at  TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            status      TEXT NOT NULL CHECK(status IN ('ok','error')),
            error       TEXT,
            emails      INTEGER NOT NULL DEFAULT 0,
            phones      INTEGER NOT NULL DEFAULT 0,
            addresses   INTEGER NOT NULL DEFAULT 0,
            donations   INTEGER NOT NULL DEFAULT 0,
            pdf_links   INTEGER NOT NULL DEFAULT 0,
            pdfs_parsed INTEGER NOT NULL DEFAULT 0,
            donors      INTEGER NOT NULL DEFAULT 0,
            output_path TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_runs_url ON runs(url);
        ",
    )?;
    Ok(())
}

// ── Queue ──

/// Enqueue `urls` discovered from `origin`. Already-known URLs are ignored.
pub fn insert_pages(conn: &Connection, origin: &str, urls: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO pages (url, origin) VALUES (?1, ?2)")?;
        for url in urls {
            count += stmt.execute(params![url, origin])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, |n| n as i64);
    let mut stmt =
        conn.prepare("SELECT id, url FROM pages WHERE visited = 0 ORDER BY id LIMIT ?1")?;
    let rows = stmt
        .query_map([limit], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_visited(conn: &Connection, page_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
        [page_id],
    )?;
    Ok(())
}

// ── Runs ──

#[derive(Debug, Clone, Default)]
pub struct RunCounts {
    pub emails: usize,
    pub phones: usize,
    pub addresses: usize,
    pub donations: usize,
    pub pdf_links: usize,
    pub pdfs_parsed: usize,
    pub donors: usize,
}

#[derive(Debug, Clone)]
pub struct RunRow {
    pub url: String,
    pub started_at: String,
    pub finished_at: String,
    /// `None` for a successful run.
    pub error: Option<String>,
    pub counts: RunCounts,
    pub output_path: Option<String>,
}

impl RunRow {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub fn insert_run(conn: &Connection, run: &RunRow) -> Result<i64> {
    let c = &run.counts;
    conn.execute(
        "INSERT INTO runs
            (url, started_at, finished_at, status, error,
             emails, phones, addresses, donations, pdf_links, pdfs_parsed, donors, output_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            run.url,
            run.started_at,
            run.finished_at,
            if run.is_ok() { "ok" } else { "error" },
            run.error,
            c.emails as i64,
            c.phones as i64,
            c.addresses as i64,
            c.donations as i64,
            c.pdf_links as i64,
            c.pdfs_parsed as i64,
            c.donors as i64,
            run.output_path,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT url, started_at, finished_at, error,
                emails, phones, addresses, donations, pdf_links, pdfs_parsed, donors, output_path
         FROM runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                url: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                error: row.get(3)?,
                counts: RunCounts {
                    emails: row.get(4)?,
                    phones: row.get(5)?,
                    addresses: row.get(6)?,
                    donations: row.get(7)?,
                    pdf_links: row.get(8)?,
                    pdfs_parsed: row.get(9)?,
                    donors: row.get(10)?,
                },
                output_path: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub runs: usize,
    pub failed_runs: usize,
    pub donors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM pages WHERE visited = 1", [], |r| r.get(0))?;
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let failed_runs: usize = conn.query_row(
        "SELECT COUNT(*) FROM runs WHERE status = 'error'",
        [],
        |r| r.get(0),
    )?;
    let donors: usize =
        conn.query_row("SELECT COALESCE(SUM(donors), 0) FROM runs", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        runs,
        failed_runs,
        donors,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run(url: &str, error: Option<&str>, donors: usize) -> RunRow {
        RunRow {
            url: url.into(),
            started_at: "2024-05-01T10:00:00+00:00".into(),
            finished_at: "2024-05-01T10:00:03+00:00".into(),
            error: error.map(String::from),
            counts: RunCounts {
                donors,
                ..Default::default()
            },
            output_path: error.is_none().then(|| "data/x_org/data_20240501_100000.json".into()),
        }
    }

    #[test]
    fn reenqueue_is_ignored() {
        let conn = memory();
        let origin = "https://x.org/";
        let first = insert_pages(&conn, origin, &urls(&["https://x.org/donate", "https://x.org/about"]))
            .unwrap();
        let second = insert_pages(&conn, origin, &urls(&["https://x.org/donate", "https://x.org/fund"]))
            .unwrap();
        assert_eq!(first, 2);
        assert_eq!(second, 1);
        assert_eq!(get_stats(&conn).unwrap().total, 3);
    }

    #[test]
    fn queue_order_limit_and_visit() {
        let conn = memory();
        insert_pages(
            &conn,
            "https://x.org/",
            &urls(&["https://x.org/a", "https://x.org/b", "https://x.org/c"]),
        )
        .unwrap();

        let two = fetch_unvisited(&conn, Some(2)).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].1, "https://x.org/a");

        mark_visited(&conn, two[0].0).unwrap();
        let rest = fetch_unvisited(&conn, None).unwrap();
        assert_eq!(
            rest.iter().map(|(_, u)| u.as_str()).collect::<Vec<_>>(),
            vec!["https://x.org/b", "https://x.org/c"]
        );

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.visited, 1);
        assert_eq!(stats.unvisited, 2);
    }

    #[test]
    fn runs_history_newest_first() {
        let conn = memory();
        insert_run(&conn, &run("https://x.org/a", None, 2)).unwrap();
        insert_run(&conn, &run("https://x.org/b", Some("page text is empty"), 0)).unwrap();
        insert_run(&conn, &run("https://x.org/c", None, 1)).unwrap();

        let recent = fetch_recent_runs(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://x.org/c");
        assert!(!recent[1].is_ok());
        assert!(recent[1].output_path.is_none());

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.donors, 3);
    }

    #[test]
    fn empty_stats() {
        let stats = get_stats(&memory()).unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.runs, 0);
        assert_eq!(stats.donors, 0);
    }
}
