//! Static HTML leaderboard page.
//!
//! Renders `leaderboard.csv` into a single self-contained page. Only the
//! status cell carries markup; every other cell is escaped.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use coursegrade_leaderboard::{COLUMNS, LeaderboardRecord, read_leaderboard, sort_records};
use coursegrade_shared::fs::write_atomic;
use coursegrade_shared::{Result, SiteConfig};

const EMPTY_BODY: &str = "<p>No submissions yet.</p>";

const STYLE: &str = "\
    body { font-family: system-ui, -apple-system, Segoe UI, Roboto, sans-serif; margin: 2rem; }
    table { border-collapse: collapse; width: 100%; }
    th, td { border-bottom: 1px solid #ddd; padding: 0.5rem; text-align: left; }
    th { position: sticky; top: 0; background: #fff; }
    .small { color: #666; font-size: 0.9rem; }
    .ok { color: #0a0; font-weight: 600; }
    .err { color: #a00; font-weight: 600; }";

/// Options for rendering the page.
#[derive(Debug, Clone)]
pub struct SiteOptions {
    /// Page title and heading.
    pub title: String,
    /// Leaderboard file named in the page footer.
    pub source: PathBuf,
}

impl SiteOptions {
    pub fn new(config: &SiteConfig, source: &Path) -> Self {
        Self {
            title: config.title.clone(),
            source: source.to_path_buf(),
        }
    }
}

/// Outcome of a site build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteResult {
    pub path: PathBuf,
    /// Number of leaderboard rows rendered.
    pub rows: usize,
}

/// Render the leaderboard CSV at `leaderboard` into `out`.
#[instrument(skip_all, fields(leaderboard = %leaderboard.display(), out = %out.display()))]
pub fn build_site(leaderboard: &Path, out: &Path, opts: &SiteOptions) -> Result<SiteResult> {
    let records = if leaderboard.exists() {
        read_leaderboard(leaderboard)?
    } else {
        Vec::new()
    };

    let html = render_page(&records, opts);
    write_atomic(out, html.as_bytes())?;

    info!(rows = records.len(), "wrote leaderboard page");
    Ok(SiteResult {
        path: out.to_path_buf(),
        rows: records.len(),
    })
}

/// Render the full page. Rows are re-sorted for display.
pub fn render_page(records: &[LeaderboardRecord], opts: &SiteOptions) -> String {
    let body = if records.is_empty() {
        EMPTY_BODY.to_string()
    } else {
        let mut sorted = records.to_vec();
        sort_records(&mut sorted);
        render_table(&sorted)
    };

    let title = escape_html(&opts.title);
    let source = escape_html(&opts.source.display().to_string());
    format!(
        "<!doctype html>
<html>
<head>
  <meta charset=\"utf-8\"/>
  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>
  <title>{title}</title>
  <style>
{STYLE}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <p class=\"small\">Primary metric: AUROC. Tie-breakers: AUPRC, then Brier (lower is better).</p>
  {body}
  <p class=\"small\">Updated from <code>{source}</code>.</p>
</body>
</html>
"
    )
}

fn render_table(records: &[LeaderboardRecord]) -> String {
    let mut html = String::from("<table class=\"leaderboard\">\n  <thead>\n    <tr>");
    for column in COLUMNS {
        html.push_str(&format!("<th>{column}</th>"));
    }
    html.push_str("</tr>\n  </thead>\n  <tbody>\n");

    for record in records {
        let cells = [
            escape_html(&record.team),
            escape_html(&record.submission),
            metric_cell(record.auroc),
            metric_cell(record.auprc),
            metric_cell(record.brier),
            record.n.map(|n| n.to_string()).unwrap_or_default(),
            escape_html(&record.timestamp),
            status_cell(record),
            escape_html(&record.notes),
        ];
        html.push_str("    <tr>");
        for cell in cells {
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("  </tbody>\n</table>");
    html
}

fn metric_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

fn status_cell(record: &LeaderboardRecord) -> String {
    if record.status.is_ok() {
        "<span class='ok'>OK</span>".to_string()
    } else {
        format!("<span class='err'>{}</span>", escape_html(record.status.as_str()))
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use coursegrade_shared::SubmissionStatus;

    use super::*;

    fn ok(team: &str, auroc: f64) -> LeaderboardRecord {
        LeaderboardRecord {
            team: team.into(),
            submission: "final".into(),
            auroc: Some(auroc),
            auprc: Some(0.5),
            brier: Some(0.125),
            n: Some(10),
            timestamp: "2026-10-17T08:30:00+00:00".into(),
            status: SubmissionStatus::Ok,
            notes: String::new(),
        }
    }

    fn err(team: &str, notes: &str) -> LeaderboardRecord {
        LeaderboardRecord {
            team: team.into(),
            submission: "final".into(),
            auroc: None,
            auprc: None,
            brier: None,
            n: None,
            timestamp: "2026-10-17T08:30:00+00:00".into(),
            status: SubmissionStatus::Error,
            notes: notes.into(),
        }
    }

    fn opts() -> SiteOptions {
        SiteOptions::new(&SiteConfig::default(), Path::new("leaderboard/leaderboard.csv"))
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cg-site-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn empty_leaderboard_renders_placeholder() {
        let html = render_page(&[], &opts());
        assert!(html.contains("<title>Readmit30 Leaderboard</title>"));
        assert!(html.contains("<p>No submissions yet.</p>"));
        assert!(!html.contains("<table"));
    }

    #[test]
    fn rows_are_sorted_and_formatted() {
        let html = render_page(&[ok("second", 0.7), ok("first", 0.91234)], &opts());
        let first = html.find("<td>first</td>").unwrap();
        let second = html.find("<td>second</td>").unwrap();
        assert!(first < second);
        assert!(html.contains("<td>0.9123</td>"));
        assert!(html.contains("<td>0.1250</td>"));
        assert!(html.contains("<span class='ok'>OK</span>"));
        assert!(html.contains("<th>auroc</th>"));
    }

    #[test]
    fn notes_are_escaped_and_errors_styled() {
        let html = render_page(&[err("T<1>", "expected <table> & got \"none\"")], &opts());
        assert!(html.contains("<td>T&lt;1&gt;</td>"));
        assert!(html.contains("expected &lt;table&gt; &amp; got &quot;none&quot;"));
        assert!(html.contains("<span class='err'>ERROR</span>"));
        // Missing metrics render as empty cells.
        assert!(html.contains("<td></td>"));
    }

    #[test]
    fn build_site_without_leaderboard_writes_empty_page() {
        let tmp = temp_dir();
        let out = tmp.join("docs").join("index.html");

        let result = build_site(&tmp.join("missing.csv"), &out, &opts()).unwrap();
        assert_eq!(result.rows, 0);
        let html = std::fs::read_to_string(&out).unwrap();
        assert!(html.contains("No submissions yet."));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn build_site_from_leaderboard_file() {
        let tmp = temp_dir();
        let csv = tmp.join("leaderboard.csv");
        coursegrade_leaderboard::write_leaderboard(&csv, &[ok("A", 0.8), err("B", "boom")])
            .unwrap();
        let out = tmp.join("site").join("index.html");

        let result = build_site(&csv, &out, &opts()).unwrap();
        assert_eq!(result.rows, 2);
        let html = std::fs::read_to_string(&out).unwrap();
        assert!(html.contains("<td>A</td>"));
        assert!(html.contains("<td>boom</td>"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
