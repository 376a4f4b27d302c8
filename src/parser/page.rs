use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::extract::entities::Anchor;

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static SCRIPT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script[src]").unwrap());
static STYLESHEET_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"link[rel~="stylesheet"][href]"#).unwrap());
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head", "svg"];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "header", "footer", "nav", "aside", "main", "address", "blockquote", "pre", "table", "ul",
    "ol", "dl", "dt", "dd", "form", "fieldset", "figure", "figcaption", "hr",
];

/// Everything the scraper keeps from one rendered page.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
    /// Visible text, one block element per line.
    pub text: String,
    pub anchors: Vec<Anchor>,
    /// Absolute `a[href]` targets, deduplicated.
    pub links: Vec<String>,
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
    /// Indented tag tree: `tag#id.class`.
    pub outline: String,
}

pub fn snapshot(url: &str, html: &str) -> PageSnapshot {
    let document = Html::parse_document(html);
    let base = Url::parse(url).ok();

    let anchors: Vec<Anchor> = document
        .select(&ANCHOR_SEL)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            let text = el.text().collect::<Vec<_>>().join(" ");
            Some(Anchor::new(href, collapse_spaces(&text)))
        })
        .collect();

    let links = resolve_all(base.as_ref(), anchors.iter().map(|a| a.href.as_str()));
    let scripts = resolve_all(
        base.as_ref(),
        document.select(&SCRIPT_SEL).filter_map(|el| el.value().attr("src")),
    );
    let stylesheets = resolve_all(
        base.as_ref(),
        document
            .select(&STYLESHEET_SEL)
            .filter_map(|el| el.value().attr("href")),
    );

    let text = document
        .select(&BODY_SEL)
        .next()
        .map(|body| {
            let mut raw = String::new();
            collect_text(&body, &mut raw);
            clean_lines(&raw)
        })
        .unwrap_or_default();

    let mut outline = String::new();
    write_outline(&document.root_element(), 0, &mut outline);

    PageSnapshot {
        url: url.to_string(),
        html: html.to_string(),
        text,
        anchors,
        links,
        scripts,
        stylesheets,
        outline,
    }
}

fn collect_text(element: &ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let tag = child_el.value().name();
            if HIDDEN_TAGS.contains(&tag) {
                continue;
            }
            let is_block = BLOCK_TAGS.contains(&tag);
            if is_block {
                out.push('\n');
            }
            collect_text(&child_el, out);
            if is_block {
                out.push('\n');
            } else if matches!(tag, "td" | "th") {
                out.push(' ');
            }
        } else if let Some(text) = child.value().as_text() {
            // Source line breaks are layout, not content.
            for c in text.chars() {
                out.push(if c.is_whitespace() { ' ' } else { c });
            }
        }
    }
}

/// Collapse runs of spaces, trim each line and drop empty ones.
fn clean_lines(raw: &str) -> String {
    raw.lines()
        .map(collapse_spaces)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_all<'a>(base: Option<&Url>, hrefs: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    hrefs
        .filter_map(|href| {
            let href = href.trim();
            if href.is_empty() {
                return None;
            }
            match base {
                Some(b) => b.join(href).ok().map(|u| u.to_string()),
                None => Some(href.to_string()),
            }
        })
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

fn write_outline(element: &ElementRef, depth: usize, out: &mut String) {
    let el = element.value();
    out.push_str(&"  ".repeat(depth));
    out.push_str(el.name());
    if let Some(id) = el.id() {
        out.push('#');
        out.push_str(id);
    }
    for class in el.classes() {
        out.push('.');
        out.push_str(class);
    }
    out.push('\n');

    for child in element.children().filter_map(ElementRef::wrap) {
        write_outline(&child, depth + 1, out);
    }
}

// ── Tests ──
