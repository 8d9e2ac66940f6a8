use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use url::Url;

use crate::error::{ExtractError, Result};
use crate::fetcher::FetchedPage;

/// Candidate containers for the article body, best first.
const CONTENT_ROOTS: [&str; 5] = ["article", "[itemprop='articleBody']", "main", "[role='main']", "body"];

const BLOCKS: &str = "p, h2, h3, h4, h5, h6, li, blockquote, pre";

/// Elements whose text never counts as article content.
const SKIPPED: [&str; 10] = [
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form", "button",
];

/// What a page yields before fallbacks are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub text: Option<String>,
    pub top_image: Option<String>,
}

/// Refuses bodies that are not markup, then parses.
pub fn parse_fetched(page: &FetchedPage) -> Result<ParsedPage> {
    if let Some(content_type) = page.content_type.as_deref() {
        if !is_markup(content_type) {
            return Err(ExtractError::Parse(format!("unsupported content type: {content_type}")));
        }
    }
    if page.body.trim().is_empty() {
        return Err(ExtractError::Parse("empty document".to_string()));
    }
    parse_page(&page.body, &page.url)
}

fn is_markup(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml" || mime == "text/plain"
}

/// Pulls title, main text and lead image out of an HTML document.
///
/// Relative image URLs are resolved against `base_url`.
pub fn parse_page(html: &str, base_url: &Url) -> Result<ParsedPage> {
    let document = Html::parse_document(html);
    let linked_data = linked_data(&document)?;

    let title = first_non_empty([
        meta_content(&document, "meta[property='og:title'], meta[name='og:title']")?,
        linked_data.iter().find_map(|item| item.get("headline").and_then(Value::as_str).map(collapse_whitespace)),
        first_text(&document, "title")?,
        first_text(&document, "h1")?,
    ]);

    let root = content_root(&document)?;
    let text = match root {
        Some(root) => extract_blocks(root)?,
        None => None,
    };

    let lead_image = match root {
        Some(root) => root
            .select(&selector("img[src]")?)
            .filter_map(|img| img.value().attr("src"))
            .find(|src| !src.trim().is_empty() && !src.trim().starts_with("data:"))
            .map(str::to_string),
        None => None,
    };
    let candidates = [
        meta_content(&document, "meta[property='og:image'], meta[name='og:image']")?,
        meta_content(&document, "meta[name='twitter:image'], meta[property='twitter:image']")?,
        linked_data.iter().find_map(|item| item.get("image").and_then(image_url)),
        lead_image,
    ];
    let top_image = candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| resolve_image(&candidate, base_url));

    Ok(ParsedPage { title, text, top_image })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ExtractError::Parse(format!("Invalid selector {css}: {e}")))
}

fn meta_content(document: &Html, css: &str) -> Result<Option<String>> {
    Ok(document
        .select(&selector(css)?)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty()))
}

fn first_text(document: &Html, css: &str) -> Result<Option<String>> {
    Ok(document
        .select(&selector(css)?)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty()))
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|candidate| !candidate.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Top-level JSON-LD objects, with `@graph` members flattened in.
fn linked_data(document: &Html) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    for script in document.select(&selector("script[type='application/ld+json']")?) {
        let raw = script.text().collect::<String>();
        // Broken JSON-LD is common; ignore it rather than failing the page.
        let Ok(json) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        let roots = match json {
            Value::Array(arr) => arr,
            other => vec![other],
        };
        for root in roots {
            if let Some(Value::Array(graph)) = root.get("@graph") {
                items.extend(graph.iter().cloned());
            }
            items.push(root);
        }
    }
    Ok(items)
}

/// `image` may be a string, an `ImageObject`, or a list of either.
fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(|s| s.trim().to_string()),
        Value::Array(arr) => arr.iter().find_map(image_url),
        _ => None,
    }
}

fn resolve_image(candidate: &str, base_url: &Url) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.starts_with("data:") {
        return None;
    }
    let resolved = base_url.join(candidate).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn content_root(document: &Html) -> Result<Option<ElementRef<'_>>> {
    for css in CONTENT_ROOTS {
        if let Some(root) = document.select(&selector(css)?).next() {
            return Ok(Some(root));
        }
    }
    Ok(None)
}

/// Readable blocks under `root`, joined by blank lines.
///
/// Falls back to all visible text when the page has no block markup.
fn extract_blocks(root: ElementRef<'_>) -> Result<Option<String>> {
    let blocks = selector(BLOCKS)?;
    let mut parts: Vec<String> = Vec::new();
    for block in root.select(&blocks) {
        // The enclosing block already contributed this text.
        if has_ancestor(block, root, |name| blocks_contains(name)) {
            continue;
        }
        if has_ancestor(block, root, |name| SKIPPED.contains(&name)) {
            continue;
        }
        let text = visible_text(block);
        if !text.is_empty() {
            parts.push(text);
        }
    }

    if parts.is_empty() {
        let text = visible_text(root);
        return Ok((!text.is_empty()).then_some(text));
    }
    Ok(Some(parts.join("\n\n")))
}

fn blocks_contains(name: &str) -> bool {
    matches!(name, "p" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "blockquote" | "pre")
}

/// Walks up from `element` to (but not including) `root`.
fn has_ancestor(element: ElementRef<'_>, root: ElementRef<'_>, matches: impl Fn(&str) -> bool) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == root.id() {
            return false;
        }
        if let Some(el) = ancestor.value().as_element() {
            if matches(el.name()) {
                return true;
            }
        }
    }
    false
}

/// Text under `element`, skipping scripts and page chrome.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != element.id())
            .filter_map(|ancestor| ancestor.value().as_element())
            .any(|el| SKIPPED.contains(&el.name()));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}
