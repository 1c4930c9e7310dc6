//! Readable-content extraction heuristics.
//!
//! Recovers main article text from a page by stripping boilerplate,
//! scoring candidate content regions, and converting the winner to a
//! markdown-ish plain text. No attempt is made to be correct for
//! arbitrary sites; this is the generic fallback the skill pipeline
//! improves on.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ToolError, ToolResult};
use crate::fetch::FetchedPage;

/// Selectors tried, in order, when looking for the main content region.
const CANDIDATE_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    "#content",
    ".content",
    ".article-body",
    ".post-content",
    ".entry-content",
    "#main",
];

/// Minimum text length for a candidate region to win outright.
const REGION_MIN_CHARS: usize = 140;

/// Readable content recovered from a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readable {
    pub title: Option<String>,
    pub text: String,
}

/// One candidate content region, for structural inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInfo {
    pub selector: String,
    pub text_chars: usize,
    pub link_count: usize,
}

/// Element counts plus candidate regions for a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureReport {
    pub links: usize,
    pub headings: usize,
    pub paragraphs: usize,
    pub articles: usize,
    pub lists: usize,
    pub images: usize,
    pub regions: Vec<RegionInfo>,
}

/// An absolute link with its visible text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
}

/// Extract readable content from a fetched page.
///
/// Markdown bodies pass through untouched; HTML goes through
/// boilerplate stripping, region scoring, and markdown conversion.
pub fn extract_readable(page: &FetchedPage) -> Option<Readable> {
    if page.is_markdown {
        let text = page.body.trim();
        if text.is_empty() {
            return None;
        }
        return Some(Readable {
            title: page.title(),
            text: text.to_string(),
        });
    }

    let title = extract_title(&page.body);
    let stripped = strip_boilerplate(&page.body);

    let region_html = best_region(&stripped);
    let text = match region_html {
        Some(inner) => html_to_markdown(&inner),
        None => html_to_markdown(&stripped),
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return None;
    }
    Some(Readable { title, text })
}

/// Inner HTML of the highest-scoring candidate region, if any passes
/// the minimum-length bar.
fn best_region(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let mut best: Option<(usize, String)> = None;

    for selector in CANDIDATE_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for element in doc.select(&sel) {
            let chars: usize = element.text().map(str::len).sum();
            if chars < REGION_MIN_CHARS {
                continue;
            }
            if best.as_ref().map(|(c, _)| chars > *c).unwrap_or(true) {
                best = Some((chars, element.inner_html()));
            }
        }
    }

    best.map(|(_, inner)| inner)
}

/// Element counts and candidate regions, for the inspect tool.
pub fn inspect_structure(html: &str) -> StructureReport {
    let doc = Html::parse_document(html);

    let count = |pattern: &str| -> usize {
        Selector::parse(pattern)
            .map(|sel| doc.select(&sel).count())
            .unwrap_or(0)
    };

    let link_sel = Selector::parse("a[href]").ok();
    let mut regions = Vec::new();
    for selector in CANDIDATE_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        for element in doc.select(&sel) {
            let text_chars: usize = element.text().map(str::len).sum();
            let link_count = link_sel
                .as_ref()
                .map(|ls| element.select(ls).count())
                .unwrap_or(0);
            regions.push(RegionInfo {
                selector: selector.to_string(),
                text_chars,
                link_count,
            });
        }
    }

    StructureReport {
        links: count("a[href]"),
        headings: count("h1, h2, h3, h4"),
        paragraphs: count("p"),
        articles: count("article"),
        lists: count("ul, ol"),
        images: count("img"),
        regions,
    }
}

/// Markdown conversion of the first element matching `selector`.
pub fn select_content(html: &str, selector: &str) -> ToolResult<Option<String>> {
    let sel = Selector::parse(selector).map_err(|_| ToolError::Selector {
        selector: selector.to_string(),
    })?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&sel)
        .next()
        .map(|element| html_to_markdown(&element.inner_html())))
}

/// Absolute links with visible text, anchors and pseudo-schemes skipped.
pub fn extract_links(base_url: &Url, html: &str) -> Vec<PageLink> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut links = Vec::new();

    for element in doc.select(&sel) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        let text = element.text().collect::<String>().trim().to_string();
        links.push(PageLink {
            url: resolved.to_string(),
            text,
        });
    }

    links
}

/// Extract the page title from HTML.
pub fn extract_title(html: &str) -> Option<String> {
    let pattern = regex::Regex::new(r"(?s)<title[^>]*>(.*?)</title>").ok()?;
    pattern
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|t| !t.is_empty())
}

/// Remove script/style blocks and structural boilerplate elements.
pub fn strip_boilerplate(html: &str) -> String {
    let mut text = html.to_string();
    for pattern in [
        r"(?s)<script[^>]*>.*?</script>",
        r"(?s)<style[^>]*>.*?</style>",
        r"(?s)<noscript[^>]*>.*?</noscript>",
        r"(?s)<nav[^>]*>.*?</nav>",
        r"(?s)<header[^>]*>.*?</header>",
        r"(?s)<footer[^>]*>.*?</footer>",
        r"(?s)<aside[^>]*>.*?</aside>",
        r"(?s)<!--.*?-->",
    ] {
        let re = regex::Regex::new(pattern).unwrap();
        text = re.replace_all(&text, "").to_string();
    }
    text
}

/// Convert HTML to markdown (simplified).
pub fn html_to_markdown(html: &str) -> String {
    let mut text = strip_boilerplate(html);

    // Headers
    for (level, prefix) in [("1", "# "), ("2", "## "), ("3", "### "), ("4", "#### ")] {
        let re = regex::Regex::new(&format!(r"(?s)<h{level}[^>]*>(.*?)</h{level}>")).unwrap();
        text = re.replace_all(&text, format!("{prefix}$1\n")).to_string();
    }

    // Paragraphs, breaks, blockquotes
    let p = regex::Regex::new(r"(?s)<p[^>]*>(.*?)</p>").unwrap();
    text = p.replace_all(&text, "$1\n\n").to_string();
    let br = regex::Regex::new(r"<br\s*/?>").unwrap();
    text = br.replace_all(&text, "\n").to_string();
    let bq = regex::Regex::new(r"(?s)<blockquote[^>]*>(.*?)</blockquote>").unwrap();
    text = bq.replace_all(&text, "> $1\n").to_string();

    // Links
    let link = regex::Regex::new(r#"(?s)<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
    text = link.replace_all(&text, "[$2]($1)").to_string();

    // List items
    let li = regex::Regex::new(r"(?s)<li[^>]*>(.*?)</li>").unwrap();
    text = li.replace_all(&text, "- $1\n").to_string();

    // Remaining tags
    let tag = regex::Regex::new(r"<[^>]+>").unwrap();
    text = tag.replace_all(&text, "").to_string();

    // Whitespace
    let multi_newline = regex::Regex::new(r"\n{3,}").unwrap();
    text = multi_newline.replace_all(&text, "\n\n").to_string();

    decode_entities(text.trim())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_HTML: &str = r#"
        <html><head><title>Test Page</title></head><body>
        <nav><a href="/home">Home</a><a href="/about">About</a></nav>
        <article>
            <h1>The Headline</h1>
            <p>First paragraph with enough text to pass the region scoring
            threshold, because short fragments should never win.</p>
            <p>Second paragraph keeps the region comfortably long.</p>
        </article>
        <footer>Copyright</footer>
        </body></html>
    "#;

    #[test]
    fn test_extract_readable_prefers_article_region() {
        let page = FetchedPage::new("https://e.com/post", ARTICLE_HTML);
        let readable = extract_readable(&page).unwrap();

        assert_eq!(readable.title.as_deref(), Some("Test Page"));
        assert!(readable.text.contains("# The Headline"));
        assert!(readable.text.contains("First paragraph"));
        assert!(!readable.text.contains("Copyright"));
        assert!(!readable.text.contains("Home"));
    }

    #[test]
    fn test_extract_readable_empty_page() {
        let page = FetchedPage::new("https://e.com", "<html><body></body></html>");
        assert!(extract_readable(&page).is_none());
    }

    #[test]
    fn test_markdown_passthrough() {
        let page = FetchedPage::new("https://e.com", "# Title\n\nBody").as_markdown();
        let readable = extract_readable(&page).unwrap();
        assert_eq!(readable.text, "# Title\n\nBody");
    }

    #[test]
    fn test_html_to_markdown_conversion() {
        let md = html_to_markdown(
            r#"<h2>Sub</h2><p>Text with <a href="https://e.com">a link</a>.</p><li>item</li>"#,
        );
        assert!(md.contains("## Sub"));
        assert!(md.contains("[a link](https://e.com)"));
        assert!(md.contains("- item"));
    }

    #[test]
    fn test_extract_links_resolves_and_filters() {
        let base = Url::parse("https://e.com/section/").unwrap();
        let html = r##"
            <a href="/abs">Absolute path</a>
            <a href="rel">Relative</a>
            <a href="#anchor">Anchor</a>
            <a href="javascript:void(0)">JS</a>
        "##;
        let links = extract_links(&base, html);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://e.com/abs");
        assert_eq!(links[1].url, "https://e.com/section/rel");
    }

    #[test]
    fn test_select_content() {
        let html = r#"<div class="body"><p>Inside</p></div><div>Outside</div>"#;
        let content = select_content(html, "div.body").unwrap().unwrap();
        assert!(content.contains("Inside"));

        assert!(select_content(html, "div.missing").unwrap().is_none());
        assert!(select_content(html, "p[[").is_err());
    }

    #[test]
    fn test_inspect_structure_counts() {
        let report = inspect_structure(ARTICLE_HTML);
        assert_eq!(report.articles, 1);
        assert!(report.links >= 2);
        assert!(report.paragraphs >= 2);
        assert!(report
            .regions
            .iter()
            .any(|r| r.selector == "article" && r.text_chars > 100));
    }
}
