//! Zip-link detection on a course download page.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static LINK_OR_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], button[href]").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static DOWNLOAD_COURSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)download.*course").expect("valid regex"));

/// Words that mark a link's text as a course download.
const DOWNLOAD_WORDS: [&str; 3] = ["download", "course", "zip"];

/// Find the course archive link in a download page and resolve it.
///
/// Strategies, first hit wins:
/// 1. a link or button to a `.zip` whose text mentions download/course/zip
/// 2. the first `.zip` link under the parent of a "download … course" text
/// 3. the first `.zip` link anywhere on the page
pub fn extract_zip_link(html: &str, course_url: &str, site_origin: &str) -> Option<String> {
    let document = Html::parse_document(html);

    labelled_link(&document)
        .or_else(|| link_near_download_text(&document))
        .or_else(|| first_zip_link(&document))
        .map(|href| resolve_href(&href, course_url, site_origin))
}

fn zip_href(el: &ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("href")
        .filter(|href| href.contains(".zip"))
        .map(str::to_string)
}

fn labelled_link(document: &Html) -> Option<String> {
    document.select(&LINK_OR_BUTTON).find_map(|el| {
        let href = zip_href(&el)?;
        let text: String = el
            .text()
            .collect::<String>()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        DOWNLOAD_WORDS
            .iter()
            .any(|word| text.contains(word))
            .then_some(href)
    })
}

fn link_near_download_text(document: &Html) -> Option<String> {
    document.root_element().descendants().find_map(|node| {
        let text = node.value().as_text()?;
        if !DOWNLOAD_COURSE_RE.is_match(text) {
            return None;
        }
        let parent = ElementRef::wrap(node.parent()?)?;
        parent.select(&ANCHOR).find_map(|a| zip_href(&a))
    })
}

fn first_zip_link(document: &Html) -> Option<String> {
    document.select(&ANCHOR).find_map(|a| zip_href(&a))
}

/// Make `href` absolute.
///
/// `http…` is kept, `/…` is joined to the site origin, and anything else is
/// taken relative to the course URL.
pub fn resolve_href(href: &str, course_url: &str, site_origin: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{href}", site_origin.trim_end_matches('/'))
    } else {
        format!("{}/{href}", course_url.trim_end_matches('/'))
    }
}
