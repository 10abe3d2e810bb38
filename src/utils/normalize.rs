//! Text and identifier normalization shared by the adapters and the merger.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Normalize a DOI to its bare lowercase form.
///
/// Accepts `doi:` prefixes and `doi.org` URLs. Returns `None` when the value
/// does not look like a DOI ("10.<registrant>/<suffix>").
pub fn normalize_doi(doi: &str) -> Option<String> {
    let doi = doi.trim().to_lowercase();

    let doi = doi.strip_prefix("doi:").unwrap_or(&doi).trim_start();
    let doi = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/"]
        .iter()
        .find_map(|prefix| doi.strip_prefix(prefix))
        .unwrap_or(doi);

    // DOI must start with "10." and have a registrant code and a suffix
    let rest = doi.strip_prefix("10.")?;
    let (registrant, suffix) = rest.split_once('/')?;
    if registrant.is_empty() || !registrant.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if suffix.is_empty() || suffix.chars().any(char::is_whitespace) {
        return None;
    }

    Some(doi.to_string())
}

/// Collapse runs of whitespace into single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title key used for identity resolution.
///
/// Lowercased, punctuation removed, whitespace collapsed.
pub fn title_key(title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize_whitespace(&cleaned)
}

fn markup_regex() -> Option<&'static Regex> {
    static MARKUP: OnceLock<Option<Regex>> = OnceLock::new();
    MARKUP.get_or_init(|| Regex::new(r"<\s*/?\s*([^\s/>]*)[^>]*>").ok()).as_ref()
}

/// Tags that separate words; every other tag is inline and removed without a gap
const BLOCK_TAGS: &[&str] = &[
    "abstract", "br", "div", "li", "list", "list-item", "p", "sec", "table", "td", "th", "title", "tr",
];

fn is_block_tag(name: &str) -> bool {
    // JATS tags carry a namespace prefix ("jats:p")
    let local = name.rsplit(':').next().unwrap_or(name).to_ascii_lowercase();
    local.is_empty() || BLOCK_TAGS.contains(&local.as_str())
}

/// Strip HTML/JATS tags (Crossref abstracts) and normalize whitespace.
///
/// Block-level tags become a space; inline tags (`<i>`, `<sub>`, ...) are
/// dropped so that "H<sub>2</sub>O" stays one word.
pub fn strip_markup(text: &str) -> String {
    let stripped = match markup_regex() {
        Some(re) => re
            .replace_all(text, |caps: &Captures| {
                let name = caps.get(1).map_or("", |m| m.as_str());
                if is_block_tag(name) { " " } else { "" }
            })
            .into_owned(),
        None => text.to_string(),
    };
    let unescaped = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    normalize_whitespace(&unescaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi() {
        assert_eq!(normalize_doi("10.1234/ABC").as_deref(), Some("10.1234/abc"));
        assert_eq!(normalize_doi(" https://doi.org/10.1234/x ").as_deref(), Some("10.1234/x"));
        assert_eq!(normalize_doi("doi:10.1234/x").as_deref(), Some("10.1234/x"));
        assert_eq!(normalize_doi("DOI: 10.1234/x").as_deref(), Some("10.1234/x"));
        assert_eq!(normalize_doi("http://dx.doi.org/10.1000.10/x").as_deref(), Some("10.1000.10/x"));
    }

    #[test]
    fn test_normalize_doi_rejects_garbage() {
        assert_eq!(normalize_doi(""), None);
        assert_eq!(normalize_doi("11.1234/x"), None);
        assert_eq!(normalize_doi("10.1234"), None);
        assert_eq!(normalize_doi("10./x"), None);
        assert_eq!(normalize_doi("10.12ab/x"), None);
        assert_eq!(normalize_doi("10.1234/a b"), None);
    }

    #[test]
    fn test_title_key() {
        assert_eq!(title_key("Aortic Stenosis: A Review"), "aortic stenosis a review");
        assert_eq!(title_key("Test   Title"), "test title");
        assert_eq!(title_key("TAVR vs. SAVR—outcomes"), "tavr vs savr outcomes");
        assert_eq!(title_key("   "), "");
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<jats:p>Background &amp; aims:\n <jats:italic>in vivo</jats:italic></jats:p>"),
            "Background & aims: in vivo"
        );
        assert_eq!(strip_markup("<jats:p>One.</jats:p><jats:p>Two.</jats:p>"), "One. Two.");
        assert_eq!(strip_markup("Line<br/>break"), "Line break");
    }

    #[test]
    fn test_strip_markup_keeps_inline_words_whole() {
        assert_eq!(strip_markup("Effects of H<sub>2</sub>O on <i>E. coli</i>"), "Effects of H2O on E. coli");
        assert_eq!(
            strip_markup("<jats:title>β<jats:sub>2</jats:sub>-adrenergic blockade</jats:title>"),
            "β2-adrenergic blockade"
        );
        assert_eq!(strip_markup("10<sup>-3</sup> mol"), "10-3 mol");
    }
}
