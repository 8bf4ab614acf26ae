//! Href handling for paths inside the container.
//!
//! Archive entry names always use `/`, so these helpers work on strings rather
//! than `std::path` (which would use `\` on Windows).

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Split an href into its path and optional fragment.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

/// Drop the `#fragment` part of an href, if any.
pub fn strip_fragment(href: &str) -> &str {
    split_fragment(href).0
}

/// Directory portion of an archive path, without a trailing slash.
///
/// `"OEBPS/content.opf"` -> `"OEBPS"`, `"content.opf"` -> `""`.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

/// Collapse `.` and `..` segments and repeated slashes.
///
/// `..` at the top of the tree is dropped, as the container has no parent.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    segments.join("/")
}

/// Percent-decode an href (`chapter%201.xhtml` -> `chapter 1.xhtml`).
pub fn decode(href: &str) -> Cow<'_, str> {
    percent_decode_str(href).decode_utf8_lossy()
}

/// Join an href onto a base directory and normalize the result.
pub fn join(base_dir: &str, href: &str) -> String {
    let href = decode(strip_fragment(href));
    if base_dir.is_empty() {
        normalize(&href)
    } else {
        normalize(&format!("{}/{}", base_dir, href))
    }
}

/// Resolve `href` as written inside the document at `doc_href`.
///
/// Both are relative to the same root (the package base directory), and so
/// is the result. External links return `None`.
pub fn resolve_relative(doc_href: &str, href: &str) -> Option<String> {
    if is_external(href) {
        return None;
    }
    let (path, _) = split_fragment(href);
    if path.is_empty() {
        return Some(normalize(&decode(strip_fragment(doc_href))));
    }
    if let Some(absolute) = path.strip_prefix('/') {
        return Some(normalize(&decode(absolute)));
    }
    Some(join(parent_dir(&decode(doc_href)), path))
}

/// Links with a scheme (`https:`, `mailto:`) point outside the container.
fn is_external(href: &str) -> bool {
    let scheme = match href.find(':') {
        Some(i) => &href[..i],
        None => return false,
    };
    !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fragment() {
        assert_eq!(split_fragment("ch1.xhtml#s2"), ("ch1.xhtml", Some("s2")));
        assert_eq!(split_fragment("ch1.xhtml"), ("ch1.xhtml", None));
        assert_eq!(split_fragment("#top"), ("", Some("top")));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(parent_dir("a/b/c.xhtml"), "a/b");
        assert_eq!(parent_dir("content.opf"), "");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("text/../images/a.png"), "images/a.png");
        assert_eq!(normalize("./text//ch1.xhtml"), "text/ch1.xhtml");
        assert_eq!(normalize("../ch1.xhtml"), "ch1.xhtml");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("OEBPS", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(join("", "ch1.xhtml#frag"), "ch1.xhtml");
        assert_eq!(join("OEBPS", "chapter%201.xhtml"), "OEBPS/chapter 1.xhtml");
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("text/nav.xhtml", "ch1.xhtml#s1"),
            Some("text/ch1.xhtml".to_string())
        );
        assert_eq!(
            resolve_relative("nav/toc.xhtml", "../text/ch1.xhtml"),
            Some("text/ch1.xhtml".to_string())
        );
        assert_eq!(
            resolve_relative("toc.ncx", "ch%202.xhtml"),
            Some("ch 2.xhtml".to_string())
        );
        assert_eq!(
            resolve_relative("text/ch1.xhtml", "#note"),
            Some("text/ch1.xhtml".to_string())
        );
        assert_eq!(resolve_relative("nav.xhtml", "https://example.com/"), None);
        assert_eq!(resolve_relative("nav.xhtml", "mailto:me@example.com"), None);
    }
}
