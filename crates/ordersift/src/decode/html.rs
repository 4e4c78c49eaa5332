//! HTML-to-text conversion for model input.
//!
//! Keeps the tabular structure of price tables: row and paragraph boundaries
//! become newlines, cell boundaries become tabs.

use std::sync::LazyLock;

use regex::Regex;

static STRIP_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(style|script|head)\b[^>]*>.*?</(style|script|head)>").unwrap()
});
static ROW_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(tr|p|div|h[1-6]|li)>|<br\s*/?>").unwrap());
static CELL_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</(td|th)>").unwrap());
static ALL_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strips markup from an HTML document, preserving line and cell structure.
pub fn html_to_text(html: &str) -> String {
    let text = STRIP_BLOCKS.replace_all(html, " ");
    let text = ROW_BREAKS.replace_all(&text, "\n");
    let text = CELL_BREAKS.replace_all(&text, "\t");
    let text = ALL_TAGS.replace_all(&text, " ");
    let text = decode_entities(&text);
    collapse_whitespace(&text)
}

/// Decodes the handful of entities that actually show up in retail email.
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#8217;", "'")
        .replace("&mdash;", "-")
        .replace("&ndash;", "-")
        .replace("&copy;", "(c)")
        .replace("&reg;", "")
        .replace("&trade;", "")
}

/// Collapses horizontal whitespace runs and excessive blank lines, trimming
/// each line.
fn collapse_whitespace(text: &str) -> String {
    let text = SPACE_RUNS.replace_all(text, " ");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_RUNS.replace_all(&joined, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_style_and_script() {
        let html = "<html><head><title>x</title></head><style>.a{color:red}</style>\
                    <script>alert(1)</script><body>Order confirmed</body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Order confirmed");
        assert!(!text.contains("color"));
        assert!(!text.contains("alert"));
    }

    #[test]
    fn test_table_structure_preserved() {
        let html = "<table><tr><td>Widget Pro</td><td>2</td><td>$19.99</td></tr>\
                    <tr><td>Gasket Kit</td><td>1</td><td>$4.50</td></tr></table>";
        let text = html_to_text(html);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Widget Pro"));
        assert!(lines[0].contains("$19.99"));
        assert!(lines[1].starts_with("Gasket Kit"));
    }

    #[test]
    fn test_entity_decoding() {
        assert_eq!(
            html_to_text("<p>Nuts &amp; Bolts &#39;M6&#39; &lt;steel&gt;</p>"),
            "Nuts & Bolts 'M6' <steel>"
        );
    }

    #[test]
    fn test_br_becomes_newline() {
        let text = html_to_text("line one<br>line two<br/>line three");
        assert_eq!(text, "line one\nline two\nline three");
    }

    #[test]
    fn test_whitespace_collapsed() {
        let text = html_to_text("<p>a</p>\n\n\n\n<p>b</p>    <p>c     d</p>");
        assert!(!text.contains("\n\n\n"));
        assert!(text.contains("c d"));
    }
}
