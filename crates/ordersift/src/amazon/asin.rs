//! ASIN mining from Amazon confirmation emails.

use std::sync::LazyLock;

use regex::Regex;

/// ASIN embedded in a product URL path.
static URL_ASIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:/dp/|/gp/product/|/gp/aw/d/)(?P<asin>[A-Z0-9]{10})(?:[/?#]|\b)").unwrap()
});

/// Bare ASIN in text. Amazon's modern ASINs start with B0, which keeps
/// this from matching arbitrary upper-case tokens.
static BARE_ASIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<asin>B0[A-Z0-9]{8})\b").unwrap());

static QTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:qty|quantity)\s*:?\s*(?P<qty>\d{1,4})\b").unwrap());

/// Collects unique ASINs from an email's text and HTML, URL-embedded ones
/// first, in first-seen order.
pub fn mine_asins(text: &str, html: &str) -> Vec<String> {
    let mut asins: Vec<String> = Vec::new();

    for source in [html, text] {
        for caps in URL_ASIN.captures_iter(source) {
            push_unique(&mut asins, &caps["asin"]);
        }
    }
    for source in [text, html] {
        for caps in BARE_ASIN.captures_iter(source) {
            push_unique(&mut asins, &caps["asin"]);
        }
    }

    asins
}

/// Pairs quantities with ASINs positionally. Quantity markers only line up
/// with products when the email lists exactly one marker per product;
/// anything else defaults every ASIN to quantity 1.
pub fn asin_quantities(asins: &[String], text: &str) -> Vec<(String, u32)> {
    let quantities: Vec<u32> = QTY
        .captures_iter(text)
        .filter_map(|caps| caps["qty"].parse().ok())
        .collect();

    if quantities.len() == asins.len() {
        asins
            .iter()
            .cloned()
            .zip(quantities.into_iter().map(|q| q.max(1)))
            .collect()
    } else {
        asins.iter().map(|a| (a.clone(), 1)).collect()
    }
}

fn push_unique(asins: &mut Vec<String>, asin: &str) {
    if !asins.iter().any(|a| a == asin) {
        asins.push(asin.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mine_asins_from_url_shapes() {
        let html = r#"
            <a href="https://www.amazon.com/dp/B0ABCDEFGH?ref=order">item one</a>
            <a href="https://www.amazon.com/gp/product/B0IJKLMNOP/ref=xyz">item two</a>
            <a href="https://www.amazon.com/gp/aw/d/B0QRSTUVWX">item three</a>
        "#;
        let asins = mine_asins("", html);
        assert_eq!(asins, vec!["B0ABCDEFGH", "B0IJKLMNOP", "B0QRSTUVWX"]);
    }

    #[test]
    fn test_mine_asins_bare_and_dedup() {
        let text = "Your item B0ABCDEFGH has shipped. Tracking for B0ABCDEFGH included.";
        let html = r#"<a href="/dp/B0ABCDEFGH">view</a>"#;
        let asins = mine_asins(text, html);
        assert_eq!(asins, vec!["B0ABCDEFGH"]);
    }

    #[test]
    fn test_mine_asins_ignores_short_tokens() {
        let asins = mine_asins("ORDER12345 CONFIRMED", "");
        assert!(asins.is_empty());
    }

    #[test]
    fn test_quantities_positional_when_counts_match() {
        let asins = vec!["B0ABCDEFGH".to_string(), "B0IJKLMNOP".to_string()];
        let text = "Item one Qty: 3\nItem two Quantity: 2";
        let paired = asin_quantities(&asins, text);
        assert_eq!(paired, vec![
            ("B0ABCDEFGH".to_string(), 3),
            ("B0IJKLMNOP".to_string(), 2),
        ]);
    }

    #[test]
    fn test_quantities_default_to_one_on_mismatch() {
        let asins = vec!["B0ABCDEFGH".to_string(), "B0IJKLMNOP".to_string()];
        let text = "Qty: 5";
        let paired = asin_quantities(&asins, text);
        assert!(paired.iter().all(|(_, q)| *q == 1));
    }
}
