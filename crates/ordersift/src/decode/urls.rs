//! Candidate product/image URL mining and matching.

use std::sync::LazyLock;

use regex::Regex;

static RAW_URLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>\)\]]+"#).unwrap());
static HREF_ATTRS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).unwrap());
static SRC_ATTRS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)src\s*=\s*["']([^"']+)["']"#).unwrap());
static OG_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)property\s*=\s*["']og:image["'][^>]*content\s*=\s*["']([^"']+)["']"#).unwrap()
});
static IMAGE_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g|gif|webp)(\?|$)").unwrap());

/// Query parameters that only exist for tracking.
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "mc_eid", "mc_cid", "igshid", "ref", "ref_"];

/// URL substrings that mark a link as junk for product matching.
const JUNK_MARKERS: &[&str] = &[
    "unsubscribe",
    "email-preferences",
    "login",
    "signin",
    "sign-in",
    "password",
    "privacy",
    "terms",
    "facebook.com",
    "twitter.com",
    "x.com/",
    "instagram.com",
    "youtube.com",
    "doubleclick.net",
    "google-analytics.com",
    "googleadservices",
    "list-manage.com",
    "mailchi.mp",
    "sendgrid.net",
    "click.e.",
    "links.e.",
];

/// Mines candidate product URLs from raw text and anchor hrefs.
pub fn mine_product_urls(text: &str, html: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for m in RAW_URLS.find_iter(text) {
        candidates.push(m.as_str().to_string());
    }
    for cap in HREF_ATTRS.captures_iter(html) {
        candidates.push(cap[1].to_string());
    }
    clean_candidates(candidates, false)
}

/// Mines candidate image URLs from `src` attributes, `og:image` tags, and
/// image-suffixed raw URLs.
pub fn mine_image_urls(text: &str, html: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for cap in SRC_ATTRS.captures_iter(html) {
        candidates.push(cap[1].to_string());
    }
    for cap in OG_IMAGE.captures_iter(html) {
        candidates.push(cap[1].to_string());
    }
    for m in RAW_URLS.find_iter(text) {
        if IMAGE_EXT.is_match(m.as_str()) {
            candidates.push(m.as_str().to_string());
        }
    }
    clean_candidates(candidates, true)
}

fn clean_candidates(candidates: Vec<String>, images: bool) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in candidates {
        if !raw.starts_with("http") {
            continue;
        }
        let url = strip_tracking_params(raw.trim_end_matches(['.', ',', ';']));
        let lower = url.to_lowercase();
        if JUNK_MARKERS.iter().any(|junk| lower.contains(junk)) {
            continue;
        }
        // Tiny tracking pixels are never product images
        if images && (lower.contains("pixel") || lower.contains("beacon") || lower.contains("spacer"))
        {
            continue;
        }
        if seen.insert(lower) {
            out.push(url);
        }
    }
    out
}

/// Drops `utm_*` and other pure-tracking query parameters; removes the `?`
/// entirely when nothing survives.
pub fn strip_tracking_params(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|param| {
            let key = param.split('=').next().unwrap_or("").to_lowercase();
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

/// Picks the best candidate URL for an item.
///
/// Preference order: same vendor domain, then SKU substring, then a salient
/// token (≥ 4 chars) from the item name, then any non-root path, else the
/// first candidate.
pub fn pick_best_url(
    candidates: &[String],
    item_name: &str,
    sku: Option<&str>,
    vendor_domain: Option<&str>,
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }

    if let Some(domain) = vendor_domain {
        let domain = domain.to_lowercase();
        if let Some(url) = candidates
            .iter()
            .find(|u| url_domain(u).is_some_and(|d| d.ends_with(&domain)))
        {
            return Some(url.clone());
        }
    }

    if let Some(sku) = sku {
        let sku_lower = sku.to_lowercase();
        if !sku_lower.is_empty() {
            if let Some(url) = candidates
                .iter()
                .find(|u| u.to_lowercase().contains(&sku_lower))
            {
                return Some(url.clone());
            }
        }
    }

    let tokens: Vec<String> = item_name
        .split_whitespace()
        .filter(|t| t.len() >= 4)
        .map(|t| t.to_lowercase())
        .collect();
    if let Some(url) = candidates.iter().find(|u| {
        let lower = u.to_lowercase();
        tokens.iter().any(|t| lower.contains(t.as_str()))
    }) {
        return Some(url.clone());
    }

    if let Some(url) = candidates.iter().find(|u| has_non_root_path(u)) {
        return Some(url.clone());
    }

    candidates.first().cloned()
}

fn url_domain(url: &str) -> Option<String> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    Some(host.to_lowercase())
}

fn has_non_root_path(url: &str) -> bool {
    let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    else {
        return false;
    };
    match rest.split_once('/') {
        Some((_, path)) => !path.trim_matches('/').is_empty(),
        None => false,
    }
}
