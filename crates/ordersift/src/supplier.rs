//! Known supplier table.
//!
//! Powers both the heuristic classifier (supplier + dollar amount is an
//! order signal) and the mailbox query builder.

use chrono::{Duration, Utc};

/// A recognized supplier: display name plus sender domains.
#[derive(Debug, Clone)]
pub struct Supplier {
    pub name: &'static str,
    pub domains: &'static [&'static str],
}

pub const KNOWN_SUPPLIERS: &[Supplier] = &[
    Supplier {
        name: "Amazon",
        domains: &["amazon.com", "amazon.ca", "amazon.co.uk"],
    },
    Supplier {
        name: "Grainger",
        domains: &["grainger.com"],
    },
    Supplier {
        name: "McMaster-Carr",
        domains: &["mcmaster.com"],
    },
    Supplier {
        name: "Uline",
        domains: &["uline.com"],
    },
    Supplier {
        name: "Fastenal",
        domains: &["fastenal.com"],
    },
    Supplier {
        name: "Home Depot",
        domains: &["homedepot.com"],
    },
    Supplier {
        name: "Digi-Key",
        domains: &["digikey.com"],
    },
    Supplier {
        name: "Mouser",
        domains: &["mouser.com"],
    },
];

/// Resolves a sender domain to a supplier display name.
pub fn supplier_for_domain(domain: &str) -> Option<&'static str> {
    let domain = domain.to_lowercase();
    KNOWN_SUPPLIERS
        .iter()
        .find(|s| s.domains.iter().any(|d| domain.ends_with(d)))
        .map(|s| s.name)
}

/// Finds a supplier whose name appears in free text (case-insensitive).
pub fn supplier_in_text(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    KNOWN_SUPPLIERS
        .iter()
        .find(|s| lower.contains(&s.name.to_lowercase()))
        .map(|s| s.name)
}

/// Builds the mailbox search query for a supplier job: sender-domain
/// disjunction with a date lower bound.
pub fn build_query(domains: &[String], lookback_days: i64) -> String {
    let since = (Utc::now() - Duration::days(lookback_days))
        .format("%Y/%m/%d")
        .to_string();
    if domains.is_empty() {
        return format!("after:{} (order OR invoice OR receipt)", since);
    }
    let from_clause = domains
        .iter()
        .map(|d| format!("from:{}", d))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!("after:{} ({})", since, from_clause)
}

/// Query for the Amazon job type: Amazon order notifications only.
pub fn build_amazon_query(lookback_days: i64) -> String {
    let since = (Utc::now() - Duration::days(lookback_days))
        .format("%Y/%m/%d")
        .to_string();
    format!("after:{} from:amazon.com subject:(order OR shipped OR delivered)", since)
}
