//! The incremental-delivery core: given a freshest-first snapshot of the feed
//! and a subscriber's watermark, decide exactly which items are new.

use crate::models::{JobItem, normalize_link};

#[derive(Debug)]
pub struct Reconciliation {
    /// Items to deliver, oldest first, so the delivered stream preserves
    /// publication order.
    pub to_deliver: Vec<JobItem>,
    /// Watermark to persist after the delivery attempt finishes.
    pub next_watermark: Option<String>,
}

/// Scans `items` (freshest first) for the watermark's item ("anchor") and
/// returns everything strictly newer, reversed to oldest-first.
///
/// A `None` watermark primes silently: the subscriber never gets a backlog
/// dump on first activation. A watermark missing from the snapshot is a
/// discontinuity (item fell off the feed window, or the feed was reset); we
/// re-prime rather than guess, trading recall for precision.
pub fn reconcile(items: &[JobItem], watermark: Option<&str>) -> Reconciliation {
    let Some(first) = items.first() else {
        // Nothing learned; leave the watermark untouched.
        return Reconciliation {
            to_deliver: Vec::new(),
            next_watermark: watermark.map(str::to_string),
        };
    };
    let latest = first.normalized_link();

    let Some(watermark) = watermark else {
        return Reconciliation { to_deliver: Vec::new(), next_watermark: Some(latest) };
    };
    // Stored links may predate normalization.
    let watermark = normalize_link(watermark);

    // First occurrence defines the anchor even if links repeat in the snapshot.
    match items.iter().position(|item| item.normalized_link() == watermark) {
        Some(0) => Reconciliation { to_deliver: Vec::new(), next_watermark: Some(watermark) },
        Some(anchor) => {
            let mut to_deliver: Vec<JobItem> = items[..anchor].to_vec();
            to_deliver.reverse();
            Reconciliation { to_deliver, next_watermark: Some(latest) }
        }
        None => Reconciliation { to_deliver: Vec::new(), next_watermark: Some(latest) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(link: &str) -> JobItem {
        JobItem {
            id: link.to_string(),
            title: link.to_string(),
            link: link.to_string(),
            category: "N/A".into(),
            summary: String::new(),
            published_at: None,
        }
    }

    fn feed(links: &[&str]) -> Vec<JobItem> {
        links.iter().map(|l| item(l)).collect()
    }

    #[test]
    fn empty_snapshot_changes_nothing() {
        let out = reconcile(&[], Some("https://e.com/jobs/123"));
        assert!(out.to_deliver.is_empty());
        assert_eq!(out.next_watermark.as_deref(), Some("https://e.com/jobs/123"));

        let out = reconcile(&[], None);
        assert!(out.to_deliver.is_empty());
        assert!(out.next_watermark.is_none());
    }

    #[test]
    fn first_observation_primes_without_backlog() {
        let items = feed(&["https://e.com/jobs/200/", "https://e.com/jobs/150"]);
        let out = reconcile(&items, None);
        assert!(out.to_deliver.is_empty());
        assert_eq!(out.next_watermark.as_deref(), Some("https://e.com/jobs/200"));
    }

    #[test]
    fn anchor_at_head_means_nothing_new() {
        let items = feed(&["https://e.com/jobs/200", "https://e.com/jobs/150"]);
        let out = reconcile(&items, Some("https://e.com/jobs/200/"));
        assert!(out.to_deliver.is_empty());
        assert_eq!(out.next_watermark.as_deref(), Some("https://e.com/jobs/200"));
    }

    #[test]
    fn newer_items_are_delivered_oldest_first() {
        // Watermark at /123; feed shows 200, 150, 123, 100 freshest-first.
        let items = feed(&[
            "https://e.com/jobs/200",
            "https://e.com/jobs/150",
            "https://e.com/jobs/123",
            "https://e.com/jobs/100",
        ]);
        let out = reconcile(&items, Some("https://e.com/jobs/123"));
        let links: Vec<_> = out.to_deliver.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["https://e.com/jobs/150", "https://e.com/jobs/200"]);
        assert_eq!(out.next_watermark.as_deref(), Some("https://e.com/jobs/200"));
    }

    #[test]
    fn missing_anchor_reprimes_without_deliveries() {
        let items = feed(&["https://e.com/jobs/900", "https://e.com/jobs/800"]);
        let out = reconcile(&items, Some("https://e.com/jobs/1"));
        assert!(out.to_deliver.is_empty());
        assert_eq!(out.next_watermark.as_deref(), Some("https://e.com/jobs/900"));
    }

    #[test]
    fn reconcile_is_idempotent_against_its_own_output() {
        let items = feed(&[
            "https://e.com/jobs/200",
            "https://e.com/jobs/150",
            "https://e.com/jobs/123",
        ]);
        let first = reconcile(&items, Some("https://e.com/jobs/123"));
        assert_eq!(first.to_deliver.len(), 2);
        let second = reconcile(&items, first.next_watermark.as_deref());
        assert!(second.to_deliver.is_empty());
        assert_eq!(second.next_watermark, first.next_watermark);
    }

    #[test]
    fn duplicate_links_anchor_on_first_occurrence() {
        let items = feed(&[
            "https://e.com/jobs/200",
            "https://e.com/jobs/123",
            "https://e.com/jobs/123/",
            "https://e.com/jobs/100",
        ]);
        let out = reconcile(&items, Some("https://e.com/jobs/123"));
        let links: Vec<_> = out.to_deliver.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["https://e.com/jobs/200"]);
    }

    #[test]
    fn watermark_comparison_tolerates_raw_stored_links() {
        let items = feed(&["https://e.com/jobs/200", "https://e.com/jobs/123"]);
        let out = reconcile(&items, Some("  https://e.com/jobs/123/ "));
        assert_eq!(out.to_deliver.len(), 1);
        assert_eq!(out.next_watermark.as_deref(), Some("https://e.com/jobs/200"));
    }
}
