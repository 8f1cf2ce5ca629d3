//! Document filtering by `post_type`
//!
//! The inbound topic carries document kinds this relay does not own. Only
//! documents whose `post_type` is in the configured set are forwarded; the
//! rest are acknowledged without any delivery attempt.

use crate::config::FilterConfig;
use crate::document::Document;
use std::collections::BTreeSet;

/// Post types forwarded when no filter configuration is supplied.
pub const DEFAULT_POST_TYPES: [i64; 3] = [1, 2, 10];

/// Decides whether a document requires delivery.
#[derive(Debug, Clone)]
pub struct PostTypeFilter {
    allowed: BTreeSet<i64>,
}

impl PostTypeFilter {
    /// Create a filter from configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use insight_relay::config::FilterConfig;
    /// use insight_relay::filter::PostTypeFilter;
    ///
    /// let filter = PostTypeFilter::new(&FilterConfig { post_types: vec![1, 2, 10] });
    /// assert!(filter.allows(10));
    /// assert!(!filter.allows(5));
    /// ```
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            allowed: config.post_types.iter().copied().collect(),
        }
    }

    /// Returns true if a raw `post_type` value is in the allowed set.
    pub fn allows(&self, post_type: i64) -> bool {
        self.allowed.contains(&post_type)
    }

    /// Check if a document should be reported downstream.
    ///
    /// A missing or non-integer `post_type` is never eligible.
    pub fn should_report(&self, document: &Document) -> bool {
        document.post_type().is_some_and(|t| self.allows(t))
    }

    /// Get filter summary for logging.
    pub fn summary(&self) -> String {
        let types: Vec<String> = self.allowed.iter().map(|t| t.to_string()).collect();
        format!("post_type in {{{}}}", types.join(","))
    }
}

impl Default for PostTypeFilter {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_POST_TYPES.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn doc(fields: Value) -> Document {
        match fields {
            Value::Object(map) => Document::from_map(map),
            _ => Document::from_map(Map::new()),
        }
    }

    #[test]
    fn test_default_allows_one_two_ten() {
        let filter = PostTypeFilter::default();
        for post_type in [1, 2, 10] {
            assert!(filter.should_report(&doc(json!({ "post_type": post_type }))));
        }
    }

    #[test]
    fn test_default_rejects_other_types() {
        let filter = PostTypeFilter::default();
        for post_type in [0, 3, 5, 9, 11, -1, 100] {
            assert!(!filter.should_report(&doc(json!({ "post_type": post_type }))));
        }
    }

    #[test]
    fn test_missing_post_type_is_ineligible() {
        let filter = PostTypeFilter::default();
        assert!(!filter.should_report(&doc(json!({ "post_id": "1" }))));
        assert!(!filter.should_report(&doc(json!({ "post_type": null }))));
    }

    #[test]
    fn test_string_post_type_is_ineligible() {
        let filter = PostTypeFilter::default();
        assert!(!filter.should_report(&doc(json!({ "post_type": "1" }))));
    }

    #[test]
    fn test_boolean_post_type_is_ineligible() {
        let filter = PostTypeFilter::default();
        assert!(!filter.should_report(&doc(json!({ "post_type": true }))));
        assert!(!filter.should_report(&doc(json!({ "post_type": false }))));
    }

    #[test]
    fn test_custom_post_types() {
        let filter = PostTypeFilter::new(&FilterConfig {
            post_types: vec![5],
        });
        assert!(filter.should_report(&doc(json!({ "post_type": 5 }))));
        assert!(!filter.should_report(&doc(json!({ "post_type": 1 }))));
    }

    #[test]
    fn test_summary_is_sorted() {
        let filter = PostTypeFilter::new(&FilterConfig {
            post_types: vec![10, 2, 1],
        });
        assert_eq!(filter.summary(), "post_type in {1,2,10}");
    }
}
