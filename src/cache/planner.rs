//! Flush plan generation.
//!
//! Coalesces a batch of content changes into one set of tags to flush.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::events::ChangeEvent;
use super::tags::{content_tag, sanitize_tag, type_tag};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushPlan {
    /// Sanitized tags to flush.
    pub tags: BTreeSet<String>,
    /// Content identifiers that changed, for logging.
    pub identifiers: BTreeSet<String>,
}

impl fmt::Display for FlushPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlushPlan {{ tags: {}, identifiers: {} }}",
            self.tags.len(),
            self.identifiers.len()
        )
    }
}

impl FlushPlan {
    /// Union of the content tag and type tag of every distinct event.
    pub fn from_events(events: Vec<ChangeEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            let change = event.change;
            plan.tags.insert(sanitize_tag(&content_tag(&change.identifier)));
            plan.tags.insert(sanitize_tag(&type_tag(&change.type_name)));
            plan.identifiers.insert(change.identifier);
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tag_list(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }
}
