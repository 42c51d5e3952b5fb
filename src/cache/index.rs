//! Bidirectional tag index.
//!
//! Tracks tag → identifiers and identifier → tags so a flush can find every
//! affected entry and an overwrite or eviction can drop stale tag references.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_keys: HashMap<String, HashSet<String>>,
    key_to_tags: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tag set of `key`.
    pub fn register<I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.unregister(key);
        let tags: HashSet<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        if tags.is_empty() {
            return;
        }
        for tag in &tags {
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.key_to_tags.insert(key.to_string(), tags);
    }

    /// Forget `key` and prune tags that no longer reference anything.
    pub fn unregister(&mut self, key: &str) {
        let Some(tags) = self.key_to_tags.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_to_keys.remove(&tag);
                }
            }
        }
    }

    /// Every key carrying at least one of `tags`.
    pub fn keys_for_tags<I>(&self, tags: I) -> HashSet<String>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut keys = HashSet::new();
        for tag in tags {
            if let Some(tagged) = self.tag_to_keys.get(tag.as_ref()) {
                keys.extend(tagged.iter().cloned());
            }
        }
        keys
    }

    #[cfg(test)]
    pub(crate) fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.key_to_tags.get(key).cloned().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }

    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }

    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.key_to_tags.len()
    }
}
