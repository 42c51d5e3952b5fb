//! Cache tag helpers.
//!
//! Storage backends only accept a restricted tag alphabet, so every tag passes
//! through [`sanitize_tag`] before it is written alongside an entry and again
//! before it is used in a flush. Both sides must agree or flushes silently miss.

use std::collections::BTreeSet;

const TYPE_TAG_PREFIX: &str = "Type_";

/// Replace characters the backend cannot index.
///
/// `.` becomes `_` and `:` becomes `-`; everything else is kept as-is.
/// Distinct raw tags may collide after sanitizing, e.g. `a.b` and `a_b`.
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| match c {
            '.' => '_',
            ':' => '-',
            other => other,
        })
        .collect()
}

/// Sanitize and deduplicate a batch of tags.
pub fn sanitize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| sanitize_tag(tag.as_ref()))
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Tag naming a single content unit.
pub fn content_tag(identifier: &str) -> String {
    identifier.to_string()
}

/// Tag naming every content unit of one type.
pub fn type_tag(type_name: &str) -> String {
    format!("{TYPE_TAG_PREFIX}{type_name}")
}
