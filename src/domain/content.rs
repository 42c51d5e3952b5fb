//! Content nodes served by the demo site.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// One addressable document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub identifier: String,
    pub type_name: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub parent: Option<String>,
}

impl ContentNode {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !is_valid_identifier(&self.identifier) {
            return Err(DomainError::validation(format!(
                "identifier `{}` must be non-empty and use only [A-Za-z0-9_-]",
                self.identifier
            )));
        }
        if self.type_name.trim().is_empty() {
            return Err(DomainError::validation("type_name must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if self.parent.as_deref() == Some(self.identifier.as_str()) {
            return Err(DomainError::validation("a node cannot be its own parent"));
        }
        Ok(())
    }
}

fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
