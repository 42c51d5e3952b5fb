//! In-memory content repository and the write path that feeds invalidation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::cache::{ChangeKind, InvalidationTrigger};
use crate::domain::{content::ContentNode, error::DomainError};

use super::error::AppError;

#[derive(Debug, Default)]
pub struct ContentRepository {
    nodes: RwLock<BTreeMap<String, ContentNode>>,
}

impl ContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository holding a small demo site.
    pub fn seeded() -> Self {
        let nodes = [
            ("home", "Acme.Site:HomePage", "Welcome", "The front page.", None),
            ("about", "Acme.Site:Page", "About us", "Who we are.", Some("home")),
            ("news", "Acme.Site:Article", "Latest news", "Fresh off the press.", Some("home")),
        ]
        .into_iter()
        .map(|(identifier, type_name, title, body, parent)| {
            let node = ContentNode {
                identifier: identifier.to_string(),
                type_name: type_name.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                parent: parent.map(str::to_string),
            };
            (node.identifier.clone(), node)
        })
        .collect();

        Self {
            nodes: RwLock::new(nodes),
        }
    }

    pub async fn get(&self, identifier: &str) -> Option<ContentNode> {
        self.nodes.read().await.get(identifier).cloned()
    }

    pub async fn list(&self) -> Vec<ContentNode> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Insert or replace; returns the previous node.
    pub async fn upsert(&self, node: ContentNode) -> Option<ContentNode> {
        self.nodes
            .write()
            .await
            .insert(node.identifier.clone(), node)
    }

    pub async fn remove(&self, identifier: &str) -> Option<ContentNode> {
        self.nodes.write().await.remove(identifier)
    }
}

/// Content writes; every successful write reports a change to the trigger.
pub struct ContentService {
    repo: Arc<ContentRepository>,
    trigger: Arc<InvalidationTrigger>,
}

impl ContentService {
    pub fn new(repo: Arc<ContentRepository>, trigger: Arc<InvalidationTrigger>) -> Self {
        Self { repo, trigger }
    }

    pub fn repository(&self) -> &Arc<ContentRepository> {
        &self.repo
    }

    pub async fn upsert(&self, node: ContentNode) -> Result<ChangeKind, AppError> {
        node.validate()?;
        if let Some(parent) = node.parent.as_deref()
            && self.repo.get(parent).await.is_none()
        {
            return Err(DomainError::validation(format!("parent `{parent}` does not exist")).into());
        }

        let identifier = node.identifier.clone();
        let type_name = node.type_name.clone();
        let parent = node.parent.clone();
        let previous = self.repo.upsert(node).await;
        let kind = if previous.is_some() {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };

        // Pages listing the old type must go too.
        if let Some(previous) = previous
            && previous.type_name != type_name
        {
            self.trigger
                .content_changed(&identifier, &previous.type_name, kind)
                .await;
        }
        self.trigger
            .content_changed(&identifier, &type_name, kind)
            .await;
        if kind == ChangeKind::Created {
            self.parent_changed(parent.as_deref()).await;
        }

        info!(identifier, type_name, %kind, "Content saved");
        Ok(kind)
    }

    pub async fn remove(&self, identifier: &str) -> Result<ContentNode, AppError> {
        let removed = self
            .repo
            .remove(identifier)
            .await
            .ok_or_else(|| DomainError::not_found(identifier))?;

        self.trigger
            .content_changed(&removed.identifier, &removed.type_name, ChangeKind::Removed)
            .await;
        self.parent_changed(removed.parent.as_deref()).await;

        info!(identifier, "Content removed");
        Ok(removed)
    }

    /// Adding or removing a child changes what the parent lists.
    async fn parent_changed(&self, parent: Option<&str>) {
        let Some(parent) = parent else {
            return;
        };
        if let Some(node) = self.repo.get(parent).await {
            self.trigger
                .content_changed(&node.identifier, &node.type_name, ChangeKind::Updated)
                .await;
        }
    }

    /// Close the current unit of work.
    pub async fn commit(&self) -> usize {
        self.trigger.commit().await
    }
}
