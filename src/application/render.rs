//! Page rendering for the demo site.
//!
//! Every rendered segment reports its tags to the request's collector, which
//! is what the page cache later stores the response under.

use std::sync::Arc;

use askama::Template;
use tracing::instrument;

use crate::cache::{FragmentCache, SegmentCollector, content_tag, sanitize_tags, type_tag};
use crate::domain::error::DomainError;
use crate::presentation::views::{GreetingTemplate, NavLink, NavTemplate, PageTemplate};

use super::content::ContentRepository;
use super::error::AppError;

const NAV_FRAGMENT: &str = "nav";
const NAV_LIFETIME_SECS: u64 = 300;

#[derive(Clone)]
pub struct PageRenderer {
    repo: Arc<ContentRepository>,
    fragments: FragmentCache,
}

impl PageRenderer {
    pub fn new(repo: Arc<ContentRepository>, fragments: FragmentCache) -> Self {
        Self { repo, fragments }
    }

    #[instrument(skip(self, collector, greeting))]
    pub async fn render(
        &self,
        identifier: &str,
        collector: &SegmentCollector,
        greeting: Option<&str>,
    ) -> Result<String, AppError> {
        let node = self
            .repo
            .get(identifier)
            .await
            .ok_or_else(|| DomainError::not_found(identifier))?;

        let mut tags = vec![content_tag(&node.identifier), type_tag(&node.type_name)];
        if let Some(parent) = &node.parent {
            tags.push(content_tag(parent));
        }
        collector.segment_cached(sanitize_tags(tags), None);

        let nav = self.render_nav(collector).await?;
        let greeting = match greeting {
            Some(name) => {
                FragmentCache::uncached(collector, || async move {
                    GreetingTemplate { name }.render().map_err(AppError::from)
                })
                .await?
            }
            None => String::new(),
        };

        let page = PageTemplate {
            title: &node.title,
            body: &node.body,
            parent: node.parent.as_deref(),
            nav: &nav,
            greeting: &greeting,
        };
        Ok(page.render()?)
    }

    /// The nav lists every node, so it carries every node's tags.
    async fn render_nav(&self, collector: &SegmentCollector) -> Result<String, AppError> {
        let nodes = self.repo.list().await;
        let tags: Vec<String> = nodes
            .iter()
            .flat_map(|node| [content_tag(&node.identifier), type_tag(&node.type_name)])
            .collect();

        self.fragments
            .render_cached(
                collector,
                NAV_FRAGMENT,
                tags,
                Some(NAV_LIFETIME_SECS),
                || async move {
                    let links: Vec<NavLink> = nodes
                        .into_iter()
                        .map(|node| NavLink {
                            identifier: node.identifier,
                            title: node.title,
                        })
                        .collect();
                    NavTemplate { links: &links }
                        .render()
                        .map_err(AppError::from)
                },
            )
            .await
    }
}
