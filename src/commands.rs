//! `list` and `dump` on top of the crawler
//!
//! Both commands crawl the whole tree first and only act on a complete
//! listing; a crawl error aborts the command.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::context::Context;
use crate::crawler::Crawler;
use crate::error::{GitignoreError, Result};
use crate::provider::TreeProvider;
use crate::template::Template;

/// Every template matching any of `filters` (all when empty), sorted by name then path
#[instrument(skip(ctx, crawler))]
pub async fn list(ctx: &Context, crawler: &Crawler, filters: &[String]) -> Result<Vec<Template>> {
    let mut templates = crawler.crawl(ctx).await?.try_collect_templates().await?;
    debug!(total = templates.len(), "crawl finished");

    if !filters.is_empty() {
        templates.retain(|t| filters.iter().any(|f| t.matches(f)));
    }
    templates.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(templates)
}

/// Resolve `names` and fetch their content, in the order given
///
/// When several templates share a name, the one closest to the repository
/// root wins.
#[instrument(skip(ctx, crawler, provider))]
pub async fn dump(
    ctx: &Context,
    crawler: &Crawler,
    provider: &Arc<dyn TreeProvider>,
    names: &[String],
) -> Result<Vec<(Template, String)>> {
    if names.is_empty() {
        return Err(GitignoreError::invalid_argument("no template names given"));
    }

    let templates = crawler.crawl(ctx).await?.try_collect_templates().await?;
    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        let template = templates
            .iter()
            .filter(|t| t.is_named(name))
            .min_by(|a, b| a.tags.len().cmp(&b.tags.len()).then_with(|| a.path.cmp(&b.path)))
            .ok_or_else(|| GitignoreError::TemplateNotFound { name: name.clone() })?;
        selected.push(template.clone());
    }

    let mut dumped = Vec::with_capacity(selected.len());
    for template in selected {
        let content = ctx.run(provider.blob(ctx, &template.sha)).await??;
        debug!(path = %template.path, bytes = content.len(), "fetched template");
        dumped.push((template, content));
    }
    Ok(dumped)
}
