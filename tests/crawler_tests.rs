//! Crawler integration tests against the in-memory fixture repository

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use futures::StreamExt;
use update_gitignore::{
    Context, CrawlOptions, Crawler, GitignoreError, MockTreeProvider, Result, Template,
    TemplateStream, TreeProvider,
};

// =============================================================================
// HELPERS
// =============================================================================

fn crawler(provider: MockTreeProvider) -> (Crawler, Arc<MockTreeProvider>) {
    let provider = Arc::new(provider);
    let dyn_provider: Arc<dyn TreeProvider> = provider.clone();
    (Crawler::new(dyn_provider), provider)
}

async fn wait_for_idle(crawler: &Crawler) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while crawler.active_tasks() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("crawl tasks still running");
}

async fn drain(stream: &mut TemplateStream) -> Vec<Result<Template>> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    })
    .await
    .expect("stream did not close")
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

#[tokio::test]
async fn test_crawl_finds_every_template() {
    let (crawler, _) = crawler(fixture());

    let templates = crawler
        .crawl(&Context::background())
        .await
        .unwrap()
        .try_collect_templates()
        .await
        .unwrap();

    assert_eq!(templates.len(), FIXTURE_TEMPLATES);
    let paths: HashSet<&str> = templates.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(paths.len(), FIXTURE_TEMPLATES, "duplicate paths");
    wait_for_idle(&crawler).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_paths_and_tags_follow_directories() {
    let (crawler, _) = crawler(fixture());

    let templates = crawler
        .crawl_tree(&Context::background(), ROOT_SHA)
        .try_collect_templates()
        .await
        .unwrap();

    for template in &templates {
        assert!(template.path.ends_with(".gitignore"), "{}", template.path);
        let mut segments: Vec<&str> = template.path.split('/').collect();
        let file = segments.pop().unwrap();
        assert_eq!(format!("{}.gitignore", template.name), file);
        segments.reverse();
        assert_eq!(template.tags, segments, "{}", template.path);
    }

    let emb = templates
        .iter()
        .find(|t| t.name == "Emb003")
        .expect("nested template");
    assert_eq!(emb.path, "community/embedded/Emb003.gitignore");
    assert_eq!(emb.tags, vec!["embedded", "community"]);
    assert_eq!(emb.sha, "emb-003");

    let top = templates.iter().filter(|t| t.tags.is_empty()).count();
    assert_eq!(top, 130);
}

#[tokio::test]
async fn test_crawl_resolves_default_branch() {
    let (crawler, _) = crawler(
        fixture()
            .with_default_branch("trunk")
            .with_head("trunk", Some(EMBEDDED_SHA)),
    );

    let templates = crawler
        .crawl(&Context::background())
        .await
        .unwrap()
        .try_collect_templates()
        .await
        .unwrap();
    assert_eq!(templates.len(), 5);
}

#[tokio::test]
async fn test_crawl_without_head_commit() {
    let (crawler, provider) = crawler(fixture().with_head("main", None));

    let err = crawler.crawl(&Context::background()).await.err().unwrap();
    assert!(matches!(err, GitignoreError::MissingCommit { ref branch } if branch == "main"));
    assert_eq!(provider.tree_calls(), 0);
}

#[tokio::test]
async fn test_crawl_with_canceled_context() {
    let (crawler, provider) = crawler(fixture());
    let ctx = Context::background();
    ctx.cancel();

    let err = crawler.crawl(&ctx).await.err().unwrap();
    assert!(err.is_canceled());
    assert_eq!(provider.tree_calls(), 0);
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn test_fetch_error_fails_the_crawl() {
    let (crawler, _) = crawler(fixture().failing_tree(JAVASCRIPT_SHA));

    let err = crawler
        .crawl_tree(&Context::background(), ROOT_SHA)
        .try_collect_templates()
        .await
        .unwrap_err();

    assert!(matches!(err, GitignoreError::RemoteFetch { .. }), "{err}");
    assert!(err.to_string().contains(JAVASCRIPT_SHA));
    wait_for_idle(&crawler).await;
}

#[tokio::test]
async fn test_fetch_error_is_emitted_once() {
    let (crawler, _) = crawler(fixture().failing_tree(EMBEDDED_SHA));
    let mut stream = crawler.crawl_tree(&Context::background(), ROOT_SHA);

    let items = drain(&mut stream).await;
    let errors = items.iter().filter(|i| i.is_err()).count();
    assert_eq!(errors, 1);
    assert_eq!(items.len() - errors, FIXTURE_TEMPLATES - 5);
}

#[tokio::test]
async fn test_error_after_cancel_is_swallowed() {
    // The provider cancels the crawl and reports a connection error itself.
    let (crawler, provider) = crawler(fixture().canceling_tree(PYTHON_SHA));
    let parent = Context::background();
    let mut stream = crawler.crawl_tree(&parent, ROOT_SHA);

    let items = drain(&mut stream).await;
    assert!(items.iter().all(|i| i.is_ok()), "provider error leaked after cancel");
    assert!(stream.context().is_cancelled());
    assert!(!parent.is_cancelled());
    assert!(provider.tree_calls() >= 1);
    wait_for_idle(&crawler).await;
}

#[tokio::test]
async fn test_panic_in_provider_becomes_error() {
    let (crawler, _) = crawler(fixture().panicking_tree(EMBEDDED_SHA));

    let err = crawler
        .crawl_tree(&Context::background(), ROOT_SHA)
        .try_collect_templates()
        .await
        .unwrap_err();

    match err {
        GitignoreError::Panic(panic) => {
            assert!(panic.message().contains(EMBEDDED_SHA), "{}", panic.message());
            assert!(panic.stack().starts_with("panicked at "));
        }
        other => panic!("expected a recovered panic, got {other:?}"),
    }
    wait_for_idle(&crawler).await;
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[tokio::test]
async fn test_cancel_mid_stream_stops_emission() {
    let (crawler, _) = crawler(fixture());
    let mut stream = crawler.crawl_tree(&Context::background(), ROOT_SHA);

    for _ in 0..10 {
        stream.next().await.unwrap().unwrap();
    }
    stream.cancel();

    let rest = drain(&mut stream).await;
    assert!(
        rest.len() <= CrawlOptions::default().channel_capacity,
        "{} items after cancel",
        rest.len()
    );
    assert!(rest.iter().all(|i| i.is_ok()));
    wait_for_idle(&crawler).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_releases_blocked_producers() {
    let (crawler, _) = crawler(fixture());
    let stream = crawler.crawl_tree(&Context::background(), ROOT_SHA);

    // Nobody reads: every level ends up blocked on a full channel.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(crawler.active_tasks() > 0);

    stream.cancel();
    wait_for_idle(&crawler).await;
    drop(stream);
}

#[tokio::test]
async fn test_dropping_the_stream_cancels_the_crawl() {
    let (crawler, _) = crawler(fixture().with_delay(Duration::from_millis(5)));
    let parent = Context::background();
    let mut stream = crawler.crawl_tree(&parent, ROOT_SHA);
    stream.next().await.unwrap().unwrap();

    let ctx = stream.context().clone();
    drop(stream);

    assert!(ctx.is_cancelled());
    assert!(!parent.is_cancelled());
    wait_for_idle(&crawler).await;
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fetch_concurrency_is_capped() {
    let provider = Arc::new(fixture().with_delay(Duration::from_millis(10)));
    let dyn_provider: Arc<dyn TreeProvider> = provider.clone();
    let crawler = Crawler::new(dyn_provider).with_options(CrawlOptions {
        max_concurrent_fetches: Some(2),
        ..Default::default()
    });

    let templates = crawler
        .crawl_tree(&Context::background(), ROOT_SHA)
        .try_collect_templates()
        .await
        .unwrap();

    assert_eq!(templates.len(), FIXTURE_TEMPLATES);
    assert!(provider.max_in_flight() <= 2, "{}", provider.max_in_flight());
    assert_eq!(provider.tree_calls(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_channels_still_complete() {
    let provider: Arc<dyn TreeProvider> = Arc::new(fixture());
    let crawler = Crawler::new(provider).with_options(CrawlOptions {
        channel_capacity: 1,
        ..Default::default()
    });

    let templates = crawler
        .crawl_tree(&Context::background(), ROOT_SHA)
        .try_collect_templates()
        .await
        .unwrap();
    assert_eq!(templates.len(), FIXTURE_TEMPLATES);
}
