// tests/query_pagination.rs
//
// Query service: paging math, topic defaulting and the hint side effect.

mod common;

use std::sync::Arc;

use common::{cache_over, policy, StubSource};
use news_digest::hints::PriorityHints;
use news_digest::model::{ItemStatus, DEFAULT_TOPIC};
use news_digest::query::QueryService;

async fn service(src: Arc<StubSource>, page_size: usize) -> (QueryService, news_digest::store::ItemStore) {
    let (cache, store) = cache_over(src, policy(900, 30)).await;
    let hints = Arc::new(PriorityHints::new());
    (QueryService::new(cache, hints, page_size), store)
}

fn keys(items: &[news_digest::model::Item]) -> Vec<String> {
    items.iter().map(|it| it.key.clone()).collect()
}

#[tokio::test]
async fn pages_slice_newest_first_with_has_more() {
    let (svc, _) = service(StubSource::numbered("p", 14), 6).await;

    let p1 = svc.get_page(Some("Tech"), 1).await.unwrap();
    assert_eq!(
        keys(&p1.items),
        vec!["p-13", "p-12", "p-11", "p-10", "p-9", "p-8"]
    );
    assert!(p1.has_more);

    let p2 = svc.get_page(Some("Tech"), 2).await.unwrap();
    assert_eq!(p2.items.len(), 6);
    assert!(p2.has_more);

    let p3 = svc.get_page(Some("Tech"), 3).await.unwrap();
    assert_eq!(keys(&p3.items), vec!["p-1", "p-0"]);
    assert!(!p3.has_more);

    let p4 = svc.get_page(Some("Tech"), 4).await.unwrap();
    assert!(p4.items.is_empty());
    assert!(!p4.has_more);
}

#[tokio::test]
async fn exact_multiple_has_no_more() {
    let (svc, _) = service(StubSource::numbered("e", 12), 6).await;
    let p2 = svc.get_page(Some("Tech"), 2).await.unwrap();
    assert_eq!(p2.items.len(), 6);
    assert!(!p2.has_more);
}

#[tokio::test]
async fn page_one_then_two_queues_union_in_order() {
    let (svc, _) = service(StubSource::numbered("h", 10), 3).await;

    svc.get_page(Some("Tech"), 1).await.unwrap();
    svc.get_page(Some("Tech"), 2).await.unwrap();
    // Re-reading page 2 adds nothing new.
    svc.get_page(Some("Tech"), 2).await.unwrap();

    assert_eq!(
        svc.hints().snapshot(),
        vec!["h-9", "h-8", "h-7", "h-6", "h-5", "h-4"]
    );
}

#[tokio::test]
async fn new_first_page_resets_hints() {
    let (svc, _) = service(StubSource::numbered("r", 10), 3).await;

    svc.get_page(Some("Tech"), 1).await.unwrap();
    svc.get_page(Some("Tech"), 2).await.unwrap();
    svc.get_page(Some("Tech"), 1).await.unwrap();

    assert_eq!(svc.hints().snapshot(), vec!["r-9", "r-8", "r-7"]);
}

#[tokio::test]
async fn only_pending_items_are_hinted() {
    let (svc, store) = service(StubSource::numbered("s", 3), 6).await;

    // Populate, then finish one item out of band.
    svc.get_page(Some("Tech"), 1).await.unwrap();
    store
        .set_status("s-1", Some(ItemStatus::Pending), ItemStatus::InProgress, None)
        .await
        .unwrap();
    store
        .set_status("s-1", Some(ItemStatus::InProgress), ItemStatus::Done, Some("sum"))
        .await
        .unwrap();

    let page = svc.get_page(Some("Tech"), 1).await.unwrap();
    assert_eq!(page.items.len(), 3);
    assert_eq!(svc.hints().snapshot(), vec!["s-2", "s-0"]);
}

#[tokio::test]
async fn blank_topic_and_bad_page_are_defaulted() {
    let src = StubSource::numbered("d", 2);
    let (svc, _) = service(Arc::clone(&src), 6).await;

    let page = svc.get_page(Some("   "), 0).await.unwrap();
    assert_eq!(page.topic, DEFAULT_TOPIC);
    assert_eq!(page.page, 1);
    assert_eq!(page.items.len(), 2);

    let again = svc.get_page(None, -7).await.unwrap();
    assert_eq!(again.topic, DEFAULT_TOPIC);
    assert_eq!(again.page, 1);

    assert_eq!(src.topics(), vec![DEFAULT_TOPIC]);
}

#[tokio::test]
async fn topic_is_trimmed() {
    let src = StubSource::numbered("t", 1);
    let (svc, _) = service(Arc::clone(&src), 6).await;

    let page = svc.get_page(Some("  Cricket "), 1).await.unwrap();
    assert_eq!(page.topic, "Cricket");
    assert_eq!(src.topics(), vec!["Cricket"]);
}

#[tokio::test]
async fn ingestion_failure_surfaces_and_leaves_hints_alone() {
    let src = StubSource::numbered("f", 3);
    src.set_failing(true);
    let (svc, _) = service(Arc::clone(&src), 6).await;
    svc.hints().append(["keep-me"]);

    let err = svc.get_page(Some("Tech"), 1).await.unwrap_err();
    assert!(err.is_ingestion());
    assert_eq!(svc.hints().snapshot(), vec!["keep-me"]);
}
