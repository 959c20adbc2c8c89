mod support;

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use metrics_util::debugging::DebuggingRecorder;
use tower::ServiceExt;

use chirp::cache::{AuthorCache, CacheConfig};
use chirp::domain::entities::UserId;
use support::{ALICE_TOKEN, Directory, app};

async fn send(router: &axum::Router, request: Request<Body>) -> StatusCode {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
        .status()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn create(content: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/posts")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {ALICE_TOKEN}"))
        .body(Body::from(format!(r#"{{"content":"{content}"}}"#)))
        .expect("request should build")
}

#[tokio::test]
async fn read_and_write_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let test = app(&["alice"], 1);
    let post = test.posts.seed("alice", "seeded", 1);

    // Feed assembly: cold author lookup through one batch.
    assert_eq!(send(&test.router, get("/api/feed")).await, StatusCode::OK);
    // Single post: author now served from cache.
    assert_eq!(
        send(&test.router, get(&format!("/api/posts/{}", post.id))).await,
        StatusCode::OK
    );
    // Write path: invalidation consumed, then the ceiling is hit.
    assert_eq!(send(&test.router, create("one")).await, StatusCode::CREATED);
    assert_eq!(
        send(&test.router, create("two")).await,
        StatusCode::TOO_MANY_REQUESTS
    );
    // Profile regeneration.
    let profile = Request::builder()
        .uri("/alice")
        .header(header::AUTHORIZATION, format!("Bearer {ALICE_TOKEN}"))
        .body(Body::empty())
        .expect("request should build");
    assert_eq!(send(&test.router, profile).await, StatusCode::OK);

    // Capacity eviction on a one-entry author cache.
    let tiny = AuthorCache::new(
        Arc::new(Directory::with_users(&["x", "y"])),
        &CacheConfig {
            max_entries: 1,
            ..CacheConfig::default()
        },
    );
    tiny.resolve(&[UserId::from("user_x")]).await;
    tiny.resolve(&[UserId::from("user_y")]).await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "chirp_author_cache_hit_total",
        "chirp_author_cache_miss_total",
        "chirp_author_cache_upstream_batch_total",
        "chirp_author_cache_evict_total",
        "chirp_feed_assembly_ms",
        "chirp_cache_consume_ms",
        "chirp_post_rate_limited_total",
        "chirp_profile_snapshot_total",
        "chirp_profile_regeneration_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
