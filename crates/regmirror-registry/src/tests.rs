use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regmirror_core::{CancelToken, MirrorError};
use semver::Version;
use serde_json::json;

use super::*;

const REGISTRY: &str = "https://registry.test";

fn cache_over(transport: &Arc<MemoryTransport>) -> Arc<FetchCache> {
    Arc::new(FetchCache::new(transport.clone()))
}

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        backoff: Duration::from_millis(1),
    }
}

#[test]
fn concurrent_gets_for_one_url_share_a_single_request() {
    let transport = Arc::new(MemoryTransport::with_latency(Duration::from_millis(50)));
    transport.insert_bytes("https://registry.test/lodash", "{}");
    let cache = cache_over(&transport);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("https://registry.test/lodash"))
        })
        .collect();
    for handle in handles {
        let body = handle
            .join()
            .expect("fetch thread must not panic")
            .expect("fetch must succeed");
        assert_eq!(&*body, b"{}");
    }

    assert_eq!(transport.requests("https://registry.test/lodash"), 1);
    assert_eq!(cache.requests_issued(), 1);
    assert_eq!(cache.cached_urls(), 1);
}

#[test]
fn successful_results_are_served_from_cache() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_bytes("https://registry.test/a", "first");
    let cache = cache_over(&transport);

    cache.get("https://registry.test/a").expect("must fetch");
    transport.insert_bytes("https://registry.test/a", "second");
    let body = cache.get("https://registry.test/a").expect("must hit cache");

    assert_eq!(&*body, b"first");
    assert_eq!(transport.requests("https://registry.test/a"), 1);
}

#[test]
fn failures_are_not_cached() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_status("https://registry.test/gone", 500);
    let cache = cache_over(&transport);

    let err = cache
        .get("https://registry.test/gone")
        .expect_err("must surface status");
    assert_eq!(err.status, Some(500));
    assert_eq!(err.url, "https://registry.test/gone");

    transport.insert_bytes("https://registry.test/gone", "back");
    let body = cache
        .get("https://registry.test/gone")
        .expect("second attempt must issue a fresh request");
    assert_eq!(&*body, b"back");
    assert_eq!(transport.requests("https://registry.test/gone"), 2);
}

#[test]
fn unknown_url_is_a_404() {
    let transport = Arc::new(MemoryTransport::new());
    let cache = cache_over(&transport);

    let err = cache
        .get("https://registry.test/missing")
        .expect_err("must be not found");
    assert_eq!(err.status, Some(404));
    assert!(!err.is_transient());
}

#[test]
fn download_to_file_streams_and_leaves_no_part_file() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create root");
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_bytes("https://registry.test/a/-/a-1.0.0.tgz", vec![1_u8, 2, 3, 4]);
    let cache = cache_over(&transport);

    let dest = root.join("a-1.0.0.tgz");
    let written = cache
        .download_to_file("https://registry.test/a/-/a-1.0.0.tgz", &dest)
        .expect("must download");

    assert_eq!(written, 4);
    assert_eq!(fs::read(&dest).expect("must read tarball"), vec![1, 2, 3, 4]);
    assert!(!root.join("a-1.0.0.tgz.part").exists());
    assert_eq!(cache.cached_urls(), 0);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_download_removes_partial_file() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create root");
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_transport_error("https://registry.test/b.tgz", "connection reset");
    let cache = cache_over(&transport);

    let dest = root.join("b.tgz");
    let err = cache
        .download_to_file("https://registry.test/b.tgz", &dest)
        .expect_err("must fail");

    assert!(matches!(err, MirrorError::Fetch(ref fetch) if fetch.status.is_none()));
    assert!(!dest.exists());
    assert!(!root.join("b.tgz.part").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn retry_policy_recovers_from_transient_failures() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_flaky(
        "https://registry.test/flaky",
        2,
        json!({"name": "flaky", "versions": {}}).to_string(),
    );
    let client = RegistryClient::new(
        REGISTRY,
        cache_over(&transport),
        fast_retry(3),
        CancelToken::new(),
    );

    let doc = client.package_root("flaky").expect("third attempt must succeed");
    assert_eq!(doc.name, "flaky");
    assert_eq!(transport.requests("https://registry.test/flaky"), 3);
}

#[test]
fn retry_policy_gives_up_after_bounded_attempts() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_status("https://registry.test/down", 503);
    let client = RegistryClient::new(
        REGISTRY,
        cache_over(&transport),
        fast_retry(2),
        CancelToken::new(),
    );

    let err = client.package_root("down").expect_err("must give up");
    assert!(matches!(err, MirrorError::Fetch(ref fetch) if fetch.status == Some(503)));
    assert_eq!(transport.requests("https://registry.test/down"), 2);
}

#[test]
fn permanent_failures_are_not_retried() {
    let transport = Arc::new(MemoryTransport::new());
    let client = RegistryClient::new(
        REGISTRY,
        cache_over(&transport),
        fast_retry(5),
        CancelToken::new(),
    );

    client
        .package_root("nope")
        .expect_err("404 must surface");
    assert_eq!(transport.requests("https://registry.test/nope"), 1);
}

#[test]
fn cancelled_client_issues_no_requests() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_bytes("https://registry.test/a", "{}");
    let cancel = CancelToken::new();
    cancel.cancel();
    let client = RegistryClient::new(REGISTRY, cache_over(&transport), fast_retry(3), cancel);

    let err = client.package_root("a").expect_err("must be cancelled");
    assert!(err.is_cancelled());
    assert_eq!(transport.total_requests(), 0);
}

#[test]
fn client_decodes_documents_and_reports_bad_json() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_json(
        "https://registry.test/left-pad/1.0.0",
        &json!({
            "name": "left-pad",
            "version": "1.0.0",
            "dist": {"shasum": "abc", "tarball": "https://registry.test/left-pad/-/left-pad-1.0.0.tgz"}
        }),
    );
    transport.insert_bytes("https://registry.test/broken", "not json");
    let client = RegistryClient::new(
        REGISTRY,
        cache_over(&transport),
        RetryPolicy::none(),
        CancelToken::new(),
    );

    let doc = client
        .version_doc("left-pad", &Version::new(1, 0, 0))
        .expect("must decode version doc");
    assert_eq!(doc.version, "1.0.0");
    assert!(doc.dist.is_some());

    let err = client.package_root("broken").expect_err("must fail decoding");
    assert!(matches!(err, MirrorError::Decode { ref url, .. } if url == "https://registry.test/broken"));
}

#[test]
fn package_root_is_decoded_once_per_run() {
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_json(
        "https://registry.test/a",
        &json!({"name": "a", "versions": {"1.0.0": {}}}),
    );
    let client = RegistryClient::new(
        REGISTRY,
        cache_over(&transport),
        RetryPolicy::none(),
        CancelToken::new(),
    );

    let first = client.package_root("a").expect("must fetch");
    let second = client.package_root("a").expect("must reuse");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.requests("https://registry.test/a"), 1);
}

fn test_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    path.push(format!(
        "regmirror-registry-tests-{}-{}",
        std::process::id(),
        nanos
    ));
    path
}
