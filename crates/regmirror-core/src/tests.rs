use std::time::Duration;

use semver::Version;

use super::*;

fn v(raw: &str) -> Version {
    Version::parse(raw).expect("test version must parse")
}

#[test]
fn classifies_exact_versions_without_range_semantics() {
    assert_eq!(
        VersionSpec::parse("1.0.0").expect("must classify"),
        VersionSpec::Exact(v("1.0.0"))
    );
    assert_eq!(
        VersionSpec::parse("=v2.3.4").expect("must classify"),
        VersionSpec::Exact(v("2.3.4"))
    );
    assert_eq!(
        VersionSpec::parse("1.0.0-rc.1").expect("must classify"),
        VersionSpec::Exact(v("1.0.0-rc.1"))
    );
}

#[test]
fn classifies_git_and_web_references_as_external() {
    let cases = [
        ("git://github.com/x/y.git", ExternalKind::Git),
        ("git+ssh://git@github.com:x/y.git", ExternalKind::Git),
        ("github:x/y", ExternalKind::Git),
        ("x/y#v1.0.0", ExternalKind::Git),
        ("https://example.test/y.tgz", ExternalKind::Web),
        ("file:../local", ExternalKind::File),
    ];
    for (raw, expected) in cases {
        match VersionSpec::parse(raw).expect("must classify") {
            VersionSpec::External { kind, reference } => {
                assert_eq!(kind, expected, "kind for {raw}");
                assert_eq!(reference, raw);
            }
            other => panic!("expected external for {raw}, got {other:?}"),
        }
    }
}

#[test]
fn classifies_tags_and_ranges() {
    assert_eq!(
        VersionSpec::parse("latest").expect("must classify"),
        VersionSpec::DistTag("latest".to_string())
    );
    assert!(matches!(
        VersionSpec::parse("^4.0.0").expect("must classify"),
        VersionSpec::Range(_)
    ));
    assert!(matches!(
        VersionSpec::parse("v1.2").expect("must classify"),
        VersionSpec::Range(_)
    ));
    assert!(matches!(
        VersionSpec::parse("").expect("must classify"),
        VersionSpec::Range(_)
    ));
    assert!(matches!(
        VersionSpec::parse("x").expect("must classify"),
        VersionSpec::Range(_)
    ));
}

#[test]
fn invalid_range_is_reported_not_panicked() {
    let err = VersionSpec::parse(">= <").expect_err("must reject garbage range");
    assert!(!err.is_empty());
}

#[test]
fn package_name_validation() {
    assert!(validate_package_name("left-pad").is_ok());
    assert!(validate_package_name("@babel/core").is_ok());

    for bad in ["", "../etc", "a/b", "@scope", "@/x", "@s/a/b", "a b", "a\\b", ".hidden"] {
        let err = validate_package_name(bad).expect_err("must reject bad name");
        assert!(
            err.to_string().contains("invalid package name"),
            "unexpected error for {bad:?}: {err}"
        );
    }
}

#[test]
fn builds_registry_and_mirror_urls() {
    let version = v("1.0.0");
    assert_eq!(
        package_url("https://registry.test/", "left-pad"),
        "https://registry.test/left-pad"
    );
    assert_eq!(
        version_url("https://registry.test", "@babel/core", &version),
        "https://registry.test/@babel%2fcore/1.0.0"
    );
    assert_eq!(
        rewritten_tarball_url("http://mirror.local/", "left-pad", &version),
        "http://mirror.local/left-pad/1.0.0/left-pad-1.0.0.tgz"
    );
    assert_eq!(
        rewritten_tarball_url("http://mirror.local", "@babel/core", &version),
        "http://mirror.local/@babel/core/1.0.0/core-1.0.0.tgz"
    );
    assert_eq!(
        conventional_tarball_url("https://registry.test", "@babel/core", &version),
        "https://registry.test/@babel/core/-/core-1.0.0.tgz"
    );
}

#[test]
fn version_doc_tolerates_malformed_dependency_sections() {
    let doc: VersionDoc = serde_json::from_str(
        r#"{
            "name": "old",
            "version": "0.1.0",
            "dependencies": ["not", "a", "map"],
            "devDependencies": {"tap": "*", "broken": 3},
            "dist": {"shasum": "abc", "tarball": "https://registry.test/old/-/old-0.1.0.tgz"}
        }"#,
    )
    .expect("must decode tolerant doc");

    assert!(doc.dependencies.is_empty());
    assert_eq!(doc.dev_dependencies.len(), 1);
    assert_eq!(
        doc.dist.and_then(|dist| dist.shasum),
        Some("abc".to_string())
    );
}

#[test]
fn dependency_specs_merge_runtime_and_peer_sections() {
    let doc: VersionDoc = serde_json::from_str(
        r#"{
            "name": "pi",
            "version": "3.1.4",
            "dependencies": {"a": "1.0.0", "b": "1.0.0"},
            "devDependencies": {"a": "2.0.0", "c": "2.0.0"},
            "peerDependencies": {"c": "2.0.0", "d": "1.0.0"}
        }"#,
    )
    .expect("must decode doc");

    let specs = doc.dependency_specs();
    assert_eq!(specs.keys().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
    assert_eq!(specs["a"].len(), 1);
    assert!(specs["a"].contains("1.0.0"));
    assert!(specs["c"].contains("2.0.0"));
}

#[test]
fn mirror_root_index_serializes_npm_field_names() {
    let index = MirrorRootIndex {
        name: "left-pad".to_string(),
        id: "left-pad".to_string(),
        versions: [(
            "1.0.0".to_string(),
            "http://mirror.local/left-pad/1.0.0/left-pad-1.0.0.tgz".to_string(),
        )]
        .into_iter()
        .collect(),
        dist_tags: [("latest".to_string(), "1.0.0".to_string())]
            .into_iter()
            .collect(),
    };

    let json = serde_json::to_string(&index).expect("must serialize");
    assert!(json.contains("\"_id\":\"left-pad\""));
    assert!(json.contains("\"dist-tags\":{\"latest\":\"1.0.0\"}"));
}

#[test]
fn graph_groups_and_deduplicates_versions() {
    let graph: Graph = [
        PackageVersion::new("a", v("1.0.0")),
        PackageVersion::new("a", v("1.10.0")),
        PackageVersion::new("a", v("1.2.0")),
        PackageVersion::new("b", v("0.1.0")),
        PackageVersion::new("a", v("1.2.0")),
    ]
    .into_iter()
    .collect();

    assert_eq!(graph.package_count(), 2);
    assert_eq!(graph.version_count(), 4);
    assert_eq!(
        graph
            .versions("a")
            .map(|versions| versions.iter().map(ToString::to_string).collect::<Vec<_>>()),
        Some(vec!["1.0.0".to_string(), "1.2.0".to_string(), "1.10.0".to_string()])
    );
    assert!(graph.contains("b", &v("0.1.0")));
    assert_eq!(graph.entries().len(), 4);
}

#[test]
fn seed_set_merges_manifest_sections_and_cli_entries() {
    let manifest = SeedManifest::from_json_str(
        r#"{
            "name": "app",
            "dependencies": {"left-pad": "1.0.0"},
            "devDependencies": {"mocha": "^10.0.0"},
            "optionalDependencies": {"fsevents": "~2.3.0"}
        }"#,
    )
    .expect("must parse manifest");

    let mut seeds = SeedSet::new();
    seeds.add_manifest(&manifest);
    seeds.add_entry("@babel/core@^7.0.0").expect("must parse scoped");
    seeds.add_entry("lodash").expect("must parse bare name");
    seeds.add_entry("left-pad@1.0.0").expect("must parse duplicate");

    let entries: Vec<(&str, &str)> = seeds.entries().collect();
    assert_eq!(
        entries,
        vec![
            ("@babel/core", "^7.0.0"),
            ("fsevents", "~2.3.0"),
            ("left-pad", "1.0.0"),
            ("lodash", "latest"),
            ("mocha", "^10.0.0"),
        ]
    );
    assert_eq!(seeds.len(), 5);
}

#[test]
fn seed_entry_without_name_is_rejected() {
    let mut seeds = SeedSet::new();
    let err = seeds.add_entry("@^1.0.0").expect_err("must reject nameless entry");
    assert!(err.to_string().contains("no package name"));
}

#[test]
fn cancel_token_trips_on_cancel_and_deadline() {
    let token = CancelToken::new();
    assert!(token.check().is_ok());
    let shared = token.clone();
    shared.cancel();
    assert!(token.check().expect_err("must be cancelled").is_cancelled());

    let expired = CancelToken::with_deadline(Duration::ZERO);
    assert!(expired.is_cancelled());
}

#[test]
fn deadline_token_shares_abort_flag() {
    let token = CancelToken::new();
    let bounded = token.deadline_after(Duration::from_secs(3600));
    assert!(!bounded.is_cancelled());

    token.cancel();
    assert!(bounded.is_cancelled());
}

#[test]
fn fetch_error_transience() {
    assert!(FetchError::transport("http://x", "connection reset").is_transient());
    assert!(FetchError::status("http://x", 503).is_transient());
    assert!(FetchError::status("http://x", 429).is_transient());
    assert!(!FetchError::status("http://x", 404).is_transient());
}

#[test]
fn error_messages_name_the_failing_url_and_entry() {
    assert_eq!(
        FetchError::status("http://x/a", 503).to_string(),
        "GET http://x/a failed: HTTP 503 (unexpected status)"
    );
    assert_eq!(
        FetchError::transport("http://x/a", "connection reset").to_string(),
        "GET http://x/a failed: connection reset"
    );

    let failure = VerificationFailure::ChecksumMismatch {
        package: "a".to_string(),
        version: "1.0.0".to_string(),
        expected: "aa".to_string(),
        actual: "bb".to_string(),
    };
    assert_eq!(
        failure.to_string(),
        "a@1.0.0: shasum mismatch (expected aa, got bb)"
    );
    let source: &dyn std::error::Error = &failure;
    assert!(source.source().is_none());

    let fetch: MirrorError = FetchError::status("http://x/a", 404).into();
    assert_eq!(fetch.to_string(), "GET http://x/a failed: HTTP 404 (unexpected status)");
}
