//! Tests for configuration parsing, environment lookup and validation.

use std::collections::HashMap;
use std::path::PathBuf;

use caldera_client::builders::build_clients;
use caldera_client::config::{ClientConfig, StoreBackendConfig};
use caldera_client::core::ClientError;
use caldera_client::runtime::TokioSpawner;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_json_config_fills_defaults() {
    let cfg = ClientConfig::from_json_str(r#"{ "platform": { "api_key": "abc" } }"#).unwrap();
    assert_eq!(cfg.platform.base_url, "https://www.bungie.net");
    assert_eq!(cfg.platform.stats_base_url, "https://stats.bungie.net");
    assert_eq!(cfg.platform.api_key_header, "X-API-Key");
    assert_eq!(cfg.platform.authenticated_prefixes, vec!["/Platform/".to_string()]);
    assert_eq!(cfg.platform.max_concurrency, 20);
    assert_eq!(cfg.reporting.base_url, "http://localhost:8080/api");
    assert_eq!(cfg.cache.storage_key, "bungie_manifest");
    assert_eq!(cfg.cache.store, StoreBackendConfig::InMemory);
}

#[test]
fn test_json_config_file_store() {
    let cfg = ClientConfig::from_json_str(
        r#"{
            "platform": { "api_key": "abc", "max_concurrency": 4 },
            "cache": { "freshness_secs": 600, "store": { "file": { "path": "/var/cache/caldera" } } }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.platform.max_concurrency, 4);
    assert_eq!(cfg.cache.freshness_secs, 600);
    assert_eq!(
        cfg.cache.store,
        StoreBackendConfig::File {
            path: PathBuf::from("/var/cache/caldera")
        }
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let zero = r#"{ "platform": { "api_key": "abc", "max_concurrency": 0 } }"#;
    assert!(ClientConfig::from_json_str(zero)
        .unwrap_err()
        .contains("max_concurrency"));

    let blank_key = r#"{ "platform": { "api_key": "  " } }"#;
    assert!(ClientConfig::from_json_str(blank_key)
        .unwrap_err()
        .contains("api_key"));

    let bad_url = r#"{ "platform": { "api_key": "abc" }, "reporting": { "base_url": "ftp://x" } }"#;
    assert!(ClientConfig::from_json_str(bad_url)
        .unwrap_err()
        .contains("http or https"));

    assert!(ClientConfig::from_json_str("not json")
        .unwrap_err()
        .starts_with("parse error"));
}

#[test]
fn test_lookup_overrides() {
    let cfg = ClientConfig::from_lookup(lookup(&[
        ("BUNGIE_API_KEY", "env-key"),
        ("BUNGIE_MAX_CONCURRENCY", "8"),
        ("CALDERA_API_BASE", "https://reports.example.com/api"),
        ("CALDERA_MANIFEST_DIR", "/tmp/caldera"),
    ]))
    .unwrap();
    assert_eq!(cfg.platform.api_key, "env-key");
    assert_eq!(cfg.platform.max_concurrency, 8);
    assert_eq!(cfg.reporting.base_url, "https://reports.example.com/api");
    assert_eq!(
        cfg.cache.store,
        StoreBackendConfig::File {
            path: PathBuf::from("/tmp/caldera")
        }
    );
}

#[test]
fn test_lookup_requires_api_key() {
    let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
    assert!(err.to_string().contains("BUNGIE_API_KEY"));

    let err = ClientConfig::from_lookup(lookup(&[
        ("BUNGIE_API_KEY", "k"),
        ("BUNGIE_MAX_CONCURRENCY", "lots"),
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("BUNGIE_MAX_CONCURRENCY"));
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let mut cfg = ClientConfig::new("key");
    cfg.platform.max_concurrency = 0;
    let err = build_clients(&cfg, TokioSpawner::current().unwrap()).unwrap_err();
    assert!(matches!(err, ClientError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_builder_opens_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = ClientConfig::new("key");
    cfg.cache.store = StoreBackendConfig::File {
        path: dir.path().join("manifest"),
    };
    let clients = build_clients(&cfg, TokioSpawner::current().unwrap()).unwrap();
    assert!(dir.path().join("manifest").is_dir());
    assert_eq!(clients.platform.scheduler().ceiling(), 20);
}
