use super::types::*;
use super::GatewayConfig;
use std::path::Path;

fn sample_route(name: &str, uri: &str) -> RouteConfig {
    RouteConfig {
        id: name.to_string(),
        name: name.to_string(),
        uri: uri.to_string(),
        methods: vec![],
        priority: 0,
        upstream: UpstreamConfig {
            host: "127.0.0.1".to_string(),
            port: 8081,
            scheme: "http".to_string(),
            tls_verify: false,
            connect_timeout_secs: 6.0,
        },
        markdown: None,
        status: 1,
    }
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let cfg = GatewayConfig::load(Path::new("/nonexistent/markdown-gateway.toml")).unwrap();
    assert!(cfg.markdown.enable);
    assert!(cfg.domains.is_empty());
}

#[test]
fn test_load_json_config() {
    let json = r#"{
        "markdown": { "max_size": 2000000 },
        "domains": [{
            "name": "docs",
            "hosts": ["docs.example.com"],
            "routes": [{
                "name": "catch-all",
                "uri": "/*",
                "upstream": { "host": "127.0.0.1", "port": 8081 }
            }]
        }]
    }"#;
    let tmp = std::env::temp_dir().join("markdown_gateway_test_config.json");
    std::fs::write(&tmp, json).unwrap();
    let cfg = GatewayConfig::load(&tmp).unwrap();
    std::fs::remove_file(&tmp).ok();

    assert_eq!(cfg.markdown.max_size, 2_000_000);
    assert_eq!(cfg.domains.len(), 1);
    assert_eq!(cfg.domains[0].name, "docs");
    assert_eq!(cfg.domains[0].routes[0].upstream.host, "127.0.0.1");
}

#[test]
fn test_validate_empty_hosts_fails() {
    let cfg = GatewayConfig {
        markdown: MarkdownConfig::default(),
        domains: vec![DomainConfig {
            name: "bad".into(),
            hosts: vec![],
            markdown: None,
            routes: vec![],
        }],
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_empty_uri_fails() {
    let cfg = GatewayConfig {
        markdown: MarkdownConfig::default(),
        domains: vec![DomainConfig {
            name: "test".into(),
            hosts: vec!["example.com".into()],
            markdown: None,
            routes: vec![RouteConfig {
                uri: "".into(),
                ..sample_route("bad-route", "")
            }],
        }],
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_missing_upstream_host_fails() {
    let cfg = GatewayConfig {
        markdown: MarkdownConfig::default(),
        domains: vec![DomainConfig {
            name: "test".into(),
            hosts: vec!["example.com".into()],
            markdown: None,
            routes: vec![RouteConfig {
                upstream: UpstreamConfig {
                    host: "".into(),
                    port: 80,
                    scheme: "http".into(),
                    tls_verify: false,
                    connect_timeout_secs: 6.0,
                },
                ..sample_route("bad-route", "/*")
            }],
        }],
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_valid_config() {
    let cfg = GatewayConfig {
        markdown: MarkdownConfig::default(),
        domains: vec![DomainConfig {
            name: "test".into(),
            hosts: vec!["example.com".into()],
            markdown: None,
            routes: vec![sample_route("route1", "/*")],
        }],
    };
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_total_route_count() {
    let cfg = GatewayConfig {
        markdown: MarkdownConfig::default(),
        domains: vec![
            DomainConfig {
                name: "d1".into(),
                hosts: vec!["a.com".into()],
                markdown: None,
                routes: vec![sample_route("r1", "/a"), sample_route("r2", "/b")],
            },
            DomainConfig {
                name: "d2".into(),
                hosts: vec!["b.com".into()],
                markdown: None,
                routes: vec![sample_route("r3", "/c")],
            },
        ],
    };
    assert_eq!(cfg.total_route_count(), 3);
}

#[test]
fn test_deserialize_defaults() {
    let toml_str = r#"
[markdown]
max_size = 5000000
"#;
    let cfg: GatewayConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.markdown.max_size, 5_000_000);
    assert_eq!(cfg.markdown.timeout_ms, 5000);
    assert_eq!(cfg.markdown.flavor, Flavor::Commonmark);
    assert!(cfg.markdown.etag);
}

#[test]
fn test_unsupported_format() {
    let tmp = std::env::temp_dir().join("markdown_gateway_test.yml");
    std::fs::write(&tmp, "key: value").unwrap();
    assert!(GatewayConfig::load(&tmp).is_err());
    std::fs::remove_file(&tmp).ok();
}
