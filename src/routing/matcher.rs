use crate::config::{DomainConfig, MarkdownConfig, RouteConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// A single, unretried forward target. Routing and upstream selection beyond
/// "one configured upstream per route" are out of scope for the markdown
/// filter — no weighted clusters, no service discovery, no load balancing.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub tls_verify: bool,
    pub connect_timeout_secs: f64,
}

/// A route with its markdown Configuration Record already resolved through
/// the global -> virtual-host -> location scope-inheritance chain.
pub struct CompiledRoute {
    pub name: String,
    pub uri: String,
    pub priority: i32,
    pub methods: Vec<String>,
    pub upstream: UpstreamTarget,
    pub markdown: MarkdownConfig,
}

impl CompiledRoute {
    fn is_prefix_pattern(&self) -> bool {
        self.uri.ends_with("/*") || self.uri == "/*" || self.uri == "*"
    }

    fn prefix(&self) -> &str {
        self.uri.strip_suffix('*').unwrap_or(&self.uri)
    }
}

/// Host-partitioned route table: exact hostname map, wildcard host patterns,
/// and a `_default` catch-all partition. Within a partition, routes are
/// matched by exact URI first, then by longest matching `/prefix/*` pattern,
/// with `priority` as the final tie-break. This is deliberately far simpler
/// than a general-purpose reverse-proxy router — no regex header matchers,
/// no weighted clusters, no service discovery — since request routing and
/// upstream selection are explicitly out of scope for the filter itself.
pub struct RouteTable {
    exact_hosts: HashMap<String, Vec<Arc<CompiledRoute>>>,
    wildcard_hosts: Vec<(String, Vec<Arc<CompiledRoute>>)>,
    default: Vec<Arc<CompiledRoute>>,
    route_count: usize,
}

impl RouteTable {
    /// Build from domain configs, resolving each route's markdown
    /// Configuration Record through global -> domain -> route scope
    /// inheritance.
    pub fn new(domains: &[DomainConfig], global_markdown: &MarkdownConfig) -> Self {
        let mut exact_hosts: HashMap<String, Vec<Arc<CompiledRoute>>> = HashMap::new();
        let mut wildcard_hosts: HashMap<String, Vec<Arc<CompiledRoute>>> = HashMap::new();
        let mut default: Vec<Arc<CompiledRoute>> = Vec::new();
        let mut count = 0;

        for domain in domains {
            let domain_markdown = match &domain.markdown {
                Some(patch) => global_markdown.merged_with(patch),
                None => global_markdown.clone(),
            };

            for route_cfg in &domain.routes {
                if route_cfg.status != 1 {
                    continue;
                }
                count += 1;

                let compiled = Arc::new(compile_route(route_cfg, &domain_markdown));

                for host in &domain.hosts {
                    if host == "_" {
                        default.push(compiled.clone());
                    } else if host.contains('*') {
                        wildcard_hosts
                            .entry(host.clone())
                            .or_default()
                            .push(compiled.clone());
                    } else {
                        exact_hosts
                            .entry(host.to_ascii_lowercase())
                            .or_default()
                            .push(compiled.clone());
                    }
                }
            }
        }

        tracing::info!("routing: compiled route table, count={}", count);

        Self {
            exact_hosts,
            wildcard_hosts: wildcard_hosts.into_iter().collect(),
            default,
            route_count: count,
        }
    }

    pub fn match_route(&self, host: &str, uri: &str, method: &str) -> Option<Arc<CompiledRoute>> {
        let req_host = host.split(':').next().unwrap_or(host);
        let req_host_lower = req_host.to_ascii_lowercase();
        let method_upper = method.to_uppercase();

        if let Some(routes) = self.exact_hosts.get(&req_host_lower) {
            if let Some(r) = best_match(routes, uri, &method_upper) {
                return Some(r);
            }
        }

        for (pattern, routes) in &self.wildcard_hosts {
            if host_matches(req_host, pattern) {
                if let Some(r) = best_match(routes, uri, &method_upper) {
                    return Some(r);
                }
            }
        }

        best_match(&self.default, uri, &method_upper)
    }

    pub fn route_count(&self) -> usize {
        self.route_count
    }

    pub fn all_routes(&self) -> Vec<&Arc<CompiledRoute>> {
        let mut out = Vec::new();
        out.extend(self.exact_hosts.values().flatten());
        out.extend(self.wildcard_hosts.iter().flat_map(|(_, r)| r));
        out.extend(&self.default);
        out
    }
}

fn compile_route(cfg: &RouteConfig, domain_markdown: &MarkdownConfig) -> CompiledRoute {
    let markdown = match &cfg.markdown {
        Some(patch) => domain_markdown.merged_with(patch),
        None => domain_markdown.clone(),
    };

    CompiledRoute {
        name: if cfg.name.is_empty() {
            cfg.uri.clone()
        } else {
            cfg.name.clone()
        },
        uri: cfg.uri.clone(),
        priority: cfg.priority,
        methods: cfg.methods.clone(),
        upstream: UpstreamTarget {
            scheme: cfg.upstream.scheme.clone(),
            host: cfg.upstream.host.clone(),
            port: cfg.upstream.port,
            tls_verify: cfg.upstream.tls_verify,
            connect_timeout_secs: cfg.upstream.connect_timeout_secs,
        },
        markdown,
    }
}

/// Pick the best-matching route in a partition: exact URI match wins over
/// any prefix match; among prefix matches the longest prefix wins; ties are
/// broken by `priority` (higher wins).
fn best_match(routes: &[Arc<CompiledRoute>], uri: &str, method_upper: &str) -> Option<Arc<CompiledRoute>> {
    let mut best: Option<&Arc<CompiledRoute>> = None;
    let mut best_rank: (u8, usize, i32) = (0, 0, i32::MIN);

    for route in routes {
        if !route.methods.is_empty() && !route.methods.iter().any(|m| m == method_upper) {
            continue;
        }

        let rank = if route.uri == uri {
            (2u8, uri.len(), route.priority)
        } else if route.is_prefix_pattern() {
            let prefix = route.prefix();
            if uri.starts_with(prefix) {
                (1u8, prefix.len(), route.priority)
            } else {
                continue;
            }
        } else {
            continue;
        };

        if rank > best_rank {
            best_rank = rank;
            best = Some(route);
        }
    }

    best.cloned()
}

/// Match a request host against a route host pattern.
///
/// Supported patterns:
/// - `api.example.com` — exact match (case-insensitive)
/// - `*.example.com` — suffix wildcard (matches any subdomain)
/// - `api.*` — prefix wildcard (matches any TLD/domain change)
fn host_matches(req_host: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        req_host.len() >= suffix.len()
            && req_host[req_host.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        req_host.len() >= prefix.len() && req_host[..prefix.len()].eq_ignore_ascii_case(prefix)
    } else {
        req_host.eq_ignore_ascii_case(pattern)
    }
}
