use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a `T` that implements `Default` — treats JSON `null` the same as
/// a missing field (returns `T::default()`).  Use with:
///   `#[serde(default, deserialize_with = "deserialize_null_default")]`
fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Global markdown-filter defaults, inherited by every domain/route
    /// unless overridden by a more specific scope.
    #[serde(default)]
    pub markdown: MarkdownConfig,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub domains: Vec<DomainConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            markdown: MarkdownConfig::default(),
            domains: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn total_route_count(&self) -> usize {
        self.domains.iter().map(|d| d.routes.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,

    /// Host patterns. Supports exact (`api.example.com`),
    /// wildcard suffix (`*.example.com`), wildcard prefix (`api.*`).
    pub hosts: Vec<String>,

    /// Overrides the global markdown defaults for every route under this domain.
    #[serde(default)]
    pub markdown: Option<MarkdownConfigPatch>,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// URI pattern. Supports exact match and prefix match (`/docs/*`, `/*` catch-all).
    pub uri: String,

    /// Allowed HTTP methods. Empty means all methods.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub methods: Vec<String>,

    /// Higher value = higher priority.
    #[serde(default)]
    pub priority: i32,

    /// The single upstream this route forwards to. Routing/upstream selection,
    /// fan-out, retry, and load balancing beyond this one-target-per-route
    /// model are out of scope for the markdown filter.
    pub upstream: UpstreamConfig,

    /// Overrides the domain (or global) markdown defaults for this route.
    #[serde(default)]
    pub markdown: Option<MarkdownConfigPatch>,

    /// 1 = enabled, 0 = disabled.
    #[serde(default = "default_status")]
    pub status: u8,
}

fn default_status() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Default `false` — typical for internal services with self-signed certs.
    #[serde(default)]
    pub tls_verify: bool,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
}

fn default_port() -> u16 {
    80
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_connect_timeout() -> f64 {
    6.0
}

// ---------------------------------------------------------------------------
// Markdown-filter configuration record and its scope-inheriting
// patch form. `MarkdownConfig` is the fully-resolved record consulted by the
// response lifecycle; `MarkdownConfigPatch` is what a domain or route may
// override, merged global -> virtual-host -> location at route-compile time.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Pass,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    Commonmark,
    Gfm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalMode {
    Full,
    ImsOnly,
    Disabled,
}

/// Fully resolved per-route markdown configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownConfig {
    #[serde(default = "default_enable")]
    pub enable: bool,

    #[serde(default = "default_max_size")]
    pub max_size: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_on_error")]
    pub on_error: OnError,

    #[serde(default = "default_flavor")]
    pub flavor: Flavor,

    #[serde(default = "default_wildcard_accept")]
    pub wildcard_accept: bool,

    #[serde(default = "default_auth_policy")]
    pub auth_policy: AuthPolicy,

    #[serde(default = "default_auth_cookie_patterns")]
    pub auth_cookies: Vec<String>,

    #[serde(default = "default_etag")]
    pub etag: bool,

    #[serde(default = "default_conditional_requests")]
    pub conditional_requests: ConditionalMode,

    #[serde(default = "default_buffer_chunked")]
    pub buffer_chunked: bool,

    #[serde(default)]
    pub stream_types: Vec<String>,

    #[serde(default = "default_auto_decompress")]
    pub auto_decompress: bool,

    #[serde(default)]
    pub token_estimate: bool,

    #[serde(default)]
    pub front_matter: bool,

    #[serde(default = "default_log_verbosity")]
    pub log_verbosity: String,
}

fn default_enable() -> bool {
    true
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_on_error() -> OnError {
    OnError::Pass
}

fn default_flavor() -> Flavor {
    Flavor::Commonmark
}

fn default_wildcard_accept() -> bool {
    true
}

fn default_auth_policy() -> AuthPolicy {
    AuthPolicy::Allow
}

/// Fallback cookie-name patterns used when an operator never sets
/// `auth_cookies` at all. An operator who explicitly sets an empty list gets
/// a genuinely empty pattern set — this fallback is a config default, not a
/// core invariant of the auth classifier.
fn default_auth_cookie_patterns() -> Vec<String> {
    vec![
        "session*".to_string(),
        "*session".to_string(),
        "auth_token".to_string(),
        "*_jwt".to_string(),
    ]
}

fn default_etag() -> bool {
    true
}

fn default_conditional_requests() -> ConditionalMode {
    ConditionalMode::Full
}

fn default_buffer_chunked() -> bool {
    true
}

fn default_auto_decompress() -> bool {
    true
}

fn default_log_verbosity() -> String {
    "info".to_string()
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            max_size: default_max_size(),
            timeout_ms: default_timeout_ms(),
            on_error: default_on_error(),
            flavor: default_flavor(),
            wildcard_accept: default_wildcard_accept(),
            auth_policy: default_auth_policy(),
            auth_cookies: default_auth_cookie_patterns(),
            etag: default_etag(),
            conditional_requests: default_conditional_requests(),
            buffer_chunked: default_buffer_chunked(),
            stream_types: Vec::new(),
            auto_decompress: default_auto_decompress(),
            token_estimate: false,
            front_matter: false,
            log_verbosity: default_log_verbosity(),
        }
    }
}

impl MarkdownConfig {
    /// Apply a scope override on top of `self`, returning the merged record.
    /// Used to fold global -> virtual-host -> location scopes in order.
    pub fn merged_with(&self, patch: &MarkdownConfigPatch) -> MarkdownConfig {
        let mut out = self.clone();
        macro_rules! apply {
            ($field:ident) => {
                if let Some(v) = patch.$field.clone() {
                    out.$field = v;
                }
            };
        }
        apply!(enable);
        apply!(max_size);
        apply!(timeout_ms);
        apply!(on_error);
        apply!(flavor);
        apply!(wildcard_accept);
        apply!(auth_policy);
        apply!(auth_cookies);
        apply!(etag);
        apply!(conditional_requests);
        apply!(buffer_chunked);
        apply!(stream_types);
        apply!(auto_decompress);
        apply!(token_estimate);
        apply!(front_matter);
        apply!(log_verbosity);
        out
    }
}

/// A scope-level override of the markdown Configuration Record. Every field
/// is optional — `None` means "inherit from the parent scope".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownConfigPatch {
    #[serde(default)]
    pub enable: Option<bool>,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub on_error: Option<OnError>,
    #[serde(default)]
    pub flavor: Option<Flavor>,
    #[serde(default)]
    pub wildcard_accept: Option<bool>,
    #[serde(default)]
    pub auth_policy: Option<AuthPolicy>,
    #[serde(default)]
    pub auth_cookies: Option<Vec<String>>,
    #[serde(default)]
    pub etag: Option<bool>,
    #[serde(default)]
    pub conditional_requests: Option<ConditionalMode>,
    #[serde(default)]
    pub buffer_chunked: Option<bool>,
    #[serde(default)]
    pub stream_types: Option<Vec<String>>,
    #[serde(default)]
    pub auto_decompress: Option<bool>,
    #[serde(default)]
    pub token_estimate: Option<bool>,
    #[serde(default)]
    pub front_matter: Option<bool>,
    #[serde(default)]
    pub log_verbosity: Option<String>,
}
