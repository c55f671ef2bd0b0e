//! Decides whether an upstream response may be converted at all, independent
//! of content negotiation. Mirrors the ordered-check discipline of the
//! teacher's route/filter matchers: first failing check wins.

use crate::config::MarkdownConfig;
use http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    Config,
    Method,
    Status,
    Range,
    Streaming,
    ContentType,
    Size,
    Auth,
}

impl IneligibleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IneligibleReason::Config => "config",
            IneligibleReason::Method => "method",
            IneligibleReason::Status => "status",
            IneligibleReason::Range => "range",
            IneligibleReason::Streaming => "streaming",
            IneligibleReason::ContentType => "content_type",
            IneligibleReason::Size => "size",
            IneligibleReason::Auth => "auth",
        }
    }
}

pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

pub struct EligibilityInput<'a> {
    pub config: &'a MarkdownConfig,
    pub method: &'a str,
    pub request_headers: &'a HeaderMap,
    pub upstream_status: u16,
    pub upstream_headers: &'a HeaderMap,
    pub authenticated: bool,
}

/// `true` iff `content_type` is `text/html`, allowing only a trailing `;`
/// parameter list or whitespace after it — not any `text/html*` prefix, so
/// `text/html5` or `text/htmlx` don't slip through. Case-insensitive;
/// callers may pass the raw header value, already-lowercased or not.
pub fn is_text_html(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    match lower.strip_prefix("text/html") {
        None => false,
        Some(rest) => match rest.as_bytes().first() {
            None => true,
            Some(b';') => true,
            Some(b) => b.is_ascii_whitespace(),
        },
    }
}

/// Run the 8-step ordered eligibility check. The order matters: streaming is
/// checked before content-type so `text/event-stream` is rejected with the
/// more specific `streaming` reason rather than a generic content-type miss.
pub fn check(input: &EligibilityInput) -> Eligibility {
    use Eligibility::*;
    use IneligibleReason::*;

    if !input.config.enable {
        return Ineligible(Config);
    }

    if input.method != "GET" && input.method != "HEAD" {
        return Ineligible(Method);
    }

    if input.upstream_status != 200 {
        return Ineligible(Status);
    }

    if input.request_headers.contains_key(http::header::RANGE) {
        return Ineligible(Range);
    }

    let content_type = input
        .upstream_headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("text/event-stream")
        || input
            .config
            .stream_types
            .iter()
            .any(|prefix| content_type.starts_with(&prefix.to_ascii_lowercase()))
    {
        return Ineligible(Streaming);
    }

    if !is_text_html(&content_type) {
        return Ineligible(ContentType);
    }

    if let Some(len) = input
        .upstream_headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        if len > input.config.max_size {
            return Ineligible(Size);
        }
    }

    if input.config.auth_policy == crate::config::AuthPolicy::Deny && input.authenticated {
        return Ineligible(Auth);
    }

    Eligible
}
