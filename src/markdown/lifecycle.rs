//! Response Lifecycle orchestrator: joins the Negotiator, Eligibility Gate,
//! Auth Classifier, Body Accumulator, Decompressor, Conditional Handler,
//! Converter, and Failure Policy into the single per-request state machine
//! that decides whether and how an upstream `text/html` response becomes a
//! downstream `text/markdown` one.
//!
//! The host proxy layer (`proxy::handler`) already collects the full
//! upstream body into one `Bytes` value via `http_body_util::BodyExt::collect`
//! before calling in here, so the buffering/decompressing/converting phases
//! collapse into a single straight-line function rather than a chunk-driven
//! loop: there is never a partial body to act on mid-request.

use crate::config::MarkdownConfig;
use crate::markdown::accumulator::Accumulator;
use crate::markdown::conditional;
use crate::markdown::converter::{self, ConversionOptions};
use crate::markdown::decompress::{self, Compression};
use crate::markdown::eligibility::{self, Eligibility, EligibilityInput};
use crate::markdown::failure::{self, Disposition, FailureKind};
use crate::markdown::negotiate::{self, NegotiationDecision};
use crate::markdown::auth;
use crate::proxy::context::{full_body, empty_body, BoxBody};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode};

pub struct LifecycleInput<'a> {
    pub method: &'a Method,
    pub request_headers: &'a HeaderMap,
    pub base_url: Option<String>,
}

/// How the request ended up, for the access-log line in `proxy::handler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Bypassed(&'static str),
    Converted,
    NotModified,
    Failed(FailureKind),
}

pub struct LifecycleResult {
    pub response: Response<BoxBody>,
    pub outcome: Outcome,
}

/// Drive one upstream response through the full lifecycle.
pub async fn run_lifecycle(
    input: LifecycleInput<'_>,
    upstream: Response<Bytes>,
    config: &MarkdownConfig,
) -> LifecycleResult {
    let (parts, body) = upstream.into_parts();

    let accept = input
        .request_headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok());

    if negotiate::decide(accept, config.wildcard_accept) == NegotiationDecision::Skip {
        return bypass(parts, body, "negotiation");
    }

    let authenticated = auth::is_authenticated(input.request_headers, &config.auth_cookies);

    let eligibility_input = EligibilityInput {
        config,
        method: input.method.as_str(),
        request_headers: input.request_headers,
        upstream_status: parts.status.as_u16(),
        upstream_headers: &parts.headers,
        authenticated,
    };

    if let Eligibility::Ineligible(reason) = eligibility::check(&eligibility_input) {
        return bypass(parts, body, reason.as_str());
    }

    if !config.buffer_chunked && is_chunked(&parts.headers) {
        return bypass(parts, body, "streaming");
    }

    let content_type = parts
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();

    let mut accumulator = Accumulator::new(config.max_size, Some(body.len() as u64));
    if accumulator.append(&body).is_err() {
        return fail(parts, body, config, FailureKind::ResourceLimit);
    }
    let raw = accumulator.into_bytes();

    let compression = decompress::detect(
        parts
            .headers
            .get(http::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok()),
    );

    let html = match compression {
        Compression::None => raw,
        Compression::Unsupported => return bypass(parts, Bytes::from(raw), "unsupported_codec"),
        _ if !config.auto_decompress => return bypass(parts, Bytes::from(raw), "unsupported_codec"),
        kind => {
            metrics::counter!("decompressions_attempted").increment(1);
            match decompress::decompress(kind, &raw, config.max_size).await {
                Ok(inflated) => {
                    metrics::counter!("decompressions_succeeded").increment(1);
                    match kind {
                        Compression::Gzip => metrics::counter!("decompressions_gzip").increment(1),
                        Compression::Deflate => metrics::counter!("decompressions_deflate").increment(1),
                        Compression::Brotli => metrics::counter!("decompressions_brotli").increment(1),
                        _ => unreachable!(),
                    };
                    inflated
                }
                Err(kind) => {
                    metrics::counter!("decompressions_failed").increment(1);
                    return fail(parts, Bytes::from(raw), config, kind);
                }
            }
        }
    };

    metrics::counter!("input_bytes").increment(html.len() as u64);

    let options = ConversionOptions {
        flavor: config.flavor,
        timeout_ms: config.timeout_ms,
        generate_etag: config.etag,
        estimate_tokens: config.token_estimate,
        front_matter: config.front_matter,
        content_type,
        base_url: input.base_url,
    };

    let started = std::time::Instant::now();
    let artifact = match converter::handle().convert(&html, &options).await {
        Ok(artifact) => artifact,
        Err(err) => {
            return fail(parts, Bytes::from(html), config, err.failure_kind());
        }
    };
    metrics::counter!("conversion_time_sum_ms").increment(started.elapsed().as_millis() as u64);

    match conditional::evaluate(config.conditional_requests, input.request_headers, artifact.etag.as_deref()) {
        conditional::Outcome::NotModified => {
            metrics::counter!("conversions_attempted").increment(1);
            metrics::counter!("conversions_succeeded").increment(1);
            metrics::counter!("output_bytes").increment(artifact.markdown.len() as u64);
            LifecycleResult {
                response: not_modified_response(artifact.etag.as_deref()),
                outcome: Outcome::NotModified,
            }
        }
        conditional::Outcome::Proceed => {
            metrics::counter!("conversions_attempted").increment(1);
            metrics::counter!("conversions_succeeded").increment(1);
            metrics::counter!("output_bytes").increment(artifact.markdown.len() as u64);
            let suppress_body = input.method == Method::HEAD;
            LifecycleResult {
                response: converted_response(
                    parts.headers,
                    artifact,
                    config,
                    authenticated,
                    suppress_body,
                ),
                outcome: Outcome::Converted,
            }
        }
    }
}

/// `Transfer-Encoding: chunked` on the upstream response, checked against
/// `config.buffer_chunked` before the Accumulator is ever allocated — when
/// an operator has turned chunked buffering off, this gateway still sees
/// the body pre-collected by the host proxy layer (`proxy::handler`), but
/// honoring the directive here keeps the config surface meaningful rather
/// than silently ignored.
fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("chunked")))
        .unwrap_or(false)
}

fn bypass(parts: http::response::Parts, body: Bytes, reason: &'static str) -> LifecycleResult {
    metrics::counter!("conversions_bypassed").increment(1);
    tracing::debug!("markdown: bypassed, reason={}", reason);
    LifecycleResult {
        response: Response::from_parts(parts, full_body(body)),
        outcome: Outcome::Bypassed(reason),
    }
}

fn fail(
    parts: http::response::Parts,
    body: Bytes,
    config: &MarkdownConfig,
    kind: FailureKind,
) -> LifecycleResult {
    metrics::counter!("conversions_attempted").increment(1);
    metrics::counter!("conversions_failed").increment(1);
    metrics::counter!(format!("failures_{}", kind.metric_label())).increment(1);

    let disposition = failure::decide(kind, config.on_error);
    match (kind, disposition) {
        (FailureKind::System, _) => {
            tracing::error!("markdown: conversion failed, kind={:?}, disposition={:?}", kind, disposition)
        }
        _ => tracing::warn!("markdown: conversion failed, kind={:?}, disposition={:?}", kind, disposition),
    }

    let response = match disposition {
        Disposition::Passthrough => Response::from_parts(parts, full_body(body)),
        Disposition::RejectBadGateway => Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(full_body("upstream conversion failed"))
            .expect("static response is well-formed"),
    };

    LifecycleResult {
        response,
        outcome: Outcome::Failed(kind),
    }
}

fn not_modified_response(etag: Option<&str>) -> Response<BoxBody> {
    let mut builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    if let Some(etag) = etag {
        if let Ok(value) = HeaderValue::from_str(etag) {
            builder = builder.header(http::header::ETAG, value);
        }
    }
    builder = builder.header(http::header::VARY, "Accept");
    builder
        .body(empty_body())
        .expect("static response is well-formed")
}

fn converted_response(
    mut headers: HeaderMap,
    artifact: converter::ConversionArtifact,
    config: &MarkdownConfig,
    authenticated: bool,
    suppress_body: bool,
) -> Response<BoxBody> {
    headers.remove(http::header::CONTENT_ENCODING);
    headers.remove(http::header::ACCEPT_RANGES);

    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/markdown; charset=utf-8"),
    );
    headers.insert(
        http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&artifact.markdown.len().to_string())
            .expect("decimal length is a valid header value"),
    );

    merge_vary(&mut headers);

    match &artifact.etag {
        Some(etag) if config.etag => {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(http::header::ETAG, value);
            }
        }
        _ => {
            headers.remove(http::header::ETAG);
        }
    }

    if config.token_estimate {
        if let Some(tokens) = artifact.token_estimate {
            if let Ok(value) = HeaderValue::from_str(&tokens.to_string()) {
                headers.insert("x-markdown-tokens", value);
            }
        }
    }

    if authenticated {
        auth::finalize_cache_control(&mut headers);
    }

    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }

    let body = if suppress_body {
        empty_body()
    } else {
        full_body(artifact.markdown)
    };

    builder.body(body).expect("rewritten response is well-formed")
}

fn merge_vary(headers: &mut HeaderMap) {
    let existing = headers
        .get(http::header::VARY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned());

    let merged = match existing {
        None => "Accept".to_string(),
        Some(v) => {
            let already_present = v
                .split(',')
                .any(|tok| tok.trim().eq_ignore_ascii_case("accept"));
            if already_present {
                v
            } else {
                format!("{v}, Accept")
            }
        }
    };

    if let Ok(value) = HeaderValue::from_str(&merged) {
        headers.insert(http::header::VARY, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkdownConfig;

    fn config() -> MarkdownConfig {
        MarkdownConfig::default()
    }

    fn upstream(body: &str) -> Response<Bytes> {
        Response::builder()
            .status(200)
            .header("content-type", "text/html")
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    fn accept_markdown() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(http::header::ACCEPT, "text/markdown".parse().unwrap());
        h
    }

    #[tokio::test]
    async fn basic_success_converts() {
        let cfg = config();
        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let result = run_lifecycle(input, upstream("<h1>Hi</h1>"), &cfg).await;
        assert_eq!(result.outcome, Outcome::Converted);
        assert_eq!(result.response.status(), StatusCode::OK);
        assert_eq!(
            result.response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/markdown; charset=utf-8"
        );
        assert_eq!(result.response.headers().get(http::header::VARY).unwrap(), "Accept");
    }

    #[tokio::test]
    async fn no_accept_header_bypasses() {
        let cfg = config();
        let headers = HeaderMap::new();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let result = run_lifecycle(input, upstream("<h1>Hi</h1>"), &cfg).await;
        assert_eq!(result.outcome, Outcome::Bypassed("negotiation"));
        assert_eq!(
            result.response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
    }

    #[tokio::test]
    async fn explicit_rejection_despite_wildcard_bypasses() {
        let cfg = config();
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::ACCEPT,
            "*/*;q=1, text/markdown;q=0".parse().unwrap(),
        );
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let result = run_lifecycle(input, upstream("<h1>Hi</h1>"), &cfg).await;
        assert_eq!(result.outcome, Outcome::Bypassed("negotiation"));
    }

    #[tokio::test]
    async fn oversize_body_fails_open_by_default() {
        let mut cfg = config();
        cfg.max_size = 10;
        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let body = "<p>".to_string() + &"a".repeat(1000) + "</p>";
        let result = run_lifecycle(input, upstream(&body), &cfg).await;
        assert_eq!(result.outcome, Outcome::Failed(FailureKind::ResourceLimit));
        assert_eq!(result.response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversize_body_fails_closed_when_configured() {
        let mut cfg = config();
        cfg.max_size = 10;
        cfg.on_error = crate::config::OnError::Reject;
        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let body = "<p>".to_string() + &"a".repeat(1000) + "</p>";
        let result = run_lifecycle(input, upstream(&body), &cfg).await;
        assert_eq!(result.response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn head_request_suppresses_body() {
        let cfg = config();
        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::HEAD,
            request_headers: &headers,
            base_url: None,
        };
        let result = run_lifecycle(input, upstream("<h1>Hi</h1>"), &cfg).await;
        assert_eq!(result.outcome, Outcome::Converted);
        let length: u64 = result
            .response
            .headers()
            .get(http::header::CONTENT_LENGTH)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(length > 0);
    }

    #[tokio::test]
    async fn conditional_match_returns_304() {
        let cfg = config();
        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let first = run_lifecycle(input, upstream("<h1>Hi</h1>"), &cfg).await;
        let etag = first
            .response
            .headers()
            .get(http::header::ETAG)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let mut headers2 = accept_markdown();
        headers2.insert(http::header::IF_NONE_MATCH, etag.parse().unwrap());
        let input2 = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers2,
            base_url: None,
        };
        let second = run_lifecycle(input2, upstream("<h1>Hi</h1>"), &cfg).await;
        assert_eq!(second.outcome, Outcome::NotModified);
        assert_eq!(second.response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn authenticated_response_gets_private_cache_control() {
        let cfg = config();
        let mut headers = accept_markdown();
        headers.insert(http::header::AUTHORIZATION, "Bearer xyz".parse().unwrap());
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let mut upstream_resp = upstream("<h1>Hi</h1>");
        upstream_resp
            .headers_mut()
            .insert(http::header::CACHE_CONTROL, "public, max-age=3600".parse().unwrap());
        let result = run_lifecycle(input, upstream_resp, &cfg).await;
        let cache_control = result
            .response
            .headers()
            .get(http::header::CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cache_control.contains("private"));
        assert!(!cache_control.contains("public"));
    }

    #[tokio::test]
    async fn chunked_response_bypassed_when_buffer_chunked_disabled() {
        let mut cfg = config();
        cfg.buffer_chunked = false;
        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let mut upstream_resp = upstream("<h1>Hi</h1>");
        upstream_resp
            .headers_mut()
            .insert(http::header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        let result = run_lifecycle(input, upstream_resp, &cfg).await;
        assert_eq!(result.outcome, Outcome::Bypassed("streaming"));
    }

    #[tokio::test]
    async fn chunked_response_converted_when_buffer_chunked_enabled() {
        let cfg = config();
        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let mut upstream_resp = upstream("<h1>Hi</h1>");
        upstream_resp
            .headers_mut()
            .insert(http::header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        let result = run_lifecycle(input, upstream_resp, &cfg).await;
        assert_eq!(result.outcome, Outcome::Converted);
    }

    #[tokio::test]
    async fn gzip_bypassed_as_unsupported_when_auto_decompress_disabled() {
        use async_compression::tokio::write::GzipEncoder;
        use tokio::io::AsyncWriteExt;

        let mut cfg = config();
        cfg.auto_decompress = false;

        let mut enc = GzipEncoder::new(Vec::new());
        enc.write_all(b"<p>Hi</p>").await.unwrap();
        enc.shutdown().await.unwrap();
        let compressed = enc.into_inner();

        let headers = accept_markdown();
        let input = LifecycleInput {
            method: &Method::GET,
            request_headers: &headers,
            base_url: None,
        };
        let upstream_resp = Response::builder()
            .status(200)
            .header("content-type", "text/html")
            .header("content-encoding", "gzip")
            .body(Bytes::from(compressed))
            .unwrap();
        let result = run_lifecycle(input, upstream_resp, &cfg).await;
        assert_eq!(result.outcome, Outcome::Bypassed("unsupported_codec"));
        assert!(result.response.headers().get(http::header::CONTENT_ENCODING).is_some());
    }
}
