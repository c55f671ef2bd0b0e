use crate::error::GatewayError;
use crate::markdown::{self, LifecycleInput};
use crate::proxy::context::{BoxBody, RequestContext};
use crate::server::GatewayState;
use http::header::{
    ACCEPT, CONNECTION, CONTENT_TYPE, HOST, TRANSFER_ENCODING,
};
use http::{HeaderName, HeaderValue, Method};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::Request;
use hyper::Response;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn, Level};

/// Handle an incoming HTTP request:
///
/// 1. ROUTE_MATCH  — match host/uri/method against the compiled route table
/// 2. FORWARD      — sanitize and forward the request to the route's single
///                    upstream target, using the client built for that route
/// 3. LIFECYCLE     — hand the upstream response to the markdown filter
///                    (negotiation, eligibility, conversion) unless the
///                    response is plainly not a conversion candidate
/// 4. LOG           — finalize metrics and emit an access log line
pub async fn handle_request(
    req: Request<Incoming>,
    state: GatewayState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let uri_path = req.uri().path().to_string();
    let method = req.method().clone();

    let mut req_headers = req.headers().clone();

    // Determine the real client IP: trust an existing X-Forwarded-For
    // left-most entry if present (assumes a trusted reverse proxy in front),
    // otherwise fall back to the TCP peer address.
    let client_ip = req_headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok())
        .unwrap_or_else(|| peer_addr.ip());

    inject_forwarded_headers(&mut req_headers, peer_addr, &host);

    let mut ctx = RequestContext::new(host.clone(), uri_path.clone(), method.as_str().to_string(), client_ip);

    let Some(route) = state.routing.match_route(&host, &uri_path, method.as_str()) else {
        debug!("proxy: no route matched, host={}, uri={}", host, uri_path);
        return Ok(ctx.error_response(GatewayError::NoRouteMatch));
    };

    ctx.route_name = route.name.clone();
    ctx.upstream_addr = format!("{}:{}", route.upstream.host, route.upstream.port);
    ctx.route = Some(route.clone());

    metrics::gauge!(
        "gateway_http_requests_in_flight",
        "route" => ctx.route_name.clone(),
    )
    .increment(1.0);

    let Some(client) = state.clients.get(&route) else {
        warn!("proxy: no upstream client built for route={}", ctx.route_name);
        return Ok(ctx.error_response(GatewayError::NoUpstreamClient));
    };

    apply_host_header(&mut req_headers, &route.upstream);
    remove_hop_headers(&mut req_headers);

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());
    let upstream_uri = format!(
        "{}://{}:{}{}",
        route.upstream.scheme, route.upstream.host, route.upstream.port, path_and_query
    );

    let (parts, body) = req.into_parts();
    let mut builder = Request::builder().method(parts.method.clone()).uri(&upstream_uri);
    for (name, value) in req_headers.iter() {
        builder = builder.header(name, value);
    }
    let upstream_req = match builder.body(body.boxed()) {
        Ok(r) => r,
        Err(e) => {
            warn!("proxy: failed to build upstream request, route={}, error={}", ctx.route_name, e);
            return Ok(ctx.error_response(GatewayError::UpstreamBuild(e.to_string())));
        }
    };

    let upstream_start = Instant::now();
    ctx.upstream_start = Some(upstream_start);

    let upstream_resp = match client.request(upstream_req).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(
                "proxy: upstream request failed, route={}, upstream={}, error={}",
                ctx.route_name, upstream_uri, e
            );
            return Ok(ctx.error_response(GatewayError::UpstreamConnect(e.to_string())));
        }
    };

    let (resp_parts, resp_body) = upstream_resp.into_parts();

    let looks_convertible = matches!(method, Method::GET | Method::HEAD)
        && req_headers.contains_key(ACCEPT)
        && resp_parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(markdown::eligibility::is_text_html)
            .unwrap_or(false);

    if !looks_convertible {
        let resp = Response::from_parts(resp_parts, resp_body.boxed());
        let status = resp.status().as_u16();
        ctx.finalize_metrics(status);
        log_access(&ctx, status, None);
        return Ok(resp);
    }

    let collected = match resp_body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(
                "proxy: failed reading upstream body, route={}, error={}",
                ctx.route_name, e
            );
            return Ok(ctx.error_response(GatewayError::UpstreamConnect(e.to_string())));
        }
    };
    let upstream_response = Response::from_parts(resp_parts, collected);

    let scheme = req_headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let base_url = Some(format!("{scheme}://{host}{uri_path}"));

    let lifecycle_input = LifecycleInput {
        method: &method,
        request_headers: &req_headers,
        base_url,
    };

    let result = markdown::run_lifecycle(lifecycle_input, upstream_response, &route.markdown).await;

    let status = result.response.status().as_u16();
    ctx.finalize_metrics(status);
    log_access(&ctx, status, Some(result.outcome));

    Ok(result.response)
}

/// Access log line, emitted at the level the matched route's
/// `log_verbosity` directive names (default `info`) rather than a level
/// fixed at compile time, so a noisy route can be turned down (or up)
/// without touching the global `RUST_LOG` filter.
fn log_access(ctx: &RequestContext, status: u16, outcome: Option<markdown::Outcome>) {
    let level = ctx
        .route
        .as_ref()
        .map(|r| route_log_level(&r.markdown.log_verbosity))
        .unwrap_or(Level::INFO);

    let elapsed_ms = ctx.start.elapsed().as_millis();
    macro_rules! emit {
        ($macro:ident) => {
            match outcome {
                Some(outcome) => $macro!(
                    "proxy: served, route={}, method={}, uri={}, status={}, outcome={:?}, elapsed_ms={}",
                    ctx.route_name,
                    ctx.method,
                    ctx.uri_path,
                    status,
                    outcome,
                    elapsed_ms,
                ),
                None => $macro!(
                    "proxy: served, route={}, method={}, uri={}, status={}, elapsed_ms={}",
                    ctx.route_name,
                    ctx.method,
                    ctx.uri_path,
                    status,
                    elapsed_ms,
                ),
            }
        };
    }

    match level {
        Level::ERROR => emit!(error),
        Level::WARN => emit!(warn),
        Level::INFO => emit!(info),
        Level::DEBUG => emit!(debug),
        Level::TRACE => emit!(trace),
    }
}

/// Parse the `log_verbosity` config directive into a `tracing::Level`,
/// defaulting to `info` for an unrecognized or empty value rather than
/// erroring — an invalid directive degrades the access log, it doesn't
/// take down the route.
fn route_log_level(verbosity: &str) -> Level {
    match verbosity.trim().to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

fn apply_host_header(headers: &mut http::HeaderMap, target: &crate::routing::UpstreamTarget) {
    let host_value = match target.port {
        80 | 443 => target.host.clone(),
        port => format!("{}:{}", target.host, port),
    };
    if let Ok(v) = HeaderValue::from_str(&host_value) {
        headers.insert(HOST, v);
    }
}

fn remove_hop_headers(headers: &mut http::HeaderMap) {
    let hop_headers: &[HeaderName] = &[
        CONNECTION,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-authenticate"),
        HeaderName::from_static("proxy-authorization"),
        HeaderName::from_static("te"),
        HeaderName::from_static("trailers"),
        TRANSFER_ENCODING,
        HeaderName::from_static("upgrade"),
    ];

    for h in hop_headers {
        headers.remove(h);
    }
}

/// Inject standard `X-Forwarded-*` and `X-Real-IP` headers so upstream
/// services can identify the original client and protocol.
///
/// Behavior:
/// - `X-Forwarded-For`: append the TCP peer IP to any existing value
///   (comma-separated list per RFC 7239 semantics).
/// - `X-Forwarded-Proto`: trust the incoming value (e.g. set by a front ALB
///   after TLS termination), default to `http` only when absent — this
///   gateway does not terminate TLS itself.
/// - `X-Forwarded-Host`: set to the original `Host` header value.
/// - `X-Real-IP`: set to the TCP peer IP (always overwritten — represents
///   the immediate downstream hop).
fn inject_forwarded_headers(headers: &mut http::HeaderMap, peer_addr: SocketAddr, original_host: &str) {
    static XFF: HeaderName = HeaderName::from_static("x-forwarded-for");
    static XFP: HeaderName = HeaderName::from_static("x-forwarded-proto");
    static XFH: HeaderName = HeaderName::from_static("x-forwarded-host");
    static XRI: HeaderName = HeaderName::from_static("x-real-ip");

    let peer_ip = peer_addr.ip().to_string();

    if let Some(existing) = headers.get(&XFF).and_then(|v| v.to_str().ok()) {
        let mut combined = String::with_capacity(existing.len() + 2 + peer_ip.len());
        combined.push_str(existing);
        combined.push_str(", ");
        combined.push_str(&peer_ip);
        if let Ok(v) = HeaderValue::from_str(&combined) {
            headers.insert(XFF.clone(), v);
        }
    } else if let Ok(v) = HeaderValue::from_str(&peer_ip) {
        headers.insert(XFF.clone(), v);
    }

    if !headers.contains_key(&XFP) {
        headers.insert(XFP.clone(), HeaderValue::from_static("http"));
    }

    if !original_host.is_empty() {
        if let Ok(v) = HeaderValue::from_str(original_host) {
            headers.insert(XFH.clone(), v);
        }
    }

    if let Ok(v) = HeaderValue::from_str(&peer_ip) {
        headers.insert(XRI.clone(), v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_log_level_recognizes_known_directives() {
        assert_eq!(route_log_level("debug"), Level::DEBUG);
        assert_eq!(route_log_level("WARN"), Level::WARN);
        assert_eq!(route_log_level("trace"), Level::TRACE);
        assert_eq!(route_log_level("error"), Level::ERROR);
    }

    #[test]
    fn route_log_level_defaults_to_info() {
        assert_eq!(route_log_level("info"), Level::INFO);
        assert_eq!(route_log_level(""), Level::INFO);
        assert_eq!(route_log_level("garbage"), Level::INFO);
    }
}
