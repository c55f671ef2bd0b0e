use super::GatewayState;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::net::SocketAddr;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Crude but adequate Accept-based preference check for the admin surface:
/// JSON wins only when it appears earlier in the header than plain text.
/// This endpoint doesn't need the filter's own q-value negotiation machinery.
fn wants_json(req: &Request<Incoming>) -> bool {
    req.headers()
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| {
            let json_pos = accept.find("application/json");
            let text_pos = accept.find("text/plain");
            match (json_pos, text_pos) {
                (Some(j), Some(t)) => j < t,
                (Some(_), None) => true,
                _ => false,
            }
        })
        .unwrap_or(false)
}

pub fn handle_admin(
    req: Request<Incoming>,
    state: GatewayState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let path = req.uri().path();

    // Access to the metrics surface is restricted to loopback — it carries
    // per-route cardinality an operator may not want exposed beyond the host.
    if path == "/metrics" && !peer_addr.ip().is_loopback() {
        return Ok(Response::builder()
            .status(403)
            .header("content-type", "application/json")
            .body(full_body(r#"{"error":"forbidden"}"#))
            .unwrap());
    }

    match path {
        "/health" | "/healthz" => Ok(Response::builder()
            .status(200)
            .body(full_body(r#"{"status":"ok"}"#))
            .unwrap()),

        "/ready" | "/readyz" => {
            let body = format!(
                r#"{{"status":"ready","domains":{},"total_routes":{}}}"#,
                state.config.domains.len(),
                state.routing.route_count(),
            );
            Ok(Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(full_body(body))
                .unwrap())
        }

        "/metrics" => {
            if wants_json(&req) {
                let body = render_metrics_json(&state.metrics.render());
                Ok(Response::builder()
                    .status(200)
                    .header("content-type", "application/json")
                    .body(full_body(body))
                    .unwrap())
            } else {
                Ok(Response::builder()
                    .status(200)
                    .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
                    .body(full_body(state.metrics.render()))
                    .unwrap())
            }
        }

        "/domains" => {
            let domains: Vec<serde_json::Value> = state
                .config
                .domains
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "hosts": d.hosts,
                        "routes": d.routes.iter().map(|r| {
                            serde_json::json!({
                                "name": r.name,
                                "uri": r.uri,
                                "methods": r.methods,
                                "priority": r.priority,
                                "upstream": format!("{}://{}:{}", r.upstream.scheme, r.upstream.host, r.upstream.port),
                                "enabled": r.status == 1,
                            })
                        }).collect::<Vec<_>>(),
                    })
                })
                .collect();

            let body = serde_json::to_string_pretty(&domains).unwrap_or_default();
            Ok(Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(full_body(body))
                .unwrap())
        }

        "/routes" => {
            let routes: Vec<serde_json::Value> = state
                .routing
                .all_routes()
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "name": r.name,
                        "uri": r.uri,
                        "priority": r.priority,
                        "methods": r.methods,
                        "upstream": format!("{}://{}:{}", r.upstream.scheme, r.upstream.host, r.upstream.port),
                    })
                })
                .collect();

            let body = serde_json::to_string_pretty(&routes).unwrap_or_default();
            Ok(Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(full_body(body))
                .unwrap())
        }

        _ => Ok(Response::builder()
            .status(404)
            .body(full_body(r#"{"error":"not found"}"#))
            .unwrap()),
    }
}

/// Parse the rendered Prometheus exposition text into a flat JSON object.
/// `HELP`/`TYPE` comment lines and label sets are dropped — this is meant
/// for quick inspection, not as a faithful OpenMetrics-to-JSON transform.
fn render_metrics_json(prometheus_text: &str) -> String {
    let mut out = serde_json::Map::new();
    for line in prometheus_text.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let Some((name_and_labels, value)) = line.rsplit_once(' ') else {
            continue;
        };
        let name = name_and_labels.split('{').next().unwrap_or(name_and_labels);
        if let Ok(v) = value.parse::<f64>() {
            out.insert(name.to_string(), serde_json::json!(v));
        }
    }
    serde_json::to_string_pretty(&serde_json::Value::Object(out)).unwrap_or_default()
}
