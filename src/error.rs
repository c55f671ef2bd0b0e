use http::StatusCode;
use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    NoRouteMatch,
    NoUpstreamClient,
    UpstreamConnect(String),
    UpstreamBuild(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::NoRouteMatch => write!(f, "no route matched"),
            GatewayError::NoUpstreamClient => write!(f, "no upstream client built for route"),
            GatewayError::UpstreamConnect(msg) => write!(f, "upstream connect error: {}", msg),
            GatewayError::UpstreamBuild(msg) => write!(f, "failed to build upstream request: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    /// The downstream status/message pair for this error, used by
    /// `proxy::handler` as the single place that turns a typed failure into
    /// a client-visible response.
    pub fn response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::NoRouteMatch => (StatusCode::NOT_FOUND, "not found"),
            GatewayError::NoUpstreamClient => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
            GatewayError::UpstreamConnect(_) | GatewayError::UpstreamBuild(_) => {
                (StatusCode::BAD_GATEWAY, "bad gateway")
            }
        }
    }
}
