//! Single-target upstream forwarding. No fan-out, retry, or failover: one
//! `hyper_util::client::legacy::Client` per route, built once at route-compile
//! time and reused for every request that route handles.

use crate::proxy::context::BoxBody;
use crate::routing::{CompiledRoute, RouteTable, UpstreamTarget};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A rustls `ServerCertVerifier` that accepts any certificate without
/// validation. Used when a route's `tls_verify` is `false` — internal
/// traffic where encryption is desired but upstream identity verification
/// is not.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, BoxBody>;

/// Build a client for one route's upstream target. HTTP/2 is negotiated via
/// ALPN over TLS; plain `http://` targets stay on HTTP/1.1.
pub fn build_client(target: &UpstreamTarget) -> UpstreamClient {
    let mut http = HttpConnector::new();
    http.set_nodelay(true);
    http.set_connect_timeout(Some(Duration::from_secs_f64(target.connect_timeout_secs)));
    http.enforce_http(false);

    let https = if target.tls_verify {
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http)
    } else {
        let tls_config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth();

        hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http)
    };

    Client::builder(TokioExecutor::new()).build(https)
}

/// One `UpstreamClient` per compiled route, built once when the route table
/// is compiled and reused for the process lifetime. Routes never mutate
/// after startup, so keying on the `Arc`'s address is stable for as long
/// as the `RouteTable` that produced it is alive.
pub struct ClientCache {
    clients: HashMap<usize, UpstreamClient>,
}

impl ClientCache {
    pub fn build(table: &RouteTable) -> Self {
        let mut clients = HashMap::new();
        for route in table.all_routes() {
            let key = Arc::as_ptr(route) as usize;
            clients.entry(key).or_insert_with(|| build_client(&route.upstream));
        }
        Self { clients }
    }

    pub fn get(&self, route: &Arc<CompiledRoute>) -> Option<&UpstreamClient> {
        self.clients.get(&(Arc::as_ptr(route) as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client_for_plain_http_target() {
        let target = UpstreamTarget {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            tls_verify: true,
            connect_timeout_secs: 6.0,
        };
        let _client = build_client(&target);
    }

    #[test]
    fn builds_client_with_tls_verify_disabled() {
        let target = UpstreamTarget {
            scheme: "https".to_string(),
            host: "internal.example".to_string(),
            port: 443,
            tls_verify: false,
            connect_timeout_secs: 3.0,
        };
        let _client = build_client(&target);
    }
}
