use crate::config::GatewayConfig;
use crate::metrics::Metrics;
use crate::routing::RouteTable;
use crate::upstream::ClientCache;
use anyhow::Result;
use std::sync::Arc;

/// Shared, read-only gateway state built once at startup from the resolved
/// configuration. Configuration-file parsing and directive inheritance
/// (global -> virtual-host -> location) happen once in `RouteTable::new`;
/// there is no hot-reload path, so every field here is a plain `Arc`
/// snapshot rather than an `ArcSwap`.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub metrics: Metrics,
    pub routing: Arc<RouteTable>,
    pub clients: Arc<ClientCache>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let routing = RouteTable::new(&config.domains, &config.markdown);
        let clients = ClientCache::build(&routing);
        let metrics = Metrics::install();
        metrics::gauge!("gateway_config_routes_total").set(routing.route_count() as f64);

        Ok(Self {
            config: Arc::new(config),
            metrics,
            routing: Arc::new(routing),
            clients: Arc::new(clients),
        })
    }
}
