pub mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use anyhow::Result;
use std::path::Path;

impl GatewayConfig {
    /// Load configuration from a file (if it exists). When the file does not
    /// exist, built-in defaults are used — allowing the gateway to start with
    /// zero configuration for local development.
    pub fn load(path: &Path) -> Result<Self> {
        let config: GatewayConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            GatewayConfig::default()
        };

        config.validate()?;
        tracing::info!("loaded gateway configuration, domains={}", config.domains.len());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for domain in &self.domains {
            if domain.hosts.is_empty() {
                anyhow::bail!("domain '{}' has no hosts", domain.name);
            }
            for route in &domain.routes {
                if route.uri.is_empty() {
                    anyhow::bail!("route '{}' in domain '{}' has empty uri", route.name, domain.name);
                }
                if route.upstream.host.is_empty() {
                    anyhow::bail!(
                        "route '{}' in domain '{}' has no upstream host",
                        route.name,
                        domain.name
                    );
                }
            }
        }
        Ok(())
    }
}
