#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use markdown_gateway::server;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "markdown-gateway", about = "HTML-to-Markdown content-negotiating response filter")]
struct Cli {
    /// Path to gateway config file
    #[arg(short, long, env = "MDGW_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Listen address for the proxy (client-facing) listener
    #[arg(short, long, env = "MDGW_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Admin API listen address (health/readiness/metrics)
    #[arg(long, env = "MDGW_ADMIN_LISTEN", default_value = "0.0.0.0:9091")]
    admin_listen: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let worker_threads = server::runtime::get_container_cpu_limit();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        listen: cli.listen,
        admin_listen: cli.admin_listen,
    }))
}
