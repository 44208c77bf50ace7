use std::net::SocketAddr;
use std::sync::Arc;

use kube::Client;
use tokio::{task::JoinHandle, try_join};

use crate::{
    bridge::{CommandBridge, KubectlKcpBridge},
    config::PcoConfig,
    context::KubeContextResolver,
    controller::run_controller,
    pipeline::Pipeline,
    web::run_http_server,
};

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &PcoConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

pub fn build_pipeline(client: Client, cfg: PcoConfig) -> Pipeline {
    let bridge: Arc<dyn CommandBridge> =
        Arc::new(KubectlKcpBridge::new(cfg.kubectl_bin.clone()));
    let resolver = Arc::new(KubeContextResolver::new(client, bridge.clone()));
    Pipeline::new(resolver, bridge, cfg)
}

/// Spawn the Kubernetes controller loop.
pub fn spawn_controller(
    client: Client,
    pipeline: Arc<Pipeline>,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controller(client, pipeline).await })
}

pub fn spawn_http(addr: SocketAddr) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_http_server(addr).await })
}

/// Start the controller and the health endpoint and wait for both.
pub async fn run_all(client: Client, cfg: PcoConfig) -> anyhow::Result<()> {
    let http_addr = compute_http_addr(&cfg);
    let pipeline = Arc::new(build_pipeline(client.clone(), cfg));

    let controller = spawn_controller(client, pipeline);
    let http = spawn_http(http_addr);

    let (c_res, h_res) = try_join!(controller, http)?;
    c_res?;
    h_res?;
    Ok(())
}
