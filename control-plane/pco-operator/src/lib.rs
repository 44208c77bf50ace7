pub mod bridge;
pub mod cluster;
pub mod config;
pub mod context;
pub mod controller;
pub mod crd;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod kinds;
pub mod manifests;
pub mod normalize;
pub mod pipeline;
pub mod routing;
pub mod runtime;
pub mod templates;
pub mod upsert;
pub mod web;

use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

pub use error::ReconcileErr;

pub fn init_tracing(default_env: &str) {
    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy()
        .add_directive(
            default_env
                .parse()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        );

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
