//! Binary entry point: loads config, wires the upstream pool, backend,
//! policy and verifier into a `ProxyState`, and spawns the independent
//! tasks of spec.md §5's concurrency model.

mod cli;
mod config;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

use stratum_payouts::PayoutEngine;
use stratum_pow::{EthashVerifier, PowVerifier};
use stratum_proxy_core::{health, server, NullPolicy, Policy, ProxyState};
use stratum_rpc::{RpcClient, SharedUpstream, UpstreamPool};
use stratum_storage::{MemoryBackend, SharedBackend};

use cli::Cli;
use config::RootConfig;

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).init();
}

fn load_config(path: &std::path::Path) -> eyre::Result<RootConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, starting from defaults");
        return Ok(RootConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

fn build_pool(config: &RootConfig) -> UpstreamPool {
    let clients: Vec<SharedUpstream> = config
        .upstreams
        .iter()
        .map(|u| Arc::new(RpcClient::new(u.name.clone(), u.url.clone(), u.timeout)) as SharedUpstream)
        .collect();
    UpstreamPool::new(clients)
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let config = load_config(&cli.config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config, cli.metrics_listen))
}

/// Installs the process-wide `metrics` recorder and returns a handle that
/// renders the current snapshot in the Prometheus text format.
fn install_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new().install_recorder().expect("metrics recorder installs exactly once at startup")
}

async fn serve_metrics(addr: String, handle: PrometheusHandle) -> std::io::Result<()> {
    let app = Router::new().route("/metrics", get(render_metrics)).with_state(handle);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "metrics endpoint listening");
    axum::serve(listener, app).await
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

async fn run(config: RootConfig, metrics_listen: String) -> eyre::Result<()> {
    let metrics_handle = install_metrics_recorder();
    let metrics_task = tokio::spawn(async move { serve_metrics(metrics_listen, metrics_handle).await });

    let pool = build_pool(&config);
    let backend: SharedBackend = Arc::new(MemoryBackend::new());
    let policy: Arc<dyn Policy> = Arc::new(NullPolicy);
    let verifier: Arc<dyn PowVerifier> = Arc::new(EthashVerifier::new());

    let state = Arc::new(ProxyState::new(config.proxy.clone(), pool, Arc::clone(&backend), policy, verifier));

    spawn_template_refresh(Arc::clone(&state));
    spawn_upstream_health_check(Arc::clone(&state));
    spawn_node_state_heartbeat(Arc::clone(&state), Arc::clone(&backend));

    let resolve_mode = std::env::var("RESOLVE_PAYOUT")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let payout_engine = PayoutEngine::new(config.payouts.clone(), Arc::clone(&backend), state.pool.active());

    let http_state = Arc::clone(&state);
    let http_task = tokio::spawn(async move { server::http::serve(http_state).await });

    let stratum_state = Arc::clone(&state);
    let stratum_task = tokio::spawn(async move { server::stratum::serve(stratum_state).await });

    let payout_task = tokio::spawn(async move { payout_engine.run(resolve_mode).await });

    tokio::select! {
        result = http_task => { result??; }
        result = stratum_task => { result??; }
        result = payout_task => { result??; }
        result = metrics_task => { result??; }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

/// Template refresh timer: spec.md §4.3/§5, task (a).
fn spawn_template_refresh(state: Arc<ProxyState>) {
    let interval = state.config.block_refresh_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let upstream = state.pool.active();
            state.templates.refresh(&upstream, Some(&state.sessions)).await;
        }
    });
}

/// Upstream health-check timer: spec.md §4.2/§5, task (b).
fn spawn_upstream_health_check(state: Arc<ProxyState>) {
    let interval = state.config.upstream_check_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.pool.refresh().await;
        }
    });
}

/// Node-state heartbeat: SPEC_FULL.md §2, task (c).
fn spawn_node_state_heartbeat(state: Arc<ProxyState>, backend: SharedBackend) {
    let interval = state.config.state_update_interval;
    let name = state.config.name.clone();
    let sick = Arc::clone(&state.sick);
    tokio::spawn(health::run_node_state_heartbeat(
        sick,
        backend,
        name,
        move || match state.templates.current() {
            Some(template) => (template.height, template.network_difficulty),
            None => (0, 0),
        },
        interval,
    ));
}
