//! Login UI Operator - reconcile the login UI workload against a host document

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;

use login_ui_operator::controller::reconcile;
use login_ui_operator::host::{Host, HostState};
use login_ui_operator::integrations::Dependencies;
use login_ui_operator::layer::{render_layer, LayerInputs};
use login_ui_operator::telemetry::{init_logging, LogFormat};
use login_ui_operator::COOKIES_KEY;

/// Login UI Operator - keeps the identity platform login UI configured
#[derive(Parser, Debug)]
#[command(name = "login-ui-operator", version, about, long_about = None)]
struct Cli {
    /// Path to the host state document
    #[arg(long, global = true, env = "LOGIN_UI_STATE", default_value = "host-state.yaml")]
    state: PathBuf,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the layer the current state would produce, without applying it
    ///
    /// Requires the cookie key to already be in the peer store.
    Render,

    /// Run one reconciliation pass and write the result back to the state file
    Reconcile,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format)?;

    match cli.command {
        Commands::Render => run_render(&cli.state),
        Commands::Reconcile => run_reconcile(&cli.state).await,
    }
}

fn run_render(path: &std::path::Path) -> anyhow::Result<()> {
    let state = HostState::load(path)?;
    let config = state.config.clone();
    let cookie_key = state
        .peer_data()
        .and_then(|peer| peer.get(COOKIES_KEY))
        .cloned()
        .context("cookie key has not been provisioned yet; run reconcile on the leader first")?;

    let host = Host::new(state);
    let dependencies = Dependencies::load(host.as_ref());
    let layer = render_layer(LayerInputs {
        config: &config,
        cookie_key: &cookie_key,
        dependencies: &dependencies,
    });

    print!("{}", layer.to_yaml()?);
    Ok(())
}

async fn run_reconcile(path: &std::path::Path) -> anyhow::Result<()> {
    let host = Host::new(HostState::load(path)?);
    let ctx = host.context();

    let outcome = reconcile(&ctx).await;
    info!(status = ?outcome.status, action = ?outcome.action, "reconciliation pass finished");

    host.record(&outcome);
    let state = host.snapshot();
    state
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("{}", serde_yaml::to_string(&state.applied)?);
    Ok(())
}
