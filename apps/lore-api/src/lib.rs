pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf};

use axum::Router;
use clap::Parser;
use color_eyre::eyre;
use tokio::net::TcpListener;

use crate::state::AppState;
use lore_config::Config;

#[derive(Debug, Parser)]
#[command(
	version = lore_cli::VERSION,
	rename_all = "kebab",
	styles = lore_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

/// Listen addresses for the public and admin routers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binds {
	pub http: SocketAddr,
	pub admin: SocketAddr,
}
impl Binds {
	/// Admin routes rebuild the corpus, so they only ever listen on loopback.
	/// The public router may leave loopback once `bind_localhost_only` is off.
	pub fn from_config(config: &Config) -> color_eyre::Result<Self> {
		let http = parse_bind("http_bind", &config.service.http_bind)?;
		let admin = parse_bind("admin_bind", &config.service.admin_bind)?;

		if config.security.bind_localhost_only && !http.ip().is_loopback() {
			return Err(eyre::eyre!(
				"http_bind {http} must be a loopback address when bind_localhost_only is true."
			));
		}
		if !admin.ip().is_loopback() {
			return Err(eyre::eyre!("admin_bind {admin} must be a loopback address."));
		}
		if http.port() != 0 && http == admin {
			return Err(eyre::eyre!("http_bind and admin_bind must differ; both are {http}."));
		}

		Ok(Self { http, admin })
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lore_config::load(&args.config)?;

	lore_cli::init_tracing(&config.service.log_level);

	let binds = Binds::from_config(&config)?;
	let state = AppState::new(config).await?;

	tracing::info!(
		chunk_count = state.service.corpus.snapshot().len(),
		tool_count = state.service.tools().len(),
		"Corpus loaded."
	);

	tokio::try_join!(
		serve("public", binds.http, routes::router(state.clone())),
		serve("admin", binds.admin, routes::admin_router(state)),
	)?;

	Ok(())
}

async fn serve(name: &'static str, addr: SocketAddr, app: Router) -> color_eyre::Result<()> {
	let listener = TcpListener::bind(addr).await?;

	tracing::info!(server = name, addr = %listener.local_addr()?, "Server listening.");

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	tracing::info!(server = name, "Server stopped.");

	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for the shutdown signal.");

		std::future::pending::<()>().await;
	}
}

fn parse_bind(field: &str, raw: &str) -> color_eyre::Result<SocketAddr> {
	raw.parse().map_err(|err| eyre::eyre!("{field} {raw:?} is not a socket address: {err}."))
}
