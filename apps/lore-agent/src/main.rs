use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = lore_agent::Args::parse();

	lore_agent::run(args).await
}
