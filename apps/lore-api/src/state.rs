use std::sync::Arc;

use lore_config::Config;
use lore_service::LoreService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LoreService>,
}
impl AppState {
	/// Loads the corpus named in `config` and wires the HTTP-backed providers.
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let service = LoreService::new(config).await?;

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: LoreService) -> Self {
		Self { service: Arc::new(service) }
	}
}
