use std::sync::Arc;

use finca_service::FincaService;
use finca_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<FincaService>,
}
impl AppState {
	pub async fn new(config: finca_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;
		let service = FincaService::new(config, db, qdrant);

		Ok(Self { service: Arc::new(service) })
	}
}
