pub mod neighborhood;
pub mod properties;
pub mod search;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use finca_config::{Config, EmbeddingProviderConfig};
use finca_storage::{db::Db, models::NeighborhoodRecord, qdrant::{IndexFilter, QdrantStore}};
pub use properties::{GeoJsonRequest, PropertiesResponse};
pub use search::{SearchRequest, SearchResponse};

pub type ServiceResult<T> = Result<T, ServiceError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}

impl From<finca_storage::Error> for ServiceError {
	fn from(err: finca_storage::Error) -> Self {
		match err {
			finca_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			finca_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			finca_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn query<'a>(
		&'a self,
		vector: Vec<f32>,
		filter: Option<&'a IndexFilter>,
		limit: u64,
	) -> BoxFuture<'a, finca_storage::Result<Vec<(Map<String, Value>, f32)>>>;

	fn scan<'a>(
		&'a self,
		filter: Option<&'a IndexFilter>,
		limit: u32,
	) -> BoxFuture<'a, finca_storage::Result<Vec<Map<String, Value>>>>;
}

pub trait NeighborhoodCatalog
where
	Self: Send + Sync,
{
	fn find<'a>(
		&'a self,
		text: &'a str,
	) -> BoxFuture<'a, finca_storage::Result<Option<NeighborhoodRecord>>>;

	fn list<'a>(&'a self) -> BoxFuture<'a, finca_storage::Result<Vec<NeighborhoodRecord>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub index: Arc<dyn VectorIndex>,
	pub catalog: Arc<dyn NeighborhoodCatalog>,
}

pub struct FincaService {
	pub cfg: Config,
	pub providers: Providers,
	/// Process-wide neighborhood name/slug cache, populated once per process
	/// lifetime. Redeployment is the supported refresh mechanism.
	pub(crate) catalog_names: OnceCell<Vec<String>>,
}

struct DefaultEmbedding;

struct QdrantIndex {
	store: QdrantStore,
}

struct PostgresCatalog {
	db: Arc<Db>,
}

impl EmbeddingProvider for DefaultEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(finca_providers::embedding::embed(cfg, text))
	}
}

impl VectorIndex for QdrantIndex {
	fn query<'a>(
		&'a self,
		vector: Vec<f32>,
		filter: Option<&'a IndexFilter>,
		limit: u64,
	) -> BoxFuture<'a, finca_storage::Result<Vec<(Map<String, Value>, f32)>>> {
		Box::pin(self.store.query(vector, filter, limit))
	}

	fn scan<'a>(
		&'a self,
		filter: Option<&'a IndexFilter>,
		limit: u32,
	) -> BoxFuture<'a, finca_storage::Result<Vec<Map<String, Value>>>> {
		Box::pin(self.store.scan(filter, limit))
	}
}

impl NeighborhoodCatalog for PostgresCatalog {
	fn find<'a>(
		&'a self,
		text: &'a str,
	) -> BoxFuture<'a, finca_storage::Result<Option<NeighborhoodRecord>>> {
		Box::pin(finca_storage::queries::find_neighborhood(&self.db, text))
	}

	fn list<'a>(&'a self) -> BoxFuture<'a, finca_storage::Result<Vec<NeighborhoodRecord>>> {
		Box::pin(finca_storage::queries::list_neighborhoods(&self.db))
	}
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		index: Arc<dyn VectorIndex>,
		catalog: Arc<dyn NeighborhoodCatalog>,
	) -> Self {
		Self { embedding, index, catalog }
	}
}

impl FincaService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		let providers = Providers {
			embedding: Arc::new(DefaultEmbedding),
			index: Arc::new(QdrantIndex { store: qdrant }),
			catalog: Arc::new(PostgresCatalog { db: Arc::new(db) }),
		};

		Self::with_providers(cfg, providers)
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		Self { cfg, providers, catalog_names: OnceCell::new() }
	}
}
