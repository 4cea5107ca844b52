//! End-to-end retrieval tests against in-memory collaborators.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use finca_config::{
	Config, EmbeddingProviderConfig, Postgres, Providers as ProvidersConfig, Qdrant, Search,
	Service, Storage,
};
use finca_service::{
	BoxFuture, EmbeddingProvider, FincaService, GeoJsonRequest, NeighborhoodCatalog, Providers,
	SearchRequest, ServiceError, VectorIndex,
};
use finca_storage::{
	models::NeighborhoodRecord,
	qdrant::{FieldCondition, IndexFilter},
};

const DIM: u32 = 3;

fn config(with_embedding: bool) -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "warn".to_string() },
		storage: Storage {
			postgres: Postgres {
				dsn: "postgres://localhost/finca".to_string(),
				pool_max_conns: 1,
			},
			qdrant: Qdrant {
				url: "http://localhost:6334".to_string(),
				collection: "propertiesV3".to_string(),
				vector_dim: DIM,
			},
		},
		providers: ProvidersConfig {
			embedding: with_embedding.then(|| EmbeddingProviderConfig {
				provider_id: "openai".to_string(),
				api_base: "http://localhost:0".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "text-embedding-3-small".to_string(),
				dimensions: DIM,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			}),
		},
		search: Search::default(),
	}
}

struct FakeEmbedding {
	fail: bool,
}

impl EmbeddingProvider for FakeEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_text: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(async move {
			if self.fail {
				Err(color_eyre::eyre::eyre!("quota exceeded"))
			} else {
				Ok(vec![0.1, 0.2, 0.3])
			}
		})
	}
}

struct FakeIndex {
	payloads: Vec<Map<String, Value>>,
	fail: bool,
}

impl FakeIndex {
	fn matching(&self, filter: Option<&IndexFilter>, limit: usize) -> Vec<Map<String, Value>> {
		self.payloads
			.iter()
			.filter(|payload| filter.map(|filter| filter.matches(payload)).unwrap_or(true))
			.take(limit)
			.cloned()
			.collect()
	}
}

impl VectorIndex for FakeIndex {
	fn query<'a>(
		&'a self,
		_vector: Vec<f32>,
		filter: Option<&'a IndexFilter>,
		limit: u64,
	) -> BoxFuture<'a, finca_storage::Result<Vec<(Map<String, Value>, f32)>>> {
		Box::pin(async move {
			if self.fail {
				return Err(finca_storage::Error::InvalidArgument(
					"index unavailable".to_string(),
				));
			}

			let hits = self
				.matching(filter, limit as usize)
				.into_iter()
				.enumerate()
				.map(|(rank, payload)| (payload, 1.0 - rank as f32 * 0.01))
				.collect();

			Ok(hits)
		})
	}

	fn scan<'a>(
		&'a self,
		filter: Option<&'a IndexFilter>,
		limit: u32,
	) -> BoxFuture<'a, finca_storage::Result<Vec<Map<String, Value>>>> {
		Box::pin(async move {
			if self.fail {
				return Err(finca_storage::Error::InvalidArgument(
					"index unavailable".to_string(),
				));
			}

			Ok(self.matching(filter, limit as usize))
		})
	}
}

/// Index that rejects any scan carrying a latitude range, standing in for a
/// collection whose coordinate fields are not indexed.
struct GeoFailingIndex {
	payloads: Vec<Map<String, Value>>,
}

fn has_latitude_range(filter: Option<&IndexFilter>) -> bool {
	filter
		.map(|filter| {
			filter.must.iter().any(|condition| {
				matches!(condition, FieldCondition::Between { key, .. } if key == "latitude")
			})
		})
		.unwrap_or(false)
}

impl VectorIndex for GeoFailingIndex {
	fn query<'a>(
		&'a self,
		_vector: Vec<f32>,
		_filter: Option<&'a IndexFilter>,
		_limit: u64,
	) -> BoxFuture<'a, finca_storage::Result<Vec<(Map<String, Value>, f32)>>> {
		Box::pin(async move {
			Err(finca_storage::Error::InvalidArgument("index unavailable".to_string()))
		})
	}

	fn scan<'a>(
		&'a self,
		filter: Option<&'a IndexFilter>,
		limit: u32,
	) -> BoxFuture<'a, finca_storage::Result<Vec<Map<String, Value>>>> {
		Box::pin(async move {
			if has_latitude_range(filter) {
				return Err(finca_storage::Error::InvalidArgument(
					"latitude is not indexed".to_string(),
				));
			}

			Ok(self
				.payloads
				.iter()
				.filter(|payload| filter.map(|filter| filter.matches(payload)).unwrap_or(true))
				.take(limit as usize)
				.cloned()
				.collect())
		})
	}
}

struct FakeCatalog {
	records: Vec<NeighborhoodRecord>,
}

impl NeighborhoodCatalog for FakeCatalog {
	fn find<'a>(
		&'a self,
		text: &'a str,
	) -> BoxFuture<'a, finca_storage::Result<Option<NeighborhoodRecord>>> {
		Box::pin(async move {
			let needle = text.to_lowercase();
			let by_name = self
				.records
				.iter()
				.find(|record| record.name.to_lowercase().contains(&needle));
			let matched = by_name.or_else(|| {
				self.records.iter().find(|record| record.slug.to_lowercase().contains(&needle))
			});

			Ok(matched.cloned())
		})
	}

	fn list<'a>(&'a self) -> BoxFuture<'a, finca_storage::Result<Vec<NeighborhoodRecord>>> {
		Box::pin(async move { Ok(self.records.clone()) })
	}
}

fn playa_grande() -> NeighborhoodRecord {
	NeighborhoodRecord {
		neighborhood_id: Uuid::new_v4(),
		name: "Playa Grande".to_string(),
		slug: "playa-grande".to_string(),
		min_lat: Some(-38.05),
		max_lat: Some(-38.00),
		min_lon: Some(-57.60),
		max_lon: Some(-57.50),
		created_at: OffsetDateTime::UNIX_EPOCH,
	}
}

fn payload(value: Value) -> Map<String, Value> {
	let Value::Object(map) = value else {
		panic!("payload must be an object");
	};

	map
}

fn service(
	cfg: Config,
	embedding_fails: bool,
	index: impl VectorIndex + 'static,
	records: Vec<NeighborhoodRecord>,
) -> FincaService {
	FincaService::with_providers(
		cfg,
		Providers::new(
			Arc::new(FakeEmbedding { fail: embedding_fails }),
			Arc::new(index),
			Arc::new(FakeCatalog { records }),
		),
	)
}

fn request(query: &str) -> SearchRequest {
	SearchRequest { query: query.to_string(), filters: Map::new(), limit: None }
}

fn ids(values: &[Value]) -> Vec<&str> {
	values.iter().filter_map(|value| value["id"].as_str()).collect()
}

#[tokio::test]
async fn embedding_search_returns_filtered_scored_listings() {
	let index = FakeIndex {
		payloads: vec![
			payload(json!({
				"id": "pg-2amb",
				"title": "Depto 2 ambientes en Playa Grande",
				"property_type": "departamento",
				"ambientes": 2,
				"neighborhood": "Playa Grande",
				"latitude": -38.02,
				"longitude": -57.55,
			})),
			payload(json!({
				"id": "centro-casa",
				"title": "Casa en Centro",
				"property_type": "casa",
				"bedrooms": 3,
				"latitude": -38.00,
				"longitude": -57.54,
			})),
		],
		fail: false,
	};
	let service = service(config(true), false, index, vec![playa_grande()]);
	let response = service
		.search(request("depto 2 ambientes en Playa Grande"))
		.await
		.expect("search should succeed");

	assert_eq!(ids(&response.properties), vec!["pg-2amb"]);
	assert!(response.alternatives.is_none());
	assert!(response.message.is_none());
}

#[tokio::test]
async fn provider_failure_matches_direct_fallback_scan() {
	let payloads = vec![
		payload(json!({
			"id": "match",
			"title": "Depto con cochera",
			"property_type": "departamento",
			"bedrooms": 2,
		})),
		payload(json!({
			"id": "other",
			"title": "Local comercial",
			"property_type": "local",
		})),
	];
	let broken_provider = service(
		config(true),
		true,
		FakeIndex { payloads: payloads.clone(), fail: false },
		Vec::new(),
	);
	let no_provider = service(
		config(false),
		false,
		FakeIndex { payloads, fail: false },
		Vec::new(),
	);
	let from_fallback = broken_provider
		.search(request("depto con cochera"))
		.await
		.expect("fallback should absorb the provider failure");
	let direct = no_provider
		.search(request("depto con cochera"))
		.await
		.expect("scan should succeed");

	assert_eq!(ids(&from_fallback.properties), ids(&direct.properties));
	assert_eq!(ids(&from_fallback.properties), vec!["match"]);
}

#[tokio::test]
async fn monoambiente_accepts_zero_bedrooms_and_rejects_three_ambientes() {
	let index = FakeIndex {
		payloads: vec![
			payload(json!({ "id": "studio", "title": "Monoambiente centro", "bedrooms": 0 })),
			payload(json!({ "id": "big", "title": "Monoambiente amplio", "ambientes": 3 })),
		],
		fail: false,
	};
	let service = service(config(false), false, index, Vec::new());
	let response = service.search(request("monoambiente")).await.expect("search should succeed");

	assert_eq!(ids(&response.properties), vec!["studio"]);
}

#[tokio::test]
async fn monoambiente_without_matches_offers_nearby_alternatives() {
	let index = FakeIndex {
		payloads: vec![payload(json!({
			"id": "pg-2amb",
			"title": "Depto 2 ambientes Playa Grande",
			"property_type": "departamento",
			"ambientes": 2,
			"neighborhood": "Playa Grande",
			"latitude": -38.02,
			"longitude": -57.55,
		}))],
		fail: false,
	};
	let service = service(config(false), false, index, vec![playa_grande()]);
	let response = service
		.search(request("monoambiente en playa grande"))
		.await
		.expect("search should succeed");

	assert!(response.properties.is_empty());

	let alternatives = response.alternatives.expect("alternatives envelope expected");

	assert_eq!(ids(&alternatives), vec!["pg-2amb"]);
	assert!(response.message.expect("message expected").contains("Playa Grande"));
}

#[tokio::test]
async fn capitalized_property_type_listings_surface() {
	let index = FakeIndex {
		payloads: vec![payload(json!({
			"id": "cap",
			"title": "Departamento céntrico",
			"property_type": "Departamento",
		}))],
		fail: false,
	};
	let service = service(config(false), false, index, Vec::new());
	let response = service.search(request("depto")).await.expect("search should succeed");

	assert_eq!(ids(&response.properties), vec!["cap"]);
}

#[tokio::test]
async fn widened_bbox_recovers_listings_just_outside_the_neighborhood() {
	// -37.997 sits outside Playa Grande's box but inside the widened one.
	let index = FakeIndex {
		payloads: vec![payload(json!({
			"id": "edge",
			"title": "Depto Playa Grande",
			"property_type": "departamento",
			"latitude": -37.997,
			"longitude": -57.55,
		}))],
		fail: false,
	};
	let service = service(config(false), false, index, vec![playa_grande()]);
	let response = service
		.search(request("depto en playa grande"))
		.await
		.expect("search should succeed");

	assert_eq!(ids(&response.properties), vec!["edge"]);
	assert!(response.alternatives.is_none());
}

#[tokio::test]
async fn unindexed_coordinates_fall_back_to_the_geo_free_scan() {
	let index = GeoFailingIndex {
		payloads: vec![payload(json!({
			"id": "no-coords",
			"title": "Depto en Playa Grande",
			"property_type": "departamento",
			"neighborhood": "Playa Grande",
		}))],
	};
	let service = service(config(false), false, index, vec![playa_grande()]);
	let response = service
		.search(request("depto en playa grande"))
		.await
		.expect("geo-free retry should absorb the scan failures");

	assert_eq!(ids(&response.properties), vec!["no-coords"]);
}

#[tokio::test]
async fn zero_relevance_candidates_still_surface() {
	let index = FakeIndex {
		payloads: vec![payload(json!({ "id": "plain", "title": "Depto centro" }))],
		fail: false,
	};
	let service = service(config(false), false, index, Vec::new());
	let response = service.search(request("algo")).await.expect("search should succeed");

	assert_eq!(ids(&response.properties), vec!["plain"]);
}

#[tokio::test]
async fn caller_filters_are_case_insensitive_membership() {
	let index = FakeIndex {
		payloads: vec![
			payload(json!({
				"id": "active",
				"title": "Depto",
				"property_type": "departamento",
				"status": "Active",
			})),
			payload(json!({
				"id": "sold",
				"title": "Depto",
				"property_type": "departamento",
				"status": "sold",
			})),
		],
		fail: false,
	};
	let service = service(config(false), false, index, Vec::new());
	let response = service
		.search(SearchRequest {
			query: "depto".to_string(),
			filters: payload(json!({ "status": ["active", "reserved"] })),
			limit: None,
		})
		.await
		.expect("search should succeed");

	assert_eq!(ids(&response.properties), vec!["active"]);
}

#[tokio::test]
async fn empty_query_is_a_client_error() {
	let service =
		service(config(false), false, FakeIndex { payloads: Vec::new(), fail: false }, Vec::new());
	let error = service.search(request("   ")).await.expect_err("empty query must be rejected");

	assert!(matches!(error, ServiceError::InvalidRequest { .. }));
}

#[tokio::test]
async fn unreachable_index_in_every_state_surfaces_the_error() {
	let service =
		service(config(false), false, FakeIndex { payloads: Vec::new(), fail: true }, Vec::new());
	let error = service.search(request("depto")).await.expect_err("total failure must surface");

	assert!(matches!(error, ServiceError::InvalidRequest { .. } | ServiceError::Qdrant { .. }));
}

#[tokio::test]
async fn geojson_keeps_viewport_listings_and_skips_missing_coordinates() {
	let index = FakeIndex {
		payloads: vec![
			payload(json!({
				"id": "inside",
				"title": "Depto",
				"latitude": -38.02,
				"longitude": -57.55,
			})),
			payload(json!({ "id": "no-coords", "title": "Sin ubicación" })),
		],
		fail: false,
	};
	let service = service(config(false), false, index, Vec::new());
	let collection = service
		.properties_geojson(GeoJsonRequest {
			bbox: "-57.60,-38.05,-57.50,-38.00".to_string(),
			limit: None,
			tenant_id: None,
		})
		.await
		.expect("geojson should build");
	let features = collection["features"].as_array().expect("features array expected");

	assert_eq!(features.len(), 1);
	assert_eq!(features[0]["properties"]["id"], json!("inside"));
	assert_eq!(features[0]["geometry"]["coordinates"], json!([-57.55, -38.02]));
}

#[tokio::test]
async fn geojson_rejects_malformed_bbox() {
	let service =
		service(config(false), false, FakeIndex { payloads: Vec::new(), fail: false }, Vec::new());
	let error = service
		.properties_geojson(GeoJsonRequest {
			bbox: "not,a,bbox".to_string(),
			limit: None,
			tenant_id: None,
		})
		.await
		.expect_err("malformed bbox must be rejected");

	assert!(matches!(error, ServiceError::InvalidRequest { .. }));
}

#[tokio::test]
async fn geojson_tenant_filter_narrows_results() {
	let index = FakeIndex {
		payloads: vec![
			payload(json!({
				"id": "mine",
				"tenant_id": "acme",
				"latitude": -38.02,
				"longitude": -57.55,
			})),
			payload(json!({
				"id": "theirs",
				"tenant_id": "otros",
				"latitude": -38.02,
				"longitude": -57.55,
			})),
		],
		fail: false,
	};
	let service = service(config(false), false, index, Vec::new());
	let collection = service
		.properties_geojson(GeoJsonRequest {
			bbox: "-57.60,-38.05,-57.50,-38.00".to_string(),
			limit: None,
			tenant_id: Some("acme".to_string()),
		})
		.await
		.expect("geojson should build");
	let features = collection["features"].as_array().expect("features array expected");

	assert_eq!(features.len(), 1);
	assert_eq!(features[0]["properties"]["id"], json!("mine"));
}

#[tokio::test]
async fn all_properties_reports_count() {
	let index = FakeIndex {
		payloads: vec![
			payload(json!({ "id": "a" })),
			payload(json!({ "id": "b" })),
		],
		fail: false,
	};
	let service = service(config(false), false, index, Vec::new());
	let response = service.all_properties().await.expect("scan should succeed");

	assert_eq!(response.count, 2);
	assert_eq!(ids(&response.properties), vec!["a", "b"]);
}
