use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use finca_domain::{
	ExtractedFeatures, NeighborhoodMatch, PropertyListing, RoomConvention, extract, passes, score,
};
use finca_storage::qdrant::{FieldCondition, IndexFilter};

use crate::{FincaService, ServiceError, ServiceResult};

// Product-tunable retrieval knobs.
const EMBEDDING_OVERFETCH_FACTOR: usize = 3;
const EMBEDDING_OVERFETCH_FLOOR: usize = 50;
const SCAN_OVERFETCH_FACTOR: usize = 8;
const SCAN_OVERFETCH_FLOOR: usize = 200;
const GEO_WIDEN_RATIO: f64 = 0.1;
const ALTERNATIVE_AMBIENTES: &[u32] = &[2, 3];
const ALTERNATIVES_PER_COUNT: usize = 2;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	/// Exact-match filters over raw payload keys, scalar or set-membership.
	#[serde(default)]
	pub filters: Map<String, Value>,
	pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
	pub properties: Vec<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub alternatives: Option<Vec<Value>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl SearchResponse {
	fn empty() -> Self {
		Self { properties: Vec::new(), alternatives: None, message: None }
	}
}

/// The fallback ladder, in order. Each state either returns results or hands
/// over to the next; transitions live in [`next_state`] so the policy stays
/// auditable in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetrievalState {
	EmbeddingSearch,
	FallbackScan,
	RelaxedGeo,
	Alternatives,
}

impl RetrievalState {
	fn name(&self) -> &'static str {
		match self {
			Self::EmbeddingSearch => "embedding_search",
			Self::FallbackScan => "fallback_scan",
			Self::RelaxedGeo => "relaxed_geo",
			Self::Alternatives => "alternatives",
		}
	}
}

fn initial_state(embedding_configured: bool) -> RetrievalState {
	if embedding_configured {
		RetrievalState::EmbeddingSearch
	} else {
		RetrievalState::FallbackScan
	}
}

fn next_state(
	state: RetrievalState,
	geo_active: bool,
	monoambiente: bool,
) -> Option<RetrievalState> {
	match state {
		RetrievalState::EmbeddingSearch => Some(RetrievalState::FallbackScan),
		RetrievalState::FallbackScan => geo_active.then_some(RetrievalState::RelaxedGeo),
		RetrievalState::RelaxedGeo => monoambiente.then_some(RetrievalState::Alternatives),
		RetrievalState::Alternatives => None,
	}
}

/// How the neighborhood bounding box participates in one scan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeoMode {
	Exact,
	Widened,
	/// No geographic condition is sent to the store; the in-process predicate
	/// still checks the widened box.
	Dropped,
}

struct SearchContext {
	query: String,
	features: ExtractedFeatures,
	caller_filters: Map<String, Value>,
	neighborhood: Option<NeighborhoodMatch>,
	limit: usize,
}

impl SearchContext {
	fn geo_active(&self) -> bool {
		self.neighborhood.as_ref().and_then(|matched| matched.bbox).is_some()
	}

	fn monoambiente(&self) -> bool {
		self.features.convention == RoomConvention::Ambientes
			&& self.features.ambientes == Some(1)
	}

	fn neighborhood_for(&self, geo: GeoMode) -> Option<NeighborhoodMatch> {
		let matched = self.neighborhood.clone()?;

		match geo {
			GeoMode::Exact => Some(matched),
			GeoMode::Widened | GeoMode::Dropped => Some(NeighborhoodMatch {
				bbox: matched.bbox.map(|bbox| bbox.widen(GEO_WIDEN_RATIO)),
				..matched
			}),
		}
	}
}

/// One retrieval state's result: candidates kept, or the error it swallowed.
/// An error here is a fallback trigger, not a request failure.
struct StepOutcome {
	results: Vec<Value>,
	error: Option<ServiceError>,
}

impl StepOutcome {
	fn done(results: Vec<Value>) -> Self {
		Self { results, error: None }
	}

	fn failed(error: ServiceError) -> Self {
		Self { results: Vec::new(), error: Some(error) }
	}
}

impl FincaService {
	/// Free-text property search over the listing index.
	///
	/// Walks the fallback ladder until a state yields results or the states
	/// are exhausted. "Nothing matched" is an empty 200-class response; the
	/// only error surfaced from retrieval itself is the last one seen when
	/// every state failed outright.
	pub async fn search(&self, request: SearchRequest) -> ServiceResult<SearchResponse> {
		let query = request.query.trim().to_string();

		if query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "query must not be empty".to_string(),
			});
		}

		let limit = request
			.limit
			.unwrap_or(self.cfg.search.default_limit)
			.clamp(1, self.cfg.search.max_limit) as usize;
		let names = self.neighborhood_names().await;
		let features = extract(&query, &names);
		let neighborhood = match features.neighborhoods.first() {
			Some(name) => self.find_neighborhood(name).await,
			None => None,
		};

		tracing::debug!(
			query = %query,
			convention = ?features.convention,
			ambientes = ?features.ambientes,
			bathrooms = ?features.bathrooms,
			neighborhoods = ?features.neighborhoods,
			"Extracted query features.",
		);

		let ctx =
			SearchContext { query, features, caller_filters: request.filters, neighborhood, limit };
		let mut state = initial_state(self.cfg.providers.embedding.is_some());
		let mut any_completed = false;
		let mut last_error = None;

		loop {
			let outcome = match state {
				RetrievalState::EmbeddingSearch => self.run_embedding_search(&ctx).await,
				RetrievalState::FallbackScan =>
					self.run_scan(&ctx, GeoMode::Exact, None, ctx.limit).await,
				RetrievalState::RelaxedGeo => self.run_relaxed_geo(&ctx).await,
				RetrievalState::Alternatives => self.run_alternatives(&ctx).await,
			};

			match outcome.error {
				Some(error) => {
					tracing::warn!(
						error = %error,
						state = state.name(),
						query = %ctx.query,
						"Retrieval state failed; falling back.",
					);

					last_error = Some(error);
				},
				None => any_completed = true,
			}

			if !outcome.results.is_empty() {
				tracing::debug!(
					state = state.name(),
					count = outcome.results.len(),
					"Retrieval finished.",
				);

				if state == RetrievalState::Alternatives {
					return Ok(SearchResponse {
						properties: Vec::new(),
						message: Some(alternatives_message(&ctx, outcome.results.len())),
						alternatives: Some(outcome.results),
					});
				}

				return Ok(SearchResponse {
					properties: outcome.results,
					alternatives: None,
					message: None,
				});
			}

			match next_state(state, ctx.geo_active(), ctx.monoambiente()) {
				Some(next) => state = next,
				None => break,
			}
		}

		// Only a ladder where every state errored surfaces a failure; an empty
		// outcome anywhere along the way is a normal "no matches".
		if !any_completed && let Some(error) = last_error {
			return Err(error);
		}

		Ok(SearchResponse::empty())
	}

	async fn run_embedding_search(&self, ctx: &SearchContext) -> StepOutcome {
		let Some(provider_cfg) = self.cfg.providers.embedding.as_ref() else {
			return StepOutcome::failed(ServiceError::Provider {
				message: "no embedding provider configured".to_string(),
			});
		};
		let vector = match self.providers.embedding.embed(provider_cfg, &ctx.query).await {
			Ok(vector) => vector,
			Err(error) => return StepOutcome::failed(error.into()),
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return StepOutcome::failed(ServiceError::Provider {
				message: format!(
					"embedding dimension mismatch: expected {}, got {}",
					self.cfg.storage.qdrant.vector_dim,
					vector.len(),
				),
			});
		}

		let filter = build_prefilter(&ctx.features, ctx.neighborhood_for(GeoMode::Exact).as_ref());
		let overfetch = (EMBEDDING_OVERFETCH_FACTOR * ctx.limit).max(EMBEDDING_OVERFETCH_FLOOR);
		let hits = match self.providers.index.query(vector, Some(&filter), overfetch as u64).await {
			Ok(hits) => hits,
			Err(error) => return StepOutcome::failed(error.into()),
		};
		let neighborhood = ctx.neighborhood_for(GeoMode::Exact);
		let mut kept: Vec<(i32, Map<String, Value>)> = hits
			.into_iter()
			.filter_map(|(payload, _similarity)| {
				let listing = PropertyListing::from_payload(payload);

				passes(&listing, &ctx.features, &ctx.caller_filters, neighborhood.as_ref())
					.then(|| (score(&listing, &ctx.features), listing.raw))
			})
			.collect();

		// Stable sort keeps the store's similarity order as the tiebreaker.
		kept.sort_by_key(|(relevance, _)| std::cmp::Reverse(*relevance));
		kept.truncate(ctx.limit);

		StepOutcome::done(kept.into_iter().map(|(_, payload)| Value::Object(payload)).collect())
	}

	/// Structured-filter scan. Prefers positive-relevance candidates, but a
	/// candidate pool that passes the predicate with zero relevance everywhere
	/// is still better than nothing.
	async fn run_scan(
		&self,
		ctx: &SearchContext,
		geo: GeoMode,
		forced_ambientes: Option<u32>,
		take: usize,
	) -> StepOutcome {
		let features = match forced_ambientes {
			Some(count) => with_forced_ambientes(&ctx.features, count),
			None => ctx.features.clone(),
		};
		let neighborhood = ctx.neighborhood_for(geo);
		let prefilter_neighborhood = match geo {
			GeoMode::Dropped => None,
			GeoMode::Exact | GeoMode::Widened => neighborhood.as_ref(),
		};
		let filter = build_prefilter(&features, prefilter_neighborhood);
		let overfetch = (SCAN_OVERFETCH_FACTOR * ctx.limit).max(SCAN_OVERFETCH_FLOOR);
		let candidates = match self.providers.index.scan(Some(&filter), overfetch as u32).await {
			Ok(candidates) => candidates,
			Err(error) => return StepOutcome::failed(error.into()),
		};
		let mut scored: Vec<(i32, Map<String, Value>)> = candidates
			.into_iter()
			.filter_map(|payload| {
				let listing = PropertyListing::from_payload(payload);

				passes(&listing, &features, &ctx.caller_filters, neighborhood.as_ref())
					.then(|| (score(&listing, &features), listing.raw))
			})
			.collect();

		scored.sort_by_key(|(relevance, _)| std::cmp::Reverse(*relevance));

		if scored.iter().any(|(relevance, _)| *relevance > 0) {
			scored.retain(|(relevance, _)| *relevance > 0);
		}

		scored.truncate(take);

		StepOutcome::done(scored.into_iter().map(|(_, payload)| Value::Object(payload)).collect())
	}

	/// Widens the neighborhood box before giving up on geography entirely.
	async fn run_relaxed_geo(&self, ctx: &SearchContext) -> StepOutcome {
		let widened = self.run_scan(ctx, GeoMode::Widened, None, ctx.limit).await;

		if widened.error.is_none() {
			return widened;
		}

		self.run_scan(ctx, GeoMode::Dropped, None, ctx.limit).await
	}

	/// Monoambiente queries with zero matches get nearby 2- and 3-ambiente
	/// listings instead of an empty answer.
	async fn run_alternatives(&self, ctx: &SearchContext) -> StepOutcome {
		let mut results = Vec::new();
		let mut error = None;
		let mut any_completed = false;

		for &count in ALTERNATIVE_AMBIENTES {
			let outcome =
				self.run_scan(ctx, GeoMode::Exact, Some(count), ALTERNATIVES_PER_COUNT).await;

			match outcome.error {
				Some(step_error) => error = Some(step_error),
				None => {
					any_completed = true;

					results.extend(outcome.results);
				},
			}
		}

		StepOutcome { results, error: if any_completed { None } else { error } }
	}
}

fn with_forced_ambientes(features: &ExtractedFeatures, count: u32) -> ExtractedFeatures {
	let mut forced = features.clone();

	forced.convention = RoomConvention::Ambientes;
	forced.ambientes = Some(count);
	forced.bedrooms = Some(count.saturating_sub(1));

	forced
}

/// Structured conditions the store can apply before candidates reach the
/// in-process predicate, which re-checks everything. Property type is left
/// to the predicate: its case-insensitive substring test has no keyword
/// equivalent, and an equality condition here would hide listings with
/// capitalized or composite type values.
fn build_prefilter(
	features: &ExtractedFeatures,
	neighborhood: Option<&NeighborhoodMatch>,
) -> IndexFilter {
	let mut filter = IndexFilter::default();

	match features.convention {
		RoomConvention::None => {},
		RoomConvention::Ambientes =>
			if let Some(count) = features.ambientes {
				let mut group = count_equals("ambientes", count);

				group.extend(count_equals("bedrooms", count.saturating_sub(1)));

				if count == 1 {
					// Third monoambiente encoding: bedrooms=1 with no
					// ambientes field.
					group.extend(count_equals("bedrooms", 1));
				}

				filter.any_groups.push(group);
			},
		RoomConvention::Dormitorios =>
			if let Some(count) = features.bedrooms {
				if count == 1 {
					filter.any_groups.push(count_equals("bedrooms", 1));
				} else {
					filter.must.push(FieldCondition::Between {
						key: "bedrooms".to_string(),
						min: Some(f64::from(count)),
						max: None,
					});
				}
			},
	}

	if let Some(count) = features.bathrooms {
		filter.must.push(FieldCondition::Between {
			key: "bathrooms".to_string(),
			min: Some(f64::from(count)),
			max: None,
		});
	}
	if let Some(bbox) = neighborhood.and_then(|matched| matched.bbox) {
		filter.must.push(FieldCondition::Between {
			key: "latitude".to_string(),
			min: Some(bbox.min_lat),
			max: Some(bbox.max_lat),
		});
		filter.must.push(FieldCondition::Between {
			key: "longitude".to_string(),
			min: Some(bbox.min_lon),
			max: Some(bbox.max_lon),
		});
	}

	filter
}

/// Counts arrive from the scrapers both as numbers and as numeric strings,
/// so every count equality is paired with its string spelling.
fn count_equals(key: &str, count: u32) -> Vec<FieldCondition> {
	vec![
		FieldCondition::Equals { key: key.to_string(), value: json!(count) },
		FieldCondition::Equals { key: key.to_string(), value: Value::String(count.to_string()) },
	]
}

fn alternatives_message(ctx: &SearchContext, count: usize) -> String {
	match ctx.neighborhood.as_ref() {
		Some(matched) => format!(
			"No encontramos monoambientes en {}, pero hay {count} propiedades de 2 o 3 ambientes en la zona.",
			matched.name,
		),
		None => format!(
			"No encontramos monoambientes, pero hay {count} propiedades de 2 o 3 ambientes similares.",
		),
	}
}
