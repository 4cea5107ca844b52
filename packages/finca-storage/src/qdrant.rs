use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, Filter, MinShould, Range, ScrollPointsBuilder, SearchPointsBuilder, value::Kind,
};
use serde_json::{Map, Number, Value};

use crate::Result;

/// One structured condition over a listing payload field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
	/// Exact keyword/integer/bool match.
	Equals { key: String, value: Value },
	/// Case-sensitive keyword set membership.
	AnyOf { key: String, values: Vec<String> },
	/// Closed numeric range; either bound may be open.
	Between { key: String, min: Option<f64>, max: Option<f64> },
}

/// Structured pre-filter tree sent to the vector store: every `must`
/// condition holds, and within each `any_of` group at least one condition
/// holds. Typed so a mistyped filter key fails loudly at construction sites
/// instead of silently matching nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFilter {
	pub must: Vec<FieldCondition>,
	pub any_groups: Vec<Vec<FieldCondition>>,
}

impl IndexFilter {
	pub fn is_empty(&self) -> bool {
		self.must.is_empty() && self.any_groups.is_empty()
	}

	pub fn to_qdrant(&self) -> Filter {
		let mut must: Vec<Condition> = self.must.iter().map(condition_to_qdrant).collect();

		for group in &self.any_groups {
			let conditions: Vec<Condition> = group.iter().map(condition_to_qdrant).collect();

			must.push(Condition::from(Filter {
				must: Vec::new(),
				should: Vec::new(),
				must_not: Vec::new(),
				min_should: Some(MinShould { min_count: 1, conditions }),
			}));
		}

		Filter { must, should: Vec::new(), must_not: Vec::new(), min_should: None }
	}

	/// In-process evaluation against a JSON payload. The store applies the
	/// filter server-side; this mirror exists so the predicate semantics stay
	/// testable without a running collection.
	pub fn matches(&self, payload: &Map<String, Value>) -> bool {
		self.must.iter().all(|condition| condition.matches(payload))
			&& self
				.any_groups
				.iter()
				.all(|group| group.iter().any(|condition| condition.matches(payload)))
	}
}

impl FieldCondition {
	pub fn matches(&self, payload: &Map<String, Value>) -> bool {
		match self {
			Self::Equals { key, value } => payload.get(key) == Some(value),
			Self::AnyOf { key, values } => payload
				.get(key)
				.and_then(Value::as_str)
				.map(|actual| values.iter().any(|value| value == actual))
				.unwrap_or(false),
			Self::Between { key, min, max } => {
				let Some(actual) = payload.get(key).and_then(Value::as_f64) else {
					return false;
				};

				min.map(|bound| actual >= bound).unwrap_or(true)
					&& max.map(|bound| actual <= bound).unwrap_or(true)
			},
		}
	}
}

fn condition_to_qdrant(condition: &FieldCondition) -> Condition {
	match condition {
		FieldCondition::Equals { key, value } => match value {
			Value::Bool(flag) => Condition::matches(key.clone(), *flag),
			Value::Number(number) if number.is_i64() =>
				Condition::matches(key.clone(), number.as_i64().unwrap_or_default()),
			Value::Number(number) => {
				let bound = number.as_f64();

				Condition::range(
					key.clone(),
					Range { lt: None, gt: None, gte: bound, lte: bound },
				)
			},
			other => Condition::matches(
				key.clone(),
				other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string()),
			),
		},
		FieldCondition::AnyOf { key, values } => Condition::matches(key.clone(), values.clone()),
		FieldCondition::Between { key, min, max } =>
			Condition::range(key.clone(), Range { lt: None, gt: None, gte: *min, lte: *max }),
	}
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &finca_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Nearest-neighbor search, payloads only, optionally pre-filtered.
	pub async fn query(
		&self,
		vector: Vec<f32>,
		filter: Option<&IndexFilter>,
		limit: u64,
	) -> Result<Vec<(Map<String, Value>, f32)>> {
		let mut search = SearchPointsBuilder::new(self.collection.clone(), vector, limit);

		if let Some(filter) = filter.filter(|filter| !filter.is_empty()) {
			search = search.filter(filter.to_qdrant());
		}

		let response = self.client.search_points(search.with_payload(true)).await?;

		Ok(response
			.result
			.into_iter()
			.map(|point| (payload_to_json(point.payload), point.score))
			.collect())
	}

	/// Full scan (no similarity ranking), payloads only, optionally
	/// pre-filtered.
	pub async fn scan(
		&self,
		filter: Option<&IndexFilter>,
		limit: u32,
	) -> Result<Vec<Map<String, Value>>> {
		let mut scroll =
			ScrollPointsBuilder::new(self.collection.clone()).limit(limit).with_payload(true);

		if let Some(filter) = filter.filter(|filter| !filter.is_empty()) {
			scroll = scroll.filter(filter.to_qdrant());
		}

		let response = self.client.scroll(scroll).await?;

		Ok(response.result.into_iter().map(|point| payload_to_json(point.payload)).collect())
	}
}

pub fn payload_to_json(
	payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> Map<String, Value> {
	payload.into_iter().map(|(key, value)| (key, value_to_json(value))).collect()
}

fn value_to_json(value: qdrant_client::qdrant::Value) -> Value {
	match value.kind {
		Some(Kind::StringValue(text)) => Value::String(text),
		Some(Kind::IntegerValue(number)) => Value::Number(number.into()),
		Some(Kind::DoubleValue(number)) =>
			Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null),
		Some(Kind::BoolValue(flag)) => Value::Bool(flag),
		Some(Kind::ListValue(list)) =>
			Value::Array(list.values.into_iter().map(value_to_json).collect()),
		Some(Kind::StructValue(entries)) => Value::Object(
			entries.fields.into_iter().map(|(key, value)| (key, value_to_json(value))).collect(),
		),
		Some(Kind::NullValue(_)) | None => Value::Null,
	}
}
