use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use finca_domain::PropertyListing;
use finca_storage::qdrant::{FieldCondition, IndexFilter};

use crate::{FincaService, ServiceError, ServiceResult};

#[derive(Debug, Serialize)]
pub struct PropertiesResponse {
	pub properties: Vec<Value>,
	pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct GeoJsonRequest {
	/// Viewport as `minLon,minLat,maxLon,maxLat`.
	pub bbox: String,
	pub limit: Option<u32>,
	pub tenant_id: Option<String>,
}

impl FincaService {
	/// Every listing payload, capped by the configured scan limit. Backs the
	/// map view's initial load.
	pub async fn all_properties(&self) -> ServiceResult<PropertiesResponse> {
		let payloads = self.providers.index.scan(None, self.cfg.search.scan_cap).await?;
		let properties: Vec<Value> = payloads.into_iter().map(Value::Object).collect();
		let count = properties.len();

		Ok(PropertiesResponse { properties, count })
	}

	/// Listings inside a viewport as a GeoJSON `FeatureCollection`. Listings
	/// whose coordinates cannot be resolved (no coordinate field and no
	/// parseable WKT point) are skipped, not errors.
	pub async fn properties_geojson(&self, request: GeoJsonRequest) -> ServiceResult<Value> {
		let (min_lon, min_lat, max_lon, max_lat) = parse_bbox(&request.bbox)?;
		let limit =
			request.limit.unwrap_or(self.cfg.search.scan_cap).min(self.cfg.search.scan_cap);
		let mut filter = IndexFilter {
			must: vec![
				FieldCondition::Between {
					key: "latitude".to_string(),
					min: Some(min_lat),
					max: Some(max_lat),
				},
				FieldCondition::Between {
					key: "longitude".to_string(),
					min: Some(min_lon),
					max: Some(max_lon),
				},
			],
			any_groups: Vec::new(),
		};

		if let Some(tenant_id) = request.tenant_id.as_ref().filter(|id| !id.trim().is_empty()) {
			filter.must.push(FieldCondition::Equals {
				key: "tenant_id".to_string(),
				value: Value::String(tenant_id.clone()),
			});
		}

		let payloads = self.providers.index.scan(Some(&filter), limit).await?;
		let features: Vec<Value> = payloads
			.into_iter()
			.filter_map(|payload| {
				let listing = PropertyListing::from_payload(payload);
				let (lat, lon) = (listing.lat?, listing.lon?);

				Some(feature(&listing, lat, lon))
			})
			.collect();

		Ok(json!({
			"type": "FeatureCollection",
			"features": features,
		}))
	}
}

/// Parses `minLon,minLat,maxLon,maxLat`. Anything else is a client error.
fn parse_bbox(raw: &str) -> ServiceResult<(f64, f64, f64, f64)> {
	let parts: Vec<&str> = raw.split(',').map(str::trim).collect();

	if parts.len() != 4 {
		return Err(invalid_bbox(raw));
	}

	let mut bounds = [0.0_f64; 4];

	for (slot, part) in bounds.iter_mut().zip(&parts) {
		*slot = part.parse().map_err(|_| invalid_bbox(raw))?;
	}

	let [min_lon, min_lat, max_lon, max_lat] = bounds;

	if min_lon >= max_lon || min_lat >= max_lat {
		return Err(invalid_bbox(raw));
	}

	Ok((min_lon, min_lat, max_lon, max_lat))
}

fn invalid_bbox(raw: &str) -> ServiceError {
	ServiceError::InvalidRequest {
		message: format!("invalid bbox {raw:?}: expected minLon,minLat,maxLon,maxLat"),
	}
}

fn feature(listing: &PropertyListing, lat: f64, lon: f64) -> Value {
	let mut properties = Map::new();

	// Display fields the map popup reads, pulled from the raw payload so
	// tenant-specific keys (price, tipo_operacion, area_m2) survive as-is.
	for key in
		["id", "title", "price", "property_type", "tipo_operacion", "bedrooms", "bathrooms",
			"area_m2", "address", "images", "url"]
	{
		if let Some(value) = listing.raw.get(key) {
			properties.insert(key.to_string(), value.clone());
		}
	}
	if let Some(id) = listing.id.as_ref() {
		properties.entry("id".to_string()).or_insert_with(|| Value::String(id.clone()));
	}

	json!({
		"type": "Feature",
		"geometry": {
			"type": "Point",
			"coordinates": [lon, lat],
		},
		"properties": properties,
	})
}
