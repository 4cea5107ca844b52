use serde_json::{Map, Value};
use uuid::Uuid;

/// Source-field aliases, tried in order. Listing payloads come from several
/// scrapers that never agreed on field names, so every logical field is
/// resolved once at ingestion instead of on every filter or score call.
const ID_ALIASES: &[&str] = &["id", "property_id", "uuid"];
const LAT_ALIASES: &[&str] = &["latitude", "lat"];
const LON_ALIASES: &[&str] = &["longitude", "lng", "lon"];
const WKT_ALIASES: &[&str] = &["location", "point", "wkt", "geom"];

/// A property listing with its payload fields resolved into canonical form.
///
/// The original payload is retained in `raw` because caller-supplied exact
/// filters may reference keys that have no canonical counterpart
/// (`tipo_operacion`, `area_m2`, tenant fields, and so on).
#[derive(Debug, Clone, Default)]
pub struct PropertyListing {
	pub id: Option<String>,
	pub title: String,
	pub description: String,
	pub summary: String,
	pub address: String,
	pub location: String,
	pub neighborhood: String,
	pub property_type: String,
	pub tags: Vec<String>,
	pub bedrooms: Option<i64>,
	pub ambientes: Option<i64>,
	pub rooms: Option<i64>,
	pub bathrooms: Option<i64>,
	pub lat: Option<f64>,
	pub lon: Option<f64>,
	pub raw: Map<String, Value>,
}

impl PropertyListing {
	pub fn from_payload(payload: Map<String, Value>) -> Self {
		let id = ID_ALIASES.iter().find_map(|key| string_field(&payload, key));
		let (mut lat, mut lon) = (
			LAT_ALIASES.iter().find_map(|key| number_field(&payload, key)),
			LON_ALIASES.iter().find_map(|key| number_field(&payload, key)),
		);

		if lat.is_none() || lon.is_none() {
			// Some sources encode the position as a WKT point instead of
			// separate coordinate fields.
			if let Some((wkt_lon, wkt_lat)) = WKT_ALIASES
				.iter()
				.filter_map(|key| string_field(&payload, key))
				.find_map(|text| parse_wkt_point(&text))
			{
				lat = lat.or(Some(wkt_lat));
				lon = lon.or(Some(wkt_lon));
			}
		}

		Self {
			id,
			title: string_field(&payload, "title").unwrap_or_default(),
			description: string_field(&payload, "description").unwrap_or_default(),
			summary: string_field(&payload, "summary").unwrap_or_default(),
			address: string_field(&payload, "address").unwrap_or_default(),
			location: string_field(&payload, "location").unwrap_or_default(),
			neighborhood: string_field(&payload, "neighborhood").unwrap_or_default(),
			property_type: string_field(&payload, "property_type").unwrap_or_default(),
			tags: tags_field(&payload),
			bedrooms: integer_field(&payload, "bedrooms"),
			ambientes: integer_field(&payload, "ambientes"),
			rooms: integer_field(&payload, "rooms"),
			bathrooms: integer_field(&payload, "bathrooms"),
			lat,
			lon,
			raw: payload,
		}
	}

	/// The lowercased text blob all token, phrase, and keyword scoring runs
	/// against.
	pub fn searchable_text(&self) -> String {
		let mut parts = vec![
			self.title.as_str(),
			self.description.as_str(),
			self.summary.as_str(),
			self.address.as_str(),
			self.location.as_str(),
			self.neighborhood.as_str(),
			self.property_type.as_str(),
		];
		let tags = self.tags.join(" ");

		parts.push(tags.as_str());

		parts.join(" ").to_lowercase()
	}

	/// Room count used for proximity scoring. Field priority follows the data
	/// quality of the sources: `bedrooms`, then `ambientes`, then `rooms`.
	pub fn room_count(&self) -> Option<i64> {
		self.bedrooms.or(self.ambientes).or(self.rooms)
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
	pub min_lat: f64,
	pub max_lat: f64,
	pub min_lon: f64,
	pub max_lon: f64,
}

impl BoundingBox {
	pub fn contains(&self, lat: f64, lon: f64) -> bool {
		lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
	}

	/// Widens each side by `ratio` of the box's span in that axis.
	pub fn widen(&self, ratio: f64) -> Self {
		let lat_pad = (self.max_lat - self.min_lat) * ratio;
		let lon_pad = (self.max_lon - self.min_lon) * ratio;

		Self {
			min_lat: self.min_lat - lat_pad,
			max_lat: self.max_lat + lat_pad,
			min_lon: self.min_lon - lon_pad,
			max_lon: self.max_lon + lon_pad,
		}
	}
}

#[derive(Debug, Clone)]
pub struct NeighborhoodMatch {
	pub id: Uuid,
	pub name: String,
	pub slug: String,
	/// Present only when all four bounds were resolved; a partial box is
	/// treated as no geographic filter.
	pub bbox: Option<BoundingBox>,
}

/// Parses `POINT(lon lat)`, case-insensitively, with optional whitespace.
pub fn parse_wkt_point(text: &str) -> Option<(f64, f64)> {
	let trimmed = text.trim();
	let upper = trimmed.to_uppercase();
	let rest = upper.strip_prefix("POINT")?.trim_start();
	let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
	let mut parts = inner.split_whitespace();
	let lon: f64 = parts.next()?.parse().ok()?;
	let lat: f64 = parts.next()?.parse().ok()?;

	if parts.next().is_some() {
		return None;
	}

	Some((lon, lat))
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
	match payload.get(key)? {
		Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
		_ => None,
	}
}

fn number_field(payload: &Map<String, Value>, key: &str) -> Option<f64> {
	match payload.get(key)? {
		Value::Number(number) => number.as_f64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}

fn integer_field(payload: &Map<String, Value>, key: &str) -> Option<i64> {
	match payload.get(key)? {
		Value::Number(number) => {
			number.as_i64().or_else(|| number.as_f64().map(|value| value as i64))
		},
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}

fn tags_field(payload: &Map<String, Value>) -> Vec<String> {
	let Some(Value::Array(items)) = payload.get("tags") else {
		return Vec::new();
	};

	items
		.iter()
		.filter_map(|item| match item {
			Value::String(text) => Some(text.clone()),
			_ => None,
		})
		.collect()
}
