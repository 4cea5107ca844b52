use serde_json::{Map, Value};

use crate::{
	extract::{ExtractedFeatures, RoomConvention},
	listing::{NeighborhoodMatch, PropertyListing},
};

/// Hard accept/reject gate, evaluated before scoring. Short-circuits on the
/// first failing check: rooms, bathrooms, property type, geography, then
/// caller-supplied exact filters.
pub fn passes(
	listing: &PropertyListing,
	features: &ExtractedFeatures,
	caller_filters: &Map<String, Value>,
	neighborhood: Option<&NeighborhoodMatch>,
) -> bool {
	passes_rooms(listing, features)
		&& passes_bathrooms(listing, features)
		&& passes_property_type(listing, features)
		&& passes_geography(listing, features, neighborhood)
		&& passes_caller_filters(listing, caller_filters)
}

fn passes_rooms(listing: &PropertyListing, features: &ExtractedFeatures) -> bool {
	match features.convention {
		RoomConvention::None => true,
		RoomConvention::Ambientes => {
			let Some(desired) = features.ambientes else {
				return true;
			};

			if desired == 1 {
				// An explicit 2+-ambiente listing can never satisfy a
				// monoambiente request, even when its bedrooms field happens
				// to read 1: the two fields are populated independently and
				// inconsistently across sources.
				if listing.ambientes.map(|count| count >= 2).unwrap_or(false) {
					return false;
				}

				// Sources encode "monoambiente" as ambientes=1, bedrooms=1,
				// or bedrooms=0. Accept any of the three.
				return listing.ambientes == Some(1)
					|| listing.bedrooms == Some(1)
					|| listing.bedrooms == Some(0);
			}

			let desired = i64::from(desired);

			listing.ambientes == Some(desired) || listing.bedrooms == Some(desired - 1)
		},
		RoomConvention::Dormitorios => {
			let Some(desired) = features.bedrooms else {
				return true;
			};

			// Exactly one bedroom stays exact to avoid conflating
			// monoambiente-classified listings; two or more is at-least.
			if desired == 1 {
				return listing.bedrooms == Some(1);
			}

			listing.bedrooms.map(|count| count >= i64::from(desired)).unwrap_or(false)
		},
	}
}

fn passes_bathrooms(listing: &PropertyListing, features: &ExtractedFeatures) -> bool {
	let Some(desired) = features.bathrooms else {
		return true;
	};

	listing.bathrooms.map(|count| count >= i64::from(desired)).unwrap_or(false)
}

fn passes_property_type(listing: &PropertyListing, features: &ExtractedFeatures) -> bool {
	if features.property_types.is_empty() {
		return true;
	}

	let listing_type = listing.property_type.to_lowercase();

	features.property_types.iter().any(|kind| listing_type.contains(kind.as_str()))
}

fn passes_geography(
	listing: &PropertyListing,
	features: &ExtractedFeatures,
	neighborhood: Option<&NeighborhoodMatch>,
) -> bool {
	if features.neighborhoods.is_empty() {
		return true;
	}

	if let Some(bbox) = neighborhood.and_then(|matched| matched.bbox) {
		if let (Some(lat), Some(lon)) = (listing.lat, listing.lon) {
			return bbox.contains(lat, lon);
		}

		// Coordinates entirely absent: fall back to the text check below.
	}

	neighborhood_text_match(listing, features)
}

fn neighborhood_text_match(listing: &PropertyListing, features: &ExtractedFeatures) -> bool {
	let location = listing.location.to_lowercase();
	let neighborhood = listing.neighborhood.to_lowercase();

	features
		.neighborhoods
		.iter()
		.any(|name| location.contains(name.as_str()) || neighborhood.contains(name.as_str()))
}

fn passes_caller_filters(listing: &PropertyListing, caller_filters: &Map<String, Value>) -> bool {
	for (key, expected) in caller_filters {
		let Some(actual) = listing.raw.get(key).and_then(value_as_lowercase) else {
			return false;
		};

		let matched = match expected {
			Value::Array(options) => options
				.iter()
				.filter_map(value_as_lowercase)
				.any(|option| option == actual),
			other => value_as_lowercase(other).map(|option| option == actual).unwrap_or(false),
		};

		if !matched {
			return false;
		}
	}

	true
}

fn value_as_lowercase(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.to_lowercase()),
		Value::Number(number) => Some(number.to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		_ => None,
	}
}
