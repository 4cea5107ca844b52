use crate::{extract::ExtractedFeatures, listing::PropertyListing};

// Product-tunable weights. The room weights are deliberately asymmetric:
// a listing one room short is penalized harder than it is rewarded for
// excess, because users asking for N rooms rarely accept fewer.
pub const TOKEN_WEIGHT: i32 = 2;
pub const PHRASE_WEIGHT: i32 = 4;
pub const NEIGHBORHOOD_WEIGHT: i32 = 5;
pub const PROPERTY_TYPE_WEIGHT: i32 = 6;
pub const AMENITY_WEIGHT: i32 = 5;
pub const ROOMS_EXACT_WEIGHT: i32 = 6;
pub const ROOMS_MORE_WEIGHT: i32 = 3;
pub const ROOMS_FEWER_WEIGHT: i32 = -4;
pub const BATHROOMS_EXACT_WEIGHT: i32 = 3;
pub const BATHROOMS_MORE_WEIGHT: i32 = 1;
pub const BATHROOMS_FEWER_WEIGHT: i32 = -2;

/// Relevance score of a candidate listing against the extracted features.
///
/// Deterministic, no I/O, may be negative. Scores are comparison-only within
/// one request's candidate set; there is no normalization or capping.
pub fn score(listing: &PropertyListing, features: &ExtractedFeatures) -> i32 {
	let text = listing.searchable_text();
	let mut total = 0;

	// Duplicated query tokens multiply the credit on purpose; repetition
	// signals emphasis.
	for token in &features.tokens {
		if text.contains(token.as_str()) {
			total += TOKEN_WEIGHT;
		}
	}
	for phrase in &features.phrases {
		if text.contains(phrase.as_str()) {
			total += PHRASE_WEIGHT;
		}
	}
	for neighborhood in &features.neighborhoods {
		if text.contains(neighborhood.as_str()) {
			total += NEIGHBORHOOD_WEIGHT;
		}
	}

	let listing_type = listing.property_type.to_lowercase();

	if features.property_types.iter().any(|kind| listing_type.contains(kind.as_str())) {
		total += PROPERTY_TYPE_WEIGHT;
	}

	for term in &features.must_have_terms {
		if text.contains(term.as_str()) {
			total += AMENITY_WEIGHT;
		}
	}

	if let Some(desired) = features.bedrooms
		&& let Some(actual) = listing.room_count()
	{
		let desired = i64::from(desired);

		total += if actual == desired {
			ROOMS_EXACT_WEIGHT
		} else if actual > desired {
			ROOMS_MORE_WEIGHT
		} else {
			ROOMS_FEWER_WEIGHT
		};
	}

	if let Some(desired) = features.bathrooms
		&& let Some(actual) = listing.bathrooms
	{
		let desired = i64::from(desired);

		total += if actual == desired {
			BATHROOMS_EXACT_WEIGHT
		} else if actual > desired {
			BATHROOMS_MORE_WEIGHT
		} else {
			BATHROOMS_FEWER_WEIGHT
		};
	}

	total
}
