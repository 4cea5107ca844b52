use finca_domain::{BoundingBox, NeighborhoodMatch};
use finca_storage::models::NeighborhoodRecord;

use crate::FincaService;

impl FincaService {
	/// The cached name/slug list fed into query feature extraction.
	///
	/// A catalog read failure is not cached, so a later request retries; until
	/// then extraction simply sees no neighborhoods and queries degrade to
	/// non-geographic search.
	pub(crate) async fn neighborhood_names(&self) -> Vec<String> {
		let names = self
			.catalog_names
			.get_or_try_init(|| async {
				self.providers.catalog.list().await.map(|records| catalog_names(&records))
			})
			.await;

		match names {
			Ok(names) => names.clone(),
			Err(err) => {
				tracing::warn!(
					error = %err,
					"Neighborhood catalog unavailable; continuing without geographic extraction.",
				);

				Vec::new()
			},
		}
	}

	/// Resolves one extracted neighborhood mention to its catalog record.
	/// Fail-soft: a lookup error downgrades the query to a text-only
	/// neighborhood check instead of failing the search.
	pub(crate) async fn find_neighborhood(&self, name: &str) -> Option<NeighborhoodMatch> {
		match self.providers.catalog.find(name).await {
			Ok(record) => record.map(record_to_match),
			Err(err) => {
				tracing::warn!(
					error = %err,
					neighborhood = name,
					"Neighborhood lookup failed; falling back to text matching.",
				);

				None
			},
		}
	}
}

fn catalog_names(records: &[NeighborhoodRecord]) -> Vec<String> {
	let mut names = Vec::with_capacity(records.len() * 2);

	for record in records {
		for candidate in [record.name.trim(), record.slug.trim()] {
			if !candidate.is_empty() && !names.iter().any(|existing| existing == candidate) {
				names.push(candidate.to_string());
			}
		}
	}

	names
}

fn record_to_match(record: NeighborhoodRecord) -> NeighborhoodMatch {
	let bbox = match (record.min_lat, record.max_lat, record.min_lon, record.max_lon) {
		(Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) =>
			Some(BoundingBox { min_lat, max_lat, min_lon, max_lon }),
		_ => None,
	};

	NeighborhoodMatch { id: record.neighborhood_id, name: record.name, slug: record.slug, bbox }
}
