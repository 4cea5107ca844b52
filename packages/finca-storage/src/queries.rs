use crate::{Result, db::Db, models::NeighborhoodRecord};

const RECORD_COLUMNS: &str =
	"neighborhood_id, name, slug, min_lat, max_lat, min_lon, max_lon, created_at";

/// Case-insensitive partial match, by name first and by slug only when no
/// name matched. Returns the first match; multiple matches are not ranked.
pub async fn find_neighborhood(db: &Db, text: &str) -> Result<Option<NeighborhoodRecord>> {
	let by_name: Option<NeighborhoodRecord> = sqlx::query_as(&format!(
		"SELECT {RECORD_COLUMNS} FROM neighborhoods WHERE name ILIKE '%' || $1 || '%' LIMIT 1",
	))
	.bind(text)
	.fetch_optional(&db.pool)
	.await?;

	if by_name.is_some() {
		return Ok(by_name);
	}

	let by_slug = sqlx::query_as(&format!(
		"SELECT {RECORD_COLUMNS} FROM neighborhoods WHERE slug ILIKE '%' || $1 || '%' LIMIT 1",
	))
	.bind(text)
	.fetch_optional(&db.pool)
	.await?;

	Ok(by_slug)
}

pub async fn list_neighborhoods(db: &Db) -> Result<Vec<NeighborhoodRecord>> {
	let records = sqlx::query_as(&format!(
		"SELECT {RECORD_COLUMNS} FROM neighborhoods ORDER BY name",
	))
	.fetch_all(&db.pool)
	.await?;

	Ok(records)
}
