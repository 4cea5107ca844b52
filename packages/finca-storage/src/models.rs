use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NeighborhoodRecord {
	pub neighborhood_id: Uuid,
	pub name: String,
	pub slug: String,
	pub min_lat: Option<f64>,
	pub max_lat: Option<f64>,
	pub min_lon: Option<f64>,
	pub max_lon: Option<f64>,
	pub created_at: OffsetDateTime,
}
