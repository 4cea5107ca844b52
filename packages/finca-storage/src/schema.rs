const INIT_SQL: &str = "\
CREATE TABLE IF NOT EXISTS neighborhoods (
	neighborhood_id UUID PRIMARY KEY,
	name TEXT NOT NULL,
	slug TEXT NOT NULL UNIQUE,
	min_lat DOUBLE PRECISION,
	max_lat DOUBLE PRECISION,
	min_lon DOUBLE PRECISION,
	max_lon DOUBLE PRECISION,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_neighborhoods_name ON neighborhoods (lower(name));
CREATE INDEX IF NOT EXISTS idx_neighborhoods_slug ON neighborhoods (lower(slug));
";

pub fn render_schema() -> String {
	INIT_SQL.to_string()
}
