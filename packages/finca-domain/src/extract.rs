use regex::Regex;

/// Which room-counting system the query used.
///
/// `Ambientes` is the Argentine convention (living/dining plus each bedroom
/// counts as one unit); `Dormitorios` is the international bedrooms-only
/// convention. The two are mutually exclusive and `Ambientes` wins whenever
/// both patterns appear in the same query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomConvention {
	None,
	Ambientes,
	Dormitorios,
}

#[derive(Debug, Clone)]
pub struct ExtractedFeatures {
	pub tokens: Vec<String>,
	pub phrases: Vec<String>,
	pub convention: RoomConvention,
	pub ambientes: Option<u32>,
	pub bedrooms: Option<u32>,
	pub bathrooms: Option<u32>,
	pub property_types: Vec<String>,
	pub must_have_terms: Vec<String>,
	pub neighborhoods: Vec<String>,
}

/// Canonical property types and the surface forms that map to them.
const PROPERTY_TYPE_SYNONYMS: &[(&str, &[&str])] = &[
	("departamento", &["departamento", "depto", "dpto", "apartamento"]),
	("casa", &["casa", "chalet"]),
	("ph", &["ph"]),
	("duplex", &["duplex", "dúplex"]),
	("triplex", &["triplex"]),
	("local", &["local"]),
	("oficina", &["oficina"]),
	("terreno", &["terreno", "lote"]),
];

/// Amenity keywords scored as must-have terms. Accented and unaccented
/// spellings are separate entries on purpose; the test is a plain substring
/// check and queries arrive with inconsistent accents.
const AMENITY_TERMS: &[&str] = &[
	"pileta",
	"piscina",
	"quincho",
	"cochera",
	"balcón",
	"balcon",
	"amueblado",
	"luminoso",
	"terraza",
	"patio",
	"jardín",
	"jardin",
	"frente al mar",
	"vista al mar",
	"vista al golf",
];

/// Parses a free-text property query into structured features.
///
/// Pure function; `neighborhood_names` is the cached catalog name/slug list
/// supplied by the caller.
pub fn extract(query: &str, neighborhood_names: &[String]) -> ExtractedFeatures {
	let lowered = query.to_lowercase();
	let tokens = tokenize(&lowered);
	let phrases = phrase_windows(&tokens);
	let (convention, ambientes, bedrooms) = detect_rooms(&lowered);
	let bathrooms = capture_count(r"(\d+)\s*(?:baños?|banos?)", &lowered);
	let property_types = detect_property_types(&lowered);
	let must_have_terms =
		AMENITY_TERMS.iter().filter(|term| lowered.contains(*term)).map(|term| term.to_string()).collect();
	let neighborhoods = detect_neighborhoods(&lowered, neighborhood_names);

	ExtractedFeatures {
		tokens,
		phrases,
		convention,
		ambientes,
		bedrooms,
		bathrooms,
		property_types,
		must_have_terms,
		neighborhoods,
	}
}

/// Room-count detection. The ambientes pattern wins regardless of position;
/// only when it is absent is the dormitorios pattern tried. A "monoambiente"
/// is one ambiente and zero separate bedrooms; N ambientes (N ≥ 2) means
/// N − 1 bedrooms. Under the dormitorios convention the ambientes count is
/// back-derived as bedrooms + 1.
fn detect_rooms(lowered: &str) -> (RoomConvention, Option<u32>, Option<u32>) {
	let ambientes = if lowered.contains("monoambiente") {
		Some(1)
	} else {
		capture_count(r"(\d+)\s*ambientes?", lowered).filter(|count| *count >= 1)
	};

	if let Some(count) = ambientes {
		let bedrooms = if count == 1 { 0 } else { count - 1 };

		return (RoomConvention::Ambientes, Some(count), Some(bedrooms));
	}

	let bedrooms =
		capture_count(r"(\d+)\s*(?:dormitorios?|cuartos?|habitaci(?:ón|on)(?:es)?)", lowered);

	if let Some(count) = bedrooms {
		return (RoomConvention::Dormitorios, Some(count + 1), Some(count));
	}

	(RoomConvention::None, None, None)
}

fn capture_count(pattern: &str, text: &str) -> Option<u32> {
	let re = Regex::new(pattern).ok()?;
	let captures = re.captures(text)?;

	captures.get(1)?.as_str().parse().ok()
}

/// Lowercased word fragments split on non-alphanumeric characters, diacritics
/// preserved. Duplicates are kept: repeated words signal emphasis and earn
/// repeated credit in scoring.
fn tokenize(lowered: &str) -> Vec<String> {
	lowered
		.split(|ch: char| !ch.is_alphanumeric())
		.filter(|fragment| !fragment.is_empty())
		.map(|fragment| fragment.to_string())
		.collect()
}

/// Contiguous 2-word and 3-word windows, deduplicated, in order of first
/// appearance.
fn phrase_windows(tokens: &[String]) -> Vec<String> {
	let mut out = Vec::new();

	for width in [2_usize, 3] {
		if tokens.len() < width {
			continue;
		}
		for window in tokens.windows(width) {
			let phrase = window.join(" ");

			if !out.contains(&phrase) {
				out.push(phrase);
			}
		}
	}

	out
}

fn detect_property_types(lowered: &str) -> Vec<String> {
	let mut out = Vec::new();

	for (canonical, synonyms) in PROPERTY_TYPE_SYNONYMS {
		if synonyms.iter().any(|synonym| lowered.contains(synonym)) {
			out.push(canonical.to_string());
		}
	}

	out
}

/// Substring test of each catalog name against the full query text. A short
/// name matching inside a longer unrelated word is a known false positive and
/// is accepted as-is.
fn detect_neighborhoods(lowered: &str, names: &[String]) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();

	for name in names {
		let candidate = name.trim().to_lowercase();

		if candidate.is_empty() || out.contains(&candidate) {
			continue;
		}
		if lowered.contains(&candidate) {
			out.push(candidate);
		}
	}

	out
}
