pub mod extract;
pub mod filter;
pub mod listing;
pub mod score;

pub use extract::{ExtractedFeatures, RoomConvention, extract};
pub use filter::passes;
pub use listing::{BoundingBox, NeighborhoodMatch, PropertyListing};
pub use score::score;
