pub mod catalog;
pub mod recommendation;
pub mod registry;
pub mod similarity;

// Re-export public types
pub use catalog::Catalog;
pub use recommendation::RecommendationService;
pub use registry::ModelRegistry;
pub use similarity::SimilarityIndex;
