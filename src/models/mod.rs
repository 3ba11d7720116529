use serde::{Deserialize, Serialize};

/// Query parameters accepted by the recommendation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendQuery {
    /// Free-text playlist name to recommend songs for
    pub playlist_name: Option<String>,
    /// Which configured model to answer with (default: "1")
    pub model_id: Option<String>,
}

/// One ranked song in a recommendation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedSong {
    pub song: String,
    pub artist: String,
    /// Number of times the song occurred across the similar playlists
    pub count: usize,
}

/// Response structure for song recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub model_id: String,
    pub recommendations: Vec<RecommendedSong>,
}

/// Health check response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Current timestamp in RFC3339 format
    pub timestamp: String,
}
