use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::RecommendedSong;
use crate::services::catalog::{Catalog, TrackInfo};
use crate::services::registry::ModelRegistry;

/// How many nearest playlists feed the aggregation.
pub const DEFAULT_TOP_K_PLAYLISTS: usize = 50;
/// How many ranked songs a response carries.
pub const DEFAULT_TOP_K_SONGS: usize = 10;

/// Occurrence counter over (title, artist) keys. Remembers first-encountered
/// order so equal counts rank deterministically.
#[derive(Default)]
struct SongTally {
    counts: HashMap<TrackInfo, usize>,
    order: Vec<TrackInfo>,
}

impl SongTally {
    fn bump(&mut self, track: &TrackInfo) {
        match self.counts.get_mut(track) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(track.clone(), 1);
                self.order.push(track.clone());
            }
        }
    }

    fn distinct(&self) -> usize {
        self.order.len()
    }

    /// Ranked rows: descending count, ties in first-encountered order,
    /// truncated to `top_k`.
    fn into_ranked(self, top_k: usize) -> Vec<RecommendedSong> {
        let SongTally { counts, order } = self;
        let mut ranked: Vec<(TrackInfo, usize)> = order
            .into_iter()
            .map(|track| {
                let count = counts[&track];
                (track, count)
            })
            .collect();
        // Stable sort: equal counts keep their first-encountered order.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(track, count)| RecommendedSong {
                song: track.title,
                artist: track.artist,
                count,
            })
            .collect()
    }
}

/// Orchestrates the full pipeline: embed the requested playlist name, find
/// the nearest known playlists, tally the songs they contain.
#[derive(Clone)]
pub struct RecommendationService {
    registry: Arc<ModelRegistry>,
    catalog: Arc<Catalog>,
}

impl RecommendationService {
    pub fn new(registry: Arc<ModelRegistry>, catalog: Arc<Catalog>) -> Self {
        Self { registry, catalog }
    }

    /// Ranked songs for `playlist_name`, aggregated over the `top_k_playlists`
    /// most similar known playlists.
    ///
    /// Similarity scores select and rank those playlists but do not weight the
    /// counts: every selected playlist contributes its track occurrences
    /// equally, and a track occurring twice in one playlist counts twice.
    pub async fn recommend(
        &self,
        playlist_name: &str,
        model_id: &str,
        top_k_playlists: usize,
        top_k_songs: usize,
    ) -> Result<Vec<RecommendedSong>> {
        let instance = self.registry.get_or_create(model_id).await?;

        let embedding = instance.embedder.embed(playlist_name).await?;
        let hits = instance.index.query(&embedding, top_k_playlists)?;
        info!(
            "Found {} similar playlists for '{}' with model {}",
            hits.len(),
            playlist_name,
            model_id
        );

        let mut tally = SongTally::default();
        let mut matched = 0usize;
        for hit in &hits {
            // Embedding tables and catalog exports are produced independently;
            // a playlist known to one but not the other is skipped.
            let tracks = match self.catalog.playlist_tracks(&hit.id) {
                Some(tracks) => tracks,
                None => {
                    debug!("Playlist {} is not in the catalog, skipping", hit.id);
                    continue;
                }
            };
            matched += 1;

            if tracing::enabled!(tracing::Level::DEBUG) {
                debug!(
                    "  {:.4}  {} ({} tracks)",
                    hit.score,
                    self.catalog.playlist_title(&hit.id).unwrap_or(hit.id.as_str()),
                    tracks.len()
                );
            }

            for track in tracks {
                tally.bump(track);
            }
        }

        debug!(
            "Aggregated {} distinct songs from {} of {} similar playlists",
            tally.distinct(),
            matched,
            hits.len()
        );

        Ok(tally.into_ranked(top_k_songs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::ml::testing::FixedEmbedder;
    use crate::services::catalog::fixtures::tiny_catalog;
    use crate::services::registry::{ModelInstance, ModelRegistry};
    use crate::services::similarity::SimilarityIndex;

    fn song(title: &str, artist: &str, count: usize) -> RecommendedSong {
        RecommendedSong {
            song: title.to_string(),
            artist: artist.to_string(),
            count,
        }
    }

    fn service_with(entries: Vec<(&str, Vec<f32>)>) -> RecommendationService {
        let index = SimilarityIndex::build(
            entries
                .into_iter()
                .map(|(id, vector)| (id.to_string(), vector))
                .collect(),
        )
        .unwrap();
        let embedder = FixedEmbedder::new(2)
            .with("roadtrip jams", vec![1.0, 0.0])
            .with("late night", vec![0.0, 1.0]);
        let instance = ModelInstance {
            embedder: Arc::new(embedder),
            index,
        };
        RecommendationService::new(
            Arc::new(ModelRegistry::with_instance("1", instance)),
            Arc::new(tiny_catalog()),
        )
    }

    #[test]
    fn tally_ranks_by_count_then_first_seen() {
        let a = TrackInfo {
            title: "Song A".to_string(),
            artist: "Artist A".to_string(),
        };
        let b = TrackInfo {
            title: "Song B".to_string(),
            artist: "Artist B".to_string(),
        };

        let mut tally = SongTally::default();
        tally.bump(&b);
        tally.bump(&a);
        tally.bump(&a);
        assert_eq!(
            tally.into_ranked(10),
            vec![song("Song A", "Artist A", 2), song("Song B", "Artist B", 1)]
        );

        // Equal counts: first-encountered wins.
        let mut tied = SongTally::default();
        tied.bump(&b);
        tied.bump(&a);
        assert_eq!(
            tied.into_ranked(10),
            vec![song("Song B", "Artist B", 1), song("Song A", "Artist A", 1)]
        );
    }

    #[tokio::test]
    async fn duplicate_occurrences_in_one_playlist_count_twice() {
        // Playlist "42" holds Song A, Song B, Song A.
        let service = service_with(vec![("42", vec![1.0, 0.0]), ("7", vec![0.0, 1.0])]);

        let songs = service.recommend("roadtrip jams", "1", 1, 10).await.unwrap();
        assert_eq!(
            songs,
            vec![song("Song A", "Artist A", 2), song("Song B", "Artist B", 1)]
        );
    }

    #[tokio::test]
    async fn aggregates_across_playlists_and_counts_sum_to_occurrences() {
        let service = service_with(vec![("42", vec![1.0, 0.0]), ("7", vec![0.0, 1.0])]);

        let songs = service.recommend("roadtrip jams", "1", 2, 10).await.unwrap();
        // "42" contributes A, B, A; "7" contributes B, C.
        assert_eq!(
            songs,
            vec![
                song("Song A", "Artist A", 2),
                song("Song B", "Artist B", 2),
                song("Song C", "Artist C", 1),
            ]
        );
        let total: usize = songs.iter().map(|s| s.count).sum();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn result_length_is_min_of_top_k_and_distinct() {
        let service = service_with(vec![("42", vec![1.0, 0.0]), ("7", vec![0.0, 1.0])]);

        let truncated = service.recommend("roadtrip jams", "1", 2, 1).await.unwrap();
        assert_eq!(truncated, vec![song("Song A", "Artist A", 2)]);

        let all = service.recommend("roadtrip jams", "1", 2, 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn playlists_missing_from_the_catalog_are_skipped() {
        // "ghost" outranks "42" but has no catalog entry.
        let service = service_with(vec![("ghost", vec![1.0, 0.0]), ("42", vec![1.0, 0.0])]);

        let songs = service.recommend("roadtrip jams", "1", 2, 10).await.unwrap();
        assert_eq!(
            songs,
            vec![song("Song A", "Artist A", 2), song("Song B", "Artist B", 1)]
        );
    }

    #[tokio::test]
    async fn playlist_with_no_resolved_tracks_contributes_nothing() {
        let service = service_with(vec![("9", vec![1.0, 0.0])]);

        let songs = service.recommend("roadtrip jams", "1", 1, 10).await.unwrap();
        assert!(songs.is_empty());
    }

    #[tokio::test]
    async fn repeated_calls_return_identical_results() {
        let service = service_with(vec![("42", vec![1.0, 0.0]), ("7", vec![0.0, 1.0])]);

        let first = service.recommend("roadtrip jams", "1", 2, 10).await.unwrap();
        let second = service.recommend("roadtrip jams", "1", 2, 10).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_model_id_surfaces_from_the_registry() {
        let service = service_with(vec![("42", vec![1.0, 0.0])]);

        let err = service.recommend("roadtrip jams", "99", 2, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::UnknownModel(_)));
    }

    #[tokio::test]
    async fn embedding_dimension_mismatch_is_surfaced() {
        let index = SimilarityIndex::build(vec![("42".to_string(), vec![1.0, 0.0])]).unwrap();
        let instance = ModelInstance {
            embedder: Arc::new(FixedEmbedder::new(3)),
            index,
        };
        let service = RecommendationService::new(
            Arc::new(ModelRegistry::with_instance("1", instance)),
            Arc::new(tiny_catalog()),
        );

        let err = service.recommend("anything", "1", 2, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::DimensionMismatch { .. }));
    }
}
