use crate::{
    config::Config,
    error::ApiError,
    models::{RecommendQuery, RecommendationResponse},
    services::recommendation::{
        RecommendationService, DEFAULT_TOP_K_PLAYLISTS, DEFAULT_TOP_K_SONGS,
    },
};
use actix_web::{web, HttpResponse};

pub fn recommendations_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/recommend").route(web::get().to(recommend)));
}

/// Recommend songs for a free-text playlist name.
///
/// `playlist_name` is required and must be non-empty; `model_id` falls back to
/// the configured default. The pipeline is never invoked for rejected input.
pub async fn recommend(
    query: web::Query<RecommendQuery>,
    config: web::Data<Config>,
    recommendation_service: web::Data<RecommendationService>,
) -> Result<HttpResponse, ApiError> {
    let playlist_name = match query.playlist_name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ApiError::MissingParameter("playlist_name".to_string())),
    };
    let model_id = query
        .model_id
        .as_deref()
        .unwrap_or(config.default_model_id.as_str());

    let recommendations = recommendation_service
        .recommend(
            playlist_name,
            model_id,
            DEFAULT_TOP_K_PLAYLISTS,
            DEFAULT_TOP_K_SONGS,
        )
        .await?;

    Ok(HttpResponse::Ok().json(RecommendationResponse {
        model_id: model_id.to_string(),
        recommendations,
    }))
}
