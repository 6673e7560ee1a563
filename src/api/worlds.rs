//! World endpoints. Every world is scoped to the calling user.

use super::ApiError;
use crate::auth::CurrentUser;
use crate::services::Services;
use crate::validation::Validator;
use crate::worlds::{validate_world, World};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorldRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Base64 image, optionally as a `data:` URL.
    #[serde(default, alias = "cover")]
    pub cover_image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorldRequest {
    pub name: Option<String>,
    pub intro: Option<String>,
    pub genres: Option<Vec<String>>,
    pub cover_image: Option<String>,
}

fn location(world: &World) -> [(header::HeaderName, String); 1] {
    [(header::LOCATION, format!("/v1/worlds/{}", world.id))]
}

/// POST /v1/worlds
pub async fn create_world(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreateWorldRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;

    let mut world = World {
        user_id: user.email,
        name: input.name,
        intro: input.intro,
        genres: input.genres,
        cover_image: input.cover_image,
        ..World::default()
    };

    let mut v = Validator::new();
    validate_world(&mut v, &world);
    v.finish()?;

    services.worlds.insert(&mut world)?;

    Ok((
        StatusCode::CREATED,
        location(&world),
        Json(json!({ "world": world })),
    ))
}

/// GET /v1/worlds
pub async fn list_worlds(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let worlds = services.worlds.list(&user.email)?;
    Ok(Json(json!({ "worlds": worlds })))
}

/// GET /v1/worlds/:world_id
pub async fn get_world(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let world = services.worlds.get(&user.email, &id)?;
    Ok(Json(json!({ "world": world })))
}

/// PATCH /v1/worlds/:world_id
pub async fn update_world(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateWorldRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut world = services.worlds.get(&user.email, &id)?;
    let Json(input) = payload?;

    if let Some(name) = input.name {
        world.name = name;
    }
    if let Some(intro) = input.intro {
        world.intro = intro;
    }
    if let Some(genres) = input.genres {
        world.genres = genres;
    }
    let mut image_updated = false;
    if let Some(cover) = input.cover_image {
        image_updated = !cover.is_empty();
        world.cover_image = cover;
    }

    let mut v = Validator::new();
    validate_world(&mut v, &world);
    v.finish()?;

    services
        .worlds
        .update(&user.email, &id, &mut world, image_updated)?;

    Ok((StatusCode::OK, location(&world), Json(json!({ "world": world }))))
}

/// DELETE /v1/worlds/:world_id, removing its characters first.
pub async fn delete_world(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    services.delete_world(&user.email, &id)?;
    Ok(Json(json!({ "message": "world successfully deleted" })))
}
