//! Character endpoints, nested under a world the caller owns.

use super::ApiError;
use crate::auth::{CurrentUser, User};
use crate::characters::{validate_character, Character, CharacterView};
use crate::services::Services;
use crate::validation::Validator;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCharacterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCharacterRequest {
    pub name: Option<String>,
    pub intro: Option<String>,
    pub attributes: Option<Map<String, Value>>,
    pub cover_image: Option<String>,
}

/// 404 unless `world_id` names one of the caller's worlds.
fn ensure_world(services: &Services, user: &User, world_id: &str) -> Result<(), ApiError> {
    services.worlds.get(&user.email, world_id)?;
    Ok(())
}

fn location(character: &Character) -> [(header::HeaderName, String); 1] {
    [(
        header::LOCATION,
        format!(
            "/v1/worlds/{}/characters/{}",
            character.world_id, character.id
        ),
    )]
}

/// POST /v1/worlds/:world_id/characters
pub async fn create_character(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path(world_id): Path<String>,
    payload: Result<Json<CreateCharacterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_world(&services, &user, &world_id)?;
    let Json(input) = payload?;

    let owner_id = if input.owner_id.is_empty() {
        user.email.clone()
    } else {
        input.owner_id
    };
    let mut character = Character {
        world_id,
        name: input.name,
        intro: input.intro,
        cover_image: input.cover_image,
        owner_id,
        ..Character::default()
    };
    character
        .set_attributes(&input.attributes)
        .map_err(ApiError::internal)?;

    let mut v = Validator::new();
    validate_character(&mut v, &character);
    v.finish()?;

    services.characters.insert(&mut character)?;
    let view = CharacterView::from_character(&character)?;

    Ok((
        StatusCode::CREATED,
        location(&character),
        Json(json!({ "character": view })),
    ))
}

/// GET /v1/worlds/:world_id/characters
pub async fn list_characters(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path(world_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_world(&services, &user, &world_id)?;

    let characters = services
        .characters
        .list(&world_id)?
        .iter()
        .map(CharacterView::from_character)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(json!({ "characters": characters })))
}

/// GET /v1/worlds/:world_id/characters/:character_id
pub async fn get_character(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path((world_id, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_world(&services, &user, &world_id)?;

    let character = services.characters.get(&world_id, &id)?;
    let view = CharacterView::from_character(&character)?;
    Ok(Json(json!({ "character": view })))
}

/// PATCH /v1/worlds/:world_id/characters/:character_id
pub async fn update_character(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path((world_id, id)): Path<(String, String)>,
    payload: Result<Json<UpdateCharacterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_world(&services, &user, &world_id)?;
    let mut character = services.characters.get(&world_id, &id)?;
    let Json(input) = payload?;

    if let Some(name) = input.name {
        character.name = name;
    }
    if let Some(intro) = input.intro {
        character.intro = intro;
    }
    if let Some(attributes) = input.attributes {
        character
            .set_attributes(&attributes)
            .map_err(ApiError::internal)?;
    }
    if let Some(cover) = input.cover_image {
        character.cover_image = cover;
    }

    let mut v = Validator::new();
    validate_character(&mut v, &character);
    v.finish()?;

    services.characters.update(&world_id, &id, &mut character)?;
    let view = CharacterView::from_character(&character)?;

    Ok((
        StatusCode::OK,
        location(&character),
        Json(json!({ "character": view })),
    ))
}

/// DELETE /v1/worlds/:world_id/characters/:character_id
pub async fn delete_character(
    State(services): State<Services>,
    CurrentUser(user): CurrentUser,
    Path((world_id, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_world(&services, &user, &world_id)?;

    services.characters.delete(&world_id, &id)?;
    Ok(Json(json!({ "message": "character successfully deleted" })))
}
