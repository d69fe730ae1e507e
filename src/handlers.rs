use crate::{
    AppState,
    auth::Principal,
    error::AppError,
    models::{AdvertisementChanges, CreateAdvertisementRequest, UpdateAdvertisementRequest},
    policy::{Operation, ensure_owner},
};
use axum::{
    Extension,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

// --- Path Extractors ---

/// AdvertisementId
///
/// The `{id}` path segment, validated before the handler body runs.
/// Only plain decimal digits are accepted: `abc`, `-1`, `+1` and `1.0` are all
/// `400 Bad Request`, as is anything that does not fit in an `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisementId(pub i64);

impl<S> FromRequestParts<S> for AdvertisementId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        parse_advertisement_id(&raw).map(AdvertisementId)
    }
}

pub fn parse_advertisement_id(raw: &str) -> Result<i64, AppError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::BadRequest(format!("invalid advertisement id {raw:?}")));
    }
    raw.parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("advertisement id {raw} is out of range")))
}

/// Decodes a JSON body. A blank body decodes as `T::default()`.
fn parse_json_body<T>(body: &Bytes) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

// --- Handlers ---

/// create_advertisement
///
/// [Authenticated Route] Posts a new advertisement.
/// The creator is always the authenticated principal; a `creator` sent in the
/// body is ignored.
#[utoipa::path(
    post,
    path = "/create-adv/",
    request_body = CreateAdvertisementRequest,
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "Created", body = String, content_type = "text/plain"),
        (status = 400, description = "Malformed JSON"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 409, description = "Storage rejected the insert"),
        (status = 422, description = "Missing or oversized field")
    )
)]
pub async fn create_advertisement(
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<String, AppError> {
    let request: CreateAdvertisementRequest = parse_json_body(&body)?;
    let new = request.into_new(principal.username);
    new.validate().map_err(AppError::Validation)?;

    let advertisement = state.repo.create_advertisement(new).await?;
    tracing::info!(
        advertisement_id = advertisement.id,
        creator = %advertisement.creator,
        "advertisement created"
    );

    Ok(format!(
        "Advertisement #{} added successfully",
        advertisement.id
    ))
}

/// list_advertisements
///
/// [Public Route] Lists every advertisement in creation order, one per line.
/// An empty store answers 404 rather than an empty listing.
#[utoipa::path(
    get,
    path = "/advertisements",
    responses(
        (status = 200, description = "Listing", body = String, content_type = "text/plain"),
        (status = 404, description = "No advertisements")
    )
)]
pub async fn list_advertisements(State(state): State<AppState>) -> Result<String, AppError> {
    let advertisements = state.repo.list_advertisements().await?;
    if advertisements.is_empty() {
        return Err(AppError::EmptyListing);
    }
    Ok(advertisements
        .iter()
        .map(|advertisement| advertisement.listing_line())
        .collect())
}

/// get_advertisement
///
/// [Public Route] Renders a single advertisement.
#[utoipa::path(
    get,
    path = "/advertisements/{id}",
    params(("id" = i64, Path, description = "Advertisement ID")),
    responses(
        (status = 200, description = "Found", body = String, content_type = "text/plain"),
        (status = 400, description = "Non-numeric id"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_advertisement(
    State(state): State<AppState>,
    AdvertisementId(id): AdvertisementId,
) -> Result<String, AppError> {
    let advertisement = state.repo.get_advertisement(id).await?;
    Ok(advertisement.to_string())
}

/// delete_advertisement
///
/// [Authenticated Route] Deletes an advertisement owned by the caller.
///
/// *Authorization*: a non-owner gets the same 404 as for a missing record.
#[utoipa::path(
    delete,
    path = "/advertisements/{id}/delete",
    params(("id" = i64, Path, description = "Advertisement ID")),
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "Deleted", body = String, content_type = "text/plain"),
        (status = 400, description = "Non-numeric id"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 404, description = "Not Found or Not Owner")
    )
)]
pub async fn delete_advertisement(
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    AdvertisementId(id): AdvertisementId,
) -> Result<String, AppError> {
    let current = state.repo.get_advertisement(id).await?;
    ensure_owner(&principal, &current, Operation::Delete)?;

    // A concurrent delete that won the race surfaces here as NotFound.
    let deleted = state.repo.delete_advertisement(id).await?;
    tracing::info!(
        advertisement_id = deleted.id,
        user = %principal.username,
        "advertisement deleted"
    );

    Ok(format!("Advertisement #{} deleted", deleted.id))
}

/// update_advertisement
///
/// [Authenticated Route] Partially updates an advertisement owned by the caller.
/// Absent, `null` and empty fields keep their stored values; the timestamp is
/// refreshed regardless.
///
/// *Authorization*: ownership is checked before the repository write, and a
/// non-owner gets the same 404 as for a missing record.
#[utoipa::path(
    patch,
    path = "/advertisements/{id}/update",
    params(("id" = i64, Path, description = "Advertisement ID")),
    request_body = UpdateAdvertisementRequest,
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "Updated", body = String, content_type = "text/plain"),
        (status = 400, description = "Non-numeric id or malformed JSON"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 404, description = "Not Found or Not Owner"),
        (status = 422, description = "Oversized or blank field")
    )
)]
pub async fn update_advertisement(
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    AdvertisementId(id): AdvertisementId,
    body: Bytes,
) -> Result<String, AppError> {
    let request: UpdateAdvertisementRequest = parse_json_body(&body)?;
    let changes = AdvertisementChanges::from(request);
    changes.validate().map_err(AppError::Validation)?;
    if changes.is_empty() {
        tracing::debug!(advertisement_id = id, "update carries no field changes");
    }

    let current = state.repo.get_advertisement(id).await?;
    ensure_owner(&principal, &current, Operation::Update)?;

    let updated = state.repo.update_advertisement(id, changes).await?;
    tracing::info!(
        advertisement_id = updated.id,
        user = %principal.username,
        "advertisement updated"
    );

    Ok(format!("Advertisement #{} updated", updated.id))
}
