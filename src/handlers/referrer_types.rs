use axum::extract::{Path, State};

use super::{RawBody, decode_body, parse_id, store_failure};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{ReferrerType, ReferrerTypeDetail, ReferrerTypePayload},
    repository::RepoError,
    response::ApiResponse,
};

const NOT_FOUND: &str = "Referrer type not found";

/// list_referrer_types
///
/// [Authenticated] Lists every referrer type.
#[utoipa::path(
    get,
    path = "/referrer-types",
    responses(
        (status = 200, description = "Referrer types", body = [ReferrerType]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_referrer_types(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<ReferrerType>>, ApiError> {
    let types = state
        .repo
        .list_referrer_types()
        .await
        .map_err(|e| store_failure("Unable to retrieve referrer types", e))?;

    let message = if types.is_empty() {
        "No referrer types found"
    } else {
        "Referrer types retrieved successfully"
    };
    Ok(ApiResponse::ok(message, types))
}

/// create_referrer_type
///
/// [Admin] Inserts a referrer type. A missing description is stored as "".
#[utoipa::path(
    post,
    path = "/referrer-types",
    request_body = ReferrerTypePayload,
    responses(
        (status = 201, description = "Created", body = ReferrerType),
        (status = 400, description = "Missing name or invalid JSON"),
        (status = 403, description = "Not admin")
    )
)]
pub async fn create_referrer_type(
    auth: AuthUser,
    State(state): State<AppState>,
    body: RawBody,
) -> Result<ApiResponse<ReferrerType>, ApiError> {
    auth.require_admin("Only administrators can create referrer types")?;

    let new = decode_body::<ReferrerTypePayload>(body)?.validate()?;

    let referrer_type = state
        .repo
        .create_referrer_type(&new)
        .await
        .map_err(|e| store_failure("Unable to create referrer type", e))?;

    tracing::info!(
        idreferrer_type = referrer_type.idreferrer_type,
        user = %auth.id,
        "referrer type created"
    );
    Ok(ApiResponse::created(
        "Referrer type created successfully",
        referrer_type,
    ))
}

/// get_referrer_type
///
/// [Authenticated] Reads one type together with the number of referrers using it.
#[utoipa::path(
    get,
    path = "/referrer-types/{id}",
    params(("id" = i64, Path, description = "Referrer type ID")),
    responses(
        (status = 200, description = "Found", body = ReferrerTypeDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_referrer_type(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ReferrerTypeDetail>, ApiError> {
    let id = parse_id(&id, NOT_FOUND)?;

    let referrer_type = state
        .repo
        .get_referrer_type(id)
        .await
        .map_err(|e| store_failure("Unable to retrieve referrer type", e))?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_string()))?;

    let referrer_count = state
        .repo
        .count_type_referrers(id)
        .await
        .map_err(|e| store_failure("Unable to retrieve referrer type", e))?;

    Ok(ApiResponse::ok(
        "Referrer type retrieved successfully",
        ReferrerTypeDetail::new(referrer_type, referrer_count),
    ))
}

/// update_referrer_type
///
/// [Admin] Replaces the name and description of an existing type.
#[utoipa::path(
    put,
    path = "/referrer-types/{id}",
    params(("id" = i64, Path, description = "Referrer type ID")),
    request_body = ReferrerTypePayload,
    responses(
        (status = 200, description = "Updated", body = ReferrerType),
        (status = 400, description = "Missing name or invalid JSON"),
        (status = 403, description = "Not admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_referrer_type(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: RawBody,
) -> Result<ApiResponse<ReferrerType>, ApiError> {
    auth.require_admin("Only administrators can update referrer types")?;
    let id = parse_id(&id, NOT_FOUND)?;

    let exists = state
        .repo
        .get_referrer_type(id)
        .await
        .map_err(|e| store_failure("Unable to update referrer type", e))?
        .is_some();
    if !exists {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }

    let new = decode_body::<ReferrerTypePayload>(body)?.validate()?;

    let referrer_type = state
        .repo
        .update_referrer_type(id, &new)
        .await
        .map_err(|e| store_failure("Unable to update referrer type", e))?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_string()))?;

    tracing::info!(idreferrer_type = id, user = %auth.id, "referrer type updated");
    Ok(ApiResponse::ok(
        "Referrer type updated successfully",
        referrer_type,
    ))
}

/// delete_referrer_type
///
/// [Admin] Deletes a type that no referrer uses.
#[utoipa::path(
    delete,
    path = "/referrer-types/{id}",
    params(("id" = i64, Path, description = "Referrer type ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 400, description = "Used by a referrer"),
        (status = 403, description = "Not admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_referrer_type(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    auth.require_admin("Only administrators can delete referrer types")?;
    let id = parse_id(&id, NOT_FOUND)?;

    let exists = state
        .repo
        .get_referrer_type(id)
        .await
        .map_err(|e| store_failure("Unable to delete referrer type", e))?
        .is_some();
    if !exists {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }

    match state.repo.delete_referrer_type(id).await {
        Ok(true) => {
            tracing::info!(idreferrer_type = id, user = %auth.id, "referrer type deleted");
            Ok(ApiResponse::message("Referrer type deleted successfully"))
        }
        Ok(false) => Err(ApiError::NotFound(NOT_FOUND.to_string())),
        Err(RepoError::InUse) => {
            tracing::warn!(idreferrer_type = id, "delete blocked, type has referrers");
            Err(ApiError::Constraint(
                "Cannot delete this referrer type as it is used by one or more referrers"
                    .to_string(),
            ))
        }
        Err(e) => Err(store_failure("Unable to delete referrer type", e)),
    }
}
