use axum::extract::{Path, Query, State, rejection::QueryRejection};
use serde::Deserialize;

use super::{RawBody, decode_body, parse_id, store_failure};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{NewReferrer, Referrer, ReferrerDetail, ReferrerListItem, ReferrerPayload},
    repository::RepoError,
    response::ApiResponse,
};

const NOT_FOUND: &str = "Referrer not found";

// --- Query Structs ---

/// ReferrerFilter
///
/// Query parameters of `GET /referrers`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReferrerFilter {
    /// Only list referrers of this type id. Empty means no filter.
    #[serde(rename = "type")]
    pub referrer_type: Option<String>,
}

impl ReferrerFilter {
    fn type_id(&self) -> Result<Option<i64>, ApiError> {
        match self.referrer_type.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
                ApiError::BadRequest("Referrer type filter must be a numeric id".to_string())
            }),
        }
    }
}

/// SearchQuery
///
/// Query parameters of `GET /referrers/search`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Keyword matched against referrer and type names.
    pub q: Option<String>,
}

// --- Handlers ---

/// create_referrer
///
/// [Staff] Inserts a referrer. The id is assigned by the store.
#[utoipa::path(
    post,
    path = "/referrers",
    request_body = ReferrerPayload,
    responses(
        (status = 201, description = "Created", body = Referrer),
        (status = 400, description = "Missing fields, invalid JSON or unknown type"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not staff")
    )
)]
pub async fn create_referrer(
    auth: AuthUser,
    State(state): State<AppState>,
    body: RawBody,
) -> Result<ApiResponse<Referrer>, ApiError> {
    auth.require_staff("Only staff members can create referrers")?;

    let payload: ReferrerPayload = decode_body(body)?;
    let type_id = payload.type_id()?;
    let (Some(name), Some(referrer_type)) = (payload.name(), type_id) else {
        return Err(ApiError::BadRequest(
            "Referrer name and type are required".to_string(),
        ));
    };

    let new = NewReferrer {
        name: name.to_string(),
        referrer_type,
    };

    let referrer = state.repo.create_referrer(&new).await.map_err(|e| match e {
        RepoError::UnknownReference => {
            ApiError::Constraint("Referrer type does not exist".to_string())
        }
        other => store_failure("Unable to create referrer", other),
    })?;

    tracing::info!(idreferrer = referrer.idreferrer, user = %auth.id, "referrer created");
    Ok(ApiResponse::created("Referrer created successfully", referrer))
}

/// list_referrers
///
/// [Authenticated] Lists referrers with their type name and description.
/// An empty result is still a success.
#[utoipa::path(
    get,
    path = "/referrers",
    params(ReferrerFilter),
    responses(
        (status = 200, description = "Referrers", body = [ReferrerListItem]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_referrers(
    _auth: AuthUser,
    State(state): State<AppState>,
    filter: Result<Query<ReferrerFilter>, QueryRejection>,
) -> Result<ApiResponse<Vec<ReferrerListItem>>, ApiError> {
    let Query(filter) = filter?;
    let type_id = filter.type_id()?;

    let referrers = state
        .repo
        .list_referrers(type_id)
        .await
        .map_err(|e| store_failure("Unable to retrieve referrers", e))?;

    let message = if referrers.is_empty() {
        "No referrers found"
    } else {
        "Referrers retrieved successfully"
    };
    Ok(ApiResponse::ok(message, referrers))
}

/// get_referrer
///
/// [Authenticated] Reads one referrer together with its job count.
#[utoipa::path(
    get,
    path = "/referrers/{id}",
    params(("id" = i64, Path, description = "Referrer ID")),
    responses(
        (status = 200, description = "Found", body = ReferrerDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_referrer(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ReferrerDetail>, ApiError> {
    let id = parse_id(&id, NOT_FOUND)?;

    let referrer = state
        .repo
        .get_referrer(id)
        .await
        .map_err(|e| store_failure("Unable to retrieve referrer", e))?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_string()))?;

    let job_count = state
        .repo
        .count_referrer_jobs(id)
        .await
        .map_err(|e| store_failure("Unable to retrieve referrer", e))?;

    Ok(ApiResponse::ok(
        "Referrer retrieved successfully",
        ReferrerDetail::new(referrer, job_count),
    ))
}

/// update_referrer
///
/// [Staff] Replaces the name and type of an existing referrer. Existence is
/// checked before the body is looked at, so an unknown id is a 404 whatever
/// was sent.
#[utoipa::path(
    put,
    path = "/referrers/{id}",
    params(("id" = i64, Path, description = "Referrer ID")),
    request_body = ReferrerPayload,
    responses(
        (status = 200, description = "Updated", body = Referrer),
        (status = 400, description = "Missing fields, invalid JSON or unknown type"),
        (status = 403, description = "Not staff"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_referrer(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: RawBody,
) -> Result<ApiResponse<Referrer>, ApiError> {
    auth.require_staff("Only staff members can update referrers")?;
    let id = parse_id(&id, NOT_FOUND)?;

    let exists = state
        .repo
        .get_referrer(id)
        .await
        .map_err(|e| store_failure("Unable to update referrer", e))?
        .is_some();
    if !exists {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }

    let payload: ReferrerPayload = decode_body(body)?;
    let name = payload
        .name()
        .ok_or_else(|| ApiError::BadRequest("Referrer name is required".to_string()))?;
    let referrer_type = payload
        .type_id()?
        .ok_or_else(|| ApiError::BadRequest("Referrer type is required".to_string()))?;

    let new = NewReferrer {
        name: name.to_string(),
        referrer_type,
    };

    let referrer = state
        .repo
        .update_referrer(id, &new)
        .await
        .map_err(|e| match e {
            RepoError::UnknownReference => {
                ApiError::Constraint("Referrer type does not exist".to_string())
            }
            other => store_failure("Unable to update referrer", other),
        })?
        // Deleted between the existence check and the update.
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_string()))?;

    tracing::info!(idreferrer = id, user = %auth.id, "referrer updated");
    Ok(ApiResponse::ok("Referrer updated successfully", referrer))
}

/// delete_referrer
///
/// [Admin] Deletes a referrer that no job references.
#[utoipa::path(
    delete,
    path = "/referrers/{id}",
    params(("id" = i64, Path, description = "Referrer ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 400, description = "Referenced by a job"),
        (status = 403, description = "Not admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_referrer(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    auth.require_admin("Only administrators can delete referrers")?;
    let id = parse_id(&id, NOT_FOUND)?;

    let exists = state
        .repo
        .get_referrer(id)
        .await
        .map_err(|e| store_failure("Unable to delete referrer", e))?
        .is_some();
    if !exists {
        return Err(ApiError::NotFound(NOT_FOUND.to_string()));
    }

    match state.repo.delete_referrer(id).await {
        Ok(true) => {
            tracing::info!(idreferrer = id, user = %auth.id, "referrer deleted");
            Ok(ApiResponse::message("Referrer deleted successfully"))
        }
        Ok(false) => Err(ApiError::NotFound(NOT_FOUND.to_string())),
        Err(RepoError::InUse) => {
            tracing::warn!(idreferrer = id, "delete blocked, referrer has jobs");
            Err(ApiError::Constraint(
                "Cannot delete this referrer as it is used in one or more jobs".to_string(),
            ))
        }
        Err(e) => Err(store_failure("Unable to delete referrer", e)),
    }
}

/// search_referrers
///
/// [Authenticated] Partial, case-insensitive match on referrer or type name.
///
/// The keyword is validated before the authentication result is looked at, so
/// an empty keyword is a 400 for every caller.
#[utoipa::path(
    get,
    path = "/referrers/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matches", body = [ReferrerListItem]),
        (status = 400, description = "Empty keyword"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn search_referrers(
    auth: Result<AuthUser, ApiError>,
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<ReferrerListItem>>, ApiError> {
    // A malformed query string is a client error, reported before the auth result too.
    let Query(query) = query?;
    let keyword = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|kw| !kw.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Search keyword is required".to_string()))?;

    let _auth = auth?;

    let matches = state
        .repo
        .search_referrers(keyword)
        .await
        .map_err(|e| store_failure("Unable to search referrers", e))?;

    let message = if matches.is_empty() {
        "No referrers found for the search criteria"
    } else {
        "Referrers found"
    };
    Ok(ApiResponse::ok(message, matches))
}
