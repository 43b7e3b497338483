use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;

// --- Core Schemas (Mapped to Database) ---

/// User
///
/// Caller identity from the `profiles` table. Only read by the auth extractor.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // 'admin', 'staff', or any other value for a plain authenticated user.
    pub role: String,
}

/// Referrer
///
/// A lead source row from `referrers`. This is also the record returned by
/// create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Referrer {
    pub idreferrer: i64,
    pub referrer_name: String,
    /// FK to `referrer_types.idreferrer_type`.
    pub referrer_type: i64,
}

/// ReferrerListItem
///
/// A referrer joined with its type, as returned by list and search. The type
/// columns come from a LEFT JOIN and are `None` when the join is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ReferrerListItem {
    pub idreferrer: i64,
    pub referrer_name: String,
    pub referrer_type: i64,
    pub referrer_type_name: Option<String>,
    pub referrer_type_desc: Option<String>,
}

/// ReferrerDetail
///
/// Read-one view of a referrer with the number of jobs that reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReferrerDetail {
    pub idreferrer: i64,
    pub referrer_name: String,
    pub referrer_type: i64,
    pub job_count: i64,
}

impl ReferrerDetail {
    pub fn new(referrer: Referrer, job_count: i64) -> Self {
        Self {
            idreferrer: referrer.idreferrer,
            referrer_name: referrer.referrer_name,
            referrer_type: referrer.referrer_type,
            job_count,
        }
    }
}

/// ReferrerType
///
/// A category row from `referrer_types`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ReferrerType {
    pub idreferrer_type: i64,
    pub referrer_type_name: String,
    pub referrer_type_desc: String,
}

/// ReferrerTypeDetail
///
/// Read-one view of a type with the number of referrers assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReferrerTypeDetail {
    pub idreferrer_type: i64,
    pub referrer_type_name: String,
    pub referrer_type_desc: String,
    pub referrer_count: i64,
}

impl ReferrerTypeDetail {
    pub fn new(referrer_type: ReferrerType, referrer_count: i64) -> Self {
        Self {
            idreferrer_type: referrer_type.idreferrer_type,
            referrer_type_name: referrer_type.referrer_type_name,
            referrer_type_desc: referrer_type.referrer_type_desc,
            referrer_count,
        }
    }
}

// --- Validated Inputs (Repository Arguments) ---

/// Field values for inserting or updating a referrer, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReferrer {
    pub name: String,
    pub referrer_type: i64,
}

/// Field values for inserting or updating a referrer type, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReferrerType {
    pub name: String,
    pub description: String,
}

// --- Request Payloads (Input Schemas) ---

/// TypeRef
///
/// Clients send the type id either as a JSON number or as a numeric string
/// (form-backed frontends). Both are accepted, anything else is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, expecting = "Referrer type must be a numeric id")]
pub enum TypeRef {
    Id(i64),
    Text(String),
}

impl TypeRef {
    /// Resolves to `Ok(None)` for the empty forms (`0`, `""`, `"0"`).
    pub fn resolve(&self) -> Result<Option<i64>, ApiError> {
        let id = match self {
            TypeRef::Id(id) => *id,
            TypeRef::Text(raw) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    return Ok(None);
                }
                raw.parse::<i64>().map_err(|_| {
                    ApiError::BadRequest("Referrer type must be a numeric id".to_string())
                })?
            }
        };

        match id {
            0 => Ok(None),
            id if id < 0 => Err(ApiError::BadRequest(
                "Referrer type must be a numeric id".to_string(),
            )),
            id => Ok(Some(id)),
        }
    }
}

/// ReferrerPayload
///
/// Body of `POST /referrers` and `PUT /referrers/{id}`. Every field is optional at
/// the decode step so that a missing field reports a validation message instead of
/// a parser error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReferrerPayload {
    #[serde(default)]
    #[schema(example = "Acme Realty")]
    pub referrer_name: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<i64>, example = 5)]
    #[ts(type = "number | string | null")]
    pub referrer_type: Option<TypeRef>,
}

impl ReferrerPayload {
    /// The submitted name, unless absent or blank.
    pub fn name(&self) -> Option<&str> {
        non_blank(self.referrer_name.as_deref())
    }

    /// The submitted type id, `Ok(None)` when absent or empty.
    pub fn type_id(&self) -> Result<Option<i64>, ApiError> {
        match &self.referrer_type {
            Some(type_ref) => type_ref.resolve(),
            None => Ok(None),
        }
    }
}

/// ReferrerTypePayload
///
/// Body of `POST /referrer-types` and `PUT /referrer-types/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReferrerTypePayload {
    #[serde(default)]
    #[schema(example = "Web")]
    pub referrer_type_name: Option<String>,
    /// Optional, stored as `""` when omitted or null.
    #[serde(default)]
    pub referrer_type_desc: Option<String>,
}

impl ReferrerTypePayload {
    /// Validates the payload into repository input.
    pub fn validate(self) -> Result<NewReferrerType, ApiError> {
        let name = non_blank(self.referrer_type_name.as_deref())
            .ok_or_else(|| ApiError::BadRequest("Referrer type name is required".to_string()))?
            .to_string();

        Ok(NewReferrerType {
            name,
            description: self.referrer_type_desc.unwrap_or_default(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
