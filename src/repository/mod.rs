use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewReferrer, NewReferrerType, Referrer, ReferrerListItem, ReferrerType, User,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Types seeded into an empty `referrer_types` table at startup.
pub const DEFAULT_REFERRER_TYPES: &[(&str, &str)] = &[
    ("Client", "Referred by an existing client"),
    ("Agent", "Real estate or property agent"),
    ("Builder", "Builder or trade contact"),
    ("Online", "Website, search engine or social media"),
    ("Other", "Any other lead source"),
];

/// RepoError
///
/// Failure taxonomy of the persistence layer. Handlers translate these into
/// `ApiError` at the operation boundary.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The row is still referenced by another table (delete blocked).
    #[error("record is still referenced by other rows")]
    InUse,
    /// An insert or update points at a row that does not exist.
    #[error("referenced record does not exist")]
    UnknownReference,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository Trait
///
/// Persistence contract for referrers, referrer types and the caller lookup
/// used by authentication. Single-row operations only; each call is either
/// fully applied or not applied.
///
/// `Option` return values mean "no such row", never "failed".
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Auth ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;

    // --- Referrers ---
    /// Lists referrers joined with their type, optionally restricted to one type.
    async fn list_referrers(&self, referrer_type: Option<i64>) -> RepoResult<Vec<ReferrerListItem>>;
    async fn get_referrer(&self, id: i64) -> RepoResult<Option<Referrer>>;
    /// Number of jobs referencing the referrer.
    async fn count_referrer_jobs(&self, id: i64) -> RepoResult<i64>;
    /// Inserts and returns the row with its store-assigned id.
    /// `UnknownReference` when the type does not exist.
    async fn create_referrer(&self, new: &NewReferrer) -> RepoResult<Referrer>;
    async fn update_referrer(&self, id: i64, new: &NewReferrer) -> RepoResult<Option<Referrer>>;
    /// `Ok(false)` when absent, `InUse` when a job still references it.
    async fn delete_referrer(&self, id: i64) -> RepoResult<bool>;
    /// Case-insensitive partial match on the referrer name or type name.
    async fn search_referrers(&self, keyword: &str) -> RepoResult<Vec<ReferrerListItem>>;

    // --- Referrer Types ---
    async fn list_referrer_types(&self) -> RepoResult<Vec<ReferrerType>>;
    async fn get_referrer_type(&self, id: i64) -> RepoResult<Option<ReferrerType>>;
    /// Number of referrers assigned to the type.
    async fn count_type_referrers(&self, id: i64) -> RepoResult<i64>;
    async fn create_referrer_type(&self, new: &NewReferrerType) -> RepoResult<ReferrerType>;
    async fn update_referrer_type(
        &self,
        id: i64,
        new: &NewReferrerType,
    ) -> RepoResult<Option<ReferrerType>>;
    /// `Ok(false)` when absent, `InUse` when a referrer still references it.
    async fn delete_referrer_type(&self, id: i64) -> RepoResult<bool>;

    /// Seeds `DEFAULT_REFERRER_TYPES` when no type exists yet and returns the
    /// number of rows inserted. Calling it again is a no-op.
    async fn ensure_default_types(&self) -> RepoResult<u64>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
