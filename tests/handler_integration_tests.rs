use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use referrer_service::{
    AppState, ApiError,
    auth::AuthUser,
    config::AppConfig,
    handlers::{
        RawBody, referrer_types,
        referrers::{self, ReferrerFilter, SearchQuery},
    },
    models::{
        NewReferrer, NewReferrerType, Referrer, ReferrerListItem, ReferrerType, User,
    },
    repository::{RepoError, RepoResult, Repository},
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// --- MOCK REPOSITORY IMPLEMENTATION ---

/// Failure the mock should answer write operations with.
#[derive(Clone, Copy, Default)]
enum Failure {
    #[default]
    None,
    InUse,
    UnknownReference,
    Database,
}

impl Failure {
    fn check(self) -> RepoResult<()> {
        match self {
            Failure::None => Ok(()),
            Failure::InUse => Err(RepoError::InUse),
            Failure::UnknownReference => Err(RepoError::UnknownReference),
            Failure::Database => Err(RepoError::Database(sqlx::Error::PoolTimedOut)),
        }
    }
}

// Handlers depend on the trait, so the mock controls what each store call
// returns and records which calls were made.
#[derive(Default)]
struct MockRepoControl {
    referrer: Option<Referrer>,
    referrer_type: Option<ReferrerType>,
    // Answer of `update_referrer` when `write_failure` is None.
    update_finds_row: bool,
    write_failure: Failure,
    read_failure: Failure,
    calls: Mutex<Vec<&'static str>>,
    created_input: Mutex<Option<NewReferrer>>,
}

impl MockRepoControl {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn called(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| *c == call)
    }
}

#[async_trait]
impl Repository for MockRepoControl {
    async fn get_user(&self, _id: Uuid) -> RepoResult<Option<User>> {
        Ok(None)
    }

    async fn list_referrers(&self, _referrer_type: Option<i64>) -> RepoResult<Vec<ReferrerListItem>> {
        self.record("list_referrers");
        self.read_failure.check()?;
        Ok(vec![])
    }

    async fn get_referrer(&self, _id: i64) -> RepoResult<Option<Referrer>> {
        self.record("get_referrer");
        self.read_failure.check()?;
        Ok(self.referrer.clone())
    }

    async fn count_referrer_jobs(&self, _id: i64) -> RepoResult<i64> {
        self.record("count_referrer_jobs");
        self.write_failure.check()?;
        Ok(3)
    }

    async fn create_referrer(&self, new: &NewReferrer) -> RepoResult<Referrer> {
        self.record("create_referrer");
        *self.created_input.lock().unwrap() = Some(new.clone());
        self.write_failure.check()?;
        Ok(Referrer {
            idreferrer: 42,
            referrer_name: new.name.clone(),
            referrer_type: new.referrer_type,
        })
    }

    async fn update_referrer(&self, id: i64, new: &NewReferrer) -> RepoResult<Option<Referrer>> {
        self.record("update_referrer");
        self.write_failure.check()?;
        Ok(self.update_finds_row.then(|| Referrer {
            idreferrer: id,
            referrer_name: new.name.clone(),
            referrer_type: new.referrer_type,
        }))
    }

    async fn delete_referrer(&self, _id: i64) -> RepoResult<bool> {
        self.record("delete_referrer");
        self.write_failure.check()?;
        Ok(true)
    }

    async fn search_referrers(&self, _keyword: &str) -> RepoResult<Vec<ReferrerListItem>> {
        self.record("search_referrers");
        self.read_failure.check()?;
        Ok(vec![])
    }

    async fn list_referrer_types(&self) -> RepoResult<Vec<ReferrerType>> {
        self.record("list_referrer_types");
        self.read_failure.check()?;
        Ok(self.referrer_type.clone().into_iter().collect())
    }

    async fn get_referrer_type(&self, _id: i64) -> RepoResult<Option<ReferrerType>> {
        self.record("get_referrer_type");
        self.read_failure.check()?;
        Ok(self.referrer_type.clone())
    }

    async fn count_type_referrers(&self, _id: i64) -> RepoResult<i64> {
        self.record("count_type_referrers");
        Ok(0)
    }

    async fn create_referrer_type(&self, new: &NewReferrerType) -> RepoResult<ReferrerType> {
        self.record("create_referrer_type");
        self.write_failure.check()?;
        Ok(ReferrerType {
            idreferrer_type: 7,
            referrer_type_name: new.name.clone(),
            referrer_type_desc: new.description.clone(),
        })
    }

    async fn update_referrer_type(
        &self,
        _id: i64,
        _new: &NewReferrerType,
    ) -> RepoResult<Option<ReferrerType>> {
        self.record("update_referrer_type");
        self.write_failure.check()?;
        Ok(self.referrer_type.clone())
    }

    async fn delete_referrer_type(&self, _id: i64) -> RepoResult<bool> {
        self.record("delete_referrer_type");
        self.write_failure.check()?;
        Ok(true)
    }

    async fn ensure_default_types(&self) -> RepoResult<u64> {
        Ok(0)
    }
}

// --- TEST UTILITIES ---

fn setup(repo: MockRepoControl) -> (AppState, Arc<MockRepoControl>) {
    let repo = Arc::new(repo);
    let state = AppState {
        repo: repo.clone(),
        config: AppConfig::default(),
    };
    (state, repo)
}

fn user(role: &str) -> AuthUser {
    AuthUser {
        id: Uuid::from_u128(10),
        role: role.to_string(),
    }
}

fn existing_referrer() -> Referrer {
    Referrer {
        idreferrer: 1,
        referrer_name: "Harbour Realty".to_string(),
        referrer_type: 5,
    }
}

fn existing_type() -> ReferrerType {
    ReferrerType {
        idreferrer_type: 5,
        referrer_type_name: "Agent".to_string(),
        referrer_type_desc: String::new(),
    }
}

fn body(raw: &'static str) -> RawBody {
    Ok(Bytes::from_static(raw.as_bytes()))
}

// --- Referrers ---

#[tokio::test]
async fn test_create_referrer_passes_validated_input() {
    let (state, repo) = setup(MockRepoControl::default());

    let response = referrers::create_referrer(
        user("staff"),
        State(state),
        body(r#"{"referrer_name":"Acme","referrer_type":"5"}"#),
    )
    .await
    .unwrap();

    assert_eq!(response.status_code, StatusCode::CREATED);
    assert_eq!(response.data.unwrap().idreferrer, 42);
    assert_eq!(
        repo.created_input.lock().unwrap().clone(),
        Some(NewReferrer {
            name: "Acme".to_string(),
            referrer_type: 5,
        })
    );
}

#[tokio::test]
async fn test_create_referrer_forbidden_before_body_is_read() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrers::create_referrer(user("viewer"), State(state), body("not json"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Forbidden("Only staff members can create referrers".to_string())
    );
    assert!(repo.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_referrer_unknown_type_is_constraint() {
    let (state, _) = setup(MockRepoControl {
        write_failure: Failure::UnknownReference,
        ..Default::default()
    });

    let err = referrers::create_referrer(
        user("admin"),
        State(state),
        body(r#"{"referrer_name":"Acme","referrer_type":99}"#),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err,
        ApiError::Constraint("Referrer type does not exist".to_string())
    );
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_referrer_database_error_is_opaque_500() {
    let (state, _) = setup(MockRepoControl {
        write_failure: Failure::Database,
        ..Default::default()
    });

    let err = referrers::create_referrer(
        user("staff"),
        State(state),
        body(r#"{"referrer_name":"Acme","referrer_type":5}"#),
    )
    .await
    .unwrap_err();

    assert_eq!(err, ApiError::Internal("Unable to create referrer".to_string()));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_list_referrers_filter_is_validated_before_store_call() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrers::list_referrers(
        user("viewer"),
        State(state),
        Ok(Query(ReferrerFilter {
            referrer_type: Some("x1".to_string()),
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert!(!repo.called("list_referrers"));
}

#[tokio::test]
async fn test_get_referrer_count_failure_is_500() {
    let (state, _) = setup(MockRepoControl {
        referrer: Some(existing_referrer()),
        write_failure: Failure::Database,
        ..Default::default()
    });

    let err = referrers::get_referrer(user("viewer"), State(state), Path("1".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::Internal("Unable to retrieve referrer".to_string()));
}

#[tokio::test]
async fn test_get_referrer_non_numeric_id_skips_store() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrers::get_referrer(user("viewer"), State(state), Path("abc".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::NotFound("Referrer not found".to_string()));
    assert!(repo.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_missing_referrer_never_calls_update() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrers::update_referrer(
        user("staff"),
        State(state),
        Path("99999".to_string()),
        body("{{{"),
    )
    .await
    .unwrap_err();

    assert_eq!(err, ApiError::NotFound("Referrer not found".to_string()));
    assert!(repo.called("get_referrer"));
    assert!(!repo.called("update_referrer"));
}

#[tokio::test]
async fn test_update_referrer_row_vanished_is_404() {
    // Present at the existence check, gone by the time of the update.
    let (state, _) = setup(MockRepoControl {
        referrer: Some(existing_referrer()),
        update_finds_row: false,
        ..Default::default()
    });

    let err = referrers::update_referrer(
        user("staff"),
        State(state),
        Path("1".to_string()),
        body(r#"{"referrer_name":"Acme","referrer_type":5}"#),
    )
    .await
    .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_referrer_success() {
    let (state, _) = setup(MockRepoControl {
        referrer: Some(existing_referrer()),
        update_finds_row: true,
        ..Default::default()
    });

    let response = referrers::update_referrer(
        user("admin"),
        State(state),
        Path("1".to_string()),
        body(r#"{"referrer_name":"Acme","referrer_type":6}"#),
    )
    .await
    .unwrap();

    assert_eq!(response.status_code, StatusCode::OK);
    assert_eq!(response.message, "Referrer updated successfully");
    let updated = response.data.unwrap();
    assert_eq!(updated.idreferrer, 1);
    assert_eq!(updated.referrer_type, 6);
}

#[tokio::test]
async fn test_delete_missing_referrer_never_calls_delete() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrers::delete_referrer(user("admin"), State(state), Path("5".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert!(!repo.called("delete_referrer"));
}

#[tokio::test]
async fn test_delete_referrer_in_use_is_constraint() {
    let (state, _) = setup(MockRepoControl {
        referrer: Some(existing_referrer()),
        write_failure: Failure::InUse,
        ..Default::default()
    });

    let err = referrers::delete_referrer(user("admin"), State(state), Path("1".to_string()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Constraint(
            "Cannot delete this referrer as it is used in one or more jobs".to_string()
        )
    );
}

#[tokio::test]
async fn test_delete_referrer_success_has_no_data() {
    let (state, repo) = setup(MockRepoControl {
        referrer: Some(existing_referrer()),
        ..Default::default()
    });

    let response = referrers::delete_referrer(user("admin"), State(state), Path("1".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status_code, StatusCode::OK);
    assert_eq!(response.message, "Referrer deleted successfully");
    assert!(response.data.is_none());
    assert!(repo.called("delete_referrer"));
}

#[tokio::test]
async fn test_search_keyword_checked_before_auth_result() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrers::search_referrers(
        Err(ApiError::unauthenticated()),
        State(state.clone()),
        Ok(Query(SearchQuery { q: None })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, ApiError::BadRequest("Search keyword is required".to_string()));

    let err = referrers::search_referrers(
        Err(ApiError::unauthenticated()),
        State(state),
        Ok(Query(SearchQuery {
            q: Some("acme".to_string()),
        })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, ApiError::unauthenticated());

    assert!(!repo.called("search_referrers"));
}

#[tokio::test]
async fn test_search_store_failure_is_500() {
    let (state, _) = setup(MockRepoControl {
        read_failure: Failure::Database,
        ..Default::default()
    });

    let err = referrers::search_referrers(
        Ok(user("viewer")),
        State(state),
        Ok(Query(SearchQuery {
            q: Some("acme".to_string()),
        })),
    )
    .await
    .unwrap_err();

    assert_eq!(err, ApiError::Internal("Unable to search referrers".to_string()));
}

// --- Referrer Types ---

#[tokio::test]
async fn test_create_referrer_type_admin_only() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrer_types::create_referrer_type(
        user("staff"),
        State(state.clone()),
        body(r#"{"referrer_type_name":"Web"}"#),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    assert!(!repo.called("create_referrer_type"));

    let response = referrer_types::create_referrer_type(
        user("admin"),
        State(state),
        body(r#"{"referrer_type_name":"Web"}"#),
    )
    .await
    .unwrap();
    assert_eq!(response.status_code, StatusCode::CREATED);
    assert_eq!(response.data.unwrap().referrer_type_desc, "");
}

#[tokio::test]
async fn test_update_missing_referrer_type_never_calls_update() {
    let (state, repo) = setup(MockRepoControl::default());

    let err = referrer_types::update_referrer_type(
        user("admin"),
        State(state),
        Path("3".to_string()),
        body(""),
    )
    .await
    .unwrap_err();

    assert_eq!(err, ApiError::NotFound("Referrer type not found".to_string()));
    assert!(!repo.called("update_referrer_type"));
}

#[tokio::test]
async fn test_update_referrer_type_empty_body() {
    let (state, _) = setup(MockRepoControl {
        referrer_type: Some(existing_type()),
        ..Default::default()
    });

    let err = referrer_types::update_referrer_type(
        user("admin"),
        State(state),
        Path("5".to_string()),
        body("  "),
    )
    .await
    .unwrap_err();

    assert_eq!(err, ApiError::BadRequest("No data provided".to_string()));
}

#[tokio::test]
async fn test_delete_referrer_type_in_use_is_constraint() {
    let (state, _) = setup(MockRepoControl {
        referrer_type: Some(existing_type()),
        write_failure: Failure::InUse,
        ..Default::default()
    });

    let err = referrer_types::delete_referrer_type(user("admin"), State(state), Path("5".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        err.to_string(),
        "Cannot delete this referrer type as it is used by one or more referrers"
    );
}

#[tokio::test]
async fn test_list_referrer_types_failure_is_500() {
    let (state, _) = setup(MockRepoControl {
        read_failure: Failure::Database,
        ..Default::default()
    });

    let err = referrer_types::list_referrer_types(user("viewer"), State(state))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Internal("Unable to retrieve referrer types".to_string())
    );
}
