use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{DEFAULT_REFERRER_TYPES, RepoError, RepoResult, Repository};
use crate::models::{
    NewReferrer, NewReferrerType, Referrer, ReferrerListItem, ReferrerType, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    referrer_types: BTreeMap<i64, ReferrerType>,
    referrers: BTreeMap<i64, Referrer>,
    // One entry per job, holding the referrer it points at.
    jobs: Vec<i64>,
    // Highest id ever handed out or inserted. Ids of deleted rows are not reused.
    last_referrer_id: i64,
    last_type_id: i64,
}

impl Tables {
    fn next_referrer_id(&mut self) -> i64 {
        self.last_referrer_id += 1;
        self.last_referrer_id
    }

    fn next_type_id(&mut self) -> i64 {
        self.last_type_id += 1;
        self.last_type_id
    }

    fn list_item(&self, referrer: &Referrer) -> ReferrerListItem {
        let referrer_type = self.referrer_types.get(&referrer.referrer_type);
        ReferrerListItem {
            idreferrer: referrer.idreferrer,
            referrer_name: referrer.referrer_name.clone(),
            referrer_type: referrer.referrer_type,
            referrer_type_name: referrer_type.map(|t| t.referrer_type_name.clone()),
            referrer_type_desc: referrer_type.map(|t| t.referrer_type_desc.clone()),
        }
    }

    fn sorted(mut items: Vec<ReferrerListItem>) -> Vec<ReferrerListItem> {
        items.sort_by(|a, b| {
            a.referrer_name
                .cmp(&b.referrer_name)
                .then(a.idreferrer.cmp(&b.idreferrer))
        });
        items
    }
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory, with the same referential
/// rules as the Postgres schema (restricted deletes, type must exist). Used by
/// the router and handler tests, and handy for running the API without a database.
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    /// When true, every referrer/type operation fails with `Unavailable`.
    /// User lookups keep working so requests still authenticate.
    pub should_fail: bool,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            should_fail: false,
        }
    }

    pub fn new_failing() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            should_fail: true,
        }
    }

    /// Registers a caller that the auth extractor can resolve.
    pub fn with_user(self, id: Uuid, role: &str) -> Self {
        self.tables().users.insert(
            id,
            User {
                id,
                email: format!("{}@example.com", role),
                role: role.to_string(),
            },
        );
        self
    }

    pub fn with_referrer_type(self, id: i64, name: &str, description: &str) -> Self {
        {
            let mut tables = self.tables();
            tables.last_type_id = tables.last_type_id.max(id);
            tables.referrer_types.insert(
                id,
                ReferrerType {
                    idreferrer_type: id,
                    referrer_type_name: name.to_string(),
                    referrer_type_desc: description.to_string(),
                },
            );
        }
        self
    }

    /// Inserts a referrer as-is; the caller is responsible for the type existing.
    pub fn with_referrer(self, id: i64, name: &str, referrer_type: i64) -> Self {
        {
            let mut tables = self.tables();
            tables.last_referrer_id = tables.last_referrer_id.max(id);
            tables.referrers.insert(
                id,
                Referrer {
                    idreferrer: id,
                    referrer_name: name.to_string(),
                    referrer_type,
                },
            );
        }
        self
    }

    /// Records a job that references `referrer_id`.
    pub fn with_job(self, referrer_id: i64) -> Self {
        self.tables().jobs.push(referrer_id);
        self
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock only means a test thread panicked; the data is still usable.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> RepoResult<()> {
        if self.should_fail {
            return Err(RepoError::Unavailable("simulated store outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.tables().users.get(&id).cloned())
    }

    async fn list_referrers(&self, referrer_type: Option<i64>) -> RepoResult<Vec<ReferrerListItem>> {
        self.check_available()?;
        let tables = self.tables();
        let items = tables
            .referrers
            .values()
            .filter(|r| referrer_type.is_none_or(|t| r.referrer_type == t))
            .map(|r| tables.list_item(r))
            .collect();
        Ok(Tables::sorted(items))
    }

    async fn get_referrer(&self, id: i64) -> RepoResult<Option<Referrer>> {
        self.check_available()?;
        Ok(self.tables().referrers.get(&id).cloned())
    }

    async fn count_referrer_jobs(&self, id: i64) -> RepoResult<i64> {
        self.check_available()?;
        let count = self.tables().jobs.iter().filter(|r| **r == id).count();
        Ok(count as i64)
    }

    async fn create_referrer(&self, new: &NewReferrer) -> RepoResult<Referrer> {
        self.check_available()?;
        let mut tables = self.tables();
        if !tables.referrer_types.contains_key(&new.referrer_type) {
            return Err(RepoError::UnknownReference);
        }

        let referrer = Referrer {
            idreferrer: tables.next_referrer_id(),
            referrer_name: new.name.clone(),
            referrer_type: new.referrer_type,
        };
        tables.referrers.insert(referrer.idreferrer, referrer.clone());
        Ok(referrer)
    }

    async fn update_referrer(&self, id: i64, new: &NewReferrer) -> RepoResult<Option<Referrer>> {
        self.check_available()?;
        let mut tables = self.tables();
        if !tables.referrers.contains_key(&id) {
            return Ok(None);
        }
        if !tables.referrer_types.contains_key(&new.referrer_type) {
            return Err(RepoError::UnknownReference);
        }

        let updated = Referrer {
            idreferrer: id,
            referrer_name: new.name.clone(),
            referrer_type: new.referrer_type,
        };
        tables.referrers.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_referrer(&self, id: i64) -> RepoResult<bool> {
        self.check_available()?;
        let mut tables = self.tables();
        if !tables.referrers.contains_key(&id) {
            return Ok(false);
        }
        if tables.jobs.contains(&id) {
            return Err(RepoError::InUse);
        }
        tables.referrers.remove(&id);
        Ok(true)
    }

    async fn search_referrers(&self, keyword: &str) -> RepoResult<Vec<ReferrerListItem>> {
        self.check_available()?;
        let needle = keyword.to_lowercase();
        let tables = self.tables();
        let items = tables
            .referrers
            .values()
            .map(|r| tables.list_item(r))
            .filter(|item| {
                item.referrer_name.to_lowercase().contains(&needle)
                    || item
                        .referrer_type_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .collect();
        Ok(Tables::sorted(items))
    }

    async fn list_referrer_types(&self) -> RepoResult<Vec<ReferrerType>> {
        self.check_available()?;
        let mut types: Vec<ReferrerType> = self.tables().referrer_types.values().cloned().collect();
        types.sort_by(|a, b| {
            a.referrer_type_name
                .cmp(&b.referrer_type_name)
                .then(a.idreferrer_type.cmp(&b.idreferrer_type))
        });
        Ok(types)
    }

    async fn get_referrer_type(&self, id: i64) -> RepoResult<Option<ReferrerType>> {
        self.check_available()?;
        Ok(self.tables().referrer_types.get(&id).cloned())
    }

    async fn count_type_referrers(&self, id: i64) -> RepoResult<i64> {
        self.check_available()?;
        let count = self
            .tables()
            .referrers
            .values()
            .filter(|r| r.referrer_type == id)
            .count();
        Ok(count as i64)
    }

    async fn create_referrer_type(&self, new: &NewReferrerType) -> RepoResult<ReferrerType> {
        self.check_available()?;
        let mut tables = self.tables();
        let referrer_type = ReferrerType {
            idreferrer_type: tables.next_type_id(),
            referrer_type_name: new.name.clone(),
            referrer_type_desc: new.description.clone(),
        };
        tables
            .referrer_types
            .insert(referrer_type.idreferrer_type, referrer_type.clone());
        Ok(referrer_type)
    }

    async fn update_referrer_type(
        &self,
        id: i64,
        new: &NewReferrerType,
    ) -> RepoResult<Option<ReferrerType>> {
        self.check_available()?;
        let mut tables = self.tables();
        let Some(existing) = tables.referrer_types.get_mut(&id) else {
            return Ok(None);
        };
        existing.referrer_type_name = new.name.clone();
        existing.referrer_type_desc = new.description.clone();
        Ok(Some(existing.clone()))
    }

    async fn delete_referrer_type(&self, id: i64) -> RepoResult<bool> {
        self.check_available()?;
        let mut tables = self.tables();
        if !tables.referrer_types.contains_key(&id) {
            return Ok(false);
        }
        if tables.referrers.values().any(|r| r.referrer_type == id) {
            return Err(RepoError::InUse);
        }
        tables.referrer_types.remove(&id);
        Ok(true)
    }

    async fn ensure_default_types(&self) -> RepoResult<u64> {
        self.check_available()?;
        let mut tables = self.tables();
        if !tables.referrer_types.is_empty() {
            return Ok(0);
        }

        for (name, description) in DEFAULT_REFERRER_TYPES {
            let id = tables.next_type_id();
            tables.referrer_types.insert(
                id,
                ReferrerType {
                    idreferrer_type: id,
                    referrer_type_name: name.to_string(),
                    referrer_type_desc: description.to_string(),
                },
            );
        }
        Ok(DEFAULT_REFERRER_TYPES.len() as u64)
    }
}
