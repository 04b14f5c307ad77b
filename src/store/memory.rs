use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mongodb::bson::Document;

use super::{
    CollectionSnapshot, DatabaseHandle, DatabaseSnapshot, IndexSnapshot, Store, StoreError,
    StoreErrorKind, StoreResult, UserSnapshot,
};
use crate::model::{CollectionSpec, ID_INDEX_NAME, IndexSpec, RoleGrant, UserSpec};

/// In-process store that follows MongoDB's create-if-absent rules for users,
/// collections and indexes. Backs `--dry-run`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    databases: BTreeMap<String, MemoryDatabase>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    users: BTreeMap<String, Vec<RoleGrant>>,
    collections: BTreeMap<String, MemoryCollection>,
}

#[derive(Debug, Default)]
struct MemoryCollection {
    validator: Option<Document>,
    indexes: BTreeMap<String, Vec<(String, i32)>>,
}

impl MemoryCollection {
    fn new(validator: Option<Document>) -> Self {
        let mut indexes = BTreeMap::new();
        indexes.insert(ID_INDEX_NAME.to_string(), vec![("_id".to_string(), 1)]);
        Self {
            validator,
            indexes,
        }
    }
}

/// Errors forced onto specific operations regardless of state.
#[derive(Debug, Clone, Default)]
struct Faults {
    create_user: Option<StoreErrorKind>,
    create_collection: Option<StoreErrorKind>,
    create_indexes: Option<StoreErrorKind>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn fail_create_user(self, kind: StoreErrorKind) -> Self {
        lock(&self.state).faults.create_user = Some(kind);
        self
    }

    #[cfg(test)]
    pub fn fail_create_collection(self, kind: StoreErrorKind) -> Self {
        lock(&self.state).faults.create_collection = Some(kind);
        self
    }

    #[cfg(test)]
    pub fn fail_create_indexes(self, kind: StoreErrorKind) -> Self {
        lock(&self.state).faults.create_indexes = Some(kind);
        self
    }

    #[cfg(test)]
    pub fn reject_everything(self, kind: StoreErrorKind) -> Self {
        self.fail_create_user(kind)
            .fail_create_collection(kind)
            .fail_create_indexes(kind)
    }
}

impl Store for MemoryStore {
    type Handle = MemoryDatabaseHandle;

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn select_database(&self, name: &str) -> Self::Handle {
        MemoryDatabaseHandle {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDatabaseHandle {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabaseHandle {
    fn require_database_name(&self) -> StoreResult<()> {
        if self.name.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidSpec,
                "database name cannot be empty",
            ));
        }
        Ok(())
    }
}

impl DatabaseHandle for MemoryDatabaseHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_user(&self, user: &UserSpec) -> StoreResult<()> {
        let mut state = lock(&self.state);
        fault(state.faults.create_user, "createUser")?;
        self.require_database_name()?;

        if user.username.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidSpec,
                "user name cannot be empty",
            ));
        }
        if user.password.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidSpec,
                "password cannot be empty",
            ));
        }

        let database = state.databases.entry(self.name.clone()).or_default();
        if database.users.contains_key(&user.username) {
            return Err(StoreError::new(
                StoreErrorKind::AlreadyExists,
                format!("User \"{}@{}\" already exists", user.username, self.name),
            ));
        }

        database
            .users
            .insert(user.username.clone(), user.roles.clone());
        Ok(())
    }

    async fn create_collection(&self, collection: &CollectionSpec) -> StoreResult<()> {
        let mut state = lock(&self.state);
        fault(state.faults.create_collection, "createCollection")?;
        self.require_database_name()?;

        if collection.name.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidSpec,
                "collection name cannot be empty",
            ));
        }

        let database = state.databases.entry(self.name.clone()).or_default();
        if database.collections.contains_key(&collection.name) {
            return Err(StoreError::new(
                StoreErrorKind::AlreadyExists,
                format!("Collection {}.{} already exists.", self.name, collection.name),
            ));
        }

        database.collections.insert(
            collection.name.clone(),
            MemoryCollection::new(Some(collection.validator.clone())),
        );
        Ok(())
    }

    async fn create_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> StoreResult<()> {
        let mut state = lock(&self.state);
        fault(state.faults.create_indexes, "createIndexes")?;
        self.require_database_name()?;

        if indexes.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidSpec,
                "must specify at least one index",
            ));
        }

        let existing = state
            .databases
            .get(&self.name)
            .and_then(|database| database.collections.get(collection));

        // The batch is checked as a whole before anything is written.
        for index in indexes {
            if index.field.is_empty() {
                return Err(StoreError::new(
                    StoreErrorKind::InvalidSpec,
                    "index key field cannot be empty",
                ));
            }
            let keys = vec![(index.field.clone(), index.direction())];
            if let Some(current) = existing.and_then(|entry| entry.indexes.get(&index.name()))
                && *current != keys
            {
                return Err(StoreError::new(
                    StoreErrorKind::InvalidSpec,
                    format!(
                        "An existing index has the same name as the requested index: {}",
                        index.name()
                    ),
                ));
            }
        }

        let target = state
            .databases
            .entry(self.name.clone())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection::new(None));

        for index in indexes {
            target
                .indexes
                .entry(index.name())
                .or_insert_with(|| vec![(index.field.clone(), index.direction())]);
        }

        Ok(())
    }

    async fn snapshot(&self) -> StoreResult<DatabaseSnapshot> {
        let state = lock(&self.state);
        let Some(database) = state.databases.get(&self.name) else {
            return Ok(DatabaseSnapshot {
                database: self.name.clone(),
                ..DatabaseSnapshot::default()
            });
        };

        let users = database
            .users
            .iter()
            .map(|(username, roles)| UserSnapshot {
                username: username.clone(),
                roles: roles.clone(),
            })
            .collect();

        let collections = database
            .collections
            .iter()
            .map(|(name, collection)| CollectionSnapshot {
                name: name.clone(),
                has_validator: collection.validator.is_some(),
                indexes: collection
                    .indexes
                    .iter()
                    .map(|(index_name, keys)| IndexSnapshot {
                        name: index_name.clone(),
                        keys: keys.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(DatabaseSnapshot {
            database: self.name.clone(),
            users,
            collections,
        })
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fault(kind: Option<StoreErrorKind>, operation: &str) -> StoreResult<()> {
    match kind {
        Some(kind) => Err(StoreError::new(
            kind,
            format!("{operation} rejected by injected fault"),
        )),
        None => Ok(()),
    }
}
