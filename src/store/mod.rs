//! Database session abstraction.
//!
//! `Store::select_database` hands back an explicit handle; every later
//! operation goes through that handle rather than an ambient session.

use serde::Serialize;
use thiserror::Error;

use crate::model::{CollectionSpec, IndexSpec, RoleGrant, UserSpec};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    AlreadyExists,
    PermissionDenied,
    Unreachable,
    InvalidSpec,
    Other,
}

impl StoreErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyExists => "already_exists",
            Self::PermissionDenied => "permission_denied",
            Self::Unreachable => "unreachable",
            Self::InvalidSpec => "invalid_spec",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {message}", .kind.as_str())]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait Store {
    type Handle: DatabaseHandle;

    /// Short label recorded in run reports.
    fn kind(&self) -> &'static str;

    /// Pure naming operation; the database need not exist yet.
    fn select_database(&self, name: &str) -> Self::Handle;
}

#[allow(async_fn_in_trait)]
pub trait DatabaseHandle {
    fn name(&self) -> &str;

    async fn create_user(&self, user: &UserSpec) -> StoreResult<()>;

    async fn create_collection(&self, collection: &CollectionSpec) -> StoreResult<()>;

    /// One batch request for all indexes. Re-asserting an identical index
    /// succeeds without changes.
    async fn create_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> StoreResult<()>;

    async fn snapshot(&self) -> StoreResult<DatabaseSnapshot>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseSnapshot {
    pub database: String,
    pub users: Vec<UserSnapshot>,
    pub collections: Vec<CollectionSnapshot>,
}

impl DatabaseSnapshot {
    pub fn user(&self, username: &str) -> Option<&UserSnapshot> {
        self.users.iter().find(|user| user.username == username)
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionSnapshot> {
        self.collections
            .iter()
            .find(|collection| collection.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSnapshot {
    pub username: String,
    pub roles: Vec<RoleGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSnapshot {
    pub name: String,
    pub has_validator: bool,
    pub indexes: Vec<IndexSnapshot>,
}

impl CollectionSnapshot {
    #[cfg(test)]
    pub fn index_names(&self) -> Vec<&str> {
        self.indexes.iter().map(|index| index.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub keys: Vec<(String, i32)>,
}
