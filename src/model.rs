use std::fmt;

use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use crate::config::InitConfig;
use crate::store::{StoreError, StoreErrorKind};

pub const COLLECTION_NAME: &str = "meshcentral";
pub const COLLECTION_DESCRIPTION: &str = "MeshCentral main collection";
pub const INDEX_FIELDS: [&str; 4] = ["type", "domain", "email", "meshid"];
pub const ROLE_READ_WRITE: &str = "readWrite";
pub const ROLE_DB_ADMIN: &str = "dbAdmin";
pub const ID_INDEX_NAME: &str = "_id_";
pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub username: String,
    pub password: String,
    pub roles: Vec<RoleGrant>,
}

impl UserSpec {
    /// The application principal: read/write plus schema/index administration,
    /// both on the configured database and nowhere else.
    pub fn application(config: &InitConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            roles: vec![
                RoleGrant::new(ROLE_READ_WRITE, config.database.clone()),
                RoleGrant::new(ROLE_DB_ADMIN, config.database.clone()),
            ],
        }
    }
}

impl fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpec")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub validator: Document,
}

impl CollectionSpec {
    /// The main collection. Its validator only asserts object-typed documents.
    pub fn baseline() -> Self {
        Self {
            name: COLLECTION_NAME.to_string(),
            validator: doc! {
                "$jsonSchema": {
                    "bsonType": "object",
                    "description": COLLECTION_DESCRIPTION,
                }
            },
        }
    }
}

/// Single-field ascending index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
}

impl IndexSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn baseline() -> Vec<Self> {
        INDEX_FIELDS.iter().copied().map(Self::ascending).collect()
    }

    pub fn direction(&self) -> i32 {
        1
    }

    pub fn name(&self) -> String {
        format!("{}_{}", self.field, self.direction())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    SelectDatabase,
    CreateUser,
    CreateCollection,
    CreateIndexes,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelectDatabase => "select_database",
            Self::CreateUser => "create_user",
            Self::CreateCollection => "create_collection",
            Self::CreateIndexes => "create_indexes",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Skipped {
        reason: StoreErrorKind,
        message: String,
    },
    Failed {
        kind: StoreErrorKind,
        message: String,
    },
}

impl StepOutcome {
    /// AlreadyExists is the expected rerun path and counts as a skip; every
    /// other store error is a failure.
    pub fn from_result(result: Result<(), StoreError>) -> Self {
        match result {
            Ok(()) => Self::Applied,
            Err(err) if err.kind == StoreErrorKind::AlreadyExists => Self::Skipped {
                reason: err.kind,
                message: err.message,
            },
            Err(err) => Self::Failed {
                kind: err.kind,
                message: err.message,
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StepReport {
    pub step: StepName,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub report_version: u32,
    pub run_id: String,
    pub store: String,
    pub database: String,
    pub username: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub completed: bool,
    pub steps: Vec<StepReport>,
}

impl InitReport {
    pub fn failed_steps(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .filter(|report| report.outcome.is_failed())
            .map(|report| report.step)
            .collect()
    }

    #[cfg(test)]
    pub fn outcome(&self, step: StepName) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|report| report.step == step)
            .map(|report| &report.outcome)
    }
}
