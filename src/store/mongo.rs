use anyhow::{Context, Result};
use mongodb::bson::document::ValueAccessError;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, CreateCollectionOptions, IndexOptions};
use mongodb::results::CollectionSpecification;
use mongodb::{Client, Database, IndexModel};
use tracing::debug;

use super::{
    CollectionSnapshot, DatabaseHandle, DatabaseSnapshot, IndexSnapshot, Store, StoreError,
    StoreErrorKind, StoreResult, UserSnapshot,
};
use crate::model::{CollectionSpec, IndexSpec, RoleGrant, UserSpec};

const APP_NAME: &str = "meshdb-init";

pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Builds a client. The driver connects lazily, so an unreachable server
    /// surfaces on the first operation rather than here.
    pub async fn connect(uri: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .context("failed to parse MongoDB connection string")?;
        options.app_name = Some(APP_NAME.to_string());

        let client = Client::with_options(options).context("failed to build MongoDB client")?;
        Ok(Self { client })
    }
}

impl Store for MongoStore {
    type Handle = MongoDatabaseHandle;

    fn kind(&self) -> &'static str {
        "mongodb"
    }

    fn select_database(&self, name: &str) -> Self::Handle {
        MongoDatabaseHandle {
            database: self.client.database(name),
        }
    }
}

pub struct MongoDatabaseHandle {
    database: Database,
}

impl DatabaseHandle for MongoDatabaseHandle {
    fn name(&self) -> &str {
        self.database.name()
    }

    async fn create_user(&self, user: &UserSpec) -> StoreResult<()> {
        let roles: Vec<Document> = user
            .roles
            .iter()
            .map(|grant| doc! { "role": grant.role.as_str(), "db": grant.db.as_str() })
            .collect();

        let command = doc! {
            "createUser": user.username.as_str(),
            "pwd": user.password.as_str(),
            "roles": roles,
        };

        self.database.run_command(command, None).await?;
        Ok(())
    }

    async fn create_collection(&self, collection: &CollectionSpec) -> StoreResult<()> {
        let options = CreateCollectionOptions::builder()
            .validator(collection.validator.clone())
            .build();

        self.database
            .create_collection(&collection.name, options)
            .await?;
        Ok(())
    }

    async fn create_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> StoreResult<()> {
        let models: Vec<IndexModel> = indexes.iter().map(index_model).collect();

        let result = self
            .database
            .collection::<Document>(collection)
            .create_indexes(models, None)
            .await?;
        debug!(indexes = ?result.index_names, "createIndexes acknowledged");
        Ok(())
    }

    async fn snapshot(&self) -> StoreResult<DatabaseSnapshot> {
        let users_info = self
            .database
            .run_command(doc! { "usersInfo": 1 }, None)
            .await?;
        let users = parse_users_info(&users_info)?;

        let mut specs = Vec::new();
        let mut cursor = self.database.list_collections(None, None).await?;
        while cursor.advance().await? {
            let spec: CollectionSpecification = cursor.deserialize_current()?;
            if !spec.name.starts_with("system.") {
                specs.push(spec);
            }
        }
        specs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut collections = Vec::with_capacity(specs.len());
        for spec in specs {
            let indexes = self.list_indexes(&spec.name).await?;
            collections.push(CollectionSnapshot {
                name: spec.name,
                has_validator: spec.options.validator.is_some(),
                indexes,
            });
        }

        Ok(DatabaseSnapshot {
            database: self.database.name().to_string(),
            users,
            collections,
        })
    }
}

impl MongoDatabaseHandle {
    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSnapshot>> {
        let mut indexes = Vec::new();
        let mut cursor = self
            .database
            .collection::<Document>(collection)
            .list_indexes(None)
            .await?;

        while cursor.advance().await? {
            let model: IndexModel = cursor.deserialize_current()?;
            let name = model
                .options
                .as_ref()
                .and_then(|options| options.name.clone())
                .unwrap_or_default();
            indexes.push(IndexSnapshot {
                name,
                keys: index_keys(&model.keys),
            });
        }

        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(indexes)
    }
}

fn index_model(index: &IndexSpec) -> IndexModel {
    let mut keys = Document::new();
    keys.insert(index.field.clone(), index.direction());

    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(index.name()).build())
        .build()
}

fn index_keys(keys: &Document) -> Vec<(String, i32)> {
    keys.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Bson::Int32(value) => *value,
                Bson::Int64(value) => i32::try_from(*value).unwrap_or(0),
                Bson::Double(value) => *value as i32,
                _ => 0,
            };
            (field.clone(), direction)
        })
        .collect()
}

fn parse_users_info(reply: &Document) -> StoreResult<Vec<UserSnapshot>> {
    let users = reply.get_array("users").map_err(malformed_reply)?;

    let mut snapshots = Vec::with_capacity(users.len());
    for user in users.iter().filter_map(Bson::as_document) {
        let username = user.get_str("user").map_err(malformed_reply)?.to_string();
        let roles = user
            .get_array("roles")
            .map_err(malformed_reply)?
            .iter()
            .filter_map(Bson::as_document)
            .map(|role| Ok(RoleGrant::new(role.get_str("role")?, role.get_str("db")?)))
            .collect::<Result<Vec<_>, ValueAccessError>>()
            .map_err(malformed_reply)?;
        snapshots.push(UserSnapshot { username, roles });
    }

    snapshots.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(snapshots)
}

fn malformed_reply(err: ValueAccessError) -> StoreError {
    StoreError::new(
        StoreErrorKind::Other,
        format!("unexpected usersInfo reply: {err}"),
    )
}

/// Maps server error codes onto the store taxonomy.
pub(crate) fn classify_code(code: i32) -> StoreErrorKind {
    match code {
        // DuplicateKey, NamespaceExists, user already exists
        11000 | 48 | 51003 => StoreErrorKind::AlreadyExists,
        // Unauthorized, AuthenticationFailed
        13 | 18 => StoreErrorKind::PermissionDenied,
        // HostUnreachable, HostNotFound, NetworkTimeout, ShutdownInProgress
        6 | 7 | 89 | 91 => StoreErrorKind::Unreachable,
        // BadValue, FailedToParse, CannotCreateIndex, InvalidNamespace,
        // IndexOptionsConflict, IndexKeySpecsConflict, InvalidIndexSpecificationOption
        2 | 9 | 67 | 73 | 85 | 86 | 197 => StoreErrorKind::InvalidSpec,
        _ => StoreErrorKind::Other,
    }
}

impl From<MongoError> for StoreError {
    fn from(err: MongoError) -> Self {
        let kind = match err.kind.as_ref() {
            ErrorKind::Command(command) => classify_code(command.code),
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => StoreErrorKind::Unreachable,
            ErrorKind::Authentication { .. } => StoreErrorKind::PermissionDenied,
            _ => StoreErrorKind::Other,
        };
        StoreError::new(kind, err.to_string())
    }
}
