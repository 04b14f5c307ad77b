use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{COLLECTION_NAME, ID_INDEX_NAME, IndexSpec, RoleGrant, ROLE_DB_ADMIN, ROLE_READ_WRITE};
use crate::store::{DatabaseHandle, DatabaseSnapshot, MongoStore, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Ok,
    Missing,
    Mismatch,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub item: String,
    pub status: FindingStatus,
    pub detail: String,
}

impl Finding {
    fn new(item: impl Into<String>, status: FindingStatus, detail: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            status,
            detail: detail.into(),
        }
    }
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let connection = &args.connection;
    info!(database = %connection.database, "status requested");

    let store = MongoStore::connect(&connection.mongo_uri).await?;
    let snapshot = store
        .select_database(&connection.database)
        .snapshot()
        .await
        .with_context(|| format!("failed to read database state: {}", connection.database))?;

    let findings = check_baseline(&snapshot, &connection.username);
    if args.json {
        write_json_findings(&snapshot.database, &findings)?;
    }

    for finding in &findings {
        if finding.status == FindingStatus::Ok {
            info!(item = %finding.item, detail = %finding.detail, "baseline satisfied");
        } else {
            warn!(
                item = %finding.item,
                status = ?finding.status,
                detail = %finding.detail,
                "baseline drift"
            );
        }
    }

    let drift = findings
        .iter()
        .filter(|finding| finding.status != FindingStatus::Ok)
        .count();
    info!(
        database = %snapshot.database,
        users = snapshot.users.len(),
        collections = snapshot.collections.len(),
        drift,
        "status completed"
    );

    Ok(())
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    database: &'a str,
    findings: &'a [Finding],
}

fn write_json_findings(database: &str, findings: &[Finding]) -> Result<()> {
    let response = StatusResponse { database, findings };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize status json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

/// Compares a database snapshot with the initialized baseline.
pub fn check_baseline(snapshot: &DatabaseSnapshot, username: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let database = snapshot.database.as_str();

    let user_item = format!("user {username}");
    match snapshot.user(username) {
        None => findings.push(Finding::new(user_item, FindingStatus::Missing, "user not found")),
        Some(user) => {
            let mut wanted = vec![
                RoleGrant::new(ROLE_READ_WRITE, database),
                RoleGrant::new(ROLE_DB_ADMIN, database),
            ];
            let mut actual = user.roles.clone();
            wanted.sort_by(|a, b| (&a.db, &a.role).cmp(&(&b.db, &b.role)));
            actual.sort_by(|a, b| (&a.db, &a.role).cmp(&(&b.db, &b.role)));

            if actual == wanted {
                findings.push(Finding::new(
                    user_item,
                    FindingStatus::Ok,
                    format!("roles readWrite and dbAdmin on {database}"),
                ));
            } else {
                let rendered: Vec<String> = user
                    .roles
                    .iter()
                    .map(|grant| format!("{}@{}", grant.role, grant.db))
                    .collect();
                findings.push(Finding::new(
                    user_item,
                    FindingStatus::Mismatch,
                    format!("roles are [{}]", rendered.join(", ")),
                ));
            }
        }
    }

    let collection_item = format!("collection {COLLECTION_NAME}");
    let Some(collection) = snapshot.collection(COLLECTION_NAME) else {
        findings.push(Finding::new(
            collection_item,
            FindingStatus::Missing,
            "collection not found",
        ));
        return findings;
    };

    if collection.has_validator {
        findings.push(Finding::new(
            collection_item,
            FindingStatus::Ok,
            "validator present",
        ));
    } else {
        findings.push(Finding::new(
            collection_item,
            FindingStatus::Mismatch,
            "collection has no validator",
        ));
    }

    let expected_indexes = IndexSpec::baseline();
    for index in &expected_indexes {
        let item = format!("index {}", index.name());
        let wanted = vec![(index.field.clone(), index.direction())];
        match collection
            .indexes
            .iter()
            .find(|existing| existing.name == index.name())
        {
            None => findings.push(Finding::new(item, FindingStatus::Missing, "index not found")),
            Some(existing) if existing.keys == wanted => findings.push(Finding::new(
                item,
                FindingStatus::Ok,
                format!("ascending on {}", index.field),
            )),
            Some(existing) => findings.push(Finding::new(
                item,
                FindingStatus::Mismatch,
                format!("keys are {:?}", existing.keys),
            )),
        }
    }

    for existing in &collection.indexes {
        let known = existing.name == ID_INDEX_NAME
            || expected_indexes
                .iter()
                .any(|index| index.name() == existing.name);
        if !known {
            findings.push(Finding::new(
                format!("index {}", existing.name),
                FindingStatus::Unexpected,
                "index is not part of the baseline",
            ));
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InitConfig;
    use crate::initializer::{Progress, initialize};
    use crate::store::{CollectionSnapshot, IndexSnapshot, MemoryStore, UserSnapshot};

    #[tokio::test]
    async fn initialized_store_satisfies_every_check() {
        let store = MemoryStore::new();
        let config = InitConfig::new("meshcentral", "mc_app", "x");
        initialize(&store, &config, &mut Progress::new(Vec::new())).await;

        let snapshot = store
            .select_database("meshcentral")
            .snapshot()
            .await
            .expect("snapshot");
        let findings = check_baseline(&snapshot, "mc_app");

        assert_eq!(findings.len(), 6);
        assert!(findings.iter().all(|finding| finding.status == FindingStatus::Ok));
    }

    #[test]
    fn empty_database_reports_missing_user_and_collection() {
        let snapshot = DatabaseSnapshot {
            database: "meshcentral".to_string(),
            ..DatabaseSnapshot::default()
        };

        let findings = check_baseline(&snapshot, "mc_app");
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|finding| finding.status == FindingStatus::Missing));
    }

    #[test]
    fn cross_database_role_and_extra_index_are_flagged() {
        let snapshot = DatabaseSnapshot {
            database: "meshcentral".to_string(),
            users: vec![UserSnapshot {
                username: "mc_app".to_string(),
                roles: vec![
                    RoleGrant::new("readWrite", "meshcentral"),
                    RoleGrant::new("dbAdmin", "admin"),
                ],
            }],
            collections: vec![CollectionSnapshot {
                name: "meshcentral".to_string(),
                has_validator: true,
                indexes: vec![
                    IndexSnapshot {
                        name: "_id_".to_string(),
                        keys: vec![("_id".to_string(), 1)],
                    },
                    IndexSnapshot {
                        name: "type_1".to_string(),
                        keys: vec![("type".to_string(), 1)],
                    },
                    IndexSnapshot {
                        name: "extra_1".to_string(),
                        keys: vec![("extra".to_string(), 1)],
                    },
                ],
            }],
        };

        let findings = check_baseline(&snapshot, "mc_app");
        let status_of = |item: &str| {
            findings
                .iter()
                .find(|finding| finding.item == item)
                .map(|finding| finding.status)
        };

        assert_eq!(status_of("user mc_app"), Some(FindingStatus::Mismatch));
        assert_eq!(status_of("index type_1"), Some(FindingStatus::Ok));
        assert_eq!(status_of("index email_1"), Some(FindingStatus::Missing));
        assert_eq!(status_of("index extra_1"), Some(FindingStatus::Unexpected));
        assert_eq!(status_of("index _id_"), None);
    }
}
