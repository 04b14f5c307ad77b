use std::fmt;

use tracing::warn;

use crate::cli::InitArgs;

/// Values the initializer needs. Nothing here is validated: empty values are
/// passed through and left for the store to reject.
#[derive(Clone, PartialEq, Eq)]
pub struct InitConfig {
    pub database: String,
    pub username: String,
    pub password: String,
}

impl InitConfig {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_args(args: &InitArgs) -> Self {
        let config = Self::new(
            args.connection.database.clone(),
            args.connection.username.clone(),
            args.password.clone(),
        );
        config.warn_on_empty_values();
        config
    }

    pub fn empty_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.database.is_empty() {
            fields.push("database");
        }
        if self.username.is_empty() {
            fields.push("username");
        }
        if self.password.is_empty() {
            fields.push("password");
        }
        fields
    }

    fn warn_on_empty_values(&self) {
        for field in self.empty_fields() {
            warn!(field, "configuration value is empty; passing it through to the store");
        }
    }
}

impl fmt::Debug for InitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitConfig")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
