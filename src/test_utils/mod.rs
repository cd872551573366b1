//! Embedded `PostgreSQL` harness for integration tests.

use std::error::Error;

use postgresql_embedded::{PostgreSQL, Settings};
use tokio_postgres::NoTls;

use crate::table::TableArgs;

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    postgresql: PostgreSQL,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Set up an embedded `PostgreSQL` instance with one freshly created
/// database.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up, started, or if
/// database provisioning fails.
pub async fn setup_postgres_embedded(
    database: &str,
) -> Result<EmbeddedPostgres, Box<dyn Error>> {
    setup_with_settings(database, Settings::default()).await
}

/// Like [`setup_postgres_embedded`] but with a caller-fixed superuser
/// password, so several instances can share one set of credentials.
///
/// # Errors
/// See [`setup_postgres_embedded`].
pub async fn setup_postgres_embedded_with_password(
    database: &str,
    password: &str,
) -> Result<EmbeddedPostgres, Box<dyn Error>> {
    let settings = Settings {
        password: password.to_string(),
        ..Settings::default()
    };
    setup_with_settings(database, settings).await
}

async fn setup_with_settings(
    database: &str,
    settings: Settings,
) -> Result<EmbeddedPostgres, Box<dyn Error>> {
    let mut postgresql = PostgreSQL::new(settings);

    // Bundled binaries, so no download conflicts.
    postgresql.setup().await?;
    postgresql.start().await?;
    postgresql.create_database(database).await?;

    let settings = postgresql.settings();
    let host = settings.host.clone();
    let port = settings.port;
    let user = settings.username.clone();
    let password = settings.password.clone();

    println!("PostgreSQL started on port {port}");

    Ok(EmbeddedPostgres {
        postgresql,
        host,
        port,
        user,
        password,
        database: database.to_string(),
    })
}

impl EmbeddedPostgres {
    /// `host:port` in the address-list grammar.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bridge arguments targeting a table in the instance's database.
    #[must_use]
    pub fn table_args(&self, table: &str) -> TableArgs {
        TableArgs {
            addresses: self.address(),
            database: self.database.clone(),
            table: table.to_string(),
            user: self.user.clone(),
            password: self.password.clone(),
            schema: None,
            on_conflict: None,
        }
    }

    /// Direct driver connection for DDL and assertions, bypassing the
    /// bridge under test.
    ///
    /// # Errors
    /// Returns connection errors from the driver.
    pub async fn admin_client(&self) -> Result<tokio_postgres::Client, Box<dyn Error>> {
        self.client_for(&self.database).await
    }

    /// Direct driver connection to an arbitrary database of the instance.
    ///
    /// # Errors
    /// Returns connection errors from the driver.
    pub async fn client_for(
        &self,
        database: &str,
    ) -> Result<tokio_postgres::Client, Box<dyn Error>> {
        let (client, connection) = tokio_postgres::Config::new()
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(database)
            .connect(NoTls)
            .await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("admin connection error: {e}");
            }
        });
        Ok(client)
    }

    /// Stop the embedded instance.
    pub async fn stop(self) {
        let _ = self.postgresql.stop().await;
    }
}
