use crate::models::AuthBundle;
use crate::sync::error::{SyncError, SyncResult};
use rocket_db_pools::sqlx::{self, SqlitePool};

const ACTIVE: &str = "active";

/// Resolves credentials for a named connection.
///
/// Token refresh and the OAuth flow belong to the implementor; the engine only
/// ever asks for the current bundle.
#[rocket::async_trait]
pub trait AuthProvider: Send + Sync {
    async fn resolve(&self, connection: &str) -> SyncResult<AuthBundle>;
}

/// `AuthProvider` backed by the `connections` table.
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    pool: SqlitePool,
}

impl ConnectionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store or replace the bundle for a connection and mark it active.
    pub async fn save(&self, name: &str, bundle: &AuthBundle) -> SyncResult<()> {
        let auth = serde_json::to_string(bundle)?;
        sqlx::query(
            r#"INSERT INTO connections (name, auth, status) VALUES (?, ?, ?)
               ON CONFLICT(name) DO UPDATE SET
                   auth = excluded.auth,
                   status = excluded.status,
                   updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(name)
        .bind(auth)
        .bind(ACTIVE)
        .execute(&self.pool)
        .await?;

        log::info!("connection {}: credentials stored", name);
        Ok(())
    }
}

#[rocket::async_trait]
impl AuthProvider for ConnectionStore {
    async fn resolve(&self, connection: &str) -> SyncResult<AuthBundle> {
        let missing = || SyncError::AuthMissing {
            connection: connection.to_string(),
        };

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT auth, status FROM connections WHERE name = ?")
                .bind(connection)
                .fetch_optional(&self.pool)
                .await?;

        let Some((auth, status)) = row else {
            return Err(missing());
        };
        if status != ACTIVE {
            return Err(missing());
        }

        let bundle: AuthBundle = match serde_json::from_str(&auth) {
            Ok(bundle) => bundle,
            Err(err) => {
                log::warn!("connection {}: stored credentials unreadable: {}", connection, err);
                return Err(missing());
            }
        };

        if bundle.access_token.is_empty() || bundle.instance_url.is_empty() {
            return Err(missing());
        }

        Ok(bundle)
    }
}
