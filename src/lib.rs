#[macro_use]
extern crate rocket;

pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod sync;

use crate::db::SyncDb;
use crate::sync::{ConnectionStore, SalesforceClient, SyncConfig, SyncEngine};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};
use tokio_util::sync::CancellationToken;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default()
                .default_filter_or("info,rocket::server=warn,rocket::request=warn,sqlx::query=warn"),
        )
        .init();
    });
}

/// Cancels the background scheduler when Rocket shuts down.
struct SchedulerShutdown(CancellationToken);

pub fn rocket() -> Rocket<Build> {
    init_logger();
    log::info!("starting sobject sync server");

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(SyncDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match SyncDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match sync::run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Build the engine once and share it between routes and the scheduler
        .attach(AdHoc::try_on_ignite("Sync Engine", |rocket| async move {
            let Some(db) = SyncDb::fetch(&rocket) else {
                log::error!("database pool not available for sync engine");
                return Err(rocket);
            };
            let pool = (**db).clone();
            let config = SyncConfig::from_env();

            let remote = match SalesforceClient::new(&config) {
                Ok(client) => client,
                Err(e) => {
                    log::error!("failed to initialize remote API client: {}", e);
                    return Err(rocket);
                }
            };
            let auth = ConnectionStore::new(pool.clone());
            let engine = SyncEngine::new(pool.clone(), Arc::new(remote), Arc::new(auth), config);

            Ok(rocket
                .manage(pool)
                .manage(Arc::new(engine))
                .manage(SchedulerShutdown(CancellationToken::new())))
        }))
        .attach(AdHoc::on_liftoff("Spawn Sync Scheduler", |rocket| {
            Box::pin(async move {
                let (Some(engine), Some(shutdown)) = (
                    rocket.state::<Arc<SyncEngine>>(),
                    rocket.state::<SchedulerShutdown>(),
                ) else {
                    log::error!("failed to spawn sync scheduler: engine not found");
                    return;
                };

                if !engine.config().scheduler_enabled {
                    log::info!("sync scheduler disabled by configuration");
                    return;
                }

                let scheduler = engine.scheduler();
                let token = shutdown.0.clone();
                tokio::spawn(async move { scheduler.run(token).await });
            })
        }))
        .attach(AdHoc::on_shutdown("Stop Sync Scheduler", |rocket| {
            Box::pin(async move {
                if let Some(shutdown) = rocket.state::<SchedulerShutdown>() {
                    shutdown.0.cancel();
                }
            })
        }))
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Health
                routes::health::health_check,
                // Remote metadata
                routes::remote::list_remote_objects,
                routes::remote::describe_object,
                routes::remote::preview_records,
                // Catalog
                routes::objects::enable_sync,
                routes::objects::list_status,
                routes::objects::get_object,
                // Interactive runs
                routes::runs::start_run,
                routes::runs::get_run,
            ],
        )
        .mount("/api/v1", routes![routes::runs::run_events])
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Sobject Sync API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

pub mod test_support {
    use crate::models::{AuthBundle, FieldDefinition, ObjectDefinition, ObjectSummary, QueryPage, Record};
    use crate::sync::{
        ConnectionStore, RemoteObjectApi, SyncConfig, SyncEngine, SyncError, SyncResult,
    };
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::{Build, Rocket, Route};
    use serde_json::Value;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    pub use database::{TestDatabase, TestDatabaseError};

    pub const TEST_CONNECTION: &str = "test";

    /// Engine configuration for tests: scheduler off, short timeouts.
    pub fn test_config() -> SyncConfig {
        SyncConfig {
            tick_interval: Duration::from_millis(50),
            request_timeout: Duration::from_secs(5),
            connection_name: TEST_CONNECTION.to_string(),
            api_version: "54.0".to_string(),
            run_retention: Duration::from_secs(60),
            scheduler_enabled: false,
        }
    }

    /// Engine wired to `remote`, reading credentials from the test database.
    pub fn test_engine(test_db: &TestDatabase, remote: Arc<FakeRemote>) -> SyncEngine {
        test_engine_with(test_db, remote, test_config())
    }

    pub fn test_engine_with(
        test_db: &TestDatabase,
        remote: Arc<FakeRemote>,
        config: SyncConfig,
    ) -> SyncEngine {
        let pool = test_db.pool_clone();
        SyncEngine::new(
            pool.clone(),
            remote,
            Arc::new(ConnectionStore::new(pool)),
            config,
        )
    }

    /// Store credentials for `TEST_CONNECTION`.
    pub async fn seed_connection(test_db: &TestDatabase) -> SyncResult<()> {
        ConnectionStore::new(test_db.pool_clone())
            .save(
                TEST_CONNECTION,
                &AuthBundle::new("00Dxx!token", "https://example.my.salesforce.com"),
            )
            .await
    }

    pub fn object_definition(name: &str, fields: &[(&str, &str)]) -> ObjectDefinition {
        ObjectDefinition {
            name: name.to_string(),
            label: name.to_string(),
            custom: name.ends_with("__c"),
            fields: fields
                .iter()
                .map(|(field, field_type)| FieldDefinition::new(*field, *field_type))
                .collect(),
        }
    }

    /// Convert a `json!({...})` literal into a record.
    pub fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("record must be a JSON object, got {other}"),
        }
    }

    /// Blocks queries until released, to hold a cycle in flight.
    #[derive(Clone)]
    pub struct QueryGate {
        entered: Arc<Notify>,
        release: Arc<Semaphore>,
    }

    impl QueryGate {
        /// Wait until a query has reached the gate.
        pub async fn entered(&self) {
            self.entered.notified().await;
        }

        pub fn release(&self) {
            self.release.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    #[derive(Default)]
    struct FakeState {
        definitions: HashMap<String, ObjectDefinition>,
        records: HashMap<String, Vec<Record>>,
        failing: HashSet<String>,
        page_size: Option<usize>,
        query_calls: HashMap<String, usize>,
        gates: HashMap<String, QueryGate>,
    }

    /// Scripted in-memory stand-in for the remote object API.
    #[derive(Default)]
    pub struct FakeRemote {
        state: Mutex<FakeState>,
    }

    impl FakeRemote {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_object(&self, definition: ObjectDefinition) {
            self.state
                .lock()
                .definitions
                .insert(definition.name.clone(), definition);
        }

        pub fn set_records(&self, object: &str, records: Vec<Record>) {
            self.state.lock().records.insert(object.to_string(), records);
        }

        /// Make every query for `object` fail with a 503.
        pub fn fail_queries(&self, object: &str) {
            self.state.lock().failing.insert(object.to_string());
        }

        pub fn recover(&self, object: &str) {
            self.state.lock().failing.remove(object);
        }

        pub fn set_page_size(&self, size: usize) {
            self.state.lock().page_size = Some(size.max(1));
        }

        /// Block queries for `object` until the returned gate is released.
        pub fn hold_queries(&self, object: &str) -> QueryGate {
            let gate = QueryGate {
                entered: Arc::new(Notify::new()),
                release: Arc::new(Semaphore::new(0)),
            };
            self.state
                .lock()
                .gates
                .insert(object.to_string(), gate.clone());
            gate
        }

        pub fn query_calls(&self, object: &str) -> usize {
            self.state
                .lock()
                .query_calls
                .get(object)
                .copied()
                .unwrap_or(0)
        }

        fn page(&self, object: &str, offset: usize) -> QueryPage {
            let state = self.state.lock();
            let records = state.records.get(object).cloned().unwrap_or_default();
            let size = state.page_size.unwrap_or(records.len().max(1));
            let end = (offset + size).min(records.len());
            let next_records_url = (end < records.len())
                .then(|| format!("/services/data/v54.0/query/{object}-{end}"));

            QueryPage {
                total_size: records.len() as u64,
                done: next_records_url.is_none(),
                records: records.get(offset..end).map(<[Record]>::to_vec).unwrap_or_default(),
                next_records_url,
            }
        }
    }

    #[rocket::async_trait]
    impl RemoteObjectApi for FakeRemote {
        async fn describe(&self, _auth: &AuthBundle, name: &str) -> SyncResult<ObjectDefinition> {
            self.state
                .lock()
                .definitions
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    SyncError::remote_status(
                        StatusCode::NOT_FOUND,
                        format!(r#"[{{"errorCode":"NOT_FOUND","message":"{name}"}}]"#),
                    )
                })
        }

        async fn list_objects(&self, _auth: &AuthBundle) -> SyncResult<Vec<ObjectSummary>> {
            let mut objects: Vec<ObjectSummary> = self
                .state
                .lock()
                .definitions
                .values()
                .map(|def| ObjectSummary {
                    name: def.name.clone(),
                    label: def.label.clone(),
                    custom: def.custom,
                    queryable: true,
                })
                .collect();
            objects.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(objects)
        }

        async fn query(&self, _auth: &AuthBundle, soql: &str) -> SyncResult<QueryPage> {
            let object = soql
                .rsplit(" FROM ")
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();

            let (gate, failing) = {
                let mut state = self.state.lock();
                *state.query_calls.entry(object.clone()).or_default() += 1;
                (state.gates.get(&object).cloned(), state.failing.contains(&object))
            };

            if let Some(gate) = gate {
                gate.entered.notify_one();
                let _permit = gate
                    .release
                    .acquire()
                    .await
                    .map_err(|_| SyncError::remote_status(StatusCode::GONE, "gate closed".into()))?;
            }

            if failing {
                return Err(SyncError::remote_status(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service unavailable".to_string(),
                ));
            }

            Ok(self.page(&object, 0))
        }

        async fn query_more(
            &self,
            _auth: &AuthBundle,
            next_records_url: &str,
        ) -> SyncResult<QueryPage> {
            let cursor = next_records_url
                .rsplit_once('/')
                .and_then(|(_, tail)| tail.rsplit_once('-'))
                .and_then(|(object, offset)| Some((object.to_string(), offset.parse().ok()?)));

            match cursor {
                Some((object, offset)) => Ok(self.page(&object, offset)),
                None => Err(SyncError::UnexpectedPageUrl(next_records_url.to_string())),
            }
        }
    }

    pub mod database {
        use crate::sync::run_migrations;
        use log::LevelFilter;
        use rocket_db_pools::sqlx::sqlite::{
            SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
        };
        use rocket_db_pools::sqlx::{self, ConnectOptions, SqlitePool};
        use tempfile::TempDir;
        use thiserror::Error;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("io error: {0}")]
            Io(#[from] std::io::Error),
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
        }

        /// Throwaway SQLite database in a temporary directory, migrated.
        pub struct TestDatabase {
            pool: SqlitePool,
            _dir: TempDir,
        }

        impl TestDatabase {
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let dir = tempfile::tempdir()?;
                let options = SqliteConnectOptions::new()
                    .filename(dir.path().join("sync.db"))
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .log_statements(LevelFilter::Off);

                let pool = SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await?;

                run_migrations(&pool).await?;

                Ok(Self { pool, _dir: dir })
            }

            pub fn pool(&self) -> &SqlitePool {
                &self.pool
            }

            pub fn pool_clone(&self) -> SqlitePool {
                self.pool.clone()
            }

            pub async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error> {
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                )
                .bind(table)
                .fetch_one(&self.pool)
                .await?;
                Ok(count > 0)
            }

            /// Row count of a table whose name has already been validated by the caller.
            pub async fn row_count(&self, table: &str) -> Result<i64, sqlx::Error> {
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
                    .fetch_one(&self.pool)
                    .await
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        engine: Option<Arc<SyncEngine>>,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                engine: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        pub fn manage_engine(mut self, engine: Arc<SyncEngine>) -> Self {
            self.engine = Some(engine);
            self
        }

        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(engine) = self.engine {
                rocket = rocket.manage(engine);
            }

            rocket
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
