//! Typed access to the remote object API.
//!
//! `RemoteObjectApi` is the seam the engine depends on; `SalesforceClient` is
//! the REST implementation. Failures pass straight through: retrying is left
//! to the scheduler's next tick.

use super::config::SyncConfig;
use super::error::{SyncError, SyncResult};
use super::schema::validate_identifier;
use crate::models::{AuthBundle, ObjectDefinition, ObjectSummary, QueryPage};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Path prefix every `nextRecordsUrl` must carry before we follow it.
const DATA_PATH_PREFIX: &str = "/services/data/";

#[rocket::async_trait]
pub trait RemoteObjectApi: Send + Sync {
    async fn describe(&self, auth: &AuthBundle, name: &str) -> SyncResult<ObjectDefinition>;

    async fn list_objects(&self, auth: &AuthBundle) -> SyncResult<Vec<ObjectSummary>>;

    async fn query(&self, auth: &AuthBundle, soql: &str) -> SyncResult<QueryPage>;

    /// Fetch the page referenced by a previous page's `nextRecordsUrl`.
    async fn query_more(&self, auth: &AuthBundle, next_records_url: &str)
    -> SyncResult<QueryPage>;
}

/// Run a remote call with an upper bound on its duration.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(limit)),
    }
}

#[derive(Clone)]
pub struct SalesforceClient {
    http: Client,
    api_version: String,
}

impl SalesforceClient {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("sobject-sync/0.1")
            .build()
            .map_err(SyncError::Network)?;

        Ok(Self {
            http,
            api_version: config.api_version.clone(),
        })
    }

    fn endpoint(&self, auth: &AuthBundle, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            auth.instance_url.trim_end_matches('/'),
            self.api_version,
            path
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        auth: &AuthBundle,
        url: &str,
        query: &[(&str, &str)],
    ) -> SyncResult<T> {
        log::debug!("remote: GET {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&auth.access_token)
            .query(query)
            .send()
            .await
            .map_err(SyncError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::remote_status(status, body));
        }

        let body = response.bytes().await.map_err(SyncError::Network)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[derive(Deserialize)]
struct ObjectListing {
    #[serde(default)]
    sobjects: Vec<ObjectSummary>,
}

#[rocket::async_trait]
impl RemoteObjectApi for SalesforceClient {
    async fn describe(&self, auth: &AuthBundle, name: &str) -> SyncResult<ObjectDefinition> {
        let name = validate_identifier(name)?;
        let url = self.endpoint(auth, &format!("sobjects/{name}/describe/"));
        self.get_json(auth, &url, &[]).await
    }

    async fn list_objects(&self, auth: &AuthBundle) -> SyncResult<Vec<ObjectSummary>> {
        let url = self.endpoint(auth, "sobjects/");
        let listing: ObjectListing = self.get_json(auth, &url, &[]).await?;
        Ok(listing.sobjects)
    }

    async fn query(&self, auth: &AuthBundle, soql: &str) -> SyncResult<QueryPage> {
        let url = self.endpoint(auth, "query/");
        self.get_json(auth, &url, &[("q", soql)]).await
    }

    async fn query_more(
        &self,
        auth: &AuthBundle,
        next_records_url: &str,
    ) -> SyncResult<QueryPage> {
        // Only follow relative data-API paths so the token never leaves the instance.
        if !next_records_url.starts_with(DATA_PATH_PREFIX) || next_records_url.contains("://") {
            return Err(SyncError::UnexpectedPageUrl(next_records_url.to_string()));
        }

        let url = format!(
            "{}{}",
            auth.instance_url.trim_end_matches('/'),
            next_records_url
        );
        self.get_json(auth, &url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SalesforceClient {
        let config = SyncConfig {
            tick_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            connection_name: "default".into(),
            api_version: "54.0".into(),
            run_retention: Duration::from_secs(60),
            scheduler_enabled: false,
        };
        SalesforceClient::new(&config).expect("client builds")
    }

    #[test]
    fn endpoint_joins_instance_and_version() {
        let auth = AuthBundle::new("token", "https://example.my.salesforce.com/");
        assert_eq!(
            client().endpoint(&auth, "sobjects/Account/describe/"),
            "https://example.my.salesforce.com/services/data/v54.0/sobjects/Account/describe/"
        );
    }

    #[tokio::test]
    async fn refuses_foreign_next_records_url() {
        let auth = AuthBundle::new("token", "https://example.my.salesforce.com");
        let err = client()
            .query_more(&auth, "https://evil.example.com/services/data/v54.0/query/x")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnexpectedPageUrl(_)));
    }

    #[tokio::test]
    async fn describe_validates_object_name() {
        let auth = AuthBundle::new("token", "https://example.my.salesforce.com");
        let err = client().describe(&auth, "../limits").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn timeout_bounds_slow_calls() {
        let err = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, SyncError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
    }

    #[test]
    fn decodes_query_page() {
        let page: QueryPage = serde_json::from_str(
            r#"{"totalSize":2,"done":false,"nextRecordsUrl":"/services/data/v54.0/query/01g-2000",
                "records":[{"attributes":{"type":"Account"},"Id":"001","Name":"Acme"}]}"#,
        )
        .expect("decodes");
        assert_eq!(page.total_size, 2);
        assert!(!page.done);
        assert_eq!(page.records.len(), 1);
        assert_eq!(
            page.next_records_url.as_deref(),
            Some("/services/data/v54.0/query/01g-2000")
        );
    }
}
