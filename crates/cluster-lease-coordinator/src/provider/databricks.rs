//! Databricks Clusters REST API adapter

use super::error::classify_api_error;
use super::{ClusterProvider, ProviderError, delete_cluster};
use crate::fingerprint::IGNORED_FIELDS;
use crate::wait::{WaitConfig, WaitError, wait_for_resource};
use anyhow::{Context, Result};
use cluster_lease_common::defaults::DEFAULT_CLUSTER_NAME_PREFIX;
use cluster_lease_common::{ClusterSpec, ClusterState};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for a Databricks workspace
#[derive(Debug, Clone)]
pub struct DatabricksConfig {
    /// Workspace URL, e.g. `https://dbc-1234.cloud.databricks.com`
    pub host: String,
    pub token: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// How long `create` waits for the cluster to leave the pending state
    pub startup_timeout: Duration,
}

impl DatabricksConfig {
    /// Read `DATABRICKS_HOST` and `DATABRICKS_TOKEN`
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("DATABRICKS_HOST").context("DATABRICKS_HOST is not set")?;
        let token = std::env::var("DATABRICKS_TOKEN").context("DATABRICKS_TOKEN is not set")?;
        Ok(Self::new(host, token))
    }

    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        let host = host.into();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };

        Self {
            host: host.trim_end_matches('/').to_string(),
            token: token.into(),
            request_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(20 * 60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    cluster_id: String,
}

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    state: String,
    #[serde(default)]
    state_message: Option<String>,
}

/// Provider backed by the Databricks Clusters API 2.0
pub struct DatabricksProvider {
    config: DatabricksConfig,
    http: HttpClient,
}

impl DatabricksProvider {
    pub fn new(config: DatabricksConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/2.0/clusters/{path}", self.config.host)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cluster_id: Option<&str>,
    ) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| ProviderError::Api {
                status: status.as_u16(),
                code: None,
                message: format!("Malformed response: {e}"),
            });
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();
        let (code, message) = match &body {
            Some(b) => (b.error_code.as_deref(), b.message.as_deref()),
            None => (None, Some(text.as_str()).filter(|t| !t.is_empty())),
        };

        Err(classify_api_error(status.as_u16(), code, message, cluster_id))
    }

    async fn fetch_state(&self, cluster_id: &str) -> Result<ClusterInfo, ProviderError> {
        self.send(
            self.http
                .get(self.url("get"))
                .query(&[("cluster_id", cluster_id)]),
            Some(cluster_id),
        )
        .await
    }

    /// Poll until the cluster is no longer pending
    async fn wait_until_started(&self, cluster_id: &str) -> Result<ClusterState, ProviderError> {
        let config = WaitConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            timeout: self.config.startup_timeout,
            jitter: true,
        };

        let result = wait_for_resource(
            config,
            None,
            move || async move {
                let info = self.fetch_state(cluster_id).await?;
                let state = ClusterState::parse(&info.state);
                debug!(cluster_id, state = %info.state, "Polled cluster state");
                Ok::<_, anyhow::Error>(
                    (state != ClusterState::Pending).then_some((state, info.state_message)),
                )
            },
            &format!("cluster {cluster_id}"),
        )
        .await;

        match result {
            Ok((ClusterState::Running, _)) => Ok(ClusterState::Running),
            Ok((state, message)) => Err(ProviderError::Rejected {
                code: "CLUSTER_START_FAILED".to_string(),
                message: format!(
                    "cluster {cluster_id} ended up {state}: {}",
                    message.unwrap_or_default()
                ),
            }),
            Err(WaitError::Check { source, .. }) => match source.downcast::<ProviderError>() {
                Ok(e) => Err(e),
                Err(other) => Err(ProviderError::Unavailable {
                    message: other.to_string(),
                }),
            },
            Err(e) => Err(ProviderError::Unavailable {
                message: e.to_string(),
            }),
        }
    }
}

/// Map a reqwest failure that produced no HTTP response
fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ProviderError::Unavailable {
            message: e.to_string(),
        }
    } else {
        ProviderError::Api {
            status: e.status().map_or(0, |s| s.as_u16()),
            code: None,
            message: e.to_string(),
        }
    }
}

/// Build the create payload: caller metadata stripped, a name always present
fn create_body(spec: &ClusterSpec) -> Value {
    let mut body = spec.to_json();
    for key in IGNORED_FIELDS.iter().filter(|k| **k != "cluster_name") {
        body.remove(*key);
    }
    if !body.contains_key("cluster_name") {
        let suffix = uuid::Uuid::now_v7().simple().to_string();
        body.insert(
            "cluster_name".to_string(),
            json!(format!("{DEFAULT_CLUSTER_NAME_PREFIX}-{}", &suffix[suffix.len() - 8..])),
        );
    }
    Value::Object(body)
}

impl ClusterProvider for DatabricksProvider {
    async fn create(&self, spec: &ClusterSpec) -> Result<String, ProviderError> {
        let body = create_body(spec);
        let created: CreateResponse = self
            .send(self.http.post(self.url("create")).json(&body), None)
            .await?;

        info!(
            cluster_id = %created.cluster_id,
            cluster_name = %body["cluster_name"],
            "Cluster creation accepted, waiting for startup"
        );

        if let Err(e) = self.wait_until_started(&created.cluster_id).await {
            // Nobody will hold a handle to it
            delete_cluster(self, &created.cluster_id).await;
            return Err(e);
        }

        Ok(created.cluster_id)
    }

    async fn get_status(&self, cluster_id: &str) -> Result<ClusterState, ProviderError> {
        let info = self.fetch_state(cluster_id).await?;
        Ok(ClusterState::parse(&info.state))
    }

    async fn delete(&self, cluster_id: &str) -> Result<(), ProviderError> {
        let _: Value = self
            .send(
                self.http
                    .post(self.url("permanent-delete"))
                    .json(&json!({ "cluster_id": cluster_id })),
                Some(cluster_id),
            )
            .await?;
        Ok(())
    }
}
