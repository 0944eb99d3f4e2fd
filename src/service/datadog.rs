use crate::config::Credentials;
use crate::error::ServiceError;
use crate::model::{AlertId, AlertInstance, RemoteAlert, TagFilter};
use crate::service::AlertService;
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default endpoint of the Datadog v1 API
pub const DEFAULT_BASE_URL: &str = "https://api.datadoghq.com/api/v1";

/// Datadog monitors API client
///
/// Each alert maps to one Datadog monitor. Requests are authenticated with the
/// API and application keys and block until the service answers.
pub struct DatadogClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl DatadogClient {
    /// Create a client for the public Datadog API
    ///
    /// # Example
    /// ```
    /// use kennel::config::Credentials;
    /// use kennel::service::DatadogClient;
    ///
    /// let credentials = Credentials::new("api-key", "app-key");
    /// let client = DatadogClient::new(credentials).unwrap();
    /// ```
    pub fn new(credentials: Credentials) -> Result<Self, ServiceError> {
        Self::with_base_url(credentials, DEFAULT_BASE_URL.to_string())
    }

    /// Create a client for another Datadog site or a compatible endpoint
    pub fn with_base_url(credentials: Credentials, base_url: String) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Format an endpoint URL under the base URL
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn monitor_url(&self, id: &AlertId) -> String {
        self.url(&format!("monitor/{}", id))
    }

    /// Value of the `monitor_tags` query parameter
    fn monitor_tags_param(tags: &TagFilter) -> String {
        tags.to_wire().join(",")
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("DD-API-KEY", self.credentials.api_key())
            .header("DD-APPLICATION-KEY", self.credentials.app_key())
    }

    /// Send a request and map HTTP failures to service errors
    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, ServiceError> {
        let response = self.authenticated(request).send()?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!("{} -> {}", what, status);
        Ok(response)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ServiceError> {
        self.send(request, what)?.json().map_err(|e| {
            ServiceError::InvalidResponse(format!("Failed to parse response to {}: {}", what, e))
        })
    }
}

impl AlertService for DatadogClient {
    fn list(&self, tags: &TagFilter) -> Result<Vec<RemoteAlert>, ServiceError> {
        let request = self
            .client
            .get(self.url("monitor"))
            .query(&[("monitor_tags", Self::monitor_tags_param(tags))]);
        self.send_json(request, "list monitors")
    }

    fn get(&self, id: &AlertId) -> Result<RemoteAlert, ServiceError> {
        let request = self.client.get(self.monitor_url(id));
        self.send_json(request, &format!("get monitor {}", id))
    }

    fn create(&self, alert: &AlertInstance) -> Result<RemoteAlert, ServiceError> {
        let request = self.client.post(self.url("monitor")).json(alert);
        self.send_json(request, &format!("create monitor '{}'", alert.name))
    }

    fn update(&self, id: &AlertId, alert: &RemoteAlert) -> Result<RemoteAlert, ServiceError> {
        let request = self.client.put(self.monitor_url(id)).json(alert);
        self.send_json(request, &format!("update monitor {}", id))
    }

    fn delete(&self, id: &AlertId) -> Result<(), ServiceError> {
        let request = self.client.delete(self.monitor_url(id));
        self.send(request, &format!("delete monitor {}", id))?;
        Ok(())
    }
}
