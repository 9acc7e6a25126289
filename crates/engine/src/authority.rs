use anyhow::Context;
use dispatchgrid_protocol::{
    Driver, ErrorBody, GridInfo, Location, RideRequest, RideRequestBody, Rider, SystemState,
    TickResponse,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("{call}: transport failure: {message}")]
    Transport { call: &'static str, message: String },
    #[error("{call}: authority answered HTTP {status}")]
    Status {
        call: &'static str,
        status: u16,
        detail: Option<String>,
    },
    #[error("{call}: unreadable response: {message}")]
    Decode { call: &'static str, message: String },
}

impl AuthorityError {
    pub fn call(&self) -> &'static str {
        match self {
            Self::Transport { call, .. } | Self::Status { call, .. } | Self::Decode { call, .. } => {
                call
            }
        }
    }

    /// The authority's own explanation, when it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// The external simulation authority as the client consumes it.
pub trait Authority: Send + Sync + 'static {
    fn list_drivers(&self) -> impl Future<Output = Result<Vec<Driver>, AuthorityError>> + Send;
    fn list_riders(&self) -> impl Future<Output = Result<Vec<Rider>, AuthorityError>> + Send;
    fn list_rides(&self) -> impl Future<Output = Result<Vec<RideRequest>, AuthorityError>> + Send;
    fn system_state(&self) -> impl Future<Output = Result<SystemState, AuthorityError>> + Send;

    fn create_driver(
        &self,
        at: Location,
    ) -> impl Future<Output = Result<Driver, AuthorityError>> + Send;
    fn delete_driver(&self, id: &str) -> impl Future<Output = Result<(), AuthorityError>> + Send;
    fn create_rider(&self, at: Location)
        -> impl Future<Output = Result<Rider, AuthorityError>> + Send;
    fn delete_rider(&self, id: &str) -> impl Future<Output = Result<(), AuthorityError>> + Send;
    fn request_ride(
        &self,
        body: &RideRequestBody,
    ) -> impl Future<Output = Result<RideRequest, AuthorityError>> + Send;
    fn cancel_ride(&self, id: &str) -> impl Future<Output = Result<(), AuthorityError>> + Send;
    fn advance_tick(&self) -> impl Future<Output = Result<TickResponse, AuthorityError>> + Send;

    fn grid_info(&self) -> impl Future<Output = Result<GridInfo, AuthorityError>> + Send;
}

/// JSON-over-HTTP authority, e.g. `http://127.0.0.1:8000/api`.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn execute(
        &self,
        call: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, AuthorityError> {
        let response = request.send().await.map_err(|e| AuthorityError::Transport {
            call,
            message: e.to_string(),
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message());
        Err(AuthorityError::Status {
            call,
            status: status.as_u16(),
            detail,
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        call: &'static str,
        request: RequestBuilder,
    ) -> Result<T, AuthorityError> {
        self.execute(call, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AuthorityError::Decode {
                call,
                message: e.to_string(),
            })
    }

    // Acknowledgement bodies vary (`{message}`, empty); only the status matters.
    async fn acknowledge(
        &self,
        call: &'static str,
        request: RequestBuilder,
    ) -> Result<(), AuthorityError> {
        self.execute(call, request).await.map(drop)
    }
}

impl Authority for HttpAuthority {
    async fn list_drivers(&self) -> Result<Vec<Driver>, AuthorityError> {
        self.fetch("list drivers", self.client.get(self.url("/drivers/")))
            .await
    }

    async fn list_riders(&self) -> Result<Vec<Rider>, AuthorityError> {
        self.fetch("list riders", self.client.get(self.url("/riders/")))
            .await
    }

    async fn list_rides(&self) -> Result<Vec<RideRequest>, AuthorityError> {
        self.fetch("list rides", self.client.get(self.url("/rides/")))
            .await
    }

    async fn system_state(&self) -> Result<SystemState, AuthorityError> {
        self.fetch("system state", self.client.get(self.url("/state")))
            .await
    }

    async fn create_driver(&self, at: Location) -> Result<Driver, AuthorityError> {
        let request = self.client.post(self.url("/drivers/")).json(&at);
        self.fetch("create driver", request).await
    }

    async fn delete_driver(&self, id: &str) -> Result<(), AuthorityError> {
        let request = self.client.delete(self.url(&format!("/drivers/{id}")));
        self.acknowledge("delete driver", request).await
    }

    async fn create_rider(&self, at: Location) -> Result<Rider, AuthorityError> {
        let request = self.client.post(self.url("/riders/")).json(&at);
        self.fetch("create rider", request).await
    }

    async fn delete_rider(&self, id: &str) -> Result<(), AuthorityError> {
        let request = self.client.delete(self.url(&format!("/riders/{id}")));
        self.acknowledge("delete rider", request).await
    }

    async fn request_ride(&self, body: &RideRequestBody) -> Result<RideRequest, AuthorityError> {
        let request = self.client.post(self.url("/rides/request")).json(body);
        self.fetch("request ride", request).await
    }

    async fn cancel_ride(&self, id: &str) -> Result<(), AuthorityError> {
        let request = self.client.put(self.url(&format!("/rides/{id}/cancel")));
        self.acknowledge("cancel ride", request).await
    }

    async fn advance_tick(&self) -> Result<TickResponse, AuthorityError> {
        self.fetch("advance tick", self.client.post(self.url("/tick")))
            .await
    }

    async fn grid_info(&self) -> Result<GridInfo, AuthorityError> {
        self.fetch("grid info", self.client.get(self.url("/grid-info")))
            .await
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
