// Shared HTTP plumbing for the backend adapters
//
// Owns the reqwest client, applies the probe/request/idle budgets and maps
// transport and status failures onto BackendError.

use anyhow::Context;
use futures::stream::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::error::BackendError;
use super::types::{AdapterOptions, BackendDescriptor, GenerationRequest};
use crate::stream::{spawn_reader, ConnectionTracker, FrameDecoder, StreamingSession};

/// Longest error body quoted back in a BackendError.
const MAX_ERROR_BODY: usize = 300;

pub struct HttpTransport {
    client: Client,
    name: String,
    descriptor: BackendDescriptor,
    options: AdapterOptions,
    connections: ConnectionTracker,
}

impl HttpTransport {
    pub fn new(descriptor: BackendDescriptor, options: AdapterOptions) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            name: descriptor.display_name(),
            descriptor,
            options,
            connections: ConnectionTracker::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.descriptor.base_url.trim_end_matches('/'), path)
    }

    /// Model to request: the backend's own override, else the request's.
    pub fn model_for<'a>(&'a self, request: &'a GenerationRequest) -> &'a str {
        self.descriptor.model.as_deref().unwrap_or(&request.model)
    }

    pub fn active_connections(&self) -> usize {
        self.connections.active()
    }

    /// GET `path` within the probe budget. Any failure is reported as `false`.
    pub async fn probe(&self, path: &str) -> bool {
        let result = self
            .client
            .get(self.url(path))
            .timeout(self.options.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Probe {} ok", self.name);
                true
            }
            Ok(response) => {
                tracing::debug!("Probe {} returned {}", self.name, response.status());
                false
            }
            Err(e) => {
                tracing::debug!("Probe {} failed: {}", self.name, e);
                false
            }
        }
    }

    /// POST a JSON body and decode a single JSON response.
    pub async fn post_json<T, R>(&self, path: &str, body: &T) -> Result<R, BackendError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let _guard = self.connections.acquire();
        let budget = self.options.request_timeout;

        tracing::debug!("POST {} ({})", self.url(path), self.name);

        let response = self
            .client
            .post(self.url(path))
            .timeout(budget)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&self.name, &e, budget))?;

        let response = self.check_status(response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_transport(&self.name, &e, budget))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            BackendError::protocol(&self.name, format!("undecodable response body: {}", e))
        })
    }

    /// POST a JSON body and stream the response through `decoder`.
    ///
    /// Waiting for the response headers is bounded by the idle timeout; after
    /// that the session enforces it between fragments.
    pub async fn post_stream<T, D>(
        &self,
        path: &str,
        body: &T,
        decoder: D,
    ) -> Result<StreamingSession, BackendError>
    where
        T: Serialize + ?Sized,
        D: FrameDecoder,
    {
        let guard = self.connections.acquire();
        let idle = self.options.idle_timeout;

        tracing::debug!("POST {} ({}, streaming)", self.url(path), self.name);

        let send = self.client.post(self.url(path)).json(body).send();
        let response = match tokio::time::timeout(idle, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(BackendError::from_transport(&self.name, &e, idle)),
            Err(_) => return Err(BackendError::timeout(&self.name, idle)),
        };

        let response = self.check_status(response).await?;

        let name = self.name.clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| BackendError::from_transport(&name, &e, idle)));

        let cancel = CancellationToken::new();
        let rx = spawn_reader(self.name.clone(), body, decoder, guard, cancel.clone());

        Ok(StreamingSession::new(self.name.clone(), rx, cancel, idle))
    }

    /// 5xx means the server is unhealthy; any other non-success status means
    /// it rejected what we sent.
    async fn check_status(&self, response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };

        if status.is_server_error() {
            Err(BackendError::unavailable(&self.name, message))
        } else {
            Err(BackendError::protocol(&self.name, message))
        }
    }
}
