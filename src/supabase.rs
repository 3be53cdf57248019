//! PostgREST client for the hosted `demands` / `messages` tables.

use chrono::{DateTime, SecondsFormat, Utc};
use failsafe::futures::CircuitBreaker;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use crate::circuit_breaker::{create_backend_circuit_breaker, BackendCircuitBreaker};
use crate::config::SupabaseCredentials;
use crate::errors::{AppError, ResultExt};
use crate::models::{Case, CaseUpdate, Message, NewMessage};

const CASES_TABLE: &str = "demands";
const MESSAGES_TABLE: &str = "messages";

/// Client for the hosted backend's REST surface.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    anon_key: String,
    breaker: BackendCircuitBreaker,
}

impl SupabaseClient {
    /// Creates a new `SupabaseClient`.
    ///
    /// # Arguments
    ///
    /// * `credentials` - Project URL and anon key.
    /// * `timeout` - Per-request timeout.
    pub fn new(credentials: &SupabaseCredentials, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create backend client: {}", e))
        })?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", credentials.url.trim_end_matches('/')),
            anon_key: credentials.anon_key.clone(),
            breaker: create_backend_circuit_breaker(),
        })
    }

    fn table_url(&self, table: &str, params: &[(&str, &str)]) -> Result<reqwest::Url, AppError> {
        reqwest::Url::parse_with_params(&format!("{}/{}", self.rest_url, table), params)
            .map_err(|e| AppError::InternalError(format!("Failed to build URL: {}", e)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    /// Runs a backend call through the circuit breaker.
    async fn guarded<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match self.breaker.call(call).await {
            Ok(value) => Ok(value),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Backend circuit open, request rejected");
                Err(AppError::BackendError(
                    "Backend temporarily unavailable, try again shortly".to_string(),
                ))
            }
        }
    }

    async fn check(response: Response, action: &str) -> Result<Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!("Backend {} failed with {}: {}", action, status, error_text);
        Err(AppError::BackendError(format!(
            "{} failed ({}): {}",
            action, status, error_text
        )))
    }

    async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T, AppError> {
        response.json().await.map_err(|e| {
            AppError::BackendError(format!("Failed to parse {} response: {}", action, e))
        })
    }

    /// Reads one page of cases, newest first.
    pub async fn fetch_cases_page(&self, offset: u64, limit: u32) -> Result<Vec<Case>, AppError> {
        let offset = offset.to_string();
        let limit = limit.to_string();
        let url = self.table_url(
            CASES_TABLE,
            &[
                ("select", "*"),
                ("order", "created_at.desc"),
                ("offset", &offset),
                ("limit", &limit),
            ],
        )?;
        tracing::debug!("Fetching cases offset={} limit={}", offset, limit);

        self.guarded(async {
            let response = self
                .authorized(self.client.get(url))
                .send()
                .await
                .map_err(AppError::from)
                .context("Case fetch")?;
            let response = Self::check(response, "Case fetch").await?;
            Self::parse::<Vec<Case>>(response, "case list").await
        })
        .await
    }

    /// Point update of a case. Returns the stored row after the update.
    pub async fn update_case(&self, id: &str, update: &CaseUpdate) -> Result<Case, AppError> {
        let filter = format!("eq.{}", id);
        let url = self.table_url(CASES_TABLE, &[("id", &filter)])?;
        tracing::info!("Updating case {} to {:?}", id, update.status);

        let rows: Vec<Case> = self
            .guarded(async {
                let response = self
                    .authorized(self.client.patch(url))
                    .header("Prefer", "return=representation")
                    .json(update)
                    .send()
                    .await
                    .map_err(AppError::from)
                    .context("Case update")?;
                let response = Self::check(response, "Case update").await?;
                Self::parse(response, "case update").await
            })
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("Case {} not found", id)))
    }

    /// All messages of a case, oldest first.
    pub async fn list_messages(&self, case_id: &str) -> Result<Vec<Message>, AppError> {
        self.list_messages_filtered(case_id, None).await
    }

    /// Messages created at or after `since`, oldest first.
    pub async fn list_messages_since(
        &self,
        case_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, AppError> {
        self.list_messages_filtered(case_id, Some(since)).await
    }

    async fn list_messages_filtered(
        &self,
        case_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, AppError> {
        let case_filter = format!("eq.{}", case_id);
        let since_filter = since.map(|ts| {
            format!("gte.{}", ts.to_rfc3339_opts(SecondsFormat::Micros, true))
        });
        let mut params = vec![
            ("select", "*"),
            ("demand_id", case_filter.as_str()),
            ("order", "created_at.asc"),
        ];
        if let Some(ref filter) = since_filter {
            params.push(("created_at", filter.as_str()));
        }
        let url = self.table_url(MESSAGES_TABLE, &params)?;

        self.guarded(async {
            let response = self
                .authorized(self.client.get(url))
                .send()
                .await
                .map_err(AppError::from)
                .context("Message fetch")?;
            let response = Self::check(response, "Message fetch").await?;
            Self::parse::<Vec<Message>>(response, "message list").await
        })
        .await
    }

    /// Inserts a chat message.
    pub async fn insert_message(&self, message: &NewMessage) -> Result<(), AppError> {
        let url = self.table_url(MESSAGES_TABLE, &[])?;
        tracing::info!(
            "Inserting {:?} message for case {}",
            message.sender,
            message.demand_id
        );

        self.guarded(async {
            let response = self
                .authorized(self.client.post(url))
                .header("Prefer", "return=minimal")
                .json(message)
                .send()
                .await
                .map_err(AppError::from)
                .context("Message insert")?;
            Self::check(response, "Message insert").await?;
            Ok(())
        })
        .await
    }
}
