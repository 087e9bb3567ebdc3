//! Payment gateway client.
//!
//! Charges go to a Stripe-compatible `POST /v1/charges` endpoint. Every
//! network call passes through a [`CircuitBreaker`] so a failing gateway is
//! not hammered by each checkout.

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, PaymentConfig};
use crate::error::{AppError, ErrorSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Too many consecutive failures; requests are refused until the timeout passes.
    Open,
    /// Timeout passed; the next request decides whether to close again.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner { state: CircuitState::Closed, failures: 0, opened_at: None }),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, Duration::from_secs(config.timeout_seconds))
    }

    // a panic while holding the lock leaves the counters usable
    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = inner.opened_at.map_or(true, |at| at.elapsed() >= self.timeout);
                if expired {
                    inner.state = CircuitState::HalfOpen;
                    info!("circuit breaker transitioning to HalfOpen");
                }
                expired
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            info!("circuit breaker recovered, closing");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        match inner.state {
            CircuitState::Closed if inner.failures >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                error!(failures = inner.failures, threshold = self.failure_threshold, "circuit breaker OPENED");
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("circuit breaker trial request failed, reopening");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,

    #[error("circuit breaker is open, payment gateway temporarily unavailable")]
    Open,

    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment gateway answered with status {0}")]
    Status(u16),

    #[error("could not encode charge: {0}")]
    Encoding(String),

    /// The gateway refused the card or token.
    #[error("{0}")]
    Declined(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Declined(reason) => {
                AppError::unprocessable(ErrorSource::pointer("stripe_token_id"), reason)
            }
            other => AppError::PaymentGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Smallest currency unit.
    pub amount_cents: i64,
    pub currency: String,
    pub token: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeOutcome {
    pub transaction_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;
}

#[derive(Debug, Serialize)]
struct StripeChargeForm<'a> {
    amount: i64,
    currency: String,
    source: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    #[serde(default)]
    paid: bool,
    failure_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

pub struct StripeClient {
    secret_key: Option<String>,
    base_url: String,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
}

impl StripeClient {
    pub fn from_config(payment: &PaymentConfig, breaker: &CircuitBreakerConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(payment.timeout_seconds))
            .build()?;

        Ok(Self {
            secret_key: payment.stripe_secret_key.clone(),
            base_url: payment.gateway_url.trim_end_matches('/').to_string(),
            http_client,
            circuit_breaker: CircuitBreaker::from_config(breaker),
        })
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn send(&self, secret_key: &str, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        let form = StripeChargeForm {
            amount: request.amount_cents,
            currency: request.currency.to_lowercase(),
            source: &request.token,
            description: &request.description,
        };
        let body = serde_urlencoded::to_string(&form).map_err(|e| GatewayError::Encoding(e.to_string()))?;

        let response = self
            .http_client
            .post(format!("{}/v1/charges", self.base_url))
            .bearer_auth(secret_key)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let charge: StripeCharge = response.json().await?;
            if !charge.paid {
                return Err(GatewayError::Declined(
                    charge.failure_message.unwrap_or_else(|| "The charge was not paid".to_string()),
                ));
            }
            return Ok(ChargeOutcome { transaction_id: charge.id });
        }

        if status.is_client_error() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("The charge was refused ({status})"));
            return Err(GatewayError::Declined(message));
        }

        Err(GatewayError::Status(status.as_u16()))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        let secret_key = self.secret_key.as_deref().ok_or(GatewayError::NotConfigured)?;

        if !self.circuit_breaker.can_execute() {
            warn!("circuit breaker is OPEN, refusing payment gateway request");
            return Err(GatewayError::Open);
        }

        info!(amount = request.amount_cents, currency = %request.currency, "submitting charge");
        let result = self.send(secret_key, request).await;

        match &result {
            // a declined card means the gateway is healthy
            Ok(_) | Err(GatewayError::Declined(_)) => self.circuit_breaker.record_success(),
            Err(e) => {
                error!(error = %e, "payment gateway request failed");
                self.circuit_breaker.record_failure();
            }
        }
        result
    }
}
