use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use shopcrawl::{FinalAnswer, Pipeline, PipelineArgs};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "shopcrawl-api",
    about = "HTTP API that answers shopping questions from catalog and web search"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "SHOPCRAWL_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Max requests per minute allowed (0 disables rate limiting).
    #[arg(long, default_value_t = 120)]
    max_requests_per_minute: u32,

    /// Rate-limit burst size (tokens available instantly).
    #[arg(long, default_value_t = 12)]
    rate_limit_burst: u32,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    rate_limiter: Option<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct AnswerResponse {
    final_answer: FinalAnswer,
    debug_log: Vec<String>,
    latency_ms: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopcrawl=info".into()),
        )
        .init();

    let cli = ApiCli::parse();
    let pipeline = Pipeline::new(
        cli.pipeline.build_classifier()?,
        Arc::new(cli.pipeline.build_capabilities()?),
    )
    .with_controls(cli.pipeline.build_controls());
    let state = AppState {
        pipeline,
        rate_limiter: RateLimiter::new(cli.max_requests_per_minute, cli.rate_limit_burst),
    };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/answer", post(answer_handler))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!(%addr, "shopcrawl-api listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// A client disconnect drops this future, which abandons in-flight capability calls.
async fn answer_handler(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, (StatusCode, Json<ErrorBody>)> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query text must not be empty"));
    }
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.acquire().await {
            return Err(too_many_requests("rate limit exceeded"));
        }
    }
    let start = Instant::now();
    let run = state.pipeline.run_state(request.query.trim()).await;
    let debug_log = run.debug_log().to_vec();
    let final_answer = run
        .into_final_answer()
        .unwrap_or_else(FinalAnswer::no_results);
    Ok(Json(AnswerResponse {
        final_answer,
        debug_log,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    }))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn too_many_requests(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

#[derive(Clone)]
struct RateLimiter {
    state: Arc<Mutex<RateState>>,
    capacity: f64,
    refill_per_sec: f64,
}

struct RateState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(max_per_minute: u32, burst: u32) -> Option<Self> {
        if max_per_minute == 0 || burst == 0 {
            return None;
        }
        let capacity = burst as f64;
        let refill_per_sec = max_per_minute as f64 / 60.0;
        Some(Self {
            state: Arc::new(Mutex::new(RateState {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            capacity,
            refill_per_sec,
        })
    }

    async fn acquire(&self) -> bool {
        let mut guard = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(guard.last_refill).as_secs_f64();
        guard.last_refill = now;
        guard.tokens = (guard.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if guard.tokens >= 1.0 {
            guard.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopcrawl::{AnswerKind, CapabilitySet, RuleClassifier};

    fn state(rate_limiter: Option<RateLimiter>) -> AppState {
        AppState {
            pipeline: Pipeline::new(Arc::new(RuleClassifier), Arc::new(CapabilitySet::new())),
            rate_limiter,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_query_is_a_bad_request() {
        let err = answer_handler(
            State(state(None)),
            Json(AnswerRequest {
                query: "   ".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn burst_is_enforced() {
        let limiter = RateLimiter::new(1, 2).unwrap();
        assert!(limiter.acquire().await);
        assert!(limiter.acquire().await);
        assert!(!limiter.acquire().await);
        assert!(RateLimiter::new(0, 5).is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_providers_still_answer() {
        let Json(body) = answer_handler(
            State(state(None)),
            Json(AnswerRequest {
                query: "current price of Catan".into(),
            }),
        )
        .await
        .map_err(|(status, _)| status)
        .unwrap();
        assert_eq!(body.final_answer.kind, AnswerKind::NoResults);
        assert!(body.debug_log.iter().any(|line| line.contains("not configured")));
    }
}
