use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

pub mod aggregate;
pub mod comparison;
pub mod config;
pub mod error;
pub mod ordered;
pub mod period;
pub mod provider;

pub use aggregate::{
    aggregate, ArtistReport, ChannelEntry, Report, TrackBreakdown, ROYALTY_PER_PLAY,
};
pub use comparison::{percent_change, PeriodReport};
pub use config::ReportConfig;
pub use error::ReportError;
pub use period::{DateRange, PeriodSelector, RangeResolver};
pub use provider::PlayProvider;

#[derive(Clone)]
pub struct AppState {
    resolver: RangeResolver,
    provider: PlayProvider,
}

impl AppState {
    pub fn new(resolver: RangeResolver, provider: PlayProvider) -> Self {
        Self { resolver, provider }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RangeResponse {
    pub period: PeriodSelector,
    pub current: DateRange,
    pub previous: Option<DateRange>,
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    now: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    filter: Option<String>,
    now: Option<String>,
}

/// Parse the path selector and the optional `now` override, reading the clock once.
fn request_period(
    period: &str,
    now: Option<&str>,
) -> Result<(PeriodSelector, DateTime<Utc>), StatusCode> {
    let selector: PeriodSelector = period.parse().map_err(|e: ReportError| {
        tracing::warn!("rejecting request: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let now = match now {
        Some(raw) => crate::period::parse_instant(raw).map_err(|e| {
            tracing::warn!("rejecting request: {}", e);
            StatusCode::BAD_REQUEST
        })?,
        None => Utc::now(),
    };
    Ok((selector, now))
}

async fn get_date_range(
    State(state): State<AppState>,
    Path(period): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<RangeResponse>, StatusCode> {
    let (selector, now) = request_period(&period, params.now.as_deref())?;
    let (current, previous) = state.resolver.resolve(selector, now);

    Ok(Json(RangeResponse {
        period: selector,
        current,
        previous,
    }))
}

#[axum::debug_handler]
async fn get_report(
    State(state): State<AppState>,
    Path(period): Path<String>,
    Query(params): Query<ReportQuery>,
) -> Result<Json<PeriodReport>, StatusCode> {
    let (selector, now) = request_period(&period, params.now.as_deref())?;
    let (current_range, previous_range) = state.resolver.resolve(selector, now);

    let fetch_previous = async {
        match &previous_range {
            Some(range) => state.provider.fetch_plays(range).await,
            None => Ok(Vec::new()),
        }
    };

    let (current_events, previous_events) =
        tokio::try_join!(state.provider.fetch_plays(&current_range), fetch_previous).map_err(
            |e| {
                tracing::error!("failed to fetch plays for {}: {:#}", selector, e);
                StatusCode::BAD_GATEWAY
            },
        )?;

    let report = PeriodReport::build(
        selector,
        current_range,
        previous_range,
        &current_events,
        &previous_events,
        params.filter.as_deref(),
    );
    tracing::info!(
        "{} report: {} artists, {} spins, change {:?}%",
        selector,
        report.current.total_artists,
        report.current.total_spins,
        report.royalty_change_pct
    );

    Ok(Json(report))
}

async fn health_check() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/date-range/:period", get(get_date_range))
        .route("/api/report/:period", get(get_report))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing("spin_report_api=debug,tower_http=debug");

    let config = ReportConfig::from_env()?;
    tracing::info!(
        "reporting in {} with data from {} (provider {})",
        config.timezone,
        config.earliest_data,
        config.provider_url
    );

    let state = AppState::new(config.resolver(), PlayProvider::new(&config.provider_url));
    let app = router(state);

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
