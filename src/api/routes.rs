use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::db::models::{ComparisonRow, PostedContentRow, SmartMoneyRow};
use crate::db::SqliteStore;
use crate::error::AppError;

#[derive(Clone)]
pub struct ApiState {
    pub store: SqliteStore,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/posts/recent", get(get_recent_posts))
        .route("/posts/similar", get(get_similar_posts))
        .route("/assets/:asset/smart-money", get(get_smart_money))
        .route("/assets/:asset/comparisons", get(get_comparisons))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SimilarQuery {
    pub text: String,
    pub hours: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub market_data_ok: bool,
    pub cycles_completed: u64,
    pub posts_published: u64,
    pub last_cycle_at_ns: u64,
    pub last_post_at_ns: u64,
}

#[derive(Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub content: String,
    pub asset: String,
    pub trigger_type: String,
    pub sentiment: serde_json::Value,
    pub price_data: serde_json::Value,
    pub posted_at: i64,
}

#[derive(Serialize)]
pub struct SimilarResponse {
    pub hours: i64,
    pub similar: bool,
}

#[derive(Serialize)]
pub struct SmartMoneyResponse {
    pub id: i64,
    pub symbol: String,
    pub volume_z_score: f64,
    pub price_volume_divergence: bool,
    pub stealth_accumulation: bool,
    pub abnormal_volume: bool,
    pub volume_vs_hourly_avg: f64,
    pub volume_vs_daily_avg: f64,
    pub volume_cluster_detected: bool,
    pub unusual_hours: Vec<u8>,
    pub recorded_at: i64,
}

#[derive(Serialize)]
pub struct ComparisonResponse {
    pub id: i64,
    pub symbol: String,
    pub performance_diff: f64,
    pub volume_growth_diff: f64,
    pub outperforming: bool,
    pub basket_size: i64,
    pub correlations: serde_json::Value,
    pub recorded_at: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let h = &state.health;
    Json(HealthResponse {
        status: if h.market_data_ok() || h.cycles_completed() == 0 { "ok" } else { "degraded" },
        market_data_ok: h.market_data_ok(),
        cycles_completed: h.cycles_completed(),
        posts_published: h.posts_published(),
        last_cycle_at_ns: h.last_cycle_at_ns(),
        last_post_at_ns: h.last_post_at_ns(),
    })
}

async fn get_recent_posts(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let limit = params.limit.unwrap_or(20);

    let rows = sqlx::query_as::<_, PostedContentRow>(
        r#"
        SELECT id, content, asset, trigger_type, sentiment, price_data, posted_at
        FROM posted_content
        ORDER BY posted_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(state.store.pool())
    .await?;

    let posts = rows
        .into_iter()
        .map(|r| PostResponse {
            id: r.id,
            content: r.content,
            asset: r.asset,
            trigger_type: r.trigger_type,
            sentiment: serde_json::from_str(&r.sentiment).unwrap_or(serde_json::Value::Null),
            price_data: serde_json::from_str(&r.price_data).unwrap_or(serde_json::Value::Null),
            posted_at: r.posted_at,
        })
        .collect();

    Ok(Json(posts))
}

async fn get_similar_posts(
    State(state): State<ApiState>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<SimilarResponse>, AppError> {
    let hours = params.hours.unwrap_or(24);
    let similar = state.store.has_similar_post(&params.text, hours, Utc::now()).await?;
    Ok(Json(SimilarResponse { hours, similar }))
}

async fn get_smart_money(
    State(state): State<ApiState>,
    Path(asset): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<SmartMoneyResponse>>, AppError> {
    let limit = params.limit.unwrap_or(50);

    let rows = sqlx::query_as::<_, SmartMoneyRow>(
        r#"
        SELECT id, symbol, volume_z_score, price_volume_divergence, stealth_accumulation,
               abnormal_volume, volume_vs_hourly_avg, volume_vs_daily_avg,
               volume_cluster_detected, unusual_hours, recorded_at
        FROM smart_money_indicators
        WHERE symbol = ?
        ORDER BY recorded_at DESC
        LIMIT ?
        "#,
    )
    .bind(asset.to_uppercase())
    .bind(limit)
    .fetch_all(state.store.pool())
    .await?;

    let signals = rows
        .into_iter()
        .map(|r| SmartMoneyResponse {
            id: r.id,
            symbol: r.symbol,
            volume_z_score: r.volume_z_score,
            price_volume_divergence: r.price_volume_divergence,
            stealth_accumulation: r.stealth_accumulation,
            abnormal_volume: r.abnormal_volume,
            volume_vs_hourly_avg: r.volume_vs_hourly_avg,
            volume_vs_daily_avg: r.volume_vs_daily_avg,
            volume_cluster_detected: r.volume_cluster_detected,
            unusual_hours: serde_json::from_str(&r.unusual_hours).unwrap_or_default(),
            recorded_at: r.recorded_at,
        })
        .collect();

    Ok(Json(signals))
}

async fn get_comparisons(
    State(state): State<ApiState>,
    Path(asset): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<ComparisonResponse>>, AppError> {
    let limit = params.limit.unwrap_or(50);

    let rows = sqlx::query_as::<_, ComparisonRow>(
        r#"
        SELECT id, symbol, performance_diff, volume_growth_diff, outperforming,
               basket_size, correlations, recorded_at
        FROM token_market_comparison
        WHERE symbol = ?
        ORDER BY recorded_at DESC
        LIMIT ?
        "#,
    )
    .bind(asset.to_uppercase())
    .bind(limit)
    .fetch_all(state.store.pool())
    .await?;

    let comparisons = rows
        .into_iter()
        .map(|r| ComparisonResponse {
            id: r.id,
            symbol: r.symbol,
            performance_diff: r.performance_diff,
            volume_growth_diff: r.volume_growth_diff,
            outperforming: r.outperforming,
            basket_size: r.basket_size,
            correlations: serde_json::from_str(&r.correlations).unwrap_or(serde_json::Value::Null),
            recorded_at: r.recorded_at,
        })
        .collect();

    Ok(Json(comparisons))
}
