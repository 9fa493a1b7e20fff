//! Search API handlers / 搜索接口

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, ApiResult};
use crate::state::AppState;
use fts_chinese::search::analytics::WordCount;
use fts_chinese::search::{CheckResult, SearchHit, SearchMode, SearchRequest, Status};
use fts_chinese::store::Record;
use fts_chinese::SearchError;

/// POST /api/v1/search
pub async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> ApiResult<Vec<SearchHit>> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(SearchError::InvalidInput("搜索关键词不能为空 / query must not be empty".to_string()).into());
    }
    let req = SearchRequest {
        query: query.to_string(),
        ..req
    };
    Ok(Json(state.engine.search(&req).await?))
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_check_mode")]
    pub mode: SearchMode,
}

fn default_check_mode() -> SearchMode {
    SearchMode::Scan
}

/// GET /api/v1/ftcheck?query=xxx
pub async fn ftcheck(State(state): State<Arc<AppState>>, Query(q): Query<CheckQuery>) -> ApiResult<CheckResult> {
    Ok(Json(state.engine.check(q.query.trim(), q.mode).await?))
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub id: String,
}

/// GET /api/v1/details?id=xxx
pub async fn details(State(state): State<Arc<AppState>>, Query(q): Query<DetailQuery>) -> ApiResult<Record> {
    let id: u64 = q
        .id
        .trim()
        .parse()
        .map_err(|_| SearchError::InvalidInput(format!("invalid document id: {:?}", q.id)))?;
    Ok(Json(state.engine.detail(id).await?))
}

/// GET /api/v1/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Status> {
    Ok(Json(state.engine.status().await?))
}

#[derive(Debug, Serialize)]
pub struct RebuildResult {
    pub tokens: u64,
}

/// POST /api/v1/admin/wc - 重建词频
pub async fn rebuild_word_counts(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse<RebuildResult>> {
    let tokens = state.engine.rebuild_word_counts().await?;
    Ok(Json(ApiResponse::success(RebuildResult { tokens })))
}

#[derive(Debug, Serialize)]
pub struct ResetResult {
    pub documents: u64,
}

/// POST /api/v1/admin/reset - 重置访问统计
pub async fn reset_visits(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse<ResetResult>> {
    let documents = state.engine.reset_visit_stats().await?;
    Ok(Json(ApiResponse::success(ResetResult { documents })))
}

#[derive(Debug, Deserialize)]
pub struct WordsQuery {
    #[serde(default = "default_words_limit")]
    pub limit: usize,
}

fn default_words_limit() -> usize {
    50
}

/// GET /api/v1/admin/words?limit=50 - 高频词
pub async fn top_words(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WordsQuery>,
) -> ApiResult<ApiResponse<Vec<WordCount>>> {
    let limit = q.limit.min(state.config.search.max_stats_return.max(1));
    Ok(Json(ApiResponse::success(state.engine.top_words(limit).await?)))
}
