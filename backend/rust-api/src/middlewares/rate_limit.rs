use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::services::AppState;

const SUBMIT_RATE_LIMIT_PER_USER: u32 = 30; // submissions per minute
const SUBMIT_RATE_LIMIT_PER_IP: u32 = 60;
const RATE_WINDOW_SECONDS: u64 = 60;

/// Redis fixed-window rate limit on the submission route, keyed by the
/// authenticated user (and IP as a fallback for shared NATs).
pub async fn submit_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let client_ip = extract_client_ip(&request);

    let user_id = request
        .extensions()
        .get::<super::auth::JwtClaims>()
        .map(|claims| claims.sub.clone());

    if let Some(uid) = &user_id {
        let user_limit = std::env::var("SUBMIT_RATE_LIMIT_PER_USER")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(SUBMIT_RATE_LIMIT_PER_USER);

        let allowed = check_rate_limit(
            &state.redis,
            &format!("ratelimit:submit:user:{}", uid),
            user_limit,
        )
        .await
        .map_err(|e| {
            tracing::error!("Rate limit check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        if !allowed {
            tracing::warn!("Submission rate limit exceeded for user: {}", uid);
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    let allowed = check_rate_limit(
        &state.redis,
        &format!("ratelimit:submit:ip:{}", client_ip),
        SUBMIT_RATE_LIMIT_PER_IP,
    )
    .await
    .map_err(|e| {
        tracing::error!("Rate limit check failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if !allowed {
        tracing::warn!("Submission rate limit exceeded for ip: {}", client_ip);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}

fn extract_client_ip(request: &Request) -> String {
    if let Some(v) = request.headers().get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // comma separated list; the first hop is the client
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = request.headers().get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let count: u32 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;

    if count == 1 {
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(RATE_WINDOW_SECONDS)
            .query_async::<()>(&mut conn)
            .await?;
    }

    Ok(count <= limit)
}
