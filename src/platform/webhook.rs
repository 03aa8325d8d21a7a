//! Inbound HTTP routes.
//!
//! `/message` receives outgoing-webhook posts and `/slash/{command}` receives
//! slash commands. Both accept JSON or form-urlencoded bodies and reply with a
//! JSON [`BotResponse`], or an empty 200 when nothing claims the request.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{FromRequest, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use super::BotRequest;
use crate::bot::Bot;

pub fn router(bot: Arc<Bot>) -> Router {
    Router::new()
        .route("/message", post(message))
        .route("/slash/{command}", post(slash))
        .with_state(bot)
}

/// Serve the bot's routes on an already bound listener.
pub async fn serve_on(listener: TcpListener, bot: Arc<Bot>) -> Result<()> {
    axum::serve(listener, router(bot))
        .await
        .context("Server error")
}

async fn message(State(bot): State<Arc<Bot>>, request: Request) -> Response {
    let Some(req) = parse_body(request).await else {
        return StatusCode::OK.into_response();
    };
    dispatch(&bot, req, false).await
}

async fn slash(
    State(bot): State<Arc<Bot>>,
    Path(command): Path<String>,
    request: Request,
) -> Response {
    let Some(mut req) = parse_body(request).await else {
        return StatusCode::OK.into_response();
    };
    // Slash commands arrive without their command word in the text.
    req.text = format!("{} {}", command, req.text);
    dispatch(&bot, req, true).await
}

async fn parse_body(request: Request) -> Option<BotRequest> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    debug!("Request with content-type: {}", content_type);

    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime {
        "application/json" => match Json::<BotRequest>::from_request(request, &()).await {
            Ok(Json(req)) => Some(req),
            Err(e) => {
                warn!("Malformed JSON request: {}", e);
                None
            }
        },
        "application/x-www-form-urlencoded" => {
            match Form::<BotRequest>::from_request(request, &()).await {
                Ok(Form(req)) => Some(req),
                Err(e) => {
                    warn!("Malformed form request: {}", e);
                    None
                }
            }
        }
        other => {
            warn!("Unknown request type {:?}. Skipping", other);
            None
        }
    }
}

async fn dispatch(bot: &Bot, req: BotRequest, is_slash: bool) -> Response {
    if !bot.config().is_token_valid(is_slash, &req.token) {
        warn!("Ignoring invalid token from {}", req.user_name);
        return StatusCode::OK.into_response();
    }
    debug!("Parsed request is: {:?}", req);

    match bot.handle(&req).await {
        Some(mut resp) => {
            if is_slash && resp.response_type.is_empty() {
                resp.response_type = "in_channel".to_string();
            }
            Json(resp).into_response()
        }
        None => StatusCode::OK.into_response(),
    }
}
