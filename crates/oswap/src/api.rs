use log::warn;
use rusty_swap_core::protocol::{ErrorResponse, ResponseEnvelope};
use rusty_swap_stem::Dispatcher;
use serde_json::{json, Value};
use std::sync::Arc;
use tide::{Request, Response, StatusCode};

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
}

/// `POST /run`: one request envelope in, one response envelope out. Every
/// application-level outcome is a 200; the envelope's `status` tells them apart.
pub async fn run(mut req: Request<ApiState>) -> tide::Result {
    let envelope = match req.body_string().await {
        Ok(body) if body.trim().is_empty() => json!({}),
        Ok(body) => match serde_json::from_str::<Value>(&body) {
            Ok(value) => value,
            Err(e) => {
                return envelope_response(&rejected(format!(
                    "request body is not valid JSON: {}",
                    e
                )))
            }
        },
        Err(e) => return envelope_response(&rejected(format!("could not read request body: {}", e))),
    };

    let response = req.state().dispatcher.dispatch(&envelope).await;
    envelope_response(&response)
}

pub async fn health(req: Request<ApiState>) -> tide::Result {
    let response = req
        .state()
        .dispatcher
        .dispatch(&json!({ "input": { "op": "health" } }))
        .await;
    envelope_response(&response)
}

fn rejected(msg: String) -> ResponseEnvelope {
    warn!("Rejected request: {}", msg);
    ResponseEnvelope::Error(ErrorResponse::new("validation", msg))
}

fn envelope_response(envelope: &ResponseEnvelope) -> tide::Result {
    Ok(Response::builder(StatusCode::Ok)
        .content_type(tide::http::mime::JSON)
        .body(serde_json::to_string(envelope)?)
        .build())
}
