//! `{message}` bodies for errors produced by layers.
//!
//! Handler errors already render through `AppError`. The timeout and rate
//! limit layers answer on their own with plain text or empty bodies; this
//! mapper rewrites those into the same JSON shape and keeps their headers
//! (`retry-after` and friends).

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::routes::MessageResponse;

/// Message for a status produced outside the handlers, if we rewrite it.
const fn layer_message(status: StatusCode) -> Option<&'static str> {
    match status {
        StatusCode::REQUEST_TIMEOUT => Some("Request timed out"),
        StatusCode::TOO_MANY_REQUESTS => Some("Too many requests, please try again later"),
        _ => None,
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes().starts_with(b"application/json"))
}

pub async fn json_error_body(response: Response) -> Response {
    let Some(message) = layer_message(response.status()) else {
        return response;
    };
    if is_json(&response) {
        return response;
    }

    let (parts, _) = response.into_parts();
    let mut rewritten = (parts.status, Json(MessageResponse { message })).into_response();
    for (name, value) in &parts.headers {
        if *name != header::CONTENT_TYPE && *name != header::CONTENT_LENGTH {
            rewritten.headers_mut().insert(name.clone(), value.clone());
        }
    }
    rewritten.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    rewritten
}
