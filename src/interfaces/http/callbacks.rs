use crate::application::Services;
use crate::application::reconciler::CallbackRequest;
use crate::domain::payment::PaymentProvider;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use tracing::info;

/// POST - Gateway callback.
///
/// Gateways treat anything but HTTP 200 with a protocol body as a delivery
/// failure and retry, so every outcome, including undecodable bodies, is
/// answered with 200. Only an unknown provider path yields 404.
pub(super) async fn handle_callback(
    State(services): State<Services>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(protocol) = provider
        .parse::<PaymentProvider>()
        .ok()
        .and_then(|provider| services.reconciler.protocol(provider))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    info!(provider = %protocol.provider(), bytes = body.len(), "Gateway callback received");
    let response = match decode_body(&headers, &body) {
        Ok(body) => {
            let authorization = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            protocol
                .handle(CallbackRequest {
                    authorization,
                    body,
                })
                .await
        }
        Err(reason) => protocol.malformed(&reason),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Decodes a JSON body, or a form-encoded one into an object of strings.
fn decode_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, String> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let fields: Map<String, Value> = url::form_urlencoded::parse(body)
            .into_owned()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        Ok(Value::Object(fields))
    } else {
        serde_json::from_slice(body).map_err(|e| e.to_string())
    }
}
