//! Semantic-convention attributes for HTTP requests and responses.

use http::{Request, StatusCode};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, SERVER_ADDRESS, URL_PATH, URL_SCHEME,
    USER_AGENT_ORIGINAL,
};

/// Whether a client request went out on a pooled connection.
pub const HTTP_CONNECTION_REUSED: &str = "http.connection.reused";

fn scheme<B>(req: &Request<B>) -> String {
    req.uri().scheme_str().unwrap_or("http").to_string()
}

/// Attributes describing an outbound request.
pub fn client_request<B>(req: &Request<B>) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(HTTP_REQUEST_METHOD, req.method().as_str().to_string()),
        KeyValue::new(URL_PATH, req.uri().path().to_string()),
        KeyValue::new(URL_SCHEME, scheme(req)),
    ];
    if let Some(host) = req.uri().host() {
        attributes.push(KeyValue::new(SERVER_ADDRESS, host.to_string()));
    }
    attributes
}

/// Attributes describing an inbound request.
pub fn server_request<B>(req: &Request<B>) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(HTTP_REQUEST_METHOD, req.method().as_str().to_string()),
        KeyValue::new(URL_PATH, req.uri().path().to_string()),
        KeyValue::new(URL_SCHEME, scheme(req)),
    ];
    if let Some(agent) = req
        .headers()
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        attributes.push(KeyValue::new(USER_AGENT_ORIGINAL, agent.to_string()));
    }
    attributes
}

/// Response status code attribute.
pub fn response_status(status: StatusCode) -> KeyValue {
    KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16()))
}

/// Connection reuse attribute.
pub fn connection_reused(reused: bool) -> KeyValue {
    KeyValue::new(HTTP_CONNECTION_REUSED, reused)
}
