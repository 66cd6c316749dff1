//! HTTP long-polling handlers for the WASM signaling server
//!
//! A connection is opened by the first poll and lives as long as it keeps
//! polling or sending events. Inbound events are POSTed one per request and
//! outbound events are collected by the next poll.

use crate::error::{ClientRequestError, SignalingError};
use crate::state::ServerState;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use pairbox_protocol::{ConnectionId, JsonClientEvent};
use std::str::FromStr;
use tracing::{debug, warn};
use wstd::http::{Body, Method, Request, Response};

/// Header carrying the caller's connection id on POST requests
pub const CONNECTION_ID_HEADER: &str = "x-connection-id";

/// Static availability message served on `/` and `/health`
pub const RUNNING_MESSAGE: &str = "pairbox signaling server is running!";

/// Get query parameter from URI
fn get_query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key { Some(v) } else { None }
    })
}

/// Read the caller's connection id from the request headers
fn connection_id(headers: &HeaderMap) -> Result<ConnectionId, ClientRequestError> {
    headers
        .get(CONNECTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| ConnectionId::from_str(s.trim()).ok())
        .ok_or(ClientRequestError::MissingConnectionId)
}

/// Bodies without a content type are accepted as JSON
fn check_content_type(headers: &HeaderMap) -> Result<(), ClientRequestError> {
    match headers.get(header::CONTENT_TYPE).map(|v| v.to_str()) {
        None => Ok(()),
        Some(Ok(value)) if value.trim_start().starts_with("application/json") => Ok(()),
        Some(_) => Err(ClientRequestError::UnsupportedType),
    }
}

fn respond(status: StatusCode, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn respond_text(status: StatusCode, text: impl Into<String>) -> Response<Body> {
    let mut response = respond(status, Body::from(text.into()));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn respond_json(value: serde_json::Value) -> Response<Body> {
    let mut response = respond(StatusCode::OK, Body::from(value.to_string()));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Open a connection or collect pending events of an existing one
fn handle_poll(query: Option<&str>, state: &ServerState) -> Response<Body> {
    let requested = get_query_param(query, "id").and_then(|s| ConnectionId::from_str(s).ok());
    let (id, events) = state.poll(requested);

    respond_json(serde_json::json!({
        "id": id,
        "events": events,
    }))
}

/// Handle an inbound event POST
async fn handle_event(request: Request<Body>, state: &ServerState) -> Response<Body> {
    let headers = request.headers().clone();
    let mut body = request.into_body();
    match body.str_contents().await {
        Ok(text) => apply_event(&headers, text, state),
        Err(e) => {
            let err = ClientRequestError::Body(format!("{e:?}"));
            respond_text(StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

/// Parse one client event from the request headers and body
fn parse_event(
    headers: &HeaderMap,
    body: &str,
) -> Result<(ConnectionId, JsonClientEvent), ClientRequestError> {
    let id = connection_id(headers)?;
    check_content_type(headers)?;
    Ok((id, JsonClientEvent::from_str(body)?))
}

/// Apply a posted event and map the outcome to a status code
fn apply_event(headers: &HeaderMap, body: &str, state: &ServerState) -> Response<Body> {
    // Malformed events are rejected before the session tables are touched
    let (id, event) = match parse_event(headers, body) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(error = %err, "Rejected malformed event");
            return respond_text(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    match state.dispatch(id, event) {
        Ok(()) => respond_text(StatusCode::OK, "OK"),
        Err(err @ SignalingError::UnknownConnection(_)) => {
            respond_text(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(err @ SignalingError::InvariantViolation { .. }) => {
            respond_text(StatusCode::CONFLICT, err.to_string())
        }
        Err(err) => {
            warn!(%id, error = %err, "Event failed");
            respond_text(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Handle an explicit transport close
fn handle_disconnect(headers: &HeaderMap, state: &ServerState) -> Response<Body> {
    match connection_id(headers) {
        Ok(id) => {
            state.disconnect(id);
            respond_text(StatusCode::OK, "OK")
        }
        Err(err) => respond_text(StatusCode::BAD_REQUEST, err.to_string()),
    }
}

/// Handle CORS preflight
fn handle_cors_preflight() -> Response<Body> {
    let mut response = respond(StatusCode::NO_CONTENT, Body::empty());
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, x-connection-id"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

fn info_page(state: &ServerState) -> String {
    let counts = state.counts();
    format!(
        "{RUNNING_MESSAGE}\n\
         \n\
         Connections: {}, waiting: {}, pairs: {}\n\
         \n\
         Endpoints:\n\
         - GET /health - Health check\n\
         - GET /poll[?id={{id}}] - Connect, or collect pending events\n\
         - POST /event - Send one event (x-connection-id header required)\n\
         - POST /disconnect - Close the connection (x-connection-id header required)\n\
         \n\
         Client events: find-match, offer, answer, ice-candidate, chat-message, leave-chat, keep-alive\n\
         Server events: id-assigned, matched, user-disconnected, offer, answer, ice-candidate, chat-message\n",
        counts.connections, counts.waiting, counts.pairs,
    )
}

/// Handle an HTTP request - main router
pub async fn handle_request(
    request: Request<Body>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path();
    debug!(%method, path, "Request");

    // CORS preflight
    if method == Method::OPTIONS {
        return Ok(handle_cors_preflight());
    }

    if method == Method::GET {
        return Ok(match path {
            "/health" => respond_text(StatusCode::OK, RUNNING_MESSAGE),
            "/poll" => handle_poll(uri.query(), state),
            "/" => respond_text(StatusCode::OK, info_page(state)),
            _ => respond_text(StatusCode::NOT_FOUND, "Not Found"),
        });
    }

    if method == Method::POST {
        return Ok(match path {
            "/event" => handle_event(request, state).await,
            "/disconnect" => handle_disconnect(request.headers(), state),
            _ => respond_text(StatusCode::NOT_FOUND, "Not Found"),
        });
    }

    // Unknown endpoint
    Ok(respond_text(StatusCode::NOT_FOUND, "Not Found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::registry::ConnectionState;

    #[test]
    fn query_param_lookup() {
        assert_eq!(get_query_param(Some("id=abc&x=1"), "id"), Some("abc"));
        assert_eq!(get_query_param(Some("x=1&id=abc"), "id"), Some("abc"));
        assert_eq!(get_query_param(Some("x=1"), "id"), None);
        assert_eq!(get_query_param(Some("id"), "id"), None);
        assert_eq!(get_query_param(None, "id"), None);
    }

    #[test]
    fn connection_id_header() {
        let id: ConnectionId = uuid::Uuid::new_v4().into();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            connection_id(&headers),
            Err(ClientRequestError::MissingConnectionId)
        ));

        headers.insert(CONNECTION_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(connection_id(&headers).is_err());

        headers.insert(
            CONNECTION_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(connection_id(&headers).unwrap(), id);
    }

    #[test]
    fn content_type_must_be_json_when_present() {
        let mut headers = HeaderMap::new();
        assert!(check_content_type(&headers).is_ok());

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(check_content_type(&headers).is_ok());

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(matches!(
            check_content_type(&headers),
            Err(ClientRequestError::UnsupportedType)
        ));
    }

    fn event_headers(id: ConnectionId) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONNECTION_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn accepted_event_is_ok() {
        let state = ServerState::new();
        let (id, _) = state.connect();

        let response = apply_event(&event_headers(id), r#"{"event":"find-match"}"#, &state);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.counts().waiting, 1);
    }

    #[test]
    fn event_without_connection_id_is_bad_request() {
        let state = ServerState::new();
        state.connect();

        let response = apply_event(&HeaderMap::new(), r#"{"event":"find-match"}"#, &state);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.counts().waiting, 0);
    }

    #[test]
    fn malformed_event_is_bad_request_and_changes_nothing() {
        let state = ServerState::new();
        let (id, _) = state.connect();
        let headers = event_headers(id);

        for body in ["", "{not json", r#"{"event":"join-room"}"#] {
            let response = apply_event(&headers, body, &state);
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body:?}");
        }
        assert_eq!(state.inspect(|s| s.state_of(&id)), Some(ConnectionState::Idle));

        let mut plain = headers.clone();
        plain.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let response = apply_event(&plain, r#"{"event":"find-match"}"#, &state);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.counts().waiting, 0);
    }

    #[test]
    fn event_from_unknown_connection_is_not_found() {
        let state = ServerState::new();
        let ghost: ConnectionId = uuid::Uuid::new_v4().into();

        let response = apply_event(&event_headers(ghost), r#"{"event":"find-match"}"#, &state);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.counts().connections, 0);
    }

    #[test]
    fn inconsistent_connection_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = ServerState::with_config(&ServerConfig {
            state_file: Some(path.clone()),
            ..ServerConfig::default()
        });
        let (id, _) = state.connect();

        // tag the connection as waiting without queueing it
        let mut snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        snapshot["registry"]["connections"][id.to_string()]["state"] =
            serde_json::json!("Waiting");
        std::fs::write(&path, snapshot.to_string()).unwrap();

        let response = apply_event(&event_headers(id), r#"{"event":"find-match"}"#, &state);
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(state.counts().waiting, 0);
        assert_eq!(state.inspect(|s| s.state_of(&id)), Some(ConnectionState::Waiting));
    }

    #[test]
    fn info_page_reports_counts() {
        let state = ServerState::new();
        state.connect();
        let page = info_page(&state);
        assert!(page.starts_with(RUNNING_MESSAGE));
        assert!(page.contains("Connections: 1, waiting: 0, pairs: 0"));
    }
}
