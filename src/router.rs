//! Method based request routing.
//!
//! Every path behaves the same: the response only depends on the HTTP method.
//! GET requests pass through the [`AdmissionGate`], POST requests must carry
//! `{"hello":"world"}`, and PUT, PATCH and DELETE accept any JSON body.

use std::{convert::Infallible, fmt, io, sync::Arc};

use headers::{ContentType, HeaderMapExt};
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    body::{Body, HttpBody},
    config::Config,
    gate::{Admission, AdmissionGate},
    App,
};

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE";

/// The method a request is dispatched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Other(Method),
}

impl From<&Method> for Route {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => Route::Get,
            Method::POST => Route::Post,
            Method::PUT => Route::Put,
            Method::PATCH => Route::Patch,
            Method::DELETE => Route::Delete,
            ref other => Route::Other(other.clone()),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Get => f.write_str("GET"),
            Route::Post => f.write_str("POST"),
            Route::Put => f.write_str("PUT"),
            Route::Patch => f.write_str("PATCH"),
            Route::Delete => f.write_str("DELETE"),
            Route::Other(method) => f.write_str(method.as_str()),
        }
    }
}

/// Why a request was not answered with a pong.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("too many GET requests")]
    AdmissionRejected,
    #[error("request body failed validation")]
    ValidationFailed,
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("method not allowed: {0}")]
    UnknownMethod(Method),
    #[error("failed to read request body")]
    Io(#[from] io::Error),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::AdmissionRejected => StatusCode::TOO_MANY_REQUESTS,
            RequestError::ValidationFailed
            | RequestError::MalformedBody(_)
            | RequestError::Io(_) => StatusCode::BAD_REQUEST,
            RequestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::UnknownMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Whether the request body may be left unread on the wire. The
    /// connection cannot carry another request after such a failure.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            RequestError::PayloadTooLarge { .. } | RequestError::Io(_)
        )
    }

    pub fn into_response(self) -> Response<Body> {
        let status = self.status();
        let closes_connection = self.closes_connection();

        let mut res = match self {
            RequestError::AdmissionRejected => {
                let mut res = Response::new(Body::from("Too many requests"));
                *res.status_mut() = status;
                res.headers_mut().typed_insert(ContentType::text());
                res
            }
            RequestError::ValidationFailed => {
                json_response(status, &ErrorMessage::new("Invalid Request"))
            }
            RequestError::MalformedBody(_) | RequestError::Io(_) => {
                json_response(status, &ErrorMessage::new("Malformed Request Body"))
            }
            RequestError::PayloadTooLarge { .. } => {
                json_response(status, &ErrorMessage::new("Payload Too Large"))
            }
            RequestError::UnknownMethod(_) => {
                let mut res = json_response(status, &ErrorMessage::new("Method Not Allowed"));
                res.headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
                res
            }
        };

        if closes_connection {
            res.headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        res
    }
}

#[derive(Serialize)]
struct Pong {
    ping: &'static str,
    message: String,
}

impl Pong {
    fn new(route: &Route) -> Self {
        Self {
            ping: "pong",
            message: format!("Successful {route} request"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorMessage {
    error_message: &'static str,
}

impl ErrorMessage {
    fn new(error_message: &'static str) -> Self {
        Self { error_message }
    }
}

fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Body> {
    match Body::json(payload) {
        Ok(body) => {
            let mut res = Response::new(body);
            *res.status_mut() = status;
            res.headers_mut().typed_insert(ContentType::json());
            res
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to encode response body");
            let mut res = Response::new(Body::empty());
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            res
        }
    }
}

/// The ping/pong application.
///
/// Cloning is cheap and every clone shares the same [`AdmissionGate`], so the
/// GET ceiling holds across all connections.
#[derive(Debug, Clone)]
pub struct PingPong {
    gate: Arc<AdmissionGate>,
    max_body_bytes: u64,
}

impl PingPong {
    pub fn new(gate: Arc<AdmissionGate>) -> Self {
        Self {
            gate,
            max_body_bytes: Config::default().max_body_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(config.admission_gate())).max_body_bytes(config.max_body_bytes)
    }

    pub fn max_body_bytes(self, max_body_bytes: u64) -> Self {
        Self {
            max_body_bytes,
            ..self
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Dispatches `req` on its method.
    pub fn route(&self, req: Request<Body>) -> Result<Response<Body>, RequestError> {
        let route = Route::from(req.method());

        match route {
            Route::Get => self.get(&route),
            Route::Post => self.post(&route, req),
            Route::Put | Route::Patch | Route::Delete => self.echo(&route, req),
            Route::Other(method) => Err(RequestError::UnknownMethod(method)),
        }
    }

    fn get(&self, route: &Route) -> Result<Response<Body>, RequestError> {
        match self.gate.admit() {
            Admission::Allowed => {
                tracing::info!(observed = self.gate.observed(), "Successful GET request");
                Ok(json_response(StatusCode::OK, &Pong::new(route)))
            }
            Admission::Rejected => {
                tracing::warn!(threshold = self.gate.threshold(), "Too many GET requests");
                Err(RequestError::AdmissionRejected)
            }
        }
    }

    fn post(&self, route: &Route, req: Request<Body>) -> Result<Response<Body>, RequestError> {
        let (parts, body) = req.into_parts();
        let body = self.read_json(body)?;

        tracing::info!(%body, "POST request body");
        tracing::debug!(headers = ?parts.headers, "POST request headers");

        if body.get("hello").and_then(Value::as_str) == Some("world") {
            Ok(json_response(StatusCode::OK, &Pong::new(route)))
        } else {
            Err(RequestError::ValidationFailed)
        }
    }

    fn echo(&self, route: &Route, req: Request<Body>) -> Result<Response<Body>, RequestError> {
        let body = self.read_json(req.into_body())?;
        tracing::info!(method = %route, %body, "request body");
        Ok(json_response(StatusCode::OK, &Pong::new(route)))
    }

    fn read_json(&self, body: Body) -> Result<Value, RequestError> {
        let limit = self.max_body_bytes;

        // Announced as too large: the connection closes, so the body is not
        // read at all.
        if matches!(body.len(), Some(len) if len > limit) {
            body.abandon();
            return Err(RequestError::PayloadTooLarge { limit });
        }

        let bytes = body
            .into_bytes_within(limit)?
            .ok_or(RequestError::PayloadTooLarge { limit })?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl App for PingPong {
    type Body = Body;
    type Error = Infallible;

    fn handle(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(self.route(req).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "request refused");
            err.into_response()
        }))
    }

    fn should_continue(&self, req: &Request<Body>) -> StatusCode {
        match req.headers().typed_get::<headers::ContentLength>() {
            Some(len) if len.0 > self.max_body_bytes => StatusCode::EXPECTATION_FAILED,
            _ => StatusCode::CONTINUE,
        }
    }
}
