//! A reference REST transport binding (ambient addition, spec.md §10)
//!
//! spec.md §1 scopes the transport adapter out as an external
//! collaborator, defining only its contract. Because `volga` is itself a
//! runnable `hyper`/`tokio_util` HTTP server, this
//! module ships one concrete realization built the same way: a
//! `TcpListener` accept loop handing each connection to
//! `hyper::server::conn::http1`, the way `volga::server::http1` drives
//! its own per-connection task. CORS, rate limiting and static files are
//! NOT implemented here — spec.md lists them as out-of-scope external
//! collaborators a host is expected to layer in front, the way `volga`
//! users layer `volga::http::cors` on top of the framework core.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::auth::AuthContext;
use crate::dispatch::{Dispatcher, ExternalRequest, ExternalResponse};
#[cfg(feature = "multipart")]
use crate::registry::UploadMode;
#[cfg(feature = "multipart")]
use crate::upload::parse::{enforce_mode, parse_multipart};
use crate::upload::validate::validate as validate_upload;

/// Configuration for the reference transport (spec.md §6, `rest?`).
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub host: String,
    pub port: u16,
    pub enable_status: bool,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self { base_url: "/api".to_string(), host: "127.0.0.1".to_string(), port: 8080, enable_status: true }
    }
}

impl RestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_enable_status(mut self, enabled: bool) -> Self {
        self.enable_status = enabled;
        self
    }

    fn services_path(&self) -> String {
        format!("{}/services", self.base_url.trim_end_matches('/'))
    }
}

fn json_response(status: StatusCode, body: &ExternalResponse) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &ExternalResponse { status: false, message: message.to_string(), data: Value::Object(Default::default()) })
}

fn status_of(resp: &ExternalResponse, content_type_mismatch: bool) -> StatusCode {
    if content_type_mismatch {
        StatusCode::UNSUPPORTED_MEDIA_TYPE
    } else if resp.status {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

fn auth_context_from_request(req: &Request<Incoming>) -> AuthContext {
    let mut ctx = AuthContext::new();
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), v);
        }
    }
    if let Some(cookie_header) = req.headers().get(hyper::header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookie_header.split(';') {
            if let Some((k, v)) = pair.trim().split_once('=') {
                ctx = ctx.with_cookie(k.trim(), v.trim());
            }
        }
    }
    ctx
}

async fn handle_services(
    dispatcher: Arc<Dispatcher>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let auth_ctx = auth_context_from_request(&req);
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let is_multipart = content_type.to_ascii_lowercase().contains("multipart/form-data");

    #[cfg(feature = "multipart")]
    let external_request = if is_multipart {
        match parse_multipart_request(&dispatcher, &content_type, req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        }
    } else {
        match parse_json_request(req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        }
    };

    #[cfg(not(feature = "multipart"))]
    let external_request = {
        if is_multipart {
            return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "multipart uploads are not enabled on this server");
        }
        match parse_json_request(req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        }
    };

    let context = dispatcher.engine().new_context();
    let response = dispatcher.dispatch(external_request, context, Some(auth_ctx)).await;
    json_response(status_of(&response, false), &response)
}

async fn parse_json_request(req: Request<Incoming>) -> Result<ExternalRequest, Response<Full<Bytes>>> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid or missing JSON body"))?
        .to_bytes();

    serde_json::from_slice::<ExternalRequest>(&body)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid or missing JSON body"))
}

#[cfg(feature = "multipart")]
async fn parse_multipart_request(
    dispatcher: &Dispatcher,
    content_type: &str,
    req: Request<Incoming>,
) -> Result<ExternalRequest, Response<Full<Bytes>>> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid request format"))?;

    let body = req.into_body();
    let stream = body.into_data_stream();

    // Parsed permissively first: the action's declared `uploadMode`
    // (spec.md §3, `isSpecial.uploadMode`) isn't known until the routing
    // fields inside this same body have been read, so `Flat`'s
    // key-disjointness rule is re-checked below once the action resolves.
    let parsed = parse_multipart(stream, boundary, UploadMode::Structured)
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.into_message()))?;

    let intent = match parsed.intent.as_str() {
        "explore" => crate::dispatch::Intent::Explore,
        "execute" => crate::dispatch::Intent::Execute,
        "schema" => crate::dispatch::Intent::Schema,
        _ => return Err(error_response(StatusCode::BAD_REQUEST, "Invalid request format")),
    };

    let uploads = dispatcher.engine().uploads_config();
    let action = if intent == crate::dispatch::Intent::Execute {
        dispatcher.engine().registry().get_action(&parsed.service, &parsed.action).ok()
    } else {
        None
    };

    // spec.md §4.6 Step 2: enforce the action's declared content-type
    // before validating or handing anything to the engine.
    if let Some(special) = action.as_ref().and_then(|a| a.is_special.as_ref()) {
        if uploads.enforce_content_type && !content_type.to_ascii_lowercase().contains(&special.content_type.to_ascii_lowercase()) {
            return Err(error_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                &format!("Expected content-type '{}'", special.content_type),
            ));
        }
    }

    // spec.md §4.6 Step 3: the action's declared `uploadMode` gates
    // whether a key shared by a file and a string field is rejected.
    if intent == crate::dispatch::Intent::Execute {
        let mode = action.as_ref().and_then(|a| a.is_special.as_ref()).and_then(|s| s.upload_mode).unwrap_or(UploadMode::Structured);
        if let Err(e) = enforce_mode(&parsed.payload, mode) {
            return Err(error_response(StatusCode::BAD_REQUEST, &e.into_message()));
        }
    }

    // Step 4: the fail-fast file validator chain runs before the parsed
    // payload is handed to the engine as the execute payload.
    if intent == crate::dispatch::Intent::Execute {
        if let Err(e) = validate_upload(&parsed.payload, uploads) {
            let body = ExternalResponse { status: false, message: e.message.clone(), data: e.data.clone() };
            return Err(json_response(StatusCode::BAD_REQUEST, &body));
        }
    }

    Ok(ExternalRequest {
        intent,
        service: parsed.service,
        action: parsed.action,
        payload: parsed.payload.to_value(),
    })
}

/// Validates an already-parsed structured upload payload against the
/// engine's configured limits. Exposed so a transport handler can run
/// this before or after content-type enforcement as needed (spec.md
/// §4.6, Step 4).
pub fn validate_uploaded_payload(
    payload: &crate::upload::StructuredPayload,
    config: &crate::upload::UploadsConfig,
) -> Result<(), crate::error::EngineError> {
    validate_upload(payload, config)
}

async fn route(dispatcher: Arc<Dispatcher>, config: Arc<RestConfig>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if config.enable_status && method == hyper::Method::GET && path == "/status" {
        let body = ExternalResponse {
            status: true,
            message: format!("{} is running", dispatcher.engine().server_name()),
            data: Value::Object(Default::default()),
        };
        return Ok(json_response(StatusCode::OK, &body));
    }

    if method == hyper::Method::POST && path == config.services_path() {
        return Ok(handle_services(dispatcher, req).await);
    }

    Ok(error_response(
        StatusCode::NOT_FOUND,
        &format!("Route not found. Use POST {} for all operations.", config.services_path()),
    ))
}

/// Runs the reference REST transport until the process is terminated.
/// Binds `config.host:config.port` and serves every connection on its
/// own task, the way `volga::server` hands each accepted socket to its
/// own `Server::serve` task.
pub async fn serve(dispatcher: Arc<Dispatcher>, config: RestConfig) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
    let listener = TcpListener::bind(addr).await?;
    let config = Arc::new(config);

    dispatcher.engine().boot().await;

    loop {
        let (stream, _peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let dispatcher = dispatcher.clone();
        let config = config.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| route(dispatcher.clone(), config.clone(), req));
            if let Err(_err) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, service).await {
                #[cfg(feature = "tracing")]
                tracing::error!("error serving connection: {_err:#}");
            }
        });
    }
}
