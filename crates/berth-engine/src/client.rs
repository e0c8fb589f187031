//! Blocking HTTP client for the Docker Engine API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use berth_common::config::ConnectOptions;
use berth_common::container::ContainerCreateConfig;
use berth_common::error::{BerthError, EngineError, Result};
use berth_common::types::{ContainerId, ExecId, ImageId};
use berth_core::client::{ByteStream, CallContext, EngineResult, RuntimeClient};
use berth_core::models::{
    ContainerInspect, ContainerSummary, CreatedContainer, ExecInspect, ImageDeleteItem,
    ImageInspect, PruneReport,
};
use berth_core::options::{
    BuildOptions, ExecCreateOptions, ImageRemoveOptions, ListOptions, PruneFilters,
    RemoveOptions, StopOptions,
};
use reqwest::blocking::{Client, ClientBuilder, RequestBuilder, Response};
use reqwest::{Certificate, Identity, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::wire::{
    CreateBody, CreateResponse, DeleteItemResponse, ErrorBody, ExecCreateBody,
    ExecInspectResponse, ExecStartBody, IdResponse, ImageInspectResponse, InspectResponse,
    PruneResponse, SummaryResponse, VersionResponse,
};
use crate::host::Endpoint;
use crate::version;

const fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// [`RuntimeClient`] speaking the Docker Engine HTTP API over a Unix
/// socket or TCP, optionally with TLS.
///
/// Constructed once with [`HttpRuntimeClient::connect`] and shared by every
/// component. Each call opens its own request on the pooled connection.
#[derive(Debug)]
pub struct HttpRuntimeClient {
    http: Client,
    endpoint: Endpoint,
    version: String,
    closed: AtomicBool,
}

impl HttpRuntimeClient {
    /// Dials the engine and settles the API version.
    ///
    /// Without a pinned version the engine's `/version` endpoint is queried
    /// and the lower of its API version and the client maximum is used. A
    /// pinned version skips the handshake.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Connection` if the host is malformed or
    /// unsupported, the engine cannot be reached, or version negotiation
    /// fails.
    pub fn connect(opts: &ConnectOptions) -> Result<Self> {
        let connection_err = |source| BerthError::Connection {
            endpoint: opts.host.clone(),
            source,
        };

        let endpoint =
            Endpoint::parse(&opts.host, opts.cert_path.is_some()).map_err(connection_err)?;
        let mut builder = Client::builder()
            .timeout(None::<Duration>)
            .user_agent(concat!("berth/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = opts.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder = with_socket(builder, &endpoint);
        if endpoint.socket().is_none() {
            builder = with_tls(builder, opts).map_err(connection_err)?;
        }
        let http = builder.build().map_err(|e| {
            connection_err(EngineError::Unreachable {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
        })?;

        let version = match &opts.api_version {
            Some(pinned) => {
                tracing::debug!(version = %pinned, "using pinned engine API version");
                pinned.clone()
            }
            None => Self::negotiate(&http, &endpoint).map_err(connection_err)?,
        };

        tracing::info!(endpoint = %endpoint, version = %version, "connected to engine");
        Ok(Self {
            http,
            endpoint,
            version,
            closed: AtomicBool::new(false),
        })
    }

    fn negotiate(http: &Client, endpoint: &Endpoint) -> EngineResult<String> {
        let resp = http
            .get(format!("{}/version", endpoint.base_url()))
            .send()
            .map_err(|e| unreachable(endpoint, &e))?;
        let info: VersionResponse = decode(check_status(resp)?)?;
        tracing::debug!(engine = %info.version, api = %info.api_version, min = %info.min_api_version, "engine version");
        version::negotiate(&info.api_version)
    }

    /// Base URL of the engine, e.g. `http://127.0.0.1:2375`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    /// The dialed endpoint, e.g. `unix:///var/run/docker.sock`.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Starts a request to a versioned API path, applying the call deadline.
    fn request(&self, ctx: &CallContext, method: Method, path: &str) -> EngineResult<RequestBuilder> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Unreachable {
                endpoint: self.endpoint.to_string(),
                message: "client is closed".into(),
            });
        }
        ctx.check()?;
        let url = format!("{}/v{}{}", self.endpoint.base_url(), self.version, path);
        tracing::trace!(method = %method, url = %url, "engine request");
        let mut builder = self.http.request(method, url);
        if let Some(left) = ctx.remaining() {
            builder = builder.timeout(left);
        }
        Ok(builder)
    }

    fn send(&self, builder: RequestBuilder) -> EngineResult<Response> {
        let resp = builder.send().map_err(|e| self.transport_error(&e))?;
        check_status(resp)
    }

    /// Sends a state change that the engine answers with `304 Not Modified`
    /// when the target is already in that state.
    fn send_unless_unchanged(&self, builder: RequestBuilder) -> EngineResult<()> {
        let resp = builder.send().map_err(|e| self.transport_error(&e))?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!(url = %resp.url(), "engine reported no state change");
            return Ok(());
        }
        let _ = check_status(resp)?;
        Ok(())
    }

    fn transport_error(&self, err: &reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::DeadlineExceeded
        } else if err.is_connect() {
            unreachable(&self.endpoint, err)
        } else {
            EngineError::Transport(std::io::Error::other(err.to_string()))
        }
    }

    fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> EngineResult<T> {
        decode(self.send(builder)?)
    }
}

fn unreachable(endpoint: &Endpoint, err: &reqwest::Error) -> EngineError {
    EngineError::Unreachable {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    }
}

#[cfg(unix)]
fn with_socket(builder: ClientBuilder, endpoint: &Endpoint) -> ClientBuilder {
    match endpoint.socket() {
        Some(path) => builder.unix_socket(path.to_path_buf()),
        None => builder,
    }
}

#[cfg(not(unix))]
const fn with_socket(builder: ClientBuilder, _endpoint: &Endpoint) -> ClientBuilder {
    builder
}

/// Loads `ca.pem`, `cert.pem` and `key.pem` from the configured directory.
fn with_tls(builder: ClientBuilder, opts: &ConnectOptions) -> EngineResult<ClientBuilder> {
    let Some(dir) = &opts.cert_path else {
        return Ok(builder);
    };
    let invalid = |file: &str, err: &reqwest::Error| {
        EngineError::Unsupported(format!("{}: {err}", dir.join(file).display()))
    };
    let ca = std::fs::read(dir.join("ca.pem"))?;
    let mut pem = std::fs::read(dir.join("cert.pem"))?;
    pem.extend(std::fs::read(dir.join("key.pem"))?);

    let ca = Certificate::from_pem(&ca).map_err(|e| invalid("ca.pem", &e))?;
    let identity = Identity::from_pem(&pem).map_err(|e| invalid("cert.pem", &e))?;
    tracing::debug!(cert_path = %dir.display(), verify = opts.tls_verify, "engine TLS enabled");
    Ok(builder
        .use_rustls_tls()
        .add_root_certificate(ca)
        .identity(identity)
        .danger_accept_invalid_certs(!opts.tls_verify))
}

/// Turns a non-2xx response into `EngineError::Api` using the engine's
/// `{"message": ...}` body.
fn check_status(resp: Response) -> EngineResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
        .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    Err(EngineError::Api {
        status: status.as_u16(),
        message,
    })
}

fn decode<T: DeserializeOwned>(resp: Response) -> EngineResult<T> {
    let bytes = resp
        .bytes()
        .map_err(|e| EngineError::Transport(std::io::Error::other(e.to_string())))?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl RuntimeClient for HttpRuntimeClient {
    fn api_version(&self) -> &str {
        &self.version
    }

    fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Unreachable {
                endpoint: self.endpoint.to_string(),
                message: "client already closed".into(),
            });
        }
        tracing::info!(endpoint = %self.endpoint, "engine client closed");
        Ok(())
    }

    fn list_containers(
        &self,
        ctx: &CallContext,
        opts: &ListOptions,
    ) -> EngineResult<Vec<ContainerSummary>> {
        let mut query = vec![("all", flag(opts.all).to_string())];
        if !opts.filters.is_empty() {
            query.push(("filters", serde_json::to_string(&opts.filters)?));
        }
        let req = self.request(ctx, Method::GET, "/containers/json")?.query(&query);
        let items: Vec<SummaryResponse> = self.json(req)?;
        Ok(items.into_iter().map(ContainerSummary::from).collect())
    }

    fn create_container(
        &self,
        ctx: &CallContext,
        config: &ContainerCreateConfig,
    ) -> EngineResult<CreatedContainer> {
        let mut query = vec![("name", config.name().to_string())];
        if let Some(platform) = config.platform() {
            query.push(("platform", platform.to_string()));
        }
        let req = self
            .request(ctx, Method::POST, "/containers/create")?
            .query(&query)
            .json(&CreateBody::from(config));
        let resp: CreateResponse = self.json(req)?;
        Ok(resp.into())
    }

    fn start_container(&self, ctx: &CallContext, id: &ContainerId) -> EngineResult<()> {
        let req = self.request(ctx, Method::POST, &format!("/containers/{id}/start"))?;
        let _ = self.send(req)?;
        Ok(())
    }

    fn stop_container(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        opts: &StopOptions,
    ) -> EngineResult<()> {
        let mut query = vec![("signal", opts.signal.clone())];
        if let Some(grace) = opts.grace_period {
            query.push(("t", grace.as_secs().to_string()));
        }
        let req = self
            .request(ctx, Method::POST, &format!("/containers/{id}/stop"))?
            .query(&query);
        self.send_unless_unchanged(req)
    }

    fn remove_container(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        opts: &RemoveOptions,
    ) -> EngineResult<()> {
        let req = self
            .request(ctx, Method::DELETE, &format!("/containers/{id}"))?
            .query(&[
                ("force", flag(opts.force)),
                ("v", flag(opts.remove_volumes)),
                ("link", flag(opts.remove_links)),
            ]);
        let _ = self.send(req)?;
        Ok(())
    }

    fn inspect_container(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
    ) -> EngineResult<ContainerInspect> {
        let req = self.request(ctx, Method::GET, &format!("/containers/{id}/json"))?;
        let resp: InspectResponse = self.json(req)?;
        Ok(resp.into())
    }

    fn create_exec(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        opts: &ExecCreateOptions,
    ) -> EngineResult<ExecId> {
        let req = self
            .request(ctx, Method::POST, &format!("/containers/{id}/exec"))?
            .json(&ExecCreateBody::from(opts));
        let resp: IdResponse = self.json(req)?;
        Ok(ExecId::new(resp.id))
    }

    fn start_exec(&self, ctx: &CallContext, exec_id: &ExecId) -> EngineResult<ByteStream> {
        let req = self
            .request(ctx, Method::POST, &format!("/exec/{exec_id}/start"))?
            .json(&ExecStartBody::default());
        Ok(Box::new(self.send(req)?))
    }

    fn inspect_exec(&self, ctx: &CallContext, exec_id: &ExecId) -> EngineResult<ExecInspect> {
        let req = self.request(ctx, Method::GET, &format!("/exec/{exec_id}/json"))?;
        let resp: ExecInspectResponse = self.json(req)?;
        Ok(resp.into())
    }

    fn build_image(
        &self,
        ctx: &CallContext,
        context: Vec<u8>,
        opts: &BuildOptions,
    ) -> EngineResult<ByteStream> {
        let mut query: Vec<(&str, String)> =
            opts.tags.iter().map(|t| ("t", t.clone())).collect();
        query.extend([
            ("dockerfile", opts.dockerfile.clone()),
            ("pull", flag(opts.pull).to_string()),
            ("forcerm", flag(opts.force_rm).to_string()),
            ("nocache", flag(opts.no_cache).to_string()),
            ("q", flag(opts.quiet).to_string()),
        ]);
        if !opts.build_args.is_empty() {
            query.push(("buildargs", serde_json::to_string(&opts.build_args)?));
        }
        let req = self
            .request(ctx, Method::POST, "/build")?
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "application/x-tar")
            .body(context);
        Ok(Box::new(self.send(req)?))
    }

    fn inspect_image(&self, ctx: &CallContext, name: &str) -> EngineResult<ImageInspect> {
        let req = self.request(ctx, Method::GET, &format!("/images/{name}/json"))?;
        let resp: ImageInspectResponse = self.json(req)?;
        Ok(resp.into())
    }

    fn remove_image(
        &self,
        ctx: &CallContext,
        id: &ImageId,
        opts: &ImageRemoveOptions,
    ) -> EngineResult<Vec<ImageDeleteItem>> {
        let req = self
            .request(ctx, Method::DELETE, &format!("/images/{id}"))?
            .query(&[
                ("force", flag(opts.force)),
                ("noprune", flag(!opts.prune_children)),
            ]);
        let items: Vec<DeleteItemResponse> = self.json(req)?;
        Ok(items
            .into_iter()
            .filter_map(DeleteItemResponse::into_item)
            .collect())
    }

    fn prune_images(&self, ctx: &CallContext, filters: &PruneFilters) -> EngineResult<PruneReport> {
        let req = self
            .request(ctx, Method::POST, "/images/prune")?
            .query(&[("filters", serde_json::to_string(&filters.filters)?)]);
        let resp: PruneResponse = self.json(req)?;
        Ok(resp.into())
    }
}
