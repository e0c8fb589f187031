//! Engine JSON shapes and their translation to and from Berth types.
//!
//! Field names follow the engine's PascalCase. Response fields the engine
//! may omit or send as `null` default to empty values.

use std::collections::BTreeMap;
use std::time::Duration;

use berth_common::container::{ContainerCreateConfig, HealthcheckConfig, RestartPolicy};
use berth_common::types::{ContainerId, ContainerState, ImageId};
use berth_core::models::{
    ContainerInspect, ContainerStateInfo, ContainerSummary, CreatedContainer, ExecInspect,
    HealthState, ImageDeleteItem, ImageInspect, PruneReport,
};
use berth_core::options::ExecCreateOptions;
use serde::{Deserialize, Serialize};

type EmptyObject = serde_json::Map<String, serde_json::Value>;

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

fn env_pairs(env: &[(String, String)]) -> Vec<String> {
    env.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /containers/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateBody {
    image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cmd: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    exposed_ports: BTreeMap<String, EmptyObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<HealthcheckBody>,
    host_config: HostConfigBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    networking_config: Option<NetworkingConfigBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HealthcheckBody {
    test: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_period: Option<u64>,
}

impl From<&HealthcheckConfig> for HealthcheckBody {
    fn from(hc: &HealthcheckConfig) -> Self {
        Self {
            test: hc.test.clone(),
            interval: hc.interval.map(nanos),
            timeout: hc.timeout.map(nanos),
            retries: hc.retries,
            start_period: hc.start_period.map(nanos),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PortBindingBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    host_ip: Option<String>,
    host_port: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RestartPolicyBody {
    name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_retry_count: Option<u32>,
}

impl From<RestartPolicy> for RestartPolicyBody {
    fn from(policy: RestartPolicy) -> Self {
        let maximum_retry_count = match policy {
            RestartPolicy::OnFailure { max_retries } => Some(max_retries),
            _ => None,
        };
        Self {
            name: policy.name(),
            maximum_retry_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfigBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nano_cpus: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu_shares: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    port_bindings: BTreeMap<String, Vec<PortBindingBody>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    binds: Vec<String>,
    restart_policy: RestartPolicyBody,
    auto_remove: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    network_mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EndpointBody {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    aliases: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkingConfigBody {
    endpoints_config: BTreeMap<String, EndpointBody>,
}

impl From<&ContainerCreateConfig> for CreateBody {
    fn from(config: &ContainerCreateConfig) -> Self {
        let image = config.image();
        let host = config.host();
        let network = config.network();

        let mut exposed_ports: BTreeMap<String, EmptyObject> = image
            .exposed_ports
            .iter()
            .map(|p| (p.to_string(), EmptyObject::new()))
            .collect();
        let mut port_bindings: BTreeMap<String, Vec<PortBindingBody>> = BTreeMap::new();
        for binding in &host.port_bindings {
            let key = binding.container_port.to_string();
            let _ = exposed_ports
                .entry(key.clone())
                .or_insert_with(EmptyObject::new);
            port_bindings.entry(key).or_default().push(PortBindingBody {
                host_ip: binding.host_ip.clone(),
                host_port: binding.host_port.to_string(),
            });
        }

        let networking_config = (!network.endpoints.is_empty()).then(|| NetworkingConfigBody {
            endpoints_config: network
                .endpoints
                .iter()
                .map(|(name, ep)| {
                    (
                        name.clone(),
                        EndpointBody {
                            aliases: ep.aliases.clone(),
                        },
                    )
                })
                .collect(),
        });

        Self {
            image: image.image.clone(),
            cmd: image.command.clone(),
            entrypoint: image.entrypoint.clone(),
            env: env_pairs(&image.env),
            labels: image.labels.clone(),
            exposed_ports,
            working_dir: image.working_dir.clone(),
            user: image.user.clone(),
            healthcheck: image.healthcheck.as_ref().map(HealthcheckBody::from),
            host_config: HostConfigBody {
                memory: host.memory_bytes,
                nano_cpus: host.nano_cpus,
                cpu_shares: host.cpu_shares,
                port_bindings,
                binds: host.binds.clone(),
                restart_policy: host.restart_policy.into(),
                auto_remove: host.auto_remove,
                network_mode: network.mode.clone(),
            },
            networking_config,
        }
    }
}

/// Body of `POST /containers/{id}/exec`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreateBody {
    attach_stdout: bool,
    attach_stderr: bool,
    cmd: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

impl From<&ExecCreateOptions> for ExecCreateBody {
    fn from(opts: &ExecCreateOptions) -> Self {
        Self {
            attach_stdout: opts.attach_stdout,
            attach_stderr: opts.attach_stderr,
            cmd: opts.command.clone(),
            env: env_pairs(&opts.env),
            working_dir: opts.working_dir.clone(),
            user: opts.user.clone(),
        }
    }
}

/// Body of `POST /exec/{id}/start`: attached, no TTY, so output is
/// multiplexed.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecStartBody {
    detach: bool,
    tty: bool,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// `{"message": "..."}` carried by every engine error response.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    /// Error text.
    #[serde(default)]
    pub message: String,
}

/// Response of `GET /version`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersionResponse {
    /// Engine release, e.g. `27.1.1`.
    pub version: String,
    /// Highest API version the engine speaks.
    pub api_version: String,
    /// Lowest API version the engine accepts.
    #[serde(rename = "MinAPIVersion")]
    pub min_api_version: String,
}

/// Response carrying only an identifier.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdResponse {
    /// The new object's identifier.
    pub id: String,
}

/// Response of `POST /containers/create`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

impl From<CreateResponse> for CreatedContainer {
    fn from(resp: CreateResponse) -> Self {
        Self {
            id: ContainerId::new(resp.id),
            warnings: resp.warnings.unwrap_or_default(),
        }
    }
}

/// One entry of `GET /containers/json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SummaryResponse {
    id: String,
    names: Option<Vec<String>>,
    image: String,
    state: String,
    status: String,
    created: i64,
}

impl From<SummaryResponse> for ContainerSummary {
    fn from(resp: SummaryResponse) -> Self {
        Self {
            id: ContainerId::new(resp.id),
            names: resp
                .names
                .unwrap_or_default()
                .into_iter()
                .map(|n| n.trim_start_matches('/').to_string())
                .collect(),
            image: resp.image,
            state: ContainerState::parse(&resp.state),
            status: resp.status,
            created: chrono::DateTime::from_timestamp(resp.created, 0),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct HealthResponse {
    status: String,
    failing_streak: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct StateResponse {
    status: String,
    running: bool,
    exit_code: i64,
    health: Option<HealthResponse>,
}

/// Response of `GET /containers/{id}/json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InspectResponse {
    id: String,
    name: String,
    image: String,
    state: StateResponse,
}

impl From<InspectResponse> for ContainerInspect {
    fn from(resp: InspectResponse) -> Self {
        Self {
            id: ContainerId::new(resp.id),
            name: resp.name.trim_start_matches('/').to_string(),
            image: resp.image,
            state: ContainerStateInfo {
                status: ContainerState::parse(&resp.state.status),
                running: resp.state.running,
                exit_code: resp.state.exit_code,
                health: resp.state.health.map(|h| HealthState {
                    status: h.status,
                    failing_streak: h.failing_streak,
                }),
            },
        }
    }
}

/// Response of `GET /exec/{id}/json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExecInspectResponse {
    running: bool,
    exit_code: Option<i64>,
}

impl From<ExecInspectResponse> for ExecInspect {
    fn from(resp: ExecInspectResponse) -> Self {
        Self {
            running: resp.running,
            exit_code: if resp.running { None } else { resp.exit_code },
        }
    }
}

/// Response of `GET /images/{name}/json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageInspectResponse {
    id: String,
    repo_tags: Option<Vec<String>>,
    size: u64,
}

impl From<ImageInspectResponse> for ImageInspect {
    fn from(resp: ImageInspectResponse) -> Self {
        Self {
            id: ImageId::new(resp.id),
            repo_tags: resp.repo_tags.unwrap_or_default(),
            size: resp.size,
        }
    }
}

/// One line of an image delete or prune response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteItemResponse {
    untagged: Option<String>,
    deleted: Option<String>,
}

impl DeleteItemResponse {
    /// Converts the line, skipping empty ones.
    #[must_use]
    pub fn into_item(self) -> Option<ImageDeleteItem> {
        match (self.untagged, self.deleted) {
            (Some(tag), _) => Some(ImageDeleteItem::Untagged(tag)),
            (None, Some(id)) => Some(ImageDeleteItem::Deleted(ImageId::new(id))),
            (None, None) => None,
        }
    }
}

/// Response of `POST /images/prune`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PruneResponse {
    images_deleted: Option<Vec<DeleteItemResponse>>,
    space_reclaimed: u64,
}

impl From<PruneResponse> for PruneReport {
    fn from(resp: PruneResponse) -> Self {
        Self {
            space_reclaimed: resp.space_reclaimed,
            images_deleted: resp
                .images_deleted
                .unwrap_or_default()
                .into_iter()
                .filter_map(|item| match item.into_item() {
                    Some(ImageDeleteItem::Deleted(id)) => Some(id),
                    _ => None,
                })
                .collect(),
        }
    }
}
