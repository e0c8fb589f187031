//! Scripted in-memory engine for tests.
//!
//! [`FakeEngine`] behaves like a small single-host engine: it enforces name
//! collisions, rejects a second start, tracks running state, and serves
//! scripted health statuses, exec output, and build logs. Every streamed
//! body it hands out is counted when dropped so tests can assert that
//! components release their resources.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use berth_common::container::ContainerCreateConfig;
use berth_common::error::EngineError;
use berth_common::types::{ContainerId, ContainerState, ExecId, ImageId};

use crate::client::{ByteStream, CallContext, EngineResult, RuntimeClient};
use crate::models::{
    ContainerInspect, ContainerStateInfo, ContainerSummary, CreatedContainer, ExecInspect,
    HealthState, ImageDeleteItem, ImageInspect, PruneReport,
};
use crate::options::{
    BuildOptions, ExecCreateOptions, ImageRemoveOptions, ListOptions, PruneFilters,
    RemoveOptions, StopOptions,
};

/// Encodes one multiplexed exec frame: tag, three zero bytes, big-endian
/// length, payload.
#[must_use]
pub fn encode_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.push(tag);
    frame.extend_from_slice(&[0, 0, 0]);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// A body that yields at most `chunk` bytes per read and counts its drop.
#[derive(Debug)]
pub struct ScriptedStream {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    drops: Arc<AtomicUsize>,
}

impl ScriptedStream {
    /// Wraps `data`, delivering it `chunk` bytes at a time.
    #[must_use]
    pub fn new(data: Vec<u8>, chunk: usize, drops: Arc<AtomicUsize>) -> Self {
        Self {
            data,
            pos: 0,
            chunk: chunk.max(1),
            drops,
        }
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.data.len() - self.pos;
        let n = left.min(buf.len()).min(self.chunk);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        let _ = self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Output an exec instance will produce.
#[derive(Debug, Clone, Default)]
pub struct ExecScript {
    /// Frames in delivery order: `(tag, payload)`.
    pub frames: Vec<(u8, Vec<u8>)>,
    /// Exit code reported by inspection.
    pub exit_code: Option<i64>,
    /// Inspections after the stream closes that still report the command
    /// as running.
    pub lingering_polls: u32,
}

impl ExecScript {
    /// A command that writes `stdout` and `stderr` and exits with `code`.
    #[must_use]
    pub fn new(stdout: &str, stderr: &str, code: i64) -> Self {
        let mut frames = Vec::new();
        if !stdout.is_empty() {
            frames.push((1, stdout.as_bytes().to_vec()));
        }
        if !stderr.is_empty() {
            frames.push((2, stderr.as_bytes().to_vec()));
        }
        Self {
            frames,
            exit_code: Some(code),
            lingering_polls: 0,
        }
    }

    /// Keeps reporting the command as running for `polls` inspections after
    /// its output stream has closed.
    #[must_use]
    pub const fn lingering(mut self, polls: u32) -> Self {
        self.lingering_polls = polls;
        self
    }
}

#[derive(Debug)]
struct FakeContainer {
    id: ContainerId,
    name: String,
    image: String,
    state: ContainerState,
    health: VecDeque<String>,
}

#[derive(Debug)]
struct FakeImage {
    id: ImageId,
    tags: Vec<String>,
    size: u64,
}

#[derive(Debug)]
struct FakeExec {
    command: Vec<String>,
    started: bool,
    finished: bool,
    lingering: u32,
}

#[derive(Debug, Default)]
struct State {
    closed: bool,
    containers: Vec<FakeContainer>,
    images: Vec<FakeImage>,
    execs: HashMap<ExecId, FakeExec>,
    exec_scripts: HashMap<Vec<String>, ExecScript>,
    build_logs: VecDeque<Vec<String>>,
    failures: HashMap<&'static str, (u16, String)>,
    calls: Vec<String>,
    next_exec: u64,
    next_image: u64,
}

impl State {
    fn container(&mut self, id: &ContainerId) -> EngineResult<&mut FakeContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == *id || c.name == id.as_str())
            .ok_or_else(|| api(404, format!("No such container: {id}")))
    }

    fn image_position(&self, name: &str) -> Option<usize> {
        self.images
            .iter()
            .position(|i| i.id.as_str() == name || i.tags.iter().any(|t| t == name))
    }

    fn register_image(&mut self, tag: Option<String>, size: u64) -> ImageId {
        self.next_image += 1;
        let id = ImageId::new(format!("sha256:{:064x}", self.next_image));
        if let Some(tag) = &tag {
            for image in &mut self.images {
                image.tags.retain(|t| t != tag);
            }
        }
        self.images.push(FakeImage {
            id: id.clone(),
            tags: tag.into_iter().collect(),
            size,
        });
        id
    }
}

fn api(status: u16, message: impl Into<String>) -> EngineError {
    EngineError::Api {
        status,
        message: message.into(),
    }
}

/// In-memory [`RuntimeClient`] with scriptable behavior.
#[derive(Debug)]
pub struct FakeEngine {
    state: Mutex<State>,
    drops: Arc<AtomicUsize>,
    chunk: usize,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    /// Creates an empty engine delivering streams in 4 KiB reads.
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(4096)
    }

    /// Creates an empty engine delivering streams `chunk` bytes per read.
    #[must_use]
    pub fn with_chunk_size(chunk: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            drops: Arc::new(AtomicUsize::new(0)),
            chunk,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begins a call: records it and applies closure and injected failures.
    fn enter(&self, op: &'static str, detail: &str) -> EngineResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(format!("{op} {detail}").trim_end().to_string());
        if state.closed {
            return Err(EngineError::Unreachable {
                endpoint: "fake://engine".into(),
                message: "client is closed".into(),
            });
        }
        if let Some((status, message)) = state.failures.get(op) {
            return Err(api(*status, message.clone()));
        }
        Ok(state)
    }

    /// Makes every call of `op` fail with the given status until cleared.
    pub fn fail_on(&self, op: &'static str, status: u16, message: impl Into<String>) {
        let _ = self.lock().failures.insert(op, (status, message.into()));
    }

    /// Clears an injected failure.
    pub fn clear_failure(&self, op: &'static str) {
        let _ = self.lock().failures.remove(op);
    }

    /// Adds an image with an optional tag; untagged images are dangling.
    pub fn add_image(&self, tag: Option<&str>, size: u64) -> ImageId {
        self.lock().register_image(tag.map(str::to_string), size)
    }

    /// Returns `true` if an image with this tag or ID exists.
    pub fn has_image(&self, name: &str) -> bool {
        self.lock().image_position(name).is_some()
    }

    /// Number of images held.
    pub fn image_count(&self) -> usize {
        self.lock().images.len()
    }

    /// Queues health statuses for a container; each inspection consumes one
    /// until the last, which sticks.
    pub fn script_health(&self, container: &str, statuses: &[&str]) {
        let mut state = self.lock();
        if let Some(c) = state
            .containers
            .iter_mut()
            .find(|c| c.name == container || c.id.as_str() == container)
        {
            c.health = statuses.iter().map(|s| (*s).to_string()).collect();
        }
    }

    /// Sets the output produced when `command` is executed.
    pub fn script_exec(&self, command: &[&str], script: ExecScript) {
        let key = command.iter().map(|s| (*s).to_string()).collect();
        let _ = self.lock().exec_scripts.insert(key, script);
    }

    /// Queues the raw JSON lines returned by the next build.
    pub fn script_build(&self, lines: &[&str]) {
        self.lock()
            .build_logs
            .push_back(lines.iter().map(|s| (*s).to_string()).collect());
    }

    /// Current state of a container by name or ID.
    pub fn container_state(&self, container: &str) -> Option<ContainerState> {
        self.lock()
            .containers
            .iter()
            .find(|c| c.name == container || c.id.as_str() == container)
            .map(|c| c.state)
    }

    /// Number of streamed bodies dropped so far.
    pub fn stream_drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    /// Every call received, as `"op detail"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }
}

impl RuntimeClient for FakeEngine {
    fn api_version(&self) -> &str {
        berth_common::constants::MAX_API_VERSION
    }

    fn close(&self) -> EngineResult<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(EngineError::Unreachable {
                endpoint: "fake://engine".into(),
                message: "client already closed".into(),
            });
        }
        state.closed = true;
        Ok(())
    }

    fn list_containers(
        &self,
        _ctx: &CallContext,
        opts: &ListOptions,
    ) -> EngineResult<Vec<ContainerSummary>> {
        let state = self.enter("list", &format!("all={}", opts.all))?;
        Ok(state
            .containers
            .iter()
            .filter(|c| opts.all || c.state == ContainerState::Running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![c.name.clone()],
                image: c.image.clone(),
                state: Some(c.state),
                status: c.state.to_string(),
                created: None,
            })
            .collect())
    }

    fn create_container(
        &self,
        _ctx: &CallContext,
        config: &ContainerCreateConfig,
    ) -> EngineResult<CreatedContainer> {
        let mut state = self.enter("create", config.name())?;
        if state.containers.iter().any(|c| c.name == config.name()) {
            return Err(api(
                409,
                format!("Conflict. The container name \"/{}\" is already in use", config.name()),
            ));
        }
        let id = ContainerId::generate();
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: config.name().to_string(),
            image: config.image().image.clone(),
            state: ContainerState::Created,
            health: VecDeque::new(),
        });
        Ok(CreatedContainer {
            id,
            warnings: Vec::new(),
        })
    }

    fn start_container(&self, _ctx: &CallContext, id: &ContainerId) -> EngineResult<()> {
        let mut state = self.enter("start", id.as_str())?;
        let container = state.container(id)?;
        if container.state == ContainerState::Running {
            return Err(api(304, "container already started"));
        }
        container.state = ContainerState::Running;
        Ok(())
    }

    fn stop_container(
        &self,
        _ctx: &CallContext,
        id: &ContainerId,
        opts: &StopOptions,
    ) -> EngineResult<()> {
        let mut state = self.enter("stop", &format!("{id} {}", opts.signal))?;
        let container = state.container(id)?;
        if container.state == ContainerState::Running {
            container.state = ContainerState::Exited;
        }
        Ok(())
    }

    fn remove_container(
        &self,
        _ctx: &CallContext,
        id: &ContainerId,
        opts: &RemoveOptions,
    ) -> EngineResult<()> {
        let mut state = self.enter(
            "remove",
            &format!(
                "{id} force={} v={} link={}",
                opts.force, opts.remove_volumes, opts.remove_links
            ),
        )?;
        let running = state.container(id)?.state == ContainerState::Running;
        if running && !opts.force {
            return Err(api(409, "cannot remove a running container"));
        }
        state
            .containers
            .retain(|c| c.id != *id && c.name != id.as_str());
        Ok(())
    }

    fn inspect_container(
        &self,
        _ctx: &CallContext,
        id: &ContainerId,
    ) -> EngineResult<ContainerInspect> {
        let mut state = self.enter("inspect_container", id.as_str())?;
        let container = state.container(id)?;
        let health = if container.health.len() > 1 {
            container.health.pop_front()
        } else {
            container.health.front().cloned()
        };
        Ok(ContainerInspect {
            id: container.id.clone(),
            name: container.name.clone(),
            image: container.image.clone(),
            state: ContainerStateInfo {
                status: Some(container.state),
                running: container.state == ContainerState::Running,
                exit_code: 0,
                health: health.map(|status| HealthState {
                    status,
                    failing_streak: 0,
                }),
            },
        })
    }

    fn create_exec(
        &self,
        _ctx: &CallContext,
        id: &ContainerId,
        opts: &ExecCreateOptions,
    ) -> EngineResult<ExecId> {
        let mut state = self.enter("create_exec", &format!("{id} {}", opts.command.join(" ")))?;
        if state.container(id)?.state != ContainerState::Running {
            return Err(api(409, format!("Container {id} is not running")));
        }
        state.next_exec += 1;
        let exec_id = ExecId::new(format!("exec-{}", state.next_exec));
        let _ = state.execs.insert(
            exec_id.clone(),
            FakeExec {
                command: opts.command.clone(),
                started: false,
                finished: false,
                lingering: 0,
            },
        );
        Ok(exec_id)
    }

    fn start_exec(&self, _ctx: &CallContext, exec_id: &ExecId) -> EngineResult<ByteStream> {
        let mut state = self.enter("start_exec", exec_id.as_str())?;
        let command = state
            .execs
            .get(exec_id)
            .ok_or_else(|| api(404, format!("No such exec instance: {exec_id}")))?
            .command
            .clone();
        let script = state.exec_scripts.get(&command).cloned().unwrap_or_default();
        if let Some(exec) = state.execs.get_mut(exec_id) {
            if exec.started {
                return Err(api(409, "exec instance already started"));
            }
            exec.started = true;
            exec.lingering = script.lingering_polls;
            exec.finished = script.lingering_polls == 0;
        }
        let data = script
            .frames
            .iter()
            .flat_map(|(tag, payload)| encode_frame(*tag, payload))
            .collect();
        Ok(Box::new(ScriptedStream::new(
            data,
            self.chunk,
            Arc::clone(&self.drops),
        )))
    }

    fn inspect_exec(&self, _ctx: &CallContext, exec_id: &ExecId) -> EngineResult<ExecInspect> {
        let mut state = self.enter("inspect_exec", exec_id.as_str())?;
        let exec = state
            .execs
            .get_mut(exec_id)
            .ok_or_else(|| api(404, format!("No such exec instance: {exec_id}")))?;
        if exec.started && !exec.finished {
            exec.lingering = exec.lingering.saturating_sub(1);
            exec.finished = exec.lingering == 0;
            return Ok(ExecInspect {
                running: true,
                exit_code: None,
            });
        }
        let finished = exec.finished;
        let command = exec.command.clone();
        let exit_code = if finished {
            state
                .exec_scripts
                .get(&command)
                .map_or(Some(0), |s| s.exit_code)
        } else {
            None
        };
        Ok(ExecInspect {
            running: !finished,
            exit_code,
        })
    }

    fn build_image(
        &self,
        _ctx: &CallContext,
        context: Vec<u8>,
        opts: &BuildOptions,
    ) -> EngineResult<ByteStream> {
        let mut state = self.enter(
            "build",
            &format!(
                "{} pull={} forcerm={} nocache={} bytes={}",
                opts.tags.join(","),
                opts.pull,
                opts.force_rm,
                opts.no_cache,
                context.len()
            ),
        )?;
        let lines = state.build_logs.pop_front().unwrap_or_default();
        if !lines.iter().any(|l| l.contains("\"error\"")) {
            for tag in &opts.tags {
                let _ = state.register_image(Some(tag.clone()), context.len() as u64);
            }
        }
        let body = lines.join("\n").into_bytes();
        Ok(Box::new(ScriptedStream::new(
            body,
            self.chunk,
            Arc::clone(&self.drops),
        )))
    }

    fn inspect_image(&self, _ctx: &CallContext, name: &str) -> EngineResult<ImageInspect> {
        let state = self.enter("inspect_image", name)?;
        let image = state
            .image_position(name)
            .map(|i| &state.images[i])
            .ok_or_else(|| api(404, format!("No such image: {name}")))?;
        Ok(ImageInspect {
            id: image.id.clone(),
            repo_tags: image.tags.clone(),
            size: image.size,
        })
    }

    fn remove_image(
        &self,
        _ctx: &CallContext,
        id: &ImageId,
        opts: &ImageRemoveOptions,
    ) -> EngineResult<Vec<ImageDeleteItem>> {
        let mut state = self.enter(
            "remove_image",
            &format!("{id} force={} noprune={}", opts.force, !opts.prune_children),
        )?;
        let index = state
            .image_position(id.as_str())
            .ok_or_else(|| api(404, format!("No such image: {id}")))?;
        let image = state.images.remove(index);
        let mut items: Vec<ImageDeleteItem> =
            image.tags.into_iter().map(ImageDeleteItem::Untagged).collect();
        items.push(ImageDeleteItem::Deleted(image.id));
        Ok(items)
    }

    fn prune_images(&self, _ctx: &CallContext, filters: &PruneFilters) -> EngineResult<PruneReport> {
        let mut state = self.enter(
            "prune",
            &format!("dangling={}", filters.is_dangling_only()),
        )?;
        let dangling_only = filters.is_dangling_only();
        let (removed, kept): (Vec<FakeImage>, Vec<FakeImage>) = std::mem::take(&mut state.images)
            .into_iter()
            .partition(|i| !dangling_only || i.tags.is_empty());
        state.images = kept;
        Ok(PruneReport {
            space_reclaimed: removed.iter().map(|i| i.size).sum(),
            images_deleted: removed.into_iter().map(|i| i.id).collect(),
        })
    }
}
