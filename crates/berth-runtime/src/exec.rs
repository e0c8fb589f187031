//! Command execution inside running containers.

use std::thread;
use std::time::Duration;

use berth_common::error::{BerthError, ExecFailure, Result};
use berth_common::types::{ContainerId, ExecId};
use berth_core::client::{CallContext, RuntimeClient};
use berth_core::options::ExecCreateOptions;

use crate::demux;

/// Pause between inspections of an exec instance that still reports itself
/// running after its output stream closed.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Inspections made before giving up on an exit code.
const EXIT_POLL_LIMIT: u32 = 40;

/// Output from an exec command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code reported by the engine.
    pub exit_code: i64,
}

impl ExecOutput {
    /// Returns `true` if the command exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one-shot commands in running containers.
pub struct ExecRunner<'a> {
    client: &'a dyn RuntimeClient,
}

impl<'a> ExecRunner<'a> {
    /// Creates a runner borrowing the shared engine client.
    #[must_use]
    pub fn new(client: &'a dyn RuntimeClient) -> Self {
        Self { client }
    }

    /// Runs `command` and returns its standard output.
    ///
    /// A nonzero exit code is an error carrying the code and the captured
    /// standard error; standard output is not returned in that case.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Exec` if the exec instance cannot be created,
    /// attached, or inspected, if its output stream is malformed, or if the
    /// command exits with a nonzero code.
    pub fn exec(&self, ctx: &CallContext, id: &ContainerId, command: &[String]) -> Result<String> {
        let output = self.exec_output(ctx, id, command)?;
        if !output.success() {
            tracing::debug!(
                id = %id,
                code = output.exit_code,
                stdout_bytes = output.stdout.len(),
                "discarding stdout of failed command"
            );
            return Err(exec_error(
                id,
                ExecFailure::NonZeroExit {
                    code: output.exit_code,
                    stderr: output.stderr,
                },
            ));
        }
        Ok(output.stdout)
    }

    /// Runs `command` and returns everything it produced, whatever its exit
    /// code.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Exec` if the command is empty, or the exec
    /// instance cannot be created, attached, read, or inspected.
    pub fn exec_output(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        command: &[String],
    ) -> Result<ExecOutput> {
        if command.is_empty() {
            return Err(exec_error(id, ExecFailure::EmptyCommand));
        }
        tracing::info!(id = %id, cmd = ?command, "exec into container");

        let exec_id = self
            .client
            .create_exec(ctx, id, &ExecCreateOptions::new(command.to_vec()))
            .map_err(|e| exec_error(id, ExecFailure::Create(e)))?;

        let (stdout, stderr) = self.collect(ctx, id, &exec_id)?;
        let exit_code = self.wait_for_exit(ctx, id, &exec_id)?;
        tracing::info!(id = %id, exec_id = %exec_id, code = exit_code, "exec finished");

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    /// Inspects the exec instance until the engine stops reporting it as
    /// running. The engine can lag briefly behind the closed stream, so this
    /// retries within the call deadline and a fixed attempt budget.
    fn wait_for_exit(&self, ctx: &CallContext, id: &ContainerId, exec_id: &ExecId) -> Result<i64> {
        let unavailable = || {
            exec_error(
                id,
                ExecFailure::ExitCodeUnavailable {
                    exec_id: exec_id.to_string(),
                },
            )
        };
        for attempt in 1..=EXIT_POLL_LIMIT {
            let inspect = self.client.inspect_exec(ctx, exec_id).map_err(|source| {
                exec_error(
                    id,
                    ExecFailure::Inspect {
                        exec_id: exec_id.to_string(),
                        source,
                    },
                )
            })?;
            if !inspect.running {
                return inspect.exit_code.ok_or_else(unavailable);
            }
            if ctx.is_expired() {
                break;
            }
            tracing::debug!(exec_id = %exec_id, attempt, "exec still running after stream closed");
            let pause = ctx
                .remaining()
                .map_or(EXIT_POLL_INTERVAL, |left| left.min(EXIT_POLL_INTERVAL));
            thread::sleep(pause);
        }
        tracing::warn!(exec_id = %exec_id, "exec never reported an exit code");
        Err(unavailable())
    }

    /// Attaches to the exec instance and drains its output. The attach
    /// handle is dropped when this returns, on success or failure.
    fn collect(
        &self,
        ctx: &CallContext,
        id: &ContainerId,
        exec_id: &ExecId,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut stream = self.client.start_exec(ctx, exec_id).map_err(|source| {
            exec_error(
                id,
                ExecFailure::Attach {
                    exec_id: exec_id.to_string(),
                    source,
                },
            )
        })?;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let frames = demux::demux(&mut stream, &mut stdout, &mut stderr)
            .map_err(|e| exec_error(id, ExecFailure::Demux(e)))?;
        tracing::debug!(
            exec_id = %exec_id,
            frames,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "exec stream drained"
        );
        Ok((stdout, stderr))
    }
}

fn exec_error(id: &ContainerId, source: ExecFailure) -> BerthError {
    BerthError::Exec {
        id: id.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use berth_common::container::{ContainerCreateConfig, ImageConfig};
    use berth_core::testing::{ExecScript, FakeEngine};

    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    fn running(engine: &FakeEngine) -> ContainerId {
        let ctx = CallContext::background();
        let config = ContainerCreateConfig::new("web", ImageConfig::new("nginx")).unwrap();
        let id = engine.create_container(&ctx, &config).unwrap().id;
        engine.start_container(&ctx, &id).unwrap();
        id
    }

    #[test]
    fn zero_exit_returns_stdout() {
        let engine = FakeEngine::with_chunk_size(3);
        let id = running(&engine);
        engine.script_exec(&["cat", "/etc/hostname"], ExecScript::new("web\n", "", 0));

        let out = ExecRunner::new(&engine)
            .exec(&CallContext::background(), &id, &cmd(&["cat", "/etc/hostname"]))
            .expect("exec");
        assert_eq!(out, "web\n");
        assert_eq!(engine.stream_drops(), 1);
    }

    #[test]
    fn nonzero_exit_is_error_with_code_and_stderr() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        engine.script_exec(
            &["curl", "-f", "localhost:81"],
            ExecScript::new("partial body", "connection refused", 7),
        );

        let err = ExecRunner::new(&engine)
            .exec(&CallContext::background(), &id, &cmd(&["curl", "-f", "localhost:81"]))
            .unwrap_err();
        assert_eq!(err.category(), "exec");
        assert_eq!(err.exit_code(), Some(7));
        let text = err.to_string();
        assert!(text.contains("connection refused"));
        assert!(!text.contains("partial body"));
    }

    #[test]
    fn exec_output_keeps_both_streams_on_failure() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        engine.script_exec(&["false"], ExecScript::new("out", "err", 1));

        let output = ExecRunner::new(&engine)
            .exec_output(&CallContext::background(), &id, &cmd(&["false"]))
            .expect("exec_output");
        assert!(!output.success());
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
    }

    #[test]
    fn empty_command_never_reaches_engine() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        let err = ExecRunner::new(&engine)
            .exec(&CallContext::background(), &id, &[])
            .unwrap_err();
        assert!(err.to_string().contains("command is empty"));
        assert!(!engine.calls().iter().any(|c| c.starts_with("create_exec")));
    }

    #[test]
    fn stopped_container_fails_at_create() {
        let engine = FakeEngine::new();
        let ctx = CallContext::background();
        let config = ContainerCreateConfig::new("idle", ImageConfig::new("nginx")).unwrap();
        let id = engine.create_container(&ctx, &config).unwrap().id;

        let err = ExecRunner::new(&engine)
            .exec(&ctx, &id, &cmd(&["ls"]))
            .unwrap_err();
        assert!(err.to_string().contains("failed to create exec instance"));
        assert_eq!(engine.stream_drops(), 0);
    }

    #[test]
    fn attach_handle_released_when_inspection_fails() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        engine.script_exec(&["ls"], ExecScript::new("a b c", "", 0));
        engine.fail_on("inspect_exec", 500, "daemon hiccup");

        let err = ExecRunner::new(&engine)
            .exec(&CallContext::background(), &id, &cmd(&["ls"]))
            .unwrap_err();
        assert!(err.to_string().contains("failed to inspect exec instance"));
        assert_eq!(engine.stream_drops(), 1);
    }

    #[test]
    fn attach_handle_released_when_stream_is_malformed() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        engine.script_exec(
            &["ls"],
            ExecScript {
                frames: vec![(1, b"ok".to_vec()), (7, b"bad".to_vec())],
                exit_code: Some(0),
                lingering_polls: 0,
            },
        );

        let err = ExecRunner::new(&engine)
            .exec(&CallContext::background(), &id, &cmd(&["ls"]))
            .unwrap_err();
        assert!(err.to_string().contains("unknown stream tag 7"));
        assert_eq!(engine.stream_drops(), 1);
    }

    #[test]
    fn missing_exit_code_is_an_error() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        engine.script_exec(
            &["sleep", "1"],
            ExecScript {
                frames: Vec::new(),
                exit_code: None,
                lingering_polls: 0,
            },
        );

        let err = ExecRunner::new(&engine)
            .exec(&CallContext::background(), &id, &cmd(&["sleep", "1"]))
            .unwrap_err();
        assert!(err.to_string().contains("reported no exit code"));
    }

    #[test]
    fn exit_code_is_awaited_while_engine_reports_running() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        engine.script_exec(&["true"], ExecScript::new("done", "", 0).lingering(2));

        let out = ExecRunner::new(&engine)
            .exec(&CallContext::background(), &id, &cmd(&["true"]))
            .expect("exec succeeds once the engine settles");
        assert_eq!(out, "done");
        let inspections = engine
            .calls()
            .iter()
            .filter(|c| c.starts_with("inspect_exec"))
            .count();
        assert_eq!(inspections, 3);
    }

    #[test]
    fn expired_deadline_stops_waiting_for_exit_code() {
        let engine = FakeEngine::new();
        let id = running(&engine);
        engine.script_exec(&["true"], ExecScript::new("", "", 0).lingering(u32::MAX));

        let ctx = CallContext::with_timeout(Duration::from_millis(120));
        let err = ExecRunner::new(&engine)
            .exec(&ctx, &id, &cmd(&["true"]))
            .unwrap_err();
        assert!(err.to_string().contains("reported no exit code"));
        assert_eq!(engine.stream_drops(), 1);
    }
}
