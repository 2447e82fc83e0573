use serde::Serialize;

use super::auth::{resolve_credential, Credential, PreferenceStore};
use super::command::format_command;
use super::executor::execute;
use super::target::{same_host, ReviewBatch, ReviewTarget};
use super::transport::{Connector, Endpoint, RemoteSession, TransportError};
use crate::config::SshConfig;

/// Exit status of one target's remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetResult {
    pub target: ReviewTarget,
    pub exit_status: i32,
}

impl TargetResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub results: Vec<TargetResult>,
}

impl DispatchOutcome {
    /// True iff every command exited 0. An empty batch succeeds.
    pub fn success(&self) -> bool {
        self.results.iter().all(TargetResult::success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetResult> {
        self.results.iter().filter(|r| !r.success())
    }
}

/// The one open session of a batch, disconnected on drop.
struct SessionSlot<S: RemoteSession> {
    current: Option<(String, S)>,
}

impl<S: RemoteSession> SessionSlot<S> {
    fn new() -> Self {
        Self { current: None }
    }

    /// Session for `host`, reusing the open one when the host matches.
    /// Any other open session is disconnected before `open` runs.
    fn acquire<E>(
        &mut self,
        host: &str,
        open: impl FnOnce() -> Result<S, E>,
    ) -> Result<&mut S, E> {
        let entry = match self.current.take() {
            Some(entry) if same_host(&entry.0, host) => entry,
            previous => {
                if let Some(previous) = previous {
                    disconnect(previous);
                }
                (host.to_string(), open()?)
            }
        };
        Ok(&mut self.current.insert(entry).1)
    }

    fn close(&mut self) {
        if let Some(entry) = self.current.take() {
            disconnect(entry);
        }
    }
}

impl<S: RemoteSession> Drop for SessionSlot<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn disconnect<S: RemoteSession>((host, mut session): (String, S)) {
    tracing::info!(%host, "disconnecting");
    session.disconnect();
}

/// Sends `gerrit review` commands for a batch of targets, one host at a time.
pub struct Dispatcher<'a, C: Connector> {
    connector: C,
    ssh: SshConfig,
    preferences: Option<&'a dyn PreferenceStore>,
}

impl<'a, C: Connector> Dispatcher<'a, C> {
    pub fn new(connector: C, ssh: SshConfig) -> Self {
        Self {
            connector,
            ssh,
            preferences: None,
        }
    }

    /// Per-user preferences consulted before the configured default credential.
    pub fn with_preferences(mut self, preferences: &'a dyn PreferenceStore) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn resolve_credential(&self) -> Credential {
        resolve_credential(self.preferences, &self.ssh).into_credential()
    }

    pub fn review(
        &self,
        target: ReviewTarget,
        args: &str,
    ) -> Result<DispatchOutcome, TransportError> {
        self.dispatch(&ReviewBatch::single(target, args))
    }

    /// Run the batch in order. A new session is opened whenever the host
    /// changes, so interleaved hosts reconnect. Non-zero exits are recorded
    /// and the batch continues; transport errors abort it.
    pub fn dispatch(&self, batch: &ReviewBatch) -> Result<DispatchOutcome, TransportError> {
        let credential = self.resolve_credential();
        let mut slot = SessionSlot::<C::Session>::new();
        let mut outcome = DispatchOutcome::default();

        for target in &batch.targets {
            let command = format_command(target, &batch.args);

            let session = slot.acquire(&target.host, || {
                let endpoint = Endpoint::new(target.host.clone(), self.ssh.port);
                tracing::info!(%endpoint, username = %credential.username, "connecting");
                self.connector.connect(&endpoint, &credential)
            })?;

            let exit_status = execute(session, &command)?;
            if exit_status != 0 {
                tracing::warn!(%command, exit_status, "review command failed");
            }
            outcome.results.push(TargetResult {
                target: target.clone(),
                exit_status,
            });
        }

        slot.close();
        tracing::debug!(
            targets = batch.targets.len(),
            success = outcome.success(),
            "dispatch finished"
        );
        Ok(outcome)
    }
}
