//! Transport backed by the system OpenSSH client.
//!
//! A session is a ControlMaster process (`ssh -M -N -f`) with its control
//! socket in a private temp directory; each command runs as a short-lived
//! `ssh -S <socket>` multiplexed over it.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tempfile::TempDir;

use super::auth::Credential;
use super::transport::{Connector, Endpoint, ExecChannel, RemoteSession, TransportError};
use crate::config::SshConfig;

#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    program: PathBuf,
    strict_host_key_checking: String,
    connect_timeout_secs: Option<u64>,
}

impl OpenSshConnector {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            program: PathBuf::from("ssh"),
            strict_host_key_checking: config.strict_host_key_checking.clone(),
            connect_timeout_secs: config.connect_timeout_secs,
        }
    }

    /// Use a different `ssh` binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Authentication and host options shared by the master and every exec,
    /// so a command that cannot reach the master still connects as `credential`.
    fn session_options(&self, endpoint: &Endpoint, credential: &Credential) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        args.extend(["-o".into(), "BatchMode=yes".into()]);
        args.extend(["-o".into(), "IdentitiesOnly=yes".into()]);
        args.extend([
            "-o".into(),
            format!("StrictHostKeyChecking={}", self.strict_host_key_checking).into(),
        ]);
        if let Some(secs) = self.connect_timeout_secs {
            args.extend(["-o".into(), format!("ConnectTimeout={}", secs).into()]);
        }
        args.extend(["-i".into(), credential.identity_file.as_os_str().to_owned()]);
        args.extend(["-l".into(), credential.username.clone().into()]);
        args.extend(["-p".into(), endpoint.port.to_string().into()]);
        args
    }

    fn master_args(&self, options: &[OsString], host: &str, socket: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-M".into(), "-N".into(), "-f".into()];
        args.extend(["-S".into(), socket.as_os_str().to_owned()]);
        args.extend(options.iter().cloned());
        args.extend(["--".into(), host.into()]);
        args
    }
}

impl Connector for OpenSshConnector {
    type Session = OpenSshSession;

    fn connect(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
    ) -> Result<OpenSshSession, TransportError> {
        let control_dir = tempfile::Builder::new()
            .prefix("gerrit-dispatch-")
            .tempdir()?;
        let socket = control_dir.path().join("ctl");
        let log_path = control_dir.path().join("master.log");
        // The backgrounded master keeps stderr open, so it cannot be a pipe.
        let log = File::create(&log_path)?;
        let options = self.session_options(endpoint, credential);

        let status = Command::new(&self.program)
            .args(self.master_args(&options, &endpoint.host, &socket))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .status()
            .map_err(|e| TransportError::Connect {
                endpoint: endpoint.to_string(),
                message: format!("failed to launch {}: {}", self.program.display(), e),
            })?;

        if !status.success() {
            let diagnostics = fs::read_to_string(&log_path).unwrap_or_default();
            return Err(connect_error(endpoint, credential, status, &diagnostics));
        }

        tracing::debug!(%endpoint, socket = %socket.display(), "ssh control master started");
        Ok(OpenSshSession {
            program: self.program.clone(),
            endpoint: endpoint.clone(),
            options,
            socket,
            _control_dir: control_dir,
            connected: true,
        })
    }
}

fn connect_error(
    endpoint: &Endpoint,
    credential: &Credential,
    status: ExitStatus,
    diagnostics: &str,
) -> TransportError {
    if status.code() == Some(255) && diagnostics.contains("Permission denied") {
        return TransportError::Authentication {
            endpoint: endpoint.to_string(),
            username: credential.username.clone(),
        };
    }
    let diagnostics = diagnostics.trim();
    TransportError::Connect {
        endpoint: endpoint.to_string(),
        message: if diagnostics.is_empty() {
            format!("ssh exited with {}", status)
        } else {
            diagnostics.to_string()
        },
    }
}

pub struct OpenSshSession {
    program: PathBuf,
    endpoint: Endpoint,
    /// Options the master was started with
    options: Vec<OsString>,
    socket: PathBuf,
    // removed with the session
    _control_dir: TempDir,
    connected: bool,
}

impl OpenSshSession {
    fn control_args(&self) -> Vec<OsString> {
        vec!["-S".into(), self.socket.as_os_str().to_owned()]
    }

    fn exec_args(&self, command: &str) -> Vec<OsString> {
        let mut args = self.control_args();
        args.extend(["-o".into(), "ControlMaster=no".into()]);
        args.extend(self.options.iter().cloned());
        args.extend(["--".into(), self.endpoint.host.clone().into(), command.into()]);
        args
    }
}

impl RemoteSession for OpenSshSession {
    type Channel = OpenSshChannel;

    fn exec(&mut self, command: &str) -> Result<OpenSshChannel, TransportError> {
        let child = Command::new(&self.program)
            .args(self.exec_args(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Exec {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        Ok(OpenSshChannel {
            child,
            command: command.to_string(),
        })
    }

    fn disconnect(&mut self) {
        if !std::mem::replace(&mut self.connected, false) {
            return;
        }
        let result = Command::new(&self.program)
            .args(self.control_args())
            .args(["-O", "exit", "--"])
            .arg(&self.endpoint.host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match result {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(
                endpoint = %self.endpoint,
                %status,
                "ssh control master did not exit cleanly"
            ),
            Err(e) => tracing::warn!(
                endpoint = %self.endpoint,
                error = %e,
                "failed to stop ssh control master"
            ),
        }
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

pub struct OpenSshChannel {
    child: Child,
    command: String,
}

impl ExecChannel for OpenSshChannel {
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn exit_status(&mut self) -> Result<i32, TransportError> {
        let status = self.child.wait()?;
        status
            .code()
            .ok_or_else(|| TransportError::Terminated(self.command.clone()))
    }

    fn close(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
