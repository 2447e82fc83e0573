//! Recording in-memory transport for tests.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use super::auth::Credential;
use super::transport::{Connector, Endpoint, ExecChannel, RemoteSession, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(String),
    Disconnect(String),
    Exec(String),
    StdoutEof(String),
    StderrEof(String),
    ExitStatus(String),
    CloseChannel(String),
}

#[derive(Debug, Clone)]
pub struct Reply {
    exit: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    broken_stdout: bool,
    exec_fails: bool,
}

impl Reply {
    pub fn exit(code: i32) -> Self {
        Self {
            exit: Some(code),
            stdout: Vec::new(),
            stderr: Vec::new(),
            broken_stdout: false,
            exec_fails: false,
        }
    }

    pub fn terminated() -> Self {
        Self {
            exit: None,
            ..Self::exit(0)
        }
    }

    pub fn exec_error() -> Self {
        Self {
            exec_fails: true,
            ..Self::exit(0)
        }
    }

    pub fn stdout(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.stdout = bytes.as_ref().to_vec();
        self
    }

    pub fn stderr(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.stderr = bytes.as_ref().to_vec();
        self
    }

    pub fn broken_stdout(mut self) -> Self {
        self.broken_stdout = true;
        self
    }
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    replies: HashMap<String, Reply>,
    refused: HashSet<String>,
    endpoints: Vec<Endpoint>,
    credentials: Vec<Credential>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Arc<Mutex<State>>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unregistered commands exit 0 with no output.
    pub fn reply(&self, command: &str, reply: Reply) {
        lock(&self.state).replies.insert(command.to_string(), reply);
    }

    pub fn refuse(&self, host: &str) {
        lock(&self.state).refused.insert(host.to_string());
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.state).events.clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        lock(&self.state).events.iter().filter(|e| *e == event).count()
    }

    pub fn connects(&self) -> usize {
        self.filter(|e| matches!(e, Event::Connect(_)))
    }

    pub fn disconnects(&self) -> usize {
        self.filter(|e| matches!(e, Event::Disconnect(_)))
    }

    pub fn execs(&self) -> Vec<String> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Exec(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        lock(&self.state).endpoints.clone()
    }

    pub fn credentials(&self) -> Vec<Credential> {
        lock(&self.state).credentials.clone()
    }

    fn filter(&self, pred: impl Fn(&Event) -> bool) -> usize {
        lock(&self.state).events.iter().filter(|e| pred(e)).count()
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    fn connect(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
    ) -> Result<FakeSession, TransportError> {
        let mut state = lock(&self.state);
        if state.refused.contains(&endpoint.host) {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            });
        }
        state.events.push(Event::Connect(endpoint.host.clone()));
        state.endpoints.push(endpoint.clone());
        state.credentials.push(credential.clone());
        Ok(FakeSession {
            state: Arc::clone(&self.state),
            host: endpoint.host.clone(),
        })
    }
}

pub struct FakeSession {
    state: Arc<Mutex<State>>,
    host: String,
}

impl RemoteSession for FakeSession {
    type Channel = FakeChannel;

    fn exec(&mut self, command: &str) -> Result<FakeChannel, TransportError> {
        let mut state = lock(&self.state);
        state.events.push(Event::Exec(command.to_string()));
        let reply = state
            .replies
            .get(command)
            .cloned()
            .unwrap_or_else(|| Reply::exit(0));
        if reply.exec_fails {
            return Err(TransportError::Exec {
                command: command.to_string(),
                message: "channel open failed".to_string(),
            });
        }
        Ok(FakeChannel {
            state: Arc::clone(&self.state),
            command: command.to_string(),
            reply,
            stdout_taken: false,
            stderr_taken: false,
        })
    }

    fn disconnect(&mut self) {
        lock(&self.state)
            .events
            .push(Event::Disconnect(self.host.clone()));
    }
}

pub struct FakeChannel {
    state: Arc<Mutex<State>>,
    command: String,
    reply: Reply,
    stdout_taken: bool,
    stderr_taken: bool,
}

struct RecordingReader {
    inner: Cursor<Vec<u8>>,
    broken: bool,
    eof: Option<Event>,
    state: Arc<Mutex<State>>,
}

impl Read for RecordingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            if let Some(event) = self.eof.take() {
                lock(&self.state).events.push(event);
            }
        }
        Ok(n)
    }
}

impl FakeChannel {
    fn reader(&self, bytes: &[u8], broken: bool, eof: Event) -> Box<dyn Read + Send> {
        Box::new(RecordingReader {
            inner: Cursor::new(bytes.to_vec()),
            broken,
            eof: Some(eof),
            state: Arc::clone(&self.state),
        })
    }
}

impl ExecChannel for FakeChannel {
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        if std::mem::replace(&mut self.stdout_taken, true) {
            return None;
        }
        Some(self.reader(
            &self.reply.stdout,
            self.reply.broken_stdout,
            Event::StdoutEof(self.command.clone()),
        ))
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        if std::mem::replace(&mut self.stderr_taken, true) {
            return None;
        }
        Some(self.reader(
            &self.reply.stderr,
            false,
            Event::StderrEof(self.command.clone()),
        ))
    }

    fn exit_status(&mut self) -> Result<i32, TransportError> {
        lock(&self.state)
            .events
            .push(Event::ExitStatus(self.command.clone()));
        self.reply
            .exit
            .ok_or_else(|| TransportError::Terminated(self.command.clone()))
    }

    fn close(&mut self) {
        lock(&self.state)
            .events
            .push(Event::CloseChannel(self.command.clone()));
    }
}
