mod auth;
mod command;
mod dispatcher;
mod executor;
#[cfg(test)]
mod fake;
mod openssh;
mod target;
mod transport;

pub use auth::{
    per_caller_credential, resolve_credential, Credential, MemoryPreferences, PreferenceStore,
    ResolvedCredential, TomlPreferences, PREF_PRIVATE_KEY, PREF_USERNAME,
};
pub use command::{format_command, BASE_COMMAND};
pub use dispatcher::{DispatchOutcome, Dispatcher, TargetResult};
pub use executor::execute;
pub use openssh::{OpenSshChannel, OpenSshConnector, OpenSshSession};
pub use target::{parse_target, same_host, ReviewBatch, ReviewTarget, TargetParseError};
pub use transport::{Connector, Endpoint, ExecChannel, RemoteSession, TransportError};
