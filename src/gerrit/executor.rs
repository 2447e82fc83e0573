use std::io::{BufRead, BufReader, Read};
use std::thread;

use super::transport::{ExecChannel, RemoteSession, TransportError};

/// Closes the channel however `execute` exits.
struct ChannelGuard<C: ExecChannel>(C);

impl<C: ExecChannel> Drop for ChannelGuard<C> {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Log every line of `reader`. Bytes that are not UTF-8 are replaced, never
/// treated as an error.
fn drain(reader: Box<dyn Read + Send>, stream: Stream) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        match stream {
            Stream::Stdout => tracing::trace!(%line, "incoming line"),
            Stream::Stderr => tracing::warn!(%line, "remote error output"),
        }
    }
}

/// Run `command` on `session` and return the remote exit status.
///
/// Output is logged, never interpreted. Both streams are drained at the same
/// time so a full stderr buffer cannot stall the remote process.
pub fn execute<S: RemoteSession>(session: &mut S, command: &str) -> Result<i32, TransportError> {
    tracing::info!(command, "running command");

    let mut channel = ChannelGuard(session.exec(command)?);
    let stdout = channel.0.take_stdout();
    let stderr = channel.0.take_stderr();

    thread::scope(|scope| -> Result<(), TransportError> {
        let stderr_drain = stderr.map(|reader| scope.spawn(move || drain(reader, Stream::Stderr)));

        let stdout_result = stdout.map_or(Ok(()), |reader| drain(reader, Stream::Stdout));
        let stderr_result = match stderr_drain {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(std::io::Error::other("stderr reader panicked"))
            }),
            None => Ok(()),
        };

        stdout_result?;
        stderr_result?;
        Ok(())
    })?;

    let exit_status = channel.0.exit_status()?;
    tracing::info!(exit_status, success = exit_status == 0, "command exit status");
    Ok(exit_status)
}
