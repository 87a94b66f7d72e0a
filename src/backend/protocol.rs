//! The unlock-and-fetch exchange with `keepassxc-cli show`.
//!
//! ```text
//! Spawned -> AwaitingPrompt -> PasswordSent -> Draining -> Done
//! ```
//!
//! stdout and stderr are pumped by reader threads into a channel so every
//! wait can carry a deadline. The captured output is classified once the
//! child has closed both streams.

use std::io::{ErrorKind, Read, Write};
use std::process::Child;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::errors::{Result, VaultClientError};

/// Printed by keepassxc-cli before it reads the database password.
pub const PROMPT_MARKER: &str = "Enter password to unlock";

/// Printed when the requested entry does not exist.
pub const NOT_FOUND_MARKER: &str = "Could not find entry";

/// Printed when the database cannot be opened with the given credentials.
pub const AUTH_FAILED_MARKERS: &[&str] = &["Invalid credentials", "Error while reading the database"];

/// Start of the line carrying the entry's password in `show -s` output.
pub const PASSWORD_PREFIX: &str = "Password: ";

/// Where the exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Spawned,
    AwaitingPrompt,
    PasswordSent,
    Draining,
    Done,
}

impl State {
    fn label(self) -> &'static str {
        match self {
            State::Spawned => "spawned",
            State::AwaitingPrompt => "awaiting prompt",
            State::PasswordSent => "password sent",
            State::Draining => "draining output",
            State::Done => "done",
        }
    }
}

/// What the backend's output amounted to.
pub enum Outcome {
    Found(Zeroizing<String>),
    NotFound,
    AuthenticationFailed,
    Unrecognized,
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Found(_) => f.write_str("Found(<redacted>)"),
            Outcome::NotFound => f.write_str("NotFound"),
            Outcome::AuthenticationFailed => f.write_str("AuthenticationFailed"),
            Outcome::Unrecognized => f.write_str("Unrecognized"),
        }
    }
}

/// Classify captured backend output.
///
/// A not-found marker anywhere wins; then the first `Password: ` line;
/// then the wrong-password messages.
pub fn classify(output: &str) -> Outcome {
    if output.contains(NOT_FOUND_MARKER) {
        return Outcome::NotFound;
    }

    if let Some(secret) = output
        .lines()
        .find_map(|line| line.strip_prefix(PASSWORD_PREFIX))
    {
        return Outcome::Found(Zeroizing::new(secret.to_string()));
    }

    if AUTH_FAILED_MARKERS.iter().any(|m| output.contains(m)) {
        return Outcome::AuthenticationFailed;
    }

    Outcome::Unrecognized
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

struct Chunk {
    stream: Stream,
    bytes: Vec<u8>,
}

/// One running exchange. Owns the child for its whole lifetime.
pub struct Exchange {
    child: Child,
    rx: Receiver<Chunk>,
    stdout: Zeroizing<Vec<u8>>,
    stderr: Zeroizing<Vec<u8>>,
    state: State,
    timeout: Duration,
}

impl Exchange {
    /// Take over a child spawned with piped stdio.
    pub fn start(mut child: Child, timeout: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let stdout = child.stdout.take().ok_or_else(|| {
            VaultClientError::BackendFailed("backend stdout was not captured".into())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            VaultClientError::BackendFailed("backend stderr was not captured".into())
        })?;
        pump(stdout, Stream::Stdout, tx.clone());
        pump(stderr, Stream::Stderr, tx);

        Ok(Self {
            child,
            rx,
            stdout: Zeroizing::new(Vec::new()),
            stderr: Zeroizing::new(Vec::new()),
            state: State::Spawned,
            timeout,
        })
    }

    /// Drive the exchange to completion and classify the result.
    pub fn run(mut self, password: &str) -> Result<Outcome> {
        self.transition(State::AwaitingPrompt);
        let prompted = self.await_prompt()?;

        if prompted {
            self.send_password(password)?;
        } else {
            debug!("backend closed its output without prompting for a password");
        }

        self.transition(State::Draining);
        self.drain()?;

        let status = self.child.wait()?;
        self.transition(State::Done);
        debug!(status = ?status.code(), "backend exited");

        let mut text = Zeroizing::new(String::from_utf8_lossy(&self.stdout).into_owned());
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        Ok(classify(&text))
    }

    fn transition(&mut self, next: State) {
        trace!(from = self.state.label(), to = next.label(), "backend exchange");
        self.state = next;
    }

    /// Read until the unlock prompt shows up.
    ///
    /// Returns `false` if the backend closed both streams first.
    fn await_prompt(&mut self) -> Result<bool> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.transcript_contains(PROMPT_MARKER) {
                return Ok(true);
            }
            match self.next_chunk(deadline)? {
                Some(chunk) => self.record(chunk),
                None => return Ok(false),
            }
        }
    }

    fn send_password(&mut self, password: &str) -> Result<()> {
        let Some(mut stdin) = self.child.stdin.take() else {
            return Err(VaultClientError::BackendFailed(
                "backend stdin was not captured".into(),
            ));
        };

        let mut line = Zeroizing::new(String::with_capacity(password.len() + 1));
        line.push_str(password);
        line.push('\n');

        match stdin.write_all(line.as_bytes()).and_then(|()| stdin.flush()) {
            Ok(()) => {}
            // Backend gave up before reading; its output says why.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("backend closed stdin before the password was written");
            }
            Err(e) => return Err(e.into()),
        }
        // Dropping stdin sends EOF so the backend never waits for more input.
        drop(stdin);

        self.transition(State::PasswordSent);
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        while let Some(chunk) = self.next_chunk(deadline)? {
            self.record(chunk);
        }
        Ok(())
    }

    /// Next chunk of output, `None` once both streams are closed.
    fn next_chunk(&mut self, deadline: Instant) -> Result<Option<Chunk>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => {
                let stage = self.state.label();
                let _ = self.child.kill();
                let _ = self.child.wait();
                Err(VaultClientError::BackendTimeout(self.timeout.as_secs(), stage))
            }
        }
    }

    fn record(&mut self, chunk: Chunk) {
        match chunk.stream {
            Stream::Stdout => self.stdout.extend_from_slice(&chunk.bytes),
            Stream::Stderr => self.stderr.extend_from_slice(&chunk.bytes),
        }
    }

    fn transcript_contains(&self, marker: &str) -> bool {
        [&self.stdout, &self.stderr]
            .iter()
            .any(|buf| String::from_utf8_lossy(buf).contains(marker))
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if self.state != State::Done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn pump<R: Read + Send + 'static>(mut reader: R, stream: Stream, tx: Sender<Chunk>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = Chunk {
                        stream,
                        bytes: buf[..n].to_vec(),
                    };
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}
