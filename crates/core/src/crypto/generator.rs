//! Key generator backends
//!
//! A generator produces one raw, still-masked key frame per call. The
//! external backend runs a separate program; the native backend builds the
//! same frame in process.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::constants::frame::{DEFAULT_MASK, FRAME_LEN, SEPARATOR};
use crate::constants::generator::{
    DEFAULT_TIMEOUT, EXIT_POLL_INTERVAL, FALLBACK_PATH, MAX_OUTPUT_LEN, PROGRAM_NAME,
};
use crate::crypto::keys::apply_mask;
use crate::error::{GeneratorFailure, ProvisionError};

/// Source of raw key frames
pub trait KeyGenerator: Send + Sync {
    /// Produce one raw frame, exactly as the generator emitted it.
    fn generate(&self) -> Result<Vec<u8>, ProvisionError>;

    /// Short label used in logs
    fn describe(&self) -> String {
        "custom generator".to_string()
    }
}

impl<F> KeyGenerator for F
where
    F: Fn() -> Result<Vec<u8>, ProvisionError> + Send + Sync,
{
    fn generate(&self) -> Result<Vec<u8>, ProvisionError> {
        self()
    }
}

/// Runs an external key generator program and captures its combined output
#[derive(Debug, Clone)]
pub struct ExternalGenerator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Generator that lives next to the running executable.
    ///
    /// Falls back to a path relative to the working directory when the
    /// executable's location is unknown.
    pub fn colocated() -> Self {
        let program = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(PROGRAM_NAME)))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_PATH));
        Self::new(program)
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn run(&self) -> Result<Vec<u8>, ProvisionError> {
        // One pipe shared by stdout and stderr keeps the two streams in write order.
        let (reader, writer) = std::io::pipe().map_err(GeneratorFailure::Io)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(writer.try_clone().map_err(GeneratorFailure::Io)?)
            .stderr(writer);

        let spawned = command.spawn();
        // The command still holds the write ends; reads only see EOF once they are closed.
        drop(command);

        let mut child = spawned.map_err(|source| ProvisionError::SpawnFailed {
            program: self.program.clone(),
            source,
        })?;
        debug!("Spawned key generator {} (pid {})", self.program.display(), child.id());

        let deadline = Instant::now() + self.timeout;

        // The reader owns only the read end and at most MAX_OUTPUT_LEN + 1 bytes.
        // If a grandchild keeps the pipe open after a timeout, the thread stays
        // parked until that process closes it; nothing waits on it.
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut output = Vec::new();
            let result = reader
                .take(MAX_OUTPUT_LEN as u64 + 1)
                .read_to_end(&mut output)
                .map(|_| output);
            let _ = tx.send(result);
        });

        let wait = deadline.saturating_duration_since(Instant::now());
        let mut output = match rx.recv_timeout(wait) {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                reap(&mut child);
                return Err(GeneratorFailure::Io(e).into());
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(self.expire(&mut child));
            }
            Err(RecvTimeoutError::Disconnected) => {
                reap(&mut child);
                return Err(GeneratorFailure::Io(std::io::Error::other("output reader exited")).into());
            }
        };

        if output.len() > MAX_OUTPUT_LEN {
            warn!(
                "Key generator {} wrote more than {} bytes, killing it",
                self.program.display(),
                MAX_OUTPUT_LEN
            );
            reap(&mut child);
            let actual = output.len();
            output.zeroize();
            return Err(ProvisionError::UnexpectedLength {
                expected: FRAME_LEN,
                actual,
            });
        }

        // Output can end before the process does; the deadline covers both.
        let status = loop {
            match child.try_wait().map_err(GeneratorFailure::Io)? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    output.zeroize();
                    return Err(self.expire(&mut child));
                }
                None => thread::sleep(EXIT_POLL_INTERVAL),
            }
        };

        if !status.success() {
            output.zeroize();
            return Err(GeneratorFailure::Exit(status).into());
        }

        debug!("Key generator produced {} bytes", output.len());
        Ok(output)
    }

    fn expire(&self, child: &mut Child) -> ProvisionError {
        warn!(
            "Key generator {} did not finish within {:?}, killing it",
            self.program.display(),
            self.timeout
        );
        reap(child);
        GeneratorFailure::TimedOut(self.timeout).into()
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl Default for ExternalGenerator {
    fn default() -> Self {
        Self::colocated()
    }
}

impl KeyGenerator for ExternalGenerator {
    fn generate(&self) -> Result<Vec<u8>, ProvisionError> {
        self.run()
    }

    fn describe(&self) -> String {
        format!("external generator {}", self.program.display())
    }
}

/// Generates an Ed25519 keypair in process and emits it as a masked frame
#[derive(Debug, Clone, Copy)]
pub struct NativeGenerator {
    mask: u8,
}

impl NativeGenerator {
    pub fn new(mask: u8) -> Self {
        Self { mask }
    }
}

impl Default for NativeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MASK)
    }
}

impl KeyGenerator for NativeGenerator {
    fn generate(&self) -> Result<Vec<u8>, ProvisionError> {
        let signing_key = SigningKey::generate(&mut OsRng);

        let mut keypair_bytes = signing_key.to_keypair_bytes();
        let mut private_hex = hex::encode(keypair_bytes);
        keypair_bytes.zeroize();

        let mut frame = Vec::with_capacity(FRAME_LEN);
        frame.extend_from_slice(hex::encode(signing_key.verifying_key().to_bytes()).as_bytes());
        frame.push(SEPARATOR);
        frame.extend_from_slice(private_hex.as_bytes());
        private_hex.zeroize();

        apply_mask(&mut frame, self.mask);
        Ok(frame)
    }

    fn describe(&self) -> String {
        "native ed25519 generator".to_string()
    }
}
