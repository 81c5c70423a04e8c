//! Process-isolated stage hosting over framed stdio.
//!
//! A sidecar is a child process (by default the current executable,
//! re-entered with [`WORKER_ENV_VAR`] set) that builds a stage from a
//! [`StageSpec`] and serves calls on it. Messages are postcard-encoded and
//! prefixed with a little-endian `u32` length. stdout carries protocol
//! frames only, so the child logs to stderr.
//!
//! Session:
//!
//! ```text
//! client                      host
//!   Hello{version}      ->
//!                       <-    HelloOk{version}
//!   Build{factory,args} ->
//!                       <-    Built{name} | Err
//!   Start               ->
//!                       <-    Ok | Err
//!   Call{tape}          ->    (repeated)
//!                       <-    Tape{tape} | Err
//!   Shutdown            ->
//!                       <-    Ok
//! ```
//!
//! Construction is acknowledged before `launch` returns, so a stage that
//! cannot be built surfaces as a start-time error instead of a silent stall.

use crate::backend::registry::{StageRegistry, StageSpec};
use crate::config::{DEFAULT_HANDSHAKE_TIMEOUT_MS, WORKER_ENV_VAR};
use crate::error::{FrameChainError, Result};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::tape::{Artifact, Tape};
use crossbeam_channel::{bounded, RecvTimeoutError};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single frame; a few uncompressed 4K frames fit.
const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

// ── Wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Hello { version: u32 },
    Build { factory: String, args_json: String },
    Start,
    Call { tape: WireTape },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    HelloOk { version: u32 },
    Built { name: String },
    Ok,
    Tape { tape: WireTape },
    Err { message: String },
}

/// Serialisable artifact. Images travel as raw RGB8 rows.
#[derive(Clone, Serialize, Deserialize)]
pub enum WireArtifact {
    Image {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    Text(String),
    Absent,
}

impl fmt::Debug for WireArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireArtifact::Image { width, height, .. } => write!(f, "Image({}x{})", width, height),
            WireArtifact::Text(text) => write!(f, "Text({:?})", text),
            WireArtifact::Absent => write!(f, "Absent"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireTape {
    pub entries: Vec<WireArtifact>,
}

impl From<&Artifact> for WireArtifact {
    fn from(artifact: &Artifact) -> Self {
        match artifact {
            Artifact::Image(frame) => WireArtifact::Image {
                width: frame.width(),
                height: frame.height(),
                pixels: frame.as_raw().clone(),
            },
            Artifact::Text(text) => WireArtifact::Text(text.to_string()),
            Artifact::Absent => WireArtifact::Absent,
        }
    }
}

impl TryFrom<WireArtifact> for Artifact {
    type Error = FrameChainError;

    fn try_from(wire: WireArtifact) -> Result<Self> {
        Ok(match wire {
            WireArtifact::Image {
                width,
                height,
                pixels,
            } => {
                let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
                    FrameChainError::Protocol(format!(
                        "Image payload does not match {}x{}",
                        width, height
                    ))
                })?;
                Artifact::image(image)
            }
            WireArtifact::Text(text) => Artifact::text(text),
            WireArtifact::Absent => Artifact::Absent,
        })
    }
}

impl From<&Tape> for WireTape {
    fn from(tape: &Tape) -> Self {
        Self {
            entries: tape.iter().map(WireArtifact::from).collect(),
        }
    }
}

impl TryFrom<WireTape> for Tape {
    type Error = FrameChainError;

    fn try_from(wire: WireTape) -> Result<Self> {
        wire.entries.into_iter().map(Artifact::try_from).collect()
    }
}

// ── Framing ──

pub fn write_frame<W: Write, T: Serialize>(mut writer: W, message: &T) -> Result<()> {
    let payload = postcard::to_stdvec(message)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FrameChainError::Protocol(format!(
            "Frame of {} bytes exceeds limit",
            payload.len()
        )));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(mut reader: R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(FrameChainError::Protocol(format!(
            "Frame of {} bytes exceeds limit",
            len
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(postcard::from_bytes(&payload)?)
}

fn is_eof(err: &FrameChainError) -> bool {
    matches!(err, FrameChainError::Io(e) if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe))
}

// ── Client ──

/// How to launch a sidecar.
#[derive(Debug, Clone)]
pub struct SidecarOptions {
    /// Executable to run; the current executable when `None`.
    pub program: Option<PathBuf>,
    /// Extra arguments passed to the executable.
    pub args: Vec<String>,
    /// Time allowed for launch, construction and start.
    pub handshake_timeout: Duration,
}

impl Default for SidecarOptions {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        }
    }
}

impl SidecarOptions {
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Connection to a running sidecar hosting one stage.
pub struct SidecarClient {
    child: Arc<Mutex<Child>>,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stage_name: String,
    pid: u32,
}

impl SidecarClient {
    /// Launch a sidecar, build `spec` inside it and start the stage.
    pub fn launch(options: &SidecarOptions, spec: &StageSpec) -> Result<Self> {
        let program = match &options.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };

        let mut cmd = Command::new(&program);
        cmd.args(&options.args)
            .env(WORKER_ENV_VAR, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| {
            FrameChainError::Isolation(format!(
                "Failed to launch worker '{}': {}",
                program.display(),
                e
            ))
        })?;
        let pid = child.id();
        tracing::debug!("Launched worker pid {} for '{}'", pid, spec.factory);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FrameChainError::Isolation("Failed to capture worker stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FrameChainError::Isolation("Failed to capture worker stdout".into()))?;

        let mut client = Self {
            child: Arc::new(Mutex::new(child)),
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            stage_name: spec.factory.clone(),
            pid,
        };

        // Kill the child if the handshake stalls; the pending read then
        // fails with EOF.
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let watchdog_child = client.child.clone();
        let timeout = options.handshake_timeout;
        let watchdog = std::thread::Builder::new()
            .name("sidecar-handshake".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
                    if let Ok(mut child) = watchdog_child.lock() {
                        let _ = child.kill();
                    }
                    return true;
                }
                false
            })?;

        let result = client.handshake(spec);
        drop(cancel_tx);
        let timed_out = watchdog.join().unwrap_or(false);

        match result {
            Ok(name) => {
                tracing::info!("Worker for '{}' ready", name);
                client.stage_name = name;
                Ok(client)
            }
            Err(_) if timed_out => Err(FrameChainError::Isolation(format!(
                "Worker for '{}' did not complete its handshake within {:?}",
                spec.factory, timeout
            ))),
            Err(e) => Err(e.with_context(format!("Worker for '{}' failed to start", spec.factory))),
        }
    }

    fn handshake(&mut self, spec: &StageSpec) -> Result<String> {
        match self.request(&Request::Hello {
            version: PROTOCOL_VERSION,
        })? {
            Response::HelloOk { version } if version == PROTOCOL_VERSION => {}
            Response::HelloOk { version } => {
                return Err(FrameChainError::Protocol(format!(
                    "Protocol version mismatch: local={}, remote={}",
                    PROTOCOL_VERSION, version
                )));
            }
            other => return Err(unexpected("Hello", &other)),
        }

        let name = match self.request(&Request::Build {
            factory: spec.factory.clone(),
            args_json: serde_json::to_string(&spec.args)?,
        })? {
            Response::Built { name } => name,
            other => return Err(unexpected("Build", &other)),
        };

        self.request_ok(&Request::Start)?;
        Ok(name)
    }

    fn request(&mut self, request: &Request) -> Result<Response> {
        write_frame(&mut self.stdin, request)?;
        let response: Response = read_frame(&mut self.stdout)?;
        if let Response::Err { message } = response {
            return Err(FrameChainError::Isolation(message));
        }
        Ok(response)
    }

    fn request_ok(&mut self, request: &Request) -> Result<()> {
        match self.request(request)? {
            Response::Ok => Ok(()),
            other => Err(unexpected("Ok", &other)),
        }
    }

    /// Name reported by the hosted stage.
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// OS process id of the sidecar.
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Run the hosted stage on `tape`.
    pub fn call(&mut self, tape: &Tape) -> Result<Tape> {
        match self.request(&Request::Call {
            tape: WireTape::from(tape),
        })? {
            Response::Tape { tape } => Tape::try_from(tape),
            other => Err(unexpected("Tape", &other)),
        }
    }

    /// Ask the sidecar to stop its stage and exit.
    pub fn shutdown(mut self) {
        if let Err(e) = self.request_ok(&Request::Shutdown) {
            tracing::debug!("Worker '{}' shutdown: {}", self.stage_name, e);
        }
    }
}

impl Drop for SidecarClient {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn unexpected(expected: &str, got: &Response) -> FrameChainError {
    FrameChainError::Protocol(format!("Expected {}, got {:?}", expected, got))
}

// ── Host ──

/// Whether this process was launched as a sidecar.
pub fn is_worker_process() -> bool {
    std::env::var_os(WORKER_ENV_VAR).is_some()
}

/// Serve the sidecar protocol on stdin/stdout until shutdown or EOF.
pub fn serve_stdio(registry: &StageRegistry) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(registry, BufReader::new(stdin.lock()), BufWriter::new(stdout.lock()))
}

/// Serve the sidecar protocol over an arbitrary byte stream pair.
pub fn serve<R: Read, W: Write>(registry: &StageRegistry, mut reader: R, mut writer: W) -> Result<()> {
    let ctx = StageContext::standalone();
    let mut stage: Option<Box<dyn Stage>> = None;

    loop {
        let request: Request = match read_frame(&mut reader) {
            Ok(request) => request,
            Err(e) if is_eof(&e) => {
                tracing::debug!("Client closed the connection");
                break;
            }
            // The payload was consumed, so the stream is still in sync.
            Err(e @ FrameChainError::Serialization(_)) => {
                write_frame(
                    &mut writer,
                    &Response::Err {
                        message: e.to_string(),
                    },
                )?;
                continue;
            }
            Err(e) => return Err(e),
        };

        let response = match request {
            Request::Hello { version } if version == PROTOCOL_VERSION => {
                Response::HelloOk { version }
            }
            Request::Hello { version } => Response::Err {
                message: format!(
                    "Protocol version mismatch: client={}, host={}",
                    version, PROTOCOL_VERSION
                ),
            },
            Request::Build { factory, args_json } => {
                let built = serde_json::from_str(&args_json)
                    .map_err(FrameChainError::from)
                    .and_then(|args| registry.build(&StageSpec { factory, args }));
                match built {
                    Ok(built) => {
                        let name = built.name().to_string();
                        tracing::info!("Built stage '{}'", name);
                        stage = Some(built);
                        Response::Built { name }
                    }
                    Err(e) => error_response(e),
                }
            }
            Request::Start => match &stage {
                Some(stage) => match stage.start(&ctx, false) {
                    Ok(()) => Response::Ok,
                    Err(e) => error_response(e),
                },
                None => no_stage(),
            },
            Request::Call { tape } => match &stage {
                Some(stage) => match Tape::try_from(tape) {
                    Ok(tape) => Response::Tape {
                        tape: WireTape::from(&stage.call(&ctx, tape)),
                    },
                    Err(e) => error_response(e),
                },
                None => no_stage(),
            },
            Request::Shutdown => {
                if let Some(stage) = stage.take() {
                    stage.stop();
                }
                write_frame(&mut writer, &Response::Ok)?;
                tracing::debug!("Worker shutting down");
                return Ok(());
            }
        };
        write_frame(&mut writer, &response)?;
    }

    if let Some(stage) = stage {
        stage.stop();
    }
    Ok(())
}

fn error_response(err: FrameChainError) -> Response {
    tracing::error!("{}", err);
    Response::Err {
        message: err.to_string(),
    }
}

fn no_stage() -> Response {
    Response::Err {
        message: "No stage has been built".to_string(),
    }
}
