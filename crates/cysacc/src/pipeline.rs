//! Two-stage streaming pipeline: `producer | filter > output`
//!
//! The producer's stdout is not handed to the filter directly. Two pump
//! threads move it through a bounded channel of fixed-size chunks:
//!
//! ```text
//! producer.stdout --read--> [chunk; N] --write--> filter.stdin
//!                                                 filter.stdout --> output.partial
//! ```
//!
//! A full channel blocks the reader, which stops draining the producer's
//! pipe, so memory stays bounded at `N * CHUNK_SIZE` whatever the output size.
//! The supervising thread polls both children for exit, timeout and
//! cancellation. A completed run is reported only after both children are
//! reaped and both pumps joined; a timeout or cancellation returns as soon as
//! the children are killed. The output is written next to its final name and
//! renamed into place on success; every failure path removes it.

use crate::error::{Failure, PipelineError, Stage};
use crate::layout::partial_path;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Bytes moved per chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Default channel capacity in chunks.
pub const DEFAULT_BUFFER_CHUNKS: usize = 16;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cooperative cancellation shared between a controller and running jobs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a successful pipeline moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineStats {
    /// Uncompressed bytes read from the producer
    pub bytes: u64,
    pub elapsed: Duration,
}

/// One `producer | filter > output` execution.
pub struct StreamingPipeline {
    producer: Command,
    producer_name: String,
    producer_input: Vec<u8>,
    producer_stderr: Option<PathBuf>,
    filter: Command,
    filter_name: String,
    buffer_chunks: usize,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl StreamingPipeline {
    /// `producer` and `filter` are fully configured apart from their stdio.
    pub fn new(producer: Command, filter: Command) -> Self {
        let producer_name = producer.get_program().to_string_lossy().into_owned();
        let filter_name = filter.get_program().to_string_lossy().into_owned();
        Self {
            producer,
            producer_name,
            producer_input: Vec::new(),
            producer_stderr: None,
            filter,
            filter_name,
            buffer_chunks: DEFAULT_BUFFER_CHUNKS,
            timeout: None,
            cancel: None,
        }
    }

    /// Bytes written to the producer's stdin before it is closed.
    pub fn producer_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.producer_input = input.into();
        self
    }

    /// Redirect the producer's stderr into a file.
    pub fn producer_stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.producer_stderr = Some(path.into());
        self
    }

    /// Channel capacity in chunks (at least 1).
    pub fn buffer_chunks(mut self, chunks: usize) -> Self {
        self.buffer_chunks = chunks.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Run to completion, leaving the filter's output at `output`.
    pub fn run(self, output: &Path) -> Result<PipelineStats, PipelineError> {
        let partial = partial_path(output);
        let result = self.run_into(&partial);
        match result {
            Ok(stats) => {
                fs::rename(&partial, output).map_err(|e| {
                    let _ = fs::remove_file(&partial);
                    PipelineError::new(Stage::Output, Failure::Io(e)).after_launch()
                })?;
                Ok(stats)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&partial) {
                    if rm.kind() != io::ErrorKind::NotFound {
                        log::warn!("could not remove {}: {}", partial.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    fn run_into(self, partial: &Path) -> Result<PipelineStats, PipelineError> {
        let StreamingPipeline {
            mut producer,
            producer_name,
            producer_input,
            producer_stderr,
            mut filter,
            filter_name,
            buffer_chunks,
            timeout,
            cancel,
        } = self;
        let started = Instant::now();

        if cancel.as_ref().map_or(false, |c| c.is_cancelled()) {
            return Err(PipelineError::new(Stage::Supervisor, Failure::Cancelled));
        }

        let out_file = File::create(partial).map_err(|e| PipelineError::new(Stage::Output, Failure::Io(e)))?;
        let stderr = match &producer_stderr {
            Some(path) => Stdio::from(
                File::create(path).map_err(|e| PipelineError::new(Stage::Output, Failure::Io(e)))?,
            ),
            None => Stdio::inherit(),
        };

        let mut producer_child = producer
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .spawn()
            .map_err(|source| {
                PipelineError::new(
                    Stage::Distance,
                    Failure::Launch {
                        program: producer_name.clone(),
                        source,
                    },
                )
            })?;
        drop(producer);

        let spawned_filter = filter
            .stdin(Stdio::piped())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::inherit())
            .spawn();
        // The command keeps its copy of the output descriptor until dropped.
        drop(filter);
        let mut filter_child = match spawned_filter {
            Ok(child) => child,
            Err(source) => {
                reap(&mut producer_child);
                let failure = Failure::Launch {
                    program: filter_name,
                    source,
                };
                return Err(PipelineError::new(Stage::Compress, failure).after_launch());
            }
        };

        if let Some(mut stdin) = producer_child.stdin.take() {
            // A short script that fits in the pipe buffer; a producer that
            // exits without reading it is judged by its exit status.
            if let Err(e) = stdin.write_all(&producer_input) {
                log::debug!("{}: stdin closed early: {}", producer_name, e);
            }
        }

        let (reader, writer) = match (producer_child.stdout.take(), filter_child.stdin.take()) {
            (Some(from), Some(to)) => spawn_pumps(from, to, buffer_chunks),
            _ => {
                reap(&mut producer_child);
                reap(&mut filter_child);
                let failure = Failure::Io(io::Error::new(io::ErrorKind::BrokenPipe, "child pipes unavailable"));
                return Err(PipelineError::new(Stage::Pump, failure).after_launch());
            }
        };

        let supervised = supervise(&mut producer_child, &mut filter_child, started, timeout, cancel.as_ref());
        let (producer_status, filter_status) = match supervised {
            Ok(statuses) => statuses,
            Err(e) => {
                // A descendant of a killed child may still hold the producer's
                // pipe open. The pumps are detached and end once it exits or
                // writes into the dead filter.
                drop((reader, writer));
                return Err(e.after_launch());
            }
        };

        // Completion barrier: both pumps finish before a result is reported.
        let read_result = join_pump(reader);
        let write_result = join_pump(writer);

        let stage_failure = if !filter_status.success() {
            Some(PipelineError::new(
                Stage::Compress,
                Failure::Exit {
                    program: filter_name,
                    status: filter_status.to_string(),
                },
            ))
        } else if !producer_status.success() {
            Some(PipelineError::new(
                Stage::Distance,
                Failure::Exit {
                    program: producer_name,
                    status: producer_status.to_string(),
                },
            ))
        } else {
            None
        };
        if let Some(err) = stage_failure {
            return Err(err.after_launch());
        }
        let pump_failure = |e| PipelineError::new(Stage::Pump, Failure::Io(e)).after_launch();
        let bytes = read_result.map_err(pump_failure)?;
        write_result.map_err(pump_failure)?;

        Ok(PipelineStats {
            bytes,
            elapsed: started.elapsed(),
        })
    }
}

fn spawn_pumps(
    from: ChildStdout,
    to: ChildStdin,
    capacity: usize,
) -> (JoinHandle<io::Result<u64>>, JoinHandle<io::Result<u64>>) {
    let (tx, rx) = sync_channel::<Vec<u8>>(capacity);
    let reader = thread::spawn(move || pump_read(from, tx));
    let writer = thread::spawn(move || pump_write(rx, to));
    (reader, writer)
}

fn pump_read(mut from: ChildStdout, tx: SyncSender<Vec<u8>>) -> io::Result<u64> {
    let mut total = 0u64;
    loop {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let n = match from.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        chunk.truncate(n);
        total += n as u64;
        if tx.send(chunk).is_err() {
            // Writer gave up; dropping `from` makes the producer see a broken pipe.
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "filter stopped accepting input"));
        }
    }
}

fn pump_write(rx: Receiver<Vec<u8>>, mut to: ChildStdin) -> io::Result<u64> {
    let mut total = 0u64;
    for chunk in rx {
        to.write_all(&chunk)?;
        total += chunk.len() as u64;
    }
    to.flush()?;
    // Dropping `to` closes the filter's stdin so it can finish.
    Ok(total)
}

fn join_pump(handle: JoinHandle<io::Result<u64>>) -> io::Result<u64> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "pump thread panicked")))
}

/// Wait for both children, enforcing timeout and cancellation.
fn supervise(
    producer: &mut Child,
    filter: &mut Child,
    started: Instant,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<(ExitStatus, ExitStatus), PipelineError> {
    let mut producer_status = None;
    let mut filter_status = None;

    loop {
        if producer_status.is_none() {
            producer_status = producer.try_wait().map_err(|e| {
                reap(producer);
                reap(filter);
                PipelineError::new(Stage::Distance, Failure::Io(e))
            })?;
        }
        if filter_status.is_none() {
            filter_status = filter.try_wait().map_err(|e| {
                reap(producer);
                reap(filter);
                PipelineError::new(Stage::Compress, Failure::Io(e))
            })?;
        }
        if let (Some(p), Some(f)) = (producer_status, filter_status) {
            return Ok((p, f));
        }

        if cancel.map_or(false, |c| c.is_cancelled()) {
            log::warn!("cancelling pipeline");
            reap(producer);
            reap(filter);
            return Err(PipelineError::new(Stage::Supervisor, Failure::Cancelled));
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                log::warn!("pipeline exceeded {:?}, killing", limit);
                reap(producer);
                reap(filter);
                return Err(PipelineError::new(Stage::Supervisor, Failure::Timeout(limit)));
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill and wait; harmless on a child that already exited.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
