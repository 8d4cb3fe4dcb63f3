//! Conversation supervisor.
//!
//! Builds one transport, runs its two workers on named OS threads and joins
//! them. Every run gets its own [`Cancellation`], dropped with the run's
//! transport handles once both workers are joined.
//!
//! A worker that fails or panics forces the run's cancellation at once, so a
//! peer blocked in `accept`, a read or a turn wait is released. An external
//! shutdown request is cooperative first; after the grace period the
//! remaining handles are forced closed.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use ipclab_event::{EventEmitter, EventSink, Outcome, WorkerIdentity};
use ipclab_transport::{FrameConfig, PipeChannel, SharedBuffer, WorkerId};
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::config::{DemoConfig, ShmMode, DEFAULT_MESSAGE};
use crate::error::{Result, WorkerError};
use crate::{pipes, shared_memory, sockets};

/// The three demonstrated transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Pipes,
    Sockets,
    SharedMemory,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [
        TransportKind::Pipes,
        TransportKind::Sockets,
        TransportKind::SharedMemory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Pipes => "pipes",
            TransportKind::Sockets => "sockets",
            TransportKind::SharedMemory => "shm",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TransportKind::Pipes => "framed duplex pipe, ping-pong until FIM",
            TransportKind::Sockets => "TCP echo on loopback, one connection",
            TransportKind::SharedMemory => "1024-byte shared region with lock and turn flag",
        }
    }

    /// Lane labels of worker 0 and worker 1.
    pub fn labels(self, mode: ShmMode) -> [&'static str; 2] {
        match self {
            TransportKind::Pipes => ["PARENT", "CHILD"],
            TransportKind::Sockets => ["SERVER", "CLIENT"],
            TransportKind::SharedMemory => mode.labels(),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How one worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub label: String,
    pub outcome: Outcome,
}

/// Aggregate result of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationResult {
    pub transport: TransportKind,
    pub workers: Vec<WorkerReport>,
    /// A shutdown was requested while the workers were running.
    pub interrupted: bool,
}

impl ConversationResult {
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.workers.iter().all(|w| w.outcome.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| !w.outcome.is_success())
    }
}

/// Requests an orderly stop of a running conversation from another thread,
/// e.g. a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    interrupted: Arc<AtomicBool>,
    active: Arc<Mutex<Option<Cancellation>>>,
}

impl ShutdownHandle {
    /// Mark the supervisor interrupted and cancel the running conversation,
    /// if any.
    pub fn request(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(cancel) = self.slot().as_ref() {
            cancel.request();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Route later requests to `cancel`. An earlier request cancels it at once.
    fn attach(&self, cancel: &Cancellation) {
        let mut slot = self.slot();
        if self.is_requested() {
            cancel.request();
        }
        *slot = Some(cancel.clone());
    }

    fn detach(&self) {
        self.slot().take();
    }

    #[cfg(test)]
    fn is_attached(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Cancellation>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Task = Box<dyn FnOnce() -> Outcome + Send + 'static>;

struct Running {
    label: String,
    handle: Option<JoinHandle<Outcome>>,
    outcome: Option<Outcome>,
}

/// Runs conversations and reports their outcome.
///
/// A supervisor that has been shut down cancels every later run immediately.
pub struct Supervisor {
    config: DemoConfig,
    sink: Arc<dyn EventSink>,
    shutdown: ShutdownHandle,
}

impl Supervisor {
    pub fn new(config: DemoConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run one conversation over `kind`.
    ///
    /// `messages` are the requests for pipes and sockets, or the payload for
    /// shared-memory message mode (first entry). Empty means the defaults.
    pub fn run(&self, kind: TransportKind, messages: &[String]) -> Result<ConversationResult> {
        info!(transport = %kind, "starting conversation");
        let cancel = Cancellation::new();
        self.shutdown.attach(&cancel);
        let result = self.converse(kind, messages, &cancel);
        self.shutdown.detach();
        let result = result?;
        info!(
            transport = %kind,
            success = result.is_success(),
            interrupted = result.interrupted,
            "conversation finished"
        );
        Ok(result)
    }

    fn converse(
        &self,
        kind: TransportKind,
        messages: &[String],
        cancel: &Cancellation,
    ) -> Result<ConversationResult> {
        let [first, second] = kind.labels(self.config.shm.mode);
        let [task0, task1] = match kind {
            TransportKind::Pipes => self.pipe_tasks(messages, cancel)?,
            TransportKind::Sockets => self.socket_tasks(messages, cancel),
            TransportKind::SharedMemory => self.shm_tasks(messages, cancel)?,
        };
        self.supervise(kind, [(first, task0), (second, task1)], cancel)
    }

    fn emitter(&self, label: &str) -> EventEmitter {
        EventEmitter::new(WorkerIdentity::new(label), Arc::clone(&self.sink))
    }

    fn pipe_tasks(&self, messages: &[String], cancel: &Cancellation) -> Result<[Task; 2]> {
        let [parent_label, child_label] = TransportKind::Pipes.labels(self.config.shm.mode);
        let frame = FrameConfig {
            read_timeout: self.config.pipe.read_timeout,
            ..FrameConfig::default()
        };
        let (parent_end, child_end) = PipeChannel::create_with_config(frame)?;
        for end in [&parent_end, &child_end] {
            let kill = end.kill_switch()?;
            cancel.register(move || kill.fire());
        }

        let requests = if messages.is_empty() {
            pipes::DEFAULT_REQUESTS.iter().map(|r| r.to_string()).collect()
        } else {
            messages.to_vec()
        };
        let parent = {
            let (emitter, cancel) = (self.emitter(parent_label), cancel.clone());
            Box::new(move || pipes::run_initiator(parent_end, &requests, emitter, &cancel)) as Task
        };
        let child = {
            let (emitter, cancel) = (self.emitter(child_label), cancel.clone());
            Box::new(move || pipes::run_responder(child_end, emitter, &cancel)) as Task
        };
        Ok([parent, child])
    }

    fn socket_tasks(&self, messages: &[String], cancel: &Cancellation) -> [Task; 2] {
        let [server_label, client_label] = TransportKind::Sockets.labels(self.config.shm.mode);
        let requests = if messages.is_empty() {
            vec![DEFAULT_MESSAGE.to_string()]
        } else {
            messages.to_vec()
        };
        let server = {
            let config = self.config.socket.clone();
            let (emitter, cancel) = (self.emitter(server_label), cancel.clone());
            Box::new(move || sockets::run_server(&config, emitter, &cancel)) as Task
        };
        let client = {
            let config = self.config.socket.clone();
            let (emitter, cancel) = (self.emitter(client_label), cancel.clone());
            Box::new(move || sockets::run_client(&config, &requests, emitter, &cancel)) as Task
        };
        [server, client]
    }

    fn shm_tasks(&self, messages: &[String], cancel: &Cancellation) -> Result<[Task; 2]> {
        let config = self.config.shm.clone();
        let [label0, label1] = config.mode.labels();
        let buffer = Arc::new(SharedBuffer::new()?);
        {
            let buffer = Arc::clone(&buffer);
            cancel.register(move || buffer.wake_all());
        }

        let (e0, e1) = (self.emitter(label0), self.emitter(label1));
        let (c0, c1) = (cancel.clone(), cancel.clone());
        let (b0, b1) = (Arc::clone(&buffer), buffer);
        let mode = config.mode;
        let (cfg0, cfg1) = (config.clone(), config);

        let tasks = match mode {
            ShmMode::Counter => {
                [
                    Box::new(move || {
                        shared_memory::run_counter_worker(WorkerId::Zero, &b0, &cfg0, e0, &c0)
                    }) as Task,
                    Box::new(move || {
                        shared_memory::run_counter_worker(WorkerId::One, &b1, &cfg1, e1, &c1)
                    }) as Task,
                ]
            }
            ShmMode::Message => {
                let message = messages
                    .first()
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
                [
                    Box::new(move || shared_memory::run_writer(&b0, &message, &cfg0, e0, &c0)) as Task,
                    Box::new(move || shared_memory::run_reader(&b1, &cfg1, e1, &c1)) as Task,
                ]
            }
        };
        Ok(tasks)
    }

    fn supervise(
        &self,
        kind: TransportKind,
        tasks: [(&str, Task); 2],
        cancel: &Cancellation,
    ) -> Result<ConversationResult> {
        let mut running = Vec::with_capacity(tasks.len());
        for (label, task) in tasks {
            let handle = thread::Builder::new()
                .name(thread_name(label))
                .spawn(task)
                .map_err(|source| {
                    // The first worker may already be blocked on its peer.
                    cancel.force();
                    WorkerError::Spawn {
                        label: label.to_string(),
                        source,
                    }
                })?;
            debug!(label, "worker spawned");
            running.push(Running {
                label: label.to_string(),
                handle: Some(handle),
                outcome: None,
            });
        }

        let grace = self.config.supervisor.grace;
        let mut cancel_seen: Option<Instant> = None;
        let mut worker_failed = false;
        loop {
            for worker in running.iter_mut() {
                let finished = worker.handle.as_ref().is_some_and(|h| h.is_finished());
                if !finished {
                    continue;
                }
                let Some(handle) = worker.handle.take() else {
                    continue;
                };
                let outcome = match handle.join() {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        warn!(label = %worker.label, %reason, "worker panicked");
                        self.emitter(&worker.label)
                            .fail("panicked", format!("Worker terminated abnormally: {reason}."))
                    }
                };
                if !outcome.is_success() {
                    worker_failed = true;
                }
                worker.outcome = Some(outcome);
            }
            if running.iter().all(|w| w.handle.is_none()) {
                break;
            }

            // The survivor may be blocked on the failed worker forever.
            if worker_failed && !cancel.is_forced() {
                warn!(transport = %kind, "worker failed; releasing its peer");
                cancel.force();
            }

            if cancel.is_requested() && !cancel.is_forced() {
                let since = *cancel_seen.get_or_insert_with(Instant::now);
                if since.elapsed() >= grace {
                    warn!(transport = %kind, ?grace, "grace period elapsed; forcing shutdown");
                    cancel.force();
                }
            }
            thread::sleep(self.config.supervisor.poll_interval);
        }

        let workers = running
            .into_iter()
            .filter_map(|w| {
                w.outcome.map(|outcome| WorkerReport {
                    label: w.label,
                    outcome,
                })
            })
            .collect();
        Ok(ConversationResult {
            transport: kind,
            workers,
            interrupted: self.shutdown.is_requested(),
        })
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

fn thread_name(label: &str) -> String {
    format!("ipclab-{}", label.to_ascii_lowercase().replace(' ', "-"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
