use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use ipclab_event::{EventSink, StdoutSink};
use ipclab_transport::{WaitStrategy, DEFAULT_PORT};
use ipclab_worker::{
    ConversationResult, DemoConfig, ShmMode, ShutdownHandle, Supervisor, TransportKind,
};

use crate::exit::{conversation_code, worker_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod pipes;
pub mod shm;
pub mod sockets;
pub mod transports;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ping-pong over a duplex pipe, ending with the FIM sentinel.
    Pipes(PipesArgs),
    /// TCP echo server and client on loopback.
    Sockets(SocketsArgs),
    /// Turn-passing over a shared-memory buffer.
    Shm(ShmArgs),
    /// List the available transports and their worker labels.
    Transports,
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Pipes(args) => pipes::run(args, format),
        Command::Sockets(args) => sockets::run(args, format),
        Command::Shm(args) => shm::run(args, format),
        Command::Transports => transports::run(format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct SupervisorArgs {
    /// Time between Ctrl-C and forced shutdown of the workers (e.g. 2s, 500ms).
    #[arg(long, env = "IPCLAB_GRACE", default_value = "2s")]
    pub grace: String,
}

#[derive(Args, Debug)]
pub struct PipesArgs {
    /// Requests sent by the parent. Default: PING 1, PING 2, PING 3.
    pub messages: Vec<String>,
    #[command(flatten)]
    pub supervisor: SupervisorArgs,
}

#[derive(Args, Debug)]
pub struct SocketsArgs {
    /// Requests sent by the client. Default: one greeting.
    pub messages: Vec<String>,
    /// Address the server binds and the client connects to.
    #[arg(long, env = "IPCLAB_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,
    /// TCP port.
    #[arg(long, env = "IPCLAB_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Client delay before connecting (e.g. 1s, 200ms).
    #[arg(long, env = "IPCLAB_READY_DELAY", default_value = "1s")]
    pub ready_delay: String,
    #[command(flatten)]
    pub supervisor: SupervisorArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShmModeArg {
    Counter,
    Message,
}

impl From<ShmModeArg> for ShmMode {
    fn from(mode: ShmModeArg) -> Self {
        match mode {
            ShmModeArg::Counter => ShmMode::Counter,
            ShmModeArg::Message => ShmMode::Message,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WaitArg {
    Busy,
    Condvar,
}

impl From<WaitArg> for WaitStrategy {
    fn from(wait: WaitArg) -> Self {
        match wait {
            WaitArg::Busy => WaitStrategy::Busy,
            WaitArg::Condvar => WaitStrategy::Condvar,
        }
    }
}

#[derive(Args, Debug)]
pub struct ShmArgs {
    /// Message written by the writer in message mode.
    pub message: Option<String>,
    /// What the two workers exchange.
    #[arg(long, env = "IPCLAB_MODE", value_enum, default_value = "counter")]
    pub mode: ShmModeArg,
    /// How a worker waits for its turn.
    #[arg(long, env = "IPCLAB_WAIT", value_enum, default_value = "busy")]
    pub wait: WaitArg,
    /// Exchanges per worker in counter mode.
    #[arg(long, env = "IPCLAB_ROUNDS", default_value_t = 5)]
    pub rounds: u32,
    /// Sleep between turn checks (e.g. 50ms).
    #[arg(long, env = "IPCLAB_POLL_INTERVAL", default_value = "50ms")]
    pub poll_interval: String,
    /// Give up waiting for a turn after this long (e.g. 30s).
    #[arg(long, env = "IPCLAB_WAIT_TIMEOUT", default_value = "30s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub supervisor: SupervisorArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

impl SupervisorArgs {
    pub fn apply(&self, config: &mut DemoConfig) -> CliResult<()> {
        config.supervisor.grace = parse_duration(&self.grace)?;
        Ok(())
    }
}

/// Run one conversation with events on stdout and Ctrl-C wired to the
/// supervisor's shutdown handle.
pub fn converse(
    kind: TransportKind,
    config: DemoConfig,
    messages: &[String],
    format: OutputFormat,
) -> CliResult<i32> {
    let sink: Arc<dyn EventSink> = Arc::new(StdoutSink::new(format.line_format()));
    let supervisor = Supervisor::new(config, sink);
    install_ctrlc_handler(supervisor.shutdown_handle())?;

    let result = supervisor
        .run(kind, messages)
        .map_err(|err| worker_error(&format!("{kind} setup failed"), err))?;
    report(&result);
    Ok(conversation_code(&result))
}

fn report(result: &ConversationResult) {
    for failed in result.failures() {
        tracing::warn!(
            transport = %result.transport,
            label = %failed.label,
            outcome = ?failed.outcome,
            "worker reported failure"
        );
    }
}

fn install_ctrlc_handler(shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.request();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Parse `500ms`, `2s` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
