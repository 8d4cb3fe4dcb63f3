use std::net::SocketAddr;

use ipclab_worker::{DemoConfig, TransportKind};

use crate::cmd::{converse, parse_duration, SocketsArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub fn run(args: SocketsArgs, format: OutputFormat) -> CliResult<i32> {
    let config = socket_config(&args)?;
    tracing::debug!(addr = %config.socket.addr, "socket conversation configured");
    converse(TransportKind::Sockets, config, &args.messages, format)
}

fn socket_config(args: &SocketsArgs) -> CliResult<DemoConfig> {
    let mut config = DemoConfig::default();
    config.socket.addr = SocketAddr::new(args.host, args.port);
    config.socket.ready_delay = parse_duration(&args.ready_delay)?;
    args.supervisor.apply(&mut config)?;
    Ok(config)
}
