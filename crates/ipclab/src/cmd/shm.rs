use ipclab_worker::{DemoConfig, ShmMode, TransportKind};

use crate::cmd::{converse, parse_duration, ShmArgs};
use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub fn run(args: ShmArgs, format: OutputFormat) -> CliResult<i32> {
    let config = shm_config(&args)?;
    let messages: Vec<String> = args.message.into_iter().collect();
    converse(TransportKind::SharedMemory, config, &messages, format)
}

fn shm_config(args: &ShmArgs) -> CliResult<DemoConfig> {
    let mut config = DemoConfig::default();
    config.shm.mode = args.mode.into();
    config.shm.rounds = args.rounds;
    config.shm.wait.strategy = args.wait.into();
    config.shm.wait.poll_interval = parse_duration(&args.poll_interval)?;
    config.shm.wait.timeout = Some(parse_duration(&args.wait_timeout)?);
    args.supervisor.apply(&mut config)?;

    if config.shm.mode == ShmMode::Counter && args.message.is_some() {
        return Err(CliError::new(
            USAGE,
            "a message is only accepted with --mode message",
        ));
    }
    Ok(config)
}
