use ipclab_worker::{DemoConfig, TransportKind};

use crate::cmd::{converse, PipesArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub fn run(args: PipesArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = DemoConfig::default();
    args.supervisor.apply(&mut config)?;
    converse(TransportKind::Pipes, config, &args.messages, format)
}
