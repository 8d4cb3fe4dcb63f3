use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_transports, OutputFormat};

pub fn run(format: OutputFormat) -> CliResult<i32> {
    print_transports(format);
    Ok(SUCCESS)
}
