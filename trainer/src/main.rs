use std::{env, io, process::ExitCode};

use log::error;
use trainer::{Config, ConfigErr};

fn main() -> ExitCode {
    env_logger::init();

    let config = match Config::try_parse_from(env::args_os()) {
        Ok(config) => config,
        Err(ConfigErr::Cli(e)) => e.exit(),
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match trainer::run(&config, &mut io::stdout().lock()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
