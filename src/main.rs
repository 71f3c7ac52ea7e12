use log::debug;
use shell::Shell;

use crate::utils::config::Config;
use crate::utils::log::init_logger;

mod shell;
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    if let Err(err) = init_logger(&config) {
        eprintln!(
            "psh: logging disabled ({}): {}",
            config.logger_dir.display(),
            err
        );
    }
    debug!("history file {}", config.history_file.display());

    let mut shell = Shell::new(&config)?;
    let code = shell.run()?;
    std::process::exit(code)
}
