use argh::FromArgs;
use log::{error, info};
use mysh::config::{Backend, Config};
use mysh::env::Environment;
use mysh::{Interpreter, Session, default_commands, logging};
use std::path::PathBuf;

/// Interactive shell with redirection, built-ins and per-user history.
#[derive(FromArgs)]
struct Args {
    /// extra configuration file, applied over the defaults
    #[argh(option)]
    config: Option<PathBuf>,

    /// directory for the user and history files
    #[argh(option)]
    data_dir: Option<PathBuf>,

    /// keep users and history in memory only
    #[argh(switch)]
    memory: bool,

    /// log level: off, error, warn, info, debug or trace
    #[argh(option)]
    log_level: Option<String>,
}

fn main() {
    let args: Args = argh::from_env();
    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("mysh: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> anyhow::Result<i32> {
    let env = Environment::new();
    let mut config = Config::load(&env, args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir);
    }
    if args.memory {
        config.storage.backend = Backend::Memory;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    logging::init(&config, &env)?;
    info!("starting with {:?} storage", config.storage.backend);

    let session = Session::open(&config, env)?;
    let mut shell = Interpreter::new(session, default_commands());
    let code = shell.repl(&config.prompt)?;
    info!("exiting with status {code}");
    Ok(code)
}
