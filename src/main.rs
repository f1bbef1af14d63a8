use bearx::cli::{self, CallbackOpts};
use bearx::config;
use bearx::error::EXIT_FAILURE;
use bearx::macos::SystemOpener;
use std::io;
use std::process;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

fn main() {
    let opts = CallbackOpts::from_args();
    init_tracing(opts.verbose);

    let config = match config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(EXIT_FAILURE);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {}", err);
            process::exit(EXIT_FAILURE);
        }
    };
    let code = runtime.block_on(cli::run(
        &opts,
        &config,
        SystemOpener,
        io::stdout(),
        io::stderr(),
    ));
    drop(runtime);
    process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "bearx=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
