mod api;
mod cli;
mod commands;
mod config;
mod error;
mod inventory;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{
    handle_checksum,
    handle_collect,
    handle_login,
    handle_logs_command,
    handle_normalize,
    handle_send,
    handle_status,
    handle_verify,
    SendOptions,
};
use config::Config;
use output::{init_logging, print_error};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(&cli).and_then(|config| run(&cli, &config));

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(
        cli.url.as_deref(),
        cli.username.as_deref(),
        cli.password.as_deref(),
    );
    Ok(config)
}

fn run(cli: &Cli, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Commands::Send { file, collect, source, clean_logs, wait_cleaning, format } => {
            let opts = SendOptions {
                file: file.as_ref(),
                collect: *collect,
                source: source.as_deref(),
                clean_logs: *clean_logs,
                wait_cleaning: *wait_cleaning,
                format,
            };
            handle_send(&opts, config)
        }
        Commands::Checksum { file } => handle_checksum(file),
        Commands::Verify { file, checksum } => handle_verify(file, checksum),
        Commands::Normalize { file, format } => handle_normalize(file, format),
        Commands::Collect { format } => handle_collect(format),
        Commands::Login => handle_login(config),
        Commands::Status { batch_id, format } => handle_status(batch_id.as_deref(), format, config),
        Commands::Logs(cmd) => handle_logs_command(cmd, config),
    }
}
