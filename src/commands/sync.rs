use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ApiConnection, CleaningStatus, ReqwestTransport, RetryOutcome};
use crate::cli::LogsCommands;
use crate::commands::items::read_items;
use crate::config::Config;
use crate::error::SyncError;
use crate::inventory::{batch_from_records, checksum_for_records, collect_local_record, prepare_batch};
use crate::output::{confirm_action, output_data, print_info, print_success, print_warning};

pub struct SendOptions<'a> {
    pub file: Option<&'a PathBuf>,
    pub collect: bool,
    pub source: Option<&'a str>,
    pub clean_logs: bool,
    pub wait_cleaning: bool,
    pub format: &'a str,
}

/// Build a connection from the merged configuration.
pub fn connect(config: &Config) -> Result<ApiConnection, SyncError> {
    config.validate()?;
    let transport = ReqwestTransport::new(&config.url, &config.transport_options())?;

    Ok(
        ApiConnection::new(Box::new(transport), &config.username, &config.password)
            .with_retry_policy(config.retry_policy())
            .with_send_timeout(config.send_timeout()),
    )
}

pub fn handle_send(opts: &SendOptions, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let source = opts.source.unwrap_or(&config.source);

    // Validation happens before anything touches the network
    let mut batch = match opts.file {
        Some(path) => prepare_batch(&read_items(path)?, source)?,
        None if opts.collect => {
            info!("Collecting local inventory record...");
            let records = vec![collect_local_record()];
            let checksum = checksum_for_records(&records)?;
            batch_from_records(records, checksum, source, Utc::now())
        }
        None => return Err("Either --file or --collect is required".into()),
    };
    print_info(&format!(
        "Prepared batch {} with {} item(s), checksum {}",
        batch.batch_id, batch.metadata.total_items, batch.metadata.checksum
    ));

    let mut api = connect(config)?;
    api.login()?;

    if opts.wait_cleaning {
        api.wait_for_cleaning_complete(config.cleaning_timeout(), config.cleaning_interval())?;
    }
    if opts.clean_logs {
        api.clean_logs()?;
    }

    match api.send_data(&mut batch) {
        RetryOutcome::Succeeded { value, attempts } => {
            print_success(&format!(
                "Batch {} accepted after {} attempt(s)",
                batch.batch_id, attempts
            ));
            output_data(&value, opts.format)?;
        }
        RetryOutcome::Failed { error, attempts } => {
            return Err(format!(
                "Failed to send batch {} after {} attempt(s): {}",
                batch.batch_id, attempts, error
            )
            .into());
        }
    }

    let logs = api.check_logs();
    if !is_empty_object(&logs) {
        print_info("Current processing logs:");
        output_data(&logs, opts.format)?;
    }
    Ok(())
}

pub fn handle_login(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut api = connect(config)?;
    api.login()?;
    let token_prefix: String = api.token().unwrap_or_default().chars().take(8).collect();
    debug!(token = %token_prefix, "Received token");

    if api.validate_token()? {
        print_success(&format!("Logged in to {} as {}", api.base_url(), config.username));
        Ok(())
    } else {
        Err(format!("Token issued by {} was rejected", api.base_url()).into())
    }
}

pub fn handle_status(
    batch_id: Option<&str>,
    format: &str,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut api = connect(config)?;
    api.login()?;

    match batch_id {
        Some(id) => match api.batch_status(id)? {
            Some(status) => output_data(&status, format)?,
            None => print_warning(&format!("Batch {} not found", id)),
        },
        None => match api.check_cleaning_status()? {
            CleaningStatus::Idle => print_info("No log cleanup in progress"),
            CleaningStatus::Cleaning => print_warning("Remote log cleanup in progress"),
        },
    }
    Ok(())
}

pub fn handle_logs_command(cmd: &LogsCommands, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut api = connect(config)?;
    api.login()?;

    match cmd {
        LogsCommands::Show { format } => {
            let logs = api.check_logs();
            if is_empty_object(&logs) {
                print_warning("No processing logs available");
            } else {
                output_data(&logs, format)?;
            }
        }
        LogsCommands::Clean { yes } => {
            if !*yes && !confirm_action(&format!("This deletes all processing logs on {}", api.base_url()))? {
                print_info("Aborted");
                return Ok(());
            }
            api.clean_logs()?;
            print_success("Processing logs cleaned");
        }
    }
    Ok(())
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().map(|map| map.is_empty()).unwrap_or(false)
}
