// Copyright 2015-2018 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The `ddns-update` binary for maintaining a dynamically updated zone
//!
//! ```text
//! Usage: ddns-update [options] <COMMAND>
//!
//! Commands:
//!    apply <TYPE> <OPERATION> --host H.. [--value V] --peer IP [--forwarded-for LIST]
//!    ip --peer IP [--forwarded-for LIST]
//!    show
//!
//! Options:
//!    -q, --quiet             Disable INFO messages, WARN and ERROR will remain
//!    -d, --debug             Turn on DEBUG messages (default is only INFO)
//!    -c FILE, --config=FILE  Path to configuration file, default is /etc/ddns.toml
//!    -z DIR, --zonedir=DIR   Path to the root directory for relative store paths
//!    --validate              Load and validate the configuration, then exit
//! ```
//!
//! `apply` prints the JSON response and exits with 2 if the request was rejected, or 1 if
//! it failed inside the coordinator.

// BINARY WARNINGS
#![warn(
    clippy::dbg_macro,
    clippy::unimplemented,
    missing_copy_implementations,
    missing_docs,
    non_snake_case,
    non_upper_case_globals,
    rust_2018_idioms,
    unreachable_pub
)]

use std::{
    env, fmt,
    io::{self, Write},
    net::IpAddr,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tokio::runtime;
use tracing::{debug, info, Event, Subscriber};
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields, FormattedFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use ddns_server::{identity::ClientRequest, MutationCoordinator, UpdateResponse, ZoneConfig};

/// Cli struct for all options managed with clap derive api.
#[derive(Debug, Parser)]
#[clap(name = "ddns-update", version, about)]
struct Cli {
    /// Load and validate the configuration file, then exit
    #[clap(long = "validate")]
    pub(crate) validate: bool,

    /// Disable INFO messages, WARN and ERROR will remain
    #[clap(short = 'q', long = "quiet", conflicts_with = "debug")]
    pub(crate) quiet: bool,

    /// Turn on `DEBUG` messages (default is only `INFO`)
    #[clap(short = 'd', long = "debug", conflicts_with = "quiet")]
    pub(crate) debug: bool,

    /// Path to configuration file of the managed zone
    #[clap(
        short = 'c',
        long = "config",
        default_value = "/etc/ddns.toml",
        value_name = "FILE",
        value_hint=clap::ValueHint::FilePath,
    )]
    pub(crate) config: PathBuf,

    /// Path to the root directory for relative store paths,
    /// defaults to the directory of the configuration file
    #[clap(short = 'z', long = "zonedir", value_name = "DIR", value_hint=clap::ValueHint::DirPath)]
    pub(crate) zonedir: Option<PathBuf>,

    #[clap(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply one record mutation and print the response as JSON
    Apply {
        /// Record type, `A` or `TXT`
        #[clap(value_name = "TYPE")]
        record_type: String,

        /// `update` or `delete`
        #[clap(value_name = "OPERATION")]
        operation: String,

        /// Host relative to the zone, may be repeated
        #[clap(long = "host", value_name = "HOST", required = true)]
        hosts: Vec<String>,

        /// Record data, `A` updates fall back to the caller's address
        #[clap(long = "value", value_name = "VALUE")]
        value: Option<String>,

        #[clap(flatten)]
        client: ClientArgs,
    },

    /// Print the caller's address as seen through the trusted proxies
    Ip {
        #[clap(flatten)]
        client: ClientArgs,
    },

    /// Print the current zone
    Show,
}

#[derive(Debug, clap::Args)]
struct ClientArgs {
    /// Address of the connecting peer
    #[clap(long = "peer", value_name = "IP")]
    pub(crate) peer: IpAddr,

    /// Value of the `X-Forwarded-For` header
    #[clap(long = "forwarded-for", value_name = "LIST")]
    pub(crate) forwarded_for: Option<String>,
}

impl ClientArgs {
    fn request(&self) -> ClientRequest {
        let request = ClientRequest::new(self.peer);
        match &self.forwarded_for {
            Some(header) => request.with_forwarded_for(header),
            None => request,
        }
    }
}

/// Main method for the update command.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, String> {
    let args = Cli::parse();
    if args.quiet {
        quiet()?;
    } else if args.debug {
        debug()?;
    } else {
        default()?;
    }

    debug!("ddns-update {}", ddns_server::version());

    let config_path = args.config.as_path();
    info!("loading configuration from: {config_path:?}");

    let config = ZoneConfig::read_config(config_path)
        .map_err(|err| format!("failed to read config file from {config_path:?}: {err}"))?;
    config
        .validate()
        .map_err(|err| format!("invalid configuration in {config_path:?}: {err}"))?;

    if args.validate {
        info!("configuration files are validated");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = args.command else {
        return Err("no command given, see --help".to_string());
    };

    let zone_dir = args
        .zonedir
        .clone()
        .or_else(|| config_path.parent().map(Path::to_path_buf));

    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("ddns-update-runtime")
        .build()
        .map_err(|err| format!("failed to initialize Tokio runtime: {err}"))?;

    runtime.block_on(async {
        let coordinator = MutationCoordinator::from_config(&config, zone_dir.as_deref())
            .await
            .map_err(|err| format!("failed to open zone: {err}"))?;

        execute(&coordinator, command).await
    })
}

async fn execute(coordinator: &MutationCoordinator, command: Command) -> Result<ExitCode, String> {
    match command {
        Command::Apply {
            record_type,
            operation,
            hosts,
            value,
            client,
        } => {
            let result = coordinator
                .handle(
                    &record_type,
                    &operation,
                    hosts.as_slice(),
                    value.as_deref(),
                    &client.request(),
                )
                .await;

            let (response, code) = match result {
                Ok(response) => (response, ExitCode::SUCCESS),
                Err(err) if err.is_caller_error() => {
                    (UpdateResponse::from_error(&err), ExitCode::from(2))
                }
                Err(err) => (UpdateResponse::from_error(&err), ExitCode::FAILURE),
            };

            let json = serde_json::to_string(&response)
                .map_err(|err| format!("failed to encode response: {err}"))?;
            print(&json)?;
            Ok(code)
        }
        Command::Ip { client } => {
            print(&coordinator.client_address(&client.request()).to_string())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Show => {
            let zone = coordinator.snapshot().await.to_zone_file();
            print(zone.trim_end())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print(line: &str) -> Result<(), String> {
    writeln!(io::stdout().lock(), "{line}").map_err(|err| format!("failed to write output: {err}"))
}

struct DdnsFormatter;

impl<S, N> FormatEvent<S, N> for DdnsFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now_secs = OffsetDateTime::now_utc().unix_timestamp();

        let metadata = event.metadata();
        write!(
            &mut writer,
            "{}:{}:{}",
            now_secs,
            metadata.level(),
            metadata.target()
        )?;

        if let Some(line) = metadata.line() {
            write!(&mut writer, ":{line}")?;
        }

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, ":{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
            }
        }

        write!(writer, ":")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

fn get_env() -> String {
    env::var("RUST_LOG").unwrap_or_default()
}

fn all_ddns(level: impl ToString) -> String {
    format!(
        "ddns_server={level},ddns_update={level},{env}",
        level = level.to_string().to_lowercase(),
        env = get_env()
    )
}

/// appends ddns-server debug to RUST_LOG
fn debug() -> Result<(), String> {
    logger(tracing::Level::DEBUG)
}

/// appends ddns-server info to RUST_LOG
fn default() -> Result<(), String> {
    logger(tracing::Level::INFO)
}

/// appends ddns-server error to RUST_LOG
fn quiet() -> Result<(), String> {
    logger(tracing::Level::ERROR)
}

fn logger(level: tracing::Level) -> Result<(), String> {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .parse(all_ddns(level))
        .map_err(|err| format!("failed to configure tracing/logging: {err}"))?;

    // stdout carries the command output
    let formatter = tracing_subscriber::fmt::layer()
        .event_format(DdnsFormatter)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .init();

    Ok(())
}
