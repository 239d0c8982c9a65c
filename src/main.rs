mod configuration;
mod report;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gtfs_copier::adapters::{AdapterRegistry, MemoryWriter, Reader, Writer};
use gtfs_copier::{Copier, CopierOptions, CopyResult, CopyStatus};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use configuration::{Configuration, FilterConfig};

#[derive(Parser, Debug)]
#[command(name = "feedcopy", version, about = "Copies and transforms GTFS feeds")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy SOURCE into DEST. Locations are directories, .zip archives or .db files,
    /// or `scheme://path`
    Copy {
        source: String,
        dest: String,
        /// JSON file with the options and the filters to run
        #[arg(long)]
        config: Option<PathBuf>,
        /// Prefix the identifiers of a collection, e.g. `stops=feedA-`
        #[arg(long, value_name = "FILE=PREFIX")]
        prefix: Vec<String>,
        /// Replay a window of service dates onto another, dates as YYYYMMDD
        #[arg(long, value_name = "START:SOURCE_DAYS:TARGET:TARGET_DAYS")]
        redate: Option<String>,
        /// Give the agency of a single agency feed to routes and fares without one
        #[arg(long)]
        default_agency: bool,
        /// Abort on the first entity error
        #[arg(long)]
        fail_fast: bool,
        /// Copy entities failing validation, reporting their errors as warnings
        #[arg(long)]
        allow_entity_errors: bool,
        /// Provision the destination first, and remove it if the copy fails
        #[arg(long)]
        create: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the structure of SOURCE and copy it in memory, reporting every problem
    Validate {
        source: String,
        #[arg(long)]
        json: bool,
    },
}

fn configuration(
    config: Option<PathBuf>,
    prefix: &[String],
    redate: Option<&str>,
    default_agency: bool,
    fail_fast: bool,
    allow_entity_errors: bool,
) -> Result<Configuration> {
    let mut configuration = match config {
        Some(path) => Configuration::load(&path)?,
        None => Configuration::default(),
    };
    configuration.options.fail_fast |= fail_fast;
    configuration.options.allow_entity_errors |= allow_entity_errors;
    if default_agency {
        configuration.filters.push(FilterConfig::DefaultAgency);
    }
    for p in prefix {
        configuration.filters.push(FilterConfig::parse_prefix(p)?);
    }
    if let Some(redate) = redate {
        configuration.filters.push(FilterConfig::parse_redate(redate)?);
    }
    Ok(configuration.with_default_expanders())
}

fn check_structure(reader: &dyn Reader) -> Result<()> {
    let problems = reader.validate_structure();
    if problems.is_empty() {
        return Ok(());
    }
    for problem in &problems {
        error!("{}", problem);
    }
    bail!("the source is not a valid feed: {} problem(s)", problems.len())
}

async fn run_copy(
    reader: &dyn Reader,
    writer: &mut dyn Writer,
    configuration: &Configuration,
    cancel: CancellationToken,
) -> Result<CopyResult> {
    let mut copier =
        Copier::new(reader, writer, configuration.options.clone()).with_cancellation(cancel);
    for filter in configuration.build_filters()? {
        copier.add_filter(filter);
    }
    Ok(copier.copy().await?)
}

fn exit_code(result: &CopyResult) -> ExitCode {
    match result.status {
        CopyStatus::Cancelled => ExitCode::from(130),
        CopyStatus::Completed if result.error_count() > 0 => ExitCode::from(2),
        CopyStatus::Completed => ExitCode::SUCCESS,
    }
}

async fn run(command: Command, cancel: CancellationToken) -> Result<ExitCode> {
    let registry = AdapterRegistry::with_defaults();
    match command {
        Command::Copy {
            source,
            dest,
            config,
            prefix,
            redate,
            default_agency,
            fail_fast,
            allow_entity_errors,
            create,
            json,
        } => {
            let configuration = configuration(
                config,
                &prefix,
                redate.as_deref(),
                default_agency,
                fail_fast,
                allow_entity_errors,
            )?;
            let mut reader = registry
                .open_reader(&source)
                .with_context(|| format!("cannot open source {source}"))?;
            check_structure(reader.as_ref())?;
            let mut writer = registry
                .open_writer(&dest)
                .with_context(|| format!("cannot open destination {dest}"))?;
            if create {
                writer.create()?;
            }
            info!("copying {} into {}", source, dest);
            let copied = run_copy(reader.as_ref(), writer.as_mut(), &configuration, cancel).await;
            reader.close()?;
            let result = match copied {
                Ok(result) => result,
                Err(e) => {
                    if create {
                        if let Err(delete) = writer.delete() {
                            error!("cannot remove {}: {}", dest, delete);
                        }
                    } else {
                        writer.close()?;
                    }
                    return Err(e.context(format!("copy of {source} into {dest} failed")));
                }
            };
            writer.close()?;
            report::print_report(&result, json)?;
            Ok(exit_code(&result))
        }
        Command::Validate { source, json } => {
            let reader = registry
                .open_reader(&source)
                .with_context(|| format!("cannot open source {source}"))?;
            check_structure(reader.as_ref())?;
            let configuration = Configuration {
                options: CopierOptions::default(),
                filters: vec![],
            }
            .with_default_expanders();
            let mut writer = MemoryWriter::new();
            let result = run_copy(reader.as_ref(), &mut writer, &configuration, cancel).await?;
            report::print_report(&result, json)?;
            Ok(exit_code(&result))
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start the runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, cancelling the copy");
                on_interrupt.cancel();
            }
        });

        match run(cli.command, cancel).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("error: {e:?}");
                ExitCode::FAILURE
            }
        }
    })
}
