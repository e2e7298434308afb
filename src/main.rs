//! `avstreamd`: inspects and decodes audio containers fed as a byte stream.

use std::io::Write;

use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::decode::cmd_decode;
use cli::info::cmd_info;

mod byteorder;
mod caf;
mod cli;
mod input;
pub(crate) mod timestamp;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let multi = cli.progress.then(MultiProgress::new);
    init_logging(&cli, multi.as_ref())?;
    run(&cli, multi.as_ref())
}

/// Installs the global logger. With progress bars shown, records go through
/// `multi` so they print above the bars.
fn init_logging(cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(cli.loglevel.to_level_filter());
    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                let ts = buf.timestamp().to_string();
                writeln!(buf, "{}", json_record(&ts, record))
            });
        }
    }

    match multi {
        Some(multi) => {
            let logger = builder.build();
            let level = logger.filter();
            LogWrapper::new(multi.clone(), logger).try_init()?;
            log::set_max_level(level);
        }
        None => builder.try_init()?,
    }
    Ok(())
}

/// One log record as a single-line JSON object.
fn json_record(ts: &str, record: &log::Record) -> String {
    format!(
        "{{\"ts\":\"{ts}\",\"lvl\":\"{}\",\"target\":{:?},\"msg\":{:?}}}",
        record.level(),
        record.target(),
        record.args().to_string()
    )
}

fn run(cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    match &cli.command {
        Commands::Decode(args) => cmd_decode(args, cli, multi),
        Commands::Info(args) => cmd_info(args, cli, multi),
    }
}
