use clap::Parser;
use k_mirror::backup::backup_config::BackupConfig;
use k_mirror::backup::result_error::error::Error;
use k_mirror::backup::result_error::WithMsg;
use k_mirror::backup::supervisor::{interrupt_signals, wait_for_interrupt, Supervisor};
use k_mirror::backup::watcher::os::NotifyEventSource;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use validator::Validate;

/// Mirror every file change under a directory into a timestamped backup tree
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let res = File::open(&args.config)
        .map_err(Error::from)
        .with_msg(format!("Open config failed: {:?}", &args.config))
        .and_then(|f| {
            serde_yml::from_reader::<_, BackupConfig>(f)
                .map_err(Error::from)
                .with_msg(format!("Parse YAML config failed: {:?}", &args.config))
        })
        .and_then(|bc| {
            bc.validate()
                .map_err(Error::from)
                .map(|_| bc)
                .with_msg(format!("Config validation failed: {:?}", &args.config))
        })
        .and_then(|bc| {
            let signals = interrupt_signals()?;
            let pool = bc.build_thread_pool()?;
            Supervisor::new(bc, NotifyEventSource::default(), pool)
                .run(move || wait_for_interrupt(signals))
        });

    match res {
        Ok(stats) => {
            info!(
                "Shut down cleanly after {} events ({} backed up, {} failed)",
                stats.received, stats.backed_up, stats.failed
            );
            exit(0);
        }
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
