#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use palmsync_lib::conduit::{
    self, list_databases, read_database, write_database, DeviceDir, ReadOptions, WriteOptions,
};
use palmsync_lib::dlp::commands::SyncTermination;
use palmsync_lib::dlp::DbListFlags;
use palmsync_lib::{config, Config, Result, SyncError, SyncSession};

#[derive(Parser, Debug)]
#[command(author, version, about = "HotSync for Palm OS handhelds")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    transport: TransportArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct TransportArgs {
    /// Wait for a network HotSync connection
    #[arg(long)]
    net: bool,
    /// Talk to a serial device node
    #[arg(long, value_name = "DEVICE")]
    serial: Option<PathBuf>,
    /// Use the platform USB bridge (not available on this build)
    #[arg(long)]
    usb: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the connected device's system and user information
    Info,
    /// List the databases on the device
    List {
        /// Include ROM databases as well
        #[arg(long)]
        rom: bool,
    },
    /// Back up databases from the device into a directory
    Pull {
        /// Database names; all RAM databases when empty
        names: Vec<String>,
        /// Pull every RAM database
        #[arg(long)]
        ram: bool,
        /// Pull every ROM database
        #[arg(long)]
        rom: bool,
        /// Output directory
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
    },
    /// Install database files onto the device
    Push {
        /// PDB/PRC files to install
        files: Vec<PathBuf>,
        /// Fail instead of replacing databases that already exist
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Run a full two-way sync against the device directory
    Sync,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match config::load_from_path(path) {
            Ok(config) => config,
            Err(err) => {
                error!(%err, "failed to load configuration");
                return ExitCode::from(1);
            }
        },
        None => Config::default(),
    };

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// 1 for usage/transport trouble, 2 once the protocol itself went wrong.
fn exit_code(err: &SyncError) -> u8 {
    match err {
        SyncError::Framing { .. } | SyncError::Protocol(_) | SyncError::Remote { .. } => 2,
        _ => 1,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = connect(&cli.transport, config).await?;
    session.handshake().await?;
    session.start().await?;

    let outcome = dispatch(&mut session, cli, config).await;
    let termination = if outcome.is_ok() {
        SyncTermination::Normal
    } else {
        SyncTermination::Other
    };
    // `sync` ends the session itself as part of the orchestration.
    if !matches!(cli.command, Command::Sync) || outcome.is_err() {
        if let Err(end_err) = session.end("palmsync: session closed", termination).await {
            warn!(%end_err, "failed to end session cleanly");
        }
    }
    outcome
}

async fn connect(transport: &TransportArgs, config: &Config) -> Result<SyncSession> {
    if transport.usb {
        return Err(SyncError::Transport(
            "USB syncing needs the platform bridge; use --serial <device> or --net".into(),
        ));
    }
    if let Some(device) = &transport.serial {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .await?;
        info!(device = %device.display(), "serial transport open");
        // Line configuration is the platform driver's business; CMP still
        // negotiates, but the rate change is a no-op here.
        return Ok(SyncSession::serial(Box::new(file), None)
            .with_host_max_baud(config.serial.max_baud));
    }
    // --net, also the default.
    let bind = (config.net.bind.as_str(), config.net.port);
    let listener = TcpListener::bind(bind).await?;
    info!(port = config.net.port, "waiting for the device to connect");
    let (stream, addr) = listener.accept().await?;
    info!(%addr, "device connected");
    Ok(SyncSession::network(Box::new(stream)))
}

async fn dispatch(session: &mut SyncSession, cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Command::Info => {
            let (Some(sys), Some(user)) = (session.sys_info(), session.user_info()) else {
                return Err(SyncError::Protocol("session info missing after start".into()));
            };
            println!("ROM version:  {:#010x}", sys.rom_version);
            println!("DLP version:  {}.{}", sys.dlp_major, sys.dlp_minor);
            println!("User name:    {}", user.user_name);
            println!("User id:      {:#010x}", user.user_id);
            println!("Last sync PC: {:#010x}", user.last_sync_pc);
            Ok(())
        }
        Command::List { rom } => {
            let mut stores = vec![DbListFlags::RAM];
            if *rom {
                stores.push(DbListFlags::ROM);
            }
            for store in stores {
                for db in list_databases(session.dlp(), store, 0).await? {
                    println!(
                        "{:<32} {} {} v{}",
                        db.name, db.type_tag, db.creator, db.version
                    );
                }
            }
            Ok(())
        }
        Command::Pull { names, ram, rom, output } => {
            let Some(sys) = session.sys_info().cloned() else {
                return Err(SyncError::Protocol("session info missing after start".into()));
            };
            let mut targets = names.clone();
            if targets.is_empty() {
                let mut stores = Vec::new();
                if *ram || !*rom {
                    stores.push(DbListFlags::RAM);
                }
                if *rom {
                    stores.push(DbListFlags::ROM);
                }
                for store in stores {
                    targets.extend(
                        list_databases(session.dlp(), store, 0)
                            .await?
                            .into_iter()
                            .map(|db| db.name),
                    );
                }
            }
            tokio::fs::create_dir_all(output).await?;
            for name in &targets {
                match read_database(session.dlp(), &sys, name, ReadOptions::default()).await {
                    Ok(database) => {
                        let file = database_file_name(&database);
                        tokio::fs::write(output.join(&file), database.emit()?).await?;
                        info!(name = %name, file, "pulled");
                    }
                    Err(err) => warn!(name = %name, %err, "pull failed, continuing"),
                }
            }
            Ok(())
        }
        Command::Push { files, no_overwrite } => {
            let options = WriteOptions { overwrite: !*no_overwrite, ..WriteOptions::default() };
            for path in files {
                let raw = tokio::fs::read(path).await?;
                let database = palmsync_lib::Database::parse(&raw)?;
                write_database(session.dlp(), &database, options).await?;
                info!(name = %database.header.name, "pushed");
            }
            Ok(())
        }
        Command::Sync => {
            let dir = DeviceDir::open(&config.data_dir).await?;
            let summary = conduit::sync_device(session, &dir, &config.host_identity()).await?;
            info!(
                mode = ?summary.mode,
                downloaded = summary.downloaded,
                synced = summary.synced,
                installed = summary.installed,
                skipped = summary.skipped,
                "sync complete"
            );
            Ok(())
        }
    }
}

fn database_file_name(database: &palmsync_lib::Database) -> String {
    let safe: String = database
        .header
        .name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    let ext = if database.header.is_resource_db() { "prc" } else { "pdb" };
    format!("{safe}.{ext}")
}
