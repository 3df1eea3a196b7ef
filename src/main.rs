use anyhow::Context;
use clap::{Parser, Subcommand};
use laserkit::{
    build_registry, init_logging, DeviceChannel, EventBus, GrblEmulator, GrblResponse,
    GrblServer, Interpreter, LaserkitConfig, LoopbackChannel, SerialChannel, SerialConfig,
    Spooler,
};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "laserkit",
    version,
    about = "Command pipeline and GRBL front end for K40-class laser cutters"
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Serve the GRBL text protocol over TCP in front of the device pipeline
    Serve {
        /// Serial port device path, overriding the config file
        #[arg(long)]
        port: Option<String>,
        /// Drive an in-memory loopback channel instead of hardware
        #[arg(long)]
        loopback: bool,
        /// Listen address, overriding the config file
        #[arg(long)]
        listen: Option<String>,
    },
    /// Print the device settings registry as JSON
    Settings,
    /// Run a G-code file through an offline emulator session and report every response
    Check {
        /// G-code file to check
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Cmd::Serve {
            port,
            loopback,
            listen,
        } => cmd_serve(config, port, loopback, listen).await,
        Cmd::Settings => cmd_settings(config),
        Cmd::Check { file } => cmd_check(config, &file),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<LaserkitConfig> {
    if let Some(path) = path {
        let config = LaserkitConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        tracing::info!(path = %path.display(), "configuration loaded");
        return Ok(config);
    }

    let path = LaserkitConfig::config_path();
    if path.exists() {
        let config = LaserkitConfig::load_from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    } else {
        tracing::info!("no config file found, using defaults");
        Ok(LaserkitConfig::default())
    }
}

fn build_channel(
    config: &LaserkitConfig,
    port: Option<String>,
    loopback: bool,
) -> anyhow::Result<Box<dyn DeviceChannel>> {
    if loopback {
        tracing::info!("using loopback channel");
        return Ok(Box::new(LoopbackChannel::new()));
    }
    let mut serial = config.serial_config();
    if let Some(port) = port {
        let base = serial.unwrap_or_default();
        serial = Some(SerialConfig { port, ..base });
    }
    let serial = serial.context(
        "no serial port configured; pass --port or --loopback, or set `port` in the config file",
    )?;
    Ok(Box::new(SerialChannel::new(serial)))
}

async fn cmd_serve(
    config: LaserkitConfig,
    port: Option<String>,
    loopback: bool,
    listen: Option<String>,
) -> anyhow::Result<()> {
    let channel = build_channel(&config, port, loopback)?;
    let events = EventBus::default();
    let mut interpreter = Interpreter::new(channel, config.interpreter_config(), events.clone());
    interpreter
        .open_channel()
        .context("opening device channel")?;

    let spooler = Arc::new(Spooler::spawn(
        interpreter,
        config.spooler_config(),
        events,
    ));
    let listen = listen.unwrap_or_else(|| config.listen.clone());
    let server = GrblServer::new(spooler.clone(), config.grbl_config(), listen);

    let result = server.run().await;
    spooler.shutdown();
    result
}

fn cmd_settings(config: LaserkitConfig) -> anyhow::Result<()> {
    let shared = Arc::new(RwLock::new(config));
    let registry = build_registry(shared);
    println!("{}", serde_json::to_string_pretty(&registry.dump())?);
    Ok(())
}

fn cmd_check(config: LaserkitConfig, file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;

    let channel = LoopbackChannel::new();
    let probe = channel.probe();
    let events = EventBus::default();
    let mut interpreter = Interpreter::new(
        Box::new(channel),
        config.interpreter_config(),
        events.clone(),
    );
    interpreter.open_channel()?;
    let spooler = Arc::new(Spooler::spawn(
        interpreter,
        config.spooler_config(),
        events,
    ));

    let mut session = GrblEmulator::new(spooler.clone(), config.grbl_config());
    let mut responses = session.write(text.as_bytes());
    if !text.ends_with('\n') {
        responses.extend(session.write(b"\n"));
    }
    for response in &responses {
        println!("{}", response);
    }

    if !spooler.wait_idle(Duration::from_secs(30)) {
        tracing::warn!("pipeline still busy after 30s, shutting down anyway");
    }
    spooler.shutdown();

    let errors = responses
        .iter()
        .filter(|r| matches!(r, GrblResponse::Error(_)))
        .count();
    let lines = responses
        .iter()
        .filter(|r| matches!(r, GrblResponse::Ok | GrblResponse::Error(_)))
        .count();
    println!(
        "{} lines, {} refused, {} device bytes",
        lines,
        errors,
        probe.written().len()
    );

    if errors > 0 {
        anyhow::bail!("{} of {} lines refused", errors, lines);
    }
    Ok(())
}
