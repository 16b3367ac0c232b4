//! Example CLI driving `sscp-host` end to end: open a port, authenticate,
//! run one command, print the result.
//!
//! Structured logging setup mirrors the gateway service this workspace
//! started from — `tracing_subscriber::fmt` with an `EnvFilter` sourced
//! from `RUST_LOG`, defaulting to `info` — but `main` itself is a plain
//! synchronous function: nothing here needs an async runtime.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sscp_host::{
    commands, BaudRate, Mode, SessionConfig, SessionContext, RealSerialPort, SerialPort,
};

#[derive(Parser)]
#[command(name = "sscp-cli", about = "Host-side CLI for SSCPv2 NFC readers")]
struct Cli {
    /// Serial device path, e.g. /dev/ttyUSB0. Ignored in --self-test mode.
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    #[arg(long, default_value = "115200")]
    baud: u32,

    /// RS-485 target address (0-127), or 0 for RS-232.
    #[arg(long, default_value_t = 0)]
    address: u8,

    /// Run entirely in self-test mode: no port is opened, deterministic
    /// vectors stand in for the RNG and reader responses.
    #[arg(long)]
    self_test: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate only, then exit.
    Authenticate,
    /// Drive the LED/buzzer output mask.
    Led {
        #[arg(long, default_value_t = 0x01)]
        mask: u8,
    },
    /// Read back firmware/hardware identification.
    Infos,
    /// Scan for a single NFC tag.
    Scan,
}

fn baud_rate(raw: u32) -> Result<BaudRate> {
    match raw {
        9600 => Ok(BaudRate::B9600),
        19200 => Ok(BaudRate::B19200),
        38400 => Ok(BaudRate::B38400),
        57600 => Ok(BaudRate::B57600),
        115200 => Ok(BaudRate::B115200),
        other => anyhow::bail!("unsupported baud rate: {other}"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mode = if cli.self_test { Mode::SelfTest } else { Mode::Live };

    let mut config = SessionConfig::default();
    config.address = cli.address;
    config.baud = baud_rate(cli.baud)?;

    let mut ctx = SessionContext::new(config);

    if !cli.self_test {
        info!(port = %cli.port, baud = cli.baud, address = cli.address, "opening serial port");
        let serial = RealSerialPort::open(&cli.port, config.baud)
            .with_context(|| format!("failed to open {}", cli.port))?;
        ctx.open(Box::new(serial) as Box<dyn SerialPort>);
    } else {
        info!("running in self-test mode, no port opened");
    }

    info!("authenticating");
    sscp_host::auth::authenticate(&mut ctx, None, mode).context("authentication failed")?;
    info!(counter = ctx.counter, "authenticated");

    match cli.command {
        Command::Authenticate => {
            info!("authenticate-only run complete");
        }
        Command::Led { mask } => {
            commands::outputs(&mut ctx, mask, mode).context("outputs command failed")?;
            info!(mask, "led/buzzer command sent");
        }
        Command::Infos => {
            let infos = commands::get_infos(&mut ctx, mode).context("get_infos command failed")?;
            info!(bytes = infos.len(), data = ?infos, "device info received");
        }
        Command::Scan => match commands::scan_nfc(&mut ctx, mode) {
            Ok(uid) => info!(uid = ?uid, "card detected"),
            Err(e) => warn!(error = %e, "scan failed or no card present"),
        },
    }

    ctx.close();
    Ok(())
}
