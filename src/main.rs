use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use iec21_rs::iec::frame::block_payload;
use iec21_rs::iec::LevelPulseDetector;
use iec21_rs::util::hex::{decode_hex, encode_hex, format_iec};
use iec21_rs::{
    checksum, init_logger_with_level, log_info, parse_readout, run_forever, JsonLinePublisher,
    LogPublisher, NoPulseInput, Publisher, PulseInput, RegisterId, SerialConfig, SerialTransport,
    Session, SessionConfig,
};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "iec21-cli")]
#[command(about = "CLI tool for IEC 62056-21 Mode C meters")]
struct Cli {
    /// Default log level; RUST_LOG overrides it.
    #[arg(short, long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Log,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the meter forever and publish power estimates.
    Run {
        port: String,
        #[arg(short, long, value_enum, default_value = "log")]
        output: Output,
        /// Registers to poll in programming mode.
        #[arg(short, long, value_delimiter = ',', default_value = "1.8.0,2.8.0")]
        registers: Vec<RegisterId>,
        #[arg(long, default_value_t = iec21_rs::constants::IEC_SLEEP_MS)]
        sleep_ms: u64,
        #[arg(long, default_value_t = iec21_rs::constants::IEC_STALL_TIMEOUT_MS)]
        stall_timeout_ms: u64,
        #[arg(long, default_value = "5")]
        tick_ms: u64,
        /// Raw ADC value file of a light sensor on the meter's pulse LED.
        #[arg(long)]
        pulse_adc: Option<PathBuf>,
        #[arg(long, default_value = "512")]
        pulse_threshold: u16,
    },
    /// Parse a captured data readout and print its registers as JSON.
    ParseReadout { file: PathBuf },
    /// Compute the block check character of a hex-encoded frame.
    Bcc { hex: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger_with_level(cli.log_level);

    match cli.command {
        Commands::Run {
            port,
            output,
            registers,
            sleep_ms,
            stall_timeout_ms,
            tick_ms,
            pulse_adc,
            pulse_threshold,
        } => {
            let config = SessionConfig {
                registers,
                sleep_ms,
                stall_timeout_ms,
                ..SessionConfig::default()
            };
            let transport = SerialTransport::open(&port, SerialConfig::default())?;

            let publisher: Box<dyn Publisher> = match output {
                Output::Log => Box::new(LogPublisher),
                Output::Json => Box::new(JsonLinePublisher::new(std::io::stdout())),
            };
            let pulse: Box<dyn PulseInput> = match pulse_adc {
                Some(path) => Box::new(LevelPulseDetector::new(pulse_threshold, move || {
                    std::fs::read_to_string(&path)
                        .ok()
                        .and_then(|s| s.trim().parse().ok())
                })),
                None => Box::new(NoPulseInput),
            };

            let mut session = Session::new(transport, publisher, pulse, config)?;
            log_info(&format!("Reading meter on {port}"));
            run_forever(&mut session, Duration::from_millis(tick_ms)).await;
        }
        Commands::ParseReadout { file } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let payload = block_payload(&data).unwrap_or(&data[..]);
            let table = parse_readout(payload);
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
        Commands::Bcc { hex } => {
            let frame = decode_hex(&hex).context("decoding frame")?;
            match checksum(&frame) {
                Ok(bcc) => {
                    log_info(&format!("BCC of {}", encode_hex(&frame)));
                    println!("0x{bcc:02X}");
                }
                Err(e) => bail!("{}: {e}", format_iec(&frame)),
            }
        }
    }

    Ok(())
}
