//! glyph_send - write one glyph to the serial link
//!
//! Uses the same framing as the daemon. Handy for checking the receiving
//! device without a camera in the loop.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use glyph_relay::{
    output::{encode_glyph, OutputChannel, SerialPortConnector, SerialSettings, MESSAGE_LEN},
    Glyph, GRID_SIZE,
};

#[derive(Parser, Debug)]
#[command(
    name = "glyph_send",
    about = "Send a 5x5 glyph to the serial device using the relay framing"
)]
struct Args {
    /// Glyph rows, top to bottom, e.g. 10101,01110,11011,01110,10101
    #[arg(long)]
    pattern: String,

    /// Serial device path
    #[arg(long, env = "GLYPH_RELAY_SERIAL_DEVICE", default_value = "/dev/ttyUSB0")]
    device: String,

    /// Baud rate (8N1 framing is fixed)
    #[arg(long, default_value = "9600")]
    baud: u32,

    /// Write timeout in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Print the bytes instead of opening the device
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let glyph: Glyph = args.pattern.parse()?;
    println!("{}", glyph);

    if args.dry_run {
        let bytes = encode_glyph(&glyph);
        for row in bytes.chunks(MESSAGE_LEN / GRID_SIZE) {
            let hex: Vec<String> = row.iter().map(|b| format!("{:02x}", b)).collect();
            println!("{}", hex.join(" "));
        }
        return Ok(());
    }

    let settings = SerialSettings {
        device: args.device,
        baud_rate: args.baud,
        write_timeout: Duration::from_millis(args.timeout_ms),
    };
    let mut channel = OutputChannel::new(SerialPortConnector::new(settings));
    channel.send(&glyph)?;
    Ok(())
}
