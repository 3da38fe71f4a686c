// A small utility for bringing up a BT82x attached to a SPIDriver adapter,
// and for managing the contents of its external flash.

use anyhow::{anyhow, bail, Context, Result};
use bt82x::commands::flash::{FlashState, BLOB_SIZE};
use bt82x::commands::{Coprocessor, PollingWaiter};
use bt82x::memory::Ptr;
use bt82x::models::bt820::{ExtFlashMem, MainMem, BT820};
use bt82x::{BootParameters, ClockFrequency, DisplayParameters, DisplayPreset, Interface, Model};
use bt82x_spidriver::SPIDriverInterface;
use clap::{Parser, Subcommand, ValueEnum};
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info};
use serial_embedded_hal::{PortSettings, Serial};
use spidriver::SPIDriver;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

type CP<I> = Coprocessor<BT820, I, PollingWaiter<BT820, I>>;

/// Boot a BT82x over a SPIDriver and manage its flash.
#[derive(Parser)]
#[command(name = "bt82x")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Serial port the SPIDriver is attached to
    #[arg(short, long, default_value = "/dev/ttyUSB0", global = true)]
    port: PathBuf,

    /// Serial baud rate
    #[arg(short, long, default_value_t = 460800, global = true)]
    baud: usize,

    /// System clock in MHz (36, 48, 60, 72 or 84)
    #[arg(long, default_value_t = 72, global = true)]
    clock_mhz: u32,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Boot the chip and report what it is
    Info,

    /// Boot the chip and configure the display, leaving it blank
    Boot {
        #[arg(long, value_enum, default_value_t = Preset::Wuxga)]
        display: Preset,
    },

    /// Show the built-in test card
    Testcard {
        #[arg(long, value_enum, default_value_t = Preset::Wuxga)]
        display: Preset,
    },

    /// Play the manufacturer logo animation
    Logo {
        #[arg(long, value_enum, default_value_t = Preset::Wuxga)]
        display: Preset,
    },

    /// Reset the coprocessor
    Reset,

    /// Power the chip down
    Shutdown,

    /// External flash operations
    #[command(subcommand)]
    Flash(FlashCommand),
}

#[derive(Subcommand)]
enum FlashCommand {
    /// Show the flash state and size
    Status,

    /// Switch the flash to the given state
    State {
        #[arg(value_enum)]
        state: State,
    },

    /// Erase the whole flash
    Erase,

    /// Copy flash contents into a file
    Read {
        /// Flash address, a multiple of 64
        #[arg(value_parser = parse_u32)]
        addr: u32,

        /// Number of bytes to read
        #[arg(value_parser = parse_u32)]
        len: u32,

        out: PathBuf,
    },

    /// Write an image file to flash, skipping unchanged sectors
    Write {
        /// Flash address, a multiple of 4096. An image at 0 must start
        /// with its driver blob.
        #[arg(value_parser = parse_u32)]
        addr: u32,

        file: PathBuf,
    },

    /// Write a file to already-erased flash
    Program {
        /// Flash address, a multiple of 256
        #[arg(value_parser = parse_u32)]
        addr: u32,

        file: PathBuf,
    },

    /// Replace the flash driver blob
    Blob { file: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    /// 1920x1080 at 60Hz
    Fhd,
    /// 1920x1200 at 60Hz
    Wuxga,
}

impl From<Preset> for DisplayPreset {
    fn from(p: Preset) -> Self {
        match p {
            Preset::Fhd => DisplayPreset::Fhd1920x1080At60,
            Preset::Wuxga => DisplayPreset::Wuxga1920x1200At60,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum State {
    Detached,
    Basic,
    Full,
}

impl From<State> for FlashState {
    fn from(s: State) -> Self {
        match s {
            State::Detached => FlashState::Detached,
            State::Basic => FlashState::Basic,
            State::Full => FlashState::Full,
        }
    }
}

struct StdDelay;

impl DelayMs<u32> for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let clock = clock_frequency(cli.clock_mhz)?;
    let ei = open_spidriver(&cli.port, cli.baud)?;
    run(cli.command, ei, clock)
}

fn open_spidriver(port: &Path, baud: usize) -> Result<impl Interface<Error = impl fmt::Debug>> {
    let serial = Serial::new(
        port,
        &PortSettings {
            baud_rate: serial_embedded_hal::BaudRate::BaudOther(baud),
            char_size: serial_embedded_hal::CharSize::Bits8,
            parity: serial_embedded_hal::Parity::ParityNone,
            stop_bits: serial_embedded_hal::StopBits::Stop1,
            flow_control: serial_embedded_hal::FlowControl::FlowNone,
        },
    )
    .with_context(|| format!("failed to open {}", port.display()))?;
    let (tx, rx) = serial.split();
    let mut sd = SPIDriver::new(tx, rx);
    sd.unselect()
        .map_err(|e| anyhow!("SPIDriver not responding: {:?}", e))?;
    debug!("SPIDriver ready on {}", port.display());
    Ok(SPIDriverInterface::new(sd, StdDelay))
}

fn clock_frequency(mhz: u32) -> Result<ClockFrequency> {
    Ok(match mhz {
        36 => ClockFrequency::F36MHz,
        48 => ClockFrequency::F48MHz,
        60 => ClockFrequency::F60MHz,
        72 => ClockFrequency::F72MHz,
        84 => ClockFrequency::F84MHz,
        _ => bail!("unsupported system clock {}MHz", mhz),
    })
}

fn parse_u32(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

// The chip's error types are no_std, so they only offer Display.
fn chip_err<E: fmt::Display>(err: E) -> anyhow::Error {
    anyhow!("{}", err)
}

fn run<I>(cmd: Command, ei: I, clock: ClockFrequency) -> Result<()>
where
    I: Interface,
    I::Error: fmt::Debug,
{
    let mut bt = BT820::new(ei);
    let mut params = BootParameters::new();
    params.clock(clock);
    let chip = bt.boot(&params).map_err(chip_err).context("boot failed")?;
    info!("booted {}", chip);

    let display = match &cmd {
        Command::Boot { display } | Command::Testcard { display } | Command::Logo { display } => {
            Some(DisplayParameters::preset(
                (*display).into(),
                clock.reg_frequency_value(),
            ))
        }
        _ => None,
    };
    if let Some(display) = &display {
        bt.configure_display(display)
            .map_err(chip_err)
            .context("failed to configure display")?;
    }

    match cmd {
        Command::Info => {
            let freq = bt.current_frequency().map_err(chip_err)?;
            println!("chip:      {}", chip);
            println!("clock:     {} Hz", freq);
            let mut cp = start(bt)?;
            let mut flash = cp.flash();
            let state = flash.state().map_err(chip_err)?;
            let size = flash.size_mib().map_err(chip_err)?;
            println!("flash:     {:?}, {} MiB", state, size);
            finish(cp)
        }
        Command::Boot { .. } => Ok(()),
        Command::Testcard { .. } => {
            let mut cp = start(bt)?;
            cp.show_testcard().map_err(chip_err)?;
            cp.block_until_idle().map_err(chip_err)?;
            finish(cp)
        }
        Command::Logo { .. } => {
            let mut cp = start(bt)?;
            cp.show_manufacturer_logo().map_err(chip_err)?;
            cp.block_until_logo_done()
                .map_err(chip_err)
                .context("logo animation didn't finish")?;
            finish(cp)
        }
        Command::Reset => {
            let mut cp = start(bt)?;
            cp.reset().map_err(chip_err).context("coprocessor reset failed")?;
            info!("coprocessor reset");
            finish(cp)
        }
        Command::Shutdown => {
            bt.shutdown().map_err(chip_err)?;
            info!("powered down");
            Ok(())
        }
        Command::Flash(cmd) => {
            let mut cp = start(bt)?;
            run_flash(&mut cp, cmd)?;
            finish(cp)
        }
    }
}

fn start<I>(bt: bt82x::BT82x<BT820, I>) -> Result<CP<I>>
where
    I: Interface,
    I::Error: fmt::Debug,
{
    bt.start_coprocessor()
        .map_err(chip_err)
        .context("failed to start coprocessor")
}

fn finish<I>(cp: CP<I>) -> Result<()>
where
    I: Interface,
    I::Error: fmt::Debug,
{
    cp.take_interface().map_err(chip_err)?;
    Ok(())
}

fn run_flash<I>(cp: &mut CP<I>, cmd: FlashCommand) -> Result<()>
where
    I: Interface,
    I::Error: fmt::Debug,
{
    match cmd {
        FlashCommand::Status => {
            let mut flash = cp.flash();
            let state = flash.state().map_err(chip_err)?;
            println!("state: {:?}", state);
            if state == FlashState::Basic || state == FlashState::Full {
                println!("size:  {} MiB", flash.size_mib().map_err(chip_err)?);
            }
        }
        FlashCommand::State { state } => {
            let state: FlashState = state.into();
            cp.flash()
                .switch_state(state)
                .map_err(chip_err)
                .with_context(|| format!("failed to switch flash to {:?}", state))?;
            info!("flash is now {:?}", state);
        }
        FlashCommand::Erase => {
            let mut flash = cp.flash();
            flash.switch_state(FlashState::Full).map_err(chip_err)?;
            flash.erase().map_err(chip_err).context("erase failed")?;
        }
        FlashCommand::Read { addr, len, out } => {
            let data = read_flash(cp, addr, len)?;
            std::fs::write(&out, &data)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!("read {} bytes into {}", data.len(), out.display());
        }
        FlashCommand::Write { addr, file } => {
            let data =
                std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            cp.flash()
                .write_image(Ptr::<ExtFlashMem>::new(addr), &data, |pct| {
                    eprint!("\r{:3}%", pct);
                    let _ = std::io::stderr().flush();
                })
                .map_err(chip_err)
                .context("flash write failed")?;
            eprintln!();
        }
        FlashCommand::Program { addr, file } => {
            let data =
                std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let mut flash = cp.flash();
            flash.switch_state(FlashState::Full).map_err(chip_err)?;
            flash
                .write(Ptr::<ExtFlashMem>::new(addr), &data)
                .map_err(chip_err)
                .context("flash program failed")?;
            info!("programmed {} bytes", data.len());
        }
        FlashCommand::Blob { file } => {
            let data =
                std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            if data.len() != BLOB_SIZE {
                bail!("blob must be exactly {} bytes, not {}", BLOB_SIZE, data.len());
            }
            let mut blob = [0_u8; BLOB_SIZE];
            blob.copy_from_slice(&data);
            cp.flash()
                .update_blob(&blob)
                .map_err(chip_err)
                .context("blob update failed")?;
            info!("blob updated, flash at full speed");
        }
    }
    Ok(())
}

const READ_CHUNK: u32 = 64 * 1024;

fn read_flash<I>(cp: &mut CP<I>, addr: u32, len: u32) -> Result<Vec<u8>>
where
    I: Interface,
    I::Error: fmt::Debug,
{
    let mut flash = cp.flash();
    flash.switch_state(FlashState::Full).map_err(chip_err)?;

    let staging = Ptr::<MainMem>::new(0);
    let mut data = vec![0_u8; ((len + 3) & !3) as usize];
    let mut done = 0_usize;
    while done < data.len() {
        let end = std::cmp::min(done + READ_CHUNK as usize, data.len());
        let src = Ptr::<ExtFlashMem>::new(addr + done as u32);
        let got = flash
            .read(staging, src, &mut data[done..end])
            .map_err(chip_err)
            .with_context(|| format!("flash read at {:#x} failed", addr + done as u32))?;
        done += got;
    }
    data.truncate(len as usize);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("4096"), Ok(4096));
        assert_eq!(parse_u32("0x1000"), Ok(4096));
        assert_eq!(parse_u32("0X10"), Ok(16));
        assert!(parse_u32("0xg").is_err());
        assert!(parse_u32("").is_err());
    }

    #[test]
    fn test_clock_frequency() {
        assert_eq!(clock_frequency(72).unwrap(), ClockFrequency::F72MHz);
        assert_eq!(clock_frequency(36).unwrap(), ClockFrequency::F36MHz);
        assert!(clock_frequency(24).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["bt82x", "flash", "read", "0x40", "128", "out.bin"]).unwrap();
        match cli.command {
            Command::Flash(FlashCommand::Read { addr, len, out }) => {
                assert_eq!(addr, 0x40);
                assert_eq!(len, 128);
                assert_eq!(out, PathBuf::from("out.bin"));
            }
            _ => panic!("wrong command"),
        }
        assert_eq!(cli.baud, 460800);
        assert_eq!(cli.clock_mhz, 72);
    }
}
