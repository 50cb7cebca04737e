use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{info, warn, LevelFilter, Log, Metadata};

use phatbeat::config::{Backend, Config};
use phatbeat::{button_specs, ButtonMonitor, ButtonName, GpioBackend, MemoryGpio, Rgb, Strip};

/// Pixel strip and button driver
#[derive(Parser)]
#[command(version, author = "Steven Cohen <peragwin@gmail.com>")]
struct Opts {
    /// Verbosity, can be used multiple times
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-memory backend instead of the GPIO header
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Set(SetOpts),
    /// Turn every LED off
    Clear,
    /// List the buttons and their pins
    Buttons,
    Monitor(MonitorOpts),
    /// Run tests
    Test(TestOpts),
}

/// Set LEDs a single color
#[derive(Args)]
struct SetOpts {
    /// Red
    red: u8,
    /// Green
    green: u8,
    /// Blue
    blue: u8,
    /// Brightness, 0.1 to 1.0
    #[arg(short, long)]
    brightness: Option<f64>,
    /// Only set this pixel (0-15)
    #[arg(long, conflicts_with = "channel")]
    pixel: Option<usize>,
    /// Only set this channel (0 or 1)
    #[arg(long)]
    channel: Option<usize>,
}

/// Print press and release records of one button until it goes idle
#[derive(Args)]
struct MonitorOpts {
    /// Button name (e.g. PLAY_PAUSE) or physical pin
    button: String,
}

/// Measure raw frame rate of the bit-banged bus
#[derive(Args)]
struct TestOpts {
    #[arg(long, default_value = "200")]
    frames: u32,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn backend(config: &Config) -> Result<Arc<dyn GpioBackend>> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(MemoryGpio::new())),
        #[cfg(feature = "rpi")]
        Backend::Rpi => {
            let gpio = phatbeat::RppalGpio::new().context("failed to open gpio")?;
            Ok(Arc::new(gpio))
        }
        #[cfg(not(feature = "rpi"))]
        Backend::Rpi => Err(anyhow!("built without raspberry pi support, use --dry-run")),
    }
}

fn button_pin(button: &str) -> Result<u8> {
    if let Ok(pin) = button.parse::<u8>() {
        return button_specs()
            .iter()
            .find(|b| b.pin == pin)
            .map(|b| b.pin)
            .ok_or_else(|| anyhow!("no button on pin {}", pin));
    }
    Ok(button.parse::<ButtonName>()?.pin())
}

fn set(gpio: Arc<dyn GpioBackend>, config: &Config, opts: SetOpts) -> Result<()> {
    let strip = Strip::init(gpio, config.brightness)?;
    let color = Rgb::new(opts.red, opts.green, opts.blue);
    match (opts.pixel, opts.channel) {
        (Some(pixel), _) => strip.set_pixel(pixel, color, opts.brightness, true),
        (None, Some(channel)) => strip.set_channel(channel, color, opts.brightness, true),
        (None, None) => strip.set_all(color, opts.brightness, true),
    }?;
    // leave the LEDs lit
    strip.teardown(false)?;
    Ok(())
}

fn monitor(gpio: Arc<dyn GpioBackend>, config: &Config, opts: MonitorOpts) -> Result<()> {
    let pin = button_pin(&opts.button)?;
    let monitor = ButtonMonitor::start(gpio, pin, config.monitor())
        .with_context(|| format!("failed to monitor pin {}", pin))?;
    if config.backend == Backend::Memory {
        warn!("memory backend never sees a press, this will wait forever");
    }

    let stdout = io::stdout();
    for record in monitor {
        let mut out = stdout.lock();
        write!(out, "{}", record)?;
        out.flush()?;
    }
    info!("pin {} went idle", pin);
    Ok(())
}

fn test(gpio: Arc<dyn GpioBackend>, config: &Config, opts: TestOpts) -> Result<()> {
    let strip = Strip::init(gpio, config.brightness)?;
    strip.set_all(Rgb::new(255, 255, 255), None, false)?;

    let then = SystemTime::now();
    for _ in 0..opts.frames {
        strip.render()?;
    }
    let elapsed = then.elapsed()?.as_secs_f64();
    println!(
        "Raw fps test of gpio bus: {:.1}",
        f64::from(opts.frames) / elapsed.max(f64::EPSILON)
    );
    strip.teardown(true)?;
    Ok(())
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    let mut config = match &opts.config {
        Some(path) => Config::load(path)?,
        None => Config::defaults(),
    };
    if opts.dry_run {
        config.backend = Backend::Memory;
    }
    let gpio = backend(&config)?;

    match opts.cmd {
        Command::Set(set_opts) => set(gpio, &config, set_opts),
        Command::Clear => {
            let strip = Strip::init(gpio, config.brightness)?;
            strip.teardown(true)?;
            Ok(())
        }
        Command::Buttons => {
            for button in button_specs() {
                println!("{:<12} {}", button.name, button.pin);
            }
            Ok(())
        }
        Command::Monitor(monitor_opts) => monitor(gpio, &config, monitor_opts),
        Command::Test(test_opts) => test(gpio, &config, test_opts),
    }
}
