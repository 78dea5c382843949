//! Command-line front end for a Thermotron 3800 oven.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use thermotron::{
    DriverConfig, Error, SerialTransport, SimulatedPort, Simulator, Thermotron3800, Transport,
};
use tracing::{error, info, warn};

const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Drive a Thermotron 3800 environmental chamber.
#[derive(Parser, Debug)]
#[command(name = "oven_cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Serial port the oven is attached to. Asked for interactively when omitted.
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, global = true, default_value_t = 9600)]
    baud: u32,

    /// Read timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 2000)]
    timeout_ms: u64,

    /// Pause after every write, in milliseconds.
    #[arg(long, global = true, default_value_t = 1000)]
    write_delay_ms: u64,

    /// Talk to a built-in simulated oven instead of a serial port.
    #[arg(long, global = true)]
    simulate: bool,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the instrument identification.
    Id,
    /// Print the chamber temperature.
    Temperature,
    /// Print the decoded operating mode.
    Mode,
    /// Print the current setpoint.
    Setpoint,
    /// Stage a new setpoint in Celsius (applied by `run`).
    SetSetpoint {
        #[arg(allow_negative_numbers = true)]
        celsius: f64,
    },
    /// Start temperature forcing.
    Run,
    /// Stop temperature forcing.
    Stop,
    /// Re-initialize the controller.
    Init,
    /// Poll temperature and mode.
    Monitor {
        /// Seconds between polls.
        #[arg(short, long, default_value_t = 5)]
        interval_secs: u64,
        /// Number of polls; runs until interrupted when omitted.
        #[arg(short, long)]
        count: Option<u64>,
    },
    /// Type raw commands at the oven.
    Shell,
    /// Answer a serial port as a simulated oven.
    Serve,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    if let Command::Serve = args.command {
        let config = build_config(&args)?;
        return run_serve_mode(&config);
    }

    if args.simulate {
        let config = DriverConfig::new("simulator")
            .with_write_delay(Duration::from_millis(args.write_delay_ms))
            .with_init_settle(Duration::ZERO);
        info!("using the built-in simulated oven");
        let mut oven = Thermotron3800::new(SimulatedPort::realtime(Simulator::new()), config);
        return run_command(&mut oven, args.command);
    }

    let config = build_config(&args)?;
    let mut oven = Thermotron3800::open(config.clone())
        .with_context(|| format!("failed to open oven on '{}'", config.port))?;
    run_command(&mut oven, args.command)
}

fn build_config(args: &Args) -> Result<DriverConfig> {
    let port = match &args.port {
        Some(port) => port.clone(),
        None => select_port()?,
    };
    Ok(DriverConfig::new(port)
        .with_baud_rate(args.baud)
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_write_delay(Duration::from_millis(args.write_delay_ms)))
}

// Lists the serial ports and lets the user pick one.
fn select_port() -> Result<String> {
    let ports = serialport::available_ports().context("could not enumerate serial ports")?;
    if ports.is_empty() {
        bail!("no serial ports found");
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }

    let choice = prompt("Select a port (number): ")?;
    match choice.parse::<usize>() {
        Ok(i) if i < ports.len() => Ok(ports[i].port_name.clone()),
        _ => bail!("invalid port selection '{}'", choice),
    }
}

fn prompt(text: &str) -> Result<String> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(String::from(line.trim()))
}

fn run_command<T: Transport>(oven: &mut Thermotron3800<T>, command: Command) -> Result<()> {
    match command {
        Command::Id => println!("{}", oven.id()?),
        Command::Temperature => println!("{:.1} °C", oven.temperature()?),
        Command::Mode => println!("{}", oven.mode()?),
        Command::Setpoint => println!("{:.1} °C", oven.setpoint()?),
        Command::SetSetpoint { celsius } => oven.set_setpoint(celsius)?,
        Command::Run => oven.run()?,
        Command::Stop => oven.stop()?,
        Command::Init => oven.initialize()?,
        Command::Monitor { interval_secs, count } => {
            run_monitor(oven, Duration::from_secs(interval_secs), count)?
        }
        Command::Shell => run_shell(oven)?,
        Command::Serve => bail!("serve does not drive an oven"),
    }
    Ok(())
}

fn run_monitor<T: Transport>(
    oven: &mut Thermotron3800<T>,
    interval: Duration,
    count: Option<u64>,
) -> Result<()> {
    let mut polls = 0;
    while count.map_or(true, |count| polls < count) {
        if polls > 0 {
            thread::sleep(interval);
        }
        let temperature = oven.temperature()?;
        let mode = oven.mode()?;
        println!("{:>8.1} °C  {}", temperature, mode);
        polls += 1;
    }
    Ok(())
}

// Handles the manual command input mode.
fn run_shell<T: Transport>(oven: &mut Thermotron3800<T>) -> Result<()> {
    println!("Enter commands, or type 'exit' to quit. Queries end in '?'.");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = line?;
        let command = input.trim();

        if command == "exit" || command == "back" {
            break;
        }

        if !command.is_empty() {
            let outcome = if command.ends_with('?') {
                oven.query(command).map(|reply| println!("< {}", reply))
            } else {
                oven.write(command)
            };
            if let Err(e) = outcome {
                error!("{}", e);
            }
        }

        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}

// Listens on the serial port and answers like a real controller would.
fn run_serve_mode(config: &DriverConfig) -> Result<()> {
    if !BAUD_RATES.contains(&config.baud_rate) {
        warn!(baud = config.baud_rate, "unusual baud rate for a 3800 controller");
    }

    let port = serialport::new(config.port.as_str(), config.baud_rate)
        .timeout(Duration::from_millis(10))
        .open()
        .with_context(|| format!("failed to open port '{}'", config.port))?;
    let mut link = SerialTransport::new(port, &config.write_terminator);
    let mut simulator = Simulator::new();
    let mut last_tick = Instant::now();

    println!(
        "\nServing a simulated oven on {} at {} baud. Press Ctrl+C to exit.",
        config.port, config.baud_rate
    );

    loop {
        let line = match link.read_line() {
            Ok(line) => line,
            Err(Error::Timeout) => continue,
            Err(e) => {
                error!("serial port error: {}", e);
                continue;
            }
        };

        simulator.advance(last_tick.elapsed());
        last_tick = Instant::now();

        println!("> Received: {}", line);
        match simulator.process_command(&line) {
            Ok(Some(reply)) => {
                println!("< {}", reply);
                if let Err(e) = link.write_line(&reply) {
                    error!("failed to write to serial port: {}", e);
                }
            }
            Ok(None) => (),
            Err(e) => warn!("{}", e),
        }
    }
}
