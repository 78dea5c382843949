//! Driver for the Thermotron 3800 controller.
//!
//! Only Control Channel 1 is driven. The controller needs time to digest
//! each command, so every write is followed by a fixed pause
//! ([`DriverConfig::write_delay`], one second unless configured otherwise).

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mode::{self, OvenMode};
use crate::transport::{SerialTransport, Transport};

/// Command mnemonics understood by the controller.
pub mod command {
    pub const IDENTIFY: &str = "IDEN?";
    pub const TEMPERATURE: &str = "PVAR1?";
    pub const MODE: &str = "MODE?";
    pub const SETPOINT: &str = "SETP1?";
    /// Followed by `,<value>`.
    pub const SET_SETPOINT: &str = "SETP1";
    pub const RUN: &str = "RUNM";
    pub const STOP: &str = "STOP";
    pub const INITIALIZE: &str = "INIT";
}

/// Lowest setpoint the chamber accepts, in degrees Celsius.
pub const SETPOINT_MIN: f64 = -55.0;
/// Highest setpoint the chamber accepts, in degrees Celsius.
pub const SETPOINT_MAX: f64 = 150.0;

/// Connection and timing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Serial device, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    /// How long a read may block before giving up.
    pub timeout: Duration,
    /// Pause after every write. Shorter than a second gives inconsistent results.
    pub write_delay: Duration,
    /// Pause after `INIT` before the controller accepts other commands.
    pub init_settle: Duration,
    pub write_terminator: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            timeout: Duration::from_secs(2),
            write_delay: Duration::from_millis(1000),
            init_settle: Duration::from_secs(3),
            write_terminator: String::from("\r\n"),
        }
    }
}

impl DriverConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_write_delay(mut self, write_delay: Duration) -> Self {
        self.write_delay = write_delay;
        self
    }

    pub fn with_init_settle(mut self, init_settle: Duration) -> Self {
        self.init_settle = init_settle;
        self
    }

    pub fn with_write_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.write_terminator = terminator.into();
        self
    }
}

/// A Thermotron 3800 oven on some [`Transport`].
pub struct Thermotron3800<T> {
    transport: T,
    config: DriverConfig,
}

impl Thermotron3800<SerialTransport> {
    /// Opens the serial port described by `config`.
    pub fn open(config: DriverConfig) -> Result<Self> {
        let transport = SerialTransport::open(&config)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Thermotron3800<T> {
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Sends a raw command, then waits out the write delay.
    pub fn write(&mut self, cmd: &str) -> Result<()> {
        debug!(cmd, "write");
        self.transport.write_line(cmd)?;
        if !self.config.write_delay.is_zero() {
            thread::sleep(self.config.write_delay);
        }
        Ok(())
    }

    /// Sends a query and returns the trimmed reply.
    pub fn query(&mut self, cmd: &str) -> Result<String> {
        self.transport.clear_input()?;
        self.write(cmd)?;
        let reply = self.transport.read_line()?;
        debug!(cmd, reply = %reply, "read");

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(Error::EmptyResponse(String::from(cmd)));
        }
        Ok(String::from(reply))
    }

    fn query_f64(&mut self, cmd: &str) -> Result<f64> {
        let reply = self.query(cmd)?;
        reply.parse().map_err(|_| Error::InvalidResponse {
            command: String::from(cmd),
            response: reply,
        })
    }

    /// Instrument identification.
    pub fn id(&mut self) -> Result<String> {
        self.query(command::IDENTIFY)
    }

    /// Chamber temperature from the built-in thermocouple, in Celsius.
    pub fn temperature(&mut self) -> Result<f64> {
        self.query_f64(command::TEMPERATURE)
    }

    /// Current operating mode.
    pub fn mode(&mut self) -> Result<OvenMode> {
        let reply = self.query(command::MODE)?;
        let code = mode::parse_status_code(&reply)?;
        let decoded = mode::decode(code);
        if decoded.is_unknown() {
            warn!(code, mode = %decoded, "controller reported an unrecognized mode");
        }
        Ok(decoded)
    }

    /// Setpoint in Celsius. May still show the previous value until [`run`](Self::run).
    pub fn setpoint(&mut self) -> Result<f64> {
        self.query_f64(command::SETPOINT)
    }

    /// Stages a new setpoint in Celsius; nothing is sent when it is out of range.
    pub fn set_setpoint(&mut self, celsius: f64) -> Result<()> {
        if !(SETPOINT_MIN..=SETPOINT_MAX).contains(&celsius) {
            return Err(Error::OutOfRange {
                value: celsius,
                min: SETPOINT_MIN,
                max: SETPOINT_MAX,
            });
        }
        self.write(&format!("{},{}", command::SET_SETPOINT, celsius))
    }

    /// Starts temperature forcing; the oven ramps to the setpoint.
    pub fn run(&mut self) -> Result<()> {
        info!("starting temperature forcing");
        self.write(command::RUN)
    }

    /// Stops temperature forcing.
    pub fn stop(&mut self) -> Result<()> {
        info!("stopping temperature forcing");
        self.write(command::STOP)
    }

    /// Re-initializes the controller and waits until it is ready again.
    pub fn initialize(&mut self) -> Result<()> {
        info!(settle = ?self.config.init_settle, "initializing controller");
        self.write(command::INITIALIZE)?;
        if !self.config.init_settle.is_zero() {
            thread::sleep(self.config.init_settle);
        }
        Ok(())
    }
}
