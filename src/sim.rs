//! # Thermotron 3800 Simulator
//!
//! An in-process stand-in for the oven controller. It keeps just enough
//! chamber state to answer the driver's command set the way the hardware
//! does, which makes it usable both as a test double ([`SimulatedPort`]) and
//! as a fake oven served on a real serial port by the CLI.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mode::ModeFlags;
use crate::oven::{command, SETPOINT_MAX, SETPOINT_MIN};
use crate::transport::Transport;

const IDENTIFICATION: &str = "THERMOTRON 3800,SIMULATOR,0,1.0";
const AMBIENT_CELSIUS: f64 = 23.0;
/// Degrees Celsius per minute while forcing.
const DEFAULT_RAMP_RATE: f64 = 5.0;

// Errors raised while interpreting a command line.
#[derive(Debug, PartialEq, ThisError)]
pub enum CommandError {
    /// Nothing but whitespace was received.
    #[error("empty command")]
    Empty,
    /// The mnemonic is not one the controller knows.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    /// The command is known, but its argument is missing, malformed or out of range.
    #[error("invalid parameter")]
    InvalidParameter,
}

// Every command the simulated controller understands.
#[derive(Debug, PartialEq)]
enum Command {
    Identify,
    Temperature,
    Mode,
    Setpoint,
    SetSetpoint(f64),
    Run,
    Stop,
    Initialize,
}

/// The simulated chamber and its controller.
#[derive(Debug, Clone)]
pub struct Simulator {
    pub ramp_rate: f64,
    temperature: f64,
    active_setpoint: f64,
    staged_setpoint: f64,
    running: bool,
    mode_code: u64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// A controller as it comes up from power-on: stopped, at ambient temperature.
    pub fn new() -> Self {
        Self {
            ramp_rate: DEFAULT_RAMP_RATE,
            temperature: AMBIENT_CELSIUS,
            active_setpoint: AMBIENT_CELSIUS,
            staged_setpoint: AMBIENT_CELSIUS,
            running: false,
            mode_code: u64::from(ModeFlags::EDIT_MODE_STOP.bits()),
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, celsius: f64) {
        self.temperature = celsius;
    }

    /// The setpoint the controller is forcing toward.
    pub fn setpoint(&self) -> f64 {
        self.active_setpoint
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Overrides the raw mode register, including undocumented bits.
    pub fn set_mode_code(&mut self, code: u64) {
        self.mode_code = code;
    }

    /// Moves the chamber temperature toward the setpoint for `elapsed` of wall time.
    pub fn advance(&mut self, elapsed: Duration) {
        if !self.running {
            return;
        }
        let step = self.ramp_rate * elapsed.as_secs_f64() / 60.0;
        let delta = self.active_setpoint - self.temperature;
        if delta.abs() <= step {
            self.temperature = self.active_setpoint;
        } else {
            self.temperature += step.copysign(delta);
        }
    }

    /// Parses one command line into a `Command`.
    fn parse_command(&self, content: &str) -> std::result::Result<Command, CommandError> {
        let upper = content.to_ascii_uppercase();

        if let Some((mnemonic, arg)) = upper.split_once(',') {
            if mnemonic.trim() != command::SET_SETPOINT {
                return Err(CommandError::UnknownCommand(String::from(content)));
            }
            let value: f64 = arg.trim().parse().map_err(|_| CommandError::InvalidParameter)?;
            if !(SETPOINT_MIN..=SETPOINT_MAX).contains(&value) {
                return Err(CommandError::InvalidParameter);
            }
            return Ok(Command::SetSetpoint(value));
        }

        match upper.as_str() {
            command::IDENTIFY => Ok(Command::Identify),
            command::TEMPERATURE => Ok(Command::Temperature),
            command::MODE => Ok(Command::Mode),
            command::SETPOINT => Ok(Command::Setpoint),
            command::RUN => Ok(Command::Run),
            command::STOP => Ok(Command::Stop),
            command::INITIALIZE => Ok(Command::Initialize),
            _ => Err(CommandError::UnknownCommand(String::from(content))),
        }
    }

    /// Processes a command line and returns the reply, if the command has one.
    pub fn process_command(&mut self, command_str: &str) -> std::result::Result<Option<String>, CommandError> {
        let content = command_str.trim();
        if content.is_empty() {
            return Err(CommandError::Empty);
        }

        let command = self.parse_command(content)?;
        Ok(self.execute_command(command))
    }

    /// Executes a parsed command. Queries answer, everything else is silent.
    fn execute_command(&mut self, command: Command) -> Option<String> {
        match command {
            Command::Identify => Some(String::from(IDENTIFICATION)),
            Command::Temperature => Some(format!("{:.1}", self.temperature)),
            Command::Mode => Some(self.mode_code.to_string()),
            Command::Setpoint => Some(format!("{:.1}", self.active_setpoint)),
            Command::SetSetpoint(value) => {
                // Takes effect on the next RUNM.
                self.staged_setpoint = value;
                None
            }
            Command::Run => {
                self.active_setpoint = self.staged_setpoint;
                self.running = true;
                self.mode_code = u64::from(ModeFlags::MANUAL_MODE.bits());
                None
            }
            Command::Stop => {
                self.running = false;
                self.mode_code = u64::from(ModeFlags::EDIT_MODE_STOP.bits());
                None
            }
            Command::Initialize => {
                let ramp_rate = self.ramp_rate;
                let temperature = self.temperature;
                *self = Self::new();
                self.ramp_rate = ramp_rate;
                self.temperature = temperature;
                None
            }
        }
    }
}

/// A [`Transport`] wired straight into a [`Simulator`].
///
/// Records every line written so tests can check what went over the wire,
/// and can be told to answer a command with canned text instead.
#[derive(Debug, Default)]
pub struct SimulatedPort {
    simulator: Simulator,
    sent: Vec<String>,
    replies: VecDeque<String>,
    canned: HashMap<String, VecDeque<String>>,
    // Set when the chamber should follow the wall clock.
    last_tick: Option<Instant>,
}

impl SimulatedPort {
    pub fn new(simulator: Simulator) -> Self {
        Self {
            simulator,
            ..Default::default()
        }
    }

    /// Like [`new`](Self::new), but the chamber ramps in real time between commands.
    pub fn realtime(simulator: Simulator) -> Self {
        Self {
            last_tick: Some(Instant::now()),
            ..Self::new(simulator)
        }
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn simulator_mut(&mut self) -> &mut Simulator {
        &mut self.simulator
    }

    /// Every line written so far, oldest first.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Answers the next `cmd` with `reply` instead of asking the simulator.
    pub fn push_reply(&mut self, cmd: &str, reply: &str) {
        self.canned
            .entry(String::from(cmd))
            .or_default()
            .push_back(String::from(reply));
    }
}

impl Transport for SimulatedPort {
    fn write_line(&mut self, line: &str) -> Result<()> {
        if let Some(last) = self.last_tick.replace(Instant::now()) {
            self.simulator.advance(last.elapsed());
        }
        self.sent.push(String::from(line));

        if let Some(reply) = self.canned.get_mut(line).and_then(VecDeque::pop_front) {
            self.replies.push_back(reply);
            return Ok(());
        }

        match self.simulator.process_command(line) {
            Ok(Some(reply)) => self.replies.push_back(reply),
            Ok(None) => (),
            // The real controller drops what it cannot parse.
            Err(e) => warn!(line, error = %e, "simulator ignored command"),
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let reply = self.replies.pop_front().ok_or(Error::Timeout)?;
        debug!(reply = %reply, "simulated reply");
        Ok(reply)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.replies.clear();
        Ok(())
    }
}
