//! # Thermotron 3800 Oven Driver Library
//!
//! Talks to a Thermotron 3800 environmental chamber controller over a
//! line-oriented link (normally RS-232) and decodes its operating mode
//! register.
//!
//! ```
//! use std::time::Duration;
//! use thermotron::{DriverConfig, ModeFlags, SimulatedPort, Simulator, Thermotron3800};
//!
//! let config = DriverConfig::new("sim").with_write_delay(Duration::ZERO);
//! let mut oven = Thermotron3800::new(SimulatedPort::new(Simulator::new()), config);
//!
//! oven.set_setpoint(40.0)?;
//! oven.run()?;
//! assert_eq!(oven.mode()?, ModeFlags::MANUAL_MODE);
//! # Ok::<(), thermotron::Error>(())
//! ```

pub mod error;
pub mod mode;
pub mod oven;
pub mod sim;
pub mod transport;

pub use error::{Error, Result};
pub use mode::{decode, ModeFlags, OvenMode};
pub use oven::{DriverConfig, Thermotron3800};
pub use sim::{SimulatedPort, Simulator};
pub use transport::{SerialTransport, Transport};
