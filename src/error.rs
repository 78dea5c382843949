//! Error type shared by the driver, the transports and the decoder boundary.

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No complete response line arrived before the port timeout.
    #[error("timed out waiting for a response")]
    Timeout,

    #[error("empty response to '{0}'")]
    EmptyResponse(String),

    /// The oven answered, but not with something we can interpret.
    #[error("invalid response to '{command}': {response:?}")]
    InvalidResponse { command: String, response: String },

    #[error("value {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}
