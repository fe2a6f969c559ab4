//! Error taxonomy for the DNP3 master stack.

use std::time::Duration;

/// The seven error kinds a conforming core can surface, by cause.
#[derive(thiserror::Error, Debug)]
pub enum Dnp3Error {
    #[error("communication failure with {host}:{port}: {message}")]
    Communication {
        message: String,
        host: String,
        port: u16,
    },

    #[error("timeout after {timeout:?}: {message}")]
    Timeout { message: String, timeout: Duration },

    #[error("CRC mismatch: expected {expected:#06x}, computed {actual:#06x}")]
    Crc { expected: u16, actual: u16 },

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("protocol error (function_code={function_code:?}): {message}")]
    Protocol {
        message: String,
        function_code: Option<u8>,
    },

    #[error("object error (group={group:?}, variation={variation:?}): {message}")]
    Object {
        message: String,
        group: Option<u8>,
        variation: Option<u8>,
    },

    #[error("control error (status={status:?}): {message}")]
    Control { message: String, status: Option<u8> },
}

impl Dnp3Error {
    pub fn communication(message: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Dnp3Error::Communication {
            message: message.into(),
            host: host.into(),
            port,
        }
    }

    pub fn timeout(message: impl Into<String>, timeout: Duration) -> Self {
        Dnp3Error::Timeout {
            message: message.into(),
            timeout,
        }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Dnp3Error::Frame(message.into())
    }

    pub fn protocol(message: impl Into<String>, function_code: Option<u8>) -> Self {
        Dnp3Error::Protocol {
            message: message.into(),
            function_code,
        }
    }

    pub fn object(message: impl Into<String>, group: Option<u8>, variation: Option<u8>) -> Self {
        Dnp3Error::Object {
            message: message.into(),
            group,
            variation,
        }
    }

    pub fn control(message: impl Into<String>, status: Option<u8>) -> Self {
        Dnp3Error::Control {
            message: message.into(),
            status,
        }
    }

    /// CRC and Frame errors are recoverable locally during a receive loop
    /// (skip a byte, rescan); everything else must surface to the caller.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, Dnp3Error::Crc { .. } | Dnp3Error::Frame(_))
    }

    /// Whole-exchange retry is only for transient link problems. Protocol,
    /// Object, and Control errors mean the outstation replied, so retrying
    /// would just repeat the same answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Dnp3Error::Communication { .. } | Dnp3Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Dnp3Error>;
