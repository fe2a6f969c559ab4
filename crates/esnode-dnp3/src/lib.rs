//! A DNP3 (IEEE 1815) master-station protocol stack: CRC-16, Data Link Layer
//! (FT3 framing), Transport Function (segmentation/reassembly), Application
//! Layer (fragments, IIN, object headers), object codecs, and a `Master`
//! coordinator that drives integrity/class polls, typed reads, and control
//! operations (Direct-Operate / Select-Before-Operate) against an outstation.

pub mod application;
pub mod byte_stream;
pub mod config;
pub mod crc;
pub mod datalink;
pub mod driver;
pub mod error;
pub mod master;
pub mod objects;
pub mod transport;

pub use config::Dnp3Config;
pub use driver::{Dnp3Driver, PointMapping};
pub use error::{Dnp3Error, Result};
pub use master::{ControlStatus, Master, PollResult};
