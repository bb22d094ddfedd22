//! Turning raw link bytes into normalized readings
//!
//! - `FramedReader` splits the byte stream into newline-delimited JSON records
//! - `Normalizer` maps short wire keys onto the fixed `SensorReading` schema

mod framing;
mod normalize;

pub use framing::{FramedReader, DEFAULT_MAX_LINE_LEN};
pub use normalize::{dew_point, Normalizer, WireField, WIRE_FIELDS};
