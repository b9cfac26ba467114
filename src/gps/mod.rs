// src/gps/mod.rs
//! GPS fix decoding and motion analytics

pub mod data;
pub mod epoch;
pub mod motion;
pub mod nmea;

pub use data::{Fix, FixType, SentenceKind};
pub use epoch::EpochMerger;
pub use motion::MotionState;
pub use nmea::NmeaSentence;
