//! Bank file: container format for per-event telescope-array data.
//!
//! This crate provides:
//! - **Records** (`event`, `array_trigger`, `array_event`): one telescope's
//!   zero-suppressed event, the array trigger, and the bank grouping them.
//! - **Packets** (`packet`): the per-event-number set of typed banks.
//! - **Writer** (`writer`): `BankFileWriter::create`, `write_packet`, `finalize`.
//! - **Reader** (`reader`): `BankFileReader::open` with O(1) `read_packet` via
//!   the trailer index, or a sequential scan for files never finalized.
//! - **Diagnostics** (`error`): one error type with a kind tag, throw site and
//!   an ordered comment trail.
//! - **Binary** `bankfile`: write synthetic runs, print events, check files.

pub mod array_event;
pub mod array_trigger;
pub mod bit_pattern;
pub mod channel_data;
pub mod config;
pub mod config_mask;
pub mod error;
pub mod event;
pub mod format;
pub mod gps;
pub mod packet;
pub mod reader;
pub mod simulation;
pub mod synthetic;
mod wire;
pub mod writer;

pub use array_event::{ArrayEvent, MAX_EVENTS};
pub use array_trigger::{ArrayTriggerRecord, SubarrayTelescope, ARRAY_TRIGGER_NODE};
pub use bit_pattern::BitPattern;
pub use channel_data::ChannelDataStore;
pub use config::SyntheticRunConfig;
pub use config_mask::ConfigMask;
pub use error::{Diagnostic, ErrorKind, Result, ResultExt};
pub use event::{ClockTrigBoard, EventRecord, CLOCK_TRIG_WORDS, GPS_TIME_WORDS};
pub use format::{FileHeader, IndexEntry, FILE_MAGIC, FORMAT_VERSION};
pub use gps::GpsTime;
pub use packet::{Bank, BankKind, BankPayload, Packet};
pub use reader::{BankFileReader, Packets};
pub use simulation::{
    CorsikaSimulationData, PixelLocation, SimulationData, SimulationHeader, TelescopeLocation,
};
pub use writer::{BankFileWriter, FinalizeReport};
