//! Shared data model for the bike rental map
//!
//! - `types`: station records, filter criteria and search hits
//! - `parse`: validating conversion from loose provider payloads

pub mod parse;
pub mod types;

pub use parse::{
    parse_json_records, parse_stations, validate_location, validate_station, ParsedStations,
    RawStation, Rejection, ValidationError,
};
pub use types::*;
