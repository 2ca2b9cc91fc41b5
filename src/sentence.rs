//! Parser for the sentences streamed by a kismet server.
//!
//! This module uses the `nom` parsing library to parse the line-oriented
//! kismet wire protocol. Every line is a sentence: a marker token
//! followed by whitespace-separated positional fields.
//!
//! # Sentence Formats
//!
//! ```text
//! *CLISRC: <bssid> <device-eui48> <drone-uuid> <timestamp> <packet-count> <signal-strength>
//! *SOURCE: <interface> <type> [<name> <channel> <drone-uuid>]
//! *TIME: <timestamp>
//! ```
//!
//! Sentences with any other marker are ignored in full; this
//! permissiveness is deliberate so that newer servers can emit sentence
//! kinds this crate does not know about.

use macaddr::MacAddr6;
use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::multispace0,
    combinator::map_res,
    sequence::preceded,
};
use thiserror::Error;
use uuid::Uuid;

use crate::message::MeasuredValue;

/// Errors that can occur during sentence parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty sentence")]
    Empty,

    #[error("invalid {0} sentence: {1}")]
    InvalidSentence(&'static str, String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A classified sentence from the kismet feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    /// A `*CLISRC:` measurement.
    Measurement(MeasuredValue),

    /// A `*SOURCE:` sentence describing a drone capture source.
    DroneSource { drone_id: Uuid, name: String },

    /// A `*TIME:` cycle boundary.
    Time { timestamp: i64 },

    /// An unrecognized marker, or a `*SOURCE:` sentence for something
    /// other than a drone. Causes no state change.
    Ignored,
}

/// Parse one whitespace-separated field.
fn field(input: &str) -> IResult<&str, &str> {
    preceded(multispace0, take_while1(|c: char| !c.is_whitespace())).parse(input)
}

/// Parse an EUI-48 hardware address field.
fn device_field(input: &str) -> IResult<&str, MacAddr6> {
    map_res(field, |s: &str| s.parse::<MacAddr6>()).parse(input)
}

/// Parse a drone UUID field.
fn drone_field(input: &str) -> IResult<&str, Uuid> {
    map_res(field, |s: &str| s.parse::<Uuid>()).parse(input)
}

/// Parse a base-10 signed 64-bit integer field.
fn i64_field(input: &str) -> IResult<&str, i64> {
    map_res(field, |s: &str| s.parse::<i64>()).parse(input)
}

/// Parse a base-10 signed 32-bit integer field.
fn i32_field(input: &str) -> IResult<&str, i32> {
    map_res(field, |s: &str| s.parse::<i32>()).parse(input)
}

/// Parse the body of a `*CLISRC:` sentence.
fn parse_measurement(input: &str) -> IResult<&str, MeasuredValue> {
    let (input, _bssid) = field(input)?;
    let (input, device_id) = device_field(input)?;
    let (input, drone_id) = drone_field(input)?;
    let (input, timestamp) = i64_field(input)?;
    let (input, _packet_count) = i64_field(input)?;
    let (input, signal_strength) = i32_field(input)?;

    Ok((
        input,
        MeasuredValue {
            device_id,
            drone_id,
            signal_strength,
            timestamp,
        },
    ))
}

/// Parse the body of a `*SOURCE:` sentence.
///
/// Only sources with interface and type both equal to "drone" carry a
/// name and UUID; every other interface/type combination is ignored
/// without looking at the type-specific tail.
fn parse_source(input: &str) -> IResult<&str, Sentence> {
    let (input, interface) = field(input)?;
    let (input, source_type) = field(input)?;
    if interface != "drone" || source_type != "drone" {
        return Ok((input, Sentence::Ignored));
    }

    let (input, name) = field(input)?;
    let (input, _channel) = field(input)?;
    let (input, drone_id) = drone_field(input)?;

    Ok((
        input,
        Sentence::DroneSource {
            drone_id,
            name: name.to_string(),
        },
    ))
}

/// Parse the body of a `*TIME:` sentence.
fn parse_time(input: &str) -> IResult<&str, i64> {
    i64_field(input)
}

/// Classify and parse a complete sentence line.
///
/// The line must already be newline-stripped. The marker is the first
/// whitespace-separated field and must match exactly; unknown markers
/// yield [`Sentence::Ignored`]. A line without any field at all is a
/// parse failure. Extra fields after a recognized grammar are permitted
/// and ignored.
///
/// # Example
///
/// ```
/// use kismet_bridge::sentence::{Sentence, parse_sentence};
///
/// let sentence = parse_sentence("*TIME: 1001").unwrap();
/// assert_eq!(sentence, Sentence::Time { timestamp: 1001 });
/// ```
pub fn parse_sentence(line: &str) -> ParseResult<Sentence> {
    let line = line.trim();
    let Some(marker) = line.split_whitespace().next() else {
        return Err(ParseError::Empty);
    };
    let body = &line[marker.len()..];

    match marker {
        "*CLISRC:" => match parse_measurement(body) {
            Ok((_, value)) => Ok(Sentence::Measurement(value)),
            Err(e) => Err(ParseError::InvalidSentence("*CLISRC:", format!("{:?}", e))),
        },
        "*SOURCE:" => match parse_source(body) {
            Ok((_, sentence)) => Ok(sentence),
            Err(e) => Err(ParseError::InvalidSentence("*SOURCE:", format!("{:?}", e))),
        },
        "*TIME:" => match parse_time(body) {
            Ok((_, timestamp)) => Ok(Sentence::Time { timestamp }),
            Err(e) => Err(ParseError::InvalidSentence("*TIME:", format!("{:?}", e))),
        },
        _ => Ok(Sentence::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRONE_ID: &str = "7c1e5200-0000-0000-0000-000000000001";

    #[test]
    fn test_parse_measurement_sentence() {
        let line = format!("*CLISRC: 00:11:22:33:44:55 AA:BB:CC:DD:EE:FF {DRONE_ID} 1000 12 -42");
        let sentence = parse_sentence(&line).expect("Should parse successfully");

        let Sentence::Measurement(value) = sentence else {
            panic!("Expected a measurement, got {:?}", sentence);
        };
        assert_eq!(value.device_id, "AA:BB:CC:DD:EE:FF".parse::<MacAddr6>().unwrap());
        assert_eq!(value.drone_id, DRONE_ID.parse::<Uuid>().unwrap());
        assert_eq!(value.signal_strength, -42);
        assert_eq!(value.timestamp, 1000);
    }

    #[test]
    fn test_parse_drone_source_sentence() {
        let line = format!("*SOURCE: drone drone alpha 6 {DRONE_ID}");
        let sentence = parse_sentence(&line).expect("Should parse successfully");

        assert_eq!(
            sentence,
            Sentence::DroneSource {
                drone_id: DRONE_ID.parse().unwrap(),
                name: "alpha".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_time_sentence() {
        let sentence = parse_sentence("*TIME: 1001").expect("Should parse successfully");
        assert_eq!(sentence, Sentence::Time { timestamp: 1001 });
    }

    #[test]
    fn test_unknown_marker_is_ignored() {
        assert_eq!(parse_sentence("*NETWORK: foo bar").unwrap(), Sentence::Ignored);
        assert_eq!(parse_sentence("*KISMET: 0.0.0").unwrap(), Sentence::Ignored);
    }

    #[test]
    fn test_marker_must_match_exactly() {
        // A marker with trailing garbage is a different token entirely.
        assert_eq!(parse_sentence("*CLISRC:x a b").unwrap(), Sentence::Ignored);
        assert_eq!(parse_sentence("*time: 1001").unwrap(), Sentence::Ignored);
    }

    #[test]
    fn test_non_drone_source_is_ignored() {
        let line = "*SOURCE: wlan0 pcapfile capture.pcap";
        assert_eq!(parse_sentence(line).unwrap(), Sentence::Ignored);

        // The type-specific tail is never inspected for non-drone sources.
        let line = "*SOURCE: drone pcapfile";
        assert_eq!(parse_sentence(line).unwrap(), Sentence::Ignored);
    }

    #[test]
    fn test_empty_line_is_a_parse_failure() {
        assert!(matches!(parse_sentence(""), Err(ParseError::Empty)));
        assert!(matches!(parse_sentence("   \t "), Err(ParseError::Empty)));
    }

    #[test]
    fn test_truncated_measurement_fails() {
        let line = format!("*CLISRC: 00:11:22:33:44:55 AA:BB:CC:DD:EE:FF {DRONE_ID} 1000");
        assert!(parse_sentence(&line).is_err());
    }

    #[test]
    fn test_truncated_drone_source_fails() {
        // Drone sources require name, channel, and UUID.
        assert!(parse_sentence("*SOURCE: drone drone alpha").is_err());
        // Even the type field alone missing is a failure.
        assert!(parse_sentence("*SOURCE: drone").is_err());
    }

    #[test]
    fn test_non_numeric_fields_fail() {
        let line = format!("*CLISRC: 00:11:22:33:44:55 AA:BB:CC:DD:EE:FF {DRONE_ID} soon 12 -42");
        assert!(parse_sentence(&line).is_err());
        assert!(parse_sentence("*TIME: nope").is_err());
    }

    #[test]
    fn test_invalid_identifiers_fail() {
        let line = format!("*CLISRC: 00:11:22:33:44:55 not-a-mac {DRONE_ID} 1000 12 -42");
        assert!(parse_sentence(&line).is_err());

        let line = "*CLISRC: 00:11:22:33:44:55 AA:BB:CC:DD:EE:FF not-a-uuid 1000 12 -42";
        assert!(parse_sentence(line).is_err());
    }

    #[test]
    fn test_trailing_fields_are_permitted() {
        let line = format!("*SOURCE: drone drone alpha 6 {DRONE_ID} extra junk");
        assert!(matches!(
            parse_sentence(&line).unwrap(),
            Sentence::DroneSource { .. }
        ));

        assert_eq!(
            parse_sentence("*TIME: 1001 42").unwrap(),
            Sentence::Time { timestamp: 1001 }
        );
    }

    #[test]
    fn test_leading_whitespace_is_tolerated() {
        let sentence = parse_sentence("  *TIME: 7\r").expect("Should parse successfully");
        assert_eq!(sentence, Sentence::Time { timestamp: 7 });
    }
}
