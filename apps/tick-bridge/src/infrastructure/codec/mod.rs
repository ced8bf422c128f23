//! Bus Message Codec
//!
//! JSON wire formats for the three bridge channels.
//!
//! # Channels
//!
//! - `ticks`: [`TickMessage`]
//! - `historicalPrices`: [`HistoryMessage`]
//! - `priceRequests`: a JSON array holding exactly one [`PriceRequestMessage`]
//!
//! Prices and tick timestamps are carried as `Decimal` internally and written
//! as JSON numbers.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::market::{
    HistoryPoint, HistoryRequest, HistorySegment, ProviderRequestId, RequestError, Tick,
};

/// Status published ahead of a segment that filled a whole page.
pub const FULL_PAGE_STATUS: &str = ">300 data";

/// Error text for a window the provider cannot serve.
pub const NO_TICKS_IN_RANGE: &str = "No ticks in range";

// =============================================================================
// Errors
// =============================================================================

/// Encoding and decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Malformed JSON or a shape mismatch.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Request array did not hold exactly one element.
    #[error("expected exactly one request, got {0}")]
    ElementCount(usize),

    /// Fields decoded but failed validation.
    #[error("invalid request: {0}")]
    Invalid(#[from] RequestError),
}

// =============================================================================
// ticks
// =============================================================================

/// Live quote on the `ticks` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMessage {
    /// Always `true` for provider quotes.
    pub real: bool,
    /// Normalized pair, e.g. `usdcad`.
    pub pair: String,
    /// Fractional epoch seconds.
    #[serde(with = "rust_decimal::serde::float")]
    pub timestamp: Decimal,
    /// Bid price.
    #[serde(with = "rust_decimal::serde::float")]
    pub bid: Decimal,
    /// Ask price.
    #[serde(with = "rust_decimal::serde::float")]
    pub ask: Decimal,
}

impl From<&Tick> for TickMessage {
    fn from(tick: &Tick) -> Self {
        Self {
            real: true,
            pair: tick.pair(),
            timestamp: tick.timestamp_seconds,
            bid: tick.bid,
            ask: tick.ask,
        }
    }
}

// =============================================================================
// historicalPrices
// =============================================================================

/// One row of a published segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRow {
    /// Bar time, epoch milliseconds.
    pub timestamp: i64,
    /// Bid price.
    #[serde(with = "rust_decimal::serde::float")]
    pub bid: Decimal,
    /// Ask price.
    #[serde(with = "rust_decimal::serde::float")]
    pub ask: Decimal,
}

impl From<&HistoryPoint> for SegmentRow {
    fn from(point: &HistoryPoint) -> Self {
        Self {
            timestamp: point.timestamp.timestamp_millis(),
            bid: point.bid,
            ask: point.ask,
        }
    }
}

/// Replies carrying a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HistoryReply {
    /// Acknowledgement binding a provider request id to the caller's uuid.
    #[serde(rename = "segmentID")]
    SegmentId {
        /// Provider request id.
        id: ProviderRequestId,
        /// Caller correlation id.
        uuid: String,
    },
    /// Snapshot rows.
    #[serde(rename = "segment")]
    Segment {
        /// Provider request id.
        id: ProviderRequestId,
        /// Rows in provider order.
        data: Vec<SegmentRow>,
    },
}

/// Any message on the `historicalPrices` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryMessage {
    /// Acknowledgement or segment.
    Reply(HistoryReply),
    /// Out-of-band status.
    Status {
        /// Status text.
        status: String,
    },
    /// Request-level error.
    Error {
        /// Error text.
        error: String,
        /// Provider request id.
        id: ProviderRequestId,
    },
}

impl HistoryMessage {
    /// Acknowledgement for a created request.
    #[must_use]
    pub const fn ack(id: ProviderRequestId, uuid: String) -> Self {
        Self::Reply(HistoryReply::SegmentId { id, uuid })
    }

    /// Segment carrying every row of a snapshot.
    #[must_use]
    pub fn segment(segment: &HistorySegment) -> Self {
        Self::Reply(HistoryReply::Segment {
            id: segment.request_id.clone(),
            data: segment.points.iter().map(SegmentRow::from).collect(),
        })
    }

    /// Full-page marker.
    #[must_use]
    pub fn full_page() -> Self {
        Self::Status {
            status: FULL_PAGE_STATUS.to_string(),
        }
    }

    /// Empty-range error.
    #[must_use]
    pub fn no_ticks(id: ProviderRequestId) -> Self {
        Self::Error {
            error: NO_TICKS_IN_RANGE.to_string(),
            id,
        }
    }
}

// =============================================================================
// priceRequests
// =============================================================================

/// Inbound history request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRequestMessage {
    /// Provider instrument symbol, e.g. `USD/CAD`.
    pub pair: String,
    /// Window start, epoch milliseconds.
    pub start_time: i64,
    /// Window end, epoch milliseconds.
    pub end_time: i64,
    /// Timeframe code.
    pub resolution: String,
    /// Caller correlation id.
    pub uuid: String,
}

impl PriceRequestMessage {
    /// Validate into a domain request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for any invalid field.
    pub fn into_request(self) -> Result<HistoryRequest, RequestError> {
        HistoryRequest::from_millis(
            &self.pair,
            &self.resolution,
            self.start_time,
            self.end_time,
            &self.uuid,
        )
    }
}

// =============================================================================
// Encode / Decode
// =============================================================================

/// Serialize a wire message.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Deserialize a wire message.
///
/// # Errors
///
/// Returns [`CodecError::Json`] on malformed input.
pub fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(payload)?)
}

/// Decode a `priceRequests` payload.
///
/// # Errors
///
/// Returns [`CodecError`] when the payload is not an array of exactly one
/// well-formed request object.
pub fn decode_price_request(payload: &str) -> Result<PriceRequestMessage, CodecError> {
    let mut requests: Vec<PriceRequestMessage> = decode(payload)?;
    if requests.len() != 1 {
        return Err(CodecError::ElementCount(requests.len()));
    }
    requests.pop().ok_or(CodecError::ElementCount(0))
}

/// Decode and validate a `priceRequests` payload.
///
/// # Errors
///
/// Returns [`CodecError`] on malformed input or invalid fields.
pub fn decode_history_request(payload: &str) -> Result<HistoryRequest, CodecError> {
    Ok(decode_price_request(payload)?.into_request()?)
}

/// Encode a request the way callers put it on `priceRequests`.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_price_request(request: &PriceRequestMessage) -> Result<String, CodecError> {
    encode(&[request])
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::*;
    use crate::domain::market::Timeframe;

    fn as_value(payload: &str) -> Value {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn tick_message_shape() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let tick = Tick::at("USD/CAD", Decimal::new(13_512, 4), Decimal::new(13_515, 4), at);

        let encoded = encode(&TickMessage::from(&tick)).unwrap();

        assert_eq!(
            as_value(&encoded),
            json!({
                "real": true,
                "pair": "usdcad",
                "timestamp": 1_700_000_000.123,
                "bid": 1.3512,
                "ask": 1.3515
            })
        );
    }

    #[test]
    fn ack_shape() {
        let msg = HistoryMessage::ack(ProviderRequestId::new("R1"), "U1".to_string());
        assert_eq!(
            as_value(&encode(&msg).unwrap()),
            json!({"type": "segmentID", "id": "R1", "uuid": "U1"})
        );
    }

    #[test]
    fn segment_shape_keeps_row_order() {
        let t0 = Utc.timestamp_millis_opt(1_609_459_200_000).unwrap();
        let points = vec![
            HistoryPoint {
                timestamp: t0,
                bid: Decimal::new(12_000, 4),
                ask: Decimal::new(12_002, 4),
            },
            HistoryPoint {
                timestamp: t0 + chrono::TimeDelta::minutes(1),
                bid: Decimal::new(12_010, 4),
                ask: Decimal::new(12_012, 4),
            },
        ];
        let segment = HistorySegment::new(ProviderRequestId::new("R7"), points);

        let encoded = encode(&HistoryMessage::segment(&segment)).unwrap();

        assert_eq!(
            as_value(&encoded),
            json!({
                "type": "segment",
                "id": "R7",
                "data": [
                    {"timestamp": 1_609_459_200_000_i64, "bid": 1.2, "ask": 1.2002},
                    {"timestamp": 1_609_459_260_000_i64, "bid": 1.201, "ask": 1.2012}
                ]
            })
        );
    }

    #[test]
    fn status_and_error_shapes() {
        assert_eq!(
            as_value(&encode(&HistoryMessage::full_page()).unwrap()),
            json!({"status": ">300 data"})
        );
        assert_eq!(
            as_value(&encode(&HistoryMessage::no_ticks(ProviderRequestId::new("R3"))).unwrap()),
            json!({"error": "No ticks in range", "id": "R3"})
        );
    }

    #[test]
    fn history_messages_decode_to_their_variant() {
        let ack: HistoryMessage = decode(r#"{"type":"segmentID","id":"R1","uuid":"U"}"#).unwrap();
        assert_eq!(ack, HistoryMessage::ack("R1".into(), "U".into()));

        let status: HistoryMessage = decode(r#"{"status":">300 data"}"#).unwrap();
        assert_eq!(status, HistoryMessage::full_page());

        let error: HistoryMessage = decode(r#"{"error":"No ticks in range","id":"R2"}"#).unwrap();
        assert_eq!(error, HistoryMessage::no_ticks("R2".into()));
    }

    #[test]
    fn decodes_single_request() {
        let payload = r#"[{"pair":"USD/CAD","startTime":1609459200000,"endTime":1609462800000,"resolution":"m1","uuid":"abc"}]"#;

        let request = decode_history_request(payload).unwrap();

        assert_eq!(request.pair, "USD/CAD");
        assert_eq!(request.timeframe, Timeframe::Minute1);
        assert_eq!(request.start_time.timestamp_millis(), 1_609_459_200_000);
        assert_eq!(request.client_correlation_id, "abc");
    }

    #[test]
    fn rejects_wrong_element_count() {
        assert!(matches!(
            decode_price_request("[]"),
            Err(CodecError::ElementCount(0))
        ));

        let two = r#"[{"pair":"A/B","startTime":0,"endTime":1,"resolution":"m1","uuid":"a"},{"pair":"A/B","startTime":0,"endTime":1,"resolution":"m1","uuid":"b"}]"#;
        assert!(matches!(
            decode_price_request(two),
            Err(CodecError::ElementCount(2))
        ));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            decode_price_request("not json"),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            decode_price_request(r#"{"pair":"A/B"}"#),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            decode_price_request(r#"[{"pair":"A/B","startTime":"x","endTime":1,"resolution":"m1","uuid":"a"}]"#),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn rejects_invalid_fields() {
        let payload =
            r#"[{"pair":"EUR/USD","startTime":10,"endTime":5,"resolution":"m1","uuid":"a"}]"#;
        assert!(matches!(
            decode_history_request(payload),
            Err(CodecError::Invalid(RequestError::InvertedWindow { .. }))
        ));
    }

    proptest! {
        #[test]
        fn request_survives_encode_decode(
            pair in "[A-Z]{3}/[A-Z]{3}",
            start in 0_i64..4_000_000_000_000,
            span in 0_i64..100_000_000,
            resolution in prop::sample::select(
                Timeframe::all().iter().map(|tf| tf.code()).collect::<Vec<_>>()
            ),
            uuid in "[a-f0-9-]{1,36}",
        ) {
            let message = PriceRequestMessage {
                pair,
                start_time: start,
                end_time: start + span,
                resolution: resolution.to_string(),
                uuid,
            };

            let encoded = encode_price_request(&message).unwrap();
            let decoded = decode_price_request(&encoded).unwrap();
            prop_assert_eq!(&decoded, &message);

            let request = decoded.into_request().unwrap();
            prop_assert_eq!(request.start_time.timestamp_millis(), message.start_time);
            prop_assert_eq!(request.end_time.timestamp_millis(), message.end_time);
            prop_assert_eq!(request.timeframe.code(), message.resolution.as_str());
        }
    }
}
