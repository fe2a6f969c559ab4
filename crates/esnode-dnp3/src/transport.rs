//! DNP3 Transport Function: segmentation and reassembly.
//!
//! One header byte per segment: bit 7 FIN, bit 6 FIR, bits 5..0 a 6-bit
//! sequence number that wraps at 64.

use std::time::{Duration, Instant};

use crate::error::{Dnp3Error, Result};

pub const MAX_SEGMENT_PAYLOAD: usize = 249;
pub const SEQUENCE_MASK: u8 = 0x3F;
pub const SEQUENCE_MODULUS: u8 = 64;
pub const FIR_FLAG: u8 = 0x40;
pub const FIN_FLAG: u8 = 0x80;
pub const MAX_MESSAGE_SIZE: usize = 65536;
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSegment {
    pub sequence: u8,
    pub is_first: bool,
    pub is_final: bool,
    pub payload: Vec<u8>,
}

impl TransportSegment {
    pub fn header(&self) -> u8 {
        let mut h = self.sequence & SEQUENCE_MASK;
        if self.is_first {
            h |= FIR_FLAG;
        }
        if self.is_final {
            h |= FIN_FLAG;
        }
        h
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Dnp3Error::frame("transport segment data too short"));
        }
        let header = data[0];
        Ok(TransportSegment {
            sequence: header & SEQUENCE_MASK,
            is_first: header & FIR_FLAG != 0,
            is_final: header & FIN_FLAG != 0,
            payload: data[1..].to_vec(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.sequence > SEQUENCE_MASK {
            return Err(Dnp3Error::frame(format!(
                "invalid sequence number {}, must be 0-63",
                self.sequence
            )));
        }
        if self.payload.len() > MAX_SEGMENT_PAYLOAD {
            return Err(Dnp3Error::frame(format!(
                "segment payload exceeds maximum: {} > {MAX_SEGMENT_PAYLOAD}",
                self.payload.len()
            )));
        }
        Ok(())
    }
}

struct RxState {
    buffer: Vec<u8>,
    expected_sequence: u8,
    last_sequence: u8,
    start_time: Instant,
    timeout: Duration,
}

/// Transport Function encoder/decoder. Tracks one transmit sequence
/// counter and, while a multi-segment message is in flight, one receive
/// state machine.
pub struct TransportLayer {
    tx_sequence: u8,
    rx: Option<RxState>,
}

impl Default for TransportLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportLayer {
    pub fn new() -> Self {
        TransportLayer {
            tx_sequence: 0,
            rx: None,
        }
    }

    fn next_tx_sequence(&mut self) -> u8 {
        let seq = self.tx_sequence;
        self.tx_sequence = (self.tx_sequence + 1) & SEQUENCE_MASK;
        seq
    }

    /// Segment an APDU into transport-layer segment byte strings.
    pub fn segment(&mut self, apdu: &[u8], max_payload: usize) -> Vec<Vec<u8>> {
        if apdu.is_empty() {
            let segment = TransportSegment {
                sequence: self.next_tx_sequence(),
                is_first: true,
                is_final: true,
                payload: Vec::new(),
            };
            return vec![segment.to_bytes()];
        }

        let mut segments = Vec::new();
        let mut offset = 0;
        let total_length = apdu.len();

        while offset < total_length {
            let remaining = total_length - offset;
            let payload_size = remaining.min(max_payload);
            let payload = apdu[offset..offset + payload_size].to_vec();
            let is_first = offset == 0;
            let is_final = offset + payload_size >= total_length;

            let segment = TransportSegment {
                sequence: self.next_tx_sequence(),
                is_first,
                is_final,
                payload,
            };
            segments.push(segment.to_bytes());
            offset += payload_size;
        }

        segments
    }

    /// Process one received segment, returning the reassembled APDU once
    /// the final segment arrives.
    pub fn reassemble(
        &mut self,
        segment_data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        let segment = TransportSegment::from_bytes(segment_data)?;
        segment.validate()?;

        let timeout = timeout.unwrap_or(DEFAULT_REASSEMBLY_TIMEOUT);

        if segment.is_first {
            self.rx = Some(RxState {
                buffer: segment.payload.clone(),
                expected_sequence: (segment.sequence + 1) & SEQUENCE_MASK,
                last_sequence: segment.sequence,
                start_time: Instant::now(),
                timeout,
            });

            if segment.is_final {
                let result = self.rx.take().unwrap().buffer;
                return Ok(Some(result));
            }
            return Ok(None);
        }

        let rx = match self.rx.as_mut() {
            Some(rx) => rx,
            None => {
                return Err(Dnp3Error::frame(format!(
                    "received continuation segment without first segment (seq={}, FIN={})",
                    segment.sequence, segment.is_final
                )));
            }
        };

        let elapsed = rx.start_time.elapsed();
        if elapsed > rx.timeout {
            self.reset_rx();
            return Err(Dnp3Error::frame(format!(
                "reassembly timeout exceeded: {:.2}s > {:.2}s",
                elapsed.as_secs_f64(),
                rx.timeout.as_secs_f64()
            )));
        }

        if segment.sequence == rx.last_sequence {
            // Duplicate retransmission, ignore silently.
            return Ok(None);
        }

        if segment.sequence != rx.expected_sequence {
            let expected = rx.expected_sequence;
            let actual = segment.sequence;
            self.reset_rx();
            return Err(Dnp3Error::frame(format!(
                "sequence mismatch: expected {expected}, got {actual}. possible lost segment or out-of-order delivery"
            )));
        }

        let new_size = rx.buffer.len() + segment.payload.len();
        if new_size > MAX_MESSAGE_SIZE {
            self.reset_rx();
            return Err(Dnp3Error::frame(format!(
                "reassembled message exceeds size limit: {new_size} > {MAX_MESSAGE_SIZE} bytes"
            )));
        }

        rx.buffer.extend_from_slice(&segment.payload);
        rx.expected_sequence = (segment.sequence + 1) & SEQUENCE_MASK;
        rx.last_sequence = segment.sequence;

        if segment.is_final {
            let result = self.rx.take().unwrap().buffer;
            return Ok(Some(result));
        }

        Ok(None)
    }

    fn reset_rx(&mut self) {
        self.rx = None;
    }

    /// Reset both transmit and receive state.
    pub fn reset(&mut self) {
        self.tx_sequence = 0;
        self.reset_rx();
    }

    pub fn tx_sequence(&self) -> u8 {
        self.tx_sequence
    }

    pub fn is_receiving(&self) -> bool {
        self.rx.is_some()
    }

    pub fn parse_header(header_byte: u8) -> (u8, bool, bool) {
        (
            header_byte & SEQUENCE_MASK,
            header_byte & FIR_FLAG != 0,
            header_byte & FIN_FLAG != 0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_apdu_segments_to_single_fir_fin_segment() {
        let mut tf = TransportLayer::new();
        let segments = tf.segment(&[], MAX_SEGMENT_PAYLOAD);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0], vec![FIR_FLAG | FIN_FLAG]);
        assert_eq!(tf.tx_sequence(), 1);
    }

    #[test]
    fn multi_segment_apdu_splits_and_reassembles() {
        let mut tx = TransportLayer::new();
        let apdu: Vec<u8> = (0..600u32).map(|i| (i % 256) as u8).collect();
        let segments = tx.segment(&apdu, MAX_SEGMENT_PAYLOAD);
        assert_eq!(segments.len(), 3); // 249 + 249 + 102

        let mut rx = TransportLayer::new();
        let mut result = None;
        for seg in &segments {
            result = rx.reassemble(seg, None).unwrap();
        }
        assert_eq!(result.unwrap(), apdu);
    }

    #[test]
    fn continuation_without_first_segment_errors() {
        let mut rx = TransportLayer::new();
        let continuation = TransportSegment {
            sequence: 1,
            is_first: false,
            is_final: true,
            payload: vec![1, 2, 3],
        }
        .to_bytes();
        assert!(rx.reassemble(&continuation, None).is_err());
    }

    #[test]
    fn sequence_mismatch_resets_and_errors() {
        let mut tx = TransportLayer::new();
        let apdu: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
        let segments = tx.segment(&apdu, MAX_SEGMENT_PAYLOAD);
        assert_eq!(segments.len(), 3);

        let mut rx = TransportLayer::new();
        rx.reassemble(&segments[0], None).unwrap();
        let err = rx.reassemble(&segments[2], None).unwrap_err();
        assert!(matches!(err, Dnp3Error::Frame(_)));
        assert!(!rx.is_receiving());
    }

    #[test]
    fn duplicate_segment_is_ignored_silently() {
        let mut tx = TransportLayer::new();
        let apdu: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
        let segments = tx.segment(&apdu, MAX_SEGMENT_PAYLOAD);

        let mut rx = TransportLayer::new();
        rx.reassemble(&segments[0], None).unwrap();
        assert!(rx.reassemble(&segments[0], None).unwrap().is_none());
        assert!(rx.is_receiving());
    }

    #[test]
    fn fir_mid_receive_restarts_reassembly() {
        let mut tx = TransportLayer::new();
        let first_apdu: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
        let first_segments = tx.segment(&first_apdu, MAX_SEGMENT_PAYLOAD);

        let mut rx = TransportLayer::new();
        rx.reassemble(&first_segments[0], None).unwrap();
        assert!(rx.is_receiving());

        let mut tx2 = TransportLayer::new();
        let second_apdu = vec![9u8, 8, 7];
        let second_segments = tx2.segment(&second_apdu, MAX_SEGMENT_PAYLOAD);
        let result = rx.reassemble(&second_segments[0], None).unwrap();
        assert_eq!(result.unwrap(), second_apdu);
    }

    #[test]
    fn oversized_segment_payload_is_rejected() {
        let segment = TransportSegment {
            sequence: 0,
            is_first: true,
            is_final: true,
            payload: vec![0u8; MAX_SEGMENT_PAYLOAD + 1],
        };
        assert!(segment.validate().is_err());
    }

    #[test]
    fn reset_clears_tx_and_rx_state() {
        let mut tf = TransportLayer::new();
        tf.segment(&[1, 2, 3], MAX_SEGMENT_PAYLOAD);
        tf.reassemble(&[FIR_FLAG], None).unwrap();
        assert!(tf.is_receiving());
        tf.reset();
        assert_eq!(tf.tx_sequence(), 0);
        assert!(!tf.is_receiving());
    }

    #[test]
    fn parse_header_extracts_fields() {
        let (seq, fir, fin) = TransportLayer::parse_header(FIR_FLAG | FIN_FLAG | 5);
        assert_eq!(seq, 5);
        assert!(fir);
        assert!(fin);
    }
}
