//! Frame model, frame builder, and the incremental resynchronising
//! parser (spec §4.2, §4.3).

use bytes::BytesMut;
use tracing::{trace, warn};

use crate::constants::{Command, ETX, MAX_PAYLOAD, SensorId, STX};
use crate::crc::Crc8;
use crate::error::PsaError;

/// One atomic protocol message: a command/response code plus payload.
///
/// `payload.len() <= MAX_PAYLOAD` is an invariant enforced at
/// construction — a frame cannot exist with an oversized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame, rejecting oversized payloads before any bytes
    /// are touched.
    pub fn new(cmd: u8, payload: impl Into<Vec<u8>>) -> Result<Self, PsaError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(PsaError::Argument(format!(
                "payload length {} exceeds maximum {MAX_PAYLOAD}",
                payload.len()
            )));
        }
        Ok(Self { cmd, payload })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Result of one `FrameParser::parse()` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    Ok,
    Incomplete,
    CrcError,
    FormatError,
}

/// Builds wire bytes for outgoing frames.
///
/// `STX | LEN | CMD | PAYLOAD | CRC | ETX`, where `CRC` covers
/// `LEN | CMD | PAYLOAD` — never `STX`. The encoding does not escape;
/// resynchronisation on the receive side is the parser's job.
pub struct FrameBuilder;

impl FrameBuilder {
    pub fn build(frame: &Frame) -> Result<Vec<u8>, PsaError> {
        let len = frame.payload_len();
        if len > MAX_PAYLOAD {
            return Err(PsaError::Argument(format!(
                "payload length {len} exceeds maximum {MAX_PAYLOAD}"
            )));
        }

        let mut crc_input = Vec::with_capacity(2 + len);
        crc_input.push(len as u8);
        crc_input.push(frame.cmd);
        crc_input.extend_from_slice(frame.payload());
        let crc = Crc8::calculate(&crc_input);

        let mut out = Vec::with_capacity(len + 5);
        out.push(STX);
        out.extend_from_slice(&crc_input);
        out.push(crc);
        out.push(ETX);
        Ok(out)
    }

    pub fn build_ping() -> Vec<u8> {
        Self::build(&Frame::new(Command::Ping.as_u8(), Vec::new()).expect("empty payload fits"))
            .expect("ping frame always builds")
    }

    pub fn build_test_all() -> Vec<u8> {
        Self::build(&Frame::new(Command::TestAll.as_u8(), Vec::new()).expect("empty payload fits"))
            .expect("test_all frame always builds")
    }

    pub fn build_test_single(sensor_id: u8) -> Vec<u8> {
        Self::build(&Frame::new(Command::TestSingle.as_u8(), vec![sensor_id]).expect("1-byte payload fits"))
            .expect("test_single frame always builds")
    }

    pub fn build_get_sensor_list() -> Vec<u8> {
        Self::build(
            &Frame::new(Command::GetSensorList.as_u8(), Vec::new()).expect("empty payload fits"),
        )
        .expect("get_sensor_list frame always builds")
    }

    pub fn build_set_spec(sensor_id: u8, spec_bytes: &[u8]) -> Result<Vec<u8>, PsaError> {
        let mut payload = Vec::with_capacity(1 + spec_bytes.len());
        payload.push(sensor_id);
        payload.extend_from_slice(spec_bytes);
        Self::build(&Frame::new(Command::SetSpec.as_u8(), payload)?)
    }

    pub fn build_get_spec(sensor_id: u8) -> Vec<u8> {
        Self::build(&Frame::new(Command::GetSpec.as_u8(), vec![sensor_id]).expect("1-byte payload fits"))
            .expect("get_spec frame always builds")
    }
}

/// Stateful, incremental accumulator that extracts frames from an
/// unbounded, possibly noisy byte stream.
///
/// Uses `BytesMut` so that consuming bytes on success or on a skipped
/// garbage byte is an O(1) cursor advance (`split_to`) rather than a
/// `Vec` shift, keeping amortised per-byte parse cost constant even
/// under pathological streams (spec §9 design note).
pub struct FrameParser {
    buffer: BytesMut,
    last_crc_mismatch: Option<(u8, u8)>,
}

/// Outcome of checking a single candidate frame start within the
/// buffer, without mutating it.
enum Candidate {
    Ok(Frame, usize),
    Incomplete,
    FormatError,
    CrcError { expected: u8, actual: u8 },
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            last_crc_mismatch: None,
        }
    }

    /// Appends bytes to the accumulator. Does not parse.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Current size of the accumulator.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// `(expected, actual)` from the most recent `CrcError`, if the
    /// last `parse()` call returned one. Lets callers surface the
    /// real mismatched bytes in a `PsaError::Crc` instead of a
    /// placeholder.
    pub fn last_crc_mismatch(&self) -> Option<(u8, u8)> {
        self.last_crc_mismatch
    }

    /// Checks whether a well-formed frame starts at byte offset
    /// `start` of the buffer, without consuming anything.
    fn try_candidate(&self, start: usize) -> Candidate {
        let remaining = self.buffer.len() - start;
        if remaining < 3 {
            return Candidate::Incomplete;
        }

        let len = self.buffer[start + 1] as usize;
        let cmd = self.buffer[start + 2];

        if len > MAX_PAYLOAD {
            return Candidate::FormatError;
        }

        let total_len = len + 5;
        if remaining < total_len {
            return Candidate::Incomplete;
        }

        if self.buffer[start + len + 4] != ETX {
            return Candidate::FormatError;
        }

        let crc_input = &self.buffer[start + 1..start + len + 3];
        let expected_crc = self.buffer[start + len + 3];
        let actual_crc = Crc8::calculate(crc_input);
        if actual_crc != expected_crc {
            return Candidate::CrcError {
                expected: expected_crc,
                actual: actual_crc,
            };
        }

        let payload = self.buffer[start + 3..start + len + 3].to_vec();
        Candidate::Ok(Frame { cmd, payload }, total_len)
    }

    /// Attempts to extract exactly one frame from the head of the
    /// buffer.
    ///
    /// On `Ok`, the frame's bytes are consumed. On `Incomplete`,
    /// nothing is consumed — feed more and retry. On `CrcError` or
    /// `FormatError`, one leading `STX` byte is discarded to attempt
    /// resynchronisation on the next call; every non-`Ok` result
    /// either advances the buffer by at least one byte or returns
    /// `Incomplete`, so the parser cannot spin forever on a fixed
    /// buffer.
    pub fn parse(&mut self) -> (ParseResult, Option<Frame>, usize) {
        self.last_crc_mismatch = None;

        // Step 1: scan for STX, discarding everything before it.
        let stx_pos = match self.buffer.iter().position(|&b| b == STX) {
            Some(pos) => pos,
            None => {
                let skipped = self.buffer.len();
                self.buffer.clear();
                return (ParseResult::Incomplete, None, skipped);
            }
        };
        if stx_pos > 0 {
            let _ = self.buffer.split_to(stx_pos);
        }

        match self.try_candidate(0) {
            Candidate::Ok(frame, total_len) => {
                trace!(cmd = frame.cmd, len = frame.payload_len(), "parsed frame");
                let _ = self.buffer.split_to(total_len);
                (ParseResult::Ok, Some(frame), total_len)
            }
            Candidate::FormatError => {
                warn!("frame format error, resyncing");
                let _ = self.buffer.split_to(1);
                (ParseResult::FormatError, None, 1)
            }
            Candidate::CrcError { expected, actual } => {
                warn!(expected, actual, "CRC mismatch, resyncing");
                self.last_crc_mismatch = Some((expected, actual));
                let _ = self.buffer.split_to(1);
                (ParseResult::CrcError, None, 1)
            }
            Candidate::Incomplete => self.resync_past_stray_stx(),
        }
    }

    /// Called when the leading `STX` looks like a header that can
    /// never complete with the bytes on hand — which can happen when
    /// a run of repeated `STX` padding bytes gets misread as a
    /// `LEN`/`CMD` pair (spec §4.3's "including repeated STX bytes"
    /// recoverability invariant). Rather than stall forever waiting
    /// for bytes that aren't coming, look for a later `STX` in the
    /// already-buffered data that resolves cleanly to a complete
    /// frame; a clean resolution there means the leading bytes were
    /// noise and can be dropped along with it. A later candidate that
    /// itself errors or is also incomplete proves nothing, so in that
    /// case this still falls back to waiting for more data.
    fn resync_past_stray_stx(&mut self) -> (ParseResult, Option<Frame>, usize) {
        let mut search_from = 1;
        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == STX) {
            let candidate = search_from + offset;
            if let Candidate::Ok(frame, total_len) = self.try_candidate(candidate) {
                trace!(
                    cmd = frame.cmd,
                    len = frame.payload_len(),
                    skipped = candidate,
                    "parsed frame after skipping a stray leading STX run"
                );
                let consumed = candidate + total_len;
                let _ = self.buffer.split_to(consumed);
                return (ParseResult::Ok, Some(frame), consumed);
            }
            search_from = candidate + 1;
        }
        (ParseResult::Incomplete, None, 0)
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
