//! Request/reply client (spec §4.4, §5).

use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::constants::{Response, SensorId};
use crate::error::PsaError;
use crate::frame::{Frame, FrameBuilder, FrameParser, ParseResult};
use crate::sensors::{decode_sensor_list, MLX90640Spec, SensorInfo, SpecKind, TestReport, VL53L0XSpec};
use crate::transport::Transport;

/// Tunables for the request pipeline. One field today; a struct so
/// new knobs (retry count, inter-byte timeout) can land without
/// breaking `PsaClient::new`'s signature.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// How long to wait for a correlated reply before giving up.
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(500),
        }
    }
}

/// Blocking client over one `Transport`. Carries exactly one
/// outstanding request at a time — there is no request id to
/// correlate replies by, so a second request cannot be issued until
/// the first resolves (spec §5).
pub struct PsaClient<T: Transport> {
    transport: T,
    config: ClientConfig,
    parser: FrameParser,
}

impl<T: Transport> PsaClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            parser: FrameParser::new(),
        }
    }

    /// Drops any bytes left in the frame accumulator. Does not touch
    /// the transport; pair with `transport.flush()` if the link
    /// itself needs clearing too.
    pub fn clear(&mut self) {
        self.parser.clear();
    }

    /// PING. Returns the device's firmware version as `(major, minor, patch)`.
    #[instrument(skip(self))]
    pub fn ping(&mut self) -> Result<(u8, u8, u8), PsaError> {
        let request = FrameBuilder::build_ping();
        let frame = self.exchange(request, Response::Pong, "ping", None)?;
        let payload = frame.payload();
        if payload.len() != 3 {
            return Err(PsaError::Protocol(format!(
                "PONG payload must be 3 bytes, got {}",
                payload.len()
            )));
        }
        Ok((payload[0], payload[1], payload[2]))
    }

    /// GET_SENSOR_LIST.
    #[instrument(skip(self))]
    pub fn get_sensor_list(&mut self) -> Result<Vec<SensorInfo>, PsaError> {
        let request = FrameBuilder::build_get_sensor_list();
        let frame = self.exchange(request, Response::SensorList, "get_sensor_list", None)?;
        decode_sensor_list(frame.payload())
    }

    /// SET_SPEC for the MLX90640 IR camera.
    #[instrument(skip(self))]
    pub fn set_spec_mlx90640(&mut self, spec: MLX90640Spec) -> Result<(), PsaError> {
        self.set_spec(SpecKind::Mlx90640(spec))
    }

    /// SET_SPEC for the VL53L0X time-of-flight sensor.
    #[instrument(skip(self))]
    pub fn set_spec_vl53l0x(&mut self, spec: VL53L0XSpec) -> Result<(), PsaError> {
        self.set_spec(SpecKind::Vl53l0x(spec))
    }

    fn set_spec(&mut self, spec: SpecKind) -> Result<(), PsaError> {
        spec.validate()?;
        let request = FrameBuilder::build_set_spec(spec.sensor_id().as_u8(), &spec.encode())?;
        self.exchange(request, Response::Ack, "set_spec", None)?;
        Ok(())
    }

    /// GET_SPEC for the MLX90640 IR camera.
    #[instrument(skip(self))]
    pub fn get_spec_mlx90640(&mut self) -> Result<MLX90640Spec, PsaError> {
        match self.get_spec(SensorId::Mlx90640)? {
            SpecKind::Mlx90640(spec) => Ok(spec),
            SpecKind::Vl53l0x(_) => Err(PsaError::Protocol(
                "device returned a VL53L0X spec for an MLX90640 request".into(),
            )),
        }
    }

    /// GET_SPEC for the VL53L0X time-of-flight sensor.
    #[instrument(skip(self))]
    pub fn get_spec_vl53l0x(&mut self) -> Result<VL53L0XSpec, PsaError> {
        match self.get_spec(SensorId::Vl53l0x)? {
            SpecKind::Vl53l0x(spec) => Ok(spec),
            SpecKind::Mlx90640(_) => Err(PsaError::Protocol(
                "device returned an MLX90640 spec for a VL53L0X request".into(),
            )),
        }
    }

    fn get_spec(&mut self, sensor_id: SensorId) -> Result<SpecKind, PsaError> {
        let request = FrameBuilder::build_get_spec(sensor_id.as_u8());
        let frame = self.exchange(request, Response::Spec, "get_spec", None)?;
        let payload = frame.payload();
        let reply_sensor_id = *payload
            .first()
            .ok_or_else(|| PsaError::Protocol("SPEC payload is empty, missing sensor_id".into()))?;
        if reply_sensor_id != sensor_id.as_u8() {
            return Err(PsaError::Protocol(format!(
                "SPEC reply sensor_id {reply_sensor_id:#04x} does not match requested {:#04x}",
                sensor_id.as_u8()
            )));
        }
        SpecKind::decode(sensor_id, &payload[1..])
    }

    /// TEST_SINGLE for one sensor id.
    #[instrument(skip(self))]
    pub fn test_single(&mut self, sensor_id: u8) -> Result<TestReport, PsaError> {
        let request = FrameBuilder::build_test_single(sensor_id);
        let frame = self.exchange(request, Response::TestResult, "test_single", None)?;
        TestReport::decode(frame.payload())
    }

    /// TEST_ALL. `timeout` overrides the configured response timeout
    /// for this call only — a full sensor sweep on the device side
    /// can legitimately take longer than a single-sensor round trip.
    #[instrument(skip(self))]
    pub fn test_all(&mut self, timeout: Option<Duration>) -> Result<TestReport, PsaError> {
        let request = FrameBuilder::build_test_all();
        let frame = self.exchange(request, Response::TestResult, "test_all", timeout)?;
        TestReport::decode(frame.payload())
    }

    /// Sends `request`, then reads and parses frames from the
    /// transport until a reply correlated to it arrives, a NAK
    /// arrives, or the deadline expires.
    ///
    /// CRC/format errors encountered with time still remaining are
    /// logged and parsing resumes at the next byte (the parser's own
    /// resync); they only become the returned error if the deadline
    /// expires before a well-formed frame follows. Expiry does not
    /// clear the accumulator or flush the transport — leftover bytes
    /// are still there for the next call, by design.
    fn exchange(
        &mut self,
        request: Vec<u8>,
        expected: Response,
        operation: &'static str,
        timeout_override: Option<Duration>,
    ) -> Result<Frame, PsaError> {
        self.transport.send(&request)?;

        let timeout = timeout_override.unwrap_or(self.config.response_timeout);
        let deadline = Instant::now() + timeout;
        let mut pending_error: Option<PsaError> = None;

        loop {
            loop {
                match self.parser.parse() {
                    (ParseResult::Ok, Some(frame), _) => {
                        return self.classify_reply(frame, expected, operation);
                    }
                    (ParseResult::Ok, None, _) => unreachable!("Ok result always carries a frame"),
                    (ParseResult::Incomplete, _, _) => break,
                    (ParseResult::CrcError, _, _) => {
                        let (crc_expected, crc_actual) =
                            self.parser.last_crc_mismatch().unwrap_or((0, 0));
                        warn!(
                            operation,
                            crc_expected, crc_actual, "CRC error while awaiting reply, resyncing"
                        );
                        pending_error = Some(PsaError::Crc {
                            expected: crc_expected,
                            actual: crc_actual,
                        });
                    }
                    (ParseResult::FormatError, _, _) => {
                        warn!(operation, "frame format error while awaiting reply, resyncing");
                        pending_error = Some(PsaError::Format(
                            "malformed frame received while awaiting reply".into(),
                        ));
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(pending_error.unwrap_or(PsaError::Timeout {
                    operation,
                    elapsed: timeout,
                }));
            }

            let bytes = self.transport.receive(remaining)?;
            if bytes.is_empty() {
                if Instant::now() >= deadline {
                    return Err(pending_error.unwrap_or(PsaError::Timeout {
                        operation,
                        elapsed: timeout,
                    }));
                }
                continue;
            }
            debug!(operation, bytes = bytes.len(), "received bytes");
            self.parser.feed(&bytes);
        }
    }

    fn classify_reply(
        &self,
        frame: Frame,
        expected: Response,
        operation: &'static str,
    ) -> Result<Frame, PsaError> {
        if frame.cmd == Response::Nak.as_u8() {
            let code_byte = frame.payload().first().copied().unwrap_or(0);
            return Err(PsaError::nak(code_byte));
        }
        if frame.cmd == expected.as_u8() {
            return Ok(frame);
        }
        Err(PsaError::Protocol(format!(
            "unexpected response code {:#04x} to {operation}, expected {:#04x}",
            frame.cmd,
            expected.as_u8()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    fn client_pair() -> (PsaClient<LoopbackTransport>, LoopbackTransport) {
        let (mut client_side, mut device_side) = LoopbackTransport::pair();
        client_side.open().unwrap();
        device_side.open().unwrap();
        let config = ClientConfig {
            response_timeout: Duration::from_millis(200),
        };
        (PsaClient::new(client_side, config), device_side)
    }

    #[test]
    fn ping_success() {
        let (mut client, mut device) = client_pair();
        let frame_bytes =
            FrameBuilder::build(&Frame::new(Response::Pong.as_u8(), vec![1, 0, 0]).unwrap()).unwrap();
        device.send(&frame_bytes).unwrap();

        let version = client.ping().unwrap();
        assert_eq!(version, (1, 0, 0));
    }

    #[test]
    fn ping_receives_nak() {
        let (mut client, mut device) = client_pair();
        let nak_bytes = FrameBuilder::build(&Frame::new(Response::Nak.as_u8(), vec![0x01]).unwrap()).unwrap();
        device.send(&nak_bytes).unwrap();

        let err = client.ping().unwrap_err();
        assert!(matches!(err, PsaError::Nak { .. }));
    }

    #[test]
    fn ping_times_out_with_no_reply() {
        let (mut client, _device) = client_pair();
        let err = client.ping().unwrap_err();
        assert!(matches!(err, PsaError::Timeout { .. }));
    }

    #[test]
    fn ping_rejects_wrong_response_code() {
        let (mut client, mut device) = client_pair();
        let bad_bytes = FrameBuilder::build(&Frame::new(Response::SensorList.as_u8(), vec![0]).unwrap()).unwrap();
        device.send(&bad_bytes).unwrap();

        let err = client.ping().unwrap_err();
        assert!(matches!(err, PsaError::Protocol(_)));
    }

    #[test]
    fn get_sensor_list_roundtrip() {
        let (mut client, mut device) = client_pair();
        let payload = vec![1u8, 0x01, 3, b't', b'o', b'f'];
        let bytes = FrameBuilder::build(&Frame::new(Response::SensorList.as_u8(), payload).unwrap()).unwrap();
        device.send(&bytes).unwrap();

        let list = client.get_sensor_list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "tof");
    }

    #[test]
    fn set_and_get_spec_mlx90640() {
        let (mut client, mut device) = client_pair();
        let ack = FrameBuilder::build(&Frame::new(Response::Ack.as_u8(), vec![]).unwrap()).unwrap();
        device.send(&ack).unwrap();
        client.set_spec_mlx90640(MLX90640Spec::new(3700, 100)).unwrap();

        let (mut client, mut device) = client_pair();
        let mut spec_bytes = vec![SensorId::Mlx90640.as_u8()];
        spec_bytes.extend_from_slice(&MLX90640Spec::new(3700, 100).encode());
        let reply = FrameBuilder::build(&Frame::new(Response::Spec.as_u8(), spec_bytes).unwrap()).unwrap();
        device.send(&reply).unwrap();
        let spec = client.get_spec_mlx90640().unwrap();
        assert_eq!(spec.target_celsius(), 37.0);
    }

    #[test]
    fn set_spec_mlx90640_rejects_out_of_range_target_locally() {
        let (mut client, _device) = client_pair();
        let err = client
            .set_spec_mlx90640(MLX90640Spec::new(31_000, 100))
            .unwrap_err();
        assert!(matches!(err, PsaError::Argument(_)));
    }

    #[test]
    fn set_spec_mlx90640_rejects_zero_tolerance_locally() {
        let (mut client, _device) = client_pair();
        let err = client
            .set_spec_mlx90640(MLX90640Spec::new(3700, 0))
            .unwrap_err();
        assert!(matches!(err, PsaError::Argument(_)));
    }

    #[test]
    fn set_spec_vl53l0x_rejects_out_of_range_target_locally() {
        let (mut client, _device) = client_pair();
        let err = client
            .set_spec_vl53l0x(VL53L0XSpec::new(10, 20))
            .unwrap_err();
        assert!(matches!(err, PsaError::Argument(_)));
    }

    #[test]
    fn test_single_invalid_sensor_id_reported_by_device_is_a_nak() {
        let (mut client, mut device) = client_pair();
        let nak_bytes = FrameBuilder::build(&Frame::new(Response::Nak.as_u8(), vec![0x03]).unwrap()).unwrap();
        device.send(&nak_bytes).unwrap();

        let err = client.test_single(0xFF).unwrap_err();
        match err {
            PsaError::Nak { code } => assert_eq!(code.name(), "INVALID_SENSOR_ID"),
            other => panic!("expected Nak, got {other:?}"),
        }
    }

    #[test]
    fn test_single_success() {
        let (mut client, mut device) = client_pair();
        let mut payload = vec![1u8, 1, 0]; // sensor_count, pass_count, fail_count
        payload.extend_from_slice(&99u32.to_be_bytes()); // timestamp
        payload.push(SensorId::Mlx90640.as_u8());
        payload.push(crate::constants::TestStatus::Pass.as_u8());
        payload.extend_from_slice(&[0x0E, 0x74, 0x0E, 0x74, 0x00, 0x64, 0x00, 0x00]); // result record
        let bytes = FrameBuilder::build(&Frame::new(Response::TestResult.as_u8(), payload).unwrap()).unwrap();
        device.send(&bytes).unwrap();

        let report = client.test_single(0x01).unwrap();
        assert!(report.all_passed());
        assert_eq!(report.timestamp, 99);
    }

    #[test]
    fn recovers_from_garbage_before_reply() {
        let (mut client, mut device) = client_pair();
        let mut stream = vec![0xAAu8, 0xBB, 0xCC];
        stream.extend_from_slice(
            &FrameBuilder::build(&Frame::new(Response::Pong.as_u8(), vec![1, 0, 0]).unwrap()).unwrap(),
        );
        device.send(&stream).unwrap();

        let version = client.ping().unwrap();
        assert_eq!(version, (1, 0, 0));
    }

    #[test]
    fn leftover_bytes_survive_a_timeout_until_cleared() {
        let (mut client, mut device) = client_pair();
        // Truncated frame: never completes, so ping() times out.
        device.send(&[crate::constants::STX, 0x00]).unwrap();
        let err = client.ping().unwrap_err();
        assert!(matches!(err, PsaError::Timeout { .. }));
        assert!(client.parser.buffer_size() > 0);

        client.clear();
        assert_eq!(client.parser.buffer_size(), 0);
    }
}
