//! End-to-end scenarios against `LoopbackTransport`, exercising the
//! client against a simulated device rather than real hardware.

use std::time::Duration;

use psa_protocol::{
    ClientConfig, Frame, FrameBuilder, LoopbackTransport, MLX90640Spec, PsaClient, PsaError,
    Response, Transport,
};

/// Surfaces the crate's `tracing` spans/events (CRC resyncs, NAKs,
/// timeouts) on stderr when a scenario fails — set `RUST_LOG=debug`
/// to see frame-level detail.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn connected_client() -> (PsaClient<LoopbackTransport>, LoopbackTransport) {
    init_tracing();
    let (mut client_side, mut device_side) = LoopbackTransport::pair();
    client_side.open().unwrap();
    device_side.open().unwrap();
    let config = ClientConfig {
        response_timeout: Duration::from_millis(200),
    };
    (PsaClient::new(client_side, config), device_side)
}

fn send_frame(device: &mut LoopbackTransport, cmd: u8, payload: Vec<u8>) {
    let frame = Frame::new(cmd, payload).unwrap();
    let bytes = FrameBuilder::build(&frame).unwrap();
    device.send(&bytes).unwrap();
}

#[test]
fn ping_reports_firmware_version() {
    let (mut client, mut device) = connected_client();
    send_frame(&mut device, Response::Pong.as_u8(), vec![1, 0, 0]);

    let version = client.ping().unwrap();
    assert_eq!(version, (1, 0, 0));
}

#[test]
fn unknown_command_is_reported_as_nak() {
    let (mut client, mut device) = connected_client();
    // ErrorCode::UnknownCmd == 0x01
    send_frame(&mut device, Response::Nak.as_u8(), vec![0x01]);

    let err = client.ping().unwrap_err();
    match err {
        PsaError::Nak { code } => assert_eq!(code.name(), "UNKNOWN_CMD"),
        other => panic!("expected Nak, got {other:?}"),
    }
}

#[test]
fn invalid_sensor_id_is_rejected_by_the_device_not_locally() {
    let (mut client, mut device) = connected_client();
    // ErrorCode::InvalidSensorId == 0x03
    send_frame(&mut device, Response::Nak.as_u8(), vec![0x03]);

    let err = client.test_single(0xFF).unwrap_err();
    match err {
        PsaError::Nak { code } => assert_eq!(code.name(), "INVALID_SENSOR_ID"),
        other => panic!("expected Nak, got {other:?}"),
    }
}

#[test]
fn invalid_sensor_id_reported_by_device_is_a_nak() {
    let (mut client, mut device) = connected_client();
    // ErrorCode::InvalidSensorId == 0x03
    send_frame(&mut device, Response::Nak.as_u8(), vec![0x03]);

    let err = client.test_single(0x01).unwrap_err();
    match err {
        PsaError::Nak { code } => assert_eq!(code.name(), "INVALID_SENSOR_ID"),
        other => panic!("expected Nak, got {other:?}"),
    }
}

#[test]
fn client_recovers_from_leading_garbage_on_the_wire() {
    let (mut client, mut device) = connected_client();
    let mut stream = vec![0x00u8, 0xFF, 0xAA, 0xBB];
    let frame = Frame::new(Response::Pong.as_u8(), vec![1, 0, 0]).unwrap();
    stream.extend_from_slice(&FrameBuilder::build(&frame).unwrap());
    device.send(&stream).unwrap();

    let version = client.ping().unwrap();
    assert_eq!(version, (1, 0, 0));
}

#[test]
fn client_reassembles_a_reply_delivered_in_fragments() {
    let (mut client, mut device) = connected_client();
    let frame = Frame::new(Response::Pong.as_u8(), vec![1, 0, 0]).unwrap();
    let bytes = FrameBuilder::build(&frame).unwrap();

    // Split the reply across two sends so the client must wait for
    // the second batch before the frame completes.
    let (first, second) = bytes.split_at(bytes.len() / 2);
    device.send(first).unwrap();
    device.send(second).unwrap();

    let version = client.ping().unwrap();
    assert_eq!(version, (1, 0, 0));
}

#[test]
fn set_spec_then_get_spec_round_trips_through_the_device() {
    let (mut client, mut device) = connected_client();
    send_frame(&mut device, Response::Ack.as_u8(), vec![]);
    client
        .set_spec_mlx90640(MLX90640Spec::new(3700, 100))
        .unwrap();

    let (mut client, mut device) = connected_client();
    // sensor_id=0x01, then target_temp=3700 (0x0E74), tolerance=100 (0x0064), big-endian.
    let spec_bytes = vec![0x01, 0x0E, 0x74, 0x00, 0x64];
    send_frame(&mut device, Response::Spec.as_u8(), spec_bytes);
    let spec = client.get_spec_mlx90640().unwrap();
    assert_eq!(spec.target_celsius(), 37.0);
    assert_eq!(spec.tolerance_celsius(), 1.0);
}

#[test]
fn ping_times_out_when_the_device_never_replies() {
    let (mut client, _device) = connected_client();
    let err = client.ping().unwrap_err();
    assert!(matches!(err, PsaError::Timeout { .. }));
}

#[test]
fn test_all_reports_a_mixed_pass_fail_result() {
    let (mut client, mut device) = connected_client();
    // sensor_count=2, pass_count=1, fail_count=1, timestamp, then two
    // {sensor_id, status, result_bytes(8)} entries.
    let mut payload = vec![2u8, 1, 1];
    payload.extend_from_slice(&1_000u32.to_be_bytes());
    payload.push(0x01); // MLX90640, PASS
    payload.push(0x00);
    payload.extend_from_slice(&[0x0E, 0x74, 0x0E, 0x74, 0x00, 0x64, 0x00, 0x00]);
    payload.push(0x02); // VL53L0X, FAIL_TIMEOUT
    payload.push(0x03);
    payload.extend_from_slice(&[0x01, 0xF4, 0x01, 0xF4, 0x00, 0x14, 0x00, 0x00]);
    send_frame(&mut device, Response::TestResult.as_u8(), payload);

    let report = client.test_all(None).unwrap();
    assert!(!report.all_passed());
    assert_eq!(report.timestamp, 1_000);
    assert_eq!(report.results[0].status_name(), "PASS");
    assert_eq!(report.results[1].status_name(), "FAIL_TIMEOUT");
}
