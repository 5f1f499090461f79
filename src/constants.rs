//! Wire-level constants for the PSA protocol.
//!
//! Numeric values here are wire-visible and must match the firmware
//! byte for byte — do not renumber.

/// Start-of-frame sentinel.
pub const STX: u8 = 0x02;
/// End-of-frame sentinel.
pub const ETX: u8 = 0x03;
/// Inclusive maximum payload length in bytes.
pub const MAX_PAYLOAD: usize = 64;

/// Request-direction command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Ping = 0x01,
    TestAll = 0x10,
    TestSingle = 0x11,
    GetSensorList = 0x12,
    SetSpec = 0x20,
    GetSpec = 0x21,
}

impl Command {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd.as_u8()
    }
}

/// Reply-direction response codes.
///
/// Replies are correlated to a request by code, not by a sequence
/// number — the link carries one outstanding request at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Response {
    Pong = 0x01,
    SensorList = 0x12,
    TestResult = 0x13,
    Spec = 0x21,
    Nak = 0x7F,
    Ack = 0x06,
}

impl Response {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Matches a raw wire byte against the known response codes.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Response::Pong),
            0x12 => Some(Response::SensorList),
            0x13 => Some(Response::TestResult),
            0x21 => Some(Response::Spec),
            0x7F => Some(Response::Nak),
            0x06 => Some(Response::Ack),
            _ => None,
        }
    }
}

impl From<Response> for u8 {
    fn from(resp: Response) -> Self {
        resp.as_u8()
    }
}

/// NAK payload byte 0. The device may define further codes beyond
/// this closed set; unrecognised values are preserved verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnknownCmd,
    InvalidPayload,
    InvalidSensorId,
    DeviceDefined(u8),
}

impl ErrorCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => ErrorCode::UnknownCmd,
            0x02 => ErrorCode::InvalidPayload,
            0x03 => ErrorCode::InvalidSensorId,
            other => ErrorCode::DeviceDefined(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ErrorCode::UnknownCmd => 0x01,
            ErrorCode::InvalidPayload => 0x02,
            ErrorCode::InvalidSensorId => 0x03,
            ErrorCode::DeviceDefined(code) => code,
        }
    }

    /// Human-readable label, used in log lines and `PsaError::Nak`'s
    /// `error_code_name()`.
    pub fn name(self) -> String {
        match self {
            ErrorCode::UnknownCmd => "UNKNOWN_CMD".to_string(),
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD".to_string(),
            ErrorCode::InvalidSensorId => "INVALID_SENSOR_ID".to_string(),
            ErrorCode::DeviceDefined(code) => format!("device-defined({code:#04x})"),
        }
    }
}

/// 8-bit sensor identifier. `0x00` and `0xFF` are reserved/invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorId {
    Mlx90640 = 0x01,
    Vl53l0x = 0x02,
}

impl SensorId {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(SensorId::Mlx90640),
            0x02 => Some(SensorId::Vl53l0x),
            _ => None,
        }
    }

    pub const fn is_reserved(value: u8) -> bool {
        value == 0x00 || value == 0xFF
    }
}

impl From<SensorId> for u8 {
    fn from(id: SensorId) -> Self {
        id.as_u8()
    }
}

/// Per-sensor test outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TestStatus {
    Pass = 0x00,
    FailInvalid = 0x01,
    FailNoAck = 0x02,
    FailTimeout = 0x03,
    FailInit = 0x04,
    NotTested = 0xFF,
}

impl TestStatus {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(TestStatus::Pass),
            0x01 => Some(TestStatus::FailInvalid),
            0x02 => Some(TestStatus::FailNoAck),
            0x03 => Some(TestStatus::FailTimeout),
            0x04 => Some(TestStatus::FailInit),
            0xFF => Some(TestStatus::NotTested),
            _ => None,
        }
    }

    /// Human-readable label (`status_name` in the original source).
    pub fn name(self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::FailInvalid => "FAIL_INVALID",
            TestStatus::FailNoAck => "FAIL_NO_ACK",
            TestStatus::FailTimeout => "FAIL_TIMEOUT",
            TestStatus::FailInit => "FAIL_INIT",
            TestStatus::NotTested => "NOT_TESTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_values_are_wire_exact() {
        assert_eq!(Command::Ping.as_u8(), 0x01);
        assert_eq!(Command::TestAll.as_u8(), 0x10);
        assert_eq!(Command::TestSingle.as_u8(), 0x11);
        assert_eq!(Command::GetSensorList.as_u8(), 0x12);
        assert_eq!(Command::SetSpec.as_u8(), 0x20);
        assert_eq!(Command::GetSpec.as_u8(), 0x21);
    }

    #[test]
    fn response_values_are_wire_exact() {
        assert_eq!(Response::Pong.as_u8(), 0x01);
        assert_eq!(Response::SensorList.as_u8(), 0x12);
        assert_eq!(Response::TestResult.as_u8(), 0x13);
        assert_eq!(Response::Spec.as_u8(), 0x21);
        assert_eq!(Response::Nak.as_u8(), 0x7F);
        assert_eq!(Response::Ack.as_u8(), 0x06);
    }

    #[test]
    fn reserved_sensor_ids() {
        assert!(SensorId::is_reserved(0x00));
        assert!(SensorId::is_reserved(0xFF));
        assert!(!SensorId::is_reserved(0x01));
        assert_eq!(SensorId::from_u8(0xFF), None);
    }

    #[test]
    fn error_code_roundtrip_for_device_defined_range() {
        let code = ErrorCode::from_u8(0x42);
        assert_eq!(code, ErrorCode::DeviceDefined(0x42));
        assert_eq!(code.as_u8(), 0x42);
        assert!(code.name().contains("0x42"));
    }
}
