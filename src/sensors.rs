//! Typed sensor specs, results, and the codec functions that turn
//! them into/from frame payloads (spec §3, §4.5).

use crate::constants::{SensorId, TestStatus};
use crate::error::PsaError;

/// Target temperature and tolerance for the MLX90640 self-test,
/// in centi-degrees Celsius on the wire (`target_temp=3700` means
/// 37.00C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MLX90640Spec {
    pub target_temp: i16,
    pub tolerance: u16,
}

/// Thermal target range accepted by `set_spec_mlx90640` (spec §7).
const MLX90640_TARGET_RANGE: std::ops::RangeInclusive<i16> = -4000..=30000;

impl MLX90640Spec {
    pub fn new(target_temp: i16, tolerance: u16) -> Self {
        Self {
            target_temp,
            tolerance,
        }
    }

    /// Rejects a target outside `[-4000, 30000]` or a zero tolerance
    /// before any bytes are written (spec §7).
    pub(crate) fn validate(&self) -> Result<(), PsaError> {
        if !MLX90640_TARGET_RANGE.contains(&self.target_temp) {
            return Err(PsaError::Argument(format!(
                "MLX90640 target_temp {} out of range {:?}",
                self.target_temp, MLX90640_TARGET_RANGE
            )));
        }
        if self.tolerance == 0 {
            return Err(PsaError::Argument(
                "MLX90640 tolerance must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn target_celsius(self) -> f64 {
        self.target_temp as f64 / 100.0
    }

    pub fn tolerance_celsius(self) -> f64 {
        self.tolerance as f64 / 100.0
    }

    pub(crate) fn encode(self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out[0..2].copy_from_slice(&self.target_temp.to_be_bytes());
        out[2..4].copy_from_slice(&self.tolerance.to_be_bytes());
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, PsaError> {
        if bytes.len() != 4 {
            return Err(PsaError::Protocol(format!(
                "MLX90640Spec payload must be 4 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            target_temp: i16::from_be_bytes([bytes[0], bytes[1]]),
            tolerance: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Target distance and tolerance for the VL53L0X self-test, in
/// millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VL53L0XSpec {
    pub target_distance_mm: u16,
    pub tolerance_mm: u16,
}

/// Range target window accepted by `set_spec_vl53l0x` (spec §7).
const VL53L0X_TARGET_RANGE: std::ops::RangeInclusive<u16> = 30..=2000;

impl VL53L0XSpec {
    pub fn new(target_distance_mm: u16, tolerance_mm: u16) -> Self {
        Self {
            target_distance_mm,
            tolerance_mm,
        }
    }

    /// Rejects a target outside `[30, 2000]` or a zero tolerance
    /// before any bytes are written (spec §7).
    pub(crate) fn validate(&self) -> Result<(), PsaError> {
        if !VL53L0X_TARGET_RANGE.contains(&self.target_distance_mm) {
            return Err(PsaError::Argument(format!(
                "VL53L0X target_distance_mm {} out of range {:?}",
                self.target_distance_mm, VL53L0X_TARGET_RANGE
            )));
        }
        if self.tolerance_mm == 0 {
            return Err(PsaError::Argument(
                "VL53L0X tolerance_mm must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn encode(self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out[0..2].copy_from_slice(&self.target_distance_mm.to_be_bytes());
        out[2..4].copy_from_slice(&self.tolerance_mm.to_be_bytes());
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, PsaError> {
        if bytes.len() != 4 {
            return Err(PsaError::Protocol(format!(
                "VL53L0XSpec payload must be 4 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            target_distance_mm: u16::from_be_bytes([bytes[0], bytes[1]]),
            tolerance_mm: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// A sensor-specific spec, tagged by which sensor it applies to.
/// An alternative to asking the caller to track sensor id and spec
/// type separately when relaying SET_SPEC/GET_SPEC through generic
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind {
    Mlx90640(MLX90640Spec),
    Vl53l0x(VL53L0XSpec),
}

impl SpecKind {
    pub fn sensor_id(self) -> SensorId {
        match self {
            SpecKind::Mlx90640(_) => SensorId::Mlx90640,
            SpecKind::Vl53l0x(_) => SensorId::Vl53l0x,
        }
    }

    pub(crate) fn encode(self) -> Vec<u8> {
        match self {
            SpecKind::Mlx90640(spec) => spec.encode().to_vec(),
            SpecKind::Vl53l0x(spec) => spec.encode().to_vec(),
        }
    }

    pub(crate) fn validate(self) -> Result<(), PsaError> {
        match self {
            SpecKind::Mlx90640(spec) => spec.validate(),
            SpecKind::Vl53l0x(spec) => spec.validate(),
        }
    }

    pub(crate) fn decode(sensor_id: SensorId, bytes: &[u8]) -> Result<Self, PsaError> {
        match sensor_id {
            SensorId::Mlx90640 => Ok(SpecKind::Mlx90640(MLX90640Spec::decode(bytes)?)),
            SensorId::Vl53l0x => Ok(SpecKind::Vl53l0x(VL53L0XSpec::decode(bytes)?)),
        }
    }
}

/// MLX90640 self-test outcome: the 8-byte `{measured, target,
/// tolerance, diff}` result record (spec §3, §4.5), with `measured`
/// signed (`max_temp`) since the thermal target range spans negative
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MLX90640Result {
    pub max_temp: i16,
    pub target: i16,
    pub tolerance: u16,
    pub diff: u16,
}

impl MLX90640Result {
    pub fn max_temp_celsius(self) -> f64 {
        self.max_temp as f64 / 100.0
    }

    pub fn target_celsius(self) -> f64 {
        self.target as f64 / 100.0
    }

    pub fn passed(self) -> bool {
        self.diff <= self.tolerance
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, PsaError> {
        if bytes.len() != 8 {
            return Err(PsaError::Protocol(format!(
                "MLX90640Result record must be 8 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            max_temp: i16::from_be_bytes([bytes[0], bytes[1]]),
            target: i16::from_be_bytes([bytes[2], bytes[3]]),
            tolerance: u16::from_be_bytes([bytes[4], bytes[5]]),
            diff: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// VL53L0X self-test outcome: the 8-byte `{measured, target,
/// tolerance, diff}` result record, all fields unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VL53L0XResult {
    pub measured: u16,
    pub target: u16,
    pub tolerance: u16,
    pub diff: u16,
}

impl VL53L0XResult {
    pub fn passed(self) -> bool {
        self.diff <= self.tolerance
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, PsaError> {
        if bytes.len() != 8 {
            return Err(PsaError::Protocol(format!(
                "VL53L0XResult record must be 8 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            measured: u16::from_be_bytes([bytes[0], bytes[1]]),
            target: u16::from_be_bytes([bytes[2], bytes[3]]),
            tolerance: u16::from_be_bytes([bytes[4], bytes[5]]),
            diff: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// A decoded per-sensor result record, tagged by which sensor
/// produced it — mirrors [`SpecKind`] on the reply side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorResult {
    Mlx90640(MLX90640Result),
    Vl53l0x(VL53L0XResult),
}

impl SensorResult {
    pub fn passed(self) -> bool {
        match self {
            SensorResult::Mlx90640(r) => r.passed(),
            SensorResult::Vl53l0x(r) => r.passed(),
        }
    }

    pub(crate) fn decode(sensor_id: SensorId, bytes: &[u8]) -> Result<Self, PsaError> {
        match sensor_id {
            SensorId::Mlx90640 => Ok(SensorResult::Mlx90640(MLX90640Result::decode(bytes)?)),
            SensorId::Vl53l0x => Ok(SensorResult::Vl53l0x(VL53L0XResult::decode(bytes)?)),
        }
    }
}

/// One entry of `get_sensor_list()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub sensor_id: u8,
    pub name: String,
}

/// Decodes the `{sensor_count: u8}` followed by repeated
/// `{sensor_id: u8, name_len: u8, name_bytes: [u8; name_len]}`
/// SENSOR_LIST payload.
pub(crate) fn decode_sensor_list(bytes: &[u8]) -> Result<Vec<SensorInfo>, PsaError> {
    if bytes.is_empty() {
        return Err(PsaError::Protocol("SENSOR_LIST payload is empty".into()));
    }
    let count = bytes[0] as usize;
    let mut cursor = 1usize;
    let mut sensors = Vec::with_capacity(count);

    for _ in 0..count {
        if cursor + 2 > bytes.len() {
            return Err(PsaError::Protocol(
                "SENSOR_LIST entry header truncated".into(),
            ));
        }
        let sensor_id = bytes[cursor];
        let name_len = bytes[cursor + 1] as usize;
        cursor += 2;

        if cursor + name_len > bytes.len() {
            return Err(PsaError::Protocol(
                "SENSOR_LIST entry name truncated".into(),
            ));
        }
        let name = String::from_utf8(bytes[cursor..cursor + name_len].to_vec())
            .map_err(|_| PsaError::Protocol("SENSOR_LIST name is not valid UTF-8".into()))?;
        cursor += name_len;

        sensors.push(SensorInfo { sensor_id, name });
    }

    if cursor != bytes.len() {
        return Err(PsaError::Protocol(
            "SENSOR_LIST payload has trailing bytes".into(),
        ));
    }

    Ok(sensors)
}

/// Per-sensor status and sensor-specific result of one test run.
///
/// `result` is `None` when the device reports a `sensor_id` outside
/// the known set (§3's "0x00 and 0xFF are reserved/invalid", or a
/// future sensor kind this client doesn't know how to decode); the
/// raw `sensor_id`/`status` are still surfaced in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestResult {
    pub sensor_id: u8,
    pub status: TestStatus,
    pub result: Option<SensorResult>,
}

impl TestResult {
    pub fn status_name(self) -> &'static str {
        self.status.name()
    }
}

/// Aggregate outcome of `test_all()`/`test_single()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub sensor_count: u8,
    pub pass_count: u8,
    pub fail_count: u8,
    pub timestamp: u32,
    pub results: Vec<TestResult>,
}

impl TestReport {
    pub fn all_passed(&self) -> bool {
        self.fail_count == 0 && self.sensor_count > 0
    }

    /// Decodes a TEST_RESULT payload: `{sensor_count, pass_count,
    /// fail_count, timestamp: u32 BE}` followed by `sensor_count`
    /// repeats of `{sensor_id, status, result_bytes: 8}` (spec §3).
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, PsaError> {
        const HEADER_LEN: usize = 7;
        const ENTRY_LEN: usize = 10;

        if bytes.len() < HEADER_LEN {
            return Err(PsaError::Protocol(format!(
                "TEST_RESULT payload too short: {} bytes",
                bytes.len()
            )));
        }
        let sensor_count = bytes[0];
        let pass_count = bytes[1];
        let fail_count = bytes[2];
        let timestamp = u32::from_be_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);

        let expected_len = HEADER_LEN + sensor_count as usize * ENTRY_LEN;
        if bytes.len() != expected_len {
            return Err(PsaError::Protocol(format!(
                "TEST_RESULT payload length {} does not match sensor_count {}",
                bytes.len(),
                sensor_count
            )));
        }

        let mut results = Vec::with_capacity(sensor_count as usize);
        let mut cursor = HEADER_LEN;
        for _ in 0..sensor_count {
            let sensor_id = bytes[cursor];
            let status_byte = bytes[cursor + 1];
            let status = TestStatus::from_u8(status_byte).ok_or_else(|| {
                PsaError::Protocol(format!("unknown test status byte {status_byte:#04x}"))
            })?;
            let record = &bytes[cursor + 2..cursor + ENTRY_LEN];
            let result = match SensorId::from_u8(sensor_id) {
                Some(id) => Some(SensorResult::decode(id, record)?),
                None => None,
            };
            results.push(TestResult {
                sensor_id,
                status,
                result,
            });
            cursor += ENTRY_LEN;
        }

        Ok(Self {
            sensor_count,
            pass_count,
            fail_count,
            timestamp,
            results,
        })
    }
}
