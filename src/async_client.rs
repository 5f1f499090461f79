//! Thin async facade over the blocking client (spec §5, async-client
//! feature).
//!
//! The wire discipline is still one request in flight at a time; this
//! just moves the blocking round trip onto a blocking-pool thread so
//! it doesn't stall a tokio reactor.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task;

use crate::client::{ClientConfig, PsaClient};
use crate::error::PsaError;
use crate::sensors::{MLX90640Spec, SensorInfo, TestReport, VL53L0XSpec};
use crate::transport::Transport;

/// Async wrapper around [`PsaClient`] for `Transport` implementations
/// that are `Send + 'static`.
///
/// Each call acquires an internal mutex for the duration of one
/// request/reply exchange, so the one-in-flight rule holds across
/// concurrent callers too: a second `.ping()` simply waits for the
/// first to finish rather than racing it onto the wire.
pub struct AsyncPsaClient<T: Transport + Send + 'static> {
    inner: std::sync::Arc<Mutex<PsaClient<T>>>,
}

impl<T: Transport + Send + 'static> AsyncPsaClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(PsaClient::new(transport, config))),
        }
    }

    async fn run<R, F>(&self, f: F) -> Result<R, PsaError>
    where
        R: Send + 'static,
        F: FnOnce(&mut PsaClient<T>) -> Result<R, PsaError> + Send + 'static,
    {
        let inner = self.inner.clone();
        task::spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| PsaError::Protocol(format!("client task panicked: {e}")))?
    }

    pub async fn ping(&self) -> Result<(u8, u8, u8), PsaError> {
        self.run(|client| client.ping()).await
    }

    pub async fn get_sensor_list(&self) -> Result<Vec<SensorInfo>, PsaError> {
        self.run(|client| client.get_sensor_list()).await
    }

    pub async fn set_spec_mlx90640(&self, spec: MLX90640Spec) -> Result<(), PsaError> {
        self.run(move |client| client.set_spec_mlx90640(spec)).await
    }

    pub async fn set_spec_vl53l0x(&self, spec: VL53L0XSpec) -> Result<(), PsaError> {
        self.run(move |client| client.set_spec_vl53l0x(spec)).await
    }

    pub async fn get_spec_mlx90640(&self) -> Result<MLX90640Spec, PsaError> {
        self.run(|client| client.get_spec_mlx90640()).await
    }

    pub async fn get_spec_vl53l0x(&self) -> Result<VL53L0XSpec, PsaError> {
        self.run(|client| client.get_spec_vl53l0x()).await
    }

    pub async fn test_single(&self, sensor_id: u8) -> Result<TestReport, PsaError> {
        self.run(move |client| client.test_single(sensor_id)).await
    }

    pub async fn test_all(&self, timeout: Option<Duration>) -> Result<TestReport, PsaError> {
        self.run(move |client| client.test_all(timeout)).await
    }
}
