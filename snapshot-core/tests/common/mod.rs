#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::Write,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use snapshot_core::{Backends, BlobLocation, BlobStore, WeatherProvider, WeatherSnapshot};
use tracing_subscriber::{EnvFilter, fmt::MakeWriter};

/// Collects formatted log output of the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_env_filter(EnvFilter::new("snapshot_core=info"))
            .with_ansi(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).lines().map(str::to_owned).collect()
    }

    /// Lines logged at `level`, e.g. "INFO" or "ERROR".
    pub fn at(&self, level: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.trim_start().starts_with(level))
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub location: BlobLocation,
    pub body: Vec<u8>,
    pub content_type: String,
}

impl StoredBlob {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Debug, Default)]
struct Calls {
    weather: Vec<String>,
    puts: Vec<StoredBlob>,
    blobs: HashMap<String, Vec<u8>>,
}

/// In-memory collaborators that record every call.
#[derive(Debug, Clone)]
pub struct FakeBackends {
    calls: Arc<Mutex<Calls>>,
    response: Result<Value, String>,
    storage_error: Option<String>,
}

impl FakeBackends {
    pub fn responding(body: Value) -> Self {
        Self {
            calls: Arc::default(),
            response: Ok(body),
            storage_error: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::default(),
            response: Err(message.to_string()),
            storage_error: None,
        }
    }

    /// Same recorded store, different upstream body.
    pub fn then_responding(&self, body: Value) -> Self {
        Self {
            calls: self.calls.clone(),
            response: Ok(body),
            storage_error: None,
        }
    }

    pub fn with_storage_error(mut self, message: &str) -> Self {
        self.storage_error = Some(message.to_string());
        self
    }

    pub fn weather_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().weather.clone()
    }

    pub fn puts(&self) -> Vec<StoredBlob> {
        self.calls.lock().unwrap().puts.clone()
    }

    pub fn blob(&self, location: &BlobLocation) -> Option<Vec<u8>> {
        self.calls.lock().unwrap().blobs.get(&location.to_string()).cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.calls.lock().unwrap().blobs.len()
    }
}

impl Backends for FakeBackends {
    fn weather(
        &self,
        _api_key: &str,
        _endpoint: Option<&str>,
    ) -> anyhow::Result<Box<dyn WeatherProvider>> {
        Ok(Box::new(FakeProvider {
            calls: self.calls.clone(),
            response: self.response.clone(),
        }))
    }

    fn storage(&self, _connection: &str) -> anyhow::Result<Box<dyn BlobStore>> {
        if let Some(message) = &self.storage_error {
            return Err(anyhow!("{message}"));
        }
        Ok(Box::new(FakeStore { calls: self.calls.clone() }))
    }
}

#[derive(Debug)]
struct FakeProvider {
    calls: Arc<Mutex<Calls>>,
    response: Result<Value, String>,
}

#[async_trait]
impl WeatherProvider for FakeProvider {
    async fn current(&self, city: &str) -> anyhow::Result<WeatherSnapshot> {
        self.calls.lock().unwrap().weather.push(city.to_string());
        match &self.response {
            Ok(body) => Ok(WeatherSnapshot::new(body.clone())),
            Err(message) => Err(anyhow!("{message}")),
        }
    }
}

#[derive(Debug)]
struct FakeStore {
    calls: Arc<Mutex<Calls>>,
}

#[async_trait]
impl BlobStore for FakeStore {
    async fn put(
        &self,
        location: &BlobLocation,
        body: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<()> {
        let mut calls = self.calls.lock().unwrap();
        calls.blobs.insert(location.to_string(), body.clone());
        calls.puts.push(StoredBlob {
            location: location.clone(),
            body,
            content_type: content_type.to_string(),
        });
        Ok(())
    }
}
