use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use simple_error::{try_with, SimpleError, SimpleResult};
use tokio::time::Instant;

use crate::{locomotion::LocomotionState, params::RetryParams, util};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncStatus {
    Idle,
    Synced { timestamp: u64 },
    /// The local position stays authoritative.
    Failed(String),
}

/// Persisted form of the locomotion state, in the wire's camelCase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub velocity_x: f32,
    #[serde(default)]
    pub velocity_y: f32,
    #[serde(default)]
    pub facing_dir: f32,
    #[serde(default)]
    pub target_dir: f32,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub target_speed: f32,
    #[serde(default)]
    pub speed_change_interval: f32,
    /// Milliseconds since the unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl PositionRecord {
    pub fn new(state: &LocomotionState, timestamp: u64) -> Self {
        Self {
            x: state.x,
            y: state.y,
            velocity_x: state.velocity_x,
            velocity_y: state.velocity_y,
            facing_dir: state.facing_dir,
            target_dir: state.target_dir,
            speed: state.speed,
            target_speed: state.target_speed,
            speed_change_interval: state.speed_change_interval,
            timestamp,
        }
    }

    pub fn now(state: &LocomotionState) -> Self {
        Self::new(state, unix_millis())
    }

    pub fn state(&self) -> LocomotionState {
        LocomotionState {
            x: self.x,
            y: self.y,
            velocity_x: self.velocity_x,
            velocity_y: self.velocity_y,
            facing_dir: self.facing_dir,
            target_dir: self.target_dir,
            speed: self.speed,
            target_speed: self.target_speed,
            speed_change_interval: self.speed_change_interval,
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// A payload without numeric `x` and `y` carries no position.
pub fn parse_position_record(json_str: &str) -> SimpleResult<Option<PositionRecord>> {
    let value: serde_json::Value = try_with!(serde_json::from_str(json_str), "malformed position");

    let has_position = ["x", "y"]
        .iter()
        .all(|key| value.get(key).map_or(false, serde_json::Value::is_number));
    if !has_position {
        return Ok(None);
    }

    let record = try_with!(serde_json::from_value(value), "malformed position");
    Ok(Some(record))
}

/// Persistence of the locomotion position.
#[async_trait]
pub trait PositionSink: Send + Sync {
    async fn load(&self) -> SimpleResult<Option<PositionRecord>>;
    async fn store(&self, record: &PositionRecord) -> SimpleResult<()>;
}

pub struct HttpPositionSink {
    client: reqwest::Client,
    url: String,
}

impl HttpPositionSink {
    pub fn new(base_url: &str, timeout: Duration) -> SimpleResult<Self> {
        let client = try_with!(
            reqwest::Client::builder().timeout(timeout).build(),
            "unable to build http client"
        );

        Ok(Self {
            client,
            url: format!("{}/api/sync", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PositionSink for HttpPositionSink {
    async fn load(&self) -> SimpleResult<Option<PositionRecord>> {
        let response = try_with!(
            self.client.get(&self.url).send().await,
            "position request to {} failed",
            self.url
        );

        if !response.status().is_success() {
            return Err(SimpleError::new(format!(
                "position sync returned {}",
                response.status()
            )));
        }

        let body = try_with!(response.text().await, "unable to read position response");
        parse_position_record(&body)
    }

    async fn store(&self, record: &PositionRecord) -> SimpleResult<()> {
        let response = try_with!(
            self.client.post(&self.url).json(record).send().await,
            "position update to {} failed",
            self.url
        );

        if !response.status().is_success() {
            return Err(SimpleError::new(format!(
                "position sync returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Drops updates closer together than the minimum interval.
#[derive(Debug, Clone)]
pub struct Debouncer {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Returns true and records `now` if enough time has passed.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

pub async fn store_with_retry<S: PositionSink + ?Sized>(
    sink: &S,
    record: &PositionRecord,
    retry: RetryParams,
    timeout: Duration,
) -> SimpleResult<()> {
    util::retry_with_backoff("position update", retry, timeout, || sink.store(record)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    };

    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
        stored: Mutex<Vec<PositionRecord>>,
    }

    #[async_trait]
    impl PositionSink for FlakySink {
        async fn load(&self) -> SimpleResult<Option<PositionRecord>> {
            Ok(self.stored.lock().unwrap().last().copied())
        }

        async fn store(&self, record: &PositionRecord) -> SimpleResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(SimpleError::new("sink unavailable"));
            }
            self.stored.lock().unwrap().push(*record);
            Ok(())
        }
    }

    fn flaky_sink(failures: u32) -> FlakySink {
        FlakySink {
            failures,
            calls: AtomicU32::new(0),
            stored: Mutex::new(Vec::new()),
        }
    }

    fn record() -> PositionRecord {
        PositionRecord::new(
            &LocomotionState {
                x: 10.0,
                y: 20.0,
                speed: 0.5,
                ..LocomotionState::default()
            },
            1234,
        )
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(record()).unwrap();

        assert_eq!(json["x"], 10.0);
        assert_eq!(json["speed"], 0.5);
        assert_eq!(json["velocityX"], 0.0);
        assert_eq!(json["speedChangeInterval"], 0.0);
        assert_eq!(json["timestamp"], 1234);
    }

    #[test]
    fn partial_record_defaults() {
        let parsed = parse_position_record(r#"{"x": 3, "y": 4, "facingDir": 1.5}"#)
            .unwrap()
            .unwrap();

        assert_eq!(parsed.x, 3.0);
        assert_eq!(parsed.facing_dir, 1.5);
        assert_eq!(parsed.speed, 0.0);
        assert_eq!(parsed.state().y, 4.0);
    }

    #[test]
    fn missing_position() {
        assert_eq!(parse_position_record("null").unwrap(), None);
        assert_eq!(parse_position_record("{}").unwrap(), None);
        assert_eq!(parse_position_record(r#"{"x": "1", "y": 2}"#).unwrap(), None);
        assert!(parse_position_record("{").is_err());
    }

    #[test]
    fn debounce() {
        let mut sut = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();

        assert!(sut.ready(start));
        assert!(!sut.ready(start + Duration::from_millis(50)));
        assert!(sut.ready(start + Duration::from_millis(100)));
        assert!(!sut.ready(start + Duration::from_millis(199)));
        assert!(sut.ready(start + Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn store_recovers_after_failure() {
        let sink = flaky_sink(1);
        let retry = RetryParams::default();

        store_with_retry(&sink, &record(), retry, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.load().await.unwrap(), Some(record()));
    }

    #[tokio::test(start_paused = true)]
    async fn store_gives_up() {
        let sink = flaky_sink(u32::MAX);
        let retry = RetryParams {
            max_retries: 2,
            base_delay_ms: 200,
        };

        let result = store_with_retry(&sink, &record(), retry, Duration::from_secs(5)).await;

        assert!(result.unwrap_err().as_str().contains("sink unavailable"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn http_sink_url() {
        let sut = HttpPositionSink::new("http://localhost:3000", Duration::from_secs(5)).unwrap();
        assert_eq!(sut.url(), "http://localhost:3000/api/sync");
    }
}
