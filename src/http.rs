//! HTTP client for the elevation enrichment service.
//!
//! One request per batch:
//! - `POST {endpoint}` with `{"points": [{"lat": .., "lon": ..}, ..]}`
//! - response `{"elevations": [number | null, ..]}` in request order
//!
//! Batches are validated before anything is sent, and responses are checked
//! against the request so elevations can be applied by index.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ElevationError, Result};
use crate::GeoPoint;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_POINTS: usize = 5;

/// Source of elevations for a batch of points.
///
/// Returns one entry per input point, in order; `None` where the service has
/// no data.
pub trait ElevationProvider: Send + Sync {
    fn elevations<'a>(&'a self, points: &'a [GeoPoint]) -> BoxFuture<'a, Result<Vec<Option<f64>>>>;
}

/// Connection settings for [`ElevationClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationClientConfig {
    /// Full URL of the batch elevation endpoint.
    pub endpoint: String,

    /// Sent as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,

    /// Per-request timeout.
    /// Default: 10 seconds
    pub timeout: Duration,

    /// Largest batch the service accepts.
    /// Default: 5
    pub max_points: usize,
}

impl ElevationClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bearer_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_points: DEFAULT_MAX_POINTS,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct ElevationRequest {
    points: Vec<LatLon>,
}

#[derive(Debug, Serialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevations: Vec<Option<f64>>,
}

/// Elevation service client.
pub struct ElevationClient {
    client: Client,
    config: ElevationClientConfig,
}

impl ElevationClient {
    pub fn new(config: ElevationClientConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(config.timeout)
            .build()?;

        info!("[ElevationClient] Using endpoint {}", config.endpoint);
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElevationClientConfig {
        &self.config
    }

    /// Fetch elevations for one batch.
    pub async fn fetch(&self, points: &[GeoPoint]) -> Result<Vec<Option<f64>>> {
        validate_points(points, self.config.max_points)?;
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&request_body(points));
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(
                "[ElevationClient] {} points -> HTTP {} after {:?}",
                points.len(),
                status,
                start.elapsed()
            );
            return Err(ElevationError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        let elevations = decode_response(&bytes, points.len())?;

        debug!(
            "[ElevationClient] {} points in {:?} ({} bytes)",
            points.len(),
            start.elapsed(),
            bytes.len()
        );
        Ok(elevations)
    }
}

impl ElevationProvider for ElevationClient {
    fn elevations<'a>(&'a self, points: &'a [GeoPoint]) -> BoxFuture<'a, Result<Vec<Option<f64>>>> {
        self.fetch(points).boxed()
    }
}

fn validate_points(points: &[GeoPoint], max_points: usize) -> Result<()> {
    if points.len() > max_points {
        return Err(ElevationError::TooManyPoints {
            max: max_points,
            actual: points.len(),
        });
    }
    match points.iter().position(|p| !p.is_valid()) {
        Some(index) => Err(ElevationError::InvalidPoint { index }),
        None => Ok(()),
    }
}

fn request_body(points: &[GeoPoint]) -> ElevationRequest {
    ElevationRequest {
        points: points
            .iter()
            .map(|p| LatLon {
                lat: p.lat,
                lon: p.lng,
            })
            .collect(),
    }
}

fn decode_response(bytes: &[u8], expected: usize) -> Result<Vec<Option<f64>>> {
    let data: ElevationResponse =
        serde_json::from_slice(bytes).map_err(|e| ElevationError::Decode(e.to_string()))?;

    if data.elevations.len() != expected {
        return Err(ElevationError::CountMismatch {
            expected,
            actual: data.elevations.len(),
        });
    }
    Ok(data.elevations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ElevationClient {
        ElevationClient::new(ElevationClientConfig::new("http://127.0.0.1:9/elevation")).unwrap()
    }

    #[test]
    fn test_request_body_uses_lon() {
        let body = serde_json::to_value(request_body(&[GeoPoint::new(46.5, 7.9)])).unwrap();
        assert_eq!(body, serde_json::json!({ "points": [{ "lat": 46.5, "lon": 7.9 }] }));
    }

    #[test]
    fn test_decode_response() {
        let elevations = decode_response(br#"{"elevations": [812.5, null, 799]}"#, 3).unwrap();
        assert_eq!(elevations, vec![Some(812.5), None, Some(799.0)]);

        assert!(matches!(
            decode_response(br#"{"elevations": [1.0]}"#, 2),
            Err(ElevationError::CountMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            decode_response(b"<html>busy</html>", 1),
            Err(ElevationError::Decode(_))
        ));
    }

    #[test]
    fn test_validate_points() {
        let ok = vec![GeoPoint::new(1.0, 1.0); 5];
        assert!(validate_points(&ok, 5).is_ok());

        assert!(matches!(
            validate_points(&vec![GeoPoint::new(1.0, 1.0); 6], 5),
            Err(ElevationError::TooManyPoints { max: 5, actual: 6 })
        ));
        assert!(matches!(
            validate_points(&[GeoPoint::new(1.0, 1.0), GeoPoint::new(f64::NAN, 0.0)], 5),
            Err(ElevationError::InvalidPoint { index: 1 })
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = ElevationClientConfig::new("https://example.org/elevation").with_bearer_token("t0k");
        assert_eq!(config.bearer_token.as_deref(), Some("t0k"));
        assert_eq!(config.max_points, 5);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_fetch_rejects_before_sending() {
        let client = client();

        assert_eq!(client.fetch(&[]).await.unwrap(), Vec::<Option<f64>>::new());
        assert!(matches!(
            client.fetch(&vec![GeoPoint::new(0.0, 0.0); 6]).await,
            Err(ElevationError::TooManyPoints { .. })
        ));
        assert!(matches!(
            client.elevations(&[GeoPoint::new(100.0, 0.0)]).await,
            Err(ElevationError::InvalidPoint { index: 0 })
        ));
    }
}
