//! Best-effort coarse geolocation.
//!
//! Alerts carry a latitude/longitude resolved from the device's public IP.
//! The lookup is explicitly best-effort: any failure (timeout, network,
//! service error, malformed body) falls back to (0.0, 0.0) and is never
//! propagated to the alert path.

use std::time::Duration;

use serde_json::Value;

const DEFAULT_ENDPOINT: &str = "http://ip-api.com/json";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Coarse location provider.
pub trait Geolocator: Send {
    /// (latitude, longitude); (0.0, 0.0) when unknown.
    fn locate(&self) -> (f64, f64);
}

/// IP-based lookup against a public geolocation endpoint.
pub struct IpGeolocator {
    agent: ureq::Agent,
    endpoint: String,
}

impl IpGeolocator {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        let agent = ureq::builder()
            .timeout_connect(LOOKUP_TIMEOUT)
            .timeout(LOOKUP_TIMEOUT)
            .build();
        Self {
            agent,
            endpoint: endpoint.to_string(),
        }
    }

    fn try_locate(&self) -> Option<(f64, f64)> {
        let body: Value = self.agent.get(&self.endpoint).call().ok()?.into_json().ok()?;
        let lat = body.get("lat")?.as_f64()?;
        let lon = body.get("lon")?.as_f64()?;
        Some((lat, lon))
    }
}

impl Default for IpGeolocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Geolocator for IpGeolocator {
    fn locate(&self) -> (f64, f64) {
        match self.try_locate() {
            Some(latlng) => latlng,
            None => {
                log::debug!("geolocation lookup failed, defaulting to (0.0, 0.0)");
                (0.0, 0.0)
            }
        }
    }
}

/// Fixed-position provider for tests and offline deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticGeolocator {
    pub latitude: f64,
    pub longitude: f64,
}

impl StaticGeolocator {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl Geolocator for StaticGeolocator {
    fn locate(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_endpoint_falls_back_to_origin() {
        // Reserved TEST-NET address; the connect times out or refuses fast.
        let geo = IpGeolocator::with_endpoint("http://192.0.2.1:9/json");
        assert_eq!(geo.locate(), (0.0, 0.0));
    }

    #[test]
    fn static_provider_returns_fixed_position() {
        let geo = StaticGeolocator::new(12.97, 77.59);
        assert_eq!(geo.locate(), (12.97, 77.59));
    }
}
