use async_trait::async_trait;
use hibiscus_core::routing::{Coordinates, DistanceLookup, RouteEstimator};
use hibiscus_core::{CoreError, CoreResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DISTANCE_MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Google Distance Matrix, used for fare distances and driver ETAs.
#[derive(Clone)]
pub struct GoogleMapsClient {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<ValueField>,
    duration: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: f64,
}

/// The single origin/destination element, provided both statuses are OK.
fn first_element(response: MatrixResponse) -> CoreResult<MatrixElement> {
    if response.status != "OK" {
        return Err(CoreError::upstream(format!("Distance Matrix status {}", response.status)));
    }
    let element = response
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .ok_or_else(|| CoreError::upstream("Distance Matrix returned no elements"))?;
    if element.status != "OK" {
        return Err(CoreError::upstream(format!("Distance Matrix element status {}", element.status)));
    }
    Ok(element)
}

fn distance_km(response: MatrixResponse) -> CoreResult<f64> {
    let meters = first_element(response)?
        .distance
        .ok_or_else(|| CoreError::upstream("Distance Matrix element has no distance"))?
        .value;
    Ok((meters / 1000.0 * 100.0).round() / 100.0)
}

fn eta_minutes(response: MatrixResponse) -> CoreResult<i64> {
    let seconds = first_element(response)?
        .duration
        .ok_or_else(|| CoreError::upstream("Distance Matrix element has no duration"))?
        .value;
    Ok((seconds / 60.0).round() as i64)
}

impl GoogleMapsClient {
    pub fn new(api_key: &str, timeout: Duration) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CoreError::upstream)?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }

    async fn matrix(&self, origin: &str, destination: &str) -> CoreResult<MatrixResponse> {
        let params = [
            ("origins", origin),
            ("destinations", destination),
            ("mode", "driving"),
            ("units", "metric"),
            ("key", self.api_key.as_str()),
        ];
        let response = self
            .client
            .get(DISTANCE_MATRIX_URL)
            .query(&params)
            .send()
            .await
            .map_err(|e| CoreError::upstream(format!("Distance Matrix request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::upstream(format!("Distance Matrix returned {}", response.status())));
        }
        response
            .json::<MatrixResponse>()
            .await
            .map_err(|e| CoreError::upstream(format!("Distance Matrix body: {e}")))
    }
}

#[async_trait]
impl DistanceLookup for GoogleMapsClient {
    async fn distance_km(&self, origin: &str, destination: &str) -> CoreResult<f64> {
        distance_km(self.matrix(origin, destination).await?)
    }
}

#[async_trait]
impl RouteEstimator for GoogleMapsClient {
    async fn eta_minutes(&self, from: Coordinates, to_address: &str) -> CoreResult<i64> {
        let origin = format!("{},{}", from.lat, from.lng);
        eta_minutes(self.matrix(&origin, to_address).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> MatrixResponse {
        serde_json::from_value(value).unwrap()
    }

    fn ok_response() -> MatrixResponse {
        parse(json!({
            "status": "OK",
            "rows": [{ "elements": [{
                "status": "OK",
                "distance": { "value": 23456.0, "text": "23.5 km" },
                "duration": { "value": 1290.0, "text": "22 mins" }
            }]}]
        }))
    }

    #[test]
    fn test_distance_rounds_to_two_places() {
        assert_eq!(distance_km(ok_response()).unwrap(), 23.46);
    }

    #[test]
    fn test_eta_rounds_to_nearest_minute() {
        assert_eq!(eta_minutes(ok_response()).unwrap(), 22);
    }

    #[test]
    fn test_element_failure_is_upstream_error() {
        let response = parse(json!({
            "status": "OK",
            "rows": [{ "elements": [{ "status": "ZERO_RESULTS" }] }]
        }));
        assert!(matches!(distance_km(response), Err(CoreError::UpstreamUnavailable(_))));
    }

    #[test]
    fn test_request_denied() {
        let response = parse(json!({ "status": "REQUEST_DENIED", "rows": [] }));
        assert!(matches!(eta_minutes(response), Err(CoreError::UpstreamUnavailable(_))));
    }
}
