//! Nominatim reverse geocoding over blocking HTTP.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use teslog_core::{GeocodeError, Geocoder, Place};
use teslog_protocol::Location;

use crate::config::GeocodeConfig;

pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodeConfig) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| format!("Failed to build HTTP client: {}", err))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn reverse(&self, location: &Location) -> Result<Place, GeocodeError> {
        let latitude = location.latitude.to_string();
        let longitude = location.longitude.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "jsonv2"),
                ("lat", latitude.as_str()),
                ("lon", longitude.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(classify)?;

        let body: Value = response.json().map_err(classify)?;
        parse_response(&body)
    }
}

fn classify(err: reqwest::Error) -> GeocodeError {
    if err.is_timeout() {
        GeocodeError::Timeout
    } else {
        GeocodeError::Upstream(err.to_string())
    }
}

/// Extracts a [`Place`] from a `jsonv2` reverse response. Nominatim reports
/// "nothing here" (open sea, say) as `{"error": ...}` with HTTP 200; that
/// becomes an empty place so the town renders as not-in-data.
fn parse_response(body: &Value) -> Result<Place, GeocodeError> {
    if body.get("error").is_some() {
        return Ok(Place::default());
    }
    let display_name = body
        .get("display_name")
        .and_then(Value::as_str)
        .ok_or_else(|| GeocodeError::Upstream("response has no display_name".to_string()))?
        .to_string();

    let address = body
        .get("address")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Ok(Place {
        display_name,
        address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use teslog_core::NOT_IN_DATA;

    #[test]
    fn parses_address_details() {
        let body = json!({
            "place_id": 1234,
            "display_name": "10 Downing Street, Westminster, London, SW1A 2AA, United Kingdom",
            "address": {
                "house_number": "10",
                "road": "Downing Street",
                "city": "London",
                "postcode": "SW1A 2AA",
                "country_code": "gb"
            }
        });
        let place = parse_response(&body).expect("place");
        assert!(place.display_name.starts_with("10 Downing Street"));
        assert_eq!(place.town(), "London");
        assert_eq!(place.address.len(), 5);
    }

    #[test]
    fn unable_to_geocode_is_an_empty_place() {
        let place = parse_response(&json!({"error": "Unable to geocode"})).expect("place");
        assert_eq!(place.town(), NOT_IN_DATA);
        assert!(place.display_name.is_empty());
    }

    #[test]
    fn missing_display_name_is_upstream_error() {
        let err = parse_response(&json!({"address": {}})).expect_err("must fail");
        assert!(matches!(err, GeocodeError::Upstream(_)));
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(NominatimGeocoder::new(&GeocodeConfig::default()).is_ok());
    }
}
