//! Geolocation adapter: town/address lookup for report lines.
//!
//! Reverse geocoding is keyed by slippy-map tile, so every point inside the
//! same ~150 m square at zoom 18 shares one cache entry.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use teslog_protocol::Location;
use tracing::{debug, error, warn};

use crate::error::{Result, TeslogError};

/// Placeholder reported when the geocoder timed out.
pub const SKIPPED: &str = "Skipped";

/// Placeholder reported when the place has no hamlet/village/town/city.
pub const NOT_IN_DATA: &str = "NotInData";

/// Placeholder reported when a session never saw a location.
pub const UNKNOWN_LOCATION: &str = "?";

pub const DEFAULT_ZOOM: u8 = 18;

const TOWN_KEYS: [&str; 4] = ["hamlet", "village", "town", "city"];

// Web Mercator is undefined at the poles.
const MAX_LATITUDE: f64 = 85.051_128_78;

/// Town/address lookup as seen by the reporter.
pub trait Locate {
    fn town_for(&self, location: &Location) -> Result<String>;
    fn address_for(&self, location: &Location) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl Tile {
    /// Cache key, `zoom/x/y` like a tile URL.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// OpenStreetMap slippy-map tile containing `location`.
pub fn tile_for(location: &Location, zoom: u8) -> Tile {
    let n = 2f64.powi(i32::from(zoom));
    let max_index = n - 1.0;
    let lat_rad = location
        .latitude
        .clamp(-MAX_LATITUDE, MAX_LATITUDE)
        .to_radians();

    let x = ((location.longitude + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

    Tile {
        x: x.clamp(0.0, max_index) as u32,
        y: y.clamp(0.0, max_index) as u32,
        zoom,
    }
}

/// One reverse-geocoding result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Place {
    pub display_name: String,
    #[serde(default)]
    pub address: BTreeMap<String, String>,
}

impl Place {
    /// Smallest named settlement, or `NotInData`.
    pub fn town(&self) -> String {
        TOWN_KEYS
            .iter()
            .find_map(|key| self.address.get(*key))
            .cloned()
            .unwrap_or_else(|| NOT_IN_DATA.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoder timed out")]
    Timeout,

    #[error("geocoder failed: {0}")]
    Upstream(String),
}

/// Raw reverse geocoding service.
pub trait Geocoder {
    fn reverse(&self, location: &Location) -> std::result::Result<Place, GeocodeError>;
}

/// Persistent or in-memory tile → place cache.
pub trait GeoCache {
    fn get(&self, tile: &Tile) -> Result<Option<Place>>;
    fn put(&self, tile: &Tile, place: &Place) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryGeoCache {
    places: Mutex<HashMap<String, Place>>,
}

impl MemoryGeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.places.lock().map(|places| places.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GeoCache for MemoryGeoCache {
    fn get(&self, tile: &Tile) -> Result<Option<Place>> {
        let places = self
            .places
            .lock()
            .map_err(|_| TeslogError::Locate("geocode cache lock poisoned".to_string()))?;
        Ok(places.get(&tile.key()).cloned())
    }

    fn put(&self, tile: &Tile, place: &Place) -> Result<()> {
        let mut places = self
            .places
            .lock()
            .map_err(|_| TeslogError::Locate("geocode cache lock poisoned".to_string()))?;
        places.insert(tile.key(), place.clone());
        Ok(())
    }
}

impl<C: GeoCache + ?Sized> GeoCache for &C {
    fn get(&self, tile: &Tile) -> Result<Option<Place>> {
        (**self).get(tile)
    }

    fn put(&self, tile: &Tile, place: &Place) -> Result<()> {
        (**self).put(tile, place)
    }
}

/// Cache-first locator. A timeout becomes [`SKIPPED`] and is not cached;
/// any other geocoder failure propagates.
pub struct CachedLocator<G, C> {
    geocoder: G,
    cache: C,
    zoom: u8,
}

impl<G: Geocoder, C: GeoCache> CachedLocator<G, C> {
    pub fn new(geocoder: G, cache: C) -> Self {
        Self::with_zoom(geocoder, cache, DEFAULT_ZOOM)
    }

    pub fn with_zoom(geocoder: G, cache: C, zoom: u8) -> Self {
        Self {
            geocoder,
            cache,
            zoom,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    fn place(&self, location: &Location) -> Result<Option<Place>> {
        let tile = tile_for(location, self.zoom);
        if let Some(place) = self.cache.get(&tile)? {
            debug!(%location, tile = %tile.key(), "Geocode cache hit");
            return Ok(Some(place));
        }

        debug!(%location, tile = %tile.key(), "Geocode lookup");
        match self.geocoder.reverse(location) {
            Ok(place) => {
                self.cache.put(&tile, &place)?;
                Ok(Some(place))
            }
            Err(GeocodeError::Timeout) => {
                warn!(%location, "Geocoder timed out, skipping lookup");
                Ok(None)
            }
            Err(GeocodeError::Upstream(message)) => {
                error!(%location, error = %message, "Geocoder failed");
                Err(TeslogError::Locate(message))
            }
        }
    }
}

impl<G: Geocoder, C: GeoCache> Locate for CachedLocator<G, C> {
    fn town_for(&self, location: &Location) -> Result<String> {
        Ok(self
            .place(location)?
            .map_or_else(|| SKIPPED.to_string(), |place| place.town()))
    }

    fn address_for(&self, location: &Location) -> Result<String> {
        Ok(self
            .place(location)?
            .map_or_else(|| SKIPPED.to_string(), |place| place.display_name))
    }
}

/// Offline locator: renders the coordinates themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateLocator;

impl Locate for CoordinateLocator {
    fn town_for(&self, location: &Location) -> Result<String> {
        Ok(location.to_string())
    }

    fn address_for(&self, location: &Location) -> Result<String> {
        Ok(location.to_string())
    }
}
