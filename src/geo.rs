//! Nearby shop ranking.
//!
//! Input is the `elements` array of an Overpass API response; fetching it is
//! the caller's business.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const EARTH_RADIUS_KM: f64 = 6371.0;
const MAX_SHOPS: usize = 5;
const UNNAMED_SHOP: &str = "Agricultural shop";
const UNKNOWN_ADDRESS: &str = "Near you";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// One Overpass element. Nodes carry `lat`/`lon`; ways carry `center`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OverpassElement {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<LatLon>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl OverpassElement {
    pub fn position(&self) -> Option<LatLon> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(LatLon { lat, lon }),
            _ => self.center,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Shop {
    pub name: String,
    /// `None` for the search fallback entry.
    pub distance_km: Option<f64>,
    pub address: String,
    pub maps_url: String,
}

impl Shop {
    pub fn distance_text(&self) -> String {
        match self.distance_km {
            Some(km) => format!("{km:.1} km"),
            None => "-".to_string(),
        }
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: LatLon, b: LatLon) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Up to five shops, nearest first. Elements without coordinates are
/// skipped. When nothing usable remains, a single map search entry is
/// returned instead.
pub fn rank_shops(origin: LatLon, elements: &[OverpassElement]) -> Vec<Shop> {
    let mut shops: Vec<Shop> = elements
        .iter()
        .filter_map(|element| {
            let position = element.position()?;
            Some(Shop {
                name: element
                    .tags
                    .get("name")
                    .cloned()
                    .unwrap_or_else(|| UNNAMED_SHOP.to_string()),
                distance_km: Some(haversine_km(origin, position)),
                address: element
                    .tags
                    .get("addr:street")
                    .or_else(|| element.tags.get("addr:city"))
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
                maps_url: format!(
                    "https://www.google.com/maps/dir/?api=1&destination={},{}",
                    position.lat, position.lon
                ),
            })
        })
        .collect();

    if shops.is_empty() {
        return vec![search_fallback(origin)];
    }
    shops.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    shops.truncate(MAX_SHOPS);
    shops
}

pub fn search_fallback(origin: LatLon) -> Shop {
    Shop {
        name: "Search on Google Maps".to_string(),
        distance_km: None,
        address: "Fertilizer and seed shops nearby".to_string(),
        maps_url: format!(
            "https://www.google.com/maps/search/fertilizer+shop/@{},{},14z",
            origin.lat, origin.lon
        ),
    }
}

/// Parse the `elements` array out of a raw Overpass response.
pub fn parse_overpass(body: &str) -> anyhow::Result<Vec<OverpassElement>> {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        elements: Vec<OverpassElement>,
    }
    let response: Response = serde_json::from_str(body)?;
    Ok(response.elements)
}
