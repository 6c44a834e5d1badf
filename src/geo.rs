use std::fmt;

use crate::errors::{AppError, AppResult};

/// Equatorial radius used for all distance calculations.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    latitude: f64,
    longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> AppResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::Parse(format!("latitude {latitude} is out of range")));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::Parse(format!("longitude {longitude} is out of range")));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoCoordinate) -> f64 {
        let from_lat = self.latitude.to_radians();
        let to_lat = other.latitude.to_radians();
        let delta_lat = from_lat - to_lat;
        let delta_lng = (self.longitude - other.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + from_lat.cos() * to_lat.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METERS * c
    }

    pub fn key(&self, precision: u32) -> CoordinateKey {
        let scale = 10_f64.powi(precision as i32);
        CoordinateKey {
            latitude: (self.latitude * scale).round() as i64,
            longitude: (self.longitude * scale).round() as i64,
        }
    }

    pub fn parse_xmp(latitude: &str, longitude: &str) -> AppResult<Self> {
        let lat = parse_xmp_value(latitude, Axis::Latitude)?;
        let lng = parse_xmp_value(longitude, Axis::Longitude)?;
        Self::new(lat, lng)
    }

    pub fn xmp_latitude(&self) -> String {
        format_xmp_value(self.latitude, Axis::Latitude)
    }

    pub fn xmp_longitude(&self) -> String {
        format_xmp_value(self.longitude, Axis::Longitude)
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Coordinate rounded to a fixed number of decimals, used for exact matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    latitude: i64,
    longitude: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn hemisphere(&self, negative: bool) -> char {
        match (self, negative) {
            (Axis::Latitude, false) => 'N',
            (Axis::Latitude, true) => 'S',
            (Axis::Longitude, false) => 'E',
            (Axis::Longitude, true) => 'W',
        }
    }

    fn accepts(&self, hemisphere: char) -> bool {
        match self {
            Axis::Latitude => matches!(hemisphere, 'N' | 'S'),
            Axis::Longitude => matches!(hemisphere, 'E' | 'W'),
        }
    }
}

// XMP GPSCoordinate is "DDD,MM.mmk"; plain decimal degrees are accepted too.
pub fn parse_xmp_value(value: &str, axis: Axis) -> AppResult<f64> {
    let trimmed = value.trim();
    let invalid = || AppError::Parse(format!("invalid GPS value: {value:?}"));

    let Some(hemisphere) = trimmed.chars().last().filter(|c| c.is_ascii_alphabetic()) else {
        return trimmed.parse::<f64>().map_err(|_| invalid());
    };
    let hemisphere = hemisphere.to_ascii_uppercase();
    if !axis.accepts(hemisphere) {
        return Err(invalid());
    }

    let body = &trimmed[..trimmed.len() - 1];
    let (degrees, minutes) = body.split_once(',').ok_or_else(invalid)?;
    let degrees: u32 = degrees.trim().parse().map_err(|_| invalid())?;
    let minutes: f64 = minutes.trim().parse().map_err(|_| invalid())?;
    if !(0.0..60.0).contains(&minutes) {
        return Err(invalid());
    }

    let magnitude = f64::from(degrees) + minutes / 60.0;
    Ok(if matches!(hemisphere, 'S' | 'W') {
        -magnitude
    } else {
        magnitude
    })
}

pub fn format_xmp_value(value: f64, axis: Axis) -> String {
    let magnitude = value.abs();
    let mut degrees = magnitude.trunc();
    // round before printing so a carry never shows up as 60 minutes
    let mut minutes = ((magnitude - degrees) * 60.0 * 1e6).round() / 1e6;
    if minutes >= 60.0 {
        degrees += 1.0;
        minutes = 0.0;
    }
    format!(
        "{},{:.6}{}",
        degrees as u32,
        minutes,
        axis.hemisphere(value < 0.0)
    )
}
