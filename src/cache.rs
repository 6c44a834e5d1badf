use std::collections::HashMap;

use tracing::trace;

use crate::fields::LocationFields;
use crate::geo::{CoordinateKey, GeoCoordinate};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub coordinate: GeoCoordinate,
    pub fields: LocationFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyHit {
    pub fields: LocationFields,
    pub distance_meters: f64,
}

/// Run-scoped store of resolved locations keyed by rounded coordinate.
///
/// Entries keep their insertion order; the first entry stored for a key stays
/// for the rest of the run.
#[derive(Debug, Clone)]
pub struct CoordinateCache {
    precision: u32,
    entries: Vec<CacheEntry>,
    index: HashMap<CoordinateKey, usize>,
}

impl CoordinateCache {
    pub fn new(precision: u32) -> Self {
        Self {
            precision,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup_exact(&self, coordinate: &GeoCoordinate) -> Option<&LocationFields> {
        self.index
            .get(&coordinate.key(self.precision))
            .map(|position| &self.entries[*position].fields)
    }

    pub fn lookup_fuzzy(&self, coordinate: &GeoCoordinate, radius_meters: f64) -> Option<FuzzyHit> {
        if radius_meters.is_nan() || radius_meters < 0.0 {
            return None;
        }
        let mut nearest: Option<(&CacheEntry, f64)> = None;
        for entry in &self.entries {
            let distance = coordinate.distance_to(&entry.coordinate);
            // strict comparison keeps the earliest entry on ties
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((entry, distance));
            }
        }

        let (entry, distance) = nearest?;
        trace!(
            target: "coordinate_cache",
            query = %coordinate,
            nearest = %entry.coordinate,
            distance,
            radius_meters,
            "fuzzy cache lookup"
        );
        (distance <= radius_meters).then(|| FuzzyHit {
            fields: entry.fields.clone(),
            distance_meters: distance,
        })
    }

    /// Returns `false` when an entry for the same key already exists.
    pub fn insert(&mut self, coordinate: GeoCoordinate, fields: LocationFields) -> bool {
        let key = coordinate.key(self.precision);
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(CacheEntry { coordinate, fields });
        true
    }
}
