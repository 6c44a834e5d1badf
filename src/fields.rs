use std::fmt;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetField {
    CountryCode,
    Country,
    State,
    City,
    Location,
}

impl TargetField {
    pub const ALL: [TargetField; 5] = [
        TargetField::CountryCode,
        TargetField::Country,
        TargetField::State,
        TargetField::City,
        TargetField::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetField::CountryCode => "countrycode",
            TargetField::Country => "country",
            TargetField::State => "state",
            TargetField::City => "city",
            TargetField::Location => "location",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "countrycode" => Ok(TargetField::CountryCode),
            "country" => Ok(TargetField::Country),
            "state" => Ok(TargetField::State),
            "city" => Ok(TargetField::City),
            "location" => Ok(TargetField::Location),
            _ => Err(AppError::Config(format!("unknown location field: {value}"))),
        }
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location names attached to a photo. Empty strings are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFields {
    country_code: Option<String>,
    country: Option<String>,
    state: Option<String>,
    city: Option<String>,
    location: Option<String>,
}

impl LocationFields {
    pub fn get(&self, field: TargetField) -> Option<&str> {
        let slot = match field {
            TargetField::CountryCode => &self.country_code,
            TargetField::Country => &self.country,
            TargetField::State => &self.state,
            TargetField::City => &self.city,
            TargetField::Location => &self.location,
        };
        slot.as_deref()
    }

    pub fn set(&mut self, field: TargetField, value: Option<String>) {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let slot = match field {
            TargetField::CountryCode => &mut self.country_code,
            TargetField::Country => &mut self.country,
            TargetField::State => &mut self.state,
            TargetField::City => &mut self.city,
            TargetField::Location => &mut self.location,
        };
        *slot = value;
    }

    pub fn with(mut self, field: TargetField, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        TargetField::ALL.iter().all(|field| self.get(*field).is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = (TargetField, Option<&str>)> + '_ {
        TargetField::ALL.iter().map(move |field| (*field, self.get(*field)))
    }
}

/// Run-wide policy deciding which fields may take a new value.
///
/// With no targets every field is eligible; with targets only those fields
/// may be overwritten, all others still get their gaps filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMode {
    overwrite: bool,
    targets: Vec<TargetField>,
}

impl FieldMode {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            targets: Vec::new(),
        }
    }

    pub fn targeted(field: TargetField) -> Self {
        Self {
            overwrite: false,
            targets: vec![field],
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_target(mut self, field: TargetField) -> Self {
        if !self.targets.contains(&field) {
            self.targets.push(field);
        }
        self
    }

    /// Builds a mode from CLI words such as `overwrite` or `city`; `default`
    /// adds nothing.
    pub fn from_words<I, S>(words: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mode = FieldMode::default();
        for word in words {
            let word = word.as_ref();
            if word.trim().eq_ignore_ascii_case("overwrite") {
                mode.overwrite = true;
            } else if word.trim().eq_ignore_ascii_case("default") {
                continue;
            } else {
                mode = mode.with_target(TargetField::parse(word)?);
            }
        }
        Ok(mode)
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn targets(&self) -> &[TargetField] {
        &self.targets
    }

    fn may_overwrite(&self, field: TargetField) -> bool {
        self.overwrite && (self.targets.is_empty() || self.targets.contains(&field))
    }

    pub fn decide(
        &self,
        field: TargetField,
        existing: Option<&str>,
        candidate: Option<&str>,
    ) -> Option<String> {
        let existing = existing.filter(|v| !v.trim().is_empty());
        let candidate = candidate.filter(|v| !v.trim().is_empty());
        match (existing, candidate) {
            (existing, None) => existing.map(str::to_string),
            (None, Some(candidate)) => Some(candidate.to_string()),
            (Some(_), Some(candidate)) if self.may_overwrite(field) => Some(candidate.to_string()),
            (Some(existing), Some(_)) => Some(existing.to_string()),
        }
    }

    /// Whether `field` would accept a new value given its current content.
    pub fn wants(&self, field: TargetField, existing: Option<&str>) -> bool {
        existing.map_or(true, |v| v.trim().is_empty()) || self.may_overwrite(field)
    }

    pub fn wants_any(&self, fields: &LocationFields) -> bool {
        fields.iter().any(|(field, value)| self.wants(field, value))
    }

    pub fn merge(&self, existing: &LocationFields, candidate: &LocationFields) -> LocationFields {
        let mut merged = LocationFields::default();
        for field in TargetField::ALL {
            merged.set(
                field,
                self.decide(field, existing.get(field), candidate.get(field)),
            );
        }
        merged
    }
}
