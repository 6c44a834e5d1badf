use tracing::{debug, info, warn};

use crate::cache::CoordinateCache;
use crate::catalog::{CatalogResolution, CatalogResolver};
use crate::errors::AppResult;
use crate::fields::{FieldMode, LocationFields};
use crate::geo::GeoCoordinate;
use crate::mapper::map_components;
use crate::provider::{GeocodingProvider, ProviderResult};
use crate::sidecar::{PhotoFileReader, PhotoFileWriter, PhotoRecord, ResolvedRecord};
use crate::stats::RunStatistics;

/// State shared by every record of one run.
#[derive(Debug)]
pub struct RunContext {
    pub cache: CoordinateCache,
    pub stats: RunStatistics,
}

impl RunContext {
    pub fn new(precision: u32) -> Self {
        Self {
            cache: CoordinateCache::new(precision),
            stats: RunStatistics::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub field_mode: FieldMode,
    /// `None` disables the fuzzy cache.
    pub fuzzy_radius_meters: Option<f64>,
    pub strict_catalog: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Updated(ResolvedRecord),
    Skipped,
    Failed(String),
}

pub struct ResolutionEngine<'a> {
    provider: &'a dyn GeocodingProvider,
    catalog: Option<&'a CatalogResolver>,
    settings: EngineSettings,
}

impl<'a> ResolutionEngine<'a> {
    pub fn new(provider: &'a dyn GeocodingProvider, settings: EngineSettings) -> Self {
        Self {
            provider,
            catalog: None,
            settings,
        }
    }

    pub fn with_catalog(mut self, catalog: &'a CatalogResolver) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Works out the final location values for one record.
    ///
    /// Catalog data only fills gaps. Cached and provider data are merged with
    /// the configured field mode. Source counters are updated on `ctx`; the
    /// terminal classification is left to the caller.
    pub async fn resolve(&self, ctx: &mut RunContext, record: &PhotoRecord) -> Resolution {
        let mut fields = record.existing_fields.clone();
        let mut coordinate = record.coordinate;

        if let Some(catalog) = self.catalog {
            self.apply_catalog(ctx, catalog, record, &mut fields, &mut coordinate);
        }

        if self.settings.field_mode.wants_any(&fields) {
            match coordinate {
                Some(coordinate) => match self.locate(ctx, coordinate).await {
                    Ok(candidate) => {
                        fields = self.settings.field_mode.merge(&fields, &candidate);
                    }
                    Err(reason) => {
                        ctx.stats.failed_reverse_geocode += 1;
                        return Resolution::Failed(reason);
                    }
                },
                None => {
                    debug!(
                        target: "resolution_engine",
                        path = %record.path.display(),
                        "no coordinate available, nothing to look up"
                    );
                }
            }
        }

        if fields != record.existing_fields || coordinate != record.coordinate {
            Resolution::Updated(ResolvedRecord { fields, coordinate })
        } else {
            Resolution::Skipped
        }
    }

    fn apply_catalog(
        &self,
        ctx: &mut RunContext,
        catalog: &CatalogResolver,
        record: &PhotoRecord,
        fields: &mut LocationFields,
        coordinate: &mut Option<GeoCoordinate>,
    ) {
        let file_stem = record
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let folder = record.path.parent().unwrap_or(&record.path);

        let resolution = match catalog.resolve(&file_stem, folder, self.settings.strict_catalog) {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(
                    target: "resolution_engine",
                    path = %record.path.display(),
                    error = %err,
                    "catalog lookup failed"
                );
                CatalogResolution::NotFound
            }
        };

        match resolution {
            CatalogResolution::Resolved(candidate) => {
                let merged = FieldMode::default().merge(fields, &candidate.fields);
                let adopt_coordinate = coordinate.is_none() && candidate.coordinate.is_some();
                if merged != *fields || adopt_coordinate {
                    ctx.stats.from_catalog += 1;
                }
                *fields = merged;
                if adopt_coordinate {
                    *coordinate = candidate.coordinate;
                }
            }
            CatalogResolution::NotFound => ctx.stats.no_catalog_data += 1,
            CatalogResolution::Ambiguous(count) => {
                debug!(
                    target: "resolution_engine",
                    path = %record.path.display(),
                    matches = count,
                    "catalog match is ambiguous"
                );
                ctx.stats.ambiguous_catalog += 1;
            }
        }
    }

    async fn locate(
        &self,
        ctx: &mut RunContext,
        coordinate: GeoCoordinate,
    ) -> Result<LocationFields, String> {
        if let Some(fields) = ctx.cache.lookup_exact(&coordinate) {
            ctx.stats.from_exact_cache += 1;
            return Ok(fields.clone());
        }
        if let Some(radius) = self.settings.fuzzy_radius_meters {
            if let Some(hit) = ctx.cache.lookup_fuzzy(&coordinate, radius) {
                debug!(
                    target: "resolution_engine",
                    %coordinate,
                    distance = hit.distance_meters,
                    "fuzzy cache hit"
                );
                ctx.stats.from_fuzzy_cache += 1;
                return Ok(hit.fields);
            }
        }

        match self.provider.reverse(coordinate).await {
            ProviderResult::Success(components) => {
                let fields = map_components(&components, self.provider.kind());
                if fields.is_empty() {
                    return Err(format!(
                        "{} returned no location data for {coordinate}",
                        self.provider.kind()
                    ));
                }
                ctx.cache.insert(coordinate, fields.clone());
                ctx.stats.new_from_provider += 1;
                Ok(fields)
            }
            ProviderResult::Error(reason) => Err(reason),
        }
    }

    /// Processes every discovered record, sequentially.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        reader: &dyn PhotoFileReader,
        writer: &dyn PhotoFileWriter,
    ) -> AppResult<()> {
        let paths = reader.discover()?;
        ctx.stats.files_found = paths.len() as u64;

        for (index, path) in paths.iter().enumerate() {
            debug!(
                target: "resolution_engine",
                path = %path.display(),
                position = index + 1,
                total = paths.len(),
                "processing sidecar"
            );
            let record = match reader.read(path) {
                Ok(record) => record,
                Err(err) => {
                    warn!(
                        target: "resolution_engine",
                        path = %path.display(),
                        error = %err,
                        "unreadable sidecar"
                    );
                    ctx.stats.record_failure(path.clone(), err.to_string());
                    continue;
                }
            };

            match self.resolve(ctx, &record).await {
                Resolution::Updated(resolved) => match writer.write(&record, &resolved) {
                    Ok(()) => ctx.stats.updated += 1,
                    Err(err) => {
                        warn!(
                            target: "resolution_engine",
                            path = %path.display(),
                            error = %err,
                            "sidecar write failed"
                        );
                        ctx.stats.record_failure(path.clone(), err.to_string());
                    }
                },
                Resolution::Skipped => ctx.stats.skipped += 1,
                Resolution::Failed(reason) => {
                    warn!(
                        target: "resolution_engine",
                        path = %path.display(),
                        reason = %reason,
                        "reverse geocode failed"
                    );
                    ctx.stats.record_failure(path.clone(), reason);
                }
            }
        }

        info!(
            target: "resolution_engine",
            found = ctx.stats.files_found,
            updated = ctx.stats.updated,
            skipped = ctx.stats.skipped,
            failed = ctx.stats.failures(),
            cached = ctx.cache.len(),
            "run finished"
        );
        Ok(())
    }
}
