use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::fields::{LocationFields, TargetField};
use crate::geo::GeoCoordinate;

const CATALOG_EXTENSION: &str = "lrcat";

const FIND_BY_BASE_NAME: &str = "
    SELECT
        AgLibraryFile.baseName AS baseName,
        AgLibraryRootFolder.absolutePath || AgLibraryFolder.pathFromRoot AS folderPath,
        AgHarvestedExifMetadata.gpsLatitude AS gpsLatitude,
        AgHarvestedExifMetadata.gpsLongitude AS gpsLongitude,
        AgInternedIptcLocation.value AS Location,
        AgInternedIptcCity.value AS City,
        AgInternedIptcState.value AS State,
        AgInternedIptcCountry.value AS Country,
        AgInternedIptcIsoCountryCode.value AS CountryCode
    FROM Adobe_images
    JOIN AgLibraryFile ON Adobe_images.rootFile = AgLibraryFile.id_local
    JOIN AgLibraryFolder ON AgLibraryFile.folder = AgLibraryFolder.id_local
    JOIN AgLibraryRootFolder ON AgLibraryFolder.rootFolder = AgLibraryRootFolder.id_local
    LEFT JOIN AgHarvestedExifMetadata ON Adobe_images.id_local = AgHarvestedExifMetadata.image
    LEFT JOIN AgHarvestedIptcMetadata ON Adobe_images.id_local = AgHarvestedIptcMetadata.image
    LEFT JOIN AgInternedIptcLocation ON AgHarvestedIptcMetadata.locationRef = AgInternedIptcLocation.id_local
    LEFT JOIN AgInternedIptcCity ON AgHarvestedIptcMetadata.cityRef = AgInternedIptcCity.id_local
    LEFT JOIN AgInternedIptcState ON AgHarvestedIptcMetadata.stateRef = AgInternedIptcState.id_local
    LEFT JOIN AgInternedIptcCountry ON AgHarvestedIptcMetadata.countryRef = AgInternedIptcCountry.id_local
    LEFT JOIN AgInternedIptcIsoCountryCode
        ON AgHarvestedIptcMetadata.isoCountryCodeRef = AgInternedIptcIsoCountryCode.id_local
    WHERE AgLibraryFile.baseName = ?1
    ORDER BY Adobe_images.id_local
";

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCandidate {
    pub file_name: String,
    pub folder_path: String,
    pub coordinate: Option<GeoCoordinate>,
    pub fields: LocationFields,
}

pub trait CatalogDatabase {
    fn find_by_filename(&self, file_name: &str) -> AppResult<Vec<CatalogCandidate>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogResolution {
    Resolved(CatalogCandidate),
    NotFound,
    Ambiguous(usize),
}

/// Read-only view on a Lightroom classic catalog.
pub struct LightroomCatalog {
    connection: Connection,
    path: PathBuf,
}

impl LightroomCatalog {
    /// Opens the first `*.lrcat` file inside `folder`.
    pub fn open<P: AsRef<Path>>(folder: P) -> AppResult<Self> {
        let folder = folder.as_ref();
        let path = find_catalog_file(folder)?.ok_or_else(|| {
            AppError::Config(format!(
                "no Lightroom catalog (*.{CATALOG_EXTENSION}) found in {}",
                folder.display()
            ))
        })?;
        let connection = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!(
            target: "lightroom_catalog",
            path = %path.display(),
            "opened catalog read-only"
        );
        Ok(Self { connection, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogDatabase for LightroomCatalog {
    fn find_by_filename(&self, file_name: &str) -> AppResult<Vec<CatalogCandidate>> {
        let mut stmt = self.connection.prepare_cached(FIND_BY_BASE_NAME)?;
        let rows = stmt.query_map([file_name], candidate_from_row)?;
        let candidates = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(
            target: "lightroom_catalog",
            file_name,
            matches = candidates.len(),
            "catalog lookup"
        );
        Ok(candidates)
    }
}

fn find_catalog_file(folder: &Path) -> AppResult<Option<PathBuf>> {
    if !folder.is_dir() {
        return Err(AppError::Path(format!(
            "catalog folder {} does not exist",
            folder.display()
        )));
    }
    let mut catalogs = fs::read_dir(folder)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(CATALOG_EXTENSION))
        })
        .collect::<Vec<_>>();
    catalogs.sort();
    Ok(catalogs.into_iter().next())
}

fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogCandidate> {
    let file_name: String = row.get("baseName")?;
    let latitude: Option<f64> = row.get("gpsLatitude")?;
    let longitude: Option<f64> = row.get("gpsLongitude")?;
    let coordinate = match (latitude, longitude) {
        (Some(lat), Some(lng)) => match GeoCoordinate::new(lat, lng) {
            Ok(coordinate) => Some(coordinate),
            Err(err) => {
                warn!(
                    target: "lightroom_catalog",
                    file_name = %file_name,
                    error = %err,
                    "ignoring invalid catalog coordinate"
                );
                None
            }
        },
        _ => None,
    };

    let mut fields = LocationFields::default();
    for (field, column) in [
        (TargetField::CountryCode, "CountryCode"),
        (TargetField::Country, "Country"),
        (TargetField::State, "State"),
        (TargetField::City, "City"),
        (TargetField::Location, "Location"),
    ] {
        fields.set(field, row.get::<_, Option<String>>(column)?);
    }

    Ok(CatalogCandidate {
        file_name,
        folder_path: row.get::<_, Option<String>>("folderPath")?.unwrap_or_default(),
        coordinate,
        fields,
    })
}

pub struct CatalogResolver {
    database: Box<dyn CatalogDatabase>,
}

impl CatalogResolver {
    pub fn new(database: Box<dyn CatalogDatabase>) -> Self {
        Self { database }
    }

    /// Looks up `file_name`; with `strict` the stored folder must match too.
    ///
    /// More than one surviving row is reported as ambiguous rather than
    /// picking one of them.
    pub fn resolve(
        &self,
        file_name: &str,
        folder: &Path,
        strict: bool,
    ) -> AppResult<CatalogResolution> {
        let mut candidates = self.database.find_by_filename(file_name)?;
        if strict {
            let wanted = folder.to_string_lossy();
            let wanted = trim_separators(&wanted);
            candidates.retain(|candidate| trim_separators(&candidate.folder_path) == wanted);
        }

        Ok(match candidates.len() {
            0 => CatalogResolution::NotFound,
            1 => candidates
                .pop()
                .map_or(CatalogResolution::NotFound, CatalogResolution::Resolved),
            count => CatalogResolution::Ambiguous(count),
        })
    }
}

fn trim_separators(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedCatalog(Vec<CatalogCandidate>);

    impl CatalogDatabase for FixedCatalog {
        fn find_by_filename(&self, file_name: &str) -> AppResult<Vec<CatalogCandidate>> {
            Ok(self
                .0
                .iter()
                .filter(|candidate| candidate.file_name == file_name)
                .cloned()
                .collect())
        }
    }

    fn candidate(name: &str, folder: &str, city: &str) -> CatalogCandidate {
        CatalogCandidate {
            file_name: name.to_string(),
            folder_path: folder.to_string(),
            coordinate: None,
            fields: LocationFields::default().with(TargetField::City, city),
        }
    }

    const FIXTURE_SCHEMA: &str = "
        CREATE TABLE Adobe_images (id_local INTEGER PRIMARY KEY, rootFile INTEGER);
        CREATE TABLE AgLibraryFile (
            id_local INTEGER PRIMARY KEY, baseName TEXT, originalFilename TEXT, folder INTEGER
        );
        CREATE TABLE AgLibraryFolder (id_local INTEGER PRIMARY KEY, pathFromRoot TEXT, rootFolder INTEGER);
        CREATE TABLE AgLibraryRootFolder (id_local INTEGER PRIMARY KEY, absolutePath TEXT, name TEXT);
        CREATE TABLE AgHarvestedExifMetadata (image INTEGER, gpsLatitude REAL, gpsLongitude REAL);
        CREATE TABLE AgHarvestedIptcMetadata (
            image INTEGER, locationRef INTEGER, cityRef INTEGER, stateRef INTEGER,
            countryRef INTEGER, isoCountryCodeRef INTEGER
        );
        CREATE TABLE AgInternedIptcLocation (id_local INTEGER PRIMARY KEY, value TEXT);
        CREATE TABLE AgInternedIptcCity (id_local INTEGER PRIMARY KEY, value TEXT);
        CREATE TABLE AgInternedIptcState (id_local INTEGER PRIMARY KEY, value TEXT);
        CREATE TABLE AgInternedIptcCountry (id_local INTEGER PRIMARY KEY, value TEXT);
        CREATE TABLE AgInternedIptcIsoCountryCode (id_local INTEGER PRIMARY KEY, value TEXT);

        INSERT INTO AgLibraryRootFolder VALUES (1, '/photos/', 'photos');
        INSERT INTO AgLibraryFolder VALUES (1, '2023/vienna/', 1);
        INSERT INTO AgLibraryFolder VALUES (2, '2023/salzburg/', 1);
        INSERT INTO AgLibraryFile VALUES (1, 'IMG_0001', 'IMG_0001.CR2', 1);
        INSERT INTO AgLibraryFile VALUES (2, 'IMG_0002', 'IMG_0002.CR2', 1);
        INSERT INTO AgLibraryFile VALUES (3, 'IMG_0002', 'IMG_0002.CR2', 2);
        INSERT INTO Adobe_images VALUES (10, 1);
        INSERT INTO Adobe_images VALUES (11, 2);
        INSERT INTO Adobe_images VALUES (12, 3);
        INSERT INTO AgHarvestedExifMetadata VALUES (10, 48.2082, 16.3738);
        INSERT INTO AgHarvestedExifMetadata VALUES (11, NULL, NULL);
        INSERT INTO AgHarvestedExifMetadata VALUES (12, 47.8095, 13.055);
        INSERT INTO AgInternedIptcCity VALUES (1, 'Vienna');
        INSERT INTO AgInternedIptcCountry VALUES (1, 'Austria');
        INSERT INTO AgInternedIptcIsoCountryCode VALUES (1, 'AT');
        INSERT INTO AgHarvestedIptcMetadata VALUES (10, NULL, 1, NULL, 1, 1);
    ";

    fn fixture_catalog() -> (TempDir, LightroomCatalog) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Catalog.lrcat");
        let connection = Connection::open(&path).unwrap();
        connection.execute_batch(FIXTURE_SCHEMA).unwrap();
        drop(connection);
        let catalog = LightroomCatalog::open(dir.path()).unwrap();
        (dir, catalog)
    }

    #[test]
    fn reads_location_and_gps_from_fixture() {
        let (_dir, catalog) = fixture_catalog();
        assert!(catalog.path().ends_with("Catalog.lrcat"));

        let rows = catalog.find_by_filename("IMG_0001").unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.folder_path, "/photos/2023/vienna/");
        assert_eq!(row.fields.get(TargetField::City), Some("Vienna"));
        assert_eq!(row.fields.get(TargetField::CountryCode), Some("AT"));
        assert_eq!(row.fields.get(TargetField::State), None);
        let coordinate = row.coordinate.unwrap();
        assert!((coordinate.latitude() - 48.2082).abs() < 1e-9);
    }

    #[test]
    fn rows_without_gps_or_iptc_still_match() {
        let (_dir, catalog) = fixture_catalog();
        let rows = catalog.find_by_filename("IMG_0002").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].coordinate.is_none());
        assert!(rows[0].fields.is_empty());
        assert!(catalog.find_by_filename("IMG_9999").unwrap().is_empty());
    }

    #[test]
    fn strict_lookup_disambiguates_by_folder() {
        let (_dir, catalog) = fixture_catalog();
        let resolver = CatalogResolver::new(Box::new(catalog));

        let loose = resolver
            .resolve("IMG_0002", Path::new("/photos/2023/salzburg"), false)
            .unwrap();
        assert_eq!(loose, CatalogResolution::Ambiguous(2));

        match resolver
            .resolve("IMG_0002", Path::new("/photos/2023/salzburg"), true)
            .unwrap()
        {
            CatalogResolution::Resolved(candidate) => {
                assert_eq!(candidate.folder_path, "/photos/2023/salzburg/");
                assert!(candidate.coordinate.is_some());
            }
            other => panic!("expected a single match, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_file_names_are_ambiguous() {
        let resolver = CatalogResolver::new(Box::new(FixedCatalog(vec![
            candidate("IMG_01.xmp", "/a", "Vienna"),
            candidate("IMG_01.xmp", "/b", "Graz"),
        ])));
        assert_eq!(
            resolver.resolve("IMG_01.xmp", Path::new("/a"), false).unwrap(),
            CatalogResolution::Ambiguous(2)
        );
        assert_eq!(
            resolver.resolve("IMG_02.xmp", Path::new("/a"), false).unwrap(),
            CatalogResolution::NotFound
        );
        assert_eq!(
            resolver.resolve("IMG_01.xmp", Path::new("/b/"), true).unwrap(),
            CatalogResolution::Resolved(candidate("IMG_01.xmp", "/b", "Graz"))
        );
    }

    #[test]
    fn missing_catalog_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            LightroomCatalog::open(dir.path()),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            LightroomCatalog::open(dir.path().join("missing")),
            Err(AppError::Path(_))
        ));
    }
}
