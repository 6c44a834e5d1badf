use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::{AppError, AppResult};
use crate::fields::{LocationFields, TargetField};
use crate::geo::GeoCoordinate;

const SIDECAR_EXTENSION: &str = "xmp";
const BACKUP_MARKER: &str = ".BK";

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const EXIF_NS: &str = "http://ns.adobe.com/exif/1.0/";
const IPTC_CORE_NS: &str = "http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/";
const PHOTOSHOP_NS: &str = "http://ns.adobe.com/photoshop/1.0/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct XmpProperty {
    namespace: &'static str,
    prefix: &'static str,
    name: &'static str,
}

impl XmpProperty {
    const fn new(namespace: &'static str, prefix: &'static str, name: &'static str) -> Self {
        Self {
            namespace,
            prefix,
            name,
        }
    }

    fn matches(&self, namespace: &[u8], local_name: &[u8]) -> bool {
        namespace == self.namespace.as_bytes() && local_name == self.name.as_bytes()
    }

    fn qualified_name(&self) -> String {
        format!("{}:{}", self.prefix, self.name)
    }
}

const GPS_LATITUDE: XmpProperty = XmpProperty::new(EXIF_NS, "exif", "GPSLatitude");
const GPS_LONGITUDE: XmpProperty = XmpProperty::new(EXIF_NS, "exif", "GPSLongitude");

fn location_property(field: TargetField) -> XmpProperty {
    match field {
        TargetField::CountryCode => XmpProperty::new(IPTC_CORE_NS, "Iptc4xmpCore", "CountryCode"),
        TargetField::Country => XmpProperty::new(PHOTOSHOP_NS, "photoshop", "Country"),
        TargetField::State => XmpProperty::new(PHOTOSHOP_NS, "photoshop", "State"),
        TargetField::City => XmpProperty::new(PHOTOSHOP_NS, "photoshop", "City"),
        TargetField::Location => XmpProperty::new(IPTC_CORE_NS, "Iptc4xmpCore", "Location"),
    }
}

/// A sidecar as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub path: PathBuf,
    pub existing_fields: LocationFields,
    pub coordinate: Option<GeoCoordinate>,
}

/// Values a record should carry after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub fields: LocationFields,
    pub coordinate: Option<GeoCoordinate>,
}

pub trait PhotoFileReader {
    fn discover(&self) -> AppResult<Vec<PathBuf>>;
    fn read(&self, path: &Path) -> AppResult<PhotoRecord>;
}

pub trait PhotoFileWriter {
    fn write(&self, record: &PhotoRecord, resolved: &ResolvedRecord) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct XmpSidecarStore {
    sources: Vec<PathBuf>,
    excludes: Vec<PathBuf>,
    test_mode: bool,
    backup: bool,
}

impl XmpSidecarStore {
    pub fn new(sources: Vec<PathBuf>, excludes: Vec<PathBuf>) -> Self {
        Self {
            sources,
            excludes,
            test_mode: false,
            backup: true,
        }
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excludes.iter().any(|exclude| path.starts_with(exclude))
    }
}

fn is_sidecar(path: &Path) -> bool {
    let is_xmp = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SIDECAR_EXTENSION));
    let is_backup = path
        .file_stem()
        .is_some_and(|stem| stem.to_string_lossy().ends_with(BACKUP_MARKER));
    is_xmp && !is_backup
}

pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{BACKUP_MARKER}.{}", ext.to_string_lossy()),
        None => format!("{stem}{BACKUP_MARKER}"),
    };
    path.with_file_name(name)
}

impl PhotoFileReader for XmpSidecarStore {
    fn discover(&self) -> AppResult<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for source in &self.sources {
            if source.is_file() {
                if is_sidecar(source) && !self.is_excluded(source) && seen.insert(source.clone()) {
                    found.push(source.clone());
                }
                continue;
            }
            if !source.is_dir() {
                return Err(AppError::Path(format!(
                    "source {} does not exist",
                    source.display()
                )));
            }

            let walker = WalkDir::new(source)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !self.is_excluded(entry.path()));
            for entry in walker {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        if entry.file_type().is_file()
                            && is_sidecar(path)
                            && seen.insert(path.to_path_buf())
                        {
                            found.push(path.to_path_buf());
                        }
                    }
                    Err(err) => {
                        warn!(target: "sidecar_store", error = %err, "skipping unreadable entry");
                    }
                }
            }
        }

        info!(
            target: "sidecar_store",
            sources = self.sources.len(),
            found = found.len(),
            "sidecar discovery finished"
        );
        Ok(found)
    }

    fn read(&self, path: &Path) -> AppResult<PhotoRecord> {
        let content = fs::read_to_string(path)?;
        let (existing_fields, coordinate) = parse_sidecar(&content)?;
        debug!(
            target: "sidecar_store",
            path = %path.display(),
            has_coordinate = coordinate.is_some(),
            "read sidecar"
        );
        Ok(PhotoRecord {
            path: path.to_path_buf(),
            existing_fields,
            coordinate,
        })
    }
}

impl PhotoFileWriter for XmpSidecarStore {
    fn write(&self, record: &PhotoRecord, resolved: &ResolvedRecord) -> AppResult<()> {
        let updates = pending_updates(record, resolved);
        if updates.is_empty() {
            return Ok(());
        }
        if self.test_mode {
            info!(
                target: "sidecar_store",
                path = %record.path.display(),
                properties = updates.len(),
                "test mode, sidecar left unchanged"
            );
            return Ok(());
        }

        let content = fs::read_to_string(&record.path)?;
        let rewritten = rewrite_description(&content, &updates)?;
        if self.backup {
            fs::copy(&record.path, backup_path(&record.path))?;
        }
        fs::write(&record.path, rewritten)?;
        info!(
            target: "sidecar_store",
            path = %record.path.display(),
            properties = updates.len(),
            "sidecar updated"
        );
        Ok(())
    }
}

fn pending_updates(record: &PhotoRecord, resolved: &ResolvedRecord) -> Vec<(XmpProperty, String)> {
    let mut updates = Vec::new();
    if record.coordinate.is_none() {
        if let Some(coordinate) = resolved.coordinate {
            updates.push((GPS_LATITUDE, coordinate.xmp_latitude()));
            updates.push((GPS_LONGITUDE, coordinate.xmp_longitude()));
        }
    }
    for (field, value) in resolved.fields.iter() {
        if let Some(value) = value {
            if record.existing_fields.get(field) != Some(value) {
                updates.push((location_property(field), value.to_string()));
            }
        }
    }
    updates
}

fn parse_sidecar(content: &str) -> AppResult<(LocationFields, Option<GeoCoordinate>)> {
    let document = roxmltree::Document::parse(content)?;
    let descriptions: Vec<_> = document
        .descendants()
        .filter(|node| node.has_tag_name((RDF_NS, "Description")))
        .collect();

    let lookup = |property: XmpProperty| -> Option<String> {
        descriptions.iter().find_map(|node| {
            node.attribute((property.namespace, property.name))
                .map(str::to_string)
                .or_else(|| {
                    node.children()
                        .find(|child| child.has_tag_name((property.namespace, property.name)))
                        .and_then(|child| child.text())
                        .map(str::to_string)
                })
                .filter(|value| !value.trim().is_empty())
        })
    };

    let mut fields = LocationFields::default();
    for field in TargetField::ALL {
        fields.set(field, lookup(location_property(field)));
    }

    let coordinate = match (lookup(GPS_LATITUDE), lookup(GPS_LONGITUDE)) {
        (Some(latitude), Some(longitude)) => Some(GeoCoordinate::parse_xmp(&latitude, &longitude)?),
        _ => None,
    };
    Ok((fields, coordinate))
}

fn bound_namespace(result: &ResolveResult<'_>) -> Option<Vec<u8>> {
    match result {
        ResolveResult::Bound(namespace) => Some(namespace.as_ref().to_vec()),
        _ => None,
    }
}

fn is_description(namespace: Option<&[u8]>, start: &BytesStart<'_>) -> bool {
    namespace == Some(RDF_NS.as_bytes()) && start.local_name().as_ref() == b"Description"
}

fn is_replaced(
    updates: &[(XmpProperty, String)],
    namespace: Option<&[u8]>,
    local_name: &[u8],
) -> bool {
    namespace.is_some_and(|namespace| {
        updates
            .iter()
            .any(|(property, _)| property.matches(namespace, local_name))
    })
}

/// Rewrites the first `rdf:Description` with `updates` as attributes.
///
/// Older attribute or element forms of the same properties are dropped from
/// that description; the rest of the document is copied through.
fn rewrite_description(content: &str, updates: &[(XmpProperty, String)]) -> AppResult<String> {
    let mut reader = NsReader::from_str(content);
    let mut writer = Writer::new(Vec::with_capacity(content.len() + 256));

    let mut rewritten = false;
    // open elements below the description being rewritten
    let mut depth: Option<usize> = None;
    let mut skip_from: Option<usize> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        let namespace = bound_namespace(&resolved);

        match event {
            Event::Eof => break,
            Event::Start(start)
                if !rewritten && depth.is_none() && is_description(namespace.as_deref(), &start) =>
            {
                let replacement = rewrite_start(&reader, &start, updates)?;
                rewritten = true;
                depth = Some(0);
                writer.write_event(Event::Start(replacement))?;
            }
            Event::Empty(start)
                if !rewritten && depth.is_none() && is_description(namespace.as_deref(), &start) =>
            {
                let replacement = rewrite_start(&reader, &start, updates)?;
                rewritten = true;
                writer.write_event(Event::Empty(replacement))?;
            }
            Event::Start(start) if depth.is_some() => {
                let level = depth.unwrap_or_default();
                depth = Some(level + 1);
                if skip_from.is_some() {
                    continue;
                }
                if level == 0
                    && is_replaced(updates, namespace.as_deref(), start.local_name().as_ref())
                {
                    skip_from = Some(level);
                    continue;
                }
                writer.write_event(Event::Start(start))?;
            }
            Event::End(end) if depth.is_some() => {
                let level = depth.unwrap_or_default();
                if level == 0 {
                    depth = None;
                    writer.write_event(Event::End(end))?;
                    continue;
                }
                depth = Some(level - 1);
                if skip_from == Some(level - 1) {
                    skip_from = None;
                    continue;
                }
                if skip_from.is_none() {
                    writer.write_event(Event::End(end))?;
                }
            }
            Event::Empty(empty) if depth.is_some() => {
                let at_top = depth == Some(0);
                let replaced = at_top
                    && is_replaced(updates, namespace.as_deref(), empty.local_name().as_ref());
                if skip_from.is_none() && !replaced {
                    writer.write_event(Event::Empty(empty))?;
                }
            }
            other => {
                if skip_from.is_none() {
                    writer.write_event(other)?;
                }
            }
        }
    }

    if !rewritten {
        return Err(AppError::Parse(
            "sidecar has no rdf:Description element".to_string(),
        ));
    }
    String::from_utf8(writer.into_inner())
        .map_err(|err| AppError::Parse(format!("rewritten sidecar is not UTF-8: {err}")))
}

fn rewrite_start(
    reader: &NsReader<&[u8]>,
    start: &BytesStart<'_>,
    updates: &[(XmpProperty, String)],
) -> AppResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut replacement = BytesStart::new(name);
    let mut declared: HashSet<String> = HashSet::new();

    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            declared.insert(prefix.to_string());
        }
        let (resolved, local_name) = reader.resolve_attribute(attribute.key);
        let namespace = bound_namespace(&resolved);
        if is_replaced(updates, namespace.as_deref(), local_name.as_ref()) {
            continue;
        }
        replacement.push_attribute(attribute);
    }

    for (property, _) in updates {
        if declared.insert(property.prefix.to_string()) {
            let key = format!("xmlns:{}", property.prefix);
            replacement.push_attribute((key.as_str(), property.namespace));
        }
    }
    for (property, value) in updates {
        replacement.push_attribute((property.qualified_name().as_str(), value.as_str()));
    }
    Ok(replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ATTRIBUTE_SIDECAR: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description rdf:about=""
        xmlns:exif="http://ns.adobe.com/exif/1.0/"
        xmlns:photoshop="http://ns.adobe.com/photoshop/1.0/"
        exif:GPSLatitude="48,12.492N"
        exif:GPSLongitude="16,22.428E"
        photoshop:City="Vienna">
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    const ELEMENT_SIDECAR: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description rdf:about=""
        xmlns:photoshop="http://ns.adobe.com/photoshop/1.0/"
        xmlns:Iptc4xmpCore="http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/">
      <photoshop:Country>Austria</photoshop:Country>
      <Iptc4xmpCore:Location>Innere Stadt</Iptc4xmpCore:Location>
      <photoshop:Headline>Cathedral</photoshop:Headline>
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>"#;

    fn store_in(dir: &TempDir) -> XmpSidecarStore {
        XmpSidecarStore::new(vec![dir.path().to_path_buf()], Vec::new())
    }

    #[test]
    fn reads_attribute_properties() {
        let (fields, coordinate) = parse_sidecar(ATTRIBUTE_SIDECAR).unwrap();
        assert_eq!(fields.get(TargetField::City), Some("Vienna"));
        assert_eq!(fields.get(TargetField::Country), None);
        let coordinate = coordinate.unwrap();
        assert!((coordinate.latitude() - 48.2082).abs() < 1e-9);
        assert!((coordinate.longitude() - 16.3738).abs() < 1e-9);
    }

    #[test]
    fn reads_element_properties() {
        let (fields, coordinate) = parse_sidecar(ELEMENT_SIDECAR).unwrap();
        assert_eq!(fields.get(TargetField::Country), Some("Austria"));
        assert_eq!(fields.get(TargetField::Location), Some("Innere Stadt"));
        assert!(coordinate.is_none());
    }

    #[test]
    fn rewrite_replaces_attributes_and_elements() {
        let updates = vec![
            (location_property(TargetField::Country), "Österreich".to_string()),
            (location_property(TargetField::City), "Wien & Umgebung".to_string()),
        ];
        let rewritten = rewrite_description(ELEMENT_SIDECAR, &updates).unwrap();
        assert!(!rewritten.contains("<photoshop:Country>"));
        assert!(rewritten.contains("<photoshop:Headline>Cathedral</photoshop:Headline>"));

        let (fields, _) = parse_sidecar(&rewritten).unwrap();
        assert_eq!(fields.get(TargetField::Country), Some("Österreich"));
        assert_eq!(fields.get(TargetField::City), Some("Wien & Umgebung"));
        assert_eq!(fields.get(TargetField::Location), Some("Innere Stadt"));
    }

    #[test]
    fn rewrite_declares_missing_namespaces() {
        let coordinate = GeoCoordinate::new(-33.8688, 151.2093).unwrap();
        let updates = vec![
            (GPS_LATITUDE, coordinate.xmp_latitude()),
            (GPS_LONGITUDE, coordinate.xmp_longitude()),
            (location_property(TargetField::CountryCode), "AU".to_string()),
        ];
        let rewritten = rewrite_description(ATTRIBUTE_SIDECAR, &updates).unwrap();
        assert!(rewritten
            .contains(r#"xmlns:Iptc4xmpCore="http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/""#));
        assert_eq!(rewritten.matches("xmlns:exif=").count(), 1);
        assert!(rewritten.starts_with("<?xpacket"));

        let (fields, parsed) = parse_sidecar(&rewritten).unwrap();
        assert_eq!(fields.get(TargetField::CountryCode), Some("AU"));
        assert_eq!(fields.get(TargetField::City), Some("Vienna"));
        assert!(parsed.unwrap().distance_to(&coordinate) < 0.01);
    }

    #[test]
    fn rewrite_requires_a_description() {
        let updates = vec![(location_property(TargetField::City), "Vienna".to_string())];
        assert!(rewrite_description("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>", &updates).is_err());
    }

    #[test]
    fn discovery_skips_backups_and_excluded_folders() {
        let dir = TempDir::new().unwrap();
        let skipped = dir.path().join("skipped");
        fs::create_dir(&skipped).unwrap();
        fs::write(dir.path().join("a.xmp"), ATTRIBUTE_SIDECAR).unwrap();
        fs::write(dir.path().join("a.BK.xmp"), ATTRIBUTE_SIDECAR).unwrap();
        fs::write(dir.path().join("b.XMP"), ATTRIBUTE_SIDECAR).unwrap();
        fs::write(dir.path().join("b.jpg"), b"not a sidecar").unwrap();
        fs::write(skipped.join("c.xmp"), ATTRIBUTE_SIDECAR).unwrap();

        let store = XmpSidecarStore::new(
            vec![dir.path().to_path_buf(), dir.path().join("a.xmp")],
            vec![skipped],
        );
        let found = store.discover().unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.xmp"), dir.path().join("b.XMP")]
        );

        let missing = XmpSidecarStore::new(vec![dir.path().join("nope")], Vec::new());
        assert!(missing.discover().is_err());
    }

    #[test]
    fn write_creates_backup_and_updates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("IMG_0001.xmp");
        fs::write(&path, ELEMENT_SIDECAR).unwrap();
        let store = store_in(&dir);

        let record = store.read(&path).unwrap();
        let resolved = ResolvedRecord {
            fields: record.existing_fields.clone().with(TargetField::City, "Vienna"),
            coordinate: None,
        };
        store.write(&record, &resolved).unwrap();

        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), ELEMENT_SIDECAR);
        let reread = store.read(&path).unwrap();
        assert_eq!(reread.existing_fields, resolved.fields);
    }

    #[test]
    fn test_mode_and_no_backup_are_honored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("IMG_0002.xmp");
        fs::write(&path, ELEMENT_SIDECAR).unwrap();

        let dry_run = store_in(&dir).with_test_mode(true);
        let record = dry_run.read(&path).unwrap();
        let resolved = ResolvedRecord {
            fields: record.existing_fields.clone().with(TargetField::State, "Wien"),
            coordinate: None,
        };
        dry_run.write(&record, &resolved).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), ELEMENT_SIDECAR);

        let no_backup = store_in(&dir).with_backup(false);
        no_backup.write(&record, &resolved).unwrap();
        assert!(!backup_path(&path).exists());
        assert_eq!(
            no_backup.read(&path).unwrap().existing_fields.get(TargetField::State),
            Some("Wien")
        );
    }

    #[test]
    fn backup_name_keeps_extension() {
        assert_eq!(
            backup_path(Path::new("/photos/IMG_01.xmp")),
            PathBuf::from("/photos/IMG_01.BK.xmp")
        );
    }
}
