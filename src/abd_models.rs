// Models and catalog loading for the Amana bus dashboard
//
// Data source: a static JSON document with a `bus_lines` array. The default
// fixture is compiled into the binary; an alternate file can be supplied via
// configuration. The document is validated once at load and never written back.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

const BUNDLED_CATALOG: &str = include_str!("../data/buses.json");

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusLineId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopId(pub u32);

impl fmt::Display for BusLineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusStop {
    pub id: StopId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Display value only, e.g. "14:20" or "Delayed".
    pub estimated_arrival: String,
    pub is_next_stop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passengers {
    pub current: u32,
    pub capacity: u32,
    pub utilization_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub name: String,
    pub id: String,
    pub shift_start: String,
    pub shift_end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub license_plate: String,
    pub model: String,
    pub year: u16,
    pub fuel_level: f64,
    pub last_maintenance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Kilometres.
    pub total_distance: f64,
    /// Kilometres per hour.
    pub average_speed: f64,
    pub estimated_completion: String,
    pub frequency_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub reported_by: String,
    pub reported_time: String,
    pub status: String,
    pub priority: IncidentPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusLine {
    pub id: BusLineId,
    pub name: String,
    pub route_number: String,
    pub status: BusStatus,
    pub current_location: CurrentLocation,
    pub passengers: Passengers,
    pub driver: Driver,
    pub vehicle_info: VehicleInfo,
    pub route_info: RouteInfo,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    /// Traversal order; index 0 is the bus's current position.
    pub bus_stops: Vec<BusStop>,
}

impl BusLine {
    /// Utilization derived from the passenger counts. Falls back to the
    /// document value when capacity is zero.
    pub fn utilization_percentage(&self) -> f64 {
        let p = &self.passengers;
        if p.capacity == 0 {
            return p.utilization_percentage;
        }
        f64::from(p.current) / f64::from(p.capacity) * 100.0
    }
}

/// Raw document shape as provided by the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub bus_lines: Vec<BusLine>,
}

// ============================================================================
// Normalized free-form fields
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BusStatus {
    Active,
    Maintenance,
    OutOfService,
    Other(String),
}

impl From<String> for BusStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => BusStatus::Active,
            "maintenance" => BusStatus::Maintenance,
            "out of service" | "out_of_service" | "out-of-service" => BusStatus::OutOfService,
            _ => BusStatus::Other(raw),
        }
    }
}

impl From<BusStatus> for String {
    fn from(status: BusStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusStatus::Active => write!(f, "Active"),
            BusStatus::Maintenance => write!(f, "Maintenance"),
            BusStatus::OutOfService => write!(f, "Out of Service"),
            BusStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IncidentPriority {
    Low,
    Medium,
    High,
    Critical,
    Other(String),
}

impl From<String> for IncidentPriority {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => IncidentPriority::Low,
            "medium" => IncidentPriority::Medium,
            "high" => IncidentPriority::High,
            "critical" => IncidentPriority::Critical,
            _ => IncidentPriority::Other(raw),
        }
    }
}

impl From<IncidentPriority> for String {
    fn from(priority: IncidentPriority) -> Self {
        priority.to_string()
    }
}

impl fmt::Display for IncidentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentPriority::Low => write!(f, "Low"),
            IncidentPriority::Medium => write!(f, "Medium"),
            IncidentPriority::High => write!(f, "High"),
            IncidentPriority::Critical => write!(f, "Critical"),
            IncidentPriority::Other(raw) => write!(f, "{}", raw),
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid bus data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate bus line id {0}")]
    DuplicateLine(BusLineId),
    #[error("Duplicate stop id {stop} on bus line {line}")]
    DuplicateStop { line: BusLineId, stop: StopId },
    #[error("Invalid coordinate for {what} on bus line {line}: ({latitude}, {longitude})")]
    InvalidCoordinate {
        line: BusLineId,
        what: String,
        latitude: f64,
        longitude: f64,
    },
}

pub type Result<T> = std::result::Result<T, CatalogError>;

// ============================================================================
// Route Catalog
// ============================================================================

/// Where the catalog document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Bundled,
    File(PathBuf),
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::Bundled => write!(f, "bundled fixture"),
            CatalogSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Read-only snapshot of every bus line, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteCatalog {
    lines: Vec<BusLine>,
}

impl RouteCatalog {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self> {
        let mut line_ids = HashSet::new();

        for line in &document.bus_lines {
            if !line_ids.insert(line.id) {
                return Err(CatalogError::DuplicateLine(line.id));
            }

            check_coordinate(
                line.id,
                "current location",
                line.current_location.latitude,
                line.current_location.longitude,
            )?;

            let mut stop_ids = HashSet::new();
            for stop in &line.bus_stops {
                if !stop_ids.insert(stop.id) {
                    return Err(CatalogError::DuplicateStop { line: line.id, stop: stop.id });
                }
                check_coordinate(
                    line.id,
                    &format!("stop '{}'", stop.name),
                    stop.latitude,
                    stop.longitude,
                )?;
            }

            let flagged = line.bus_stops.iter().filter(|s| s.is_next_stop).count();
            if flagged > 1 {
                warn!("Bus line {} has {} stops flagged as next stop", line.id, flagged);
            }

            let derived = line.utilization_percentage();
            if (derived - line.passengers.utilization_percentage).abs() > 1.0 {
                warn!(
                    "Bus line {} reports {}% utilization, passenger counts give {:.1}%",
                    line.id, line.passengers.utilization_percentage, derived
                );
            }

            if line.bus_stops.is_empty() {
                debug!("Bus line {} has no stops", line.id);
            }
        }

        Ok(RouteCatalog { lines: document.bus_lines })
    }

    pub fn lines(&self) -> &[BusLine] {
        &self.lines
    }

    pub fn first(&self) -> Option<&BusLine> {
        self.lines.first()
    }

    pub fn find(&self, id: BusLineId) -> Option<&BusLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn check_coordinate(line: BusLineId, what: &str, latitude: f64, longitude: f64) -> Result<()> {
    let valid = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);

    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidCoordinate {
            line,
            what: what.to_string(),
            latitude,
            longitude,
        })
    }
}

/// One-shot catalog load.
pub fn load_catalog(source: &CatalogSource) -> Result<RouteCatalog> {
    let catalog = match source {
        CatalogSource::Bundled => RouteCatalog::from_json(BUNDLED_CATALOG)?,
        CatalogSource::File(path) => {
            let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            RouteCatalog::from_json(&contents)?
        }
    };

    if catalog.is_empty() {
        warn!("No bus lines in {}", source);
    }

    let stops: usize = catalog.lines().iter().map(|l| l.bus_stops.len()).sum();
    info!(
        "Loaded {} bus lines ({} stops) from {}",
        catalog.len(),
        stops,
        source
    );

    Ok(catalog)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    pub(crate) fn stop(id: u32, name: &str, lat: f64, lon: f64, next: bool) -> BusStop {
        BusStop {
            id: StopId(id),
            name: name.to_string(),
            latitude: lat,
            longitude: lon,
            estimated_arrival: format!("14:{:02}", id * 5),
            is_next_stop: next,
        }
    }

    pub(crate) fn line(id: u32, name: &str, stops: Vec<BusStop>) -> BusLine {
        BusLine {
            id: BusLineId(id),
            name: name.to_string(),
            route_number: format!("B{}", id),
            status: BusStatus::Active,
            current_location: CurrentLocation {
                latitude: 3.1,
                longitude: 101.6,
                address: "Jalan Test".to_string(),
            },
            passengers: Passengers { current: 20, capacity: 40, utilization_percentage: 50.0 },
            driver: Driver {
                name: "Aisyah".to_string(),
                id: "DRV9".to_string(),
                shift_start: "06:00".to_string(),
                shift_end: "14:00".to_string(),
            },
            vehicle_info: VehicleInfo {
                license_plate: "WKL 1".to_string(),
                model: "Scania".to_string(),
                year: 2020,
                fuel_level: 80.0,
                last_maintenance: "2024-12-01".to_string(),
            },
            route_info: RouteInfo {
                total_distance: 10.0,
                average_speed: 20.0,
                estimated_completion: "16:00".to_string(),
                frequency_minutes: 15,
            },
            incidents: Vec::new(),
            bus_stops: stops,
        }
    }

    pub(crate) fn catalog(lines: Vec<BusLine>) -> RouteCatalog {
        RouteCatalog::from_document(CatalogDocument { bus_lines: lines }).unwrap()
    }

    #[test]
    fn test_bundled_catalog_loads() {
        let catalog = load_catalog(&CatalogSource::Bundled).unwrap();
        assert!(!catalog.is_empty());
        assert_eq!(catalog.first().unwrap().id, BusLineId(1));
        assert!(catalog.lines().iter().any(|l| l.bus_stops.is_empty()));
    }

    #[test]
    fn test_status_normalization() {
        assert_eq!(BusStatus::from("Active".to_string()), BusStatus::Active);
        assert_eq!(BusStatus::from("  maintenance".to_string()), BusStatus::Maintenance);
        assert_eq!(BusStatus::from("Out of Service".to_string()), BusStatus::OutOfService);
        assert_eq!(
            BusStatus::from("Detour".to_string()),
            BusStatus::Other("Detour".to_string())
        );
        assert_eq!(BusStatus::OutOfService.to_string(), "Out of Service");
    }

    #[test]
    fn test_priority_normalization() {
        assert_eq!(IncidentPriority::from("HIGH".to_string()), IncidentPriority::High);
        assert_eq!(
            IncidentPriority::from("urgent".to_string()),
            IncidentPriority::Other("urgent".to_string())
        );
    }

    #[test]
    fn test_missing_bus_lines_field_is_rejected() {
        let err = RouteCatalog::from_json(r#"{"routes": []}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = RouteCatalog::from_json("{ not json").unwrap_err();
        assert!(err.to_string().starts_with("Invalid bus data"));
    }

    #[test]
    fn test_duplicate_line_ids_rejected() {
        let doc = CatalogDocument {
            bus_lines: vec![line(1, "A", vec![]), line(1, "B", vec![])],
        };
        let err = RouteCatalog::from_document(doc).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateLine(BusLineId(1))));
    }

    #[test]
    fn test_duplicate_stop_ids_rejected() {
        let stops = vec![
            stop(1, "Central", 3.1, 101.6, false),
            stop(1, "North", 3.2, 101.7, false),
        ];
        let doc = CatalogDocument { bus_lines: vec![line(7, "A", stops)] };
        let err = RouteCatalog::from_document(doc).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::DuplicateStop { line: BusLineId(7), stop: StopId(1) }
        ));
    }

    #[test]
    fn test_out_of_range_coordinate_rejected() {
        let stops = vec![stop(1, "Nowhere", 91.0, 101.6, false)];
        let doc = CatalogDocument { bus_lines: vec![line(2, "A", stops)] };
        let err = RouteCatalog::from_document(doc).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_nan_coordinate_rejected() {
        let stops = vec![stop(1, "Nowhere", 3.0, f64::NAN, false)];
        let doc = CatalogDocument { bus_lines: vec![line(2, "A", stops)] };
        assert!(RouteCatalog::from_document(doc).is_err());
    }

    #[test]
    fn test_multiple_next_flags_are_accepted() {
        let stops = vec![
            stop(1, "Central", 3.1, 101.6, true),
            stop(2, "North", 3.2, 101.7, true),
        ];
        let catalog = catalog(vec![line(1, "A", stops)]);
        assert!(catalog.lines()[0].bus_stops.iter().all(|s| s.is_next_stop));
    }

    #[test]
    fn test_utilization_is_derived() {
        let mut l = line(1, "A", vec![]);
        l.passengers = Passengers { current: 32, capacity: 45, utilization_percentage: 71.0 };
        assert_relative_eq!(l.utilization_percentage(), 71.111, epsilon = 0.001);

        l.passengers = Passengers { current: 0, capacity: 0, utilization_percentage: 12.0 };
        assert_relative_eq!(l.utilization_percentage(), 12.0);
    }

    #[test]
    fn test_find_by_id() {
        let catalog = catalog(vec![line(4, "A", vec![]), line(9, "B", vec![])]);
        assert_eq!(catalog.find(BusLineId(9)).unwrap().name, "B");
        assert!(catalog.find(BusLineId(5)).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let doc = CatalogDocument {
            bus_lines: vec![line(3, "Line A", vec![stop(1, "Central", 3.1, 101.6, false)])],
        };
        write!(file, "{}", serde_json::to_string(&doc).unwrap()).unwrap();

        let catalog = load_catalog(&CatalogSource::File(file.path().to_path_buf())).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lines()[0].status, BusStatus::Active);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_catalog(&CatalogSource::File(path)).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_load_empty_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bus_lines": []}}"#).unwrap();

        let catalog = load_catalog(&CatalogSource::File(file.path().to_path_buf())).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.first().is_none());
    }
}
