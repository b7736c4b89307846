// View models for the Amana bus dashboard
//
// Everything here is a pure function of (catalog, selection, config). The GUI
// only paints what these functions return.
use crate::abd_controllers::{project_stops, LoadState, ProjectedStop, SelectionController};
use crate::abd_models::{BusLine, BusLineId, BusStatus, IncidentPriority};
use geo::{Distance, Haversine};
use geo_types::Point;

pub const NO_STOPS_MESSAGE: &str = "No stops available";
pub const SELECT_ROUTE_MESSAGE: &str = "Select a bus route to view schedule";
pub const NO_SCHEDULE_MESSAGE: &str = "No stops scheduled for this route";
pub const LOADING_MESSAGE: &str = "Loading bus data...";

/// Height of the map region and of its placeholder, in points.
pub const MAP_HEIGHT: f32 = 384.0;

// ============================================================================
// Map configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TileSource {
    /// Template with `{s}`, `{z}`, `{x}`, `{y}` and `{r}` placeholders.
    pub url_template: String,
    pub attribution: String,
    pub subdomains: Vec<String>,
    pub retina: bool,
}

impl Default for TileSource {
    fn default() -> Self {
        TileSource {
            url_template: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png"
                .to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            retina: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub zoom: u8,
    pub tiles: TileSource,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig { zoom: 13, tiles: TileSource::default() }
    }
}

// ============================================================================
// Marker classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerRole {
    CurrentPosition,
    UpcomingStop,
    OrdinaryStop,
}

/// Index 0 is always the bus; otherwise the next-stop flag decides.
pub fn classify_stop(index: usize, is_next_stop: bool) -> MarkerRole {
    match (index, is_next_stop) {
        (0, _) => MarkerRole::CurrentPosition,
        (_, true) => MarkerRole::UpcomingStop,
        (_, false) => MarkerRole::OrdinaryStop,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerIcon {
    pub size: [f32; 2],
    /// Point of the icon placed on the coordinate, from the top-left corner.
    pub anchor: [f32; 2],
    /// Popup tip offset relative to the anchor.
    pub popup_anchor: [f32; 2],
}

impl MarkerRole {
    pub fn icon(self) -> MarkerIcon {
        match self {
            MarkerRole::CurrentPosition => MarkerIcon {
                size: [32.0, 32.0],
                anchor: [16.0, 32.0],
                popup_anchor: [0.0, -30.0],
            },
            MarkerRole::UpcomingStop => MarkerIcon {
                size: [30.0, 30.0],
                anchor: [15.0, 30.0],
                popup_anchor: [0.0, -27.0],
            },
            MarkerRole::OrdinaryStop => MarkerIcon {
                size: [28.0, 28.0],
                anchor: [14.0, 28.0],
                popup_anchor: [0.0, -25.0],
            },
        }
    }
}

// ============================================================================
// Map scene
// ============================================================================

/// Route-level metadata used by the current-position popup.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMeta {
    pub bus_name: String,
    pub status: BusStatus,
    pub current_passengers: u32,
    pub capacity: u32,
    pub driver_name: String,
    pub license_plate: String,
    pub last_maintenance: String,
}

impl RouteMeta {
    pub fn from_line(line: &BusLine) -> Self {
        RouteMeta {
            bus_name: line.name.clone(),
            status: line.status.clone(),
            current_passengers: line.passengers.current,
            capacity: line.passengers.capacity,
            driver_name: line.driver.name.clone(),
            license_plate: line.vehicle_info.license_plate.clone(),
            last_maintenance: line.vehicle_info.last_maintenance.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupContent {
    BusSummary {
        bus_name: String,
        status: BusStatus,
        capacity: String,
        next_stop: String,
        driver_name: String,
        license_plate: String,
        last_maintenance: String,
    },
    StopArrival {
        stop_name: String,
        estimated_arrival: String,
    },
}

impl PopupContent {
    /// Title and body lines as displayed.
    pub fn lines(&self) -> (String, Vec<String>) {
        match self {
            PopupContent::BusSummary {
                bus_name,
                status,
                capacity,
                next_stop,
                driver_name,
                license_plate,
                last_maintenance,
            } => (
                bus_name.clone(),
                vec![
                    format!("Status: {}", status),
                    format!("Capacity: {}", capacity),
                    format!("Next stop: {}", next_stop),
                    format!("Driver: {}", driver_name),
                    format!("Plate: {}", license_plate),
                    format!("Last maintenance: {}", last_maintenance),
                ],
            ),
            PopupContent::StopArrival { stop_name, estimated_arrival } => {
                (stop_name.clone(), vec![format!("Next arrival: {}", estimated_arrival)])
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub index: usize,
    pub latitude: f64,
    pub longitude: f64,
    pub role: MarkerRole,
    pub icon: MarkerIcon,
    pub popup: PopupContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapScene {
    /// (latitude, longitude)
    pub center: (f64, f64),
    pub zoom: u8,
    pub tiles: TileSource,
    /// (latitude, longitude) in traversal order.
    pub polyline: Vec<(f64, f64)>,
    pub markers: Vec<MapMarker>,
    pub path_length_km: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    Placeholder(&'static str),
    Scene(MapScene),
}

/// Name of the stop the bus is heading to: the first flagged stop after the
/// current position, else the stop right after it.
pub fn next_stop_name(stops: &[ProjectedStop]) -> String {
    stops
        .iter()
        .skip(1)
        .find(|s| s.is_next_stop)
        .or_else(|| stops.get(1))
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "N/A".to_string())
}

fn path_length_km(polyline: &[(f64, f64)]) -> f64 {
    polyline
        .windows(2)
        .map(|pair| {
            let a = Point::new(pair[0].1, pair[0].0);
            let b = Point::new(pair[1].1, pair[1].0);
            Haversine.distance(a, b)
        })
        .sum::<f64>()
        / 1000.0
}

pub fn build_map_scene(
    stops: &[ProjectedStop],
    meta: Option<&RouteMeta>,
    config: &MapConfig,
) -> MapOutcome {
    let Some(first) = stops.first() else {
        return MapOutcome::Placeholder(NO_STOPS_MESSAGE);
    };

    let next_stop = next_stop_name(stops);

    let markers = stops
        .iter()
        .enumerate()
        .map(|(index, stop)| {
            let role = classify_stop(index, stop.is_next_stop);
            let popup = match (role, meta) {
                (MarkerRole::CurrentPosition, Some(meta)) => PopupContent::BusSummary {
                    bus_name: meta.bus_name.clone(),
                    status: meta.status.clone(),
                    capacity: format!("{}/{}", meta.current_passengers, meta.capacity),
                    next_stop: next_stop.clone(),
                    driver_name: meta.driver_name.clone(),
                    license_plate: meta.license_plate.clone(),
                    last_maintenance: meta.last_maintenance.clone(),
                },
                _ => PopupContent::StopArrival {
                    stop_name: stop.name.clone(),
                    estimated_arrival: stop.estimated_arrival.clone(),
                },
            };

            MapMarker {
                index,
                latitude: stop.latitude,
                longitude: stop.longitude,
                role,
                icon: role.icon(),
                popup,
            }
        })
        .collect();

    let polyline: Vec<(f64, f64)> = stops.iter().map(|s| (s.latitude, s.longitude)).collect();
    let path_length_km = path_length_km(&polyline);

    MapOutcome::Scene(MapScene {
        center: (first.latitude, first.longitude),
        zoom: config.zoom,
        tiles: config.tiles.clone(),
        polyline,
        markers,
        path_length_km,
    })
}

// ============================================================================
// Schedule table
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRow {
    pub stop_name: String,
    pub estimated_arrival: String,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleView {
    SelectPrompt,
    NoStops,
    Rows(Vec<ScheduleRow>),
}

impl ScheduleView {
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            ScheduleView::SelectPrompt => Some(SELECT_ROUTE_MESSAGE),
            ScheduleView::NoStops => Some(NO_SCHEDULE_MESSAGE),
            ScheduleView::Rows(_) => None,
        }
    }
}

pub fn build_schedule(route: Option<&BusLine>) -> ScheduleView {
    let Some(route) = route else {
        return ScheduleView::SelectPrompt;
    };
    if route.bus_stops.is_empty() {
        return ScheduleView::NoStops;
    }

    ScheduleView::Rows(
        route
            .bus_stops
            .iter()
            .enumerate()
            .map(|(i, stop)| ScheduleRow {
                stop_name: stop.name.clone(),
                estimated_arrival: stop.estimated_arrival.clone(),
                highlighted: i == 0,
            })
            .collect(),
    )
}

// ============================================================================
// Route details
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentRow {
    pub kind: String,
    pub description: String,
    pub reported: String,
    pub status: String,
    pub priority: IncidentPriority,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDetails {
    pub title: String,
    pub status: BusStatus,
    pub address: String,
    pub passengers: String,
    /// 0.0..=1.0
    pub utilization: f32,
    pub driver: String,
    pub shift: String,
    pub vehicle: String,
    pub fuel_level: f32,
    pub last_maintenance: String,
    pub route_summary: Vec<(String, String)>,
    pub incidents: Vec<IncidentRow>,
}

pub fn build_route_details(line: &BusLine) -> RouteDetails {
    let utilization = line.utilization_percentage();
    let vehicle = &line.vehicle_info;
    let route = &line.route_info;

    RouteDetails {
        title: format!("{} ({})", line.name, line.route_number),
        status: line.status.clone(),
        address: line.current_location.address.clone(),
        passengers: format!(
            "{}/{} ({:.0}%)",
            line.passengers.current, line.passengers.capacity, utilization
        ),
        utilization: (utilization / 100.0).clamp(0.0, 1.0) as f32,
        driver: format!("{} ({})", line.driver.name, line.driver.id),
        shift: format!("{} - {}", line.driver.shift_start, line.driver.shift_end),
        vehicle: format!("{} · {} ({})", vehicle.license_plate, vehicle.model, vehicle.year),
        fuel_level: (vehicle.fuel_level / 100.0).clamp(0.0, 1.0) as f32,
        last_maintenance: vehicle.last_maintenance.clone(),
        route_summary: vec![
            ("Distance".to_string(), format!("{:.1} km", route.total_distance)),
            ("Average speed".to_string(), format!("{:.0} km/h", route.average_speed)),
            ("Completion".to_string(), route.estimated_completion.clone()),
            ("Frequency".to_string(), format!("every {} min", route.frequency_minutes)),
        ],
        incidents: line
            .incidents
            .iter()
            .map(|incident| IncidentRow {
                kind: incident.kind.clone(),
                description: incident.description.clone(),
                reported: format!("{} at {}", incident.reported_by, incident.reported_time),
                status: incident.status.clone(),
                priority: incident.priority.clone(),
            })
            .collect(),
    }
}

// ============================================================================
// Page
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorButton {
    pub id: BusLineId,
    pub label: String,
    pub active: bool,
}

pub fn build_selectors(lines: &[BusLine], selection: &SelectionController) -> Vec<SelectorButton> {
    lines
        .iter()
        .map(|line| SelectorButton {
            id: line.id,
            label: line.name.clone(),
            active: selection.is_active(line.id),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageView {
    Loading,
    Error(String),
    Ready {
        selectors: Vec<SelectorButton>,
        map: MapOutcome,
        schedule: ScheduleView,
        details: Option<RouteDetails>,
    },
}

/// Derive everything the window shows for the current frame.
pub fn build_page(
    state: &LoadState,
    selection: &SelectionController,
    config: &MapConfig,
) -> PageView {
    let catalog = match state {
        LoadState::Loading => return PageView::Loading,
        LoadState::Failed(message) => return PageView::Error(message.clone()),
        LoadState::Loaded(catalog) => catalog,
    };

    let route = selection.active_route(catalog);
    let map = match project_stops(route) {
        Some(stops) => {
            let meta = route.map(RouteMeta::from_line);
            build_map_scene(&stops, meta.as_ref(), config)
        }
        None => MapOutcome::Placeholder(NO_STOPS_MESSAGE),
    };

    PageView::Ready {
        selectors: build_selectors(catalog.lines(), selection),
        map,
        schedule: build_schedule(route),
        details: route.map(build_route_details),
    }
}

// ============================================================================
// Tests
// ============================================================================
