// Controllers for the Amana bus dashboard: load state, selection and stop projection
use crate::abd_models::{load_catalog, BusLine, BusLineId, CatalogSource, RouteCatalog, StopId};
use log::{debug, error, info};

// ============================================================================
// Load State
// ============================================================================

/// Outcome of the one-shot catalog load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Loaded(RouteCatalog),
    Failed(String),
}

/// Background half of the load: read the catalog and turn a failure into the
/// message shown in place of the dashboard.
pub fn load_for_display(source: &CatalogSource) -> Result<RouteCatalog, String> {
    load_catalog(source).map_err(|e| format!("Failed to load data from {}: {}", source, e))
}

/// Foreground half of the load: settle the selection and produce the new
/// state. A failure clears any selection.
pub fn settle_load(
    result: &Result<RouteCatalog, String>,
    selection: &mut SelectionController,
) -> LoadState {
    match result {
        Ok(catalog) => {
            selection.initialize(catalog);
            info!("Active bus line: {:?}", selection.active_id());
            LoadState::Loaded(catalog.clone())
        }
        Err(message) => {
            error!("{}", message);
            selection.clear();
            LoadState::Failed(message.clone())
        }
    }
}

// ============================================================================
// Selection Controller
// ============================================================================

/// Holds the active bus line. Owned by the top-level app; `select_bus` is the
/// only mutation entry point besides the initial load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionController {
    active: Option<BusLineId>,
}

impl SelectionController {
    /// Point the selection at the first catalog entry, or nothing for an
    /// empty catalog.
    pub fn initialize(&mut self, catalog: &RouteCatalog) {
        self.active = catalog.first().map(|line| line.id);
        debug!("Initial selection: {:?}", self.active);
    }

    /// Returns true when the selection actually changed.
    pub fn select_bus(&mut self, id: BusLineId) -> bool {
        if self.active == Some(id) {
            return false;
        }
        debug!("Selected bus line {} (was {:?})", id, self.active);
        self.active = Some(id);
        true
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active_id(&self) -> Option<BusLineId> {
        self.active
    }

    pub fn is_active(&self, id: BusLineId) -> bool {
        self.active == Some(id)
    }

    /// Resolve the selection against the catalog. A stale id yields `None`.
    pub fn active_route<'a>(&self, catalog: &'a RouteCatalog) -> Option<&'a BusLine> {
        self.active.and_then(|id| catalog.find(id))
    }
}

// ============================================================================
// Stop Projector
// ============================================================================

/// The subset of a stop the map needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedStop {
    pub id: StopId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub estimated_arrival: String,
    pub is_next_stop: bool,
}

/// Project the active route's stops in traversal order. `None` when there is
/// no route or it has no stops.
pub fn project_stops(route: Option<&BusLine>) -> Option<Vec<ProjectedStop>> {
    let route = route?;
    if route.bus_stops.is_empty() {
        return None;
    }

    Some(
        route
            .bus_stops
            .iter()
            .map(|stop| ProjectedStop {
                id: stop.id,
                name: stop.name.clone(),
                latitude: stop.latitude,
                longitude: stop.longitude,
                estimated_arrival: stop.estimated_arrival.clone(),
                is_next_stop: stop.is_next_stop,
            })
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abd_models::tests::{catalog, line, stop};
    use std::io::Write;

    #[test]
    fn test_settle_successful_load_selects_first_line() {
        let catalog = catalog(vec![line(7, "A", vec![]), line(2, "B", vec![])]);
        let mut selection = SelectionController::default();

        let state = settle_load(&Ok(catalog.clone()), &mut selection);
        assert_eq!(state, LoadState::Loaded(catalog));
        assert_eq!(selection.active_id(), Some(BusLineId(7)));
    }

    #[test]
    fn test_malformed_file_fails_load_and_clears_selection() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"bus_lines\": [").unwrap();
        let source = CatalogSource::File(file.path().to_path_buf());

        let mut selection = SelectionController::default();
        selection.select_bus(BusLineId(1));

        let state = settle_load(&load_for_display(&source), &mut selection);
        match state {
            LoadState::Failed(message) => {
                assert!(message.starts_with(&format!("Failed to load data from {}:", source)));
            }
            other => panic!("expected a failed load, got {:?}", other),
        }
        assert_eq!(selection.active_id(), None);
    }

    #[test]
    fn test_missing_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let source = CatalogSource::File(dir.path().join("buses.json"));
        let mut selection = SelectionController::default();

        let state = settle_load(&load_for_display(&source), &mut selection);
        assert!(matches!(state, LoadState::Failed(_)));
        assert_eq!(selection.active_id(), None);
    }

    #[test]
    fn test_bundled_load_settles() {
        let mut selection = SelectionController::default();
        let state = settle_load(&load_for_display(&CatalogSource::Bundled), &mut selection);
        assert!(matches!(state, LoadState::Loaded(_)));
        assert_eq!(selection.active_id(), Some(BusLineId(1)));
    }

    #[test]
    fn test_initial_selection_is_first_line() {
        let catalog = catalog(vec![line(5, "A", vec![]), line(2, "B", vec![])]);
        let mut selection = SelectionController::default();
        assert_eq!(selection.active_id(), None);

        selection.initialize(&catalog);
        assert_eq!(selection.active_id(), Some(BusLineId(5)));
    }

    #[test]
    fn test_initialize_with_empty_catalog() {
        let mut selection = SelectionController::default();
        selection.select_bus(BusLineId(1));
        selection.initialize(&RouteCatalog::default());
        assert_eq!(selection.active_id(), None);
    }

    #[test]
    fn test_select_bus_resolves_exact_line() {
        let catalog = catalog(vec![line(1, "A", vec![]), line(2, "B", vec![]), line(3, "C", vec![])]);
        let mut selection = SelectionController::default();
        selection.initialize(&catalog);

        for l in catalog.lines() {
            selection.select_bus(l.id);
            assert_eq!(selection.active_route(&catalog), Some(l));
            assert!(selection.is_active(l.id));
        }
    }

    #[test]
    fn test_select_bus_reports_change() {
        let mut selection = SelectionController::default();
        assert!(selection.select_bus(BusLineId(1)));
        assert!(!selection.select_bus(BusLineId(1)));
        assert!(selection.select_bus(BusLineId(2)));
    }

    #[test]
    fn test_last_click_wins() {
        let mut selection = SelectionController::default();
        selection.select_bus(BusLineId(1));
        selection.select_bus(BusLineId(3));
        selection.select_bus(BusLineId(2));
        assert_eq!(selection.active_id(), Some(BusLineId(2)));
    }

    #[test]
    fn test_stale_selection_resolves_to_none() {
        let catalog = catalog(vec![line(1, "A", vec![stop(1, "Central", 3.1, 101.6, false)])]);
        let mut selection = SelectionController::default();
        selection.select_bus(BusLineId(42));
        assert!(selection.active_route(&catalog).is_none());
        assert!(project_stops(selection.active_route(&catalog)).is_none());
    }

    #[test]
    fn test_projection_preserves_fields_and_order() {
        let l = line(
            1,
            "A",
            vec![
                stop(3, "Central", 3.1, 101.6, false),
                stop(1, "North", 3.2, 101.7, true),
                stop(2, "East", 3.15, 101.75, false),
            ],
        );
        let projected = project_stops(Some(&l)).unwrap();
        assert_eq!(projected.len(), l.bus_stops.len());

        for (p, s) in projected.iter().zip(&l.bus_stops) {
            assert_eq!(p.id, s.id);
            assert_eq!(p.name, s.name);
            assert_eq!(p.latitude, s.latitude);
            assert_eq!(p.longitude, s.longitude);
            assert_eq!(p.estimated_arrival, s.estimated_arrival);
            assert_eq!(p.is_next_stop, s.is_next_stop);
        }
    }

    #[test]
    fn test_projection_of_empty_route() {
        let l = line(1, "A", vec![]);
        assert!(project_stops(Some(&l)).is_none());
        assert!(project_stops(None).is_none());
    }
}
