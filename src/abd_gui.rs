// GUI implementation for the Amana bus dashboard using egui/eframe
use crate::abd_config::DashboardConfig;
use crate::abd_controllers::{load_for_display, settle_load, LoadState, SelectionController};
use crate::abd_models::{BusLineId, BusStatus, CatalogSource, IncidentPriority, RouteCatalog};
use crate::abd_tiles::{project, unproject, visible_tiles, TileCache, TileKey, TileState, MAX_ZOOM, MIN_ZOOM, TILE_SIZE};
use crate::abd_views::{
    build_page, MapConfig, MapOutcome, MapScene, MarkerRole, PageView, RouteDetails, ScheduleView,
    SelectorButton, LOADING_MESSAGE, MAP_HEIGHT,
};
use chrono::{DateTime, Local};
use eframe::egui;
use egui::{Align2, Color32, FontId, Pos2, Rect, RichText, Stroke, Ui, Vec2};
use egui_extras::{Column, TableBuilder};
use log::{info, warn};
use std::collections::HashSet;
use std::time::Duration;

// ============================================================================
// Palette
// ============================================================================

const GREEN_400: Color32 = Color32::from_rgb(74, 222, 128);
const GREEN_500: Color32 = Color32::from_rgb(34, 197, 94);
const GREEN_700: Color32 = Color32::from_rgb(21, 128, 61);
const GRAY_300: Color32 = Color32::from_rgb(209, 213, 219);
const GRAY_500: Color32 = Color32::from_rgb(107, 114, 128);
const YELLOW_100: Color32 = Color32::from_rgb(254, 249, 195);
const ORANGE_200: Color32 = Color32::from_rgb(254, 215, 170);
const ORANGE_500: Color32 = Color32::from_rgb(249, 115, 22);
const RED_500: Color32 = Color32::from_rgb(239, 68, 68);
const BLUE_600: Color32 = Color32::from_rgb(37, 99, 235);

/// Pointer scroll needed for one zoom step.
const SCROLL_PER_ZOOM_STEP: f32 = 60.0;

// ============================================================================
// Map widget
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct Viewport {
    /// (latitude, longitude)
    center: (f64, f64),
    zoom: u8,
}

/// Pan/zoom map surface. Viewport and popup are reset whenever the active
/// route changes.
struct MapWidget {
    viewport: Option<Viewport>,
    open_popup: Option<usize>,
    scroll_accum: f32,
    tiles: Option<TileCache>,
}

impl MapWidget {
    fn new(tiles: Option<TileCache>) -> Self {
        MapWidget { viewport: None, open_popup: None, scroll_accum: 0.0, tiles }
    }

    fn reset(&mut self) {
        self.viewport = None;
        self.open_popup = None;
        self.scroll_accum = 0.0;
    }

    fn show(&mut self, ui: &mut Ui, scene: &MapScene) {
        let initial = Viewport { center: scene.center, zoom: scene.zoom };
        let mut viewport = self.viewport.unwrap_or(initial);

        let size = Vec2::new(ui.available_width(), MAP_HEIGHT);
        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click_and_drag());

        // Pan
        if response.dragged() {
            let delta = response.drag_delta();
            let (x, y) = project(viewport.center.0, viewport.center.1, viewport.zoom);
            viewport.center = unproject(x - delta.x as f64, y - delta.y as f64, viewport.zoom);
        }

        // Scroll wheel zoom
        if response.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);
            if scroll != 0.0 {
                ui.input_mut(|i| i.smooth_scroll_delta = Vec2::ZERO);
                self.scroll_accum += scroll;
                if self.scroll_accum >= SCROLL_PER_ZOOM_STEP {
                    viewport.zoom = (viewport.zoom + 1).min(MAX_ZOOM);
                    self.scroll_accum = 0.0;
                } else if self.scroll_accum <= -SCROLL_PER_ZOOM_STEP {
                    viewport.zoom = viewport.zoom.saturating_sub(1).max(MIN_ZOOM);
                    self.scroll_accum = 0.0;
                }
            }
        }

        let zoom = viewport.zoom;
        let center_px = project(viewport.center.0, viewport.center.1, zoom);
        let to_screen = move |lat: f64, lon: f64| -> Pos2 {
            let (x, y) = project(lat, lon, zoom);
            rect.center() + Vec2::new((x - center_px.0) as f32, (y - center_px.1) as f32)
        };

        let marker_rects: Vec<Rect> = scene
            .markers
            .iter()
            .map(|m| {
                let pos = to_screen(m.latitude, m.longitude);
                Rect::from_min_size(
                    pos - Vec2::new(m.icon.anchor[0], m.icon.anchor[1]),
                    Vec2::new(m.icon.size[0], m.icon.size[1]),
                )
            })
            .collect();

        let hovered_marker = response
            .hover_pos()
            .and_then(|p| marker_rects.iter().rposition(|r| r.contains(p)));
        if hovered_marker.is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        if response.clicked() {
            self.open_popup = match hovered_marker {
                Some(i) if self.open_popup == Some(i) => None,
                Some(i) => Some(i),
                None => None,
            };
        }

        // Tiles
        let previous_clip = ui.clip_rect();
        ui.set_clip_rect(rect.intersect(previous_clip));
        ui.painter().rect_filled(rect, 0.0, Color32::from_gray(232));

        if let Some(tiles) = self.tiles.as_mut() {
            tiles.poll();
            let placed_tiles = visible_tiles(center_px, zoom, rect.width() as f64, rect.height() as f64);
            for placed in &placed_tiles {
                let tile_rect = Rect::from_min_size(
                    rect.min + Vec2::new(placed.offset.0 as f32, placed.offset.1 as f32),
                    Vec2::splat(TILE_SIZE as f32),
                );
                match tiles.get(placed.key) {
                    TileState::Ready { uri, bytes } => {
                        egui::Image::from_bytes(uri, egui::load::Bytes::Shared(bytes)).paint_at(ui, tile_rect);
                    }
                    TileState::Pending => {
                        ui.painter().rect_filled(tile_rect.shrink(0.5), 0.0, Color32::from_gray(240));
                    }
                    TileState::Failed => {
                        ui.painter().rect_filled(tile_rect.shrink(0.5), 0.0, Color32::from_gray(210));
                    }
                }
            }
            let on_screen: HashSet<TileKey> = placed_tiles.iter().map(|placed| placed.key).collect();
            for uri in tiles.evict_outside(&on_screen) {
                ui.ctx().forget_image(&uri);
            }
            if tiles.has_pending() {
                ui.ctx().request_repaint_after(Duration::from_millis(100));
            }
        }

        let painter = ui.painter().clone();

        // Route path
        let path: Vec<Pos2> = scene.polyline.iter().map(|&(lat, lon)| to_screen(lat, lon)).collect();
        if path.len() > 1 {
            painter.add(egui::Shape::line(path, Stroke::new(4.0, BLUE_600)));
        }

        // Markers
        for (marker, icon_rect) in scene.markers.iter().zip(&marker_rects) {
            paint_marker(&painter, marker.role, *icon_rect);
        }

        // Attribution and path length
        let attribution = format!("{} | path {:.1} km", scene.tiles.attribution, scene.path_length_km);
        let galley = painter.layout_no_wrap(attribution, FontId::proportional(10.0), Color32::from_gray(60));
        let text_rect = Align2::RIGHT_BOTTOM.anchor_size(rect.right_bottom() - Vec2::new(4.0, 2.0), galley.size());
        painter.rect_filled(text_rect.expand(2.0), 2.0, Color32::from_white_alpha(180));
        painter.galley(text_rect.min, galley, Color32::from_gray(60));

        ui.set_clip_rect(previous_clip);

        // Zoom controls
        let button_size = Vec2::splat(24.0);
        let zoom_in = Rect::from_min_size(rect.min + Vec2::new(8.0, 8.0), button_size);
        let zoom_out = zoom_in.translate(Vec2::new(0.0, 28.0));
        let recenter = zoom_out.translate(Vec2::new(0.0, 28.0));
        if ui.put(zoom_in, egui::Button::new("+")).clicked() {
            viewport.zoom = (viewport.zoom + 1).min(MAX_ZOOM);
        }
        if ui.put(zoom_out, egui::Button::new("−")).clicked() {
            viewport.zoom = viewport.zoom.saturating_sub(1).max(MIN_ZOOM);
        }
        if ui.put(recenter, egui::Button::new("◎")).on_hover_text("Recenter").clicked() {
            viewport = initial;
        }

        // Popup
        if let Some(marker) = self.open_popup.and_then(|i| scene.markers.get(i)) {
            let tip = to_screen(marker.latitude, marker.longitude)
                + Vec2::new(marker.icon.popup_anchor[0], marker.icon.popup_anchor[1]);
            if popup_visible(ui.clip_rect(), rect, tip) {
                let (title, body) = marker.popup.lines();
                egui::Area::new(egui::Id::new("map_popup"))
                    .fixed_pos(tip)
                    .pivot(Align2::CENTER_BOTTOM)
                    .order(egui::Order::Foreground)
                    .show(ui.ctx(), |ui| {
                        egui::Frame::popup(ui.style()).show(ui, |ui| {
                            ui.strong(title);
                            for line in body {
                                ui.label(line);
                            }
                        });
                    });
            }
        }

        self.viewport = Some(viewport);
    }
}

/// A popup is drawn above every panel, so only show it while its tip is on the
/// visible part of the map.
fn popup_visible(clip: Rect, map: Rect, tip: Pos2) -> bool {
    clip.intersect(map).contains(tip)
}

fn paint_marker(painter: &egui::Painter, role: MarkerRole, icon: Rect) {
    let tip = Pos2::new(icon.center().x, icon.max.y);
    match role {
        MarkerRole::CurrentPosition => {
            let body = Rect::from_min_max(icon.min, Pos2::new(icon.max.x, icon.max.y - 6.0));
            painter.rect_filled(body, 6.0, GREEN_700);
            painter.line_segment([Pos2::new(tip.x, body.max.y), tip], Stroke::new(2.0, GREEN_700));
            painter.text(body.center(), Align2::CENTER_CENTER, "🚌", FontId::proportional(18.0), Color32::WHITE);
        }
        MarkerRole::UpcomingStop | MarkerRole::OrdinaryStop => {
            let color = if role == MarkerRole::UpcomingStop { ORANGE_500 } else { RED_500 };
            let radius = icon.width() * 0.35;
            let head = Pos2::new(icon.center().x, icon.min.y + radius + 1.0);
            painter.add(egui::Shape::convex_polygon(
                vec![Pos2::new(head.x - radius * 0.8, head.y + radius * 0.5), Pos2::new(head.x + radius * 0.8, head.y + radius * 0.5), tip],
                color,
                Stroke::NONE,
            ));
            painter.circle_filled(head, radius, color);
            painter.circle_filled(head, radius * 0.4, Color32::WHITE);
            if role == MarkerRole::UpcomingStop {
                painter.circle_stroke(head, radius + 2.0, Stroke::new(2.0, ORANGE_200));
            }
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

pub struct AbdApp {
    source: CatalogSource,
    map_config: MapConfig,

    load_state: LoadState,
    selection: SelectionController,
    map: MapWidget,

    menu_open: bool,

    // Background task for the one-shot catalog load
    init_promise: Option<poll_promise::Promise<Result<RouteCatalog, String>>>,
}

impl AbdApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: DashboardConfig) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);

        let map_config = config.map_config();
        let tiles = config.tile_cache_root().and_then(|root| {
            TileCache::new(map_config.tiles.clone(), Some(root))
                .map_err(|e| warn!("Map tiles disabled: {}", e))
                .ok()
        });

        let mut app = AbdApp {
            source: config.catalog_source(),
            map_config,
            load_state: LoadState::Loading,
            selection: SelectionController::default(),
            map: MapWidget::new(tiles),
            menu_open: false,
            init_promise: None,
        };

        app.start_initialization();
        app
    }

    fn start_initialization(&mut self) {
        let source = self.source.clone();
        info!("Loading bus data from {}", source);

        let promise = poll_promise::Promise::spawn_thread("catalog", move || {
            load_for_display(&source)
        });
        self.init_promise = Some(promise);
        self.load_state = LoadState::Loading;
    }

    fn check_initialization(&mut self) {
        let Some(promise) = &self.init_promise else { return };
        let Some(result) = promise.ready() else { return };

        self.load_state = settle_load(result, &mut self.selection);
        self.init_promise = None;
    }

    fn select_bus(&mut self, id: BusLineId) {
        if self.selection.select_bus(id) {
            self.map.reset();
        }
    }
}

impl eframe::App for AbdApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_initialization();

        self.show_nav_bar(ctx);

        egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.label("Copyright 2025 Amana Industries (Group 7)");
            });
        });

        let page = build_page(&self.load_state, &self.selection, &self.map_config);

        match &page {
            PageView::Loading => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.centered_and_justified(|ui| {
                        ui.vertical_centered(|ui| {
                            ui.spinner();
                            ui.label(LOADING_MESSAGE);
                        });
                    });
                });
                ctx.request_repaint_after(Duration::from_millis(100));
            }
            PageView::Error(message) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    Self::show_banner(ui);
                    ui.add_space(24.0);
                    ui.vertical_centered(|ui| {
                        ui.colored_label(RED_500, message);
                    });
                });
            }
            PageView::Ready { selectors, map, schedule, details } => {
                egui::SidePanel::right("route_details")
                    .min_width(260.0)
                    .show(ctx, |ui| {
                        egui::ScrollArea::vertical().show(ui, |ui| match details {
                            Some(details) => show_route_details(ui, details),
                            None => {
                                ui.label(RichText::new("Route details").strong());
                                ui.separator();
                                ui.label("Select a bus route to view details");
                            }
                        });
                    });

                let mut clicked = None;
                egui::CentralPanel::default().show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        Self::show_banner(ui);
                        ui.add_space(12.0);

                        section_heading(ui, "Active Bus Map");
                        clicked = clicked.or(show_selectors(ui, selectors));
                        ui.add_space(8.0);
                        match map {
                            MapOutcome::Scene(scene) => self.map.show(ui, scene),
                            MapOutcome::Placeholder(message) => show_map_placeholder(ui, message),
                        }

                        ui.add_space(16.0);
                        section_heading(ui, "Bus Schedule");
                        clicked = clicked.or(show_selectors(ui, selectors));
                        ui.add_space(8.0);
                        show_schedule(ui, schedule);
                    });
                });

                if let Some(id) = clicked {
                    self.select_bus(id);
                }
            }
        }

        // Header clock
        ctx.request_repaint_after(Duration::from_secs(1));
    }
}

// ============================================================================
// View Implementations
// ============================================================================

impl AbdApp {
    fn show_nav_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("nav_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(RichText::new("Amana Logo").strong());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("☰").on_hover_text("Menu").clicked() {
                        self.menu_open = !self.menu_open;
                    }
                    let now: DateTime<Local> = Local::now();
                    ui.label(now.format("%H:%M:%S").to_string());
                });
            });
            if self.menu_open {
                ui.separator();
                ui.horizontal(|ui| {
                    for entry in ["Home", "Buses", "About"] {
                        let _ = ui.link(entry);
                    }
                });
            }
        });
    }

    fn show_banner(ui: &mut Ui) {
        egui::Frame::none()
            .fill(GREEN_400)
            .inner_margin(egui::Margin::symmetric(16.0, 24.0))
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.vertical_centered(|ui| {
                    ui.label(RichText::new("Amana Transportation").size(28.0).strong().color(Color32::BLACK));
                    ui.label(
                        RichText::new("Proudly Servicing Malaysian Bus Riders Since 2019!")
                            .size(16.0)
                            .color(Color32::BLACK),
                    );
                });
            });
    }
}

fn section_heading(ui: &mut Ui, title: &str) {
    egui::Frame::none()
        .fill(YELLOW_100)
        .rounding(12.0)
        .inner_margin(egui::Margin::symmetric(16.0, 12.0))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.vertical_centered(|ui| {
                ui.label(RichText::new(title).size(20.0).strong().color(Color32::BLACK));
            });
        });
}

/// Returns the id of the clicked button, if any.
fn show_selectors(ui: &mut Ui, selectors: &[SelectorButton]) -> Option<BusLineId> {
    let mut clicked = None;
    ui.horizontal_wrapped(|ui| {
        for selector in selectors {
            let (fill, text, stroke) = if selector.active {
                (GREEN_500, Color32::WHITE, GREEN_700)
            } else {
                (GRAY_300, Color32::BLACK, GRAY_500)
            };
            let button = egui::Button::new(RichText::new(&selector.label).color(text))
                .fill(fill)
                .stroke(Stroke::new(1.0, stroke))
                .rounding(8.0);
            if ui.add(button).clicked() {
                clicked = Some(selector.id);
            }
        }
    });
    clicked
}

fn show_map_placeholder(ui: &mut Ui, message: &str) {
    let size = Vec2::new(ui.available_width(), MAP_HEIGHT);
    let (rect, _) = ui.allocate_exact_size(size, egui::Sense::hover());
    ui.painter().rect_filled(rect, 8.0, Color32::from_gray(245));
    ui.painter().text(
        rect.center(),
        Align2::CENTER_CENTER,
        message,
        FontId::proportional(16.0),
        Color32::from_gray(80),
    );
}

fn show_schedule(ui: &mut Ui, schedule: &ScheduleView) {
    let rows = match schedule {
        ScheduleView::Rows(rows) => rows,
        other => {
            if let Some(message) = other.placeholder() {
                ui.vertical_centered(|ui| {
                    ui.colored_label(GRAY_500, message);
                });
            }
            return;
        }
    };

    TableBuilder::new(ui)
        .striped(false)
        .vscroll(false)
        .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
        .column(Column::remainder().at_least(160.0))
        .column(Column::auto().at_least(180.0))
        .header(26.0, |mut header| {
            header.col(|ui| {
                ui.strong("Bus Stop");
            });
            header.col(|ui| {
                ui.strong("Next Time of Arrival");
            });
        })
        .body(|mut body| {
            for row in rows {
                body.row(24.0, |mut table_row| {
                    for text in [&row.stop_name, &row.estimated_arrival] {
                        table_row.col(|ui| {
                            if row.highlighted {
                                ui.painter().rect_filled(ui.max_rect(), 0.0, ORANGE_200);
                            }
                            ui.label(RichText::new(text.as_str()).color(Color32::BLACK));
                        });
                    }
                });
            }
        });
}

fn status_color(status: &BusStatus) -> Color32 {
    match status {
        BusStatus::Active => GREEN_500,
        BusStatus::Maintenance => ORANGE_500,
        BusStatus::OutOfService => RED_500,
        BusStatus::Other(_) => GRAY_500,
    }
}

fn priority_color(priority: &IncidentPriority) -> Color32 {
    match priority {
        IncidentPriority::Low => GREEN_500,
        IncidentPriority::Medium => ORANGE_500,
        IncidentPriority::High | IncidentPriority::Critical => RED_500,
        IncidentPriority::Other(_) => GRAY_500,
    }
}

fn show_route_details(ui: &mut Ui, details: &RouteDetails) {
    ui.label(RichText::new(&details.title).strong().size(16.0));
    ui.colored_label(status_color(&details.status), format!("● {}", details.status));
    ui.label(format!("📍 {}", details.address));
    ui.separator();

    ui.label(RichText::new("Passengers").strong());
    ui.add(egui::ProgressBar::new(details.utilization).text(details.passengers.as_str()));
    ui.add_space(6.0);

    ui.label(RichText::new("Driver").strong());
    ui.label(&details.driver);
    ui.label(format!("Shift: {}", details.shift));
    ui.add_space(6.0);

    ui.label(RichText::new("Vehicle").strong());
    ui.label(&details.vehicle);
    ui.add(egui::ProgressBar::new(details.fuel_level).text(format!("Fuel {:.0}%", details.fuel_level * 100.0)));
    ui.label(format!("Last maintenance: {}", details.last_maintenance));
    ui.add_space(6.0);

    ui.label(RichText::new("Route").strong());
    egui::Grid::new("route_summary").num_columns(2).show(ui, |ui| {
        for (label, value) in &details.route_summary {
            ui.label(label);
            ui.label(value);
            ui.end_row();
        }
    });
    ui.separator();

    ui.label(RichText::new(format!("Incidents ({})", details.incidents.len())).strong());
    if details.incidents.is_empty() {
        ui.label("No incidents reported");
    }
    for incident in &details.incidents {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.colored_label(priority_color(&incident.priority), format!("● {}", incident.priority));
                ui.strong(&incident.kind);
            });
            ui.label(&incident.description);
            ui.small(format!("{} · {}", incident.reported, incident.status));
        });
        ui.add_space(4.0);
    }
}

// ============================================================================
// Public entry point
// ============================================================================

pub fn run_gui(config: DashboardConfig) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Amana Transportation",
        options,
        Box::new(move |cc| Ok(Box::new(AbdApp::new(cc, config)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_hidden_when_map_scrolled_out_of_view() {
        let map = Rect::from_min_size(Pos2::new(0.0, 100.0), Vec2::new(600.0, MAP_HEIGHT));
        let tip = Pos2::new(300.0, 150.0);

        let full_view = Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 800.0));
        assert!(popup_visible(full_view, map, tip));

        // Top of the map is scrolled under the navigation bar.
        let scrolled = Rect::from_min_max(Pos2::new(0.0, 200.0), Pos2::new(800.0, 800.0));
        assert!(!popup_visible(scrolled, map, tip));

        let outside_map = Pos2::new(700.0, 150.0);
        assert!(!popup_visible(full_view, map, outside_map));
    }
}
