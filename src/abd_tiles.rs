// Slippy-map tiles for the dashboard map: Web Mercator math, URL templates and
// a fetch cache backed by background threads and a directory on disk.
use crate::abd_views::TileSource;
use log::{debug, warn};
use poll_promise::Promise;
use reqwest::blocking;
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: u8 = 1;
pub const MAX_ZOOM: u8 = 19;
const MAX_LATITUDE: f64 = 85.051_128_78;
const MAX_IN_FLIGHT: usize = 8;
const REQUEST_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Projection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

fn world_size(zoom: u8) -> f64 {
    TILE_SIZE * f64::from(1u32 << zoom)
}

/// Latitude/longitude to world pixel coordinates at `zoom`.
pub fn project(latitude: f64, longitude: f64, zoom: u8) -> (f64, f64) {
    let size = world_size(zoom);
    let lat = latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (longitude + 180.0) / 360.0 * size;
    let y = (1.0 - lat.tan().asinh() / PI) / 2.0 * size;
    (x, y)
}

/// Inverse of [`project`].
pub fn unproject(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let size = world_size(zoom);
    let longitude = x / size * 360.0 - 180.0;
    let latitude = (PI * (1.0 - 2.0 * y / size)).sinh().atan().to_degrees();
    (latitude, longitude)
}

/// A tile to paint, with its top-left corner relative to the viewport's
/// top-left corner, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedTile {
    pub key: TileKey,
    pub offset: (f64, f64),
}

/// Tiles covering a viewport of `width` x `height` centred on the world pixel
/// `center`. Columns wrap around the antimeridian; rows outside the world are
/// skipped.
pub fn visible_tiles(center: (f64, f64), zoom: u8, width: f64, height: f64) -> Vec<PlacedTile> {
    let n = 1i64 << zoom;
    let left = center.0 - width / 2.0;
    let top = center.1 - height / 2.0;

    let first_col = (left / TILE_SIZE).floor() as i64;
    let last_col = ((left + width) / TILE_SIZE).floor() as i64;
    let first_row = ((top / TILE_SIZE).floor() as i64).max(0);
    let last_row = (((top + height) / TILE_SIZE).floor() as i64).min(n - 1);

    let mut tiles = Vec::new();
    for row in first_row..=last_row {
        for col in first_col..=last_col {
            tiles.push(PlacedTile {
                key: TileKey { zoom, x: col.rem_euclid(n) as u32, y: row as u32 },
                offset: (col as f64 * TILE_SIZE - left, row as f64 * TILE_SIZE - top),
            });
        }
    }
    tiles
}

// ============================================================================
// URL templates
// ============================================================================

pub fn tile_url(source: &TileSource, key: TileKey) -> String {
    let subdomain = if source.subdomains.is_empty() {
        ""
    } else {
        let i = (key.x as usize + key.y as usize) % source.subdomains.len();
        source.subdomains[i].as_str()
    };

    source
        .url_template
        .replace("{s}", subdomain)
        .replace("{z}", &key.zoom.to_string())
        .replace("{x}", &key.x.to_string())
        .replace("{y}", &key.y.to_string())
        .replace("{r}", if source.retina { "@2x" } else { "" })
}

/// Directory-safe name for a tile template so different sources never share
/// cached files.
pub fn template_slug(template: &str) -> String {
    let slug: String = template
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

pub fn default_cache_dir() -> PathBuf {
    let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("amana_dashboard");
    path.push("tiles");
    path
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum TileError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Tile server returned {0}")]
    Status(reqwest::StatusCode),
    #[error("Tile cache error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Tile cache
// ============================================================================

type TileBytes = Arc<[u8]>;

enum TileSlot {
    Pending(Promise<Result<TileBytes, TileError>>),
    Ready(TileBytes),
    Failed,
}

/// What the painter should draw for a tile this frame.
#[derive(Debug, Clone)]
pub enum TileState {
    Ready { uri: String, bytes: TileBytes },
    Pending,
    Failed,
}

pub struct TileCache {
    source: TileSource,
    client: blocking::Client,
    disk_dir: Option<PathBuf>,
    slots: HashMap<TileKey, TileSlot>,
}

impl TileCache {
    pub fn new(source: TileSource, cache_root: Option<PathBuf>) -> Result<Self, TileError> {
        let client = blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("amana_dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let disk_dir = cache_root.map(|root| root.join(template_slug(&source.url_template)));
        if let Some(dir) = &disk_dir {
            debug!("Tile cache directory: {:?}", dir);
        }

        Ok(TileCache { source, client, disk_dir, slots: HashMap::new() })
    }

    fn in_flight(&self) -> usize {
        self.slots.values().filter(|slot| matches!(slot, TileSlot::Pending(_))).count()
    }

    /// Resolve finished downloads. Call once per frame.
    pub fn poll(&mut self) {
        for (key, slot) in self.slots.iter_mut() {
            let TileSlot::Pending(promise) = slot else { continue };
            let Some(result) = promise.ready() else { continue };

            let next = match result {
                Ok(bytes) => TileSlot::Ready(bytes.clone()),
                Err(e) => {
                    warn!("Tile {}/{}/{} unavailable: {}", key.zoom, key.x, key.y, e);
                    TileSlot::Failed
                }
            };
            *slot = next;
        }
    }

    /// Drop downloaded tiles that are no longer on screen and return their
    /// image URIs so the painter can release its decoded copies. Pending and
    /// failed slots are kept.
    pub fn evict_outside(&mut self, visible: &HashSet<TileKey>) -> Vec<String> {
        let stale: Vec<TileKey> = self
            .slots
            .iter()
            .filter(|(key, slot)| matches!(slot, TileSlot::Ready(_)) && !visible.contains(*key))
            .map(|(key, _)| *key)
            .collect();

        if !stale.is_empty() {
            debug!("Evicting {} off-screen tiles", stale.len());
        }

        stale
            .into_iter()
            .map(|key| {
                self.slots.remove(&key);
                tile_url(&self.source, key)
            })
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        self.in_flight() > 0
    }

    /// Current state of a tile, starting a download when it was never
    /// requested. Failed tiles are not retried.
    pub fn get(&mut self, key: TileKey) -> TileState {
        let url = tile_url(&self.source, key);

        match self.slots.get(&key) {
            Some(TileSlot::Ready(bytes)) => {
                return TileState::Ready { uri: url, bytes: bytes.clone() };
            }
            Some(TileSlot::Pending(_)) => return TileState::Pending,
            Some(TileSlot::Failed) => return TileState::Failed,
            None => {}
        }

        if self.in_flight() >= MAX_IN_FLIGHT {
            return TileState::Pending;
        }

        let client = self.client.clone();
        let disk_path = self
            .disk_dir
            .as_ref()
            .map(|dir| dir.join(key.zoom.to_string()).join(key.x.to_string()).join(format!("{}.png", key.y)));

        let promise = Promise::spawn_thread("tile", move || fetch_tile(&client, &url, disk_path));
        self.slots.insert(key, TileSlot::Pending(promise));
        TileState::Pending
    }
}

fn fetch_tile(
    client: &blocking::Client,
    url: &str,
    disk_path: Option<PathBuf>,
) -> Result<TileBytes, TileError> {
    if let Some(path) = &disk_path {
        if let Ok(bytes) = fs::read(path) {
            return Ok(bytes.into());
        }
    }

    let response = client.get(url).send()?;
    if !response.status().is_success() {
        return Err(TileError::Status(response.status()));
    }
    let bytes = response.bytes()?;

    if let Some(path) = &disk_path {
        if let Err(e) = store_tile(path, &bytes) {
            warn!("Could not cache tile at {:?}: {}", path, e);
        }
    }

    Ok(Arc::from(&bytes[..]))
}

fn store_tile(path: &Path, bytes: &[u8]) -> Result<(), TileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tile_for(latitude: f64, longitude: f64, zoom: u8) -> TileKey {
        let (x, y) = project(latitude, longitude, zoom);
        let max = (1u32 << zoom) - 1;
        TileKey {
            zoom,
            x: ((x / TILE_SIZE).floor() as u32).min(max),
            y: ((y / TILE_SIZE).floor() as u32).min(max),
        }
    }

    #[test]
    fn test_project_known_tiles() {
        assert_eq!(tile_for(3.1, 101.6, 13), TileKey { zoom: 13, x: 6407, y: 4025 });
        assert_eq!(tile_for(51.5074, -0.1278, 10), TileKey { zoom: 10, x: 511, y: 340 });
    }

    #[test]
    fn test_project_origin() {
        let (x, y) = project(0.0, 0.0, 0);
        assert_relative_eq!(x, 128.0);
        assert_relative_eq!(y, 128.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unproject_inverts_project() {
        let (x, y) = project(3.1578, 101.7123, 15);
        let (lat, lon) = unproject(x, y, 15);
        assert_relative_eq!(lat, 3.1578, epsilon = 1e-9);
        assert_relative_eq!(lon, 101.7123, epsilon = 1e-9);
    }

    #[test]
    fn test_polar_latitudes_are_clamped() {
        let key = tile_for(89.9, 180.0, 2);
        assert_eq!(key, TileKey { zoom: 2, x: 3, y: 0 });
    }

    #[test]
    fn test_visible_tiles_cover_viewport() {
        let center = project(3.1, 101.6, 13);
        let tiles = visible_tiles(center, 13, 600.0, 384.0);

        assert!(tiles.iter().any(|t| t.key == tile_for(3.1, 101.6, 13)));
        for tile in &tiles {
            assert!(tile.offset.0 > -TILE_SIZE && tile.offset.0 < 600.0);
            assert!(tile.offset.1 > -TILE_SIZE && tile.offset.1 < 384.0);
        }
    }

    #[test]
    fn test_visible_tiles_wrap_columns() {
        let tiles = visible_tiles((0.0, 256.0), 1, 256.0, 256.0);
        let xs: Vec<u32> = tiles.iter().map(|t| t.key.x).collect();
        assert!(xs.contains(&1));
        assert!(xs.contains(&0));
        assert!(tiles.iter().all(|t| t.key.y <= 1));
    }

    #[test]
    fn test_tile_url_expansion() {
        let source = TileSource::default();
        let url = tile_url(&source, TileKey { zoom: 13, x: 6407, y: 4025 });
        assert_eq!(url, "https://b.basemaps.cartocdn.com/light_all/13/6407/4025.png");

        let retina = TileSource {
            url_template: "https://tiles.example.com/{z}/{x}/{y}{r}.png".to_string(),
            retina: true,
            subdomains: Vec::new(),
            ..TileSource::default()
        };
        let url = tile_url(&retina, TileKey { zoom: 1, x: 0, y: 1 });
        assert_eq!(url, "https://tiles.example.com/1/0/1@2x.png");
    }

    #[test]
    fn test_template_slug() {
        assert_eq!(
            template_slug("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"),
            "s__tile_openstreetmap_org__z___x___y__png"
        );
    }

    #[test]
    fn test_off_screen_tiles_are_evicted() {
        let mut cache = TileCache::new(TileSource::default(), None).unwrap();
        let on_screen = TileKey { zoom: 13, x: 6407, y: 4025 };
        let off_screen = TileKey { zoom: 12, x: 3203, y: 2012 };
        let failed = TileKey { zoom: 12, x: 3204, y: 2012 };
        let bytes: TileBytes = Arc::from(&b"png"[..]);
        cache.slots.insert(on_screen, TileSlot::Ready(bytes.clone()));
        cache.slots.insert(off_screen, TileSlot::Ready(bytes));
        cache.slots.insert(failed, TileSlot::Failed);

        let visible: HashSet<TileKey> = [on_screen].into_iter().collect();
        let evicted = cache.evict_outside(&visible);

        assert_eq!(evicted, vec![tile_url(&TileSource::default(), off_screen)]);
        assert!(matches!(cache.get(on_screen), TileState::Ready { .. }));
        assert!(matches!(cache.get(failed), TileState::Failed));
        assert!(!cache.slots.contains_key(&off_screen));
        assert!(cache.evict_outside(&visible).is_empty());
    }

    #[test]
    fn test_disk_cached_tile_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("13").join("1").join("2.png");
        store_tile(&path, b"png-bytes").unwrap();

        let client = blocking::Client::new();
        let bytes = fetch_tile(&client, "http://127.0.0.1:9/unused.png", Some(path)).unwrap();
        assert_eq!(&*bytes, b"png-bytes");
    }
}
