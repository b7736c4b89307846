// Command line and environment configuration
use crate::abd_models::CatalogSource;
use crate::abd_tiles::default_cache_dir;
use crate::abd_views::{MapConfig, TileSource};
use clap::Parser;
use std::path::PathBuf;

const DEFAULT_TILE_URL: &str = "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png";
const DEFAULT_ATTRIBUTION: &str = "© OpenStreetMap contributors";

/// Amana Transportation bus dashboard
#[derive(Debug, Clone, Parser)]
#[command(name = "amana_dashboard", version, about)]
pub struct DashboardConfig {
    /// JSON file with a `bus_lines` array; the bundled fixture is used when absent
    #[arg(long, env = "ABD_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Tile URL template with {s}, {z}, {x}, {y} and {r} placeholders
    #[arg(long, env = "ABD_TILE_URL", default_value = DEFAULT_TILE_URL)]
    pub tile_url: String,

    /// Attribution shown in the map corner
    #[arg(long, env = "ABD_TILE_ATTRIBUTION", default_value = DEFAULT_ATTRIBUTION)]
    pub attribution: String,

    /// Comma separated values substituted for {s}
    #[arg(long, env = "ABD_TILE_SUBDOMAINS", default_value = "a,b,c", value_delimiter = ',')]
    pub subdomains: Vec<String>,

    /// Initial map zoom level
    #[arg(long, env = "ABD_ZOOM", default_value_t = 13, value_parser = clap::value_parser!(u8).range(1..=19))]
    pub zoom: u8,

    /// Request high resolution tiles ({r} becomes "@2x")
    #[arg(long, env = "ABD_RETINA")]
    pub retina: bool,

    /// Do not download map tiles
    #[arg(long, env = "ABD_NO_TILES")]
    pub no_tiles: bool,

    /// Directory for cached tiles
    #[arg(long, env = "ABD_TILE_CACHE_DIR")]
    pub tile_cache_dir: Option<PathBuf>,
}

impl DashboardConfig {
    pub fn catalog_source(&self) -> CatalogSource {
        match &self.data_file {
            Some(path) => CatalogSource::File(path.clone()),
            None => CatalogSource::Bundled,
        }
    }

    pub fn map_config(&self) -> MapConfig {
        MapConfig {
            zoom: self.zoom,
            tiles: TileSource {
                url_template: self.tile_url.clone(),
                attribution: self.attribution.clone(),
                subdomains: self.subdomains.iter().filter(|s| !s.is_empty()).cloned().collect(),
                retina: self.retina,
            },
        }
    }

    /// `None` when tiles are disabled.
    pub fn tile_cache_root(&self) -> Option<PathBuf> {
        if self.no_tiles {
            return None;
        }
        Some(self.tile_cache_dir.clone().unwrap_or_else(default_cache_dir))
    }
}
