use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub figures: FigureConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    /// Boundary polygons, GeoJSON or Shapefile.
    pub boundaries: PathBuf,
    /// Election results, JSON or CSV.
    pub results: PathBuf,
    pub boundary_id_field: String,
    pub boundary_name_field: String,
    pub boundary_state_field: String,
    pub boundary_phase_field: String,
    /// Year for single-year JSON files that keep results at the top level.
    pub results_year: Option<u16>,
    pub strict_coverage: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            boundaries: PathBuf::from("data/india_parliamentary_constituencies_2024.geojson"),
            results: PathBuf::from("data/2009-2024.json"),
            boundary_id_field: "pc_id".to_string(),
            boundary_name_field: "pc_name".to_string(),
            boundary_state_field: "st_name".to_string(),
            boundary_phase_field: "2019_election_phase".to_string(),
            results_year: None,
            strict_coverage: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoCenter {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FigureConfig {
    pub height: u32,
    /// Map centre. Derived from the boundary extent when unset.
    pub center: Option<GeoCenter>,
    pub projection_scale: f64,
    pub continuous_scale: String,
    /// Parties with this many wins or fewer in a year are grouped as "Others".
    pub others_threshold: usize,
    pub others_exempt: Vec<String>,
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            height: 700,
            center: None,
            projection_scale: 5.0,
            continuous_scale: "YlGnBu".to_string(),
            others_threshold: 5,
            others_exempt: vec!["IND".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub prerender: bool,
    pub assets_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
            prerender: true,
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
