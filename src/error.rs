use snafu::Snafu;
use std::path::PathBuf;

/// Problems with the bundled dataset. Fatal at startup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DataIntegrityError {
    #[snafu(display("failed to open {}", path.display()))]
    OpenFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse JSON in {}", path.display()))]
    ParseJson {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse GeoJSON in {}", path.display()))]
    ParseGeoJson {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read CSV {}", path.display()))]
    ParseCsv { source: csv::Error, path: PathBuf },

    #[snafu(display("failed to read shapefile {}", path.display()))]
    ReadShapefile {
        source: shapefile::Error,
        path: PathBuf,
    },

    #[snafu(display("unsupported file format for {}", path.display()))]
    UnsupportedFormat { path: PathBuf },

    #[snafu(display("{} must contain a GeoJSON FeatureCollection", path.display()))]
    NotAFeatureCollection { path: PathBuf },

    #[snafu(display("feature in {} has no usable '{field}' property", path.display()))]
    MissingBoundaryId { path: PathBuf, field: String },

    #[snafu(display("constituency {id} has invalid geometry: {reason}"))]
    InvalidGeometry { id: String, reason: String },

    #[snafu(display("boundary for constituency {id} appears more than once"))]
    DuplicateBoundary { id: String },

    #[snafu(display("results for constituency {id} in {year} appear more than once"))]
    DuplicateRecord { id: String, year: u16 },

    #[snafu(display("constituency {id} has results but no boundary geometry"))]
    MissingGeometry { id: String },

    #[snafu(display("constituency {id} has no results for {year}"))]
    MissingResults { id: String, year: u16 },

    #[snafu(display("constituency {id} has an unreadable year key '{key}'"))]
    InvalidYear { id: String, key: String },

    #[snafu(display("results for constituency {id} in {year} are malformed: {reason}"))]
    InvalidRecord {
        id: String,
        year: u16,
        reason: String,
    },

    #[snafu(display(
        "constituency {id} has top-level results but input.results_year is not set"
    ))]
    MissingResultsYear { id: String },

    #[snafu(display("no election results found in {}", path.display()))]
    EmptyDataset { path: PathBuf },

    #[snafu(display("failed to encode boundaries as GeoJSON"))]
    EncodeGeoJson { source: serde_json::Error },
}

/// A selection that cannot be turned into a figure. Shown to the user.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum RenderError {
    #[snafu(display("a year must be selected for the {view} view"))]
    MissingYear { view: String },

    #[snafu(display("no results are available for {year}"))]
    UnknownYear { year: u16 },

    #[snafu(display("unknown constituency '{id}'"))]
    UnknownConstituency { id: String },

    #[snafu(display("no results for constituency '{id}' in {year}"))]
    NoRecord { id: String, year: u16 },

    #[snafu(display("missing '{name}' parameter"))]
    MissingParameter { name: String },

    #[snafu(display("'{value}' is not a year"))]
    InvalidYearValue { value: String },

    #[snafu(display("'{value}' is not a valid {name}"))]
    InvalidCoordinate { name: String, value: String },

    #[snafu(display("unknown metric '{name}'"))]
    UnknownMetric { name: String },

    #[snafu(display("unknown view '{name}'"))]
    UnknownView { name: String },

    #[snafu(display("the {view} view is not available for {metric}"))]
    UnsupportedView { metric: String, view: String },

    #[snafu(display("no data to plot for {metric}"))]
    NoData { metric: String },
}

impl RenderError {
    /// True when the selection named something that does not exist, as
    /// opposed to being malformed.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RenderError::UnknownYear { .. }
                | RenderError::UnknownConstituency { .. }
                | RenderError::NoRecord { .. }
                | RenderError::NoData { .. }
        )
    }
}
