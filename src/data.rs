use crate::config::InputConfig;
use crate::error::*;
use crate::types::{Boundary, Candidate, Constituency, ElectionRecord, Tally, Turnout};
use geo::{BoundingRect, Coord, MultiPolygon, Rect};
use serde::Deserialize;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the figures are drawn from. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    constituencies: BTreeMap<String, Constituency>,
    boundaries: BTreeMap<String, Boundary>,
    // Keyed by (year, constituency) so a year is a contiguous range.
    records: BTreeMap<(u16, String), ElectionRecord>,
    years: BTreeSet<u16>,
    // Encoded once per drawn constituency, sliced per figure trace.
    features: BTreeMap<String, serde_json::Value>,
    geojson: Arc<serde_json::Value>,
    bounds: Option<Rect<f64>>,
}

struct ResultsTable {
    constituencies: BTreeMap<String, Constituency>,
    records: BTreeMap<(u16, String), ElectionRecord>,
}

impl Dataset {
    pub fn load(config: &InputConfig) -> Result<Self, DataIntegrityError> {
        info!(path = ?config.results, "Loading election results");
        let results = load_results(config)?;
        info!(
            constituencies = results.constituencies.len(),
            records = results.records.len(),
            "Loaded election results"
        );

        info!(path = ?config.boundaries, "Loading boundaries");
        let boundaries = load_boundaries(config)?;
        info!(boundaries = boundaries.len(), "Loaded boundaries");

        ensure!(
            !results.records.is_empty(),
            EmptyDatasetSnafu {
                path: config.results.clone()
            }
        );

        Self::assemble(results, boundaries, config.strict_coverage)
    }

    fn assemble(
        results: ResultsTable,
        boundaries: BTreeMap<String, Boundary>,
        strict_coverage: bool,
    ) -> Result<Self, DataIntegrityError> {
        let ResultsTable {
            mut constituencies,
            records,
        } = results;

        let years: BTreeSet<u16> = records.keys().map(|(year, _)| *year).collect();

        // 1. Every constituency with results must be drawable
        for (id, constituency) in constituencies.iter_mut() {
            let boundary = boundaries
                .get(id)
                .context(MissingGeometrySnafu { id: id.clone() })?;
            if constituency.state.is_none() {
                constituency.state = boundary.state.clone();
            }
        }

        // 2. Every drawable constituency should have results for every year
        for id in boundaries.keys() {
            for &year in &years {
                if records.contains_key(&(year, id.clone())) {
                    continue;
                }
                if strict_coverage {
                    return MissingResultsSnafu { id: id.clone(), year }.fail();
                }
                warn!(constituency = %id, year, "No results for constituency");
            }
        }

        let drawn: Vec<&Boundary> = boundaries
            .values()
            .filter(|b| constituencies.contains_key(&b.id))
            .collect();
        let features = boundary_features(&drawn)?;
        let geojson = Arc::new(feature_collection(features.values()));
        let bounds = extent(&drawn);

        debug!(years = ?years, "Dataset assembled");

        Ok(Self {
            constituencies,
            boundaries,
            records,
            years,
            features,
            geojson,
            bounds,
        })
    }

    pub fn records_for(&self, constituency: &str, year: u16) -> Result<&ElectionRecord, RenderError> {
        ensure!(
            self.constituencies.contains_key(constituency),
            UnknownConstituencySnafu { id: constituency }
        );
        ensure!(self.years.contains(&year), UnknownYearSnafu { year });
        self.records
            .get(&(year, constituency.to_string()))
            .context(NoRecordSnafu {
                id: constituency,
                year,
            })
    }

    pub fn geometry_for(&self, constituency: &str) -> Result<&Boundary, RenderError> {
        self.boundaries
            .get(constituency)
            .context(UnknownConstituencySnafu { id: constituency })
    }

    pub fn constituency(&self, id: &str) -> Option<&Constituency> {
        self.constituencies.get(id)
    }

    /// Constituencies with results, ordered by id.
    pub fn constituencies(&self) -> impl Iterator<Item = &Constituency> {
        self.constituencies.values()
    }

    pub fn boundaries(&self) -> impl Iterator<Item = &Boundary> {
        self.boundaries.values()
    }

    pub fn years(&self) -> &BTreeSet<u16> {
        &self.years
    }

    pub fn has_year(&self, year: u16) -> bool {
        self.years.contains(&year)
    }

    pub fn latest_year(&self) -> Option<u16> {
        self.years.last().copied()
    }

    /// Records of one year, ordered by constituency id.
    pub fn records_in_year(&self, year: u16) -> impl Iterator<Item = &ElectionRecord> {
        self.records
            .range((year, String::new())..)
            .take_while(move |((y, _), _)| *y == year)
            .map(|(_, record)| record)
    }

    /// FeatureCollection of every constituency with results, feature ids
    /// set to the constituency id.
    pub fn geojson(&self) -> &Arc<serde_json::Value> {
        &self.geojson
    }

    /// FeatureCollection holding only the named constituencies, in the
    /// order given. Ids without a drawn boundary are skipped.
    pub fn geojson_for<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Arc<serde_json::Value> {
        Arc::new(feature_collection(ids.into_iter().filter_map(|id| self.features.get(id))))
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
}

fn load_results(config: &InputConfig) -> Result<ResultsTable, DataIntegrityError> {
    let extension = file_extension(&config.results);
    match extension.as_deref() {
        Some("json") => load_json_results(&config.results, config.results_year),
        Some("csv") => load_csv_results(&config.results),
        _ => UnsupportedFormatSnafu {
            path: config.results.clone(),
        }
        .fail(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawConstituency {
    #[serde(rename = "ID")]
    id: RawId,
    #[serde(rename = "Constituency")]
    name: String,
    #[serde(rename = "State_UT", default)]
    state: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawYear {
    #[serde(rename = "Category", default)]
    category: Option<String>,
    #[serde(rename = "Result")]
    result: RawResult,
    #[serde(rename = "Candidates", default)]
    candidates: Vec<RawCandidate>,
    #[serde(rename = "Electors", default)]
    electors: Option<RawTally>,
    #[serde(rename = "Voters", default)]
    voters: Option<RawTally>,
}

#[derive(Deserialize)]
struct RawResult {
    #[serde(rename = "Winner")]
    winner: RawCandidate,
    #[serde(rename = "Runner-Up", default)]
    runner_up: Option<RawCandidate>,
    #[serde(rename = "Margin", default)]
    margin: Option<f64>,
}

#[derive(Deserialize)]
struct RawCandidate {
    #[serde(rename = "Candidate Name", alias = "Candidates", alias = "Candidate")]
    name: String,
    #[serde(rename = "Party", default)]
    party: Option<String>,
    #[serde(rename = "Votes", default)]
    votes: Option<f64>,
    #[serde(rename = "Gender", default)]
    gender: Option<String>,
    #[serde(rename = "Category", default)]
    category: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawTally {
    #[serde(rename = "General", default)]
    general: Option<RawSplit>,
    #[serde(rename = "Total", default)]
    total: Option<RawSplit>,
    #[serde(rename = "POLLING PERCENTAGE", default)]
    polling_percentage: Option<RawSplit>,
}

#[derive(Deserialize, Default)]
struct RawSplit {
    #[serde(rename = "Men", default)]
    men: Option<f64>,
    #[serde(rename = "Women", default)]
    women: Option<f64>,
    #[serde(rename = "Total", default)]
    total: Option<f64>,
}

impl RawCandidate {
    fn into_candidate(self) -> Candidate {
        Candidate {
            name: self.name.trim().to_string(),
            party: self.party,
            votes: self.votes.map(|v| v.round() as u64),
            gender: self.gender,
            category: self.category,
        }
    }
}

impl RawTally {
    fn into_tally(self) -> Tally {
        let general = self.general.unwrap_or_default();
        Tally {
            men: general.men,
            women: general.women,
            total: self.total.and_then(|t| t.total),
        }
    }
}

fn is_empty_tally(tally: &Tally) -> bool {
    tally.men.is_none() && tally.women.is_none() && tally.total.is_none()
}

impl RawYear {
    fn into_record(self, id: &str, year: u16) -> Result<ElectionRecord, DataIntegrityError> {
        let winner = self.result.winner.into_candidate();
        let runner_up = self.result.runner_up.map(RawCandidate::into_candidate);

        let margin = match (self.result.margin, winner.votes, runner_up.as_ref().and_then(|r| r.votes)) {
            (Some(m), _, _) => m,
            (None, Some(w), Some(r)) => w as f64 - r as f64,
            _ => {
                return InvalidRecordSnafu {
                    id,
                    year,
                    reason: "no winning margin",
                }
                .fail()
            }
        };
        ensure!(
            margin >= 0.0,
            InvalidRecordSnafu {
                id,
                year,
                reason: format!("negative margin {margin}"),
            }
        );

        let polling_percentage = self
            .voters
            .as_ref()
            .and_then(|v| v.polling_percentage.as_ref())
            .and_then(|p| p.total);
        let electors = self.electors.unwrap_or_default().into_tally();
        let voters = self.voters.unwrap_or_default().into_tally();
        let turnout = if is_empty_tally(&electors) && is_empty_tally(&voters) && polling_percentage.is_none() {
            None
        } else {
            Some(Turnout {
                electors,
                voters,
                polling_percentage,
            })
        };

        Ok(ElectionRecord {
            constituency_id: id.to_string(),
            year,
            category: self.category,
            winner,
            runner_up,
            margin: margin.round() as u64,
            candidates: self
                .candidates
                .into_iter()
                .map(RawCandidate::into_candidate)
                .collect(),
            turnout,
        })
    }
}

fn parse_year_key(id: &str, key: &str) -> Result<Option<u16>, DataIntegrityError> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }
    match key.parse::<u16>() {
        Ok(year) if key.len() == 4 => Ok(Some(year)),
        _ => InvalidYearSnafu { id, key }.fail(),
    }
}

fn load_json_results(path: &Path, results_year: Option<u16>) -> Result<ResultsTable, DataIntegrityError> {
    let file = File::open(path).context(OpenFileSnafu { path })?;
    let raw: Vec<RawConstituency> =
        serde_json::from_reader(BufReader::new(file)).context(ParseJsonSnafu { path })?;

    let mut table = ResultsTable {
        constituencies: BTreeMap::new(),
        records: BTreeMap::new(),
    };

    for doc in raw {
        let id = doc.id.into_string();
        let mut years = Vec::new();

        if doc.rest.contains_key("Result") {
            // Single-year file: the year block is the document itself
            let year = results_year.context(MissingResultsYearSnafu { id: id.clone() })?;
            years.push((year, serde_json::Value::Object(doc.rest)));
        } else {
            for (key, value) in doc.rest {
                if let Some(year) = parse_year_key(&id, &key)? {
                    years.push((year, value));
                }
            }
        }

        for (year, value) in years {
            let raw_year: RawYear =
                serde_json::from_value(value).map_err(|e| DataIntegrityError::InvalidRecord {
                    id: id.clone(),
                    year,
                    reason: e.to_string(),
                })?;
            let record = raw_year.into_record(&id, year)?;
            ensure!(
                !table.records.contains_key(&(year, id.clone())),
                DuplicateRecordSnafu { id: id.clone(), year }
            );
            table.records.insert((year, id.clone()), record);
        }

        table
            .constituencies
            .entry(id.clone())
            .or_insert_with(|| Constituency {
                id,
                name: doc.name.trim().to_string(),
                state: doc.state,
            });
    }

    Ok(table)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    pc_id: String,
    pc_name: String,
    #[serde(default)]
    state: Option<String>,
    year: u16,
    #[serde(default)]
    category: Option<String>,
    candidate: String,
    #[serde(default)]
    party: Option<String>,
    votes: u64,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    candidate_category: Option<String>,
    #[serde(default)]
    electors: Option<f64>,
    #[serde(default)]
    electors_men: Option<f64>,
    #[serde(default)]
    electors_women: Option<f64>,
    #[serde(default)]
    voters: Option<f64>,
    #[serde(default)]
    voters_men: Option<f64>,
    #[serde(default)]
    voters_women: Option<f64>,
}

impl CsvRow {
    // Seat-level columns repeated on every candidate row.
    fn turnout_columns(&self) -> [Option<f64>; 6] {
        [
            self.electors,
            self.electors_men,
            self.electors_women,
            self.voters,
            self.voters_men,
            self.voters_women,
        ]
    }
}

fn load_csv_results(path: &Path) -> Result<ResultsTable, DataIntegrityError> {
    let file = File::open(path).context(OpenFileSnafu { path })?;
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut constituencies = BTreeMap::new();
    let mut grouped: BTreeMap<(u16, String), Vec<CsvRow>> = BTreeMap::new();

    for result in rdr.deserialize::<CsvRow>() {
        let row = result.context(ParseCsvSnafu { path })?;
        constituencies
            .entry(row.pc_id.clone())
            .or_insert_with(|| Constituency {
                id: row.pc_id.clone(),
                name: row.pc_name.clone(),
                state: row.state.clone(),
            });
        grouped
            .entry((row.year, row.pc_id.clone()))
            .or_default()
            .push(row);
    }

    let mut records = BTreeMap::new();
    for ((year, id), rows) in grouped {
        let record = record_from_rows(&id, year, rows)?;
        records.insert((year, id), record);
    }

    Ok(ResultsTable {
        constituencies,
        records,
    })
}

fn record_from_rows(id: &str, year: u16, mut rows: Vec<CsvRow>) -> Result<ElectionRecord, DataIntegrityError> {
    rows.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.candidate.cmp(&b.candidate)));

    {
        let mut names = BTreeSet::new();
        for row in &rows {
            ensure!(
                names.insert(row.candidate.as_str()),
                InvalidRecordSnafu {
                    id,
                    year,
                    reason: format!("candidate '{}' listed twice", row.candidate),
                }
            );
        }
    }

    let first = &rows[0];
    for row in &rows[1..] {
        ensure!(
            row.category == first.category,
            InvalidRecordSnafu {
                id,
                year,
                reason: format!("candidate '{}' gives a different seat category", row.candidate),
            }
        );
        ensure!(
            row.turnout_columns() == first.turnout_columns(),
            InvalidRecordSnafu {
                id,
                year,
                reason: format!("candidate '{}' gives different turnout figures", row.candidate),
            }
        );
    }

    let electors = Tally {
        men: first.electors_men,
        women: first.electors_women,
        total: first.electors,
    };
    let voters = Tally {
        men: first.voters_men,
        women: first.voters_women,
        total: first.voters,
    };
    let turnout = if is_empty_tally(&electors) && is_empty_tally(&voters) {
        None
    } else {
        Some(Turnout {
            electors,
            voters,
            polling_percentage: None,
        })
    };
    let category = first.category.clone();

    let candidates: Vec<Candidate> = rows
        .into_iter()
        .map(|row| Candidate {
            name: row.candidate,
            party: row.party,
            votes: Some(row.votes),
            gender: row.gender,
            category: row.candidate_category,
        })
        .collect();

    let winner = candidates[0].clone();
    let runner_up = candidates.get(1).cloned();
    let margin = match &runner_up {
        Some(r) => winner.votes.unwrap_or(0) - r.votes.unwrap_or(0),
        None => winner.votes.unwrap_or(0),
    };

    Ok(ElectionRecord {
        constituency_id: id.to_string(),
        year,
        category,
        winner,
        runner_up,
        margin,
        candidates,
        turnout,
    })
}

fn load_boundaries(config: &InputConfig) -> Result<BTreeMap<String, Boundary>, DataIntegrityError> {
    let extension = file_extension(&config.boundaries);
    let boundaries = match extension.as_deref() {
        Some("shp") => load_shapefile(config)?,
        Some("json") | Some("geojson") => load_geojson(config)?,
        _ => {
            return UnsupportedFormatSnafu {
                path: config.boundaries.clone(),
            }
            .fail()
        }
    };

    let mut by_id = BTreeMap::new();
    for boundary in boundaries {
        ensure!(
            !by_id.contains_key(&boundary.id),
            DuplicateBoundarySnafu {
                id: boundary.id.clone()
            }
        );
        by_id.insert(boundary.id.clone(), boundary);
    }
    Ok(by_id)
}

fn json_property(props: Option<&geojson::JsonObject>, field: &str) -> Option<String> {
    match props.and_then(|p| p.get(field)) {
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn polygonal(id: &str, geometry: geo::Geometry<f64>) -> Result<MultiPolygon<f64>, DataIntegrityError> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        _ => InvalidGeometrySnafu {
            id,
            reason: "geometry is not a polygon",
        }
        .fail(),
    }
}

fn load_geojson(config: &InputConfig) -> Result<Vec<Boundary>, DataIntegrityError> {
    use geojson::GeoJson;

    let path = &config.boundaries;
    let file = File::open(path).context(OpenFileSnafu { path })?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader).context(ParseGeoJsonSnafu { path })?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return NotAFeatureCollectionSnafu { path }.fail(),
    };

    let mut boundaries = Vec::new();

    for feature in collection.features {
        let props = feature.properties.as_ref();
        let id = json_property(props, &config.boundary_id_field).context(MissingBoundaryIdSnafu {
            path,
            field: config.boundary_id_field.clone(),
        })?;

        let geometry = match feature.geometry {
            Some(geometry) => {
                let converted: geo::Geometry<f64> = geometry.value.try_into().map_err(
                    |e: geojson::Error| DataIntegrityError::InvalidGeometry {
                        id: id.clone(),
                        reason: e.to_string(),
                    },
                )?;
                polygonal(&id, converted)?
            }
            None => {
                debug!(constituency = %id, "Skipping boundary without geometry");
                continue;
            }
        };

        boundaries.push(Boundary {
            name: json_property(props, &config.boundary_name_field),
            state: json_property(props, &config.boundary_state_field),
            phase: json_property(props, &config.boundary_phase_field),
            id,
            geometry,
        });
    }

    Ok(boundaries)
}

fn dbase_text(record: &shapefile::dbase::Record, field: &str) -> Option<String> {
    use shapefile::dbase::FieldValue;

    match record.get(field)? {
        FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        FieldValue::Numeric(Some(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn load_shapefile(config: &InputConfig) -> Result<Vec<Boundary>, DataIntegrityError> {
    let path = &config.boundaries;
    let mut reader = shapefile::Reader::from_path(path).context(ReadShapefileSnafu { path })?;

    let mut boundaries = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context(ReadShapefileSnafu { path })?;

        let id = dbase_text(&record, &config.boundary_id_field).context(MissingBoundaryIdSnafu {
            path,
            field: config.boundary_id_field.clone(),
        })?;

        let converted: Result<MultiPolygon<f64>, String> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
            shapefile::Shape::PolygonM(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
            shapefile::Shape::NullShape => {
                debug!(constituency = %id, "Skipping boundary without geometry");
                continue;
            }
            other => Err(format!("unsupported shape type {:?}", other.shapetype())),
        };
        let geometry = converted.map_err(|reason| DataIntegrityError::InvalidGeometry {
            id: id.clone(),
            reason,
        })?;

        boundaries.push(Boundary {
            name: dbase_text(&record, &config.boundary_name_field),
            state: dbase_text(&record, &config.boundary_state_field),
            phase: dbase_text(&record, &config.boundary_phase_field),
            id,
            geometry,
        });
    }

    Ok(boundaries)
}

fn boundary_features(boundaries: &[&Boundary]) -> Result<BTreeMap<String, serde_json::Value>, DataIntegrityError> {
    use geojson::{feature::Id, Feature, Geometry, JsonObject};

    boundaries
        .iter()
        .map(|b| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), b.id.clone().into());
            if let Some(name) = &b.name {
                properties.insert("name".to_string(), name.clone().into());
            }
            let feature = Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&b.geometry))),
                id: Some(Id::String(b.id.clone())),
                properties: Some(properties),
                foreign_members: None,
            };
            let encoded = serde_json::to_value(&feature).context(EncodeGeoJsonSnafu)?;
            Ok((b.id.clone(), encoded))
        })
        .collect()
}

fn feature_collection<'a>(features: impl IntoIterator<Item = &'a serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "type": "FeatureCollection",
        "features": features.into_iter().cloned().collect::<Vec<_>>(),
    })
}

fn extent(boundaries: &[&Boundary]) -> Option<Rect<f64>> {
    boundaries
        .iter()
        .filter_map(|b| b.geometry.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}
