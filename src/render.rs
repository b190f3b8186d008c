use crate::config::FigureConfig;
use crate::data::Dataset;
use crate::error::*;
use crate::figure::*;
use crate::metrics::{compare_labels, record_value, year_values, Metric, MetricKind, MetricValue};
use serde::Serialize;
use snafu::{ensure, OptionExt};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// plotly's qualitative Light24
const PALETTE: [&str; 24] = [
    "#FD3216", "#00FE35", "#6A76FC", "#FED4C4", "#FE00CE", "#0DF9FF", "#F6F926", "#FF9616",
    "#479B55", "#EEA6FB", "#DC587D", "#D626FF", "#6E899C", "#00B5F7", "#B68E00", "#C9FBE5",
    "#FF0092", "#22FFA7", "#E3EE9E", "#86CE00", "#BC7196", "#7E7DCD", "#FC6955", "#E48F72",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum View {
    Map,
    Trend,
    Seats,
}

impl View {
    pub const ALL: [View; 3] = [View::Map, View::Trend, View::Seats];

    pub fn id(self) -> &'static str {
        match self {
            View::Map => "map",
            View::Trend => "trend",
            View::Seats => "seats",
        }
    }

    pub fn supports(self, kind: MetricKind) -> bool {
        match self {
            View::Map => true,
            View::Trend => kind == MetricKind::Continuous,
            View::Seats => kind == MetricKind::Categorical,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for View {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .iter()
            .copied()
            .find(|v| v.id() == s)
            .ok_or_else(|| RenderError::UnknownView { name: s.to_string() })
    }
}

impl Serialize for View {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

/// What the user asked to see.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    pub view: View,
    pub metric: Metric,
    pub year: Option<u16>,
    /// Sorted and de-duplicated. Empty means every constituency.
    pub constituencies: Vec<String>,
}

impl Selection {
    pub fn new(view: View, metric: Metric, year: Option<u16>, mut constituencies: Vec<String>) -> Self {
        constituencies.sort();
        constituencies.dedup();
        Self {
            view,
            metric,
            year,
            constituencies,
        }
    }

    fn includes(&self, id: &str) -> bool {
        self.constituencies.is_empty() || self.constituencies.binary_search_by(|c| c.as_str().cmp(id)).is_ok()
    }
}

pub fn build_figure(dataset: &Dataset, config: &FigureConfig, selection: &Selection) -> Result<Figure, RenderError> {
    ensure!(
        selection.view.supports(selection.metric.kind()),
        UnsupportedViewSnafu {
            metric: selection.metric.title(),
            view: selection.view.id(),
        }
    );
    for id in &selection.constituencies {
        ensure!(dataset.constituency(id).is_some(), UnknownConstituencySnafu { id });
    }

    let figure = match selection.view {
        View::Map => map_figure(dataset, config, selection)?,
        View::Trend => trend_figure(dataset, config, selection),
        View::Seats => seats_figure(dataset, config, selection)?,
    };

    ensure!(
        figure.has_points(),
        NoDataSnafu {
            metric: selection.metric.title(),
        }
    );
    Ok(figure)
}

fn selected_year(dataset: &Dataset, selection: &Selection) -> Result<u16, RenderError> {
    let year = selection.year.context(MissingYearSnafu {
        view: selection.view.id(),
    })?;
    ensure!(dataset.has_year(year), UnknownYearSnafu { year });
    Ok(year)
}

/// Values for the selected constituencies in one year. Party grouping is
/// decided on the whole year so a filtered map keeps the national legend.
fn selected_values(
    dataset: &Dataset,
    config: &FigureConfig,
    selection: &Selection,
    year: u16,
) -> BTreeMap<String, MetricValue> {
    let mut values = year_values(selection.metric, dataset, year, config);
    values.retain(|id, _| selection.includes(id));
    values
}

fn palette(labels: impl IntoIterator<Item = String>) -> BTreeMap<String, &'static str> {
    let mut sorted: Vec<String> = labels.into_iter().collect();
    sorted.sort_by(|a, b| compare_labels(a, b));
    sorted.dedup();
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, label)| (label, PALETTE[i % PALETTE.len()]))
        .collect()
}

fn display_name(dataset: &Dataset, id: &str) -> String {
    match dataset.constituency(id) {
        Some(c) => match &c.state {
            Some(state) => format!("{} ({})", c.name, state),
            None => c.name.clone(),
        },
        None => id.to_string(),
    }
}

fn hover_text(dataset: &Dataset, metric: Metric, id: &str, value: &MetricValue) -> String {
    let shown = match value {
        MetricValue::Number(n) => format!("{:.2}", n),
        MetricValue::Label(l) => l.clone(),
    };
    format!("{}<br>{}: {}", display_name(dataset, id), metric.legend_label(), shown)
}

fn figure_title(metric: Metric, year: u16) -> String {
    if metric.is_boundary_property() {
        metric.title().to_string()
    } else {
        format!("{} ({})", metric.title(), year)
    }
}

fn map_center(dataset: &Dataset, config: &FigureConfig) -> LatLon {
    if let Some(center) = config.center {
        return LatLon {
            lat: center.lat,
            lon: center.lon,
        };
    }
    match dataset.bounds() {
        Some(rect) => {
            let c = rect.center();
            LatLon { lat: c.y, lon: c.x }
        }
        None => LatLon { lat: 0.0, lon: 0.0 },
    }
}

fn map_figure(dataset: &Dataset, config: &FigureConfig, selection: &Selection) -> Result<Figure, RenderError> {
    let metric = selection.metric;
    let year = selected_year(dataset, selection)?;
    let values = selected_values(dataset, config, selection, year);

    let data = match metric.kind() {
        MetricKind::Continuous => {
            let mut locations = Vec::with_capacity(values.len());
            let mut z = Vec::with_capacity(values.len());
            let mut text = Vec::with_capacity(values.len());
            for (id, value) in &values {
                if let MetricValue::Number(n) = value {
                    text.push(hover_text(dataset, metric, id, value));
                    locations.push(id.clone());
                    z.push(*n);
                }
            }
            vec![Trace::Choropleth(Choropleth {
                name: None,
                geojson: dataset.geojson_for(locations.iter().map(String::as_str)),
                featureidkey: "id",
                locations,
                z,
                text,
                hoverinfo: "text",
                colorscale: Colorscale::Named(config.continuous_scale.clone()),
                showscale: true,
                colorbar: Some(ColorBar {
                    title: Title::new(metric.legend_label()),
                }),
                showlegend: None,
                legendgroup: None,
            })]
        }
        MetricKind::Categorical => {
            let mut groups: BTreeMap<String, Vec<(&String, &MetricValue)>> = BTreeMap::new();
            for (id, value) in &values {
                if let MetricValue::Label(label) = value {
                    groups.entry(label.clone()).or_default().push((id, value));
                }
            }
            let colors = palette(groups.keys().cloned());
            let mut groups: Vec<_> = groups.into_iter().collect();
            groups.sort_by(|a, b| compare_labels(&a.0, &b.0));

            groups
                .into_iter()
                .map(|(label, members)| {
                    let color = colors.get(&label).copied().unwrap_or(PALETTE[0]);
                    Trace::Choropleth(Choropleth {
                        name: Some(label.clone()),
                        geojson: dataset.geojson_for(members.iter().map(|(id, _)| id.as_str())),
                        featureidkey: "id",
                        locations: members.iter().map(|(id, _)| (*id).clone()).collect(),
                        z: vec![1.0; members.len()],
                        text: members
                            .iter()
                            .map(|(id, value)| hover_text(dataset, metric, id, value))
                            .collect(),
                        hoverinfo: "text",
                        colorscale: Colorscale::solid(color),
                        showscale: false,
                        colorbar: None,
                        showlegend: Some(true),
                        legendgroup: Some(label),
                    })
                })
                .collect()
        }
    };

    Ok(Figure {
        data,
        layout: Layout {
            title: Title::new(figure_title(metric, year)),
            height: config.height,
            geo: Some(Geo {
                visible: false,
                center: map_center(dataset, config),
                projection: Projection {
                    scale: config.projection_scale,
                },
            }),
            xaxis: None,
            yaxis: None,
            legend: match metric.kind() {
                MetricKind::Categorical => Some(Legend {
                    title: Title::new(metric.legend_label()),
                }),
                MetricKind::Continuous => None,
            },
        },
    })
}

fn number(value: Option<MetricValue>) -> Option<f64> {
    match value {
        Some(MetricValue::Number(n)) => Some(n),
        _ => None,
    }
}

fn trend_figure(dataset: &Dataset, config: &FigureConfig, selection: &Selection) -> Figure {
    let metric = selection.metric;
    let mut data = Vec::new();

    if selection.constituencies.is_empty() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for &year in dataset.years() {
            let values: Vec<f64> = dataset
                .records_in_year(year)
                .filter_map(|r| number(record_value(metric, r)))
                .collect();
            if !values.is_empty() {
                x.push(year);
                y.push(values.iter().sum::<f64>() / values.len() as f64);
            }
        }
        data.push(Trace::Scatter(Scatter {
            name: "All constituencies (mean)".to_string(),
            mode: "lines+markers",
            x,
            y,
        }));
    } else {
        for id in &selection.constituencies {
            let mut x = Vec::new();
            let mut y = Vec::new();
            for &year in dataset.years() {
                // Gaps are allowed when coverage is not strict
                let value = dataset
                    .records_for(id, year)
                    .ok()
                    .and_then(|r| number(record_value(metric, r)));
                if let Some(v) = value {
                    x.push(year);
                    y.push(v);
                }
            }
            if !x.is_empty() {
                data.push(Trace::Scatter(Scatter {
                    name: display_name(dataset, id),
                    mode: "lines+markers",
                    x,
                    y,
                }));
            }
        }
    }

    Figure {
        data,
        layout: Layout {
            title: Title::new(format!("{} over time", metric.title())),
            height: config.height,
            geo: None,
            xaxis: Some(Axis {
                title: Title::new("Year"),
                dtick: None,
            }),
            yaxis: Some(Axis {
                title: Title::new(metric.legend_label()),
                dtick: None,
            }),
            legend: None,
        },
    }
}

fn seats_figure(dataset: &Dataset, config: &FigureConfig, selection: &Selection) -> Result<Figure, RenderError> {
    let metric = selection.metric;
    let year = selected_year(dataset, selection)?;
    let values = selected_values(dataset, config, selection, year);

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for value in values.values() {
        if let MetricValue::Label(label) = value {
            *counts.entry(label.clone()).or_default() += 1;
        }
    }
    let colors = palette(counts.keys().cloned());

    let mut bars: Vec<(String, u64)> = counts.into_iter().collect();
    bars.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| compare_labels(&a.0, &b.0)));

    let marker = Marker {
        color: bars
            .iter()
            .map(|(label, _)| colors.get(label).copied().unwrap_or(PALETTE[0]).to_string())
            .collect(),
    };
    let (x, y): (Vec<String>, Vec<u64>) = bars.into_iter().unzip();

    Ok(Figure {
        data: vec![Trace::Bar(Bar {
            name: metric.legend_label().to_string(),
            x,
            y,
            marker: Some(marker),
        })],
        layout: Layout {
            title: Title::new(figure_title(metric, year)),
            height: config.height,
            geo: None,
            xaxis: Some(Axis {
                title: Title::new(metric.legend_label()),
                dtick: None,
            }),
            yaxis: Some(Axis {
                title: Title::new("Seats"),
                dtick: Some(1),
            }),
            legend: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeoCenter;
    use crate::testutil::Fixture;

    fn dataset() -> Dataset {
        Dataset::load(&Fixture::standard().input()).unwrap()
    }

    fn selection(view: View, metric: Metric, year: Option<u16>, ids: &[&str]) -> Selection {
        Selection::new(view, metric, year, ids.iter().map(|s| s.to_string()).collect())
    }

    fn choropleths(figure: &Figure) -> Vec<&Choropleth> {
        figure
            .data
            .iter()
            .filter_map(|t| match t {
                Trace::Choropleth(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn every_constituency_year_pair_renders() {
        let dataset = dataset();
        let config = FigureConfig::default();
        for constituency in dataset.constituencies() {
            for &year in dataset.years() {
                let sel = selection(View::Map, Metric::Category, Some(year), &[constituency.id.as_str()]);
                let figure = build_figure(&dataset, &config, &sel).unwrap();
                assert!(figure.has_points(), "{} {}", constituency.id, year);
            }
        }
    }

    #[test]
    fn continuous_map_is_a_single_scaled_trace() {
        let dataset = dataset();
        let figure = build_figure(
            &dataset,
            &FigureConfig::default(),
            &selection(View::Map, Metric::TotalVoterTurnout, Some(2024), &[]),
        )
        .unwrap();

        let traces = choropleths(&figure);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].locations, vec!["1", "2", "3"]);
        assert_eq!(traces[0].z, vec![65.0, 62.5, 80.0]);
        assert_eq!(traces[0].colorscale, Colorscale::Named("YlGnBu".into()));
        assert!(traces[0].showscale);
        assert_eq!(traces[0].text[0], "Alpha (North)<br>Voter Turnout (%): 65.00");
        assert_eq!(figure.layout.title.text, "Total Voter Turnout (2024)");
        assert_eq!(figure.layout.height, 700);
    }

    #[test]
    fn categorical_map_has_one_trace_per_label() {
        let dataset = dataset();
        let figure = build_figure(
            &dataset,
            &FigureConfig::default(),
            &selection(View::Map, Metric::Category, Some(2024), &[]),
        )
        .unwrap();

        let traces = choropleths(&figure);
        let names: Vec<_> = traces.iter().map(|t| t.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["GEN", "SC", "ST"]);
        assert_eq!(traces[0].colorscale, Colorscale::solid(PALETTE[0]));
        assert_eq!(traces[2].locations, vec!["3"]);
        assert!(traces.iter().all(|t| !t.showscale));
        assert_eq!(figure.layout.legend.as_ref().unwrap().title.text, "Category");
    }

    #[test]
    fn map_centers_on_boundaries_unless_configured() {
        let dataset = dataset();
        let sel = selection(View::Map, Metric::Margin, Some(2024), &[]);

        let figure = build_figure(&dataset, &FigureConfig::default(), &sel).unwrap();
        let geo = figure.layout.geo.unwrap();
        assert_eq!(geo.center, LatLon { lat: 0.5, lon: 1.5 });
        assert!(!geo.visible);
        assert_eq!(geo.projection.scale, 5.0);

        let config = FigureConfig {
            center: Some(GeoCenter { lat: 22.0, lon: 78.0 }),
            ..Default::default()
        };
        let figure = build_figure(&dataset, &config, &sel).unwrap();
        assert_eq!(figure.layout.geo.unwrap().center, LatLon { lat: 22.0, lon: 78.0 });
    }

    #[test]
    fn constituency_filter_limits_locations() {
        let dataset = dataset();
        let figure = build_figure(
            &dataset,
            &FigureConfig::default(),
            &selection(View::Map, Metric::Margin, Some(2024), &["3", "1", "3"]),
        )
        .unwrap();
        assert_eq!(choropleths(&figure)[0].locations, vec!["1", "3"]);
    }

    #[test]
    fn identical_selections_build_identical_figures() {
        let dataset = dataset();
        let config = FigureConfig::default();
        let a = build_figure(&dataset, &config, &selection(View::Map, Metric::PartyOfWinner, Some(2019), &["2", "1"])).unwrap();
        let b = build_figure(&dataset, &config, &selection(View::Map, Metric::PartyOfWinner, Some(2019), &["1", "2"])).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn trend_without_filter_is_the_mean() {
        let dataset = dataset();
        let figure = build_figure(
            &dataset,
            &FigureConfig::default(),
            &selection(View::Trend, Metric::TotalVoterTurnout, None, &[]),
        )
        .unwrap();
        match &figure.data[..] {
            [Trace::Scatter(s)] => {
                assert_eq!(s.x, vec![2019, 2024]);
                // 2019: (55 + 50) / 2, 2024: (65 + 62.5 + 80) / 3
                assert_eq!(s.y[0], 52.5);
                assert!((s.y[1] - 69.1666).abs() < 1e-3);
            }
            other => panic!("unexpected traces {:?}", other),
        }
    }

    #[test]
    fn trend_per_constituency_skips_missing_years() {
        let dataset = dataset();
        let figure = build_figure(
            &dataset,
            &FigureConfig::default(),
            &selection(View::Trend, Metric::TotalVoterTurnout, None, &["1", "3"]),
        )
        .unwrap();
        assert_eq!(figure.data.len(), 2);
        match &figure.data[1] {
            Trace::Scatter(s) => {
                assert_eq!(s.name, "Gamma (South)");
                assert_eq!(s.x, vec![2024]);
            }
            other => panic!("unexpected trace {:?}", other),
        }
    }

    #[test]
    fn seats_are_sorted_by_count() {
        let dataset = dataset();
        let config = FigureConfig {
            others_threshold: 1,
            ..Default::default()
        };
        let figure = build_figure(
            &dataset,
            &config,
            &selection(View::Seats, Metric::PartyOfWinner, Some(2024), &[]),
        )
        .unwrap();
        match &figure.data[..] {
            [Trace::Bar(bar)] => {
                assert_eq!(bar.x, vec!["ABC", "IND"]);
                assert_eq!(bar.y, vec![2, 1]);
            }
            other => panic!("unexpected traces {:?}", other),
        }
    }

    #[test]
    fn invalid_selections_are_render_errors() {
        let dataset = dataset();
        let config = FigureConfig::default();

        let err = build_figure(&dataset, &config, &selection(View::Map, Metric::Margin, Some(1999), &[])).unwrap_err();
        assert_eq!(err, RenderError::UnknownYear { year: 1999 });

        let err = build_figure(&dataset, &config, &selection(View::Map, Metric::Margin, None, &[])).unwrap_err();
        assert_eq!(err, RenderError::MissingYear { view: "map".into() });

        let err = build_figure(&dataset, &config, &selection(View::Map, Metric::Margin, Some(2024), &["42"])).unwrap_err();
        assert_eq!(err, RenderError::UnknownConstituency { id: "42".into() });

        let err = build_figure(&dataset, &config, &selection(View::Trend, Metric::Category, None, &[])).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedView { .. }));

        let err = build_figure(&dataset, &config, &selection(View::Seats, Metric::Margin, Some(2024), &[])).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedView { .. }));
    }

    #[test]
    fn selection_without_values_is_no_data() {
        let dataset = dataset();
        let err = build_figure(
            &dataset,
            &FigureConfig::default(),
            &selection(View::Map, Metric::TotalVoterTurnout, Some(2019), &["3"]),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::NoData { .. }));
    }

    fn feature_ids(trace: &Choropleth) -> Vec<String> {
        trace.geojson["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn traces_carry_only_their_own_features() {
        let dataset = dataset();
        let config = FigureConfig::default();

        let figure = build_figure(&dataset, &config, &selection(View::Map, Metric::Category, Some(2024), &[])).unwrap();
        for trace in choropleths(&figure) {
            assert_eq!(feature_ids(trace), trace.locations);
        }
        // Three one-feature traces embed the geometry once between them
        let full = serde_json::to_vec(dataset.geojson().as_ref()).unwrap().len();
        let embedded: usize = choropleths(&figure)
            .iter()
            .map(|t| serde_json::to_vec(t.geojson.as_ref()).unwrap().len())
            .sum();
        assert!(embedded < 2 * full, "traces embed {} bytes, boundaries {} bytes", embedded, full);

        let filtered = build_figure(&dataset, &config, &selection(View::Map, Metric::Margin, Some(2024), &["3", "1"])).unwrap();
        assert_eq!(feature_ids(choropleths(&filtered)[0]), vec!["1", "3"]);
    }

    #[test]
    fn election_phases_are_ordered_numerically() {
        let dataset = dataset();
        let config = FigureConfig::default();

        let figure = build_figure(&dataset, &config, &selection(View::Map, Metric::ElectionPhase, Some(2024), &[])).unwrap();
        let names: Vec<_> = choropleths(&figure).iter().map(|t| t.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["1", "2", "10"]);
        assert_eq!(choropleths(&figure)[2].locations, vec!["2"]);
        assert_eq!(choropleths(&figure)[1].colorscale, Colorscale::solid(PALETTE[1]));
        assert_eq!(figure.layout.title.text, "Election Phases");

        let seats = build_figure(&dataset, &config, &selection(View::Seats, Metric::ElectionPhase, Some(2019), &[])).unwrap();
        match &seats.data[..] {
            [Trace::Bar(bar)] => {
                assert_eq!(bar.x, vec!["1", "2", "10"]);
                assert_eq!(bar.y, vec![1, 1, 1]);
            }
            other => panic!("unexpected traces {:?}", other),
        }
    }
}
