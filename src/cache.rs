use crate::config::FigureConfig;
use crate::data::Dataset;
use crate::metrics::Metric;
use crate::render::{build_figure, Selection, View};
use axum::body::Bytes;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Serialized figures for every selection that does not depend on a
/// constituency filter.
#[derive(Debug, Default)]
pub struct FigureCache {
    figures: HashMap<Selection, Bytes>,
}

/// Selections the cache can hold: whole-dataset maps and seat charts for
/// each year.
pub fn cacheable_selections(dataset: &Dataset) -> Vec<Selection> {
    let mut selections = Vec::new();
    for &year in dataset.years() {
        for metric in Metric::ALL {
            for view in [View::Map, View::Seats] {
                if view.supports(metric.kind()) {
                    selections.push(Selection::new(view, metric, Some(year), Vec::new()));
                }
            }
        }
    }
    selections
}

impl FigureCache {
    pub fn prerender(dataset: &Dataset, config: &FigureConfig) -> Self {
        let selections = cacheable_selections(dataset);
        info!(figures = selections.len(), "Pre-rendering figures");

        let figures: HashMap<Selection, Bytes> = selections
            .into_par_iter()
            .filter_map(|selection| {
                let figure = match build_figure(dataset, config, &selection) {
                    Ok(figure) => figure,
                    Err(e) => {
                        debug!(view = %selection.view, metric = %selection.metric, year = ?selection.year, error = %e, "Skipping figure");
                        return None;
                    }
                };
                match serde_json::to_vec(&figure) {
                    Ok(bytes) => Some((selection, Bytes::from(bytes))),
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize figure");
                        None
                    }
                }
            })
            .collect();

        info!(figures = figures.len(), "Pre-rendering complete");
        Self { figures }
    }

    pub fn get(&self, selection: &Selection) -> Option<Bytes> {
        self.figures.get(selection).cloned()
    }

    pub fn len(&self) -> usize {
        self.figures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }

    /// Writes every figure to `dir/{view}_{metric}_{year}.json`.
    pub fn write_to_dir(&self, dir: &Path) -> Result<usize> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;

        self.figures.par_iter().try_for_each(|(selection, bytes)| {
            let year = selection.year.map(|y| y.to_string()).unwrap_or_default();
            let path = dir.join(format!("{}_{}_{}.json", selection.view, selection.metric, year));
            fs::write(&path, bytes).with_context(|| format!("Failed to write figure {:?}", path))
        })?;

        Ok(self.len())
    }
}
