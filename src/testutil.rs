//! Small on-disk dataset shared by the unit tests.
//!
//! Three square constituencies side by side along the equator:
//! "1" Alpha [0,1], "2" Beta [1,2], "3" Gamma [2,3], with results for
//! 2019 and 2024. Election phases are 1, 10 and 2.

use crate::config::{AppConfig, InputConfig};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Fixture {
    dir: TempDir,
    features: Vec<Value>,
    results: Vec<Value>,
}

fn square(x0: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[x0, 0.0], [x0 + 1.0, 0.0], [x0 + 1.0, 1.0], [x0, 1.0], [x0, 0.0]]]
    })
}

fn feature(id: &str, name: &str, state: &str, phase: u32, x0: f64) -> Value {
    json!({
        "type": "Feature",
        "properties": {"pc_id": id, "pc_name": name, "st_name": state, "2019_election_phase": phase},
        "geometry": square(x0)
    })
}

fn candidate(name: &str, party: &str, votes: u64, gender: &str, category: &str) -> Value {
    json!({
        "Candidate Name": name,
        "Party": party,
        "Votes": votes,
        "Gender": gender,
        "Category": category
    })
}

fn tally(men: f64, women: f64, total: f64) -> Value {
    json!({"General": {"Men": men, "Women": women}, "Total": {"Total": total}})
}

impl Fixture {
    pub fn standard() -> Self {
        let features = vec![
            feature("1", "Alpha", "North", 1, 0.0),
            feature("2", "Beta", "North", 10, 1.0),
            feature("3", "Gamma", "South", 2, 2.0),
        ];

        let alpha = json!({
            "ID": "1",
            "Constituency": "Alpha",
            "2019": {
                "Category": "GEN",
                "Result": {
                    "Winner": {"Candidate Name": "Ravi Kumar", "Party": "ABC", "Votes": 600},
                    "Runner-Up": {"Candidate Name": "Asha Rao", "Party": "XYZ", "Votes": 500},
                    "Margin": 100
                },
                "Candidates": [
                    candidate("Ravi Kumar", "ABC", 600, "M", "GEN"),
                    candidate("Asha Rao", "XYZ", 500, "F", "GEN")
                ],
                "Electors": tally(1000.0, 1000.0, 2000.0),
                "Voters": {
                    "General": {"Men": 600, "Women": 500},
                    "Total": {"Total": 1100},
                    "POLLING PERCENTAGE": {"Total": 55.0}
                }
            },
            "2024": {
                "Category": "GEN",
                "Result": {
                    "Winner": {"Candidates": "Asha Rao", "Party": "ABC", "Votes": 750},
                    "Runner-Up": {"Candidate Name": "Ravi Kumar", "Party": "XYZ", "Votes": 550},
                    "Margin": 200
                },
                "Candidates": [
                    candidate("Asha Rao", "ABC", 750, "F", "GEN"),
                    candidate("Ravi Kumar", "XYZ", 550, "M", "GEN")
                ],
                "Electors": tally(1000.0, 1000.0, 2000.0),
                "Voters": {
                    "General": {"Men": 700, "Women": 600},
                    "Total": {"Total": 1300},
                    "POLLING PERCENTAGE": {"Total": 65.0}
                }
            }
        });

        let beta = json!({
            "ID": 2,
            "Constituency": "Beta",
            "State_UT": "North",
            "2019": {
                "Category": "SC",
                "Result": {
                    "Winner": {"Candidate Name": "Meena Devi", "Party": "XYZ", "Votes": 400},
                    "Runner-Up": {"Candidate Name": "Karan Singh", "Party": "ABC", "Votes": 300},
                    "Margin": 100
                },
                "Candidates": [
                    candidate("Meena Devi", "XYZ", 400, "F", "SC"),
                    candidate("Karan Singh", "ABC", 300, "M", "SC")
                ],
                "Electors": tally(800.0, 800.0, 1600.0),
                "Voters": tally(400.0, 400.0, 800.0)
            },
            "2024": {
                "Category": "SC",
                "Result": {
                    "Winner": {"Candidate Name": "Karan Singh", "Party": "ABC", "Votes": 500},
                    "Runner-Up": {"Candidate Name": "Meena Devi", "Party": "XYZ", "Votes": 450},
                    "Margin": 50
                },
                "Candidates": [
                    candidate("Karan Singh", "ABC", 500, "M", "SC"),
                    candidate("Meena Devi", "XYZ", 450, "F", "SC")
                ],
                "Electors": tally(800.0, 800.0, 1600.0),
                "Voters": tally(480.0, 520.0, 1000.0)
            }
        });

        let gamma = json!({
            "ID": "3",
            "Constituency": "Gamma",
            "State_UT": "South",
            "_id": "ignored",
            "2019": {
                "Category": "ST",
                "Result": {
                    "Winner": {"Candidate Name": "Tara Bai", "Party": "IND"},
                    "Margin": 30
                },
                "Candidates": [candidate("Tara Bai", "IND", 90, "F", "ST")],
                "Voters": {}
            },
            "2024": {
                "Category": "ST",
                "Result": {
                    "Winner": {"Candidate Name": "Tara Bai", "Party": "IND", "Votes": 900},
                    "Runner-Up": {"Candidate Name": "Manoj Oraon", "Party": "XYZ", "Votes": 700},
                    "Margin": 200
                },
                "Candidates": [
                    candidate("Tara Bai", "IND", 900, "F", "ST"),
                    candidate("Manoj Oraon", "XYZ", 700, "M", "ST")
                ],
                "Electors": tally(1000.0, 1000.0, 2000.0),
                "Voters": {
                    "General": {"Men": 800, "Women": 800},
                    "Total": {"Total": 1600},
                    "POLLING PERCENTAGE": {"Total": 80.0}
                }
            }
        });

        let fixture = Self {
            dir: tempfile::tempdir().expect("tempdir"),
            features,
            results: vec![alpha, beta, gamma],
        };
        fixture.write();
        fixture
    }

    fn write(&self) {
        let boundaries = json!({"type": "FeatureCollection", "features": self.features});
        std::fs::write(self.path("boundaries.geojson"), boundaries.to_string()).expect("write boundaries");
        std::fs::write(self.path("results.json"), Value::from(self.results.clone()).to_string())
            .expect("write results");
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn input(&self) -> InputConfig {
        InputConfig {
            boundaries: self.path("boundaries.geojson"),
            results: self.path("results.json"),
            ..Default::default()
        }
    }

    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            input: self.input(),
            ..Default::default()
        }
    }

    fn id_of(feature: &Value) -> &str {
        feature["properties"]["pc_id"].as_str().unwrap_or_default()
    }

    pub fn without_boundary(mut self, id: &str) -> Self {
        self.features.retain(|f| Self::id_of(f) != id);
        self.write();
        self
    }

    pub fn with_duplicate_boundary(mut self, id: &str) -> Self {
        let copy = self
            .features
            .iter()
            .find(|f| Self::id_of(f) == id)
            .cloned()
            .expect("known boundary");
        self.features.push(copy);
        self.write();
        self
    }

    pub fn with_point_boundary(mut self, id: &str) -> Self {
        for f in self.features.iter_mut() {
            if Self::id_of(f) == id {
                f["geometry"] = json!({"type": "Point", "coordinates": [0.5, 0.5]});
            }
        }
        self.write();
        self
    }

    pub fn without_year(mut self, id: &str, year: u16) -> Self {
        for doc in self.results.iter_mut() {
            let matches = match &doc["ID"] {
                Value::String(s) => s == id,
                Value::Number(n) => n.to_string() == id,
                _ => false,
            };
            if matches {
                if let Some(obj) = doc.as_object_mut() {
                    obj.remove(&year.to_string());
                }
            }
        }
        self.write();
        self
    }
}
