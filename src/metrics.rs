use crate::config::FigureConfig;
use crate::data::Dataset;
use crate::error::RenderError;
use crate::types::ElectionRecord;
use std::cmp::Ordering;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const OTHERS: &str = "Others";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Continuous,
    Categorical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    TotalVoterTurnout,
    MaleVoterTurnout,
    FemaleVoterTurnout,
    Category,
    Margin,
    GenderOfWinner,
    CategoryOfWinner,
    PartyOfWinner,
    ElectionPhase,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::TotalVoterTurnout,
        Metric::MaleVoterTurnout,
        Metric::FemaleVoterTurnout,
        Metric::Category,
        Metric::Margin,
        Metric::GenderOfWinner,
        Metric::CategoryOfWinner,
        Metric::PartyOfWinner,
        Metric::ElectionPhase,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Metric::TotalVoterTurnout => "total_voter_turnout",
            Metric::MaleVoterTurnout => "male_voter_turnout",
            Metric::FemaleVoterTurnout => "female_voter_turnout",
            Metric::Category => "category",
            Metric::Margin => "margin",
            Metric::GenderOfWinner => "gender_of_winner",
            Metric::CategoryOfWinner => "category_of_winner",
            Metric::PartyOfWinner => "party_of_winner",
            Metric::ElectionPhase => "election_phase",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Metric::TotalVoterTurnout => "Total Voter Turnout",
            Metric::MaleVoterTurnout => "Male Voter Turnout",
            Metric::FemaleVoterTurnout => "Female Voter Turnout",
            Metric::Category => "Seats by Reservation Category",
            Metric::Margin => "Winning Margins",
            Metric::GenderOfWinner => "Winners by Gender",
            Metric::CategoryOfWinner => "Winners by Category",
            Metric::PartyOfWinner => "Winners by Party",
            Metric::ElectionPhase => "Election Phases",
        }
    }

    pub fn legend_label(self) -> &'static str {
        match self {
            Metric::TotalVoterTurnout | Metric::MaleVoterTurnout | Metric::FemaleVoterTurnout => {
                "Voter Turnout (%)"
            }
            Metric::Category | Metric::CategoryOfWinner => "Category",
            Metric::Margin => "Winning Margin (%)",
            Metric::GenderOfWinner => "Gender",
            Metric::PartyOfWinner => "Party",
            Metric::ElectionPhase => "Election Phase",
        }
    }

    pub fn kind(self) -> MetricKind {
        match self {
            Metric::TotalVoterTurnout
            | Metric::MaleVoterTurnout
            | Metric::FemaleVoterTurnout
            | Metric::Margin => MetricKind::Continuous,
            Metric::Category
            | Metric::GenderOfWinner
            | Metric::CategoryOfWinner
            | Metric::PartyOfWinner
            | Metric::ElectionPhase => MetricKind::Categorical,
        }
    }

    /// Read from the boundary file rather than from a year's results.
    pub fn is_boundary_property(self) -> bool {
        self == Metric::ElectionPhase
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Metric {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.id() == s)
            .ok_or_else(|| RenderError::UnknownMetric { name: s.to_string() })
    }
}

impl Serialize for Metric {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Label(String),
}

fn percent(part: Option<f64>, whole: Option<f64>) -> Option<f64> {
    match (part, whole) {
        (Some(p), Some(w)) if w > 0.0 => Some(p * 100.0 / w),
        _ => None,
    }
}

/// The metric for one record, ignoring year-wide adjustments.
/// `None` when the record lacks the inputs or the metric is a boundary
/// property.
pub fn record_value(metric: Metric, record: &ElectionRecord) -> Option<MetricValue> {
    let turnout = record.turnout.as_ref();
    match metric {
        Metric::TotalVoterTurnout => turnout
            .and_then(|t| {
                t.polling_percentage
                    .or_else(|| percent(t.voters.total, t.electors.total))
            })
            .map(MetricValue::Number),
        Metric::MaleVoterTurnout => turnout
            .and_then(|t| percent(t.voters.men, t.electors.men))
            .map(MetricValue::Number),
        Metric::FemaleVoterTurnout => turnout
            .and_then(|t| percent(t.voters.women, t.electors.women))
            .map(MetricValue::Number),
        Metric::Margin => turnout
            .and_then(|t| percent(Some(record.margin as f64), t.voters.total))
            .map(MetricValue::Number),
        Metric::Category => record.category.clone().map(MetricValue::Label),
        Metric::GenderOfWinner => record
            .winner_details()
            .and_then(|c| c.gender.clone())
            .or_else(|| record.winner.gender.clone())
            .map(MetricValue::Label),
        Metric::CategoryOfWinner => record
            .winner_details()
            .and_then(|c| c.category.clone())
            .or_else(|| record.winner.category.clone())
            .map(MetricValue::Label),
        Metric::PartyOfWinner => record.winner.party.clone().map(MetricValue::Label),
        Metric::ElectionPhase => None,
    }
}

/// Orders category labels numerically when both are integers (phases
/// 1..10), lexically otherwise.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Metric values for one year, keyed by constituency id. Small parties
/// are folded into "Others" for the party metric so the legend stays
/// readable.
pub fn year_values(
    metric: Metric,
    dataset: &Dataset,
    year: u16,
    config: &FigureConfig,
) -> BTreeMap<String, MetricValue> {
    let records = dataset.records_in_year(year);

    if metric.is_boundary_property() {
        return records
            .filter_map(|r| {
                let boundary = dataset.geometry_for(&r.constituency_id).ok()?;
                let phase = boundary.phase.clone()?;
                Some((r.constituency_id.clone(), MetricValue::Label(phase)))
            })
            .collect();
    }

    let mut values: BTreeMap<String, MetricValue> = records
        .filter_map(|r| record_value(metric, r).map(|v| (r.constituency_id.clone(), v)))
        .collect();

    if metric == Metric::PartyOfWinner {
        let mut wins: BTreeMap<String, usize> = BTreeMap::new();
        for value in values.values() {
            if let MetricValue::Label(party) = value {
                *wins.entry(party.clone()).or_default() += 1;
            }
        }
        for value in values.values_mut() {
            if let MetricValue::Label(party) = value {
                let small = wins.get(party.as_str()).copied().unwrap_or(0) <= config.others_threshold;
                if small && !config.others_exempt.contains(party) {
                    *party = OTHERS.to_string();
                }
            }
        }
    }

    values
}
