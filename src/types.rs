use geo::MultiPolygon;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constituency {
    pub id: String,
    pub name: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub party: Option<String>,
    pub votes: Option<u64>,
    pub gender: Option<String>,
    // Social category of the candidate (GEN/SC/ST/OBC)
    pub category: Option<String>,
}

/// Men and women are general electors/voters, total includes postal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tally {
    pub men: Option<f64>,
    pub women: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Turnout {
    pub electors: Tally,
    pub voters: Tally,
    pub polling_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectionRecord {
    pub constituency_id: String,
    pub year: u16,
    // Seat reservation (GEN/SC/ST)
    pub category: Option<String>,
    pub winner: Candidate,
    pub runner_up: Option<Candidate>,
    pub margin: u64,
    pub candidates: Vec<Candidate>,
    pub turnout: Option<Turnout>,
}

impl ElectionRecord {
    /// The winner's entry in the candidate list, which carries gender and
    /// category when the result block does not.
    pub fn winner_details(&self) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.name == self.winner.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub id: String,
    pub name: Option<String>,
    pub state: Option<String>,
    /// Polling phase the constituency voted in, as written in the file.
    pub phase: Option<String>,
    pub geometry: MultiPolygon<f64>,
}
