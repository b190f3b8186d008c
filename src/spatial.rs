use crate::data::Dataset;
use crate::types::Boundary;
use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};

// Wrapper for RTree indexing
struct AreaIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Point-in-constituency lookup over the dataset's boundaries.
pub struct BoundaryIndex {
    ids: Vec<String>,
    tree: RTree<AreaIndex>,
}

impl BoundaryIndex {
    pub fn build(dataset: &Dataset) -> Self {
        let boundaries: Vec<&Boundary> = dataset.boundaries().collect();
        let items: Vec<AreaIndex> = boundaries
            .iter()
            .enumerate()
            .filter_map(|(i, boundary)| {
                let rect = boundary.geometry.bounding_rect()?;
                Some(AreaIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self {
            ids: boundaries.iter().map(|b| b.id.clone()).collect(),
            tree: RTree::bulk_load(items),
        }
    }

    /// Boundary containing the point, if any. Overlaps resolve to the lowest id.
    pub fn locate<'a>(&self, dataset: &'a Dataset, lat: f64, lon: f64) -> Option<&'a Boundary> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.ids.get(candidate.index))
            .filter_map(|id| dataset.geometry_for(id).ok())
            .filter(|boundary| boundary.geometry.contains(&point))
            .min_by(|a, b| a.id.cmp(&b.id))
    }
}
