//! Exact-distance refinement of raw candidates.

use std::collections::HashSet;

use crate::circle::record;
use crate::location::{haversine_distance, GeoPoint};
use crate::store::Document;

/// A candidate that survived refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedCandidate {
    /// Document ID.
    pub id: String,
    /// Great-circle distance from the search center, in meters.
    pub distance_meters: f64,
    /// The raw document.
    pub document: Document,
}

/// Deduplicates candidates by ID and keeps those within `radius_meters`.
///
/// Documents without an ID or a readable location are dropped, not
/// reported. The boundary is inclusive. Output is sorted by distance, then
/// by ID.
#[must_use]
pub fn refine(
    center: GeoPoint,
    radius_meters: f64,
    candidates: Vec<Document>,
) -> Vec<RefinedCandidate> {
    let total = candidates.len();
    let mut seen = HashSet::with_capacity(total);
    let mut refined: Vec<RefinedCandidate> = candidates
        .into_iter()
        .filter_map(|document| {
            let id = record::document_id(&document)?.to_string();
            if !seen.insert(id.clone()) {
                return None;
            }
            let Some(point) = record::document_point(&document) else {
                log::debug!("Dropping candidate {id} without a location");
                return None;
            };
            let distance_meters = haversine_distance(center, point);
            (distance_meters <= radius_meters).then_some(RefinedCandidate {
                id,
                distance_meters,
                document,
            })
        })
        .collect();

    refined.sort_by(|a, b| {
        a.distance_meters
            .total_cmp(&b.distance_meters)
            .then_with(|| a.id.cmp(&b.id))
    });

    log::debug!("Refined {total} candidate(s) to {}", refined.len());
    refined
}
