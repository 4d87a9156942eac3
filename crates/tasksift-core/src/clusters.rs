use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tasksift_shared::ClusterSummary;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Clusters picked on the challenge browsing map, e.g. with the lasso.
#[derive(Debug, Clone, Default)]
pub struct ClusterSelection {
    selected: Vec<ClusterSummary>,
    bounds: Option<MapBounds>,
    from_user_action: bool,
}

impl ClusterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> &[ClusterSummary] {
        &self.selected
    }

    /// True when there is something to start a virtual challenge from.
    pub fn has_selection(&self) -> bool {
        !self.selected.is_empty()
    }

    pub fn bulk_select<I>(&mut self, clusters: I)
    where
        I: IntoIterator<Item = ClusterSummary>,
    {
        self.selected.extend(clusters);
    }

    pub fn bulk_deselect(&mut self, clusters: &[ClusterSummary]) {
        let drop: HashSet<u64> = clusters.iter().map(|c| c.cluster_id).collect();
        self.selected.retain(|c| !drop.contains(&c.cluster_id));
    }

    pub fn reset(&mut self) {
        self.selected.clear();
    }

    /// Moving the map invalidates whatever was lassoed.
    pub fn update_map_bounds(&mut self, bounds: MapBounds, from_user_action: bool) {
        if self.bounds != Some(bounds) {
            debug!(?bounds, from_user_action, "map bounds changed");
        }
        self.bounds = Some(bounds);
        self.from_user_action = from_user_action;
        self.reset();
    }

    /// Bounds to restore the map to; only those the user chose.
    pub fn initial_bounds(&self) -> Option<MapBounds> {
        self.bounds.filter(|_| self.from_user_action)
    }
}
