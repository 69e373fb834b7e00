//! Scene Graph Module
//!
//! Per-frame actor/relation snapshots and their temporal sequences:
//! - `SceneGraph`: node features, typed edges for one frame
//! - `Sequence`: ordered frames of one scenario with its risk label
//! - `GraphBatch`: one combined graph-batch per sequence for the model
//! - `Relation`: the fixed relation vocabulary

pub mod batch;
pub mod relation;

pub use batch::GraphBatch;
pub use relation::Relation;

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single frame's actor/relation snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneGraph {
    /// One fixed-width feature row per detected actor
    pub node_features: Vec<Vec<f32>>,
    /// Directed edges (source, target) between node indices
    pub edge_index: Vec<(usize, usize)>,
    /// Relation id of each edge
    pub edge_attr: Vec<usize>,
}

impl SceneGraph {
    pub fn num_nodes(&self) -> usize {
        self.node_features.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_index.len()
    }

    /// Check the frame against the feature vocabulary width.
    pub fn validate(&self, num_features: usize) -> Result<()> {
        if let Some(row) = self
            .node_features
            .iter()
            .find(|row| row.len() != num_features)
        {
            return Err(Error::InvalidDataset(format!(
                "node feature width {} does not match vocabulary width {}",
                row.len(),
                num_features
            )));
        }
        if self.edge_attr.len() != self.edge_index.len() {
            return Err(Error::InvalidDataset(format!(
                "{} edges but {} edge attributes",
                self.edge_index.len(),
                self.edge_attr.len()
            )));
        }
        let n = self.num_nodes();
        if let Some((src, dst)) = self
            .edge_index
            .iter()
            .find(|(src, dst)| *src >= n || *dst >= n)
        {
            return Err(Error::InvalidDataset(format!(
                "edge ({}, {}) references a node outside 0..{}",
                src, dst, n
            )));
        }
        if let Some(rel) = self.edge_attr.iter().find(|r| **r >= Relation::COUNT) {
            return Err(Error::InvalidDataset(format!(
                "relation id {} outside the relation vocabulary",
                rel
            )));
        }
        Ok(())
    }
}

/// Consecutive frames of one scenario instance with its risk label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Ordered per-frame graphs
    #[serde(rename = "sequence")]
    pub frames: Vec<SceneGraph>,
    /// 0 = non-risky, 1 = risky
    pub label: u8,
    /// Source folder/sample name
    pub folder_name: String,
}

impl Sequence {
    pub fn new(frames: Vec<SceneGraph>, label: u8, folder_name: &str) -> Self {
        Self {
            frames,
            label,
            folder_name: folder_name.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check label range and every frame against the vocabulary width.
    pub fn validate(&self, num_features: usize) -> Result<()> {
        if self.label > 1 {
            return Err(Error::InvalidDataset(format!(
                "sequence '{}' has label {} (expected 0 or 1)",
                self.folder_name, self.label
            )));
        }
        if self.frames.is_empty() {
            return Err(Error::InvalidDataset(format!(
                "sequence '{}' has no frames",
                self.folder_name
            )));
        }
        for frame in &self.frames {
            frame.validate(num_features).map_err(|e| {
                Error::InvalidDataset(format!("sequence '{}': {}", self.folder_name, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> SceneGraph {
        SceneGraph {
            node_features: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            edge_index: vec![(0, 1), (1, 0)],
            edge_attr: vec![Relation::Near.id(), Relation::InDFrontOf.id()],
        }
    }

    #[test]
    fn test_valid_frame() {
        let g = frame();
        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.num_edges(), 2);
        assert!(g.validate(2).is_ok());
    }

    #[test]
    fn test_width_mismatch() {
        assert!(matches!(frame().validate(3), Err(Error::InvalidDataset(_))));
    }

    #[test]
    fn test_bad_edges() {
        let mut g = frame();
        g.edge_index.push((0, 5));
        g.edge_attr.push(0);
        assert!(g.validate(2).is_err());

        let mut g = frame();
        g.edge_attr[0] = Relation::COUNT;
        assert!(g.validate(2).is_err());

        let mut g = frame();
        g.edge_attr.pop();
        assert!(g.validate(2).is_err());
    }

    #[test]
    fn test_sequence_validation() {
        let seq = Sequence::new(vec![frame(), frame()], 1, "0001");
        assert_eq!(seq.len(), 2);
        assert!(seq.validate(2).is_ok());

        let bad_label = Sequence::new(vec![frame()], 2, "0002");
        assert!(bad_label.validate(2).is_err());

        let empty = Sequence::new(Vec::new(), 0, "0003");
        assert!(empty.validate(2).is_err());
    }

    #[test]
    fn test_sequence_field_names() {
        let seq = Sequence::new(vec![frame()], 0, "lane-change-7");
        let json = serde_json::to_value(&seq).unwrap();
        assert!(json.get("sequence").is_some());
        assert_eq!(json["label"], 0);
        assert_eq!(json["folder_name"], "lane-change-7");
        assert!(json["sequence"][0].get("node_features").is_some());
    }
}
