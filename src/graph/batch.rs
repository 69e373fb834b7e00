//! Combined graph-batch assembly.
//!
//! All frames of one sequence become a single disconnected graph whose nodes
//! carry the index of the frame they came from. Assembly never mutates the
//! source sequence.

use crate::core::{Error, Result};
use crate::graph::{SceneGraph, Sequence};
use crate::model::tensor::Matrix;

/// All frames of a sequence merged into one graph.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphBatch {
    /// Stacked node features, `num_nodes x num_features`
    pub x: Matrix,
    /// Edges with node indices offset into the stacked matrix
    pub edge_index: Vec<(usize, usize)>,
    /// Relation id per edge
    pub edge_attr: Vec<usize>,
    /// Frame index of every node
    pub batch: Vec<usize>,
    /// Number of frames
    pub num_graphs: usize,
}

impl GraphBatch {
    /// Merge the frames of a sequence.
    pub fn from_sequence(sequence: &Sequence, num_features: usize) -> Result<Self> {
        Self::from_graphs(&sequence.frames, num_features)
    }

    /// Merge a list of frames.
    pub fn from_graphs(graphs: &[SceneGraph], num_features: usize) -> Result<Self> {
        if graphs.is_empty() {
            return Err(Error::Model("cannot batch an empty sequence".to_string()));
        }

        let total_nodes: usize = graphs.iter().map(|g| g.num_nodes()).sum();
        let total_edges: usize = graphs.iter().map(|g| g.num_edges()).sum();

        let mut data = Vec::with_capacity(total_nodes * num_features);
        let mut edge_index = Vec::with_capacity(total_edges);
        let mut edge_attr = Vec::with_capacity(total_edges);
        let mut batch = Vec::with_capacity(total_nodes);
        let mut offset = 0;

        for (frame, graph) in graphs.iter().enumerate() {
            for row in &graph.node_features {
                if row.len() != num_features {
                    return Err(Error::Model(format!(
                        "frame {} has feature width {}, expected {}",
                        frame,
                        row.len(),
                        num_features
                    )));
                }
                data.extend_from_slice(row);
                batch.push(frame);
            }
            for (&(src, dst), &rel) in graph.edge_index.iter().zip(graph.edge_attr.iter()) {
                edge_index.push((src + offset, dst + offset));
                edge_attr.push(rel);
            }
            offset += graph.num_nodes();
        }

        Ok(Self {
            x: Matrix::from_vec(total_nodes, num_features, data),
            edge_index,
            edge_attr,
            batch,
            num_graphs: graphs.len(),
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.x.rows
    }

    pub fn num_features(&self) -> usize {
        self.x.cols
    }
}
