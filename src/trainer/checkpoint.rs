//! Model checkpoints and their configuration sidecar.

use crate::config::Architecture;
use crate::core::{Error, Result};
use crate::model::SceneGraphModel;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// File written next to every checkpoint.
pub const SIDECAR_NAME: &str = "model_parameters.txt";

/// Learned parameters of one model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub architecture: Architecture,
    pub parameter_count: usize,
    pub values: Vec<f32>,
}

impl Checkpoint {
    /// Snapshot a model's parameter values.
    pub fn from_model(model: &SceneGraphModel) -> Self {
        Self {
            architecture: model.architecture(),
            parameter_count: model.parameter_count(),
            values: model.params().values().to_vec(),
        }
    }

    /// Write as bincode, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Checkpoint = bincode::deserialize_from(reader)?;
        if checkpoint.values.len() != checkpoint.parameter_count {
            return Err(Error::Model(format!(
                "corrupt checkpoint {}: header says {} parameters, found {}",
                path.display(),
                checkpoint.parameter_count,
                checkpoint.values.len()
            )));
        }
        Ok(checkpoint)
    }

    /// Copy the stored values into a model of the same shape.
    pub fn apply_to(&self, model: &mut SceneGraphModel) -> Result<()> {
        if model.architecture() != self.architecture {
            return Err(Error::Model(format!(
                "checkpoint holds a {} model, not {}",
                self.architecture,
                model.architecture()
            )));
        }
        if model.parameter_count() != self.parameter_count {
            return Err(Error::Model(format!(
                "checkpoint has {} parameters, model expects {}",
                self.parameter_count,
                model.parameter_count()
            )));
        }
        model.load_parameters(self.values.clone())
    }
}

/// Sidecar path in the checkpoint's directory.
pub fn sidecar_path(checkpoint_path: &Path) -> PathBuf {
    match checkpoint_path.parent() {
        Some(dir) => dir.join(SIDECAR_NAME),
        None => PathBuf::from(SIDECAR_NAME),
    }
}

/// Record the configuration and invocation next to a checkpoint.
pub fn write_sidecar(checkpoint_path: &Path, config: &str, invocation: &str) -> Result<PathBuf> {
    let path = sidecar_path(checkpoint_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, format!("{}\n{}", config, invocation))?;
    Ok(path)
}
