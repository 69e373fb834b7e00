//! Training/Evaluation Orchestrator
//!
//! Drives a run end to end:
//! - Model, optimizer and class-weighted loss construction
//! - Batched training epochs with one optimizer step per batch
//! - Periodic evaluation over both splits
//! - Best-result bookkeeping (results table, checkpoint, sidecar)
//! - Per-sequence inference with attention diagnostics

pub mod checkpoint;
pub mod results;

pub use checkpoint::{sidecar_path, write_sidecar, Checkpoint, SIDECAR_NAME};
pub use results::{
    BestResultRecord, CsvResultStore, MemoryResultStore, ResultStore, UpsertOutcome,
};

use crate::config::{Device, RunConfig};
use crate::core::{Error, Result, Split, NUM_CLASSES};
use crate::dataset::{build_scenegraph_dataset, SceneGraphDataset};
use crate::graph::{GraphBatch, Sequence};
use crate::metrics::{score, MetricsRecord};
use crate::model::{
    compute_class_weights, Adam, AdamConfig, Mode, ModelConfig, SceneGraphModel,
    WeightedCrossEntropy,
};
use crate::monitoring::SummaryWriter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Lifecycle of a trainer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainerState {
    Uninitialized,
    ModelBuilt,
    Training { epoch: usize },
    Evaluated { epoch: usize },
    Completed,
}

/// Node-pooling diagnostics, one entry per sequence that reported them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttentions {
    /// Frame index of every node before pooling
    pub original_batch: Vec<Vec<usize>>,
    pub pool_perm: Vec<Vec<usize>>,
    pub pool_batch: Vec<Vec<usize>>,
    pub pool_score: Vec<Vec<f32>>,
}

/// Per-sequence products of one inference pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceOutput {
    pub outputs: Vec<[f32; NUM_CLASSES]>,
    pub labels: Vec<u8>,
    pub folder_names: Vec<String>,
    /// Mean per-sequence loss
    pub loss: f32,
    /// Temporal attention weights of sequences that reported them
    pub attention_weights: Vec<Vec<f32>>,
    pub node_attentions: NodeAttentions,
}

/// Result of one evaluation.
#[derive(Clone, Debug)]
pub struct EvaluationReport {
    pub epoch: usize,
    pub train: MetricsRecord,
    pub test: MetricsRecord,
    pub train_output: InferenceOutput,
    pub test_output: InferenceOutput,
    /// Whether this evaluation set a new best test loss
    pub improved: bool,
}

/// Orchestrates training, evaluation and persistence of one run.
pub struct DynKGTrainer {
    config: RunConfig,
    /// Command line recorded with every best result
    invocation: String,
    dataset: SceneGraphDataset,
    model: Option<SceneGraphModel>,
    optimizer: Option<Adam>,
    loss_fn: WeightedCrossEntropy,
    store: Box<dyn ResultStore>,
    summary: SummaryWriter,
    state: TrainerState,
    best_val_loss: f32,
    best_epoch: usize,
}

impl DynKGTrainer {
    /// Load the dataset named by `config` and prepare a trainer backed by
    /// the CSV results table at `config.stats_path`.
    pub fn new(config: RunConfig, invocation: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let dataset = build_scenegraph_dataset(
            &config.cache_path,
            config.split_ratio,
            config.downsample,
            config.seed,
            config.transfer_path.as_deref(),
        )?;
        Self::from_dataset(config, invocation, dataset)
    }

    /// Prepare a trainer over an already built dataset.
    pub fn from_dataset(
        config: RunConfig,
        invocation: impl Into<String>,
        dataset: SceneGraphDataset,
    ) -> Result<Self> {
        config.validate()?;
        if config.device == Device::Cuda {
            warn!("No accelerator backend is available, running on cpu");
        }
        let summary = match &config.summary_path {
            Some(path) => SummaryWriter::with_file(path)?,
            None => SummaryWriter::new(),
        };
        let store = Box::new(CsvResultStore::new(config.stats_path.clone()));

        let mut trainer = Self {
            config,
            invocation: invocation.into(),
            dataset,
            model: None,
            optimizer: None,
            loss_fn: WeightedCrossEntropy::unweighted(),
            store,
            summary,
            state: TrainerState::Uninitialized,
            best_val_loss: f32::INFINITY,
            best_epoch: 0,
        };
        trainer.seed_best_loss()?;
        Ok(trainer)
    }

    /// Swap the results store.
    pub fn with_store(mut self, store: Box<dyn ResultStore>) -> Result<Self> {
        self.store = store;
        self.seed_best_loss()?;
        Ok(self)
    }

    /// Start from the stored best loss of this configuration, if any.
    fn seed_best_loss(&mut self) -> Result<()> {
        let key = self.config.key()?;
        self.best_val_loss = match self.store.find(&key)? {
            Some(row) => {
                info!(
                    val_loss = row.val_loss,
                    epoch = row.epoch,
                    "Found stored best result for this configuration"
                );
                self.best_epoch = row.epoch;
                row.val_loss
            }
            None => {
                self.best_epoch = 0;
                f32::INFINITY
            }
        };
        Ok(())
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn dataset(&self) -> &SceneGraphDataset {
        &self.dataset
    }

    pub fn model(&self) -> Option<&SceneGraphModel> {
        self.model.as_ref()
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn summary(&self) -> &SummaryWriter {
        &self.summary
    }

    pub fn best_val_loss(&self) -> f32 {
        self.best_val_loss
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// Optimizer steps taken so far.
    pub fn optimizer_steps(&self) -> u32 {
        self.optimizer.as_ref().map_or(0, Adam::steps)
    }

    pub fn loss_fn(&self) -> &WeightedCrossEntropy {
        &self.loss_fn
    }

    /// Build the model, optimizer and loss.
    pub fn build_model(&mut self) -> Result<()> {
        let model_config = ModelConfig::from_run_config(&self.config, self.dataset.num_features());
        model_config.validate()?;
        let model = SceneGraphModel::build(model_config)?;

        let optimizer = Adam::new(
            AdamConfig::default()
                .with_learning_rate(self.config.learning_rate)
                .with_weight_decay(self.config.weight_decay),
            model.parameter_count(),
        );

        let class_weights = compute_class_weights(&self.dataset.train_labels());
        self.loss_fn = WeightedCrossEntropy::from_class_weights(&class_weights);

        info!(
            model = %self.config.model,
            parameters = model.parameter_count(),
            features = self.dataset.num_features(),
            class_weights = ?class_weights,
            "Built model"
        );
        self.model = Some(model);
        self.optimizer = Some(optimizer);
        self.state = TrainerState::ModelBuilt;
        Ok(())
    }

    fn require_model(&self) -> Result<&SceneGraphModel> {
        self.model
            .as_ref()
            .ok_or_else(|| Error::InvalidState("model has not been built".to_string()))
    }

    /// Run every configured epoch, evaluating every `test_step` epochs.
    pub fn train(&mut self) -> Result<()> {
        self.require_model()?;
        info!(
            epochs = self.config.epochs,
            train = self.dataset.train.len(),
            test = self.dataset.test.len(),
            "Starting training"
        );

        for epoch in 0..self.config.epochs {
            self.state = TrainerState::Training { epoch };
            let loss = self.train_epoch()?;
            info!(epoch, loss, "Finished epoch");
            self.summary.add_scalar("Loss/train_epoch", loss, epoch)?;

            if epoch % self.config.test_step == 0 {
                self.evaluate(Some(epoch))?;
            }
        }

        self.state = TrainerState::Completed;
        info!(
            best_epoch = self.best_epoch,
            best_val_loss = self.best_val_loss,
            "Training completed"
        );
        Ok(())
    }

    /// One pass over the training split. Returns the epoch loss.
    pub fn train_epoch(&mut self) -> Result<f32> {
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| Error::InvalidState("model has not been built".to_string()))?;
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| Error::InvalidState("optimizer has not been built".to_string()))?;
        model.set_mode(Mode::Train);

        let num_features = self.dataset.num_features();
        let train = &self.dataset.train;
        let mut acc_loss = 0.0;
        for chunk in train.chunks(self.config.batch_size) {
            model.zero_grad();
            let mut outputs = Vec::with_capacity(chunk.len());
            let mut labels = Vec::with_capacity(chunk.len());
            let mut traces = Vec::with_capacity(chunk.len());
            for sequence in chunk {
                let batch = GraphBatch::from_sequence(sequence, num_features)?;
                let (output, trace) = model.forward_train(&batch)?;
                outputs.push(output.logits);
                labels.push(sequence.label);
                traces.push(trace);
            }

            let (loss, grads) = self.loss_fn.loss_and_grad(&outputs, &labels);
            for (trace, dlogits) in traces.iter().zip(grads) {
                model.backward(trace, dlogits)?;
            }
            optimizer.step(model.params_mut());
            debug!(batch = chunk.len(), loss, "Optimizer step");
            acc_loss += loss * chunk.len() as f32;
        }

        model.set_mode(Mode::Eval);
        if train.is_empty() {
            return Ok(0.0);
        }
        Ok(acc_loss / train.len() as f32)
    }

    /// Forward every sequence on its own, collecting outputs and diagnostics.
    pub fn inference(&self, sequences: &[Sequence]) -> Result<InferenceOutput> {
        let model = self.require_model()?;
        let num_features = self.dataset.num_features();
        let mut out = InferenceOutput::default();
        let mut total_loss = 0.0;

        for sequence in sequences {
            let batch = GraphBatch::from_sequence(sequence, num_features)?;
            let output = model.forward(&batch)?;
            total_loss += self.loss_fn.loss(&[output.logits], &[sequence.label]);

            let diagnostics = output.diagnostics;
            if let Some(weights) = diagnostics.lstm_attn_weights {
                out.attention_weights.push(weights);
            }
            if let (Some(perm), Some(pool_batch), Some(pool_score)) =
                (diagnostics.pool_perm, diagnostics.batch, diagnostics.pool_score)
            {
                let attns = &mut out.node_attentions;
                attns.original_batch.push(batch.batch.clone());
                attns.pool_perm.push(perm);
                attns.pool_batch.push(pool_batch);
                attns.pool_score.push(pool_score);
            }

            out.outputs.push(output.logits);
            out.labels.push(sequence.label);
            out.folder_names.push(sequence.folder_name.clone());
        }

        if !sequences.is_empty() {
            out.loss = total_loss / sequences.len() as f32;
        }
        Ok(out)
    }

    /// Score both splits and record a new best result if the test loss improved.
    ///
    /// `current_epoch` of `None` marks the evaluation after the last epoch.
    pub fn evaluate(&mut self, current_epoch: Option<usize>) -> Result<EvaluationReport> {
        let train_output = self.inference(&self.dataset.train)?;
        let test_output = self.inference(&self.dataset.test)?;
        let epoch = current_epoch.unwrap_or(self.config.epochs);

        let metrics_train = score(&train_output.outputs, &train_output.labels)
            .with_loss(train_output.loss);
        let metrics_test =
            score(&test_output.outputs, &test_output.labels).with_loss(test_output.loss);

        self.summary.add_metrics(Split::Train, &metrics_train, epoch)?;
        self.summary.add_metrics(Split::Test, &metrics_test, epoch)?;
        info!(
            epoch,
            train_loss = metrics_train.loss,
            train_acc = metrics_train.acc,
            test_loss = metrics_test.loss,
            test_acc = metrics_test.acc,
            test_auc = metrics_test.auc,
            test_confusion = %metrics_test.confusion,
            "Evaluated"
        );

        let improved = metrics_test.loss < self.best_val_loss;
        if improved {
            self.best_val_loss = metrics_test.loss;
            self.best_epoch = epoch;

            let record = BestResultRecord::new(
                self.config.key()?,
                self.invocation.clone(),
                epoch,
                &metrics_train,
                &metrics_test,
            );
            let outcome = self.store.upsert(record)?;
            self.save_model()?;
            info!(
                epoch,
                val_loss = metrics_test.loss,
                outcome = ?outcome,
                "New best test loss"
            );
        }

        if self.state != TrainerState::Completed {
            self.state = TrainerState::Evaluated { epoch };
        }
        Ok(EvaluationReport {
            epoch,
            train: metrics_train,
            test: metrics_test,
            train_output,
            test_output,
            improved,
        })
    }

    /// Write the checkpoint and its sidecar to `model_save_path`.
    pub fn save_model(&self) -> Result<()> {
        let model = self.require_model()?;
        let path = &self.config.model_save_path;
        Checkpoint::from_model(model).save(path)?;
        let sidecar = write_sidecar(path, &self.config.to_pretty()?, &self.invocation)?;
        debug!(checkpoint = %path.display(), sidecar = %sidecar.display(), "Saved model");
        Ok(())
    }

    /// Rebuild the model from `model_load_path`. Returns `false` when no
    /// checkpoint exists there.
    pub fn load_model(&mut self) -> Result<bool> {
        let path = self.config.model_load_path.clone();
        if !path.exists() {
            warn!(path = %path.display(), "No checkpoint to load, build a model first");
            return Ok(false);
        }

        self.build_model()?;
        let checkpoint = Checkpoint::load(&path)?;
        if let Some(model) = self.model.as_mut() {
            checkpoint.apply_to(model)?;
            model.set_mode(Mode::Eval);
        }
        info!(path = %path.display(), "Loaded checkpoint");
        Ok(true)
    }
}
