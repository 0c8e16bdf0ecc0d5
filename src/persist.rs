//! Storing models and training samples.
//!
//! The simulation never waits on storage. Models and samples queue up as
//! [PersistRequest]s which a [Persister] hands to a [ModelStore] on a blocking worker;
//! the ids the store assigns come back as [SavedModel]s. A store that can't be reached
//! degrades to a local one through [FallbackStore], and failing that to a client-made id.

use crate::{
    constants::{SNAKEPIT_HIDDEN_SIZE, SNAKEPIT_INPUT_SIZE, SNAKEPIT_OUTPUT_SIZE},
    error::{Error, Result},
    learn::now_millis,
    network::Brain,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub best_score: f64,
    pub games_played: u32,
    pub learning_rate: f64,
    pub agent_id: Option<usize>,
    /// Unix time in milliseconds
    pub saved_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: Option<String>,
    pub weights: Vec<f64>,
    pub score: f64,
    pub generation: u64,
    pub metadata: ModelMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub model_id: String,
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
    pub success: bool,
    pub timestamp: u64,
}

impl Brain {
    /// The storable form of this brain, as played by snake `agent`
    pub fn to_record(&self, agent: Option<usize>) -> ModelRecord {
        ModelRecord {
            id: self.id.clone(),
            weights: self.weights(),
            score: self.score,
            generation: self.generation(),
            metadata: ModelMetadata {
                input_size: self.input_size(),
                hidden_size: self.hidden_size(),
                output_size: self.output_size(),
                best_score: self.best_score(),
                games_played: self.games_played,
                learning_rate: self.learning_rate(),
                agent_id: agent,
                saved_at: now_millis(),
            },
        }
    }

    /// Rebuild a brain from storage. Fails on records of any other shape than 8/12/4.
    pub fn from_record(record: &ModelRecord) -> Result<Self> {
        let meta = &record.metadata;
        if (meta.input_size, meta.hidden_size, meta.output_size)
            != (SNAKEPIT_INPUT_SIZE, SNAKEPIT_HIDDEN_SIZE, SNAKEPIT_OUTPUT_SIZE)
        {
            return Err(Error::Store(format!(
                "model {} is {}x{}x{}",
                record.id.as_deref().unwrap_or("<unsaved>"),
                meta.input_size,
                meta.hidden_size,
                meta.output_size
            )));
        }

        let mut brain = Self::from_weights(&record.weights, record.generation)?;
        brain.id.clone_from(&record.id);
        brain.record_score(record.score);
        brain.set_best_score(meta.best_score);
        brain.games_played = meta.games_played;
        Ok(brain)
    }
}

/// Usable brains out of stored records, skipping (and logging) the ones that aren't
pub fn brains_from_records(records: &[ModelRecord]) -> Vec<Brain> {
    records
        .iter()
        .filter_map(|record| match Brain::from_record(record) {
            Ok(brain) if brain.is_valid() => Some(brain),
            Ok(_) => {
                warn!("skipping stored model {:?} with non-finite weights", record.id);
                None
            }
            Err(err) => {
                warn!("skipping stored model {:?}: {err}", record.id);
                None
            }
        })
        .collect()
}

/// An id for a model no store would take
pub fn client_id() -> String {
    format!("local_{}_{:08x}", now_millis(), rand::random::<u32>())
}

pub trait ModelStore: Send {
    /// The highest scoring stored model
    fn load_best_model(&mut self) -> Result<Option<ModelRecord>>;
    fn load_all_models(&mut self) -> Result<Vec<ModelRecord>>;
    /// Store a model, returning its id. Records carrying an id replace that model.
    fn save_model(&mut self, record: &ModelRecord) -> Result<String>;
    fn save_training_sample(&mut self, sample: &TrainingSample) -> Result<()>;
}

impl<S: ModelStore + ?Sized> ModelStore for Box<S> {
    fn load_best_model(&mut self) -> Result<Option<ModelRecord>> {
        (**self).load_best_model()
    }

    fn load_all_models(&mut self) -> Result<Vec<ModelRecord>> {
        (**self).load_all_models()
    }

    fn save_model(&mut self, record: &ModelRecord) -> Result<String> {
        (**self).save_model(record)
    }

    fn save_training_sample(&mut self, sample: &TrainingSample) -> Result<()> {
        (**self).save_training_sample(sample)
    }
}

fn best_of(records: impl IntoIterator<Item = ModelRecord>) -> Option<ModelRecord> {
    records.into_iter().max_by(|l, r| {
        l.score
            .total_cmp(&r.score)
            .then(l.generation.cmp(&r.generation))
    })
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    models: Vec<ModelRecord>,
    samples: Vec<TrainingSample>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }
}

impl ModelStore for MemoryStore {
    fn load_best_model(&mut self) -> Result<Option<ModelRecord>> {
        Ok(best_of(self.models.iter().cloned()))
    }

    fn load_all_models(&mut self) -> Result<Vec<ModelRecord>> {
        Ok(self.models.clone())
    }

    fn save_model(&mut self, record: &ModelRecord) -> Result<String> {
        let id = match &record.id {
            Some(id) => id.clone(),
            None => {
                self.next_id += 1;
                format!("mem_{}", self.next_id)
            }
        };
        let mut record = record.clone();
        record.id = Some(id.clone());
        match self.models.iter_mut().find(|m| m.id == record.id) {
            Some(existing) => *existing = record,
            None => self.models.push(record),
        }
        Ok(id)
    }

    fn save_training_sample(&mut self, sample: &TrainingSample) -> Result<()> {
        self.samples.push(sample.clone());
        Ok(())
    }
}

/// One pretty-printed JSON file per model under `models/`, and an append-only JSON lines
/// log of training samples
#[derive(Debug)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    const MODELS: &'static str = "models";
    const SAMPLES: &'static str = "samples.jsonl";

    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(Self::MODELS))?;
        Ok(Self { root })
    }

    fn model_path(&self, id: &str) -> PathBuf {
        self.root.join(Self::MODELS).join(format!("{id}.json"))
    }
}

impl ModelStore for JsonDirStore {
    fn load_best_model(&mut self) -> Result<Option<ModelRecord>> {
        Ok(best_of(self.load_all_models()?))
    }

    fn load_all_models(&mut self) -> Result<Vec<ModelRecord>> {
        let mut paths = fs::read_dir(self.root.join(Self::MODELS))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        paths.sort();

        let mut records: Vec<ModelRecord> = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = File::open(&path)
                .map_err(Error::from)
                .and_then(|f| Ok(serde_json::from_reader::<_, ModelRecord>(BufReader::new(f))?));
            match parsed {
                Ok(record) => records.push(record),
                Err(err) => warn!("skipping unreadable model {}: {err}", path.display()),
            }
        }
        Ok(records)
    }

    fn save_model(&mut self, record: &ModelRecord) -> Result<String> {
        let id = record.id.clone().unwrap_or_else(client_id);
        let mut record = record.clone();
        record.id = Some(id.clone());

        let mut writer = BufWriter::new(File::create(self.model_path(&id))?);
        serde_json::to_writer_pretty(&mut writer, &record)?;
        writer.flush()?;
        Ok(id)
    }

    fn save_training_sample(&mut self, sample: &TrainingSample) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(Self::SAMPLES))?;
        let mut line = serde_json::to_vec(sample)?;
        line.push(b'\n');
        file.write_all(&line)?;
        Ok(())
    }
}

/// A primary store backed by a local one. Loads prefer the primary and saves fall through
/// to the local store, then to a [client_id], so saving a model never fails.
#[derive(Debug)]
pub struct FallbackStore<P, L> {
    primary: P,
    local: L,
}

impl<P: ModelStore, L: ModelStore> FallbackStore<P, L> {
    pub fn new(primary: P, local: L) -> Self {
        Self { primary, local }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn local(&self) -> &L {
        &self.local
    }
}

impl<P: ModelStore, L: ModelStore> ModelStore for FallbackStore<P, L> {
    fn load_best_model(&mut self) -> Result<Option<ModelRecord>> {
        match self.primary.load_best_model() {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(err) => warn!("primary store can't load best model: {err}"),
        }
        self.local.load_best_model()
    }

    fn load_all_models(&mut self) -> Result<Vec<ModelRecord>> {
        match self.primary.load_all_models() {
            Ok(records) if !records.is_empty() => return Ok(records),
            Ok(_) => {}
            Err(err) => warn!("primary store can't load models: {err}"),
        }
        self.local.load_all_models()
    }

    fn save_model(&mut self, record: &ModelRecord) -> Result<String> {
        let err = match self.primary.save_model(record) {
            Ok(id) => return Ok(id),
            Err(err) => err,
        };
        warn!("primary store can't save model, saving locally: {err}");
        match self.local.save_model(record) {
            Ok(id) => Ok(id),
            Err(err) => {
                let id = client_id();
                warn!("local store can't save model either, using id {id}: {err}");
                Ok(id)
            }
        }
    }

    fn save_training_sample(&mut self, sample: &TrainingSample) -> Result<()> {
        if let Err(err) = self.primary.save_training_sample(sample) {
            debug!("primary store can't save sample: {err}");
            if let Err(err) = self.local.save_training_sample(sample) {
                warn!("dropping training sample: {err}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistRequest {
    Model {
        snake: Option<usize>,
        /// [crate::snake::Snake] brain lineage at the time of the request
        lineage: u64,
        record: ModelRecord,
    },
    Sample(TrainingSample),
}

/// A stored model's id on its way back to the brain it was taken from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedModel {
    pub snake: Option<usize>,
    pub lineage: u64,
    pub id: String,
}

fn handle(store: &mut impl ModelStore, request: PersistRequest) -> Option<SavedModel> {
    match request {
        PersistRequest::Model {
            snake,
            lineage,
            record,
        } => {
            let id = store.save_model(&record).unwrap_or_else(|err| {
                let id = client_id();
                warn!("can't save model, using id {id}: {err}");
                id
            });
            debug!(
                "saved generation {} model of snake {snake:?} as {id}",
                record.generation
            );
            Some(SavedModel { snake, lineage, id })
        }
        PersistRequest::Sample(sample) => {
            if let Err(err) = store.save_training_sample(&sample) {
                warn!("can't save training sample: {err}");
            }
            None
        }
    }
}

/// Owns a store on a blocking worker and feeds it requests without ever blocking the
/// caller. Must be created inside a tokio runtime.
pub struct Persister {
    requests: mpsc::Sender<PersistRequest>,
    saved: mpsc::UnboundedReceiver<SavedModel>,
    worker: JoinHandle<()>,
}

impl Persister {
    pub fn spawn<S: ModelStore + 'static>(mut store: S, capacity: usize) -> Self {
        let (requests, mut queue) = mpsc::channel(capacity.max(1));
        let (done, saved) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || {
            while let Some(request) = queue.blocking_recv() {
                if let Some(saved) = handle(&mut store, request) {
                    // the receiving end only goes away on shutdown
                    let _ = done.send(saved);
                }
            }
            debug!("persister worker done");
        });
        Self {
            requests,
            saved,
            worker,
        }
    }

    /// Queue `request`, dropping it when the queue is full
    pub fn submit(&self, request: PersistRequest) -> bool {
        match self.requests.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("persistence queue full, dropping request");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("persistence worker gone, dropping request");
                false
            }
        }
    }

    /// Ids assigned since the last call
    pub fn saved(&mut self) -> Vec<SavedModel> {
        let mut saved = Vec::new();
        while let Ok(s) = self.saved.try_recv() {
            saved.push(s);
        }
        saved
    }

    /// Let the worker finish what's queued, returning the ids it assigned meanwhile
    pub async fn shutdown(mut self) -> Vec<SavedModel> {
        drop(self.requests);
        if let Err(err) = self.worker.await {
            warn!("persister worker failed: {err}");
        }
        let mut saved = Vec::new();
        while let Some(s) = self.saved.recv().await {
            saved.push(s);
        }
        info!("persister shut down");
        saved
    }
}
