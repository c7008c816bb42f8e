use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::classmap::{ClassMap, MemClassMap};
use crate::error::{BayesError, Result};
use crate::hasher;
use crate::model::Value;
use crate::nodelog::{NodeLog, NodeLogger};
use crate::storage::{self, DumpFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorConfig {
    /// ID of the node owning the transition log.
    pub node_id: u64,
    /// Format used by `store` / `restore`.
    pub dump_format: DumpFormat,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self { node_id: 0, dump_format: DumpFormat::Json }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_id: u64,
    pub probability: f64,
    pub value: Value,
}

/// A training/prediction session: one transition log plus the class map
/// that turns predicted UIDs back into values.
///
/// Plain mutable object. Share it across threads behind a lock.
#[derive(Debug, Clone)]
pub struct Predictor<C: ClassMap = MemClassMap> {
    config: PredictorConfig,
    log: Option<NodeLog>,
    classes: C,
}

impl Predictor<MemClassMap> {
    pub fn new() -> Self {
        Self::with_config(PredictorConfig::default())
    }

    pub fn with_config(config: PredictorConfig) -> Self {
        Self::with_class_map(config, MemClassMap::new())
    }
}

impl Default for Predictor<MemClassMap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ClassMap + Default> Predictor<C> {
    pub fn with_class_map(config: PredictorConfig, classes: C) -> Self {
        Self { config, log: None, classes }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn log(&self) -> Option<&NodeLog> {
        self.log.as_ref()
    }

    pub fn classes(&self) -> &C {
        &self.classes
    }

    pub fn is_initialized(&self) -> bool {
        self.log.is_some()
    }

    /// Drops all trained state.
    pub fn reset(&mut self) {
        self.log = None;
        self.classes = C::default();
    }

    /// Raw value of a class ID returned by a prediction.
    pub fn get_class(&self, class_id: u64) -> Option<&Value> {
        self.classes.get_class(class_id)
    }

    /// Trains on one sequence. Every item becomes a class; each item is then
    /// learned as the successor of every suffix of the items before it.
    pub fn train<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = items.into_iter().map(Into::into).collect();

        // Classes first: a duplicate leaves both the class map and the counters untouched.
        self.classes.add_any(&values)?;

        let uids: Vec<u64> = values.iter().map(hasher::to_uid).collect();
        self.train_uids(&uids)
    }

    /// Same as [`train`](Self::train) for loosely typed input.
    pub fn train_json(&mut self, items: &[serde_json::Value]) -> Result<()> {
        let values = values_from_json(items)?;
        self.train(values)
    }

    /// Trains each row on its own; no suffix crosses a row boundary.
    pub fn train_batch(&mut self, rows: &[Vec<Value>]) -> Result<()> {
        for row in rows {
            self.train(row)?;
        }
        Ok(())
    }

    /// Drill training over already-hashed items. Does not touch the class map.
    ///
    /// For `[1, 2, 3]` this records `1 -> 2`, `2 -> 3` and `flow(1, 2) -> 3`.
    pub fn train_uids(&mut self, uids: &[u64]) -> Result<()> {
        let node_id = self.config.node_id;
        let log = self.log.get_or_insert_with(|| NodeLog::new(node_id));

        let mut updates = 0usize;
        for (i, &to_b) in uids.iter().enumerate().skip(1) {
            for start in (0..i).rev() {
                let from_a = hasher::flow_id(&uids[start..i])?;
                log.update(from_a, to_b);
                updates += 1;
            }
        }

        debug!(node = node_id, items = uids.len(), updates, "sequence trained");
        Ok(())
    }

    /// Class ID of the most probable next item. Ties go to the lowest UID.
    pub fn predict_next<I>(&self, history: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Ok(self.predict_next_class(history)?.class_id)
    }

    pub fn predict_next_json(&self, history: &[serde_json::Value]) -> Result<u64> {
        let values = values_from_json(history)?;
        self.predict_next(values)
    }

    pub fn predict_next_class<I>(&self, history: I) -> Result<Prediction>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let (log, flow) = self.prepare(history)?;

        let mut best: Option<(u64, f64)> = None;
        for class_id in self.classes.get_keys() {
            let p = log.predict(flow, class_id);
            match best {
                Some((_, top)) if p <= top => {}
                _ => best = Some((class_id, p)),
            }
        }

        let (class_id, probability) = best.ok_or(BayesError::PredictorNotInitialized)?;
        debug!(flow, class_id, probability, "next item predicted");
        self.prediction(class_id, probability)
    }

    /// Every known class with its posterior, most probable first.
    pub fn rank<I>(&self, history: I) -> Result<Vec<Prediction>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let (log, flow) = self.prepare(history)?;

        let mut scored: Vec<(u64, f64)> = self
        .classes
        .get_keys()
        .into_iter()
        .map(|class_id| (class_id, log.predict(flow, class_id)))
        .collect();
        scored.sort_by(|a, b| OrderedFloat(b.1).cmp(&OrderedFloat(a.1)).then(a.0.cmp(&b.0)));

        scored
        .into_iter()
        .map(|(class_id, probability)| self.prediction(class_id, probability))
        .collect()
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.store_to(BufWriter::new(file))
    }

    pub fn store_to<W: Write>(&self, w: W) -> Result<()> {
        let log = self.log.as_ref().ok_or(BayesError::PredictorNotInitialized)?;
        storage::store(self.config.dump_format, log, &self.classes, w)
    }

    /// Replaces the session state with the dump at `path`.
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        self.restore_from(BufReader::new(file))
    }

    pub fn restore_from<R: Read>(&mut self, r: R) -> Result<()> {
        let (log, items) = storage::restore(self.config.dump_format, r)?;

        let mut classes = C::default();
        let values: Vec<Value> = items.into_iter().filter_map(|item| item.value).collect();
        classes.add_any(&values)?;

        self.log = Some(log);
        self.classes = classes;
        Ok(())
    }

    fn prepare<I>(&self, history: I) -> Result<(&NodeLog, u64)>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let log = self.log.as_ref().ok_or(BayesError::PredictorNotInitialized)?;
        let uids: Vec<u64> = history
        .into_iter()
        .map(Into::<Value>::into)
        .map(|v| hasher::to_uid(&v))
        .collect();
        let flow = hasher::flow_id(&uids)?;
        Ok((log, flow))
    }

    fn prediction(&self, class_id: u64, probability: f64) -> Result<Prediction> {
        let value = self
        .classes
        .get_class(class_id)
        .cloned()
        .ok_or_else(|| BayesError::ClassNotFound(format!("{:016x}", class_id)))?;

        Ok(Prediction { class_id, probability, value })
    }
}

fn values_from_json(raw: &[serde_json::Value]) -> Result<Vec<Value>> {
    raw.iter()
    .enumerate()
    .map(|(index, v)| {
        Value::try_from(v).map_err(|_| BayesError::UnsupportedItemType { index, kind: json_kind(v).to_string() })
    })
    .collect()
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
