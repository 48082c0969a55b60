//! Session ledger persistence
//!
//! One JSON object per session, stored under `key_prefix + session_id`:
//!
//! ```text
//! {
//!   "num_weights_collected": 3,
//!   "number_of_nodes": 2,
//!   "best_performance_metric": 12.0,
//!   "best_weights": [0.3, 0.7],
//!   "0": {"weights": [[0.5, 0.5]], "performance_metric": 10.0},
//!   "1": {"weights": [[0.3, 0.7]], "performance_metric": 12.0},
//!   "2": {"weights": [[0.4, 0.6]], "performance_metric": 5.0}
//! }
//! ```
//!
//! Observation weights are written as a one-element nested array; the reader
//! also accepts a flat array.

use mixtune_common::{
    MixtuneError, Observation, Result, Session, SessionError, WeightVector,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::store::KeyValueStore;

/// Fixed fields of a stored ledger; the indexed observations sit beside them
#[derive(Debug, Deserialize)]
struct LedgerHeader {
    num_weights_collected: usize,
    number_of_nodes: usize,
    best_performance_metric: f64,
    best_weights: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredObservation {
    weights: StoredWeights,
    performance_metric: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredWeights {
    Nested(Vec<Vec<f64>>),
    Flat(Vec<f64>),
}

impl StoredWeights {
    fn into_weights(self) -> std::result::Result<Vec<f64>, String> {
        match self {
            StoredWeights::Flat(w) => Ok(w),
            StoredWeights::Nested(mut rows) if rows.len() == 1 => Ok(rows.remove(0)),
            StoredWeights::Nested(rows) => Err(format!(
                "expected one nested weight row, found {}",
                rows.len()
            )),
        }
    }
}

/// Serialize a session into its stored layout
pub fn encode(session: &Session) -> Result<Vec<u8>> {
    let mut record = Map::new();
    record.insert(
        "num_weights_collected".to_string(),
        Value::from(session.num_observations()),
    );
    record.insert(
        "number_of_nodes".to_string(),
        Value::from(session.number_of_nodes()),
    );
    record.insert(
        "best_performance_metric".to_string(),
        Value::from(session.best_performance_metric()),
    );
    record.insert(
        "best_weights".to_string(),
        Value::from(session.best_weights().as_slice()),
    );

    for (idx, obs) in session.history().iter().enumerate() {
        let stored = StoredObservation {
            weights: StoredWeights::Nested(vec![obs.weights.to_vec()]),
            performance_metric: obs.performance_metric,
        };
        let value = serde_json::to_value(stored)
            .map_err(|e| MixtuneError::Internal(format!("Failed to encode observation: {}", e)))?;
        record.insert(idx.to_string(), value);
    }

    serde_json::to_vec(&Value::Object(record))
        .map_err(|e| MixtuneError::Internal(format!("Failed to encode ledger: {}", e)))
}

/// Parse a stored ledger; any missing or malformed field is `CorruptLedger`
pub fn decode(session_id: &str, bytes: &[u8]) -> std::result::Result<Session, SessionError> {
    let corrupt = |reason: String| SessionError::CorruptLedger {
        session_id: session_id.to_string(),
        reason,
    };

    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("invalid JSON: {}", e)))?;
    let record = value
        .as_object()
        .ok_or_else(|| corrupt("ledger is not a JSON object".to_string()))?;

    let header: LedgerHeader = serde_json::from_value(value.clone())
        .map_err(|e| corrupt(format!("bad header: {}", e)))?;

    // Every observation needs its own key beside the header fields
    if header.num_weights_collected > record.len() {
        return Err(corrupt(format!(
            "num_weights_collected is {} but the record holds only {} fields",
            header.num_weights_collected,
            record.len()
        )));
    }

    let mut history = Vec::new();
    for idx in 0..header.num_weights_collected {
        let entry = record
            .get(&idx.to_string())
            .ok_or_else(|| corrupt(format!("observation {} is missing", idx)))?;
        let stored: StoredObservation = serde_json::from_value(entry.clone())
            .map_err(|e| corrupt(format!("observation {}: {}", idx, e)))?;
        let weights = stored
            .weights
            .into_weights()
            .map_err(|e| corrupt(format!("observation {}: {}", idx, e)))?;
        history.push(Observation::new(weights, stored.performance_metric));
    }

    Session::from_parts(
        session_id,
        header.number_of_nodes,
        header.best_performance_metric,
        WeightVector::new(header.best_weights),
        history,
    )
}

/// Reads and writes whole session ledgers through a [`KeyValueStore`]
#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn KeyValueStore>,
    key_prefix: String,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    /// Store key for a session
    pub fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    /// Load a session, `None` if it has never been recorded
    #[instrument(skip(self))]
    pub async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(bytes) = self.store.get(&self.key(session_id)).await? else {
            debug!("Session not found");
            return Ok(None);
        };
        Ok(Some(decode(session_id, &bytes)?))
    }

    /// Persist the whole ledger in a single write
    #[instrument(skip(self, session), fields(num_observations = session.num_observations()))]
    pub async fn save(&self, session_id: &str, session: &Session) -> Result<()> {
        let bytes = encode(session)?;
        self.store.set(&self.key(session_id), bytes).await
    }

    /// Remove a session; `false` if none was stored
    #[instrument(skip(self))]
    pub async fn remove(&self, session_id: &str) -> Result<bool> {
        let key = self.key(session_id);
        if !self.store.exists(&key).await? {
            return Ok(false);
        }
        self.store.delete(&key).await?;
        Ok(true)
    }
}
