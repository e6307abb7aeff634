use analysis_core::EnrichedRecord;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Records under enrichment, addressed by symbol.
///
/// The symbol → slot index is built once at construction and never changes,
/// so stages look it up without locking. Every write goes through the one
/// record mutex and holds it only for the field assignments.
pub struct RecordSet {
    records: Mutex<Vec<EnrichedRecord>>,
    index: HashMap<String, usize>,
    symbols: Vec<String>,
}

impl RecordSet {
    /// Duplicate symbols keep their first slot; later duplicates are dropped.
    pub fn new(records: Vec<EnrichedRecord>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if index.contains_key(&record.symbol) {
                tracing::debug!("Dropping duplicate record for {}", record.symbol);
                continue;
            }
            index.insert(record.symbol.clone(), kept.len());
            kept.push(record);
        }
        let symbols = kept.iter().map(|r| r.symbol.clone()).collect();

        Self {
            records: Mutex::new(kept),
            index,
            symbols,
        }
    }

    /// Symbols in slot order
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Apply `f` to the record for `symbol`. Returns false for unknown symbols.
    pub async fn update<F>(&self, symbol: &str, f: F) -> bool
    where
        F: FnOnce(&mut EnrichedRecord),
    {
        let Some(idx) = self.index_of(symbol) else {
            return false;
        };
        let mut records = self.records.lock().await;
        match records.get_mut(idx) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Current price of a record, if known and positive
    pub async fn price_of(&self, symbol: &str) -> Option<f64> {
        let idx = self.index_of(symbol)?;
        let records = self.records.lock().await;
        records.get(idx).map(|r| r.price).filter(|p| *p > 0.0)
    }

    /// Copy of every record in slot order
    pub async fn snapshot(&self) -> Vec<EnrichedRecord> {
        self.records.lock().await.clone()
    }

    pub fn into_records(self) -> Vec<EnrichedRecord> {
        self.records.into_inner()
    }
}
