//! Cost accounting: one record per successful call, broadcast to any
//! listener. Durable persistence is deliberately out of scope here (§4.1) —
//! this is a lazy in-memory counter stream, not a ledger.

use tokio::sync::broadcast;

#[derive(Clone, Debug, serde::Serialize)]
pub struct CostRecord {
    pub provider: String,
    pub model: String,
    pub operation: &'static str,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub timestamp: u64,
}

#[derive(Clone)]
pub struct CostSink {
    tx: broadcast::Sender<CostRecord>,
}

impl CostSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CostRecord> {
        self.tx.subscribe()
    }

    /// Best-effort: a record is dropped if nobody is listening.
    pub fn record(&self, record: CostRecord) {
        let _ = self.tx.send(record);
    }
}

impl Default for CostSink {
    fn default() -> Self {
        Self::new(256)
    }
}
