use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::sync::Mutex;
use txstream_api::crossover::DataHandler;
use txstream_api::crossover::HandlerError;
use txstream_api::crossover::RecordKind;

/// One output line of `txstream scrape`.
#[derive(Debug, Serialize)]
struct Line<'a> {
    kind: &'static str,
    record: &'a Value,
}

/// Writes every record as one JSON line.
pub struct NdjsonWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> NdjsonWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn write_value(&self, value: &impl Serialize) -> std::io::Result<()> {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        serde_json::to_writer(&mut *out, value)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

#[async_trait]
impl<W: Write + Send> DataHandler for NdjsonWriter<W> {
    async fn on_records(&self, kind: RecordKind, records: Vec<Value>) -> Result<(), HandlerError> {
        let kind = match kind {
            RecordKind::Confirmed => "confirmed",
            RecordKind::Mempool => "mempool",
        };
        for record in &records {
            self.write_value(&Line { kind, record })?;
        }
        Ok(())
    }
}
