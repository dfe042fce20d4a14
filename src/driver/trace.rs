use crate::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Line-oriented JSON trace. Every record is one object `{"kind": ..., "data": ...}` on its own
/// line, so the file can be inspected while the benchmark is still running.
#[derive(Debug)]
pub struct Trace {
    file: BufWriter<File>,
    records: usize,
}

impl Trace {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("failed to create trace file {:?}", path.as_ref()))?;

        let path = path.as_ref().canonicalize()?;
        info!("writing trace to: {:?}", path);

        Ok(Self {
            file: BufWriter::new(file),
            records: 0,
        })
    }

    /// Appends one record. Failures are logged and otherwise ignored; a broken trace never
    /// aborts a run.
    pub fn add<T: Serialize>(&mut self, kind: &str, data: &T) {
        let record = json!({
            "kind": kind,
            "data": data,
        });

        if let Err(e) = serde_json::to_writer(&mut self.file, &record) {
            warn!("writing trace failed: {}", e);
            return;
        }

        let _ = self.file.write_all(b"\n");
        let _ = self.file.flush();
        self.records += 1;
    }

    pub fn num_records(&self) -> usize {
        self.records
    }
}
