use loro::{ExportMode, LoroDoc};
use tracing::debug;

use super::{DocEngine, DocState};
use crate::ws::error::CrdtError;

/// Loro-backed document engine.
#[derive(Clone, Debug, Default)]
pub struct LoroEngine;

impl LoroEngine {
    pub fn new() -> Self {
        Self
    }
}

struct LoroState {
    doc: LoroDoc,
}

impl DocState for LoroState {
    fn apply(&mut self, update: &[u8]) -> Result<(), CrdtError> {
        if update.is_empty() {
            return Err(CrdtError::Apply("empty update".to_string()));
        }
        // Updates with missing causal deps are parked inside the doc until
        // the deps arrive, so a successful import may not change the value yet.
        self.doc
            .import(update)
            .map_err(|e| CrdtError::Apply(e.to_string()))?;
        debug!("Loro update imported ({} bytes)", update.len());
        Ok(())
    }

    fn full_state(&self) -> Result<Vec<u8>, CrdtError> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| CrdtError::Encode(e.to_string()))
    }
}

impl DocEngine for LoroEngine {
    fn create(&self, snapshot: Option<&[u8]>) -> Result<Box<dyn DocState>, CrdtError> {
        let doc = LoroDoc::new();
        if let Some(bytes) = snapshot {
            doc.import(bytes)
                .map_err(|e| CrdtError::Apply(format!("snapshot: {}", e)))?;
        }
        Ok(Box::new(LoroState { doc }))
    }
}
