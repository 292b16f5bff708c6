//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use geobatch::backend::{Dataset, LocalFileSystem, MemoryBackend, ShapeType};
use geobatch::error::BackendResult;
use geobatch::models::Record;
use geobatch::pipeline::{PipelineRunner, PipelineStep, RunSettings, StepContext, StepOutcome};
use geobatch::workflows::Backends;
use parking_lot::Mutex;
use std::sync::Arc;

pub const SEED: &str = "seed";

/// Step that copies the seed dataset to `<workspace>/<item>_<step>`,
/// claiming the output first.
pub struct CopySeedStep {
    pub name: &'static str,
    pub events: Option<Arc<Mutex<Vec<String>>>>,
}

impl CopySeedStep {
    pub fn new(name: &'static str) -> Self {
        Self { name, events: None }
    }

    pub fn logging(name: &'static str, events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            events: Some(events),
        }
    }
}

#[async_trait]
impl PipelineStep for CopySeedStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        if let Some(events) = &self.events {
            events.lock().push(format!("run:{}:{}", ctx.item.id, self.name));
        }
        let output = ctx.workspace_path(&format!("{}_{}", ctx.output_stem(), self.name));
        let artifact = ctx.claim_dataset(output.clone()).await?;
        ctx.geo.copy_features(SEED, &output).await?;
        Ok(StepOutcome::artifact(artifact))
    }
}

pub fn seeded_backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new().with_dataset(
        SEED,
        Dataset::feature_class(SEED, ShapeType::Polygon).with_records(vec![Record::new(1).with_area(10.0)]),
    ))
}

pub fn runner(geo: Arc<MemoryBackend>, settings: RunSettings) -> PipelineRunner {
    PipelineRunner::new(geo, Arc::new(LocalFileSystem::new()), settings)
}

pub fn backends(geo: Arc<MemoryBackend>) -> Backends {
    Backends::new(geo, Arc::new(LocalFileSystem::new()))
}

pub fn path_key(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
