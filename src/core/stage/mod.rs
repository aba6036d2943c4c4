//! # Stage Module
//!
//! Lifecycle wrapper shared by every pipeline stage.
//!
//! A stage is constructed, then `on_start` registers it as a producer on its
//! outputs, `run` executes its loop on a dedicated thread, and `on_stop`
//! deregisters it so shutdown propagates downstream.
//!
//! ## Shapes
//! - [`Source`] - no input, produces until exhausted
//! - [`Transform`] - pops one item, pushes zero or more
//! - [`Sink`] - pops and consumes, no output

use std::any::Any;
use std::io;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use crate::core::queue::Queue;
use crate::error::PipelineError;

pub use crate::core::queue::CancellationToken;

/// A unit of work that runs on its own thread.
pub trait Stage: Send + 'static {
    fn name(&self) -> &str;

    /// Runs on the spawning thread, before any stage thread exists.
    fn on_start(&mut self) {}

    fn run(&mut self);

    /// Runs on the stage thread after `run`, even if `run` panicked.
    fn on_stop(&mut self) {}
}

/// Join handle for a spawned stage.
pub struct StageHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl StageHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<(), PipelineError> {
        self.handle
            .join()
            .map_err(|_| PipelineError::StagePanicked { stage: self.name })
    }
}

/// Start a stage on a named thread.
///
/// `on_start` runs before the thread is spawned, so when several stages
/// are spawned in sequence every producer is registered before any of
/// them can finish and close a shared queue. If no thread can be created
/// `on_stop` still runs, so the stage's outputs are released.
pub fn spawn_stage<S: Stage>(stage: S) -> Result<StageHandle, PipelineError> {
    spawn_stage_with(stage, |name, body| thread::Builder::new().name(name).spawn(body))
}

type StageBody = Box<dyn FnOnce() + Send + 'static>;

fn spawn_stage_with<S, F>(mut stage: S, spawn: F) -> Result<StageHandle, PipelineError>
where
    S: Stage,
    F: FnOnce(String, StageBody) -> io::Result<JoinHandle<()>>,
{
    stage.on_start();
    let name = stage.name().to_string();

    // The stage stays reachable here until the new thread takes it.
    let slot = Arc::new(Mutex::new(Some(stage)));
    let thread_slot = Arc::clone(&slot);
    let body: StageBody = Box::new(move || {
        let taken = thread_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stage) = taken {
            run_stage(stage);
        }
    });

    match spawn(name.clone(), body) {
        Ok(handle) => Ok(StageHandle { name, handle }),
        Err(e) => {
            error!(stage = %name, error = %e, "failed to spawn stage");
            let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(mut stage) = taken {
                stage.on_stop();
            }
            Err(PipelineError::SpawnFailed {
                stage: name,
                reason: e.to_string(),
            })
        }
    }
}

fn run_stage<S: Stage>(mut stage: S) {
    debug!(stage = stage.name(), "stage started");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.run()));
    stage.on_stop();
    match outcome {
        Ok(()) => debug!(stage = stage.name(), "stage stopped"),
        Err(payload) => {
            error!(
                stage = stage.name(),
                reason = panic_message(payload.as_ref()),
                "stage panicked"
            );
            panic::resume_unwind(payload);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// A stage with no input.
pub trait Source: Send + 'static {
    type Output: Send + 'static;

    fn name(&self) -> &str;

    /// Push items until exhausted. A failed push means downstream is gone.
    fn produce(&mut self, output: &Queue<Self::Output>);
}

/// A stage that maps each input to zero or more outputs.
pub trait Transform: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &str;

    /// Return `Break` to stop early, typically after a push failed.
    fn transform(&mut self, item: Self::Input, output: &Queue<Self::Output>) -> ControlFlow<()>;

    /// Called once the input is drained, before the output is released.
    fn finish(&mut self, _output: &Queue<Self::Output>) {}
}

/// A stage that consumes its input.
pub trait Sink: Send + 'static {
    type Input: Send + 'static;

    fn name(&self) -> &str;

    fn consume(&mut self, item: Self::Input) -> ControlFlow<()>;

    /// Called once the input is drained.
    fn finish(&mut self) {}
}

/// Runs a [`Source`] as a stage.
pub struct SourceStage<S: Source> {
    source: S,
    output: Arc<Queue<S::Output>>,
}

impl<S: Source> SourceStage<S> {
    pub fn new(source: S, output: Arc<Queue<S::Output>>) -> Self {
        Self { source, output }
    }
}

impl<S: Source> Stage for SourceStage<S> {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn on_start(&mut self) {
        self.output.register_producer();
    }

    fn run(&mut self) {
        self.source.produce(&self.output);
    }

    fn on_stop(&mut self) {
        self.output.producer_done();
    }
}

/// Runs a [`Transform`] as a stage.
pub struct TransformStage<T: Transform> {
    transform: T,
    input: Arc<Queue<T::Input>>,
    output: Arc<Queue<T::Output>>,
}

impl<T: Transform> TransformStage<T> {
    pub fn new(transform: T, input: Arc<Queue<T::Input>>, output: Arc<Queue<T::Output>>) -> Self {
        Self {
            transform,
            input,
            output,
        }
    }
}

impl<T: Transform> Stage for TransformStage<T> {
    fn name(&self) -> &str {
        self.transform.name()
    }

    fn on_start(&mut self) {
        self.output.register_producer();
    }

    fn run(&mut self) {
        while let Some(item) = self.input.wait_and_pop() {
            if self.transform.transform(item, &self.output).is_break() {
                // Unblock whoever still pushes into us.
                self.input.shutdown();
                break;
            }
        }
        self.transform.finish(&self.output);
    }

    fn on_stop(&mut self) {
        self.output.producer_done();
    }
}

/// Runs a [`Sink`] as a stage.
pub struct SinkStage<S: Sink> {
    sink: S,
    input: Arc<Queue<S::Input>>,
}

impl<S: Sink> SinkStage<S> {
    pub fn new(sink: S, input: Arc<Queue<S::Input>>) -> Self {
        Self { sink, input }
    }
}

impl<S: Sink> Stage for SinkStage<S> {
    fn name(&self) -> &str {
        self.sink.name()
    }

    fn run(&mut self) {
        while let Some(item) = self.input.wait_and_pop() {
            if self.sink.consume(item).is_break() {
                self.input.shutdown();
                break;
            }
        }
        self.sink.finish();
    }
}
