//! Core signal processor trait

use forceplate_core::{ForceResult, MultiChannelSignal};
use std::time::Instant;
use tracing::debug;

/// One stage of the calibration chain
///
/// Stages are pure: the same input yields bit-identical output.
pub trait SignalProcessor: Send + Sync {
    /// Process a signal and return the derived result
    fn process(&self, input: &MultiChannelSignal) -> ForceResult<MultiChannelSignal>;

    /// Stage name for logs
    fn name(&self) -> &str;
}

/// Ordered chain of processors applied one after the other
#[derive(Default)]
pub struct ProcessorChain {
    processors: Vec<Box<dyn SignalProcessor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor at the end of the chain
    pub fn add_processor(&mut self, processor: Box<dyn SignalProcessor>) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// Names in execution order
    pub fn processor_names(&self) -> Vec<String> {
        self.processors.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl SignalProcessor for ProcessorChain {
    fn process(&self, input: &MultiChannelSignal) -> ForceResult<MultiChannelSignal> {
        let mut current = input.clone();
        for processor in &self.processors {
            let started = Instant::now();
            current = processor.process(&current)?;
            debug!(
                stage = processor.name(),
                elapsed_us = started.elapsed().as_micros() as u64,
                frames = current.frame_count(),
                "stage complete"
            );
        }
        Ok(current)
    }

    fn name(&self) -> &str {
        "Processor Chain"
    }
}
