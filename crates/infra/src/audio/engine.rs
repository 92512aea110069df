//! Block-level real-time engine
//!
//! This module provides the RealtimeEngine, which lives on the audio thread
//! and owns the signal router, and the EngineHandle used from the control
//! side. Parameters posted through the handle are applied at the next block
//! boundary, so a block never sees a half-applied change.

use super::meter_feed::{meter_feed, MeterReceiver};
use super::parameter_mailbox::{parameter_mailbox, ParameterReceiver, ParameterSender};
use dcomp_core::domain::audio::{validate_sample_rate, AudioError, Result};
use dcomp_core::{DcompConfig, ParamId, SignalRouter};
use tracing::{debug, info};

/// Control-side endpoints of a running engine
pub struct EngineHandle {
    pub parameters: ParameterSender,
    pub meters: MeterReceiver,
}

impl EngineHandle {
    /// Post a raw host value; see [`ParameterSender::on_parameter_changed`]
    pub fn on_parameter_changed(&self, id: ParamId, raw: f32) -> bool {
        self.parameters.on_parameter_changed(id, raw)
    }
}

/// Audio-thread side of the compressor
pub struct RealtimeEngine {
    router: SignalRouter,
    parameters: ParameterReceiver,
    sample_rate: f32,
    block_size: usize,
}

impl RealtimeEngine {
    /// Build and prepare an engine from a configuration
    pub fn new(config: &DcompConfig) -> Result<(Self, EngineHandle)> {
        config
            .validate()
            .map_err(|e| AudioError::InvalidConfiguration(e.to_string()))?;

        let engine_config = &config.engine;
        let sample_rate = validate_sample_rate(engine_config.sample_rate as f32)?;

        let (sender, receiver) = parameter_mailbox();
        let (publisher, meters) = meter_feed(engine_config.meter_queue_capacity);

        let mut router = SignalRouter::from_config(engine_config, &config.parameters);
        router.set_meter_sink(Box::new(publisher));
        router.prepare(sample_rate)?;

        info!(
            sample_rate,
            block_size = engine_config.block_size,
            "Realtime engine ready"
        );

        Ok((
            Self {
                router,
                parameters: receiver,
                sample_rate,
                block_size: engine_config.block_size,
            },
            EngineHandle {
                parameters: sender,
                meters,
            },
        ))
    }

    /// Apply pending parameters, then process one block
    pub fn process_block(
        &mut self,
        main: [&[f32]; 2],
        sidechain: Option<[&[f32]; 2]>,
        output: [&mut [f32]; 2],
    ) -> Result<()> {
        let router = &mut self.router;
        self.parameters.drain(|id, raw| {
            router.on_parameter_changed(id, raw);
        });
        router.process(main, sidechain, output, self.sample_rate)
    }

    /// Re-prepare every stage for a new sample rate
    pub fn set_sample_rate(&mut self, sample_rate: f32) -> Result<()> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        self.router.prepare(sample_rate)?;
        self.sample_rate = sample_rate;
        debug!(sample_rate, "Engine sample rate changed");
        Ok(())
    }

    /// Clear all signal state (transport stop, seek)
    pub fn reset(&mut self) {
        self.router.reset();
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Preferred block length; `process_block` accepts any length
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn router(&self) -> &SignalRouter {
        &self.router
    }
}
