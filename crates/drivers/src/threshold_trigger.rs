//! Triggers on clusters whose energy crosses a threshold.

use contracts::{ReadoutError, ThresholdTriggerConfig};
use readout_engine::{SimulationContext, StreamId, TriggerDriver, TriggerId};
use tracing::debug;

use crate::types::Cluster;

/// Fires when any cluster in a complete bunch reaches the energy threshold.
pub struct ThresholdTrigger {
    config: ThresholdTriggerConfig,
    cursor: f64,
}

impl ThresholdTrigger {
    pub fn new(config: ThresholdTriggerConfig) -> Self {
        Self {
            config,
            cursor: 0.0,
        }
    }
}

impl TriggerDriver for ThresholdTrigger {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn dependencies(&self) -> Vec<StreamId> {
        vec![StreamId::from(self.config.input.as_str())]
    }

    fn time_displacement(&self) -> f64 {
        self.config.time_displacement_ns
    }

    fn dead_time(&self) -> u32 {
        self.config.dead_time
    }

    fn configure(&mut self, ctx: &mut SimulationContext, _id: TriggerId) -> Result<(), ReadoutError> {
        self.cursor = ctx.current_time() - ctx.total_time_displacement(&self.config.input)?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut SimulationContext, id: TriggerId) -> Result<(), ReadoutError> {
        let bunch = ctx.settings().beam_bunch;
        let mut over_threshold = false;
        while ctx.check_collection_status(&self.config.input, self.cursor)? {
            let clusters =
                ctx.get_data::<Cluster>(self.cursor, self.cursor + bunch, &self.config.input)?;
            over_threshold |= clusters
                .iter()
                .any(|c| c.energy_mev >= self.config.energy_threshold_mev);
            self.cursor += bunch;
        }

        if over_threshold {
            metrics::counter!("readout_threshold_crossings_total", "trigger" => self.config.name.clone())
                .increment(1);
            if ctx.send_trigger(id)? {
                debug!(trigger = %self.config.name, now = ctx.current_time(), "threshold crossed");
            }
        }
        Ok(())
    }
}
