//! Random hit generator standing in for an external event source.

use std::collections::BTreeSet;

use contracts::{PulseSourceConfig, ReadoutError, ReadoutEvent, TriggeredCollection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use readout_engine::{DriverId, ProducerDriver, SimulationContext, StreamHandle};
use tracing::trace;

use crate::types::{Hit, McParticle};

/// Fraction of a deposit that can leak onto the next channel
const MAX_SHARE: f64 = 0.5;

/// External source: one batch of hits and truth particles per bunch.
///
/// Hits are persistent; the truth collection is only written on trigger,
/// restricted to the particles behind the selected hits.
pub struct PulseSource {
    config: PulseSourceConfig,
    rng: StdRng,
    next_particle: u64,
    hits: Option<StreamHandle<Hit>>,
    truth: Option<StreamHandle<McParticle>>,
}

impl PulseSource {
    pub fn new(config: PulseSourceConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            next_particle: 0,
            hits: None,
            truth: None,
        }
    }

    fn generate(&mut self, time_ns: f64) -> (Vec<Hit>, Vec<McParticle>) {
        let channels = self.config.channels;
        let mut hits = Vec::new();
        let mut particles = Vec::new();

        for channel in 0..channels {
            if self.rng.random::<f64>() >= self.config.hit_probability {
                continue;
            }
            let id = self.next_particle;
            self.next_particle += 1;
            let energy_mev = self.rng.random::<f64>() * self.config.max_energy_mev;
            particles.push(McParticle {
                id,
                time_ns,
                energy_mev,
            });

            let share = if channel + 1 < channels && self.rng.random_bool(0.5) {
                self.rng.random::<f64>() * MAX_SHARE
            } else {
                0.0
            };
            hits.push(Hit {
                channel,
                time_ns,
                energy_mev: energy_mev * (1.0 - share),
                particle: id,
            });
            if share > 0.0 {
                hits.push(Hit {
                    channel: channel + 1,
                    time_ns,
                    energy_mev: energy_mev * share,
                    particle: id,
                });
            }
        }
        (hits, particles)
    }
}

impl ProducerDriver for PulseSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn time_displacement(&self) -> f64 {
        self.config.time_displacement_ns
    }

    fn configure(&mut self, ctx: &mut SimulationContext, id: DriverId) -> Result<(), ReadoutError> {
        self.hits = Some(ctx.register_collection(&self.config.output, id, 0, None, true)?);
        self.truth = Some(ctx.register_collection(&self.config.truth_output, id, 0, None, false)?);
        Ok(())
    }

    fn process(&mut self, ctx: &mut SimulationContext) -> Result<(), ReadoutError> {
        let (Some(hits_handle), Some(truth_handle)) = (self.hits.clone(), self.truth.clone())
        else {
            return Err(ReadoutError::Other(format!(
                "pulse source \"{}\" processed before configure",
                self.config.name
            )));
        };

        let time_ns = ctx.current_time() - ctx.total_time_displacement(hits_handle.name())?;
        let (hits, particles) = self.generate(time_ns);
        trace!(
            source = %self.config.name,
            time_ns,
            hits = hits.len(),
            "pulses generated"
        );
        ctx.add_data_to(&hits_handle, Some(time_ns), hits)?;
        ctx.add_data_to(&truth_handle, Some(time_ns), particles)?;
        Ok(())
    }

    fn on_trigger_data(
        &mut self,
        ctx: &SimulationContext,
        event: &ReadoutEvent,
    ) -> Result<Vec<TriggeredCollection>, ReadoutError> {
        let Some(truth) = &self.truth else {
            return Ok(Vec::new());
        };
        let hits = event.items::<Hit>(&self.config.output).unwrap_or_default();

        let mut selected = Vec::new();
        if let (Some(first), Some(last)) = (
            hits.iter().map(|h| h.time_ns).reduce(f64::min),
            hits.iter().map(|h| h.time_ns).reduce(f64::max),
        ) {
            let ids: BTreeSet<u64> = hits.iter().map(|h| h.particle).collect();
            let end = last + ctx.settings().beam_bunch;
            selected = ctx
                .get_data_from(first, end, truth)?
                .into_iter()
                .filter(|p| ids.contains(&p.id))
                .collect();
        }

        Ok(vec![TriggeredCollection::new(truth.name().clone(), selected)])
    }
}
