//! Adjacent-channel clustering.

use contracts::{ClustererConfig, ReadoutError};
use readout_engine::{DriverId, ProducerDriver, SimulationContext, StreamId};
use tracing::trace;

use crate::types::{Cluster, Hit};

/// Reads hits one bunch at a time, once its own output time is complete,
/// and writes one batch of clusters per bunch.
pub struct Clusterer {
    config: ClustererConfig,
    /// Start of the next bunch to cluster (ns)
    cursor: f64,
}

impl Clusterer {
    pub fn new(config: ClustererConfig) -> Self {
        Self {
            config,
            cursor: 0.0,
        }
    }
}

/// Group hits whose channels touch or overlap.
pub fn cluster_hits(mut hits: Vec<Hit>, time_ns: f64) -> Vec<Cluster> {
    hits.sort_by_key(|h| h.channel);

    let mut clusters: Vec<Cluster> = Vec::new();
    for hit in hits {
        match clusters.last_mut() {
            Some(open) if hit.channel <= open.last_channel + 1 => {
                open.last_channel = open.last_channel.max(hit.channel);
                open.energy_mev += hit.energy_mev;
                open.hits += 1;
            }
            _ => clusters.push(Cluster {
                first_channel: hit.channel,
                last_channel: hit.channel,
                time_ns,
                energy_mev: hit.energy_mev,
                hits: 1,
            }),
        }
    }
    clusters
}

impl ProducerDriver for Clusterer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn dependencies(&self) -> Vec<StreamId> {
        vec![StreamId::from(self.config.input.as_str())]
    }

    fn time_displacement(&self) -> f64 {
        self.config.time_displacement_ns
    }

    fn configure(&mut self, ctx: &mut SimulationContext, id: DriverId) -> Result<(), ReadoutError> {
        ctx.register_collection::<Cluster>(&self.config.output, id, 0, None, true)?;
        // First bunch the input can deliver
        self.cursor = ctx.current_time() - ctx.total_time_displacement(&self.config.input)?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut SimulationContext) -> Result<(), ReadoutError> {
        let bunch = ctx.settings().beam_bunch;
        while ctx.check_collection_status(&self.config.output, self.cursor)? {
            let start = self.cursor;
            let hits = ctx.get_data::<Hit>(start, start + bunch, &self.config.input)?;
            let clusters = cluster_hits(hits, start);
            trace!(
                clusterer = %self.config.name,
                time_ns = start,
                clusters = clusters.len(),
                "bunch clustered"
            );
            ctx.add_data(&self.config.output, Some(start), clusters)?;
            self.cursor += bunch;
        }
        Ok(())
    }
}
