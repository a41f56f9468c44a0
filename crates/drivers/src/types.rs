use serde::Serialize;

/// Energy deposit on one readout channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub channel: u32,
    pub time_ns: f64,
    pub energy_mev: f64,
    /// Id of the [`McParticle`] that deposited the energy
    pub particle: u64,
}

/// Generator-level truth for a hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McParticle {
    pub id: u64,
    pub time_ns: f64,
    pub energy_mev: f64,
}

/// Run of hits on adjacent channels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub first_channel: u32,
    pub last_channel: u32,
    pub time_ns: f64,
    pub energy_mev: f64,
    pub hits: u32,
}

impl Cluster {
    pub fn width(&self) -> u32 {
        self.last_channel - self.first_channel + 1
    }
}
