use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use super::{Bonded, BondedId, ParticleEngine, ParticleId};
use crate::error::{Result, TopologyError};
use crate::math::{Point3, Vector3};

/// Parameters for [`ParticleStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleStoreConfig {
    /// Integration time step.
    pub dt: f64,
    /// Overdamped drag coefficient: `velocity = force / drag`.
    pub drag: f64,
    /// Mass assigned to new particles.
    pub default_mass: f64,
}

impl Default for ParticleStoreConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,
            drag: 1.0,
            default_mass: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Particle {
    position: Point3,
    velocity: Vector3,
    mass: f64,
    force: Vector3,
}

/// In-memory particle engine with overdamped explicit-Euler integration.
#[derive(Debug, Default)]
pub struct ParticleStore {
    config: ParticleStoreConfig,
    particles: SlotMap<ParticleId, Particle>,
    bonded: SlotMap<BondedId, Bonded>,
}

impl ParticleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: ParticleStoreConfig) -> Self {
        Self {
            config,
            particles: SlotMap::with_key(),
            bonded: SlotMap::with_key(),
        }
    }

    /// Number of live particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Returns `true` if no particles exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of live bonded records.
    #[must_use]
    pub fn bonded_len(&self) -> usize {
        self.bonded.len()
    }

    /// Advances every particle by one explicit-Euler step of `dt`.
    ///
    /// Force accumulators keep the forces that drove the step until
    /// [`ParticleStore::clear_forces`] is called.
    pub fn step(&mut self, dt: f64) {
        let drag = self.config.drag;
        for particle in self.particles.values_mut() {
            particle.velocity = particle.force / drag;
            particle.position += particle.velocity * dt;
        }
    }

    /// Zeroes every force accumulator without moving particles.
    pub fn clear_forces(&mut self) {
        for particle in self.particles.values_mut() {
            particle.force = Vector3::zeros();
        }
    }

    fn particle(&self, id: ParticleId) -> Result<&Particle> {
        self.particles
            .get(id)
            .ok_or_else(|| TopologyError::InvalidHandle("particle").into())
    }

    fn particle_mut(&mut self, id: ParticleId) -> Result<&mut Particle> {
        self.particles
            .get_mut(id)
            .ok_or_else(|| TopologyError::InvalidHandle("particle").into())
    }
}

impl ParticleEngine for ParticleStore {
    fn create_particle(&mut self, position: Point3) -> Result<ParticleId> {
        Ok(self.particles.insert(Particle {
            position,
            velocity: Vector3::zeros(),
            mass: self.config.default_mass,
            force: Vector3::zeros(),
        }))
    }

    fn destroy_particle(&mut self, id: ParticleId) -> Result<()> {
        self.particles
            .remove(id)
            .ok_or(TopologyError::InvalidHandle("particle"))?;
        self.bonded.retain(|_, record| !record.contains(id));
        Ok(())
    }

    fn contains(&self, id: ParticleId) -> bool {
        self.particles.contains_key(id)
    }

    fn position(&self, id: ParticleId) -> Result<Point3> {
        Ok(self.particle(id)?.position)
    }

    fn velocity(&self, id: ParticleId) -> Result<Vector3> {
        Ok(self.particle(id)?.velocity)
    }

    fn mass(&self, id: ParticleId) -> Result<f64> {
        Ok(self.particle(id)?.mass)
    }

    fn force(&self, id: ParticleId) -> Result<Vector3> {
        Ok(self.particle(id)?.force)
    }

    fn set_position(&mut self, id: ParticleId, position: Point3) -> Result<()> {
        self.particle_mut(id)?.position = position;
        Ok(())
    }

    fn set_mass(&mut self, id: ParticleId, mass: f64) -> Result<()> {
        self.particle_mut(id)?.mass = mass;
        Ok(())
    }

    fn add_force(&mut self, id: ParticleId, force: Vector3) -> Result<()> {
        self.particle_mut(id)?.force += force;
        Ok(())
    }

    fn dt(&self) -> f64 {
        self.config.dt
    }

    fn add_bonded(&mut self, record: Bonded) -> Result<BondedId> {
        if record.particles().iter().any(|p| !self.particles.contains_key(*p)) {
            return Err(TopologyError::InvalidHandle("particle").into());
        }
        Ok(self.bonded.insert(record))
    }

    fn bonded_records(&self, id: ParticleId) -> Vec<(BondedId, Bonded)> {
        self.bonded
            .iter()
            .filter(|(_, record)| record.contains(id))
            .map(|(key, record)| (key, *record))
            .collect()
    }

    fn set_bonded(&mut self, id: BondedId, record: Bonded) -> Result<()> {
        let slot = self
            .bonded
            .get_mut(id)
            .ok_or(TopologyError::InvalidHandle("bonded record"))?;
        *slot = record;
        Ok(())
    }

    fn destroy_bonded(&mut self, id: BondedId) -> Result<()> {
        self.bonded
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TopologyError::InvalidHandle("bonded record").into())
    }
}
