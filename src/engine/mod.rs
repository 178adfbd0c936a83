mod bonded;
mod store;

pub use bonded::{transfer_bonded, Bonded};
pub use store::{ParticleStore, ParticleStoreConfig};

use crate::error::Result;
use crate::math::{Point3, Vector3};

slotmap::new_key_type! {
    /// Handle to a particle owned by a [`ParticleEngine`].
    pub struct ParticleId;
}

slotmap::new_key_type! {
    /// Handle to a bonded interaction record (bond, angle or dihedral).
    pub struct BondedId;
}

/// Particle-level operations the mesh solver depends on.
pub trait ParticleEngine: Send {
    /// Creates a particle at `position` with zero velocity and unit mass.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot allocate a particle.
    fn create_particle(&mut self, position: Point3) -> Result<ParticleId>;

    /// Destroys a particle together with every bonded record touching it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn destroy_particle(&mut self, id: ParticleId) -> Result<()>;

    /// Returns `true` if the particle exists.
    fn contains(&self, id: ParticleId) -> bool;

    /// Current position.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn position(&self, id: ParticleId) -> Result<Point3>;

    /// Current velocity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn velocity(&self, id: ParticleId) -> Result<Vector3>;

    /// Current mass.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn mass(&self, id: ParticleId) -> Result<f64>;

    /// Force accumulated since the last integration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn force(&self, id: ParticleId) -> Result<Vector3>;

    /// Moves a particle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn set_position(&mut self, id: ParticleId, position: Point3) -> Result<()>;

    /// Sets a particle's mass.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn set_mass(&mut self, id: ParticleId, mass: f64) -> Result<()>;

    /// Adds to the particle's force accumulator.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the particle does not exist.
    fn add_force(&mut self, id: ParticleId, force: Vector3) -> Result<()>;

    /// Integration time step.
    fn dt(&self) -> f64;

    /// Registers a bonded record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if any referenced particle does not exist.
    fn add_bonded(&mut self, record: Bonded) -> Result<BondedId>;

    /// All bonded records referencing the particle.
    fn bonded_records(&self, id: ParticleId) -> Vec<(BondedId, Bonded)>;

    /// Overwrites a bonded record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the record does not exist.
    fn set_bonded(&mut self, id: BondedId, record: Bonded) -> Result<()>;

    /// Removes a bonded record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the record does not exist.
    fn destroy_bonded(&mut self, id: BondedId) -> Result<()>;
}
