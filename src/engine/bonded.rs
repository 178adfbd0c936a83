use std::collections::HashSet;

use tracing::debug;

use super::{ParticleEngine, ParticleId};
use crate::error::Result;

/// A bonded interaction between two, three or four particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bonded {
    Bond([ParticleId; 2]),
    Angle([ParticleId; 3]),
    Dihedral([ParticleId; 4]),
}

impl Bonded {
    /// Particles referenced by the record, in order.
    #[must_use]
    pub fn particles(&self) -> &[ParticleId] {
        match self {
            Self::Bond(p) => p,
            Self::Angle(p) => p,
            Self::Dihedral(p) => p,
        }
    }

    /// Returns `true` if the record references `id`.
    #[must_use]
    pub fn contains(&self, id: ParticleId) -> bool {
        self.particles().contains(&id)
    }

    /// Copy of the record with every occurrence of `from` replaced by `to`.
    #[must_use]
    pub fn replaced(&self, from: ParticleId, to: ParticleId) -> Self {
        let swap = |p: ParticleId| if p == from { to } else { p };
        match *self {
            Self::Bond(p) => Self::Bond(p.map(swap)),
            Self::Angle(p) => Self::Angle(p.map(swap)),
            Self::Dihedral(p) => Self::Dihedral(p.map(swap)),
        }
    }

    /// For a pair bond touching `id`, the particle on the other end.
    #[must_use]
    pub fn partner_of(&self, id: ParticleId) -> Option<ParticleId> {
        match *self {
            Self::Bond([a, b]) if a == id => Some(b),
            Self::Bond([a, b]) if b == id => Some(a),
            _ => None,
        }
    }
}

/// Rewrites every bonded record of `from` to reference `to` instead.
///
/// Records that would reference `to` twice are destroyed, and so is any
/// pair bond whose other end is already bonded to `to`. Returns the number
/// of records destroyed.
///
/// # Errors
///
/// Propagates engine failures while rewriting records.
pub fn transfer_bonded<E: ParticleEngine + ?Sized>(
    engine: &mut E,
    from: ParticleId,
    to: ParticleId,
) -> Result<usize> {
    let mut partners: HashSet<ParticleId> = engine
        .bonded_records(to)
        .iter()
        .filter_map(|(_, record)| record.partner_of(to))
        .collect();
    partners.insert(to);

    let mut destroyed = 0;
    for (id, record) in engine.bonded_records(from) {
        let duplicate = match record.partner_of(from) {
            Some(partner) => !partners.insert(partner),
            None => record.contains(to),
        };
        if duplicate {
            engine.destroy_bonded(id)?;
            destroyed += 1;
        } else {
            engine.set_bonded(id, record.replaced(from, to))?;
        }
    }

    debug!(?from, ?to, destroyed, "transferred bonded records");
    Ok(destroyed)
}
