use tracing::debug;

use super::MeshEditor;
use crate::error::Result;
use crate::topology::{MeshObj, Removal};

/// Removes a mesh object together with the objects that depend on it.
///
/// See [`crate::topology::Mesh::remove`] for the cascade rules. Particles
/// of removed vertices are destroyed.
pub struct RemoveObject {
    obj: MeshObj,
}

impl RemoveObject {
    /// Creates a new `RemoveObject` operation.
    #[must_use]
    pub fn new(obj: impl Into<MeshObj>) -> Self {
        Self { obj: obj.into() }
    }

    /// Executes the removal.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TopologyError::InvalidHandle`] if the object
    /// is not live.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<Removal> {
        let removal = editor.remove(self.obj)?;
        debug!(obj = ?self.obj, removed = removal.objects.len(), "removed object");
        editor.log_operation("remove", &[self.obj]);
        editor.commit()?;
        Ok(removal)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{MeshError, TopologyError};
    use crate::testing;
    use approx::assert_relative_eq;

    #[test]
    fn removing_a_shared_surface_opens_both_cubes() {
        let mut fx = testing::box_grid(2, 1, 1);
        let interface = fx.mesh.find_interface(fx.bodies[0], fx.bodies[1]).unwrap().unwrap();
        // Each cube keeps five faces, so both survive as open bodies.
        let removal = RemoveObject::new(interface).execute(&mut fx.editor()).unwrap();

        assert_eq!(removal.objects, vec![MeshObj::Surface(interface)]);
        assert_eq!(fx.mesh.num_bodies(), 2);
        assert_eq!(fx.mesh.body(fx.bodies[0]).unwrap().surfaces().len(), 5);
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn removing_a_body_keeps_its_surfaces() {
        let mut fx = testing::box_grid(1, 1, 1);
        let volume = fx.mesh.body(fx.body).unwrap().volume();
        assert_relative_eq!(volume, 1.0, epsilon = 1e-12);

        RemoveObject::new(fx.body).execute(&mut fx.editor()).unwrap();

        assert_eq!(fx.mesh.num_bodies(), 0);
        assert_eq!(fx.mesh.num_surfaces(), 6);
        for s in &fx.surfaces {
            assert!(fx.mesh.surface(*s).unwrap().b1().is_none());
        }
    }

    #[test]
    fn stale_handle_is_reported() {
        let mut fx = testing::tetrahedron();
        RemoveObject::new(fx.body).execute(&mut fx.editor()).unwrap();
        let result = RemoveObject::new(fx.body).execute(&mut fx.editor());
        assert!(matches!(
            result,
            Err(MeshError::Topology(TopologyError::InvalidHandle("body")))
        ));
    }
}
