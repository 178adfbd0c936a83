use crate::error::{GeometryError, OperationError, Result, TopologyError};
use crate::math::{Matrix3, Vector3, TOLERANCE};
use crate::topology::{Mesh, VertexId};

/// Strain rate of an edge over one step of length `dt`.
///
/// With `r` the relative position and `u` the relative velocity, this is the
/// Green strain of `r` deformed to `r + u * dt`:
/// `(r uᵀ + u rᵀ + r rᵀ |u|² dt / |r|²) * dt / (2 |r|²)`.
fn strain_of(r: &Vector3, u: &Vector3, dt: f64) -> Result<Matrix3> {
    let len2 = r.norm_squared();
    if len2 < TOLERANCE {
        return Err(GeometryError::Degenerate("coincident edge vertices".into()).into());
    }
    let scaled = len2 / dt;
    let nonlinear = u.norm_squared() / scaled;
    let sym = r * u.transpose() + u * r.transpose() + r * r.transpose() * nonlinear;
    Ok(sym * (0.5 / scaled))
}

fn check_dt(dt: f64) -> Result<()> {
    if dt > 0.0 {
        Ok(())
    } else {
        Err(OperationError::InvalidInput(format!("time step {dt} must be positive")).into())
    }
}

/// Strain of the edge from `v1` to `v2`, from the cached vertex snapshots.
///
/// # Errors
///
/// Returns an error if a vertex is not live, the vertices coincide or `dt`
/// is not positive.
pub fn edge_strain(mesh: &Mesh, v1: VertexId, v2: VertexId, dt: f64) -> Result<Matrix3> {
    check_dt(dt)?;
    let a = mesh.vertex(v1)?;
    let b = mesh.vertex(v2)?;
    strain_of(
        &(b.position() - a.position()),
        &(b.velocity() - a.velocity()),
        dt,
    )
}

/// Strain at `v`: a weighted sum of the strains of its edges.
///
/// Edge `i` of `n` has weight `2/n - dᵢ² / Σ d²`, so the weights sum to one
/// and longer edges count less.
///
/// # Errors
///
/// Returns [`TopologyError::InvalidTopology`] if `v` has no neighbors, or the
/// errors of [`edge_strain`].
#[allow(clippy::cast_precision_loss)]
pub fn vertex_strain(mesh: &Mesh, v: VertexId, dt: f64) -> Result<Matrix3> {
    check_dt(dt)?;
    let neighbors = mesh.vertex(v)?.neighbors();
    if neighbors.is_empty() {
        return Err(TopologyError::invalid("vertex is insufficiently connected").into());
    }
    let pos = mesh.vertex(v)?.position();
    let dist2 = neighbors
        .iter()
        .map(|n| Ok((mesh.vertex(*n)?.position() - pos).norm_squared()))
        .collect::<Result<Vec<f64>>>()?;
    let total: f64 = dist2.iter().sum();
    if total < TOLERANCE {
        return Err(GeometryError::Degenerate("neighbors coincide with vertex".into()).into());
    }

    let fact = 2.0 / neighbors.len() as f64;
    let mut result = Matrix3::zeros();
    for (n, d2) in neighbors.iter().zip(&dist2) {
        result += edge_strain(mesh, v, *n, dt)? * (fact - d2 / total);
    }
    Ok(result)
}
