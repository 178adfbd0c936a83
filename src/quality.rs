use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use tracing::{debug, warn};

use crate::error::{OperationError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};
use crate::operations::{MergeVertices, MeshEditor, ReplaceBody, ReplaceSurface, SplitVertex};
use crate::topology::{BodyId, Mesh, MeshObj, SurfaceId, VertexId};

/// Thresholds of the maintenance passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Adjacent vertices closer than this are merged.
    pub vertex_merge_distance: f64,
    /// Surfaces with a smaller area are replaced by a vertex.
    pub surface_demote_area: f64,
    /// Bodies with a smaller volume are replaced by a vertex.
    pub body_demote_volume: f64,
    /// Length of the edge created by a vertex split.
    pub edge_split_distance: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            vertex_merge_distance: 1e-4,
            surface_demote_area: 1e-4,
            body_demote_volume: 1e-4,
            edge_split_distance: 2e-4,
        }
    }
}

impl QualityConfig {
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for a negative distance or one
    /// not below the edge split distance.
    pub fn set_vertex_merge_distance(&mut self, value: f64) -> Result<()> {
        if value < 0.0 || value >= self.edge_split_distance {
            return Err(invalid(format!(
                "vertex merge distance {value} must be in [0, {})",
                self.edge_split_distance
            )));
        }
        self.vertex_merge_distance = value;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for a negative area.
    pub fn set_surface_demote_area(&mut self, value: f64) -> Result<()> {
        if value < 0.0 {
            return Err(invalid(format!("surface demote area {value} is negative")));
        }
        self.surface_demote_area = value;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for a negative volume.
    pub fn set_body_demote_volume(&mut self, value: f64) -> Result<()> {
        if value < 0.0 {
            return Err(invalid(format!("body demote volume {value} is negative")));
        }
        self.body_demote_volume = value;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] unless the distance is
    /// positive and larger than the vertex merge distance.
    pub fn set_edge_split_distance(&mut self, value: f64) -> Result<()> {
        if value <= 0.0 || value <= self.vertex_merge_distance {
            return Err(invalid(format!(
                "edge split distance {value} must exceed {} and 0",
                self.vertex_merge_distance
            )));
        }
        self.edge_split_distance = value;
        Ok(())
    }

    /// Checks every constraint the setters enforce.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for the first violation.
    pub fn validate(&self) -> Result<()> {
        let mut checked = Self {
            edge_split_distance: f64::INFINITY,
            ..Self::default()
        };
        checked.set_vertex_merge_distance(self.vertex_merge_distance)?;
        checked.set_surface_demote_area(self.surface_demote_area)?;
        checked.set_body_demote_volume(self.body_demote_volume)?;
        checked.set_edge_split_distance(self.edge_split_distance)
    }
}

fn invalid(msg: String) -> crate::error::MeshError {
    OperationError::InvalidInput(msg).into()
}

/// What one [`MeshQuality::run`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub splits: usize,
    pub surfaces_demoted: usize,
    pub merges: usize,
    pub bodies_demoted: usize,
    /// Candidates skipped because they overlapped an earlier edit or were
    /// rejected by the operation.
    pub skipped: usize,
}

impl QualityReport {
    /// Number of edits applied.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.splits + self.surfaces_demoted + self.merges + self.bodies_demoted
    }
}

#[derive(Debug, Clone, Copy)]
enum Repair {
    Split { vertex: VertexId, separation: Vector3 },
    DemoteSurface { surface: SurfaceId, position: Point3 },
    Merge { keep: VertexId, remove: VertexId },
    DemoteBody { body: BodyId, position: Point3 },
}

impl Repair {
    /// Objects the repair reads or rewrites, or `None` if one of them is gone.
    fn footprint(&self, mesh: &Mesh) -> Result<Option<Vec<MeshObj>>> {
        let mut objs: Vec<MeshObj> = Vec::new();
        match *self {
            Self::Split { vertex, .. } => {
                if !mesh.contains_vertex(vertex) {
                    return Ok(None);
                }
                let data = mesh.vertex(vertex)?;
                objs.push(vertex.into());
                objs.extend(data.neighbors().iter().map(|v| MeshObj::from(*v)));
                objs.extend(data.surfaces().iter().map(|s| MeshObj::from(*s)));
            }
            Self::DemoteSurface { surface, .. } => {
                if !mesh.contains_surface(surface) {
                    return Ok(None);
                }
                let data = mesh.surface(surface)?;
                objs.push(surface.into());
                objs.extend(data.vertices().iter().map(|v| MeshObj::from(*v)));
                objs.extend(data.bodies().map(MeshObj::from));
                objs.extend(mesh.connected_surfaces(surface)?.into_iter().map(MeshObj::from));
            }
            Self::Merge { keep, remove } => {
                if !mesh.contains_vertex(keep) || !mesh.contains_vertex(remove) {
                    return Ok(None);
                }
                for v in [keep, remove] {
                    let data = mesh.vertex(v)?;
                    objs.push(v.into());
                    objs.extend(data.neighbors().iter().map(|n| MeshObj::from(*n)));
                    objs.extend(data.surfaces().iter().map(|s| MeshObj::from(*s)));
                }
            }
            Self::DemoteBody { body, .. } => {
                if !mesh.contains_body(body) {
                    return Ok(None);
                }
                objs.push(body.into());
                objs.extend(mesh.body(body)?.surfaces().iter().map(|s| MeshObj::from(*s)));
                objs.extend(mesh.body_vertices(body)?.into_iter().map(MeshObj::from));
                objs.extend(mesh.body_neighbor_bodies(body)?.into_iter().map(MeshObj::from));
            }
        }
        Ok(Some(objs))
    }

    fn apply(&self, editor: &mut MeshEditor<'_>) -> Result<bool> {
        match *self {
            Self::Split { vertex, separation } => {
                Ok(SplitVertex::new(vertex, separation).execute(editor)?.is_some())
            }
            Self::DemoteSurface { surface, position } => {
                ReplaceSurface::new(surface, position).execute(editor)?;
                Ok(true)
            }
            Self::Merge { keep, remove } => {
                MergeVertices::new(keep, remove, 0.5).execute(editor)?;
                Ok(true)
            }
            Self::DemoteBody { body, position } => {
                ReplaceBody::new(body, position).execute(editor)?;
                Ok(true)
            }
        }
    }

    fn tally(&self, report: &mut QualityReport) {
        match self {
            Self::Split { .. } => report.splits += 1,
            Self::DemoteSurface { .. } => report.surfaces_demoted += 1,
            Self::Merge { .. } => report.merges += 1,
            Self::DemoteBody { .. } => report.bodies_demoted += 1,
        }
    }
}

/// Topology maintenance attached to a mesh.
///
/// Runs vertex splits, surface demotion, edge collapse and body demotion in
/// that order. Each pass detects in parallel, then applies sequentially and
/// skips candidates touching an object already edited in the pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshQuality {
    config: QualityConfig,
}

impl MeshQuality {
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] if `config` violates a
    /// threshold constraint.
    pub fn new(config: QualityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Runs every pass on the editor's mesh.
    ///
    /// Per-edit resyncs are suppressed while the pass runs; the mesh is
    /// resynced after each pass that changed it.
    ///
    /// # Errors
    ///
    /// Returns an error if candidate detection or a resync fails. Rejected
    /// repairs are counted as skipped.
    pub fn run(&self, editor: &mut MeshEditor<'_>) -> Result<QualityReport> {
        editor.mesh_mut().set_quality_working(true);
        let result = self.run_passes(editor);
        editor.mesh_mut().set_quality_working(false);
        let report = result?;
        if report.applied() > 0 || report.skipped > 0 {
            debug!(?report, "mesh quality pass");
        }
        Ok(report)
    }

    fn run_passes(&self, editor: &mut MeshEditor<'_>) -> Result<QualityReport> {
        let mut report = QualityReport::default();

        let forces = particle_forces(editor)?;
        let splits = self.split_candidates(editor.mesh(), &forces)?;
        apply_pass(editor, &splits, &mut report)?;

        let demotions = self.surface_candidates(editor.mesh());
        apply_pass(editor, &demotions, &mut report)?;

        let merges = self.merge_candidates(editor.mesh())?;
        apply_pass(editor, &merges, &mut report)?;

        let bodies = self.body_candidates(editor.mesh());
        apply_pass(editor, &bodies, &mut report)?;

        Ok(report)
    }

    fn split_candidates(
        &self,
        mesh: &Mesh,
        forces: &SecondaryMap<VertexId, Vector3>,
    ) -> Result<Vec<Repair>> {
        let vertices = mesh.vertex_ids();
        let found: Vec<Option<Repair>> = vertices
            .par_iter()
            .map(|v| self.split_test(mesh, forces, *v))
            .collect::<Result<_>>()?;
        Ok(found.into_iter().flatten().collect())
    }

    /// Splits `v` when the forces on its neighbors, relative to its own,
    /// pull the two sides of the cut plane apart.
    #[allow(clippy::cast_precision_loss)]
    fn split_test(
        &self,
        mesh: &Mesh,
        forces: &SecondaryMap<VertexId, Vector3>,
        v: VertexId,
    ) -> Result<Option<Repair>> {
        let data = mesh.vertex(v)?;
        if data.surfaces().len() < 4 {
            return Ok(None);
        }
        let force_of = |u: &VertexId| forces.get(*u).copied().unwrap_or_else(Vector3::zeros);
        let own = force_of(&v);

        let neighbors = data.neighbors();
        let relative = neighbors.iter().map(force_of).sum::<Vector3>() - own * neighbors.len() as f64;
        let norm = relative.norm();
        if norm < TOLERANCE {
            return Ok(None);
        }
        let separation = relative / norm * self.config.edge_split_distance;

        let Some(plan) = SplitVertex::new(v, separation).plan(mesh)? else {
            return Ok(None);
        };
        if plan.old_side.len() < 2 || plan.new_side.len() < 2 {
            return Ok(None);
        }
        let side_force = |side: &[VertexId]| {
            side.iter().map(force_of).sum::<Vector3>() - own * (0.5 * side.len() as f64)
        };
        let apart = separation.dot(&side_force(&plan.old_side)) < 0.0
            && separation.dot(&side_force(&plan.new_side)) > 0.0;
        Ok(apart.then_some(Repair::Split {
            vertex: v,
            separation,
        }))
    }

    fn surface_candidates(&self, mesh: &Mesh) -> Vec<Repair> {
        let threshold = self.config.surface_demote_area;
        let surfaces: Vec<(SurfaceId, f64, Point3)> = mesh
            .surfaces()
            .map(|(s, data)| (s, data.area(), data.centroid()))
            .collect();
        surfaces
            .par_iter()
            .filter(|(_, area, _)| *area < threshold)
            .map(|(s, _, centroid)| Repair::DemoteSurface {
                surface: *s,
                position: *centroid,
            })
            .collect()
    }

    /// Consecutive vertex pairs closer than the merge distance. An edge shared
    /// by several surfaces is reported once, in the orientation it first
    /// appears.
    fn merge_candidates(&self, mesh: &Mesh) -> Result<Vec<Repair>> {
        let threshold = self.config.vertex_merge_distance;
        let surfaces = mesh.surface_ids();
        let found: Vec<Vec<(VertexId, VertexId)>> = surfaces
            .par_iter()
            .map(|s| -> Result<Vec<(VertexId, VertexId)>> {
                let vertices = mesh.surface(*s)?.vertices();
                let n = vertices.len();
                let mut pairs = Vec::new();
                for i in 0..n {
                    let (a, b) = (vertices[i], vertices[(i + 1) % n]);
                    let distance = (mesh.vertex(a)?.position() - mesh.vertex(b)?.position()).norm();
                    if distance < threshold {
                        pairs.push((a, b));
                    }
                }
                Ok(pairs)
            })
            .collect::<Result<_>>()?;

        let mut seen = HashSet::new();
        Ok(found
            .into_iter()
            .flatten()
            .filter(|(a, b)| seen.insert(((*a).min(*b), (*a).max(*b))))
            .map(|(keep, remove)| Repair::Merge { keep, remove })
            .collect())
    }

    fn body_candidates(&self, mesh: &Mesh) -> Vec<Repair> {
        let threshold = self.config.body_demote_volume;
        let bodies: Vec<(BodyId, f64, Point3)> = mesh
            .bodies()
            .map(|(b, data)| (b, data.volume(), data.centroid()))
            .collect();
        bodies
            .par_iter()
            .filter(|(_, volume, _)| volume.abs() < threshold)
            .map(|(b, _, centroid)| Repair::DemoteBody {
                body: *b,
                position: *centroid,
            })
            .collect()
    }
}

/// Current particle force of every vertex.
fn particle_forces(editor: &MeshEditor<'_>) -> Result<SecondaryMap<VertexId, Vector3>> {
    let mut forces = SecondaryMap::new();
    for (v, data) in editor.mesh().vertices() {
        forces.insert(v, editor.engine().force(data.particle())?);
    }
    Ok(forces)
}

/// Applies `repairs` in order, skipping overlapping or rejected ones, and
/// resyncs once if anything changed.
fn apply_pass(
    editor: &mut MeshEditor<'_>,
    repairs: &[Repair],
    report: &mut QualityReport,
) -> Result<()> {
    let mut touched: HashSet<MeshObj> = HashSet::new();
    let mut changed = false;
    for repair in repairs {
        let Some(footprint) = repair.footprint(editor.mesh())? else {
            report.skipped += 1;
            continue;
        };
        if footprint.iter().any(|obj| touched.contains(obj)) {
            report.skipped += 1;
            continue;
        }
        match repair.apply(editor) {
            Ok(true) => {
                repair.tally(report);
                touched.extend(footprint);
                changed = true;
            }
            Ok(false) => report.skipped += 1,
            Err(err) => {
                warn!(?repair, %err, "quality repair rejected");
                report.skipped += 1;
            }
        }
    }
    if changed {
        editor.resync()?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::ParticleEngine;
    use crate::testing::{self, p};
    use approx::assert_relative_eq;

    fn quality(edit: impl FnOnce(&mut QualityConfig)) -> MeshQuality {
        let mut config = QualityConfig::default();
        edit(&mut config);
        MeshQuality::new(config).unwrap()
    }

    #[test]
    fn config_setters_reject_bad_values() {
        let mut config = QualityConfig::default();
        assert!(config.set_vertex_merge_distance(-1.0).is_err());
        assert!(config.set_vertex_merge_distance(1e-3).is_err());
        assert!(config.set_surface_demote_area(-1.0).is_err());
        assert!(config.set_body_demote_volume(-1e-9).is_err());
        assert!(config.set_edge_split_distance(0.0).is_err());
        assert!(config.set_edge_split_distance(5e-5).is_err());
        assert_eq!(config, QualityConfig::default());

        config.set_edge_split_distance(1e-2).unwrap();
        config.set_vertex_merge_distance(1e-3).unwrap();
        assert!(config.validate().is_ok());

        config.vertex_merge_distance = 1.0;
        assert!(MeshQuality::new(config).is_err());
    }

    #[test]
    fn clean_mesh_is_left_alone() {
        let mut fx = testing::box_grid(2, 1, 1);
        let before = testing::geometry_fingerprint(&fx.mesh);
        let report = MeshQuality::default().run(&mut fx.editor()).unwrap();
        assert_eq!(report, QualityReport::default());
        assert_eq!(testing::geometry_fingerprint(&fx.mesh), before);
        assert!(!fx.mesh.quality_working());
    }

    #[test]
    fn small_surface_demoted_once_per_neighborhood() {
        let mut fx = testing::box_grid(1, 1, 1);
        let report = quality(|c| c.surface_demote_area = 1.5)
            .run(&mut fx.editor())
            .unwrap();

        // Every face qualifies, but they all share the body.
        assert_eq!(report.surfaces_demoted, 1);
        assert_eq!(report.skipped, 5);
        assert_eq!(fx.mesh.num_surfaces(), 5);
        assert_relative_eq!(fx.mesh.body(fx.body).unwrap().volume(), 1.0 / 3.0, epsilon = 1e-9);
        assert!(!fx.mesh.is_dirty());
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn short_edge_collapses() {
        let mut fx = testing::quad_grid(1, 1);
        let v = fx.mesh.find_vertex(&p(1.0, 0.0, 0.0), 1e-9).unwrap();
        let particle = fx.mesh.vertex(v).unwrap().particle();
        fx.engine.set_position(particle, p(5e-5, 0.0, 0.0)).unwrap();
        fx.mesh.position_changed(&mut fx.engine).unwrap();

        let report = MeshQuality::default().run(&mut fx.editor()).unwrap();
        assert_eq!(report.merges, 1);
        assert_eq!(fx.mesh.num_vertices(), 3);
        assert_eq!(fx.engine.len(), 3);
        let survivor = fx.mesh.find_vertex(&p(2.5e-5, 0.0, 0.0), 1e-9);
        assert!(survivor.is_some());
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn short_edge_outside_first_surface_collapses() {
        let mut fx = testing::quad_grid(2, 1);
        let a = fx.mesh.find_vertex(&p(1.0, 0.0, 0.0), 1e-9).unwrap();
        let b = fx.mesh.find_vertex(&p(2.0, 0.0, 0.0), 1e-9).unwrap();
        // The edge a-b lies only in the right quad, the second surface of a.
        assert_eq!(fx.mesh.vertex(a).unwrap().surfaces().len(), 2);
        let particle = fx.mesh.vertex(b).unwrap().particle();
        fx.engine.set_position(particle, p(1.0 + 5e-5, 0.0, 0.0)).unwrap();
        fx.mesh.position_changed(&mut fx.engine).unwrap();

        let report = MeshQuality::default().run(&mut fx.editor()).unwrap();
        assert_eq!(report.merges, 1);
        assert_eq!(fx.mesh.num_vertices(), 5);
        assert!(fx.mesh.find_vertex(&p(1.0 + 2.5e-5, 0.0, 0.0), 1e-9).is_some());
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn shared_short_edge_merges_once() {
        let mut fx = testing::quad_grid(2, 1);
        let top = fx.mesh.find_vertex(&p(1.0, 1.0, 0.0), 1e-9).unwrap();
        let particle = fx.mesh.vertex(top).unwrap().particle();
        fx.engine.set_position(particle, p(1.0, 5e-5, 0.0)).unwrap();
        fx.mesh.position_changed(&mut fx.engine).unwrap();

        let report = MeshQuality::default().run(&mut fx.editor()).unwrap();
        assert_eq!(report.merges, 1);
        assert_eq!(fx.mesh.num_vertices(), 5);
        assert_eq!(fx.mesh.num_surfaces(), 2);
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn vertex_pulled_apart_splits() {
        let mut fx = testing::quad_grid(2, 2);
        let center = fx.mesh.find_vertex(&p(1.0, 1.0, 0.0), 1e-9).unwrap();
        let pulls = [
            (p(2.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            (p(1.0, 2.0, 0.0), Vector3::new(0.0, 1.0, 0.0)),
            (p(0.0, 1.0, 0.0), Vector3::new(-0.5, 0.0, 0.0)),
            (p(1.0, 0.0, 0.0), Vector3::new(0.0, -0.5, 0.0)),
        ];
        for (pos, force) in pulls {
            let v = fx.mesh.find_vertex(&pos, 1e-9).unwrap();
            let particle = fx.mesh.vertex(v).unwrap().particle();
            fx.engine.add_force(particle, force).unwrap();
        }

        let report = MeshQuality::default().run(&mut fx.editor()).unwrap();
        assert_eq!(report.splits, 1);
        assert_eq!(fx.mesh.num_vertices(), 10);

        let moved = fx.mesh.vertex(center).unwrap().position();
        let offset = 1e-4 / 2.0_f64.sqrt();
        assert_relative_eq!(moved, p(1.0 - offset, 1.0 - offset, 0.0), epsilon = 1e-12);
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn balanced_forces_do_not_split() {
        let mut fx = testing::quad_grid(2, 2);
        for (pos, force) in [
            (p(2.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            (p(0.0, 1.0, 0.0), Vector3::new(-1.0, 0.0, 0.0)),
        ] {
            let v = fx.mesh.find_vertex(&pos, 1e-9).unwrap();
            let particle = fx.mesh.vertex(v).unwrap().particle();
            fx.engine.add_force(particle, force).unwrap();
        }
        let report = MeshQuality::default().run(&mut fx.editor()).unwrap();
        assert_eq!(report.splits, 0);
        assert_eq!(fx.mesh.num_vertices(), 9);
    }

    #[test]
    fn small_body_demoted() {
        let mut fx = testing::box_grid(2, 1, 1);
        let report = quality(|c| c.body_demote_volume = 1.5)
            .run(&mut fx.editor())
            .unwrap();

        assert_eq!(report.bodies_demoted, 1);
        assert_eq!(fx.mesh.num_bodies(), 1);
        let (_, survivor) = fx.mesh.bodies().next().unwrap();
        assert_relative_eq!(survivor.volume(), 0.5, epsilon = 1e-9);
        fx.mesh.validate().unwrap();
    }
}
