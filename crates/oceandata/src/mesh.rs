//! Triangulated surface mesh for one ocean layer.
//!
//! Grid cell `(x, y)` becomes vertex `x + y * grid_size`. The stored fields
//! are Z-up, so the second and third record lanes swap places:
//!
//! ```text
//! position = (step * x + d.x, step * y + d.z, d.y)    step = world_scale / (grid_size - 1)
//! normal   = (n.x, n.z, n.y)
//! ```
//!
//! Each cell emits two triangles, `(idx00, idx11, idx10)` then
//! `(idx00, idx01, idx11)`, where `idxRC` is the corner `R` rows down and
//! `C` columns across from the cell origin.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::{OceanError, OceanResult, Vec4f};

/// Physical extent of the grid along X and Y, in world units.
pub const DEFAULT_WORLD_SCALE: f32 = 32.0;

/// Vertex data for the ocean mesh (position + normal).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshOptions {
    /// World units spanned by the grid from the first to the last column.
    pub world_scale: f32,
    /// Which layer of a multi-layer file to mesh.
    pub layer: usize,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            world_scale: DEFAULT_WORLD_SCALE,
            layer: 0,
        }
    }
}

/// Axis-aligned bounding box of the vertex positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridMesh {
    pub grid_size: usize,
    pub vertices: Vec<MeshVertex>,
    pub triangles: Vec<[u32; 3]>,
}

impl GridMesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Flat triangle-list index buffer.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        bytemuck::cast_slice(&self.triangles)
    }

    /// `None` only for a mesh without vertices.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut positions = self.vertices.iter().map(|v| Vec3::from_array(v.position));
        let first = positions.next()?;

        let (min, max) = positions.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));

        Some(Bounds { min, max })
    }
}

#[inline]
fn swap_yz(r: &Vec4f) -> Vec3 {
    Vec3::new(r.x, r.z, r.y)
}

/// Build the surface mesh for one layer.
///
/// `displacement` and `normal` must each hold `grid_size^2` row-major records.
pub fn build_grid_mesh(
    displacement: &[Vec4f],
    normal: &[Vec4f],
    grid_size: usize,
    world_scale: f32,
) -> OceanResult<GridMesh> {
    if grid_size < 2 {
        return Err(OceanError::InvalidGrid(format!(
            "grid size must be at least 2, got {grid_size}"
        )));
    }

    // Every vertex index must be addressable as u32.
    let vertex_count = grid_size
        .checked_mul(grid_size)
        .filter(|n| u32::try_from(n - 1).is_ok())
        .ok_or_else(|| {
            OceanError::InvalidGrid(format!(
                "grid size {grid_size} exceeds 32-bit vertex indexing"
            ))
        })?;

    if displacement.len() != vertex_count {
        return Err(OceanError::ShapeMismatch {
            what: "displacement layer",
            expected: vertex_count,
            actual: displacement.len(),
        });
    }

    if normal.len() != vertex_count {
        return Err(OceanError::ShapeMismatch {
            what: "normal layer",
            expected: vertex_count,
            actual: normal.len(),
        });
    }

    let step = world_scale / (grid_size - 1) as f32;

    let vertices: Vec<MeshVertex> = displacement
        .iter()
        .zip(normal)
        .enumerate()
        .map(|(idx, (d, n))| {
            let x = (idx % grid_size) as f32;
            let y = (idx / grid_size) as f32;

            MeshVertex {
                position: [step * x + d.x, step * y + d.z, d.y],
                normal: swap_yz(n).to_array(),
            }
        })
        .collect();

    let g = grid_size as u32;
    let mut triangles = Vec::with_capacity(2 * (grid_size - 1) * (grid_size - 1));

    for y in 0..g - 1 {
        for x in 0..g - 1 {
            let idx00 = y * g + x;
            let idx01 = idx00 + 1;
            let idx10 = idx00 + g;
            let idx11 = idx10 + 1;

            triangles.push([idx00, idx11, idx10]);
            triangles.push([idx00, idx01, idx11]);
        }
    }

    Ok(GridMesh {
        grid_size,
        vertices,
        triangles,
    })
}
