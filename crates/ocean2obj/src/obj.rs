//! Wavefront OBJ export for ocean grid meshes.

use anyhow::{Context, Result};
use oceandata::GridMesh;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

/// Write `mesh` as a single OBJ object with per-vertex normals.
///
/// OBJ indices are 1-based; each face references the vertex and the normal
/// of the same index (`f a//a b//b c//c`).
pub fn write_obj<W: Write>(w: &mut W, mesh: &GridMesh, name: &str) -> io::Result<()> {
    writeln!(
        w,
        "# {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    )?;
    writeln!(w, "o {name}")?;

    for vertex in &mesh.vertices {
        let [x, y, z] = vertex.position;
        writeln!(w, "v {x} {y} {z}")?;
    }

    for vertex in &mesh.vertices {
        let [x, y, z] = vertex.normal;
        writeln!(w, "vn {x} {y} {z}")?;
    }

    for triangle in &mesh.triangles {
        let [a, b, c] = triangle.map(|i| u64::from(i) + 1);
        writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}")?;
    }

    Ok(())
}

pub fn write_obj_file(path: &Path, mesh: &GridMesh, name: &str) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    write_obj(&mut writer, mesh, name)?;
    writer.flush()?;

    Ok(())
}
