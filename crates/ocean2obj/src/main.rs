use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use walkdir::WalkDir;

use oceandata::{read_file, MeshOptions, DEFAULT_WORLD_SCALE};

mod obj;

/// `ocean2obj` - convert precomputed ocean field files into Wavefront OBJ meshes.
///
/// Each input file holds a stack of displacement/normal layers; one layer (or
/// every layer with `--all-layers`) is triangulated into a regular grid
/// surface and written next to the others in `--output-dir`.
#[derive(Parser, Debug, Clone)]
#[command(name = "ocean2obj", version, about, long_about = None)]
struct Args {
    /// A single ocean data file, or a directory searched recursively for them.
    #[arg(long, env = "OCEAN_DATA_PATH")]
    input: PathBuf,

    #[arg(long, env = "OCEAN_OBJ_DIR", default_value = "meshes")]
    output_dir: PathBuf,

    /// World units spanned by the grid along X and Y.
    #[arg(long, default_value_t = DEFAULT_WORLD_SCALE, value_parser = parse_world_scale)]
    world_scale: f32,

    /// Layer to export. Ignored with --all-layers.
    #[arg(long, default_value_t = 0)]
    layer: usize,

    /// Export every layer as `<stem>_<layer>.obj`.
    #[arg(long, default_value_t = false)]
    all_layers: bool,

    /// Object name written to the `o` record.
    #[arg(long, default_value = "Ocean")]
    object_name: String,

    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// File extension matched when --input is a directory.
    #[arg(long, default_value = "data")]
    extension: String,
}

fn parse_world_scale(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;

    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("world scale must be a positive finite number, got {s}"))
    }
}

/// Resolve `--input` to the list of files to convert, sorted for stable output.
fn collect_inputs(input: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    if !input.is_dir() {
        bail!("input path {} does not exist", input.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();

    files.sort();
    Ok(files)
}

/// `<out>/<rel>/<stem>.obj`, or `<out>/<rel>/<stem>_<layer>.obj` when every
/// layer is exported. `<rel>` mirrors the input's directory below `input_root`,
/// so same-named files in different subdirectories never share an output.
fn output_path(output_dir: &Path, input_root: &Path, input: &Path, layer: Option<usize>) -> PathBuf {
    let rel_dir = input
        .strip_prefix(input_root)
        .ok()
        .and_then(Path::parent)
        .unwrap_or(Path::new(""));

    let stem = input
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy();

    let dir = output_dir.join(rel_dir);

    match layer {
        Some(layer) => dir.join(format!("{stem}_{layer}.obj")),
        None => dir.join(format!("{stem}.obj")),
    }
}

/// Convert one input file; returns how many OBJ files were written.
fn process_one_file(path: &Path, args: &Args) -> Result<usize> {
    let started = Instant::now();

    let data = read_file(path).with_context(|| format!("failed to decode {}", path.display()))?;

    debug!(
        "{}: {} layer(s) of {}x{}",
        path.display(),
        data.layer_count(),
        data.grid_size(),
        data.grid_size()
    );

    let layers: Vec<usize> = if args.all_layers {
        (0..data.layer_count()).collect()
    } else {
        vec![args.layer]
    };

    let mut written = 0;

    for layer in layers {
        // Reject a bad layer before anything can be skipped.
        data.layer(layer)
            .with_context(|| format!("cannot export layer {layer} of {}", path.display()))?;

        let out_path = output_path(
            &args.output_dir,
            &args.input,
            path,
            args.all_layers.then_some(layer),
        );

        if out_path.exists() && !args.overwrite {
            debug!("Skipping existing file: {}", out_path.display());
            continue;
        }

        let options = MeshOptions {
            world_scale: args.world_scale,
            layer,
        };

        let mesh = data
            .build_mesh(&options)
            .with_context(|| format!("failed to mesh layer {layer} of {}", path.display()))?;

        if let Some(bounds) = mesh.bounds() {
            debug!(
                "Layer {layer} bounds: min={:?} max={:?}",
                bounds.min, bounds.max
            );
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        obj::write_obj_file(&out_path, &mesh, &args.object_name)?;
        written += 1;

        info!(
            "OK {} -> {} ({} verts, {} tris)",
            path.display(),
            out_path.display(),
            mesh.vertex_count(),
            mesh.triangle_count()
        );
    }

    debug!("{} done in {:.2?}", path.display(), started.elapsed());

    Ok(written)
}

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    let inputs = collect_inputs(&args.input, &args.extension)?;

    if inputs.is_empty() {
        warn!("No .{} files found under {}", args.extension, args.input.display());
        return Ok(());
    }

    info!("Processing {} file(s)...", inputs.len());

    // Files are independent; convert them in parallel and report each failure.
    let failures = inputs
        .par_iter()
        .filter(|path| match process_one_file(path, &args) {
            Ok(_) => false,
            Err(err) => {
                warn!("Error processing {}: {:#}", path.display(), err);
                true
            }
        })
        .count();

    if failures > 0 {
        bail!("{failures} of {} file(s) failed", inputs.len());
    }

    Ok(())
}
