//! OCEANDATA: reader/writer for precomputed ocean field files.
//!
//! A file holds a stack of equally sized square layers. Each layer is a
//! `grid_size x grid_size` grid of [`Vec4f`] records; the file stores every
//! displacement layer first, then every normal layer.
//!
//! File layout (little-endian, no magic, no version):
//!   00  : i32     layer_count  (>= 1)
//!   04  : i32     grid_size    (>= 2)
//!   08  : layer_count * grid_size^2 * Vec4f   displacement
//!   ..  : layer_count * grid_size^2 * Vec4f   normal
//!
//! Within a block records are ordered by layer, then row (y), then column
//! (x), so record `x + y * grid_size` of a layer is cell `(x, y)`.
//!
//! Vec4f: 4 x f32 (x, y, z, w), 16 bytes. The `w` lane is carried through
//! unchanged but has no geometric meaning.
//!
//! The [`mesh`] module turns one layer into a [`GridMesh`].

mod error;
pub mod mesh;

pub use error::{OceanError, OceanResult};
pub use mesh::{build_grid_mesh, Bounds, GridMesh, MeshOptions, MeshVertex, DEFAULT_WORLD_SCALE};

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};

/// Size of the `(layer_count, grid_size)` header.
pub const HEADER_BYTES: usize = 8;

/// Size of one packed [`Vec4f`] record.
pub const RECORD_BYTES: usize = 16;

/// Upper bound on the up-front allocation made from an untrusted header.
const PREALLOC_LIMIT: usize = 64 << 20;

/// One packed field sample.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vec4f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

const _: () = assert!(std::mem::size_of::<Vec4f>() == RECORD_BYTES);

impl Vec4f {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Decode from exactly [`RECORD_BYTES`] little-endian bytes.
    #[inline]
    fn from_le_chunk(b: &[u8]) -> Self {
        let lane = |i: usize| f32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        Self::new(lane(0), lane(4), lane(8), lane(12))
    }

    #[inline]
    pub fn to_le_bytes(self) -> [u8; RECORD_BYTES] {
        let mut out = [0u8; RECORD_BYTES];
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
        out[8..12].copy_from_slice(&self.z.to_le_bytes());
        out[12..16].copy_from_slice(&self.w.to_le_bytes());
        out
    }
}

impl From<[f32; 4]> for Vec4f {
    #[inline]
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Validated file header. Construction guarantees that every derived size
/// fits in `usize` and that both counts fit the on-disk `i32` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OceanHeader {
    layer_count: usize,
    grid_size: usize,
    payload_bytes: usize,
}

impl OceanHeader {
    pub fn new(layer_count: usize, grid_size: usize) -> OceanResult<Self> {
        if layer_count < 1 {
            return Err(OceanError::MalformedHeader(format!(
                "layer count must be at least 1, got {layer_count}"
            )));
        }

        if grid_size < 2 {
            return Err(OceanError::MalformedHeader(format!(
                "grid size must be at least 2, got {grid_size}"
            )));
        }

        if i32::try_from(layer_count).is_err() || i32::try_from(grid_size).is_err() {
            return Err(OceanError::MalformedHeader(format!(
                "{layer_count} layers of {grid_size}x{grid_size} do not fit the i32 header"
            )));
        }

        let payload_bytes = grid_size
            .checked_mul(grid_size)
            .and_then(|n| n.checked_mul(layer_count))
            .and_then(|n| n.checked_mul(2 * RECORD_BYTES))
            .filter(|n| n.checked_add(HEADER_BYTES).is_some())
            .ok_or_else(|| {
                OceanError::MalformedHeader(format!(
                    "{layer_count} layers of {grid_size}x{grid_size} overflow the addressable size"
                ))
            })?;

        Ok(Self {
            layer_count,
            grid_size,
            payload_bytes,
        })
    }

    /// Validate the raw signed values as they appear on disk.
    fn from_raw(layer_count: i32, grid_size: i32) -> OceanResult<Self> {
        if layer_count < 0 || grid_size < 0 {
            return Err(OceanError::MalformedHeader(format!(
                "negative header field: layer count {layer_count}, grid size {grid_size}"
            )));
        }

        Self::new(layer_count as usize, grid_size as usize)
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    #[inline]
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Records in one layer (`grid_size^2`).
    #[inline]
    pub fn records_per_layer(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// Records in one block (displacement or normal) across all layers.
    #[inline]
    pub fn records_per_block(&self) -> usize {
        self.records_per_layer() * self.layer_count
    }

    /// Bytes following the header.
    #[inline]
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Total encoded file size.
    #[inline]
    pub fn byte_len(&self) -> usize {
        HEADER_BYTES + self.payload_bytes
    }
}

/// Borrowed displacement/normal pair for one layer.
#[derive(Debug, Clone, Copy)]
pub struct LayerRef<'a> {
    pub index: usize,
    pub displacement: &'a [Vec4f],
    pub normal: &'a [Vec4f],
}

/// A fully decoded ocean data file.
#[derive(Debug, Clone, PartialEq)]
pub struct OceanDataFile {
    header: OceanHeader,
    displacement: Vec<Vec4f>,
    normal: Vec<Vec4f>,
}

impl OceanDataFile {
    /// Assemble a file from layer-major record blocks.
    pub fn new(
        layer_count: usize,
        grid_size: usize,
        displacement: Vec<Vec4f>,
        normal: Vec<Vec4f>,
    ) -> OceanResult<Self> {
        let header = OceanHeader::new(layer_count, grid_size)?;
        let expected = header.records_per_block();

        if displacement.len() != expected {
            return Err(OceanError::ShapeMismatch {
                what: "displacement block",
                expected,
                actual: displacement.len(),
            });
        }

        if normal.len() != expected {
            return Err(OceanError::ShapeMismatch {
                what: "normal block",
                expected,
                actual: normal.len(),
            });
        }

        Ok(Self {
            header,
            displacement,
            normal,
        })
    }

    #[inline]
    pub fn header(&self) -> OceanHeader {
        self.header
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.header.layer_count
    }

    #[inline]
    pub fn grid_size(&self) -> usize {
        self.header.grid_size
    }

    /// All displacement records, layer-major.
    #[inline]
    pub fn displacement(&self) -> &[Vec4f] {
        &self.displacement
    }

    /// All normal records, layer-major.
    #[inline]
    pub fn normal(&self) -> &[Vec4f] {
        &self.normal
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.header.byte_len()
    }

    pub fn layer(&self, index: usize) -> OceanResult<LayerRef<'_>> {
        if index >= self.header.layer_count {
            return Err(OceanError::IndexOutOfRange {
                index,
                layer_count: self.header.layer_count,
            });
        }

        let per_layer = self.header.records_per_layer();
        let range = index * per_layer..(index + 1) * per_layer;

        Ok(LayerRef {
            index,
            displacement: &self.displacement[range.clone()],
            normal: &self.normal[range],
        })
    }

    pub fn layers(&self) -> impl Iterator<Item = LayerRef<'_>> + '_ {
        let per_layer = self.header.records_per_layer();

        self.displacement
            .chunks_exact(per_layer)
            .zip(self.normal.chunks_exact(per_layer))
            .enumerate()
            .map(|(index, (displacement, normal))| LayerRef {
                index,
                displacement,
                normal,
            })
    }

    /// Build the surface mesh for `options.layer`.
    pub fn build_mesh(&self, options: &MeshOptions) -> OceanResult<GridMesh> {
        let layer = self.layer(options.layer)?;
        build_grid_mesh(
            layer.displacement,
            layer.normal,
            self.header.grid_size,
            options.world_scale,
        )
    }
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> OceanResult<()> {
    if buf.len() < want {
        Err(OceanError::Truncated {
            expected: want as u64,
            actual: buf.len() as u64,
        })
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> OceanResult<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_i32(buf: &mut &[u8]) -> OceanResult<i32> {
    let b = take(buf, 4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Decode a tightly packed record block.
fn decode_records(raw: &[u8]) -> Vec<Vec4f> {
    #[cfg(target_endian = "little")]
    {
        // Zero-copy reinterpret when the block happens to be 4-aligned.
        if let Ok(records) = bytemuck::try_cast_slice::<u8, Vec4f>(raw) {
            return records.to_vec();
        }
    }

    raw.chunks_exact(RECORD_BYTES)
        .map(Vec4f::from_le_chunk)
        .collect()
}

/// Parse only the header from the start of `p`.
pub fn read_header(mut p: &[u8]) -> OceanResult<OceanHeader> {
    need(p, HEADER_BYTES)?;

    let layer_count = le_i32(&mut p)?;
    let grid_size = le_i32(&mut p)?;
    OceanHeader::from_raw(layer_count, grid_size)
}

/// Parse a file from a contiguous byte slice. This is the single source of truth for parsing.
///
/// Bytes past the declared payload are ignored.
pub fn parse_ocean_bytes(bytes: &[u8]) -> OceanResult<OceanDataFile> {
    let header = read_header(bytes)?;
    need(bytes, header.byte_len())?;

    let block_bytes = header.records_per_block() * RECORD_BYTES;
    let mut p = &bytes[HEADER_BYTES..];

    let displacement = decode_records(take(&mut p, block_bytes)?);
    let normal = decode_records(take(&mut p, block_bytes)?);

    Ok(OceanDataFile {
        header,
        displacement,
        normal,
    })
}

/// Decode a file from any byte stream.
///
/// Reads exactly the number of bytes the header declares; anything after
/// that is left unread in `reader`.
pub fn decode_ocean_data<R: Read>(mut reader: R) -> OceanResult<OceanDataFile> {
    let mut bytes = Vec::with_capacity(HEADER_BYTES);
    reader
        .by_ref()
        .take(HEADER_BYTES as u64)
        .read_to_end(&mut bytes)?;

    let header = read_header(&bytes)?;

    bytes.reserve(header.payload_bytes().min(PREALLOC_LIMIT));
    reader
        .take(header.payload_bytes() as u64)
        .read_to_end(&mut bytes)?;

    parse_ocean_bytes(&bytes)
}

/// Fast path: prefer mmap; fall back to a buffered read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> OceanResult<OceanDataFile> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_ocean_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> OceanResult<OceanDataFile> {
    let file = File::open(path)?;
    decode_ocean_data(io::BufReader::new(file))
}

/// Encode into a fresh buffer of exactly [`OceanDataFile::byte_len`] bytes.
pub fn encode_ocean_data(data: &OceanDataFile) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.byte_len());

    out.extend_from_slice(&(data.header.layer_count as i32).to_le_bytes());
    out.extend_from_slice(&(data.header.grid_size as i32).to_le_bytes());

    for block in [&data.displacement, &data.normal] {
        for record in block.iter() {
            out.extend_from_slice(&record.to_le_bytes());
        }
    }

    out
}

pub fn write_ocean_data<W: Write>(mut w: W, data: &OceanDataFile) -> OceanResult<()> {
    write_i32(&mut w, data.header.layer_count as i32)?;
    write_i32(&mut w, data.header.grid_size as i32)?;

    write_records(&mut w, &data.displacement)?;
    write_records(&mut w, &data.normal)?;

    w.flush()?;

    Ok(())
}

pub fn write_file<P: AsRef<Path>>(path: P, data: &OceanDataFile) -> OceanResult<()> {
    let file = File::create(path)?;
    write_ocean_data(BufWriter::new(file), data)
}

#[inline]
fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[cfg(target_endian = "little")]
#[inline]
fn write_records<W: Write>(w: &mut W, records: &[Vec4f]) -> io::Result<()> {
    w.write_all(bytemuck::cast_slice(records))
}

#[cfg(not(target_endian = "little"))]
fn write_records<W: Write>(w: &mut W, records: &[Vec4f]) -> io::Result<()> {
    for record in records {
        w.write_all(&record.to_le_bytes())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(layer_count: usize, grid_size: usize) -> OceanDataFile {
        let n = layer_count * grid_size * grid_size;
        let displacement = (0..n)
            .map(|i| Vec4f::new(i as f32, -(i as f32), 0.5 * i as f32, 7.0))
            .collect();
        let normal = (0..n)
            .map(|i| Vec4f::new(0.0, 1.0, i as f32 * 0.01, -1.0))
            .collect();

        OceanDataFile::new(layer_count, grid_size, displacement, normal).unwrap()
    }

    fn raw_header(layer_count: i32, grid_size: i32) -> Vec<u8> {
        let mut out = layer_count.to_le_bytes().to_vec();
        out.extend_from_slice(&grid_size.to_le_bytes());
        out
    }

    /// Hands out at most three bytes per read call.
    struct Dribble<'a>(&'a [u8]);

    impl Read for Dribble<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn encoded_size_matches_header_formula() {
        let data = sample(3, 4);
        let bytes = encode_ocean_data(&data);

        assert_eq!(bytes.len(), 8 + 2 * 3 * 16 * 16);
        assert_eq!(bytes.len(), data.byte_len());
    }

    #[test]
    fn parse_round_trips_encoded_bytes() {
        let data = sample(2, 3);
        let parsed = parse_ocean_bytes(&encode_ocean_data(&data)).unwrap();

        assert_eq!(parsed, data);
    }

    #[test]
    fn parse_handles_misaligned_input() {
        let data = sample(1, 2);
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&encode_ocean_data(&data));

        let parsed = parse_ocean_bytes(&shifted[1..]).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn stream_decode_with_short_reads() {
        let data = sample(2, 5);
        let bytes = encode_ocean_data(&data);

        let decoded = decode_ocean_data(Dribble(&bytes)).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn stream_decode_leaves_trailing_bytes_unread() {
        let data = sample(1, 2);
        let mut bytes = encode_ocean_data(&data);
        bytes.extend_from_slice(b"tail");

        let mut cursor = io::Cursor::new(bytes);
        let decoded = decode_ocean_data(&mut cursor).unwrap();
        assert_eq!(decoded, data);

        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"tail");
    }

    #[test]
    fn header_rejects_zero_layers() {
        let err = read_header(&raw_header(0, 4)).unwrap_err();
        assert!(matches!(err, OceanError::MalformedHeader(_)));
    }

    #[test]
    fn header_rejects_negative_values() {
        assert!(matches!(
            read_header(&raw_header(-1, 4)),
            Err(OceanError::MalformedHeader(_))
        ));
        assert!(matches!(
            read_header(&raw_header(1, -8)),
            Err(OceanError::MalformedHeader(_))
        ));
    }

    #[test]
    fn header_rejects_single_cell_grid() {
        let err = read_header(&raw_header(1, 1)).unwrap_err();
        assert!(matches!(err, OceanError::MalformedHeader(_)));
    }

    #[test]
    fn short_header_is_truncated() {
        let err = read_header(&[1, 0, 0, 0, 2]).unwrap_err();
        assert!(matches!(
            err,
            OceanError::Truncated {
                expected: 8,
                actual: 5
            }
        ));
    }

    #[test]
    fn header_truncation_counts_from_buffer_start() {
        for len in 0..HEADER_BYTES {
            let bytes = raw_header(1, 2);
            let err = read_header(&bytes[..len]).unwrap_err();
            let message = err.to_string();

            assert!(
                matches!(err, OceanError::Truncated { expected: 8, actual } if actual == len as u64),
                "len={len}: {message}"
            );
            assert!(message.contains("header declares 8 bytes"), "{message}");
        }
    }

    #[test]
    fn empty_stream_is_truncated() {
        let err = decode_ocean_data(io::empty()).unwrap_err();
        assert!(matches!(err, OceanError::Truncated { actual: 0, .. }));
    }

    #[test]
    fn missing_normal_block_is_truncated() {
        let data = sample(1, 3);
        let bytes = encode_ocean_data(&data);
        let cut = HEADER_BYTES + 9 * RECORD_BYTES;

        let err = decode_ocean_data(&bytes[..cut]).unwrap_err();
        match err {
            OceanError::Truncated { expected, actual } => {
                assert_eq!(expected, bytes.len() as u64);
                assert_eq!(actual, cut as u64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn huge_header_fails_without_allocating_payload() {
        let err = decode_ocean_data(raw_header(i32::MAX, i32::MAX).as_slice()).unwrap_err();
        assert!(matches!(
            err,
            OceanError::MalformedHeader(_) | OceanError::Truncated { .. }
        ));
    }

    #[test]
    fn new_rejects_wrong_block_length() {
        let err = OceanDataFile::new(1, 2, vec![Vec4f::ZERO; 4], vec![Vec4f::ZERO; 3]).unwrap_err();
        assert!(matches!(
            err,
            OceanError::ShapeMismatch {
                what: "normal block",
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn layer_slices_follow_layer_major_order() {
        let data = sample(3, 2);
        let layer = data.layer(2).unwrap();

        assert_eq!(layer.index, 2);
        assert_eq!(layer.displacement.len(), 4);
        assert_eq!(layer.displacement[0].x, 8.0);
        assert_eq!(layer.normal[3].z, 11.0 * 0.01);
        assert_eq!(data.layers().count(), 3);
    }

    #[test]
    fn layer_out_of_range() {
        let data = sample(2, 2);
        let err = data.layer(2).unwrap_err();
        assert!(matches!(
            err,
            OceanError::IndexOutOfRange {
                index: 2,
                layer_count: 2
            }
        ));
    }

    #[test]
    fn writer_matches_encoder() {
        let data = sample(2, 3);
        let mut written = Vec::new();
        write_ocean_data(&mut written, &data).unwrap();

        assert_eq!(written, encode_ocean_data(&data));
    }

    #[test]
    fn nan_and_infinity_pass_through() {
        let mut displacement = vec![Vec4f::ZERO; 4];
        displacement[1] = Vec4f::new(f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 0.0);
        let data = OceanDataFile::new(1, 2, displacement, vec![Vec4f::ZERO; 4]).unwrap();

        let parsed = parse_ocean_bytes(&encode_ocean_data(&data)).unwrap();
        let r = parsed.displacement()[1];
        assert!(r.x.is_nan());
        assert_eq!(r.y, f32::INFINITY);
        assert_eq!(r.z, f32::NEG_INFINITY);
    }
}
