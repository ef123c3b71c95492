//! Color and normal synthesis for built chunks.
//!
//! Runs synchronously on the coordinator's thread, one chunk at a time, so
//! the per-frame cost can be bounded by a deadline.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use glam::{DVec3, Vec3};
use regolith_cubesphere::{CubeFace, FaceDirection};
use regolith_lod::Body;

use crate::TerrainError;

/// One-dimensional color lookup table indexed by normalized elevation.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorRamp {
    texels: Vec<[u8; 4]>,
}

impl ColorRamp {
    /// Interpolate `stops` (position in `[0, 1]`, color) into `width` texels.
    pub fn from_gradient(stops: &[(f32, [u8; 4])], width: usize) -> Result<Self, TerrainError> {
        if stops.is_empty() {
            return Err(TerrainError::ColorRamp("gradient has no stops".into()));
        }
        if width < 2 {
            return Err(TerrainError::ColorRamp(format!("width {width} is below 2")));
        }
        if stops.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(TerrainError::ColorRamp("stops are not sorted".into()));
        }

        let texels = (0..width)
            .map(|i| {
                let t = i as f32 / (width - 1) as f32;
                let upper = stops.iter().position(|s| s.0 >= t).unwrap_or(stops.len() - 1);
                if upper == 0 {
                    return stops[0].1;
                }
                let (t0, c0) = stops[upper - 1];
                let (t1, c1) = stops[upper];
                if t > t1 || t1 <= t0 {
                    return c1;
                }
                lerp_color(c0, c1, (t - t0) / (t1 - t0))
            })
            .collect();
        Ok(Self { texels })
    }

    /// Use a row of tightly packed RGBA8 pixels as the table.
    pub fn from_rgba_row(bytes: &[u8]) -> Result<Self, TerrainError> {
        if bytes.len() < 4 || bytes.len() % 4 != 0 {
            return Err(TerrainError::ColorRamp(format!(
                "{} bytes is not a whole number of RGBA pixels",
                bytes.len()
            )));
        }
        let texels = bytes
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]])
            .collect();
        Ok(Self { texels })
    }

    /// Load the first row of a PNG image.
    pub fn load_png(path: &Path) -> Result<Self, TerrainError> {
        let mut decoder = png::Decoder::new(BufReader::new(File::open(path)?));
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|e| TerrainError::ColorRamp(e.to_string()))?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| TerrainError::ColorRamp(e.to_string()))?;
        let row = &buf[..info.line_size];

        let rgba: Vec<u8> = match info.color_type {
            png::ColorType::Rgba => row.to_vec(),
            png::ColorType::Rgb => row
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            png::ColorType::GrayscaleAlpha => row
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            png::ColorType::Grayscale => row.iter().flat_map(|&g| [g, g, g, 255]).collect(),
            other => {
                return Err(TerrainError::ColorRamp(format!(
                    "unsupported color type {other:?}"
                )));
            }
        };
        tracing::debug!(path = %path.display(), width = info.width, "color ramp loaded");
        Self::from_rgba_row(&rgba)
    }

    /// Linearly filtered color at `t`, clamped to `[0, 1]`.
    pub fn sample(&self, t: f64) -> [u8; 4] {
        let last = self.texels.len() - 1;
        let x = t.clamp(0.0, 1.0) * last as f64;
        let i = (x.floor() as usize).min(last);
        let j = (i + 1).min(last);
        lerp_color(self.texels[i], self.texels[j], (x - i as f64) as f32)
    }

    /// Number of texels.
    pub fn len(&self) -> usize {
        self.texels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }
}

fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    std::array::from_fn(|k| (a[k] as f32 + (b[k] as f32 - a[k] as f32) * t).round() as u8)
}

/// Read-only view of a chunk whose geometry has arrived.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceInput<'a> {
    pub face: CubeFace,
    /// World anchor the positions are relative to.
    pub origin: DVec3,
    /// Quads per edge; positions form a `(resolution + 1)^2` grid.
    pub resolution: u32,
    pub positions: &'a [[f32; 3]],
    /// Surface samples one step past each edge, laid out as
    /// [`crate::ChunkGeometry::apron`]. Empty means border normals fall back
    /// to one-sided differences.
    pub apron: &'a [[f32; 3]],
    pub body: &'a Body,
}

/// Per-vertex normals and colors for one chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceData {
    pub normals: Vec<[f32; 3]>,
    pub colors: Vec<[u8; 4]>,
}

/// Produces normals and colors from a chunk's positions.
///
/// Implementations must return exactly one normal and one color per position.
pub trait SurfaceSynthesizer: Send {
    fn synthesize(
        &self,
        input: &SurfaceInput<'_>,
        ramp: &ColorRamp,
    ) -> Result<SurfaceData, TerrainError>;
}

/// Grid normals from central differences, colors from elevation through the ramp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampSurfaceSynthesizer {
    /// Elevation mapped to the start of the ramp.
    pub min_elevation: f64,
    /// Elevation mapped to the end of the ramp.
    pub max_elevation: f64,
}

impl RampSurfaceSynthesizer {
    /// Spread the ramp over `±displacement_weight`, the nominal range of a
    /// height source returning values in `[-1, 1]`.
    pub fn for_body(body: &Body) -> Self {
        let span = if body.displacement_weight > 0.0 {
            body.displacement_weight
        } else {
            1.0
        };
        Self {
            min_elevation: -span,
            max_elevation: span,
        }
    }
}

impl SurfaceSynthesizer for RampSurfaceSynthesizer {
    fn synthesize(
        &self,
        input: &SurfaceInput<'_>,
        ramp: &ColorRamp,
    ) -> Result<SurfaceData, TerrainError> {
        let side = input.resolution as usize + 1;
        if input.positions.len() != side * side {
            return Err(TerrainError::Synthesis(format!(
                "{} positions for resolution {}",
                input.positions.len(),
                input.resolution
            )));
        }
        if !input.apron.is_empty() && input.apron.len() != crate::apron_len(input.resolution) {
            return Err(TerrainError::Synthesis(format!(
                "{} apron samples for resolution {}",
                input.apron.len(),
                input.resolution
            )));
        }
        if !(self.max_elevation > self.min_elevation) {
            return Err(TerrainError::Synthesis("empty elevation range".into()));
        }

        let last = side as isize - 1;
        let at = |x: isize, y: isize| {
            let outside = if y > last {
                Some((FaceDirection::North, x))
            } else if y < 0 {
                Some((FaceDirection::South, x))
            } else if x > last {
                Some((FaceDirection::East, y))
            } else if x < 0 {
                Some((FaceDirection::West, y))
            } else {
                None
            };
            match outside {
                Some((dir, i)) if !input.apron.is_empty() => {
                    let i = i.clamp(0, last) as usize;
                    Vec3::from_array(input.apron[dir.index() * side + i])
                }
                _ => {
                    let (x, y) = (x.clamp(0, last) as usize, y.clamp(0, last) as usize);
                    Vec3::from_array(input.positions[y * side + x])
                }
            }
        };
        let range = self.max_elevation - self.min_elevation;
        let mut normals = Vec::with_capacity(side * side);
        let mut colors = Vec::with_capacity(side * side);

        for y in 0..=last {
            for x in 0..=last {
                let p = at(x, y);
                let du = at(x + 1, y) - at(x - 1, y);
                let dv = at(x, y + 1) - at(x, y - 1);
                let world = input.origin + p.as_dvec3();
                let outward = world.normalize_or_zero().as_vec3();

                let mut n = du.cross(dv).normalize_or_zero();
                if n == Vec3::ZERO {
                    n = outward;
                } else if n.dot(outward) < 0.0 {
                    n = -n;
                }
                normals.push(n.to_array());

                let elevation = input.body.elevation(world);
                colors.push(ramp.sample((elevation - self.min_elevation) / range));
            }
        }

        Ok(SurfaceData { normals, colors })
    }
}
