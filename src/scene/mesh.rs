use glam::{Mat4, Vec3};
use image::imageops::FilterType;

/// Interleaved vertex layout shared by every backend.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    /// A copy scaled down so neither side exceeds `max`, keeping the aspect
    /// ratio. `None` when the image already fits or its pixels are malformed.
    pub fn fit_within(&self, max: u32) -> Option<ImageData> {
        let max = max.max(1);
        if self.width <= max && self.height <= max {
            return None;
        }
        let source = image::ImageBuffer::<image::Rgba<u8>, &[u8]>::from_raw(
            self.width,
            self.height,
            &self.pixels[..],
        )?;
        let scale = max as f64 / self.width.max(self.height) as f64;
        let width = ((self.width as f64 * scale).round() as u32).clamp(1, max);
        let height = ((self.height as f64 * scale).round() as u32).clamp(1, max);
        let resized = image::imageops::resize(&source, width, height, FilterType::Triangle);
        Some(Self {
            width,
            height,
            pixels: resized.into_raw(),
        })
    }
}

/// CPU-side triangle mesh, already placed in world space by `transform`.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub transform: Mat4,
    pub base_color: [f32; 4],
    pub texture: Option<ImageData>,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
}

impl MeshData {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            transform: Mat4::IDENTITY,
            base_color: [1.0, 1.0, 1.0, 1.0],
            texture: None,
            cast_shadows: false,
            receive_shadows: false,
        }
    }

    /// A `width` x `height` quad in the local XY plane facing +Z, centered on
    /// the origin of `transform`. UVs put (0,0) at the top-left corner.
    pub fn quad(name: impl Into<String>, transform: Mat4, width: f32, height: f32) -> Self {
        let hw = width * 0.5;
        let hh = height * 0.5;
        let mut vertices = Vec::with_capacity(4);
        let mut indices = Vec::with_capacity(6);
        push_quad(
            &mut vertices,
            &mut indices,
            [
                Vec3::new(-hw, -hh, 0.0),
                Vec3::new(hw, -hh, 0.0),
                Vec3::new(hw, hh, 0.0),
                Vec3::new(-hw, hh, 0.0),
            ],
            Vec3::Z,
        );
        let mut mesh = Self::new(name, vertices, indices);
        mesh.transform = transform;
        mesh
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangles in world space. Indices pointing past the vertex list are skipped.
    pub fn world_triangles(&self) -> Vec<[Vec3; 3]> {
        let world: Vec<Vec3> = self
            .vertices
            .iter()
            .map(|v| self.transform.transform_point3(Vec3::from(v.position)))
            .collect();
        self.indices
            .chunks_exact(3)
            .filter_map(|tri| {
                Some([
                    *world.get(tri[0] as usize)?,
                    *world.get(tri[1] as usize)?,
                    *world.get(tri[2] as usize)?,
                ])
            })
            .collect()
    }
}

/// Appends a quad given counter-clockwise corners (bottom-left first).
pub(crate) fn push_quad(
    vertices: &mut Vec<Vertex>,
    indices: &mut Vec<u32>,
    corners: [Vec3; 4],
    normal: Vec3,
) {
    const UVS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
    let base = vertices.len() as u32;
    for (corner, uv) in corners.iter().zip(UVS) {
        vertices.push(Vertex {
            position: corner.to_array(),
            normal: normal.to_array(),
            uv,
        });
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Smooth per-vertex normals for meshes that ship without them.
pub(crate) fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let pa = Vec3::from(positions[a]);
        let face = (Vec3::from(positions[b]) - pa).cross(Vec3::from(positions[c]) - pa);
        accum[a] += face;
        accum[b] += face;
        accum[c] += face;
    }
    accum
        .into_iter()
        .map(|n| {
            let n = n.normalize_or_zero();
            if n == Vec3::ZERO {
                [0.0, 1.0, 0.0]
            } else {
                n.to_array()
            }
        })
        .collect()
}
