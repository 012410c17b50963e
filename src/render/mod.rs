mod camera;
mod gpu;
mod headless;
pub mod pick;

pub use camera::{CameraRig, CameraState, MoveAction, MAX_STEP_SECONDS, PITCH_LIMIT};
pub use gpu::WgpuBackend;
pub use headless::{BackendStats, HeadlessBackend, HeadlessMesh};
pub use pick::{InteractionRaycaster, PickHit, PickTarget, PickView, Ray, ScreenBounds};

use crate::scene::{ImageData, MeshData, SceneLights};
use glam::{Mat4, Vec3};

/// wgpu's default `max_texture_dimension_2d`.
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Opaque id of a mesh living in a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub(crate) u64);

/// Opaque id of a texture living in a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create GPU surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter found")]
    AdapterUnavailable,
    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("mesh '{0}' has no triangles")]
    EmptyMesh(String),
    #[error("texture has invalid size {width}x{height} for {len} bytes")]
    InvalidTexture { width: u32, height: u32, len: usize },
    #[error("texture {width}x{height} exceeds the {max}px device limit")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
    #[error("unknown mesh {0:?}")]
    UnknownMesh(MeshHandle),
    #[error("render target detached")]
    Detached,
}

/// Everything a backend needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameDesc<'a> {
    pub view_proj: Mat4,
    pub camera_position: Vec3,
    pub lights: &'a SceneLights,
    pub clear_color: [f64; 4],
    pub draws: &'a [MeshHandle],
}

/// GPU resource ownership seam. A backend exclusively owns its device,
/// surface and every buffer/texture it hands out a handle for.
pub trait RenderBackend {
    /// Uploads geometry and per-object constants. `mesh.texture` is ignored;
    /// textures are uploaded separately and bound with [`Self::set_mesh_texture`].
    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, RenderError>;

    /// Fails with [`RenderError::TextureTooLarge`] past [`Self::max_texture_dimension`].
    fn upload_texture(&mut self, image: &ImageData) -> Result<TextureHandle, RenderError>;

    /// Largest width or height a texture may have.
    fn max_texture_dimension(&self) -> u32;

    /// Binds `texture` to `mesh`, or the plain white texture for `None`.
    fn set_mesh_texture(&mut self, mesh: MeshHandle, texture: Option<TextureHandle>);

    /// Releasing a handle twice, or a handle this backend never issued, is a no-op.
    fn release_mesh(&mut self, mesh: MeshHandle);

    fn release_texture(&mut self, texture: TextureHandle);

    fn resize(&mut self, width: u32, height: u32);

    fn render(&mut self, frame: &FrameDesc<'_>) -> Result<(), RenderError>;

    /// Drops the presentation surface. Called last during dispose.
    fn detach(&mut self);
}

pub(crate) fn validate_image(image: &ImageData, max_dimension: u32) -> Result<(), RenderError> {
    let expected = image.width as usize * image.height as usize * 4;
    if image.width == 0 || image.height == 0 || image.pixels.len() != expected {
        return Err(RenderError::InvalidTexture {
            width: image.width,
            height: image.height,
            len: image.pixels.len(),
        });
    }
    if image.width > max_dimension || image.height > max_dimension {
        return Err(RenderError::TextureTooLarge {
            width: image.width,
            height: image.height,
            max: max_dimension,
        });
    }
    Ok(())
}
