use super::{
    validate_image, FrameDesc, MeshHandle, RenderBackend, RenderError, TextureHandle,
    DEFAULT_MAX_TEXTURE_DIMENSION,
};
use crate::scene::{ImageData, MeshData};
use std::collections::HashMap;

/// What the headless backend remembers about a live mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessMesh {
    pub name: String,
    pub triangle_count: usize,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub texture: Option<TextureHandle>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub meshes_uploaded: usize,
    pub meshes_released: usize,
    pub textures_uploaded: usize,
    pub textures_released: usize,
    pub frames_rendered: usize,
    /// Releases of handles that were not live.
    pub invalid_releases: usize,
}

/// Backend without a GPU. Tracks handle ownership and frame counts so the
/// viewer can run in tests and in `--headless` mode.
#[derive(Debug)]
pub struct HeadlessBackend {
    next_id: u64,
    meshes: HashMap<MeshHandle, HeadlessMesh>,
    textures: HashMap<TextureHandle, (u32, u32)>,
    max_texture_dimension: u32,
    size: (u32, u32),
    stats: BackendStats,
    last_draws: Vec<MeshHandle>,
    attached: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            next_id: 0,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            size: (0, 0),
            stats: BackendStats::default(),
            last_draws: Vec::new(),
            attached: false,
        }
    }
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            attached: true,
            ..Self::default()
        }
    }

    /// Stands in for a device with a smaller `max_texture_dimension_2d`.
    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = max.max(1);
        self
    }

    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).copied()
    }

    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&HeadlessMesh> {
        self.meshes.get(&handle)
    }

    pub fn meshes(&self) -> impl Iterator<Item = &HeadlessMesh> {
        self.meshes.values()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Handles drawn by the last successful frame.
    pub fn last_draws(&self) -> &[MeshHandle] {
        &self.last_draws
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for HeadlessBackend {
    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, RenderError> {
        if !self.attached {
            return Err(RenderError::Detached);
        }
        if mesh.triangle_count() == 0 {
            return Err(RenderError::EmptyMesh(mesh.name.clone()));
        }
        let handle = MeshHandle(self.next_id());
        self.meshes.insert(
            handle,
            HeadlessMesh {
                name: mesh.name.clone(),
                triangle_count: mesh.triangle_count(),
                cast_shadows: mesh.cast_shadows,
                receive_shadows: mesh.receive_shadows,
                texture: None,
            },
        );
        self.stats.meshes_uploaded += 1;
        Ok(handle)
    }

    fn upload_texture(&mut self, image: &ImageData) -> Result<TextureHandle, RenderError> {
        if !self.attached {
            return Err(RenderError::Detached);
        }
        validate_image(image, self.max_texture_dimension)?;
        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, (image.width, image.height));
        self.stats.textures_uploaded += 1;
        Ok(handle)
    }

    fn set_mesh_texture(&mut self, mesh: MeshHandle, texture: Option<TextureHandle>) {
        let texture = texture.filter(|t| self.textures.contains_key(t));
        if let Some(entry) = self.meshes.get_mut(&mesh) {
            entry.texture = texture;
        }
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.remove(&mesh).is_some() {
            self.stats.meshes_released += 1;
        } else {
            log::warn!("release of unknown mesh {:?} ignored", mesh);
            self.stats.invalid_releases += 1;
        }
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.stats.textures_released += 1;
            for mesh in self.meshes.values_mut() {
                if mesh.texture == Some(texture) {
                    mesh.texture = None;
                }
            }
        } else {
            log::warn!("release of unknown texture {:?} ignored", texture);
            self.stats.invalid_releases += 1;
        }
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn render(&mut self, frame: &FrameDesc<'_>) -> Result<(), RenderError> {
        if !self.attached {
            return Err(RenderError::Detached);
        }
        if let Some(missing) = frame.draws.iter().find(|h| !self.meshes.contains_key(*h)) {
            return Err(RenderError::UnknownMesh(*missing));
        }
        self.last_draws.clear();
        self.last_draws.extend_from_slice(frame.draws);
        self.stats.frames_rendered += 1;
        Ok(())
    }

    fn detach(&mut self) {
        self.attached = false;
        self.last_draws.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneLights;
    use glam::{Mat4, Vec3};

    #[test]
    fn double_release_is_counted_not_applied() {
        let mut backend = HeadlessBackend::new(640, 480);
        let mesh = backend
            .upload_mesh(&MeshData::quad("q", Mat4::IDENTITY, 1.0, 1.0))
            .unwrap();
        backend.release_mesh(mesh);
        backend.release_mesh(mesh);
        let stats = backend.stats();
        assert_eq!(stats.meshes_released, 1);
        assert_eq!(stats.invalid_releases, 1);
        assert_eq!(backend.live_meshes(), 0);
    }

    #[test]
    fn empty_mesh_and_bad_texture_are_rejected() {
        let mut backend = HeadlessBackend::new(640, 480);
        let empty = MeshData::new("empty", Vec::new(), Vec::new());
        assert!(matches!(backend.upload_mesh(&empty), Err(RenderError::EmptyMesh(_))));
        let bad = ImageData {
            width: 2,
            height: 2,
            pixels: vec![0; 3],
        };
        assert!(matches!(
            backend.upload_texture(&bad),
            Err(RenderError::InvalidTexture { .. })
        ));
    }

    #[test]
    fn textures_past_the_device_limit_are_rejected() {
        let mut backend = HeadlessBackend::new(640, 480);
        assert_eq!(backend.max_texture_dimension(), DEFAULT_MAX_TEXTURE_DIMENSION);
        let wide = ImageData {
            width: 9000,
            height: 1,
            pixels: vec![255; 9000 * 4],
        };
        assert!(matches!(
            backend.upload_texture(&wide),
            Err(RenderError::TextureTooLarge { width: 9000, height: 1, max: 8192 })
        ));
        assert_eq!(backend.live_textures(), 0);

        let mut small = HeadlessBackend::new(640, 480).with_max_texture_dimension(2);
        let square = ImageData {
            width: 2,
            height: 2,
            pixels: vec![0; 16],
        };
        let handle = small.upload_texture(&square).unwrap();
        assert_eq!(small.texture_size(handle), Some((2, 2)));
    }

    #[test]
    fn releasing_texture_unbinds_it() {
        let mut backend = HeadlessBackend::new(640, 480);
        let mesh = backend
            .upload_mesh(&MeshData::quad("q", Mat4::IDENTITY, 1.0, 1.0))
            .unwrap();
        let texture = backend.upload_texture(&ImageData::solid([1, 2, 3, 255])).unwrap();
        backend.set_mesh_texture(mesh, Some(texture));
        assert_eq!(backend.mesh(mesh).unwrap().texture, Some(texture));
        backend.release_texture(texture);
        assert_eq!(backend.mesh(mesh).unwrap().texture, None);
    }

    #[test]
    fn render_refuses_dead_handles_and_detached_target() {
        let mut backend = HeadlessBackend::new(640, 480);
        let mesh = backend
            .upload_mesh(&MeshData::quad("q", Mat4::IDENTITY, 1.0, 1.0))
            .unwrap();
        let lights = SceneLights::default();
        let draws = [mesh];
        let frame = FrameDesc {
            view_proj: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            lights: &lights,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            draws: &draws,
        };
        backend.render(&frame).unwrap();
        assert_eq!(backend.last_draws(), &[mesh]);
        backend.release_mesh(mesh);
        assert!(matches!(backend.render(&frame), Err(RenderError::UnknownMesh(_))));
        backend.detach();
        assert!(matches!(backend.render(&frame), Err(RenderError::Detached)));
        assert_eq!(backend.stats().frames_rendered, 1);
    }
}
