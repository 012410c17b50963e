mod grid;
mod mesh;

pub use grid::ground_grid;
pub use mesh::{ImageData, MeshData, Vertex};
pub(crate) use mesh::compute_normals;

use crate::config::SceneSettings;
use crate::render::{
    MeshHandle, PickTarget, RenderBackend, RenderError, ScreenBounds, TextureHandle,
};
use glam::{Mat4, Vec3};
use std::collections::HashMap;

/// Ambient plus one directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLights {
    pub ambient: [f32; 3],
    pub sun_direction: [f32; 3],
    pub sun_color: [f32; 3],
}

impl Default for SceneLights {
    fn default() -> Self {
        Self::from(&SceneSettings::default())
    }
}

impl From<&SceneSettings> for SceneLights {
    fn from(settings: &SceneSettings) -> Self {
        let direction = Vec3::from(settings.sun_direction).normalize_or_zero();
        let direction = if direction == Vec3::ZERO { Vec3::NEG_Y } else { direction };
        Self {
            ambient: settings.ambient,
            sun_direction: direction.to_array(),
            sun_color: settings.sun_color,
        }
    }
}

/// A group of model meshes that together form one screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSlot {
    pub name: String,
    /// Numeric suffix of the node name, if any.
    pub order: Option<u32>,
    /// Indices into [`LoadedModel::meshes`].
    pub meshes: Vec<usize>,
    pub transform: Mat4,
}

/// CPU result of parsing a scene asset, ready to be attached in one step.
#[derive(Debug, Clone, Default)]
pub struct LoadedModel {
    pub source: String,
    pub meshes: Vec<MeshData>,
    /// Sorted: slot `i` shows image `i`.
    pub screens: Vec<ScreenSlot>,
}

impl LoadedModel {
    pub fn enable_shadows(&mut self) {
        for mesh in &mut self.meshes {
            mesh.cast_shadows = true;
            mesh.receive_shadows = true;
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(MeshData::triangle_count).sum()
    }
}

#[derive(Debug, Clone)]
pub struct InteractiveScreen {
    pub index: usize,
    pub name: String,
    pub transform: Mat4,
    pub bounds: ScreenBounds,
    /// Position of the exhibited item in the host's list.
    pub payload: usize,
    pub meshes: Vec<MeshHandle>,
    pub texture: Option<TextureHandle>,
}

#[derive(Debug)]
struct AttachedModel {
    source: String,
    meshes: Vec<MeshHandle>,
    /// Base color textures shipped inside the model itself.
    own_textures: HashMap<MeshHandle, TextureHandle>,
}

/// Everything one viewer has attached to its backend.
#[derive(Debug, Default)]
pub struct SceneGraph {
    lights: SceneLights,
    environment: Vec<MeshHandle>,
    model: Option<AttachedModel>,
    screens: Vec<InteractiveScreen>,
    images: Vec<Option<ImageData>>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lights(&self) -> &SceneLights {
        &self.lights
    }

    /// Lights and ground grid. Replaces any previous environment.
    pub fn build_environment(
        &mut self,
        backend: &mut dyn RenderBackend,
        settings: &SceneSettings,
    ) -> Result<(), RenderError> {
        for handle in self.environment.drain(..) {
            backend.release_mesh(handle);
        }
        self.lights = SceneLights::from(settings);
        let grid = ground_grid(settings.grid_size, settings.grid_divisions);
        self.environment.push(backend.upload_mesh(&grid)?);
        Ok(())
    }

    /// Uploads every mesh of `model`, then swaps it in for the current one.
    /// On failure nothing changes: partial uploads are released and the old
    /// model stays attached.
    pub fn attach_model(
        &mut self,
        backend: &mut dyn RenderBackend,
        model: LoadedModel,
    ) -> Result<(), RenderError> {
        let mut handles = Vec::with_capacity(model.meshes.len());
        for mesh in &model.meshes {
            match backend.upload_mesh(mesh) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in handles {
                        backend.release_mesh(handle);
                    }
                    return Err(err);
                }
            }
        }

        let mut own_textures = HashMap::new();
        for (mesh, handle) in model.meshes.iter().zip(&handles) {
            let Some(image) = &mesh.texture else {
                continue;
            };
            match upload_image(backend, image) {
                Ok(texture) => {
                    backend.set_mesh_texture(*handle, Some(texture));
                    own_textures.insert(*handle, texture);
                }
                Err(err) => log::warn!("texture of mesh '{}' dropped: {}", mesh.name, err),
            }
        }

        let mut screens = Vec::with_capacity(model.screens.len());
        for (index, slot) in model.screens.iter().enumerate() {
            let triangles: Vec<[Vec3; 3]> = slot
                .meshes
                .iter()
                .filter_map(|&i| model.meshes.get(i))
                .flat_map(MeshData::world_triangles)
                .collect();
            let Some(bounds) = ScreenBounds::from_triangles(triangles) else {
                log::warn!("screen slot '{}' has no geometry, not interactive", slot.name);
                continue;
            };
            screens.push(InteractiveScreen {
                index,
                name: slot.name.clone(),
                transform: slot.transform,
                bounds,
                payload: index,
                meshes: slot.meshes.iter().filter_map(|&i| handles.get(i).copied()).collect(),
                texture: None,
            });
        }

        self.release_model(backend);
        log::info!(
            "attached model {} ({} meshes, {} triangles, {} screens)",
            model.source,
            handles.len(),
            model.triangle_count(),
            screens.len()
        );
        self.model = Some(AttachedModel {
            source: model.source,
            meshes: handles,
            own_textures,
        });
        self.screens = screens;
        self.apply_images(backend);
        Ok(())
    }

    /// Images by screen index; a `None` entry falls back to the texture the
    /// model shipped with, if any.
    /// Kept so a model attached later picks them up.
    pub fn set_images(&mut self, backend: &mut dyn RenderBackend, images: Vec<Option<ImageData>>) {
        self.images = images;
        self.apply_images(backend);
    }

    fn apply_images(&mut self, backend: &mut dyn RenderBackend) {
        let own_textures = self.model.as_ref().map(|m| &m.own_textures);
        for screen in &mut self.screens {
            if let Some(old) = screen.texture.take() {
                backend.release_texture(old);
            }
            let texture = match self.images.get(screen.payload).and_then(Option::as_ref) {
                Some(image) => match upload_image(backend, image) {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        log::warn!("texture for screen {} failed: {}", screen.index, err);
                        None
                    }
                },
                None => None,
            };
            for &mesh in &screen.meshes {
                // Without a host image the screen shows what the model shipped.
                let fallback = own_textures.and_then(|own| own.get(&mesh).copied());
                backend.set_mesh_texture(mesh, texture.or(fallback));
            }
            screen.texture = texture;
        }
    }

    fn release_model(&mut self, backend: &mut dyn RenderBackend) {
        for screen in self.screens.drain(..) {
            if let Some(texture) = screen.texture {
                backend.release_texture(texture);
            }
        }
        if let Some(model) = self.model.take() {
            for texture in model.own_textures.into_values() {
                backend.release_texture(texture);
            }
            for handle in model.meshes {
                backend.release_mesh(handle);
            }
        }
    }

    pub fn draw_list(&self) -> Vec<MeshHandle> {
        let model = self.model.iter().flat_map(|m| m.meshes.iter().copied());
        self.environment.iter().copied().chain(model).collect()
    }

    pub fn screens(&self) -> &[InteractiveScreen] {
        &self.screens
    }

    pub fn pick_targets(&self) -> Vec<PickTarget> {
        self.screens
            .iter()
            .map(|screen| PickTarget {
                index: screen.index,
                bounds: screen.bounds.clone(),
            })
            .collect()
    }

    pub fn model_source(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.source.as_str())
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Releases every mesh and texture this graph owns. Safe to call again.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        self.release_model(backend);
        for handle in self.environment.drain(..) {
            backend.release_mesh(handle);
        }
        self.images.clear();
    }
}

/// Uploads `image`, first shrinking it to what the backend can hold.
fn upload_image(
    backend: &mut dyn RenderBackend,
    image: &ImageData,
) -> Result<TextureHandle, RenderError> {
    match image.fit_within(backend.max_texture_dimension()) {
        Some(fitted) => {
            log::info!(
                "texture {}x{} downscaled to {}x{}",
                image.width,
                image.height,
                fitted.width,
                fitted.height
            );
            backend.upload_texture(&fitted)
        }
        None => backend.upload_texture(image),
    }
}
