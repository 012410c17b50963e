//! glTF / GLB scene parsing.
//!
//! Flattens the default scene into world-space [`MeshData`] and collects
//! screen slots. A node is a slot when its name starts with `screen`
//! (any case), optionally followed by one of `_ . - ` and a number:
//! `screen`, `screen_3`, `Screen.002`. Meshes below a slot node belong to
//! that slot. Numbered slots come first in ascending order, then unnumbered
//! ones in document order.

use super::{fetch_bytes, AssetError, CancelToken};
use crate::config::is_remote;
use crate::scene::{compute_normals, ImageData, LoadedModel, MeshData, ScreenSlot, Vertex};
use glam::Mat4;

const SLOT_PREFIX: &str = "screen";

/// Fetches and parses a model. Local `.gltf` files may reference external
/// buffers next to them; remote models must be self-contained (GLB or
/// embedded data URIs).
pub fn load_model(url: &str, cancel: &CancelToken) -> Result<LoadedModel, AssetError> {
    let imported = if is_remote(url) {
        let bytes = fetch_bytes(url)?;
        cancel.check()?;
        gltf::import_slice(&bytes)
    } else {
        gltf::import(url)
    };
    let (document, buffers, images) = imported.map_err(|source| AssetError::Parse {
        url: url.to_string(),
        source,
    })?;
    cancel.check()?;
    build_model(url, &document, &buffers, &images)
}

pub fn model_from_slice(source: &str, bytes: &[u8]) -> Result<LoadedModel, AssetError> {
    let (document, buffers, images) = gltf::import_slice(bytes).map_err(|err| AssetError::Parse {
        url: source.to_string(),
        source: err,
    })?;
    build_model(source, &document, &buffers, &images)
}

fn build_model(
    source: &str,
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> Result<LoadedModel, AssetError> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::NoScene {
            url: source.to_string(),
        })?;

    let mut walker = Walker {
        source,
        buffers,
        images,
        model: LoadedModel {
            source: source.to_string(),
            ..LoadedModel::default()
        },
    };
    for node in scene.nodes() {
        walker.visit(&node, Mat4::IDENTITY, None)?;
    }

    let mut model = walker.model;
    // Stable: equal keys keep document order.
    model.screens.sort_by_key(|slot| (slot.order.is_none(), slot.order));
    Ok(model)
}

struct Walker<'a> {
    source: &'a str,
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    model: LoadedModel,
}

impl Walker<'_> {
    fn visit(
        &mut self,
        node: &gltf::Node,
        parent: Mat4,
        slot: Option<usize>,
    ) -> Result<(), AssetError> {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        let name = node
            .name()
            .or_else(|| node.mesh().and_then(|m| m.name()))
            .unwrap_or("node");

        let slot = match screen_slot_order(name) {
            Some(order) => {
                self.model.screens.push(ScreenSlot {
                    name: name.to_string(),
                    order,
                    meshes: Vec::new(),
                    transform: world,
                });
                Some(self.model.screens.len() - 1)
            }
            None => slot,
        };

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                let Some(mut data) = self.read_primitive(name, &primitive)? else {
                    continue;
                };
                data.transform = world;
                if let Some(slot) = slot {
                    self.model.screens[slot].meshes.push(self.model.meshes.len());
                }
                self.model.meshes.push(data);
            }
        }

        for child in node.children() {
            self.visit(&child, world, slot)?;
        }
        Ok(())
    }

    fn read_primitive(
        &self,
        name: &str,
        primitive: &gltf::Primitive,
    ) -> Result<Option<MeshData>, AssetError> {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::debug!(
                "{}: skipping {:?} primitive in '{}'",
                self.source,
                primitive.mode(),
                name
            );
            return Ok(None);
        }
        let reader = primitive
            .reader(|buffer| self.buffers.get(buffer.index()).map(|d| d.0.as_slice()));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| AssetError::MissingPositions {
                url: self.source.to_string(),
                mesh: name.to_string(),
            })?
            .collect();
        let indices: Vec<u32> = reader
            .read_indices()
            .map(|iter| iter.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());
        if indices.len() < 3 {
            return Ok(None);
        }
        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(|iter| iter.collect())
            .unwrap_or_else(|| compute_normals(&positions, &indices));
        let uvs: Vec<[f32; 2]> = reader
            .read_tex_coords(0)
            .map(|iter| iter.into_f32().collect())
            .unwrap_or_default();

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, position)| Vertex {
                position: *position,
                normal: normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                uv: uvs.get(i).copied().unwrap_or([0.0, 0.0]),
            })
            .collect();

        let pbr = primitive.material().pbr_metallic_roughness();
        let mut mesh = MeshData::new(name, vertices, indices);
        mesh.base_color = pbr.base_color_factor();
        mesh.texture = pbr
            .base_color_texture()
            .and_then(|info| self.images.get(info.texture().source().index()))
            .and_then(to_rgba);
        Ok(Some(mesh))
    }
}

/// `Some(order)` when `name` names a screen slot.
pub fn screen_slot_order(name: &str) -> Option<Option<u32>> {
    let head = name.get(..SLOT_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(SLOT_PREFIX) {
        return None;
    }
    let rest = &name[SLOT_PREFIX.len()..];
    let rest = rest
        .strip_prefix(|c: char| matches!(c, '_' | '.' | '-' | ' '))
        .unwrap_or(rest);
    if rest.is_empty() {
        return Some(None);
    }
    if rest.bytes().all(|b| b.is_ascii_digit()) {
        return rest.parse().ok().map(Some);
    }
    None
}

fn to_rgba(data: &gltf::image::Data) -> Option<ImageData> {
    use gltf::image::Format;
    let pixels = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => data
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        Format::R8 => data.pixels.iter().flat_map(|&p| [p, p, p, 255]).collect(),
        other => {
            log::debug!("unsupported embedded texture format {:?}", other);
            return None;
        }
    };
    Some(ImageData {
        width: data.width,
        height: data.height,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GALLERY_JSON: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [ { "nodes": [0, 1, 2, 3, 4] } ],
        "nodes": [
            { "name": "Floor", "mesh": 0 },
            { "name": "Screen.2", "mesh": 0, "translation": [2.0, 0.0, 0.0] },
            { "name": "screen_1", "mesh": 0, "translation": [-2.0, 0.0, 0.0] },
            { "name": "screen", "mesh": 0, "translation": [0.0, 3.0, 0.0] },
            { "name": "Screensaver", "children": [5], "translation": [0.0, 0.0, -4.0] },
            { "name": "screen-0", "mesh": 0, "translation": [0.0, 0.0, -1.0] }
        ],
        "meshes": [ {
            "name": "tri",
            "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1 } ]
        } ],
        "buffers": [ { "byteLength": 44 } ],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    fn triangle_bin() -> Vec<u8> {
        let mut bin = Vec::new();
        for v in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bin.extend_from_slice(&v.to_le_bytes());
        }
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        bin
    }

    #[test]
    fn slot_names() {
        assert_eq!(screen_slot_order("screen"), Some(None));
        assert_eq!(screen_slot_order("Screen_3"), Some(Some(3)));
        assert_eq!(screen_slot_order("SCREEN.002"), Some(Some(2)));
        assert_eq!(screen_slot_order("screen7"), Some(Some(7)));
        assert_eq!(screen_slot_order("screen-10"), Some(Some(10)));
        assert_eq!(screen_slot_order("Screensaver"), None);
        assert_eq!(screen_slot_order("screen_frame"), None);
        assert_eq!(screen_slot_order("wall"), None);
        assert_eq!(screen_slot_order("scr"), None);
    }

    #[test]
    fn gallery_glb_flattens_meshes_and_orders_slots() {
        let model = model_from_slice("gallery.glb", &glb(GALLERY_JSON, &triangle_bin())).unwrap();
        assert_eq!(model.meshes.len(), 5);
        let names: Vec<&str> = model.screens.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["screen-0", "screen_1", "Screen.2", "screen"]);
        for slot in &model.screens {
            assert_eq!(slot.meshes.len(), 1);
        }
    }

    #[test]
    fn nested_slot_gets_parent_transform_and_normals() {
        let model = model_from_slice("gallery.glb", &glb(GALLERY_JSON, &triangle_bin())).unwrap();
        let slot = &model.screens[0];
        let mesh = &model.meshes[slot.meshes[0]];
        for tri in mesh.world_triangles() {
            for p in tri {
                assert!((p.z + 5.0).abs() < 1e-6);
            }
        }
        for v in &mesh.vertices {
            assert!((v.normal[2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        assert!(matches!(
            model_from_slice("junk.glb", b"definitely not gltf"),
            Err(AssetError::Parse { .. })
        ));
    }

    #[test]
    fn gray_alpha_textures_expand_to_rgba() {
        let data = gltf::image::Data {
            pixels: vec![10, 200],
            format: gltf::image::Format::R8G8,
            width: 1,
            height: 1,
        };
        assert_eq!(to_rgba(&data).unwrap().pixels, vec![10, 10, 10, 200]);
    }
}
