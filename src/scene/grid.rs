use super::mesh::{push_quad, MeshData};
use glam::Vec3;

const LINE_WIDTH: f32 = 0.02;
const GRID_COLOR: [f32; 4] = [0.45, 0.45, 0.5, 1.0];

/// Ground grid on the y = 0 walking plane, built from thin upward-facing quads.
pub fn ground_grid(size: f32, divisions: u32) -> MeshData {
    let divisions = divisions.max(1);
    let half = size.abs() * 0.5;
    let step = size.abs() / divisions as f32;
    let hw = LINE_WIDTH * 0.5;

    let lines = divisions as usize + 1;
    let mut vertices = Vec::with_capacity(lines * 8);
    let mut indices = Vec::with_capacity(lines * 12);
    for i in 0..lines {
        let offset = -half + step * i as f32;
        // Runs along Z.
        push_quad(
            &mut vertices,
            &mut indices,
            [
                Vec3::new(offset - hw, 0.0, half),
                Vec3::new(offset + hw, 0.0, half),
                Vec3::new(offset + hw, 0.0, -half),
                Vec3::new(offset - hw, 0.0, -half),
            ],
            Vec3::Y,
        );
        // Runs along X.
        push_quad(
            &mut vertices,
            &mut indices,
            [
                Vec3::new(-half, 0.0, offset + hw),
                Vec3::new(half, 0.0, offset + hw),
                Vec3::new(half, 0.0, offset - hw),
                Vec3::new(-half, 0.0, offset - hw),
            ],
            Vec3::Y,
        );
    }

    let mut mesh = MeshData::new("ground_grid", vertices, indices);
    mesh.base_color = GRID_COLOR;
    mesh.receive_shadows = true;
    mesh
}
