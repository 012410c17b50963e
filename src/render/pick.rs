//! CPU screen picking
//!
//! Turns a pointer position into a world-space ray through the active camera
//! and tests it against the registered interactive screens. Each screen is
//! rejected early by its AABB, then tested triangle by triangle.
//!
//! Nothing here calls back into the host; the viewer decides what a hit means.

use glam::{Mat4, Vec3, Vec4Swizzles};

const PARALLEL_EPSILON: f32 = 1e-7;
const AABB_PAD: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

/// Camera projection and viewport a pick is resolved against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickView {
    view_proj: Mat4,
    inverse: Mat4,
    width: u32,
    height: u32,
}

impl PickView {
    pub fn new(view_proj: Mat4, width: u32, height: u32) -> Self {
        Self {
            view_proj,
            inverse: view_proj.inverse(),
            width,
            height,
        }
    }

    /// Ray through pixel (`x`, `y`), origin on the near plane.
    /// `None` for an empty viewport or a degenerate projection.
    pub fn ray(&self, x: f32, y: f32) -> Option<Ray> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let ndc_x = (2.0 * x) / self.width as f32 - 1.0;
        let ndc_y = 1.0 - (2.0 * y) / self.height as f32;
        let near = self.inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = self.inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        let direction = (far - near).normalize_or_zero();
        if !near.is_finite() || direction == Vec3::ZERO || !direction.is_finite() {
            return None;
        }
        Some(Ray {
            origin: near,
            direction,
        })
    }

    /// World point to pixel coordinates.
    pub fn project(&self, point: Vec3) -> (f32, f32) {
        let clip = self.view_proj * point.extend(1.0);
        let ndc = if clip.w.abs() > f32::EPSILON {
            clip.xyz() / clip.w
        } else {
            clip.xyz()
        };
        (
            (ndc.x + 1.0) * 0.5 * self.width as f32,
            (1.0 - ndc.y) * 0.5 * self.height as f32,
        )
    }
}

/// World-space pick geometry of one screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenBounds {
    pub triangles: Vec<[Vec3; 3]>,
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
}

impl ScreenBounds {
    /// `None` when there are no triangles to hit.
    pub fn from_triangles(triangles: Vec<[Vec3; 3]>) -> Option<Self> {
        let mut points = triangles.iter().flatten();
        let first = *points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self {
            triangles,
            min: min - Vec3::splat(AABB_PAD),
            max: max + Vec3::splat(AABB_PAD),
            center: (min + max) * 0.5,
        })
    }

    /// Slab test. Returns the entry distance (0 when the origin is inside).
    pub fn ray_aabb(&self, ray: &Ray) -> Option<f32> {
        let inv = ray.direction.recip();
        let t1 = (self.min - ray.origin) * inv;
        let t2 = (self.max - ray.origin) * inv;
        let tmin = t1.min(t2).max_element();
        let tmax = t1.max(t2).min_element();
        if tmax < 0.0 || tmin > tmax {
            return None;
        }
        Some(tmin.max(0.0))
    }

    /// Nearest triangle hit distance.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        self.ray_aabb(ray)?;
        self.triangles
            .iter()
            .filter_map(|tri| ray_triangle(ray, tri))
            .min_by(f32::total_cmp)
    }
}

/// Möller–Trumbore, double sided.
fn ray_triangle(ray: &Ray, [a, b, c]: &[Vec3; 3]) -> Option<f32> {
    let edge1 = *b - *a;
    let edge2 = *c - *a;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - *a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t > PARALLEL_EPSILON).then_some(t)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickTarget {
    pub index: usize,
    pub bounds: ScreenBounds,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub index: usize,
    pub distance: f32,
    /// Screen centre in pixels, where the host anchors its hover label.
    pub anchor: (f32, f32),
}

#[derive(Debug, Default)]
pub struct InteractionRaycaster {
    targets: Vec<PickTarget>,
    view: Option<PickView>,
}

impl InteractionRaycaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_view(&mut self, view: PickView) {
        self.view = Some(view);
    }

    pub fn set_targets(&mut self, mut targets: Vec<PickTarget>) {
        targets.sort_by_key(|target| target.index);
        self.targets = targets;
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.view = None;
    }

    /// Nearest screen along `ray`. Equal distances go to the lower index.
    pub fn cast(&self, ray: &Ray) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for target in &self.targets {
            let Some(distance) = target.bounds.intersect(ray) else {
                continue;
            };
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((target.index, distance));
            }
        }
        best
    }

    pub fn hover_test(&self, x: f32, y: f32) -> Option<PickHit> {
        let view = self.view?;
        let ray = view.ray(x, y)?;
        let (index, distance) = self.cast(&ray)?;
        let target = self.targets.iter().find(|t| t.index == index)?;
        Some(PickHit {
            index,
            distance,
            anchor: view.project(target.bounds.center),
        })
    }

    pub fn click_test(&self, x: f32, y: f32) -> Option<usize> {
        let ray = self.view?.ray(x, y)?;
        self.cast(&ray).map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSettings;
    use crate::render::CameraRig;
    use crate::scene::MeshData;

    const W: u32 = 800;
    const H: u32 = 600;

    fn view_from_origin() -> PickView {
        let mut rig = CameraRig::new(&CameraSettings {
            position: [0.0, 0.0, 0.0],
            ..CameraSettings::default()
        });
        rig.set_aspect(W, H);
        PickView::new(rig.view_projection(), W, H)
    }

    fn screen_at(index: usize, x: f32, z: f32) -> PickTarget {
        let mesh = MeshData::quad("screen", Mat4::from_translation(Vec3::new(x, 0.0, z)), 2.0, 1.5);
        PickTarget {
            index,
            bounds: ScreenBounds::from_triangles(mesh.world_triangles()).unwrap(),
        }
    }

    fn three_screens() -> InteractionRaycaster {
        let mut raycaster = InteractionRaycaster::new();
        raycaster.set_view(view_from_origin());
        raycaster.set_targets(vec![
            screen_at(2, 3.0, -5.0),
            screen_at(0, -3.0, -5.0),
            screen_at(1, 0.0, -5.0),
        ]);
        raycaster
    }

    #[test]
    fn centre_ray_points_down_negative_z() {
        let ray = view_from_origin().ray(400.0, 300.0).unwrap();
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-4);
        assert!(ray.origin.z < 0.0 && ray.origin.z > -0.2);
    }

    #[test]
    fn ray_through_middle_screen_hits_only_it() {
        let raycaster = three_screens();
        assert_eq!(raycaster.click_test(400.0, 300.0), Some(1));
        let hit = raycaster.hover_test(400.0, 300.0).unwrap();
        assert_eq!(hit.index, 1);
        assert!((hit.anchor.0 - 400.0).abs() < 0.5);
        assert!((hit.anchor.1 - 300.0).abs() < 0.5);
        assert!((hit.distance - 4.9).abs() < 1e-2);
    }

    #[test]
    fn empty_space_is_a_miss() {
        let raycaster = three_screens();
        assert_eq!(raycaster.click_test(400.0, 5.0), None);
        assert_eq!(raycaster.hover_test(400.0, 5.0), None);
    }

    #[test]
    fn equal_distance_goes_to_lower_index() {
        let mut raycaster = InteractionRaycaster::new();
        raycaster.set_view(view_from_origin());
        raycaster.set_targets(vec![screen_at(4, 0.0, -5.0), screen_at(2, 0.0, -5.0)]);
        assert_eq!(raycaster.click_test(400.0, 300.0), Some(2));
    }

    #[test]
    fn nearer_screen_wins_over_lower_index() {
        let mut raycaster = InteractionRaycaster::new();
        raycaster.set_view(view_from_origin());
        raycaster.set_targets(vec![screen_at(0, 0.0, -8.0), screen_at(5, 0.0, -4.0)]);
        assert_eq!(raycaster.click_test(400.0, 300.0), Some(5));
    }

    #[test]
    fn screens_behind_the_camera_are_ignored() {
        let mut raycaster = InteractionRaycaster::new();
        raycaster.set_view(view_from_origin());
        raycaster.set_targets(vec![screen_at(0, 0.0, 5.0)]);
        assert_eq!(raycaster.click_test(400.0, 300.0), None);
    }

    #[test]
    fn no_view_or_empty_viewport_never_hits() {
        let mut raycaster = InteractionRaycaster::new();
        raycaster.set_targets(vec![screen_at(0, 0.0, -5.0)]);
        assert_eq!(raycaster.click_test(400.0, 300.0), None);
        raycaster.set_view(PickView::new(view_from_origin().view_proj, 0, 0));
        assert_eq!(raycaster.click_test(0.0, 0.0), None);
    }

    #[test]
    fn aabb_slab_reports_entry_distance() {
        let bounds = ScreenBounds::from_triangles(vec![[
            Vec3::new(-0.5, -0.5, -0.5),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(0.5, -0.5, 0.5),
        ]])
        .unwrap();
        let ray = Ray {
            origin: Vec3::new(0.0, 0.0, 2.0),
            direction: Vec3::NEG_Z,
        };
        let t = bounds.ray_aabb(&ray).unwrap();
        assert!((t - 1.5).abs() < 1e-3);
        let miss = Ray {
            origin: Vec3::new(2.0, 0.0, 2.0),
            direction: Vec3::NEG_Z,
        };
        assert!(bounds.ray_aabb(&miss).is_none());
    }

    #[test]
    fn bounds_need_triangles() {
        assert!(ScreenBounds::from_triangles(Vec::new()).is_none());
    }
}
