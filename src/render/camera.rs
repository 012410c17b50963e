use crate::app::input::InputController;
use crate::config::CameraSettings;
use glam::{EulerRot, Mat4, Quat, Vec3};
use winit::keyboard::KeyCode;

/// Longest step a single update integrates. Larger gaps (a backgrounded
/// window, a debugger pause) are treated as this step.
pub const MAX_STEP_SECONDS: f32 = 1.0 / 15.0;

/// Pitch is clamped to [-PITCH_LIMIT, PITCH_LIMIT], strictly inside (-pi/2, pi/2).
pub const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveAction {
    Forward,
    Backward,
    StrafeLeft,
    StrafeRight,
}

impl MoveAction {
    pub const ALL: [MoveAction; 4] = [
        MoveAction::Forward,
        MoveAction::Backward,
        MoveAction::StrafeLeft,
        MoveAction::StrafeRight,
    ];

    /// Keys bound to this action; holding several counts once.
    pub fn keys(self) -> [KeyCode; 2] {
        match self {
            Self::Forward => [KeyCode::KeyW, KeyCode::ArrowUp],
            Self::Backward => [KeyCode::KeyS, KeyCode::ArrowDown],
            Self::StrafeLeft => [KeyCode::KeyA, KeyCode::ArrowLeft],
            Self::StrafeRight => [KeyCode::KeyD, KeyCode::ArrowRight],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub speed: f32,
}

/// First-person walking camera. Yaw 0 looks down -Z; yaw turns around +Y,
/// pitch around the camera's local X axis.
#[derive(Debug, Clone)]
pub struct CameraRig {
    state: CameraState,
    sensitivity: f32,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl CameraRig {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            state: CameraState {
                position: Vec3::from(settings.position),
                yaw: settings.yaw,
                pitch: settings.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
                speed: settings.speed,
            },
            sensitivity: settings.sensitivity,
            fov_y: settings.fov_y_degrees.to_radians(),
            aspect: 16.0 / 9.0,
            near: settings.near,
            far: settings.far,
        }
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn position(&self) -> Vec3 {
        self.state.position
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    /// Integrates one tick of input. Returns whether position or orientation changed.
    pub fn update(&mut self, dt: f32, input: &mut InputController) -> bool {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, MAX_STEP_SECONDS)
        } else {
            0.0
        };
        let mut changed = false;

        let (dx, dy) = input.take_drag_delta();
        if dx != 0.0 || dy != 0.0 {
            self.state.yaw = wrap_yaw(self.state.yaw - dx * self.sensitivity);
            self.state.pitch =
                (self.state.pitch - dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
            changed = true;
        }

        let (forward, right) = self.walk_basis();
        let mut step = Vec3::ZERO;
        for action in MoveAction::ALL {
            if !action.keys().iter().any(|key| input.is_pressed(*key)) {
                continue;
            }
            step += match action {
                MoveAction::Forward => forward,
                MoveAction::Backward => -forward,
                MoveAction::StrafeLeft => -right,
                MoveAction::StrafeRight => right,
            };
        }
        if step != Vec3::ZERO && dt > 0.0 {
            self.state.position += step * (self.state.speed * dt);
            changed = true;
        }

        changed
    }

    fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.state.yaw, self.state.pitch, 0.0)
    }

    /// (forward, right, up) of the full look direction.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let rotation = self.rotation();
        (rotation * Vec3::NEG_Z, rotation * Vec3::X, rotation * Vec3::Y)
    }

    /// Horizontal forward and right used for walking. Pitch never tilts these.
    pub fn walk_basis(&self) -> (Vec3, Vec3) {
        let (look, _, _) = self.basis();
        let forward = Vec3::new(look.x, 0.0, look.z).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        (forward, right)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation(), self.state.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Maps yaw into [-pi, pi) so long sessions keep full float precision.
fn wrap_yaw(yaw: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    if yaw.is_finite() {
        (yaw + PI).rem_euclid(TAU) - PI
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::input::InputEvent;
    use proptest::prelude::*;

    fn rig_at_origin() -> CameraRig {
        CameraRig::new(&CameraSettings {
            position: [0.0, 0.0, 0.0],
            yaw: 0.0,
            pitch: 0.0,
            ..CameraSettings::default()
        })
    }

    #[test]
    fn default_looks_down_negative_z() {
        let rig = rig_at_origin();
        let (forward, right, up) = rig.basis();
        assert!((forward - Vec3::NEG_Z).length() < 1e-6);
        assert!((right - Vec3::X).length() < 1e-6);
        assert!((up - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn forward_key_walks_along_view_direction() {
        let mut rig = rig_at_origin();
        let mut input = InputController::new();
        input.key_down(KeyCode::KeyW);
        assert!(rig.update(0.05, &mut input));
        let speed = rig.state().speed;
        assert!((rig.position() - Vec3::new(0.0, 0.0, -speed * 0.05)).length() < 1e-5);
    }

    #[test]
    fn arrow_aliases_match_letter_keys() {
        let mut letters = rig_at_origin();
        let mut arrows = rig_at_origin();
        let mut a = InputController::new();
        let mut b = InputController::new();
        a.key_down(KeyCode::KeyD);
        b.key_down(KeyCode::ArrowRight);
        letters.update(0.05, &mut a);
        arrows.update(0.05, &mut b);
        assert_eq!(letters.position(), arrows.position());
        assert!(letters.position().x > 0.0);
    }

    #[test]
    fn opposing_keys_cancel_exactly() {
        let mut rig = rig_at_origin();
        let before = *rig.state();
        let mut input = InputController::new();
        input.key_down(KeyCode::KeyW);
        input.key_down(KeyCode::KeyS);
        input.key_down(KeyCode::KeyA);
        input.key_down(KeyCode::KeyD);
        assert!(!rig.update(0.05, &mut input));
        assert_eq!(*rig.state(), before);
    }

    #[test]
    fn looking_up_does_not_tilt_walking() {
        let mut rig = rig_at_origin();
        rig.state.pitch = 1.2;
        let mut input = InputController::new();
        input.key_down(KeyCode::KeyW);
        rig.update(0.05, &mut input);
        assert_eq!(rig.position().y, 0.0);
        assert!(rig.position().z < 0.0);
    }

    #[test]
    fn long_stall_is_clamped_to_max_step() {
        let mut stalled = rig_at_origin();
        let mut capped = rig_at_origin();
        let mut a = InputController::new();
        let mut b = InputController::new();
        a.key_down(KeyCode::KeyW);
        b.key_down(KeyCode::KeyW);
        stalled.update(5.0, &mut a);
        capped.update(MAX_STEP_SECONDS, &mut b);
        assert_eq!(stalled.position(), capped.position());
    }

    #[test]
    fn non_finite_dt_does_not_move() {
        let mut rig = rig_at_origin();
        let mut input = InputController::new();
        input.key_down(KeyCode::KeyW);
        rig.update(f32::NAN, &mut input);
        assert_eq!(rig.position(), Vec3::ZERO);
    }

    #[test]
    fn drag_right_turns_right() {
        let mut rig = rig_at_origin();
        let mut input = InputController::new();
        input.pointer_down(100.0, 100.0);
        input.pointer_move(150.0, 100.0);
        rig.update(0.016, &mut input);
        assert!(rig.state().yaw < 0.0);
        let (forward, _, _) = rig.basis();
        assert!(forward.x > 0.0);
    }

    #[test]
    fn idle_ticks_are_bit_identical() {
        let mut rig = CameraRig::new(&CameraSettings {
            position: [1.25, 1.6, -3.7],
            yaw: 0.3,
            pitch: -0.2,
            ..CameraSettings::default()
        });
        let mut input = InputController::new();
        let before = *rig.state();
        for _ in 0..1000 {
            assert!(!rig.update(1.0 / 60.0, &mut input));
        }
        let after = *rig.state();
        assert_eq!(
            before.position.to_array().map(f32::to_bits),
            after.position.to_array().map(f32::to_bits)
        );
        assert_eq!(before.yaw.to_bits(), after.yaw.to_bits());
        assert_eq!(before.pitch.to_bits(), after.pitch.to_bits());
    }

    #[test]
    fn released_drag_leaves_orientation_alone() {
        let mut rig = rig_at_origin();
        let mut input = InputController::new();
        input.post(InputEvent::PointerDown { x: 0.0, y: 0.0 });
        input.post(InputEvent::PointerMove { x: 10.0, y: 0.0 });
        input.post(InputEvent::PointerUp);
        input.pump();
        rig.update(0.016, &mut input);
        let yaw = rig.state().yaw;
        input.post(InputEvent::PointerMove { x: 400.0, y: 300.0 });
        input.pump();
        rig.update(0.016, &mut input);
        assert_eq!(rig.state().yaw, yaw);
    }

    #[test]
    fn yaw_wraps_after_many_turns() {
        let mut rig = rig_at_origin();
        let mut input = InputController::new();
        input.pointer_down(0.0, 0.0);
        let mut x = 0.0;
        for _ in 0..200 {
            x += 2000.0;
            input.pointer_move(x, 0.0);
            rig.update(0.016, &mut input);
            let yaw = rig.state().yaw;
            assert!(yaw.abs() <= std::f32::consts::PI);
        }

        let expected = wrap_yaw(-x * CameraSettings::default().sensitivity);
        let (forward, _, _) = rig.basis();
        let (reference, _, _) = CameraRig::new(&CameraSettings {
            position: [0.0, 1.6, 0.0],
            yaw: expected,
            ..CameraSettings::default()
        })
        .basis();
        assert!((forward - reference).length() < 1e-2);
    }

    proptest! {
        #[test]
        fn half_steps_match_full_step(
            dt in 0.0f32..MAX_STEP_SECONDS,
            yaw in -3.0f32..3.0,
            keys in proptest::sample::subsequence(
                vec![KeyCode::KeyW, KeyCode::KeyA, KeyCode::KeyS, KeyCode::KeyD], 0..=4),
        ) {
            let settings = CameraSettings {
                position: [0.0, 1.6, 0.0],
                yaw,
                pitch: 0.0,
                ..CameraSettings::default()
            };
            let mut full = CameraRig::new(&settings);
            let mut halves = CameraRig::new(&settings);
            let mut input = InputController::new();
            for key in &keys {
                input.key_down(*key);
            }
            full.update(dt, &mut input);
            halves.update(dt * 0.5, &mut input);
            halves.update(dt * 0.5, &mut input);
            prop_assert!((full.position() - halves.position()).length() < 1e-4);
        }

        #[test]
        fn pitch_stays_in_range(drags in proptest::collection::vec(-5000.0f32..5000.0, 1..40)) {
            let mut rig = rig_at_origin();
            let mut input = InputController::new();
            input.pointer_down(0.0, 0.0);
            let mut y = 0.0;
            for dy in drags {
                y += dy;
                input.pointer_move(0.0, y);
                rig.update(0.016, &mut input);
                let pitch = rig.state().pitch;
                prop_assert!(pitch.abs() <= PITCH_LIMIT);
                prop_assert!(pitch.abs() < std::f32::consts::FRAC_PI_2);
            }
        }
    }
}
