use std::collections::{HashSet, VecDeque};
use winit::keyboard::KeyCode;

/// Pointer travel (in pixels) below which a press/release pair counts as a click.
pub const CLICK_SLOP_PX: f32 = 5.0;

/// Messages posted by host event callbacks. Applied in order by [`InputController::pump`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    PointerLeave,
    TouchStart { id: u64, x: f32, y: f32 },
    TouchMove { id: u64, x: f32, y: f32 },
    TouchEnd { id: u64 },
    TouchCancel { id: u64 },
    Blur,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct DragSession {
    active: bool,
    last_x: f32,
    last_y: f32,
}

/// A press/release pair that stayed within [`CLICK_SLOP_PX`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerClick {
    pub x: f32,
    pub y: f32,
}

/// Keyboard, pointer and touch state for one viewer.
///
/// Only one drag runs at a time: the mouse or the first touch contact.
#[derive(Debug, Default)]
pub struct InputController {
    pressed: HashSet<KeyCode>,
    drag: DragSession,
    drag_delta: (f32, f32),
    press_origin: Option<(f32, f32)>,
    press_travel: f32,
    pointer: Option<(f32, f32)>,
    touch_id: Option<u64>,
    mailbox: VecDeque<InputEvent>,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event for the next [`Self::pump`].
    pub fn post(&mut self, event: InputEvent) {
        self.mailbox.push_back(event);
    }

    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Applies every queued event in arrival order and returns the clicks they produced.
    pub fn pump(&mut self) -> Vec<PointerClick> {
        let mut clicks = Vec::new();
        while let Some(event) = self.mailbox.pop_front() {
            if let Some(click) = self.apply(event) {
                clicks.push(click);
            }
        }
        clicks
    }

    pub fn apply(&mut self, event: InputEvent) -> Option<PointerClick> {
        match event {
            InputEvent::KeyDown(code) => self.key_down(code),
            InputEvent::KeyUp(code) => self.key_up(code),
            InputEvent::PointerDown { x, y } => self.pointer_down(x, y),
            InputEvent::PointerMove { x, y } => self.pointer_move(x, y),
            InputEvent::PointerUp => return self.pointer_up(),
            InputEvent::PointerLeave => self.pointer_leave(),
            InputEvent::TouchStart { id, x, y } => self.touch_start(id, x, y),
            InputEvent::TouchMove { id, x, y } => self.touch_move(id, x, y),
            InputEvent::TouchEnd { id } => return self.touch_end(id),
            InputEvent::TouchCancel { id } => self.touch_cancel(id),
            InputEvent::Blur => self.on_blur(),
        }
        None
    }

    pub fn key_down(&mut self, code: KeyCode) {
        self.pressed.insert(code);
    }

    pub fn key_up(&mut self, code: KeyCode) {
        self.pressed.remove(&code);
    }

    pub fn is_pressed(&self, code: KeyCode) -> bool {
        self.pressed.contains(&code)
    }

    pub fn any_pressed(&self) -> bool {
        !self.pressed.is_empty()
    }

    /// Mouse press. Ignored while a touch contact owns the drag.
    pub fn pointer_down(&mut self, x: f32, y: f32) {
        if self.touch_id.is_none() {
            self.begin_drag(x, y);
        }
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        if self.touch_id.is_none() {
            self.move_drag(x, y);
        }
    }

    /// Ends the mouse drag. Movement accumulated during it stays readable
    /// through [`Self::take_drag_delta`].
    pub fn pointer_up(&mut self) -> Option<PointerClick> {
        if self.touch_id.is_some() {
            return None;
        }
        self.end_drag()
    }

    pub fn pointer_leave(&mut self) {
        if self.touch_id.is_none() {
            self.pointer = None;
        }
    }

    pub fn touch_start(&mut self, id: u64, x: f32, y: f32) {
        if self.touch_id.is_some() || self.drag.active {
            return;
        }
        self.touch_id = Some(id);
        self.begin_drag(x, y);
    }

    pub fn touch_move(&mut self, id: u64, x: f32, y: f32) {
        if self.touch_id == Some(id) {
            self.move_drag(x, y);
        }
    }

    pub fn touch_end(&mut self, id: u64) -> Option<PointerClick> {
        if self.touch_id != Some(id) {
            return None;
        }
        self.touch_id = None;
        let click = self.end_drag();
        // A lifted finger has no hover position.
        self.pointer = None;
        click
    }

    pub fn touch_cancel(&mut self, id: u64) {
        if self.touch_id != Some(id) {
            return;
        }
        self.touch_id = None;
        self.drag = DragSession::default();
        self.press_origin = None;
        self.pointer = None;
    }

    fn begin_drag(&mut self, x: f32, y: f32) {
        self.pointer = Some((x, y));
        if self.drag.active {
            return;
        }
        self.drag = DragSession {
            active: true,
            last_x: x,
            last_y: y,
        };
        self.press_origin = Some((x, y));
        self.press_travel = 0.0;
    }

    fn move_drag(&mut self, x: f32, y: f32) {
        self.pointer = Some((x, y));
        if !self.drag.active {
            return;
        }
        self.drag_delta.0 += x - self.drag.last_x;
        self.drag_delta.1 += y - self.drag.last_y;
        self.drag.last_x = x;
        self.drag.last_y = y;
        if let Some((ox, oy)) = self.press_origin {
            let travel = ((x - ox).powi(2) + (y - oy).powi(2)).sqrt();
            self.press_travel = self.press_travel.max(travel);
        }
    }

    fn end_drag(&mut self) -> Option<PointerClick> {
        if !self.drag.active {
            return None;
        }
        self.drag.active = false;
        self.press_origin = None;
        let (x, y) = self.pointer?;
        (self.press_travel < CLICK_SLOP_PX).then_some(PointerClick { x, y })
    }

    /// Window/focus loss: nothing stays pressed and no drag survives.
    pub fn on_blur(&mut self) {
        self.pressed.clear();
        self.drag = DragSession::default();
        self.drag_delta = (0.0, 0.0);
        self.press_origin = None;
        self.press_travel = 0.0;
        self.touch_id = None;
    }

    /// Returns the drag movement accumulated since the last call and resets it.
    pub fn take_drag_delta(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.drag_delta)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.active
    }

    pub fn pointer_position(&self) -> Option<(f32, f32)> {
        self.pointer
    }

    /// Clears state and drops queued events.
    pub fn reset(&mut self) {
        self.on_blur();
        self.pointer = None;
        self.mailbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_key_down_is_idempotent() {
        let mut input = InputController::new();
        for _ in 0..10 {
            input.key_down(KeyCode::KeyW);
        }
        assert!(input.is_pressed(KeyCode::KeyW));
        input.key_up(KeyCode::KeyW);
        assert!(!input.is_pressed(KeyCode::KeyW));
        input.key_up(KeyCode::KeyW);
        assert!(!input.is_pressed(KeyCode::KeyW));
    }

    #[test]
    fn blur_clears_keys_and_drag() {
        let mut input = InputController::new();
        input.key_down(KeyCode::KeyW);
        input.key_down(KeyCode::ArrowLeft);
        input.pointer_down(10.0, 10.0);
        input.pointer_move(30.0, 10.0);
        input.on_blur();
        assert!(!input.is_pressed(KeyCode::KeyW));
        assert!(!input.is_pressed(KeyCode::ArrowLeft));
        assert!(!input.any_pressed());
        assert!(!input.is_dragging());
        assert_eq!(input.take_drag_delta(), (0.0, 0.0));
    }

    #[test]
    fn drag_delta_is_read_and_reset() {
        let mut input = InputController::new();
        input.pointer_down(0.0, 0.0);
        input.pointer_move(5.0, -2.0);
        input.pointer_move(8.0, 1.0);
        assert_eq!(input.take_drag_delta(), (8.0, 1.0));
        assert_eq!(input.take_drag_delta(), (0.0, 0.0));
    }

    #[test]
    fn moves_without_drag_only_track_pointer() {
        let mut input = InputController::new();
        input.pointer_move(40.0, 50.0);
        assert_eq!(input.pointer_position(), Some((40.0, 50.0)));
        assert_eq!(input.take_drag_delta(), (0.0, 0.0));
    }

    #[test]
    fn short_press_is_a_click_long_drag_is_not() {
        let mut input = InputController::new();
        input.pointer_down(100.0, 100.0);
        input.pointer_move(102.0, 101.0);
        assert_eq!(input.pointer_up(), Some(PointerClick { x: 102.0, y: 101.0 }));

        input.pointer_down(100.0, 100.0);
        input.pointer_move(160.0, 100.0);
        input.pointer_move(101.0, 100.0);
        assert_eq!(input.pointer_up(), None);
    }

    #[test]
    fn second_touch_is_ignored() {
        let mut input = InputController::new();
        input.touch_start(1, 10.0, 10.0);
        input.touch_start(2, 300.0, 300.0);
        input.touch_move(2, 400.0, 400.0);
        assert_eq!(input.take_drag_delta(), (0.0, 0.0));
        input.touch_move(1, 20.0, 15.0);
        assert_eq!(input.take_drag_delta(), (10.0, 5.0));
        assert_eq!(input.touch_end(2), None);
        assert!(input.is_dragging());
        input.touch_end(1);
        assert!(!input.is_dragging());
        assert_eq!(input.pointer_position(), None);
    }

    #[test]
    fn mouse_cannot_steer_a_touch_drag() {
        let mut input = InputController::new();
        input.touch_start(1, 100.0, 100.0);
        input.pointer_move(700.0, 100.0);
        input.pointer_down(700.0, 100.0);
        assert_eq!(input.take_drag_delta(), (0.0, 0.0));
        assert_eq!(input.pointer_up(), None);
        input.pointer_leave();
        assert!(input.is_dragging());
        assert_eq!(input.pointer_position(), Some((100.0, 100.0)));

        input.touch_move(1, 102.0, 100.0);
        assert_eq!(input.touch_end(1), Some(PointerClick { x: 102.0, y: 100.0 }));
        assert_eq!(input.take_drag_delta(), (2.0, 0.0));
    }

    #[test]
    fn touch_cannot_join_a_mouse_drag() {
        let mut input = InputController::new();
        input.pointer_down(10.0, 10.0);
        input.touch_start(7, 300.0, 300.0);
        input.touch_move(7, 500.0, 500.0);
        assert_eq!(input.take_drag_delta(), (0.0, 0.0));
        assert_eq!(input.touch_end(7), None);
        assert_eq!(input.pointer_up(), Some(PointerClick { x: 10.0, y: 10.0 }));
    }

    #[test]
    fn mailbox_applies_in_order() {
        let mut input = InputController::new();
        input.post(InputEvent::KeyDown(KeyCode::KeyA));
        input.post(InputEvent::KeyUp(KeyCode::KeyA));
        input.post(InputEvent::KeyDown(KeyCode::KeyD));
        input.post(InputEvent::PointerDown { x: 1.0, y: 1.0 });
        input.post(InputEvent::PointerUp);
        assert_eq!(input.pending(), 5);
        assert!(!input.is_pressed(KeyCode::KeyD));
        let clicks = input.pump();
        assert_eq!(clicks, vec![PointerClick { x: 1.0, y: 1.0 }]);
        assert_eq!(input.pending(), 0);
        assert!(!input.is_pressed(KeyCode::KeyA));
        assert!(input.is_pressed(KeyCode::KeyD));
    }

    #[test]
    fn blur_in_mailbox_wins_over_earlier_presses() {
        let mut input = InputController::new();
        input.post(InputEvent::KeyDown(KeyCode::KeyW));
        input.post(InputEvent::Blur);
        input.pump();
        assert!(!input.is_pressed(KeyCode::KeyW));
    }
}
