use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_millis(500);

/// Frame cadence of the window host: the dt fed to each viewer tick and a
/// rolling fps figure for the title bar.
pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    fps: f32,
}

impl FrameTiming {
    pub fn new(now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: now,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
            fps: 0.0,
        }
    }

    /// Records a frame at `now`. Returns true when the fps figure was refreshed.
    pub fn update(&mut self, now: Instant) -> bool {
        let dt_duration = match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::from_millis(16),
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt_duration.as_secs_f32().max(0.0);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed < FPS_WINDOW {
            return false;
        }
        self.fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_fps_time = now;
        true
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}
