mod timing;

pub use timing::FrameTiming;

use gallery_walk::app::InputEvent;
use gallery_walk::config::ConfigError;
use gallery_walk::render::{HeadlessBackend, RenderError, WgpuBackend};
use gallery_walk::{ExhibitHost, FrameScheduler, LifecycleError, Viewer, ViewerConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

const BASE_TITLE: &str = "Gallery Walk";

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What to show and how big the window starts.
#[derive(Debug, Clone, Default)]
pub struct Exhibit {
    pub config: ViewerConfig,
    pub model_url: Option<String>,
    pub images: Vec<String>,
    pub width: u32,
    pub height: u32,
}

/// Reports viewer notifications through the title bar and the log.
#[derive(Debug, Default)]
pub struct TitleHost {
    images: Vec<String>,
    hovered: Option<(f32, f32)>,
    clicked: Option<usize>,
}

impl TitleHost {
    pub fn new(images: Vec<String>) -> Self {
        Self {
            images,
            ..Self::default()
        }
    }

    pub fn title(&self, fps: f32) -> String {
        let mut title = format!("{} - {:.1} fps", BASE_TITLE, fps);
        if let Some((x, y)) = self.hovered {
            title.push_str(&format!(" | screen at ({:.0}, {:.0})", x, y));
        }
        if let Some(index) = self.clicked {
            match self.images.get(index) {
                Some(url) => title.push_str(&format!(" | opened {}", file_name(url))),
                None => title.push_str(&format!(" | opened #{}", index)),
            }
        }
        title
    }
}

fn file_name(url: &str) -> &str {
    url.rsplit(['/', '\\']).next().unwrap_or(url)
}

impl ExhibitHost for TitleHost {
    fn on_hover_screen(&mut self, show: bool, anchor_x: f32, anchor_y: f32) {
        self.hovered = show.then_some((anchor_x, anchor_y));
    }

    fn on_click_screen(&mut self, index: usize) {
        match self.images.get(index) {
            Some(url) => log::info!("screen {} clicked: {}", index, url),
            None => log::info!("screen {} clicked (no image assigned)", index),
        }
        self.clicked = Some(index);
    }
}

/// Frames are driven by winit redraw requests.
struct WindowScheduler {
    window: Arc<Window>,
    cancelled: bool,
}

impl FrameScheduler for WindowScheduler {
    fn request_frame(&mut self) {
        if !self.cancelled {
            self.window.request_redraw();
        }
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// The headless loop ticks on its own clock.
#[derive(Default)]
struct ManualScheduler {
    requested: u64,
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) {
        self.requested += 1;
    }

    fn cancel(&mut self) {
        log::debug!("headless scheduler cancelled after {} frames", self.requested);
    }
}

struct App {
    viewer: Viewer<WgpuBackend, TitleHost>,
    window: Option<Arc<Window>>,
    size: PhysicalSize<u32>,
    timing: FrameTiming,
    cursor: (f32, f32),
    error: Option<HostError>,
}

impl App {
    fn new(exhibit: Exhibit) -> Self {
        let mut viewer = Viewer::new(exhibit.config, TitleHost::new(exhibit.images.clone()));
        if let Some(url) = exhibit.model_url {
            viewer.set_model_url(url);
        }
        viewer.set_images(exhibit.images);
        Self {
            viewer,
            window: None,
            size: PhysicalSize::new(exhibit.width.max(1), exhibit.height.max(1)),
            timing: FrameTiming::new(Instant::now()),
            cursor: (0.0, 0.0),
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), HostError> {
        let window_attrs = WindowAttributes::default()
            .with_title(BASE_TITLE)
            .with_inner_size(self.size)
            .with_resizable(true);
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let size = window.inner_size();

        let backend = pollster::block_on(WgpuBackend::new(Arc::clone(&window)))?;
        let scheduler = WindowScheduler {
            window: Arc::clone(&window),
            cancelled: false,
        };
        self.viewer
            .initialize(backend, Box::new(scheduler), size.width, size.height)?;
        self.window = Some(window);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.viewer.dispose();
        self.window = None;
        event_loop.exit();
    }

    fn redraw(&mut self) {
        let refreshed = self.timing.update(Instant::now());
        if let Err(err) = self.viewer.tick(self.timing.frame_dt) {
            log::warn!("tick skipped: {}", err);
            return;
        }
        if refreshed {
            if let Some(window) = &self.window {
                window.set_title(&self.viewer.host().title(self.timing.fps()));
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            log::error!("viewer failed to start: {}", err);
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Focused(false) => self.viewer.handle_input(InputEvent::Blur),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                if code == KeyCode::Escape {
                    self.shutdown(event_loop);
                    return;
                }
                let input = match event.state {
                    ElementState::Pressed => InputEvent::KeyDown(code),
                    ElementState::Released => InputEvent::KeyUp(code),
                };
                self.viewer.handle_input(input);
            }
            WindowEvent::Resized(new_size) => {
                self.size = new_size;
                self.viewer.resize(new_size.width, new_size.height);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                let (x, y) = self.cursor;
                self.viewer.handle_input(InputEvent::PointerMove { x, y });
            }
            WindowEvent::CursorLeft { .. } => self.viewer.handle_input(InputEvent::PointerLeave),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let (x, y) = self.cursor;
                let input = match state {
                    ElementState::Pressed => InputEvent::PointerDown { x, y },
                    ElementState::Released => InputEvent::PointerUp,
                };
                self.viewer.handle_input(input);
            }
            WindowEvent::Touch(touch) => {
                let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                let id = touch.id;
                let input = match touch.phase {
                    TouchPhase::Started => InputEvent::TouchStart { id, x, y },
                    TouchPhase::Moved => InputEvent::TouchMove { id, x, y },
                    TouchPhase::Ended => InputEvent::TouchEnd { id },
                    TouchPhase::Cancelled => InputEvent::TouchCancel { id },
                };
                self.viewer.handle_input(input);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }
}

/// Opens a window and walks the exhibit until it is closed.
pub fn run(exhibit: Exhibit) -> Result<(), HostError> {
    log::info!("{}", BASE_TITLE);
    log::info!("   WASD/arrows walk, drag to look, click a screen, ESC to exit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(exhibit);
    event_loop.run_app(&mut app)?;
    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Runs `ticks` frames against the headless backend, then disposes.
pub fn run_headless(exhibit: Exhibit, ticks: u32) -> Result<(), HostError> {
    let mut viewer = Viewer::new(exhibit.config, TitleHost::new(exhibit.images.clone()));
    if let Some(url) = exhibit.model_url {
        viewer.set_model_url(url);
    }
    viewer.set_images(exhibit.images);

    let backend = HeadlessBackend::new(exhibit.width, exhibit.height);
    viewer.initialize(
        backend,
        Box::<ManualScheduler>::default(),
        exhibit.width,
        exhibit.height,
    )?;

    let frame = Duration::from_millis(16);
    let mut timing = FrameTiming::new(Instant::now());
    for _ in 0..ticks {
        timing.update(Instant::now());
        viewer.tick(timing.frame_dt)?;
        std::thread::sleep(frame);
    }
    log::info!(
        "headless run done: model {:?}, {} screens",
        viewer.scene().model_source(),
        viewer.scene().screens().len()
    );

    if let Some(backend) = viewer.dispose() {
        let stats = backend.stats();
        log::info!(
            "frames {}, meshes {}/{} released, textures {}/{} released",
            stats.frames_rendered,
            stats.meshes_released,
            stats.meshes_uploaded,
            stats.textures_released,
            stats.textures_uploaded
        );
    }
    Ok(())
}
