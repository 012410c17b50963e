pub mod input;

pub use input::{InputController, InputEvent, PointerClick, CLICK_SLOP_PX};

use crate::assets::{load_images, AssetLoader, AssetSource, DefaultAssetSource, LoadState};
use crate::config::ViewerConfig;
use crate::render::{
    CameraRig, FrameDesc, InteractionRaycaster, PickHit, PickView, RenderBackend, RenderError,
};
use crate::scene::{ImageData, LoadedModel, SceneGraph};
use std::sync::Arc;

/// Notifications a viewer sends to whoever embeds it.
pub trait ExhibitHost {
    /// Hover entered, left or moved to another screen. `anchor_*` is the
    /// hovered screen's centre in pixels; meaningless when `show` is false.
    fn on_hover_screen(&mut self, show: bool, anchor_x: f32, anchor_y: f32);

    /// A click landed on screen `index`.
    fn on_click_screen(&mut self, index: usize);
}

/// Handle on the host's frame callback (a redraw request, a timer).
pub trait FrameScheduler {
    fn request_frame(&mut self);

    /// No frame may be requested after this.
    fn cancel(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Running,
    Disposing,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// One exhibition view: owns the backend, scene, camera and input, and
/// drives them through init, per-frame ticks and dispose.
pub struct Viewer<B: RenderBackend, H: ExhibitHost> {
    config: ViewerConfig,
    state: LifecycleState,
    backend: Option<B>,
    scheduler: Option<Box<dyn FrameScheduler>>,
    scene: SceneGraph,
    camera: CameraRig,
    input: InputController,
    raycaster: InteractionRaycaster,
    model_loader: AssetLoader<LoadedModel>,
    image_loader: AssetLoader<Vec<Option<ImageData>>>,
    source: Arc<dyn AssetSource>,
    host: H,
    model_url: Option<String>,
    images: Vec<String>,
    viewport: (u32, u32),
    listening: bool,
    hover: Option<PickHit>,
}

impl<B: RenderBackend, H: ExhibitHost> Viewer<B, H> {
    pub fn new(config: ViewerConfig, host: H) -> Self {
        let camera = CameraRig::new(&config.camera);
        Self {
            config,
            state: LifecycleState::Uninitialized,
            backend: None,
            scheduler: None,
            scene: SceneGraph::new(),
            camera,
            input: InputController::new(),
            raycaster: InteractionRaycaster::new(),
            model_loader: AssetLoader::new("model"),
            image_loader: AssetLoader::new("images"),
            source: Arc::new(DefaultAssetSource),
            host,
            model_url: None,
            images: Vec::new(),
            viewport: (0, 0),
            listening: false,
            hover: None,
        }
    }

    pub fn with_asset_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.source = source;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn model_state(&self) -> LoadState {
        self.model_loader.state()
    }

    pub fn image_state(&self) -> LoadState {
        self.image_loader.state()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Takes ownership of `backend` and starts the frame loop.
    pub fn initialize(
        &mut self,
        mut backend: B,
        scheduler: Box<dyn FrameScheduler>,
        width: u32,
        height: u32,
    ) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(LifecycleError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        self.state = LifecycleState::Initializing;
        log::info!("viewer initializing at {}x{}", width, height);

        self.viewport = (width, height);
        self.camera = CameraRig::new(&self.config.camera);
        self.camera.set_aspect(width, height);
        backend.resize(width, height);
        if let Err(err) = self.scene.build_environment(&mut backend, &self.config.scene) {
            self.scene.release(&mut backend);
            backend.detach();
            self.state = LifecycleState::Uninitialized;
            return Err(err.into());
        }
        self.backend = Some(backend);
        self.scheduler = Some(scheduler);
        self.input.reset();
        self.listening = true;
        self.hover = None;

        if let Some(url) = self.model_url.clone() {
            self.start_model_load(url);
        }
        if !self.images.is_empty() {
            self.start_image_load();
        }

        self.state = LifecycleState::Running;
        log::info!("viewer running");
        self.request_frame();
        Ok(())
    }

    /// Switches the displayed model. While running this starts a load that
    /// supersedes any one in flight; otherwise the URL is used on initialize.
    pub fn set_model_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.model_url = Some(url.clone());
        if self.state == LifecycleState::Running {
            self.start_model_load(url);
        }
    }

    /// Replaces the exhibit image list, index-aligned with the screens.
    pub fn set_images(&mut self, images: Vec<String>) {
        self.images = images;
        if self.state == LifecycleState::Running {
            self.start_image_load();
        }
    }

    fn start_model_load(&mut self, url: String) {
        let source = Arc::clone(&self.source);
        self.model_loader.load(url, move |url, cancel| {
            let mut model = source.load_model(url, cancel)?;
            cancel.check()?;
            model.enable_shadows();
            Ok(model)
        });
    }

    fn start_image_load(&mut self) {
        let source = Arc::clone(&self.source);
        let urls = self.images.clone();
        let label = format!("{} exhibit images", urls.len());
        self.image_loader
            .load(label, move |_, cancel| load_images(source.as_ref(), &urls, cancel));
    }

    /// Entry point for host event callbacks. Events queue until the next
    /// tick, except that a pointer release resolves its click right away.
    pub fn handle_input(&mut self, event: InputEvent) {
        if !self.listening {
            return;
        }
        self.input.post(event);
        if matches!(event, InputEvent::PointerUp | InputEvent::TouchEnd { .. }) {
            for click in self.input.pump() {
                self.resolve_click(click.x, click.y);
            }
        }
    }

    /// Resolves a click at pixel (`x`, `y`) against the screens.
    pub fn click(&mut self, x: f32, y: f32) -> Option<usize> {
        if self.state != LifecycleState::Running {
            return None;
        }
        self.resolve_click(x, y)
    }

    fn resolve_click(&mut self, x: f32, y: f32) -> Option<usize> {
        self.refresh_pick_view();
        let index = self.raycaster.click_test(x, y)?;
        log::debug!("click on screen {}", index);
        self.host.on_click_screen(index);
        Some(index)
    }

    fn refresh_pick_view(&mut self) {
        let (width, height) = self.viewport;
        self.raycaster
            .set_view(PickView::new(self.camera.view_projection(), width, height));
    }

    /// One frame: input, finished loads, camera, render, hover, next frame.
    pub fn tick(&mut self, dt: f32) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Running {
            return Err(LifecycleError::InvalidState {
                operation: "tick",
                state: self.state,
            });
        }

        for click in self.input.pump() {
            self.resolve_click(click.x, click.y);
        }
        self.apply_finished_loads();
        self.camera.update(dt, &mut self.input);
        self.render_frame();
        self.update_hover();
        self.request_frame();
        Ok(())
    }

    fn apply_finished_loads(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        if let Some(loaded) = self.model_loader.poll() {
            match loaded.result {
                Ok(model) => match self.scene.attach_model(backend, model) {
                    Ok(()) => self.raycaster.set_targets(self.scene.pick_targets()),
                    Err(err) => log::warn!("model {} could not be attached: {}", loaded.url, err),
                },
                Err(err) => log::warn!("model {} failed to load: {}", loaded.url, err),
            }
        }

        if let Some(loaded) = self.image_loader.poll() {
            match loaded.result {
                Ok(images) => {
                    log::info!("{} landed", loaded.url);
                    self.scene.set_images(backend, images);
                }
                Err(err) => log::warn!("{} failed: {}", loaded.url, err),
            }
        }
    }

    fn render_frame(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let draws = self.scene.draw_list();
        let frame = FrameDesc {
            view_proj: self.camera.view_projection(),
            camera_position: self.camera.position(),
            lights: self.scene.lights(),
            clear_color: self.config.scene.clear_color,
            draws: &draws,
        };
        if let Err(err) = backend.render(&frame) {
            log::warn!("frame skipped: {}", err);
        }
    }

    fn update_hover(&mut self) {
        self.refresh_pick_view();
        let hit = self
            .input
            .pointer_position()
            .and_then(|(x, y)| self.raycaster.hover_test(x, y));

        let key = |hit: &Option<PickHit>| hit.map(|h| (h.index, h.anchor));
        if key(&hit) == key(&self.hover) {
            return;
        }
        match hit {
            Some(h) => self.host.on_hover_screen(true, h.anchor.0, h.anchor.1),
            None => self.host.on_hover_screen(false, 0.0, 0.0),
        }
        self.hover = hit;
    }

    fn request_frame(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.request_frame();
        }
    }

    /// Aspect ratio and backend viewport; the lifecycle state is untouched.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.camera.set_aspect(width, height);
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(width, height);
        }
        log::debug!("viewer resized to {}x{}", width, height);
    }

    /// Stops the frame loop and releases everything attached to the backend,
    /// then hands the detached backend back. Calling it again is a no-op.
    pub fn dispose(&mut self) -> Option<B> {
        if self.state == LifecycleState::Uninitialized {
            return None;
        }
        self.state = LifecycleState::Disposing;
        log::info!("viewer disposing");

        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.cancel();
        }
        self.listening = false;
        self.input.reset();
        self.model_loader.cancel();
        self.image_loader.cancel();
        self.raycaster.clear();
        if self.hover.take().is_some() {
            self.host.on_hover_screen(false, 0.0, 0.0);
        }

        let backend = self.backend.take().map(|mut backend| {
            self.scene.release(&mut backend);
            backend.detach();
            backend
        });

        self.state = LifecycleState::Uninitialized;
        log::info!("viewer disposed");
        backend
    }
}

impl<B: RenderBackend, H: ExhibitHost> Drop for Viewer<B, H> {
    fn drop(&mut self) {
        self.dispose();
    }
}
