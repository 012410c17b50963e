//! gallery-walk - walk-through engine for virtual exhibitions
//!
//! The crate is the navigation-and-interaction core of an exhibition viewer:
//! - `app` drives the init/running/dispose lifecycle and normalizes input
//! - `assets` loads glTF scenes and exhibit images off the frame loop
//! - `render` holds the camera rig, screen picking and the render backends
//! - `scene` owns everything attached to the GPU for one viewer
//!
//! A host owns the window, forwards events into [`app::Viewer`] and receives
//! hover/click notifications through [`app::ExhibitHost`].

pub mod app;
pub mod assets;
pub mod config;
pub mod render;
pub mod scene;

pub use app::{ExhibitHost, FrameScheduler, LifecycleError, LifecycleState, Viewer};
pub use config::{CameraSettings, ExhibitManifest, SceneSettings, ViewerConfig};
