//! Gallery Walk - first-person walk-through of a virtual exhibition
//!
//! Loads a glTF gallery, lays exhibit images onto its screens and lets you
//! walk around with WASD/arrows and drag-to-look. Clicking a screen is
//! reported in the log; hovering one shows up in the title bar.

mod host;

use clap::Parser;
use gallery_walk::{ExhibitManifest, ViewerConfig};
use host::{Exhibit, HostError};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gallery-walk", version, about = "Walk through a 3D exhibition")]
struct Cli {
    /// Exhibit manifest (JSON): model_url, images, camera and scene settings.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// glTF/GLB model path or URL; overrides the manifest's.
    #[arg(long)]
    model: Option<String>,

    /// Exhibit image for the next screen; repeat in screen order.
    #[arg(long = "image")]
    images: Vec<String>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Run this many frames without a window, then exit.
    #[arg(long, value_name = "TICKS")]
    headless: Option<u32>,
}

impl Cli {
    fn exhibit(self) -> Result<(Exhibit, Option<u32>), HostError> {
        let (config, mut model_url, mut images) = match &self.manifest {
            Some(path) => {
                let manifest = ExhibitManifest::load_from_file(path)?;
                log::info!("loaded manifest {}", path.display());
                (manifest.viewer, Some(manifest.model_url), manifest.images)
            }
            None => (ViewerConfig::default(), None, Vec::new()),
        };
        if self.model.is_some() {
            model_url = self.model;
        }
        if !self.images.is_empty() {
            images = self.images;
        }
        if model_url.is_none() {
            log::warn!("no model given, showing the empty floor");
        }

        let exhibit = Exhibit {
            config,
            model_url,
            images,
            width: self.width,
            height: self.height,
        };
        Ok((exhibit, self.headless))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let result = Cli::parse().exhibit().and_then(|(exhibit, headless)| match headless {
        Some(ticks) => host::run_headless(exhibit, ticks),
        None => host::run(exhibit),
    });

    match result {
        Ok(()) => log::info!("Goodbye!"),
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(1);
        }
    }
}
