use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest has no model_url")]
    MissingModel,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Starting pose and feel of the walking camera.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub position: [f32; 3],
    pub yaw: f32,
    pub pitch: f32,
    /// Walking speed in world units per second.
    pub speed: f32,
    /// Radians of turn per dragged pixel.
    pub sensitivity: f32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: [0.0, 1.6, 5.0],
            yaw: 0.0,
            pitch: 0.0,
            speed: 3.0,
            sensitivity: 0.003,
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Lights, backdrop and ground grid.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub clear_color: [f64; 4],
    pub ambient: [f32; 3],
    pub sun_direction: [f32; 3],
    pub sun_color: [f32; 3],
    pub grid_size: f32,
    pub grid_divisions: u32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.12, 1.0],
            ambient: [0.35, 0.35, 0.38],
            sun_direction: [-0.4, -1.0, -0.3],
            sun_color: [0.9, 0.88, 0.82],
            grid_size: 40.0,
            grid_divisions: 40,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraSettings,
    pub scene: SceneSettings,
}

/// What an exhibition shows: one model plus the images hung on its screens.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExhibitManifest {
    pub model_url: String,
    pub images: Vec<String>,
    #[serde(flatten)]
    pub viewer: ViewerConfig,
}

impl ExhibitManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json)?;
        if manifest.model_url.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        Ok(manifest)
    }

    /// Reads a manifest. Relative local paths inside it resolve against the
    /// manifest's own directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::from_json(&json)?;
        if let Some(base) = path.parent() {
            manifest.resolve_relative(base);
        }
        Ok(manifest)
    }

    pub fn resolve_relative(&mut self, base: &Path) {
        self.model_url = resolve_url(base, &self.model_url);
        for image in &mut self.images {
            *image = resolve_url(base, image);
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn resolve_url(base: &Path, url: &str) -> String {
    if url.is_empty() || is_remote(url) || Path::new(url).is_absolute() {
        return url.to_string();
    }
    base.join(url).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_manifest_fills_defaults() {
        let manifest = ExhibitManifest::from_json(r#"{ "model_url": "hall.glb" }"#).unwrap();
        assert_eq!(manifest.model_url, "hall.glb");
        assert!(manifest.images.is_empty());
        assert_eq!(manifest.viewer, ViewerConfig::default());
    }

    #[test]
    fn camera_block_overrides_only_named_fields() {
        let manifest = ExhibitManifest::from_json(
            r#"{
                "model_url": "hall.glb",
                "images": ["a.png", "b.png"],
                "camera": { "speed": 6.5, "position": [1.0, 1.7, 2.0] }
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.images.len(), 2);
        assert_eq!(manifest.viewer.camera.speed, 6.5);
        assert_eq!(manifest.viewer.camera.position, [1.0, 1.7, 2.0]);
        assert_eq!(manifest.viewer.camera.sensitivity, CameraSettings::default().sensitivity);
    }

    #[test]
    fn missing_model_is_rejected() {
        assert!(matches!(
            ExhibitManifest::from_json(r#"{ "images": [] }"#),
            Err(ConfigError::MissingModel)
        ));
        assert!(matches!(
            ExhibitManifest::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn relative_paths_resolve_against_manifest_dir() {
        let mut manifest = ExhibitManifest {
            model_url: "models/hall.glb".to_string(),
            images: vec![
                "img/one.png".to_string(),
                "https://cdn.example.com/two.png".to_string(),
            ],
            ..ExhibitManifest::default()
        };
        manifest.resolve_relative(Path::new("/srv/exhibit"));
        assert_eq!(
            Path::new(&manifest.model_url),
            Path::new("/srv/exhibit/models/hall.glb")
        );
        assert_eq!(Path::new(&manifest.images[0]), Path::new("/srv/exhibit/img/one.png"));
        assert_eq!(manifest.images[1], "https://cdn.example.com/two.png");
    }

    #[test]
    fn save_load_via_file() {
        let manifest = ExhibitManifest {
            model_url: "/abs/hall.gltf".to_string(),
            images: vec!["/abs/a.png".to_string()],
            ..ExhibitManifest::default()
        };
        let path = std::env::temp_dir().join(format!(
            "gallery_walk_manifest_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, manifest.to_json().unwrap()).unwrap();
        let loaded = ExhibitManifest::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, manifest);
    }
}
