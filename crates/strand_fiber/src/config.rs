//! Root configuration
//!
//! [`RootConfig`] covers everything a root needs at mount time. The plain
//! settings deserialize from TOML:
//!
//! ```toml
//! frameloop = "demand"
//! shadows = "soft"
//! dpr = 2.0
//!
//! [camera]
//! fov = 40
//! position = [0, 2, 8]
//!
//! [gl]
//! toneMappingExposure = 1.2
//! ```
//!
//! Live objects (a custom camera, scene, renderer, catalogue or loader cache)
//! are injected with the builder methods instead.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Deserializer};
use strand_3d::{ObjectRef, Renderer, Value};

use crate::catalogue::Catalogue;
use crate::error::{FiberError, Result};
use crate::loader::LoaderCache;

/// When frames are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameLoop {
    /// Every tick
    #[default]
    Always,
    /// Only after [`invalidate`](crate::Root::invalidate) or a prop change
    Demand,
    /// Only on explicit [`advance`](crate::Root::advance)
    Never,
}

/// Renderer shadow map algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowMode {
    #[default]
    Off,
    Basic,
    Pcf,
    Soft,
    Variance,
}

impl ShadowMode {
    /// Engine `shadowMap.type` constant, `None` when shadows are off
    pub fn shadow_map_type(self) -> Option<f64> {
        match self {
            ShadowMode::Off => None,
            ShadowMode::Basic => Some(0.0),
            ShadowMode::Pcf => Some(1.0),
            ShadowMode::Soft => Some(2.0),
            ShadowMode::Variance => Some(3.0),
        }
    }
}

// `shadows = true` means soft shadows
fn deserialize_shadows<'de, D>(deserializer: D) -> std::result::Result<ShadowMode, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Flag(bool),
        Mode(ShadowMode),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Flag(true) => ShadowMode::Soft,
        Repr::Flag(false) => ShadowMode::Off,
        Repr::Mode(mode) => mode,
    })
}

/// Configuration passed to [`create_root`](crate::create_root)
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RootConfig {
    pub frameloop: FrameLoop,
    #[serde(deserialize_with = "deserialize_shadows")]
    pub shadows: ShadowMode,
    /// Output linear colour instead of sRGB
    pub linear: bool,
    /// Disable tone mapping
    pub flat: bool,
    /// Legacy lighting mode (no colour management)
    pub legacy: bool,
    /// Use an orthographic default camera
    pub orthographic: bool,
    /// Device pixel ratio
    pub dpr: f32,
    /// Prop overrides applied to the camera
    pub camera: toml::Table,
    /// Prop overrides applied to the scene
    pub scene: toml::Table,
    /// Prop overrides applied to the renderer settings object
    pub gl: toml::Table,
    /// Prop overrides applied to the raycaster
    pub raycaster: toml::Table,

    #[serde(skip)]
    pub camera_object: Option<ObjectRef>,
    #[serde(skip)]
    pub scene_object: Option<ObjectRef>,
    #[serde(skip)]
    pub renderer: Option<Rc<dyn Renderer>>,
    #[serde(skip)]
    pub catalogue: Option<Catalogue>,
    #[serde(skip)]
    pub loader_cache: Option<LoaderCache>,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            frameloop: FrameLoop::Always,
            shadows: ShadowMode::Off,
            linear: false,
            flat: false,
            legacy: false,
            orthographic: false,
            dpr: 1.0,
            camera: toml::Table::new(),
            scene: toml::Table::new(),
            gl: toml::Table::new(),
            raycaster: toml::Table::new(),
            camera_object: None,
            scene_object: None,
            renderer: None,
            catalogue: None,
            loader_cache: None,
        }
    }
}

impl fmt::Debug for RootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootConfig")
            .field("frameloop", &self.frameloop)
            .field("shadows", &self.shadows)
            .field("linear", &self.linear)
            .field("flat", &self.flat)
            .field("legacy", &self.legacy)
            .field("orthographic", &self.orthographic)
            .field("dpr", &self.dpr)
            .field("camera", &self.camera)
            .field("scene", &self.scene)
            .field("gl", &self.gl)
            .field("raycaster", &self.raycaster)
            .field("camera_object", &self.camera_object)
            .field("scene_object", &self.scene_object)
            .field("renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl RootConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|err| FiberError::Config(err.to_string()))
    }

    pub fn frameloop(mut self, mode: FrameLoop) -> Self {
        self.frameloop = mode;
        self
    }

    pub fn shadows(mut self, mode: ShadowMode) -> Self {
        self.shadows = mode;
        self
    }

    pub fn orthographic(mut self, enabled: bool) -> Self {
        self.orthographic = enabled;
        self
    }

    /// Use an existing camera. It is treated as manual and never refitted on
    /// resize.
    pub fn with_camera(mut self, camera: ObjectRef) -> Self {
        self.camera_object = Some(camera);
        self
    }

    pub fn with_scene(mut self, scene: ObjectRef) -> Self {
        self.scene_object = Some(scene);
        self
    }

    pub fn with_renderer(mut self, renderer: Rc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_catalogue(mut self, catalogue: Catalogue) -> Self {
        self.catalogue = Some(catalogue);
        self
    }

    pub fn with_loader_cache(mut self, cache: LoaderCache) -> Self {
        self.loader_cache = Some(cache);
        self
    }
}

/// Convert a TOML override table into engine prop values
pub(crate) fn table_props(section: &str, table: &toml::Table) -> Result<Vec<(String, Value)>> {
    table
        .iter()
        .map(|(key, value)| {
            let value = toml_value(value).map_err(|reason| {
                FiberError::Config(format!("[{section}] {key}: {reason}"))
            })?;
            Ok((key.clone(), value))
        })
        .collect()
}

fn toml_value(value: &toml::Value) -> std::result::Result<Value, String> {
    Ok(match value {
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Integer(i) => Value::Number(*i as f64),
        toml::Value::Float(f) => Value::Number(*f),
        toml::Value::String(s) => Value::Text(s.clone()),
        toml::Value::Array(items) => Value::List(
            items
                .iter()
                .map(toml_value)
                .collect::<std::result::Result<_, _>>()?,
        ),
        toml::Value::Table(_) => {
            return Err("nested tables are not supported, use dashed keys such as \"position-x\"".into())
        }
        toml::Value::Datetime(_) => return Err("datetimes are not supported".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RootConfig::from_toml_str("").unwrap();
        assert_eq!(config.frameloop, FrameLoop::Always);
        assert_eq!(config.shadows, ShadowMode::Off);
        assert_eq!(config.dpr, 1.0);
        assert!(config.camera.is_empty());
    }

    #[test]
    fn test_parse_full_document() {
        let config = RootConfig::from_toml_str(
            r#"
            frameloop = "demand"
            shadows = "variance"
            linear = true
            orthographic = true
            dpr = 2.0

            [camera]
            zoom = 50
            position = [0, 2, 8]
            "#,
        )
        .unwrap();
        assert_eq!(config.frameloop, FrameLoop::Demand);
        assert_eq!(config.shadows, ShadowMode::Variance);
        assert!(config.linear && config.orthographic);

        let props = table_props("camera", &config.camera).unwrap();
        assert!(props.contains(&("zoom".to_string(), Value::Number(50.0))));
        assert!(props.contains(&(
            "position".to_string(),
            Value::List(vec![
                Value::Number(0.0),
                Value::Number(2.0),
                Value::Number(8.0)
            ])
        )));
    }

    #[test]
    fn test_boolean_shadows() {
        let on = RootConfig::from_toml_str("shadows = true").unwrap();
        assert_eq!(on.shadows, ShadowMode::Soft);
        let off = RootConfig::from_toml_str("shadows = false").unwrap();
        assert_eq!(off.shadows, ShadowMode::Off);
    }

    #[test]
    fn test_rejects_unknown_and_nested() {
        assert!(matches!(
            RootConfig::from_toml_str("framelop = \"never\""),
            Err(FiberError::Config(_))
        ));

        let config = RootConfig::from_toml_str("[scene]\nfog = { near = 1 }").unwrap();
        let err = table_props("scene", &config.scene).unwrap_err();
        assert!(err.to_string().contains("[scene] fog"));
    }
}
