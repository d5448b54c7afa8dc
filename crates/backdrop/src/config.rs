//! Variant configuration and the on-disk manifest format.
//!
//! `VariantConfig` is what the engine consumes: both shader stages, the
//! uniform schema, initial values for caller-supplied uniforms, texture
//! sources and context attributes. `VariantManifest` is the serde view of a
//! `variant.toml` (or `.json`) file that resolves into a `VariantConfig`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compile;
use crate::error::{ConfigError, InitError, UniformError};
use crate::registry::UniformLayout;
use crate::types::{
    ContextAttributes, ShaderSource, ShaderStage, TextureSource, UniformKind, UniformRole,
    UniformSpec, UniformValue,
};
use crate::variants::QUAD_VERTEX_SHADER;

/// Everything the engine needs to build and drive one background effect.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantConfig {
    pub name: String,
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
    pub uniforms: Vec<UniformSpec>,
    pub initial_values: BTreeMap<String, UniformValue>,
    pub textures: BTreeMap<String, TextureSource>,
    pub context: ContextAttributes,
}

impl VariantConfig {
    pub fn new(
        name: impl Into<String>,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex: ShaderSource::vertex(vertex),
            fragment: ShaderSource::fragment(fragment),
            uniforms: Vec::new(),
            initial_values: BTreeMap::new(),
            textures: BTreeMap::new(),
            context: ContextAttributes::default(),
        }
    }

    pub fn with_uniform(mut self, spec: UniformSpec) -> Self {
        self.uniforms.push(spec);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.initial_values.insert(name.into(), value);
        self
    }

    pub fn with_texture(mut self, name: impl Into<String>, source: TextureSource) -> Self {
        self.textures.insert(name.into(), source);
        self
    }

    pub fn with_context(mut self, context: ContextAttributes) -> Self {
        self.context = context;
        self
    }

    /// Checks stages, schema, initial values and textures; returns the layout.
    pub fn validate(&self) -> Result<UniformLayout, InitError> {
        if self.vertex.stage != ShaderStage::Vertex {
            return Err(ConfigError::Invalid("vertex source is tagged as a fragment stage".into()).into());
        }
        if self.fragment.stage != ShaderStage::Fragment {
            return Err(ConfigError::Invalid("fragment source is tagged as a vertex stage".into()).into());
        }

        let layout = UniformLayout::new(&self.uniforms)?;
        for (name, value) in &self.initial_values {
            layout.check_value(name, value)?;
        }
        for (name, source) in &self.textures {
            layout.check_texture(name, source.kind())?;
        }
        Ok(layout)
    }

    /// [`validate`](Self::validate), then runs both wrapped stages through
    /// the GLSL frontend so shader errors surface without a window or GPU.
    pub fn check_shaders(&self) -> Result<UniformLayout, InitError> {
        let layout = self.validate()?;
        compile::validate_stage(&self.vertex, &layout)?;
        compile::validate_stage(&self.fragment, &layout)?;
        Ok(layout)
    }

    /// Values for every caller-supplied uniform, zero-filled where unset.
    pub fn resolved_values(&self) -> BTreeMap<String, UniformValue> {
        let mut values = BTreeMap::new();
        for spec in &self.uniforms {
            if !spec.role.is_caller_supplied() {
                continue;
            }
            let value = self
                .initial_values
                .get(&spec.name)
                .copied()
                .or_else(|| UniformValue::zero(spec.kind));
            if let Some(value) = value {
                values.insert(spec.name.clone(), value);
            }
        }
        values
    }

    /// True when both configs compile to the same program.
    pub fn same_program(&self, other: &VariantConfig) -> bool {
        self.vertex == other.vertex
            && self.fragment == other.fragment
            && self.uniforms == other.uniforms
    }

    /// Loads a manifest and the shader sources it references.
    pub fn from_manifest_path(path: &Path) -> Result<Self, ConfigError> {
        let manifest = VariantManifest::load(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let fallback_name = path
            .parent()
            .and_then(|dir| dir.file_name())
            .or_else(|| path.file_stem())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_string());
        manifest.into_variant(base_dir, &fallback_name)
    }

    /// Overrides a caller-supplied uniform, rejecting names outside the schema.
    pub fn set_value(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        let spec = self
            .uniforms
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))?;
        if !spec.role.is_caller_supplied() {
            return Err(UniformError::EngineOwned(name.to_string()));
        }
        if spec.kind != value.kind() {
            return Err(UniformError::KindMismatch {
                name: name.to_string(),
                expected: spec.kind,
                found: value.kind(),
            });
        }
        self.initial_values.insert(name.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VariantManifest {
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Vertex shader path; the pass-through quad shader when absent.
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    pub fragment: PathBuf,
    #[serde(default)]
    pub context: ContextAttributes,
    #[serde(default)]
    pub uniforms: Vec<ManifestUniform>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ManifestUniform {
    pub name: String,
    pub role: UniformRole,
    #[serde(default)]
    pub kind: Option<UniformKind>,
    #[serde(default)]
    pub value: Option<UniformValue>,
    #[serde(default)]
    pub texture: Option<TextureSource>,
}

impl ManifestUniform {
    fn resolved_kind(&self) -> Option<UniformKind> {
        self.kind
            .or_else(|| self.texture.as_ref().map(TextureSource::kind))
            .or_else(|| self.role.default_kind())
            .or_else(|| self.value.as_ref().map(UniformValue::kind))
    }
}

impl VariantManifest {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Reads a manifest, choosing the parser from the file extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let manifest = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents)?,
            _ => Self::from_toml_str(&contents)?,
        };
        let issues = manifest.validate();
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues.join("; ")));
        }
        Ok(manifest)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for uniform in &self.uniforms {
            let Some(kind) = uniform.resolved_kind() else {
                issues.push(format!(
                    "uniform '{}' needs a kind or a value to infer one from",
                    uniform.name
                ));
                continue;
            };
            if !uniform.role.accepts(kind) {
                issues.push(format!(
                    "uniform '{}' has kind {} which its role does not accept",
                    uniform.name, kind
                ));
            }
            if let Some(value) = &uniform.value {
                if !uniform.role.is_caller_supplied() {
                    issues.push(format!(
                        "uniform '{}' is engine-driven and cannot carry a value",
                        uniform.name
                    ));
                } else if value.kind() != kind {
                    issues.push(format!(
                        "uniform '{}' value is {} but kind is {}",
                        uniform.name,
                        value.kind(),
                        kind
                    ));
                }
            }
            match (&uniform.texture, uniform.role) {
                (Some(texture), UniformRole::Texture) if texture.kind() != kind => {
                    issues.push(format!(
                        "uniform '{}' texture source is {} but kind is {}",
                        uniform.name,
                        texture.kind(),
                        kind
                    ));
                }
                (Some(_), role) if role != UniformRole::Texture => {
                    issues.push(format!(
                        "uniform '{}' declares a texture but is not a texture role",
                        uniform.name
                    ));
                }
                _ => {}
            }
        }
        issues
    }

    /// Reads the referenced sources and assembles a `VariantConfig`.
    pub fn into_variant(self, base_dir: &Path, fallback_name: &str) -> Result<VariantConfig, ConfigError> {
        let read = |relative: &Path| -> Result<String, ConfigError> {
            let path = base_dir.join(relative);
            fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
        };

        let vertex = match &self.vertex {
            Some(path) => read(path)?,
            None => QUAD_VERTEX_SHADER.to_string(),
        };
        let fragment = read(&self.fragment)?;
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());

        let mut variant = VariantConfig::new(name, vertex, fragment).with_context(self.context);
        for uniform in self.uniforms {
            let kind = uniform.resolved_kind().ok_or_else(|| {
                ConfigError::Invalid(format!("uniform '{}' has no kind", uniform.name))
            })?;
            if let Some(value) = uniform.value {
                variant.initial_values.insert(uniform.name.clone(), value);
            }
            if let Some(texture) = uniform.texture {
                variant
                    .textures
                    .insert(uniform.name.clone(), resolve_texture_paths(texture, base_dir));
            }
            variant.uniforms.push(UniformSpec::new(uniform.name, kind, uniform.role));
        }
        Ok(variant)
    }
}

fn resolve_texture_paths(source: TextureSource, base_dir: &Path) -> TextureSource {
    match source {
        TextureSource::Image { path } if path.is_relative() => TextureSource::Image {
            path: base_dir.join(path),
        },
        TextureSource::Cubemap { directory } if directory.is_relative() => {
            TextureSource::Cubemap {
                directory: base_dir.join(directory),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants;

    const SAMPLE: &str = r#"
name = "aurora"
fragment = "aurora.frag"

[context]
alpha = false

[[uniforms]]
name = "uTime"
role = "time"

[[uniforms]]
name = "uResolution"
role = "resolution"

[[uniforms]]
name = "uTint"
role = "color"
value = [1.0, 0.8, 0.2]

[[uniforms]]
name = "uSpeed"
role = "custom"
value = 2

[[uniforms]]
name = "uNoise"
role = "texture"
texture = { type = "noise", size = 64, seed = 3 }

[[uniforms]]
name = "uPhoto"
role = "texture"
texture = { type = "image", path = "photo.png" }
"#;

    #[test]
    fn parses_sample_manifest() {
        let manifest = VariantManifest::from_toml_str(SAMPLE).expect("parse manifest");
        assert_eq!(manifest.name.as_deref(), Some("aurora"));
        assert!(!manifest.context.alpha);
        assert!(manifest.context.antialias);
        assert_eq!(manifest.uniforms.len(), 6);
        assert_eq!(
            manifest.uniforms[3].value,
            Some(UniformValue::Scalar(2.0))
        );
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn validate_reports_role_conflicts() {
        let manifest = VariantManifest::from_toml_str(
            r#"
fragment = "x.frag"

[[uniforms]]
name = "uTime"
role = "time"
value = 1.0

[[uniforms]]
name = "uThing"
role = "custom"

[[uniforms]]
name = "uTint"
role = "color"
value = [1.0, 0.5]
"#,
        )
        .expect("parse manifest");

        let issues = manifest.validate();
        assert_eq!(issues.len(), 3, "{issues:?}");
        assert!(issues[0].contains("engine-driven"));
        assert!(issues[1].contains("needs a kind"));
        assert!(issues[2].contains("value is vec2"));
    }

    #[test]
    fn loads_manifest_and_resolves_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("variant.toml"), SAMPLE).expect("write manifest");
        fs::write(
            dir.path().join("aurora.frag"),
            "void main() { gl_FragColor = vec4(1.0); }",
        )
        .expect("write shader");

        let variant =
            VariantConfig::from_manifest_path(&dir.path().join("variant.toml")).expect("load");
        assert_eq!(variant.name, "aurora");
        assert_eq!(variant.vertex.text, QUAD_VERTEX_SHADER);
        assert_eq!(
            variant.textures.get("uPhoto"),
            Some(&TextureSource::Image {
                path: dir.path().join("photo.png")
            })
        );
        let layout = variant.validate().expect("valid variant");
        assert_eq!(layout.textures().len(), 2);
    }

    #[test]
    fn loads_json_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("variant.json"),
            r#"{"fragment": "f.frag", "uniforms": [{"name": "t", "role": "time"}]}"#,
        )
        .expect("write manifest");
        fs::write(dir.path().join("f.frag"), "void main() {}").expect("write shader");

        let variant =
            VariantConfig::from_manifest_path(&dir.path().join("variant.json")).expect("load");
        assert_eq!(variant.uniforms, vec![UniformSpec::time("t")]);
    }

    #[test]
    fn missing_fragment_is_reported_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("variant.toml"), "fragment = \"gone.frag\"").expect("write");
        let err = VariantConfig::from_manifest_path(&dir.path().join("variant.toml"))
            .expect_err("missing shader");
        assert!(err.to_string().contains("gone.frag"));
    }

    #[test]
    fn validate_rejects_values_outside_schema() {
        let variant = variants::trigonometric().with_value("uColorA", UniformValue::Vec3([0.0; 3]));
        assert!(matches!(
            variant.validate(),
            Err(InitError::Uniform(UniformError::Unknown(name))) if name == "uColorA"
        ));
    }

    #[test]
    fn set_value_checks_kind() {
        let mut variant = variants::fractal_noise();
        variant
            .set_value("uIntensity", UniformValue::Scalar(0.2))
            .expect("set intensity");
        assert!(variant
            .set_value("uIntensity", UniformValue::Vec2([0.0, 1.0]))
            .is_err());
        assert_eq!(
            variant.resolved_values().get("uIntensity"),
            Some(&UniformValue::Scalar(0.2))
        );
    }

    #[test]
    fn same_program_ignores_values() {
        let a = variants::fractal_noise();
        let b = variants::fractal_noise().with_value("uIntensity", UniformValue::Scalar(0.1));
        assert!(a.same_program(&b));
        assert!(!a.same_program(&variants::trigonometric()));
    }
}
