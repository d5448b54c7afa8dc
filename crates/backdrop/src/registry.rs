//! Shader source registry and uniform schema layout.
//!
//! A variant's schema is turned into a [`UniformLayout`] once per program
//! build. The layout mirrors what the wgpu backend declares in the generated
//! GLSL prologue:
//!
//! ```text
//!   layout(std140, set = 0, binding = 0) uniform BackdropParams {
//!       <numeric uniforms in schema order>
//!       vec2 backdrop_viewport;
//!   } backdrop_params;
//!
//!   layout(set = 1, binding = 2n)     texture2D / textureCube
//!   layout(set = 1, binding = 2n + 1) sampler
//! ```
//!
//! Offsets follow std140 packing so the CPU-side staging block can be copied
//! into the uniform buffer verbatim.

use std::collections::BTreeMap;

use crate::config::VariantConfig;
use crate::error::{SchemaError, UniformError};
use crate::types::{UniformKind, UniformSpec, UniformValue};
use crate::variants;

/// Hidden block member carrying the framebuffer size for coordinate remapping.
pub const VIEWPORT_FIELD: &str = "backdrop_viewport";

/// Prefix reserved for identifiers injected by the engine.
pub const RESERVED_PREFIX: &str = "backdrop_";

/// Numeric uniform placed inside the std140 block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockField {
    pub name: String,
    pub kind: UniformKind,
    pub offset: usize,
}

/// Texture uniform bound through a texture/sampler pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub kind: UniformKind,
    pub slot: u32,
}

impl TextureSlot {
    pub fn texture_binding(&self) -> u32 {
        self.slot * 2
    }

    pub fn sampler_binding(&self) -> u32 {
        self.slot * 2 + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    specs: Vec<UniformSpec>,
    fields: Vec<BlockField>,
    textures: Vec<TextureSlot>,
    viewport_offset: usize,
    block_size: usize,
}

fn std140_alignment(kind: UniformKind) -> usize {
    match kind {
        UniformKind::Scalar => 4,
        UniformKind::Vec2 => 8,
        UniformKind::Vec3 | UniformKind::Mat2 => 16,
        UniformKind::Texture2D | UniformKind::TextureCube => 0,
    }
}

fn std140_size(kind: UniformKind) -> usize {
    match kind {
        UniformKind::Scalar => 4,
        UniformKind::Vec2 => 8,
        UniformKind::Vec3 => 12,
        // Two columns, each padded to a vec4.
        UniformKind::Mat2 => 32,
        UniformKind::Texture2D | UniformKind::TextureCube => 0,
    }
}

fn align_to(offset: usize, alignment: usize) -> usize {
    offset.div_ceil(alignment) * alignment
}

pub(crate) fn is_glsl_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !name.starts_with("gl_")
        && !name.starts_with(RESERVED_PREFIX)
}

impl UniformLayout {
    pub fn new(specs: &[UniformSpec]) -> Result<Self, SchemaError> {
        let mut seen = std::collections::HashSet::new();
        let mut fields = Vec::new();
        let mut textures = Vec::new();
        let mut offset = 0usize;

        for spec in specs {
            if !is_glsl_identifier(&spec.name) {
                return Err(SchemaError::InvalidName(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(SchemaError::Duplicate(spec.name.clone()));
            }
            if !spec.role.accepts(spec.kind) {
                return Err(SchemaError::RoleMismatch {
                    name: spec.name.clone(),
                    role: format!("{:?}", spec.role).to_ascii_lowercase(),
                    kind: spec.kind,
                });
            }

            if spec.kind.is_texture() {
                textures.push(TextureSlot {
                    name: spec.name.clone(),
                    kind: spec.kind,
                    slot: textures.len() as u32,
                });
            } else {
                offset = align_to(offset, std140_alignment(spec.kind));
                fields.push(BlockField {
                    name: spec.name.clone(),
                    kind: spec.kind,
                    offset,
                });
                offset += std140_size(spec.kind);
            }
        }

        let viewport_offset = align_to(offset, std140_alignment(UniformKind::Vec2));
        let block_size = align_to(viewport_offset + std140_size(UniformKind::Vec2), 16);

        Ok(Self {
            specs: specs.to_vec(),
            fields,
            textures,
            viewport_offset,
            block_size,
        })
    }

    pub fn specs(&self) -> &[UniformSpec] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Option<&UniformSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn fields(&self) -> &[BlockField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&BlockField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn textures(&self) -> &[TextureSlot] {
        &self.textures
    }

    pub fn texture(&self, name: &str) -> Option<&TextureSlot> {
        self.textures.iter().find(|slot| slot.name == name)
    }

    pub fn viewport_offset(&self) -> usize {
        self.viewport_offset
    }

    /// Byte size of the std140 block, rounded up to 16.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Validates a caller-supplied value against the schema.
    pub fn check_value(
        &self,
        name: &str,
        value: &UniformValue,
    ) -> Result<&UniformSpec, UniformError> {
        let spec = self
            .spec(name)
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
        Ok(spec)
    }

    /// Validates that a texture of `kind` may be bound to `name`.
    pub fn check_texture(&self, name: &str, kind: UniformKind) -> Result<&TextureSlot, UniformError> {
        let slot = self
            .texture(name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))?;
        if slot.kind != kind {
            return Err(UniformError::KindMismatch {
                name: name.to_string(),
                expected: slot.kind,
                found: kind,
            });
        }
        Ok(slot)
    }
}

/// Named table of variant configurations, seeded with the built-in effects.
#[derive(Debug, Clone)]
pub struct VariantRegistry {
    variants: BTreeMap<String, VariantConfig>,
}

impl VariantRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            variants: BTreeMap::new(),
        }
    }

    /// Registry holding the fractal-noise, trigonometric and gold variants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(variants::fractal_noise());
        registry.register(variants::trigonometric());
        registry.register(variants::gold_ingot());
        registry
    }

    /// Adds or replaces a variant under its own name.
    pub fn register(&mut self, variant: VariantConfig) -> Option<VariantConfig> {
        self.variants.insert(variant.name.clone(), variant)
    }

    /// Looks a variant up by name or alias.
    pub fn get(&self, name: &str) -> Option<&VariantConfig> {
        let normalized = name.trim().to_ascii_lowercase();
        let canonical = match normalized.as_str() {
            "fractal" | "noise" | "fbm" => variants::FRACTAL_NOISE,
            "trig" | "simple" | "plasma" => variants::TRIGONOMETRIC,
            "gold" | "ingot" | "reflection" => variants::GOLD_INGOT,
            other => other,
        };
        self.variants.get(canonical)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UniformRole;

    #[test]
    fn packs_fields_with_std140_alignment() {
        let layout = UniformLayout::new(&[
            UniformSpec::resolution("uResolution"),
            UniformSpec::time("uTime"),
            UniformSpec::pointer("uMouse"),
            UniformSpec::color("uColorA"),
            UniformSpec::color("uColorB"),
            UniformSpec::custom("uIntensity", UniformKind::Scalar),
        ])
        .expect("layout");

        let offsets: Vec<_> = layout
            .fields()
            .iter()
            .map(|field| (field.name.as_str(), field.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("uResolution", 0),
                ("uTime", 8),
                ("uMouse", 16),
                ("uColorA", 32),
                ("uColorB", 48),
                ("uIntensity", 60),
            ]
        );
        assert_eq!(layout.viewport_offset(), 64);
        assert_eq!(layout.block_size(), 80);
    }

    #[test]
    fn mat2_occupies_two_padded_columns() {
        let layout = UniformLayout::new(&[
            UniformSpec::custom("u_scale", UniformKind::Scalar),
            UniformSpec::custom("u_rotation", UniformKind::Mat2),
            UniformSpec::custom("u_after", UniformKind::Scalar),
        ])
        .expect("layout");
        assert_eq!(layout.field("u_rotation").map(|f| f.offset), Some(16));
        assert_eq!(layout.field("u_after").map(|f| f.offset), Some(48));
    }

    #[test]
    fn textures_get_sequential_slots() {
        let layout = UniformLayout::new(&[
            UniformSpec::texture("u_noise"),
            UniformSpec::resolution("u_resolution"),
            UniformSpec::new("u_sky", UniformKind::TextureCube, UniformRole::Texture),
        ])
        .expect("layout");
        let slots: Vec<_> = layout
            .textures()
            .iter()
            .map(|slot| (slot.name.as_str(), slot.texture_binding(), slot.sampler_binding()))
            .collect();
        assert_eq!(slots, vec![("u_noise", 0, 1), ("u_sky", 2, 3)]);
        assert_eq!(layout.fields().len(), 1);
    }

    #[test]
    fn rejects_duplicates_reserved_names_and_bad_roles() {
        assert_eq!(
            UniformLayout::new(&[UniformSpec::time("t"), UniformSpec::time("t")]),
            Err(SchemaError::Duplicate("t".into()))
        );
        assert_eq!(
            UniformLayout::new(&[UniformSpec::time("backdrop_time")]),
            Err(SchemaError::InvalidName("backdrop_time".into()))
        );
        assert_eq!(
            UniformLayout::new(&[UniformSpec::time("9lives")]),
            Err(SchemaError::InvalidName("9lives".into()))
        );
        assert!(matches!(
            UniformLayout::new(&[UniformSpec::new(
                "uTime",
                UniformKind::Vec2,
                UniformRole::Time
            )]),
            Err(SchemaError::RoleMismatch { .. })
        ));
    }

    #[test]
    fn check_value_enforces_schema() {
        let layout = UniformLayout::new(&[
            UniformSpec::time("uTime"),
            UniformSpec::color("uColorA"),
        ])
        .expect("layout");

        assert!(layout
            .check_value("uColorA", &UniformValue::Vec3([1.0, 0.0, 0.0]))
            .is_ok());
        assert_eq!(
            layout.check_value("uMissing", &UniformValue::Scalar(1.0)),
            Err(UniformError::Unknown("uMissing".into()))
        );
        assert_eq!(
            layout.check_value("uTime", &UniformValue::Scalar(1.0)),
            Err(UniformError::EngineOwned("uTime".into()))
        );
        assert!(matches!(
            layout.check_value("uColorA", &UniformValue::Scalar(1.0)),
            Err(UniformError::KindMismatch { .. })
        ));
    }

    #[test]
    fn registry_resolves_aliases() {
        let registry = VariantRegistry::with_builtins();
        assert_eq!(
            registry.get("fractal").map(|v| v.name.as_str()),
            Some(variants::FRACTAL_NOISE)
        );
        assert_eq!(
            registry.get("Gold").map(|v| v.name.as_str()),
            Some(variants::GOLD_INGOT)
        );
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names().count(), 3);
    }
}
