//! Turns WebGL-dialect GLSL into Vulkan GLSL 450 for wgpu's GLSL frontend.
//!
//! Steps performed on each stage:
//!
//! 1. Blank out `#version`/`precision` lines and the `uniform` declarations
//!    the schema covers. Lines are blanked rather than removed so compiler
//!    diagnostics keep the author's line numbers.
//! 2. Give `varying` declarations explicit locations, numbered in
//!    declaration order, so both stages must declare them in the same order.
//!    `attribute`s become plain globals; the first one is filled from the
//!    quad's `vec2` positions with GL's `(0, 0, 0, 1)` defaults, the rest
//!    keep the defaults.
//! 3. Prepend a header declaring the std140 uniform block (and, for
//!    fragments, the texture/sampler pairs) with `#define` aliases so the
//!    original names keep working. `mat2` members are stored as two `vec4`
//!    columns and rebuilt by the alias.
//! 4. Rename the author's `main` and append a footer that prepares inputs
//!    before calling it. Fragments also route `gl_FragColor` to a real
//!    output and get `gl_FragCoord` remapped to GL's bottom-left origin.

use std::borrow::Cow;
use std::fmt::Write as _;

use wgpu::naga::ShaderStage as NagaStage;

use crate::error::CompileError;
use crate::registry::{UniformLayout, VIEWPORT_FIELD};
use crate::types::{ShaderSource, ShaderStage, UniformKind};

const BLOCK_INSTANCE: &str = "backdrop_params";
const FIELD_PREFIX: &str = "backdrop_field_";

/// Wraps `source` and compiles it, capturing validation errors as a log.
pub(crate) fn compile_shader_module(
    device: &wgpu::Device,
    source: &ShaderSource,
    layout: &UniformLayout,
) -> Result<wgpu::ShaderModule, CompileError> {
    let (wrapped, stage) = match source.stage {
        ShaderStage::Vertex => (wrap_vertex(&source.text, layout), NagaStage::Vertex),
        ShaderStage::Fragment => (wrap_fragment(&source.text, layout), NagaStage::Fragment),
    };
    tracing::trace!(stage = %source.stage, source = %wrapped, "wrapped shader");

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(match source.stage {
            ShaderStage::Vertex => "backdrop vertex",
            ShaderStage::Fragment => "backdrop fragment",
        }),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped),
            stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(CompileError {
            stage: source.stage,
            log: err.to_string(),
        });
    }
    Ok(module)
}

pub(crate) fn wrap_vertex(source: &str, layout: &UniformLayout) -> String {
    let (body, attributes) = sanitize(source, layout, ShaderStage::Vertex);
    let mut out = String::from("#version 450\n");
    push_uniform_block(&mut out, layout);
    out.push_str("layout(location = 0) in vec2 backdrop_position;\n#define main backdrop_main\n");
    let _ = write!(out, "#line 1\n{body}");
    out.push_str("\n#undef main\nvoid main() {\n");
    for (index, attribute) in attributes.iter().enumerate() {
        if let Some(value) = attribute.initializer(index == 0) {
            let _ = writeln!(out, "    {} = {value};", attribute.name);
        }
    }
    out.push_str("    backdrop_main();\n}\n");
    out
}

pub(crate) fn wrap_fragment(source: &str, layout: &UniformLayout) -> String {
    let (body, _) = sanitize(source, layout, ShaderStage::Fragment);
    let mut out = String::from("#version 450\n");
    push_uniform_block(&mut out, layout);
    push_textures(&mut out, layout);
    out.push_str(FRAGMENT_PRELUDE);
    let _ = write!(out, "#line 1\n{body}");
    out.push_str(&fragment_footer());
    out
}

/// A vertex `attribute`, rewritten as a global the footer assigns.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    ty: String,
    name: String,
}

impl Attribute {
    fn parse(declaration: &str) -> Option<Self> {
        let declaration = declaration.split(';').next()?;
        let mut tokens = declaration.split_whitespace().rev();
        let name = tokens.next()?;
        let ty = tokens.next()?;
        Some(Self {
            ty: ty.to_string(),
            name: name.to_string(),
        })
    }

    /// Value assigned before the author's `main` runs; `None` for types GL
    /// never feeds from a buffer.
    fn initializer(&self, from_buffer: bool) -> Option<&'static str> {
        let value = match (self.ty.as_str(), from_buffer) {
            ("float", true) => "backdrop_position.x",
            ("vec2", true) => "backdrop_position",
            ("vec3", true) => "vec3(backdrop_position, 0.0)",
            ("vec4", true) => "vec4(backdrop_position, 0.0, 1.0)",
            ("float", false) => "0.0",
            ("vec2", false) => "vec2(0.0)",
            ("vec3", false) => "vec3(0.0)",
            ("vec4", false) => "vec4(0.0, 0.0, 0.0, 1.0)",
            _ => return None,
        };
        Some(value)
    }
}

fn sanitize(source: &str, layout: &UniformLayout, stage: ShaderStage) -> (String, Vec<Attribute>) {
    let mut attributes = Vec::new();
    let mut varying_location = 0;
    let mut body = String::with_capacity(source.len() + 64);

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
            body.push('\n');
            continue;
        }
        if let Some(declaration) = trimmed.strip_prefix("uniform ") {
            if declared_name(declaration).is_some_and(|name| layout.spec(name).is_some()) {
                body.push('\n');
                continue;
            }
        }
        if stage == ShaderStage::Vertex {
            if let Some(rest) = trimmed.strip_prefix("attribute ") {
                let _ = writeln!(body, "{rest}");
                attributes.extend(Attribute::parse(rest));
                continue;
            }
        }
        if let Some(rest) = trimmed.strip_prefix("varying ") {
            let direction = match stage {
                ShaderStage::Vertex => "out",
                ShaderStage::Fragment => "in",
            };
            let _ = writeln!(body, "layout(location = {varying_location}) {direction} {rest}");
            varying_location += 1;
            continue;
        }
        body.push_str(&line.replace("main(void)", "main()"));
        body.push('\n');
    }
    (body, attributes)
}

/// Last identifier of a `uniform` declaration, e.g. `uTime` in
/// `mediump float uTime;`.
fn declared_name(declaration: &str) -> Option<&str> {
    let declaration = declaration.split(';').next()?;
    let name = declaration.split_whitespace().last()?;
    Some(name.split('[').next().unwrap_or(name))
}

fn push_uniform_block(out: &mut String, layout: &UniformLayout) {
    out.push_str("layout(std140, set = 0, binding = 0) uniform BackdropParams {\n");
    for field in layout.fields() {
        match field.kind {
            // naga has no std140 matCx2; columns sit 16 bytes apart either way.
            UniformKind::Mat2 => {
                let _ = writeln!(out, "    vec4 {FIELD_PREFIX}{}_c0;", field.name);
                let _ = writeln!(out, "    vec4 {FIELD_PREFIX}{}_c1;", field.name);
            }
            kind => {
                let _ = writeln!(out, "    {} {FIELD_PREFIX}{};", kind.glsl_type(), field.name);
            }
        }
    }
    let _ = writeln!(out, "    vec2 {VIEWPORT_FIELD};");
    let _ = writeln!(out, "}} {BLOCK_INSTANCE};");
    for field in layout.fields() {
        match field.kind {
            UniformKind::Mat2 => {
                let _ = writeln!(
                    out,
                    "#define {0} mat2({BLOCK_INSTANCE}.{FIELD_PREFIX}{0}_c0.xy, {BLOCK_INSTANCE}.{FIELD_PREFIX}{0}_c1.xy)",
                    field.name
                );
            }
            _ => {
                let _ = writeln!(out, "#define {0} {BLOCK_INSTANCE}.{FIELD_PREFIX}{0}", field.name);
            }
        }
    }
}

/// Parses and validates the wrapped stage with naga's GLSL frontend, the
/// same one wgpu uses. Needs no device.
pub(crate) fn validate_stage(source: &ShaderSource, layout: &UniformLayout) -> Result<(), CompileError> {
    use wgpu::naga::front::glsl::{Frontend, Options};
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    let (wrapped, stage) = match source.stage {
        ShaderStage::Vertex => (wrap_vertex(&source.text, layout), NagaStage::Vertex),
        ShaderStage::Fragment => (wrap_fragment(&source.text, layout), NagaStage::Fragment),
    };
    let module = Frontend::default()
        .parse(&Options::from(stage), &wrapped)
        .map_err(|errors| CompileError {
            stage: source.stage,
            log: errors.emit_to_string(&wrapped),
        })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| CompileError {
            stage: source.stage,
            log: err.to_string(),
        })?;
    Ok(())
}

fn push_textures(out: &mut String, layout: &UniformLayout) {
    for slot in layout.textures() {
        let (texture_type, sampler_type) = match slot.kind {
            UniformKind::TextureCube => ("textureCube", "samplerCube"),
            _ => ("texture2D", "sampler2D"),
        };
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {}) uniform {texture_type} backdrop_texture_{};",
            slot.texture_binding(),
            slot.name
        );
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {}) uniform sampler backdrop_sampler_{};",
            slot.sampler_binding(),
            slot.name
        );
        let _ = writeln!(
            out,
            "#define {0} {sampler_type}(backdrop_texture_{0}, backdrop_sampler_{0})",
            slot.name
        );
    }
    // WebGL 1 sampling functions; must follow the declarations above.
    out.push_str("#define texture2D texture\n#define textureCube texture\n");
}

const FRAGMENT_PRELUDE: &str = r"layout(location = 0) out vec4 backdrop_frag_color;
#define gl_FragColor backdrop_frag_color
vec4 backdrop_frag_coord;
#define gl_FragCoord backdrop_frag_coord
#define main backdrop_main
";

fn fragment_footer() -> String {
    format!(
        r"
#undef main
#undef gl_FragCoord
void main() {{
    backdrop_frag_coord = vec4(
        gl_FragCoord.x,
        {BLOCK_INSTANCE}.{VIEWPORT_FIELD}.y - gl_FragCoord.y,
        gl_FragCoord.z,
        gl_FragCoord.w);
    backdrop_main();
}}
"
    )
}
