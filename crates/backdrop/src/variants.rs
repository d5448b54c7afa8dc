//! Built-in background effects.
//!
//! Sources are written in the WebGL 1 dialect (`attribute`, `gl_FragColor`,
//! loose `uniform` declarations); the wgpu backend wraps them before
//! compilation. Pointer uniforms arrive with a top-left origin, so shaders
//! that want GL's bottom-left convention flip them themselves.

use crate::config::VariantConfig;
use crate::types::{
    ContextAttributes, TextureSource, UniformKind, UniformSpec, UniformValue,
};

pub const FRACTAL_NOISE: &str = "fractal-noise";
pub const TRIGONOMETRIC: &str = "trigonometric";
pub const GOLD_INGOT: &str = "gold-ingot";

/// Default pass-through vertex shader for the full-viewport quad.
pub const QUAD_VERTEX_SHADER: &str = r"attribute vec4 aVertexPosition;

void main() {
    gl_Position = aVertexPosition;
}
";

pub const DEFAULT_COLOR_A: [f32; 3] = [0.1, 0.3, 0.9];
pub const DEFAULT_COLOR_B: [f32; 3] = [0.8, 0.2, 0.8];
pub const DEFAULT_INTENSITY: f32 = 0.8;

const FRACTAL_NOISE_FRAGMENT: &str = r"precision mediump float;

uniform vec2 uResolution;
uniform float uTime;
uniform vec2 uMouse;
uniform vec3 uColorA;
uniform vec3 uColorB;
uniform float uIntensity;

float hash(vec2 st) {
    return fract(sin(dot(st.xy, vec2(12.9898, 78.233))) * 43758.5453123);
}

float valueNoise(vec2 st) {
    vec2 i = floor(st);
    vec2 f = fract(st);

    float a = hash(i);
    float b = hash(i + vec2(1.0, 0.0));
    float c = hash(i + vec2(0.0, 1.0));
    float d = hash(i + vec2(1.0, 1.0));

    vec2 u = f * f * (3.0 - 2.0 * f);
    return mix(a, b, u.x) + (c - a) * u.y * (1.0 - u.x) + (d - b) * u.x * u.y;
}

float fbm(vec2 st) {
    float value = 0.0;
    float amplitude = 0.5;
    for (int i = 0; i < 5; i++) {
        value += amplitude * valueNoise(st);
        st *= 2.0;
        amplitude *= 0.5;
    }
    return value;
}

void main() {
    float aspect = uResolution.x / uResolution.y;
    vec2 st = gl_FragCoord.xy / uResolution.xy;
    vec2 pos = st * 2.0 - 1.0;
    pos.x *= aspect;

    // uMouse has a top-left origin; gl_FragCoord does not.
    vec2 mouse = vec2(uMouse.x, uResolution.y - uMouse.y) / uResolution.xy;
    mouse = mouse * 2.0 - 1.0;
    mouse.x *= aspect;
    float mouseDist = length(pos - mouse);

    float t = uTime * 0.2;
    vec2 q = vec2(fbm(pos + t * 0.1), fbm(pos + vec2(1.0)));
    vec2 r = vec2(fbm(pos + q * 2.0 + vec2(1.7, 9.2) + t * 0.15),
                  fbm(pos + q * 2.0 + vec2(8.3, 2.8) + t * 0.126));
    r += vec2(mouseDist * -0.2 * uIntensity);

    float f = fbm(pos + r);
    vec3 color = mix(uColorA, uColorB, f * f);
    color += vec3(0.07 * sin(pos.x * 10.0 + t) * sin(pos.y * 10.0 + t));

    float edge = smoothstep(0.4, 0.5, distance(st, vec2(0.5)));
    color *= 1.0 - edge * 0.6;

    gl_FragColor = vec4(color, 1.0);
}
";

const TRIGONOMETRIC_FRAGMENT: &str = r"precision highp float;

uniform float time;
uniform vec2 resolution;

void main(void) {
    vec2 position = gl_FragCoord.xy / resolution.xy;
    float color = 0.0;
    color += sin(position.x * cos(time / 15.0) * 80.0) + cos(position.y * cos(time / 15.0) * 10.0);
    color += sin(position.y * sin(time / 10.0) * 40.0) + cos(position.x * sin(time / 25.0) * 40.0);
    color += sin(position.x * sin(time / 5.0) * 10.0) + sin(position.y * sin(time / 35.0) * 80.0);
    color *= sin(time / 10.0) * 0.5;
    gl_FragColor = vec4(vec3(color, color * 0.5, sin(color + time / 3.0) * 0.75), 1.0);
}
";

const GOLD_INGOT_FRAGMENT: &str = r"precision highp float;

uniform vec2 u_resolution;
uniform sampler2D u_noise;
uniform vec3 u_camera;
uniform vec2 u_tilt;
uniform mat2 u_rotation;

const vec3 GOLD_DEEP = vec3(0.42, 0.24, 0.02);
const vec3 GOLD_MID = vec3(0.83, 0.61, 0.22);
const vec3 GOLD_HIGHLIGHT = vec3(1.0, 0.93, 0.68);

void main() {
    vec2 uv = gl_FragCoord.xy / u_resolution.xy;
    vec2 p = (gl_FragCoord.xy - 0.5 * u_resolution.xy) / u_resolution.y;

    // Brushed grain runs along the rotated x axis.
    vec2 grainUv = u_rotation * p;
    float grain = texture2D(u_noise, vec2(grainUv.x * 0.05, grainUv.y * 3.0)).r;
    float scratches = texture2D(u_noise, grainUv * 1.7 + vec2(0.31, 0.77)).r;

    // Bevelled slab: normal tilts near the edges.
    vec2 edge = smoothstep(vec2(0.35, 0.22), vec2(0.5, 0.32), abs(p));
    vec3 normal = normalize(vec3(sign(p) * edge * 0.6 + (grain - 0.5) * 0.08, 1.0));

    vec3 view = normalize(u_camera);
    vec3 light = normalize(vec3(u_tilt * 1.5, 1.0));
    vec3 halfway = normalize(light + view);

    float diffuse = max(dot(normal, light), 0.0);
    float specular = pow(max(dot(normal, halfway), 0.0), 48.0);
    float fresnel = pow(1.0 - max(dot(normal, view), 0.0), 3.0);

    vec3 color = mix(GOLD_DEEP, GOLD_MID, diffuse);
    color += GOLD_HIGHLIGHT * (specular * 1.2 + fresnel * 0.35);
    color *= 0.9 + 0.1 * scratches;

    float vignette = smoothstep(0.9, 0.3, distance(uv, vec2(0.5)));
    gl_FragColor = vec4(color * vignette, 1.0);
}
";

/// Parametrised fBm background reacting to the pointer.
pub fn fractal_noise() -> VariantConfig {
    VariantConfig::new(FRACTAL_NOISE, QUAD_VERTEX_SHADER, FRACTAL_NOISE_FRAGMENT)
        .with_uniform(UniformSpec::resolution("uResolution"))
        .with_uniform(UniformSpec::time("uTime"))
        .with_uniform(UniformSpec::pointer("uMouse"))
        .with_uniform(UniformSpec::color("uColorA"))
        .with_uniform(UniformSpec::color("uColorB"))
        .with_uniform(UniformSpec::custom("uIntensity", UniformKind::Scalar))
        .with_value("uColorA", UniformValue::Vec3(DEFAULT_COLOR_A))
        .with_value("uColorB", UniformValue::Vec3(DEFAULT_COLOR_B))
        .with_value("uIntensity", UniformValue::Scalar(DEFAULT_INTENSITY))
        .with_context(ContextAttributes {
            alpha: false,
            antialias: true,
        })
}

/// Sin/cos plasma driven only by time and resolution.
pub fn trigonometric() -> VariantConfig {
    VariantConfig::new(TRIGONOMETRIC, QUAD_VERTEX_SHADER, TRIGONOMETRIC_FRAGMENT)
        .with_uniform(UniformSpec::time("time"))
        .with_uniform(UniformSpec::resolution("resolution"))
}

/// Brushed gold slab lit from a gyroscope-style tilt vector.
pub fn gold_ingot() -> VariantConfig {
    VariantConfig::new(GOLD_INGOT, QUAD_VERTEX_SHADER, GOLD_INGOT_FRAGMENT)
        .with_uniform(UniformSpec::resolution("u_resolution"))
        .with_uniform(UniformSpec::texture("u_noise"))
        .with_uniform(UniformSpec::custom("u_camera", UniformKind::Vec3))
        .with_uniform(UniformSpec::custom("u_tilt", UniformKind::Vec2))
        .with_uniform(UniformSpec::custom("u_rotation", UniformKind::Mat2))
        .with_value("u_camera", UniformValue::Vec3([0.0, 0.0, 1.0]))
        .with_value("u_tilt", UniformValue::Vec2([0.35, 0.6]))
        .with_value("u_rotation", UniformValue::Mat2(rotation(0.18)))
        .with_texture("u_noise", TextureSource::Noise { size: 256, seed: 7 })
}

/// Column-major 2x2 rotation matrix.
pub fn rotation(radians: f32) -> [f32; 4] {
    let (sin, cos) = radians.sin_cos();
    [cos, sin, -sin, cos]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_validate() {
        for variant in [fractal_noise(), trigonometric(), gold_ingot()] {
            variant
                .validate()
                .unwrap_or_else(|err| panic!("{} failed to validate: {err}", variant.name));
        }
    }

    #[test]
    fn fractal_defaults_match_component_props() {
        let variant = fractal_noise();
        assert_eq!(
            variant.initial_values.get("uColorA"),
            Some(&UniformValue::Vec3(DEFAULT_COLOR_A))
        );
        assert_eq!(
            variant.initial_values.get("uIntensity"),
            Some(&UniformValue::Scalar(0.8))
        );
        assert!(!variant.context.alpha);
        assert!(variant.context.antialias);
    }

    #[test]
    fn rotation_is_orthonormal() {
        let [a, b, c, d] = rotation(0.7);
        assert!((a * d - b * c - 1.0).abs() < 1e-6);
        assert!((a * c + b * d).abs() < 1e-6);
    }
}
