use std::fmt::Write as _;

use anyhow::{anyhow, Context, Result};
use backdrop::{
    run_preview, PreviewConfig, TextureSource, UniformLayout, UniformValue, VariantConfig,
    VariantRegistry,
};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

const DEFAULT_VARIANT: &str = "fractal";

pub fn run(args: Cli) -> Result<()> {
    initialise_tracing();

    let variant = resolve_variant(&args)?;
    let layout = variant
        .check_shaders()
        .with_context(|| format!("variant `{}` is invalid", variant.name))?;

    if args.check {
        print!("{}", describe(&variant, &layout));
        return Ok(());
    }

    tracing::info!(variant = %variant.name, "opening preview window");
    run_preview(PreviewConfig {
        title: format!("aurum: {}", variant.name),
        variant,
        size: args.size,
    })
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_variant(args: &Cli) -> Result<VariantConfig> {
    let mut variant = match &args.manifest {
        Some(path) => VariantConfig::from_manifest_path(path)
            .with_context(|| format!("failed to load manifest {}", path.display()))?,
        None => {
            let registry = VariantRegistry::with_builtins();
            let name = args.variant.as_deref().unwrap_or(DEFAULT_VARIANT);
            registry.get(name).cloned().ok_or_else(|| {
                let known: Vec<_> = registry.names().collect();
                anyhow!("unknown variant `{name}` (known: {})", known.join(", "))
            })?
        }
    };

    if let Some(antialias) = args.antialias {
        variant.context.antialias = antialias;
    }
    if let Some(alpha) = args.alpha {
        variant.context.alpha = alpha;
    }

    let overrides = [
        ("uColorA", args.color_a.map(UniformValue::Vec3)),
        ("uColorB", args.color_b.map(UniformValue::Vec3)),
        ("uIntensity", args.intensity.map(UniformValue::Scalar)),
    ];
    for (uniform, value) in overrides {
        if let Some(value) = value {
            variant
                .set_value(uniform, value)
                .with_context(|| format!("cannot override `{uniform}` on `{}`", variant.name))?;
        }
    }
    Ok(variant)
}

/// Human-readable summary printed by `--check`.
fn describe(variant: &VariantConfig, layout: &UniformLayout) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "variant: {}", variant.name);
    let _ = writeln!(
        out,
        "context: alpha={} antialias={}",
        variant.context.alpha, variant.context.antialias
    );
    let _ = writeln!(out, "uniform block: {} bytes", layout.block_size());
    let _ = writeln!(out, "uniforms:");
    for spec in layout.specs() {
        let role = format!("{:?}", spec.role).to_ascii_lowercase();
        let _ = write!(out, "  {} {} ({role})", spec.name, spec.kind);
        if let Some(field) = layout.field(&spec.name) {
            let _ = write!(out, " @{}", field.offset);
        }
        if let Some(value) = variant.initial_values.get(&spec.name) {
            let _ = write!(out, " = {:?}", value.as_slice());
        }
        if let Some(source) = variant.textures.get(&spec.name) {
            let _ = write!(out, " <- {}", describe_texture(source));
        }
        out.push('\n');
    }
    out
}

fn describe_texture(source: &TextureSource) -> String {
    match source {
        TextureSource::Image { path } => format!("image {}", path.display()),
        TextureSource::Cubemap { directory } => format!("cubemap {}", directory.display()),
        TextureSource::Noise { size, seed } => format!("noise {size}x{size} seed {seed}"),
    }
}
