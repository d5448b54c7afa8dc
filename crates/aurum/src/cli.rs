use std::path::PathBuf;

use backdrop::SurfaceSize;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "aurum",
    author,
    version,
    about = "Preview the gold calculator's animated shader backgrounds"
)]
pub struct Cli {
    /// Built-in variant: `fractal`, `trig` or `gold` (full names also accepted).
    #[arg(long, value_name = "NAME", conflicts_with = "manifest")]
    pub variant: Option<String>,

    /// Load a variant from a TOML or JSON manifest instead.
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Initial window size in physical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<SurfaceSize>,

    /// Request multisampling: `on` or `off`.
    #[arg(long, value_name = "on|off", value_parser = parse_switch)]
    pub antialias: Option<bool>,

    /// Keep an alpha channel for compositing: `on` or `off`.
    #[arg(long, value_name = "on|off", value_parser = parse_switch)]
    pub alpha: Option<bool>,

    /// First gradient colour of the fractal-noise variant (`R,G,B` in 0..1).
    #[arg(long, value_name = "R,G,B", value_parser = parse_color)]
    pub color_a: Option<[f32; 3]>,

    /// Second gradient colour of the fractal-noise variant.
    #[arg(long, value_name = "R,G,B", value_parser = parse_color)]
    pub color_b: Option<[f32; 3]>,

    /// Brightness of the fractal-noise variant.
    #[arg(long, value_name = "F")]
    pub intensity: Option<f32>,

    /// Validate and print the resolved variant without opening a window.
    #[arg(long)]
    pub check: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<SurfaceSize, String> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size specification '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size specification '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }
    Ok(SurfaceSize::new(width, height))
}

pub fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

pub fn parse_color(value: &str) -> Result<[f32; 3], String> {
    let components: Vec<&str> = value.split(',').map(str::trim).collect();
    let [r, g, b] = components.as_slice() else {
        return Err(format!("expected three comma-separated components, got '{value}'"));
    };
    let mut color = [0.0; 3];
    for (slot, text) in color.iter_mut().zip([r, g, b]) {
        let component: f32 = text
            .parse()
            .map_err(|_| format!("invalid colour component '{text}'"))?;
        if !(0.0..=1.0).contains(&component) {
            return Err(format!("colour component {component} is outside 0..1"));
        }
        *slot = component;
    }
    Ok(color)
}
