// ============================================================================
// ShaderStack CLI — headless rendering, batch export, and library management
// ============================================================================
//
// Usage examples:
//   shaderstack render -i photo.png -o out.png --preset Vintage
//   shaderstack render -i photo.png -o ab.png --layers look.json --split 0.5 --preview
//   shaderstack batch "shots/*.jpg" --output-dir out/ --preset Noir --chunk-size 4
//   shaderstack animate -i photo.png --output-dir frames/ --layers grain.json --frames 60
//   shaderstack effects
//   shaderstack presets save "Soft Fade" --layers look.json

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};

use crate::components::layers::LayerStack;
use crate::components::presets::{Preset, PresetLibrary, builtin_presets};
use crate::effects::{BuiltinEffects, CustomEffects, DirFetcher, EffectRegistry, ParamKind};
use crate::gpu::GpuRenderer;
use crate::ops::animation::{AnimationLoop, Animator, StopReason};
use crate::ops::batch::{BatchExporter, BatchOutcome, BatchSettings, DirectorySink, PathFrames};
use crate::settings::Settings;
use crate::status::SessionStatus;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// ShaderStack layered GPU image filters.
#[derive(Parser, Debug)]
#[command(name = "shaderstack", version, about = "Layered GPU image filters, headless")]
pub struct Cli {
    /// Debug-level output in the session log.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// GPU preference: auto, "high performance", "low power".
    #[arg(long, global = true, value_name = "NAME")]
    pub gpu: Option<String>,

    /// Directory with effects.json and custom/*.wgsl.
    #[arg(long, global = true, value_name = "DIR")]
    pub shaders_dir: Option<PathBuf>,

    /// Directory holding saved presets.
    #[arg(long, global = true, value_name = "DIR")]
    pub presets_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one image through a layer stack.
    Render(RenderArgs),
    /// Render many images through the same stack.
    Batch(BatchArgs),
    /// Write the frames of an animated stack.
    Animate(AnimateArgs),
    /// List available effects by category.
    Effects,
    /// Manage presets.
    #[command(subcommand)]
    Presets(PresetCommand),
}

/// Where the layer stack comes from.  Neither = empty stack.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Layer list JSON (`[{id, effect, enabled, opacity, params, seed?}]`).
    #[arg(long, value_name = "FILE.json", conflicts_with = "preset")]
    pub layers: Option<PathBuf>,

    /// Built-in preset name or saved preset key.
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[arg(short, long, value_name = "IMAGE")]
    pub input: PathBuf,

    #[arg(short, long, value_name = "FILE.png")]
    pub output: PathBuf,

    #[command(flatten)]
    pub stack: StackArgs,

    /// A/B view: original left of this fraction of the width, filtered right.
    #[arg(long, value_name = "0..1", conflicts_with = "original")]
    pub split: Option<f32>,

    /// Output the untouched source (ignores the stack).
    #[arg(long)]
    pub original: bool,

    /// Render at preview resolution instead of the source's own.
    #[arg(long)]
    pub preview: bool,

    /// Preview size cap (longer side, pixels).
    #[arg(long, value_name = "PX")]
    pub preview_max_dim: Option<u32>,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Input files; glob patterns accepted.
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub stack: StackArgs,

    #[arg(long, value_name = "N")]
    pub chunk_size: Option<usize>,

    /// Seed advance per frame for animated layers.
    #[arg(long, value_name = "S")]
    pub seed_stride: Option<f32>,
}

#[derive(Args, Debug)]
pub struct AnimateArgs {
    #[arg(short, long, value_name = "IMAGE")]
    pub input: PathBuf,

    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub stack: StackArgs,

    #[arg(long, default_value_t = 30, value_name = "N")]
    pub frames: u64,

    #[arg(long, value_name = "FPS")]
    pub fps: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum PresetCommand {
    /// Built-in and saved presets.
    List,
    /// Save a layer list JSON as a preset.
    Save {
        name: String,
        #[arg(long, value_name = "FILE.json")]
        layers: PathBuf,
    },
    /// Delete a saved preset by key.
    Delete { key: String },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one command.  `Ok(FAILURE)` means the command ran but some items
/// (batch frames) failed.
pub fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = Settings::load();
    if let Some(gpu) = cli.gpu {
        settings.preferred_gpu = gpu;
    }
    if let Some(dir) = cli.shaders_dir {
        settings.shaders_dir = dir;
    }
    if let Some(dir) = cli.presets_dir {
        settings.presets_dir = dir;
    }
    tracing::debug!(?settings, "settings resolved");

    match cli.command {
        Command::Render(args) => render(&settings, args),
        Command::Batch(args) => batch(&settings, args),
        Command::Animate(args) => animate(&settings, args),
        Command::Effects => {
            list_effects(&build_registry(&settings));
            Ok(ExitCode::SUCCESS)
        }
        Command::Presets(cmd) => presets(&settings, cmd),
    }
}

fn build_registry(settings: &Settings) -> EffectRegistry {
    let builtins = Arc::new(BuiltinEffects::new());
    if !settings.shaders_dir.is_dir() {
        return EffectRegistry::new(builtins);
    }
    match CustomEffects::load(Box::new(DirFetcher::new(&settings.shaders_dir))) {
        Ok(custom) => EffectRegistry::with_custom(builtins, custom),
        Err(e) => {
            tracing::warn!(dir = %settings.shaders_dir.display(), "custom effects unavailable: {e}");
            EffectRegistry::new(builtins)
        }
    }
}

fn find_preset(name: &str, library: &PresetLibrary) -> anyhow::Result<Preset> {
    if let Some(p) = builtin_presets().into_iter().find(|p| p.name.eq_ignore_ascii_case(name)) {
        return Ok(p);
    }
    library
        .load(&PresetLibrary::sanitize_key(name))
        .with_context(|| format!("no preset named '{}'", name))
}

fn build_stack(settings: &Settings, registry: &EffectRegistry, args: &StackArgs) -> anyhow::Result<LayerStack> {
    let mut stack = LayerStack::new(settings.max_undo_steps);
    if let Some(path) = &args.layers {
        let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        stack
            .import_json(&json, registry)
            .with_context(|| format!("parsing layer list {}", path.display()))?;
    } else if let Some(name) = &args.preset {
        let preset = find_preset(name, &PresetLibrary::new(&settings.presets_dir))?;
        stack.load_preset(&preset, registry);
    }
    Ok(stack)
}

fn load_input(path: &Path) -> anyhow::Result<image::RgbaImage> {
    crate::io::load_image(path).with_context(|| format!("loading {}", path.display()))
}

// ============================================================================
// Commands
// ============================================================================

fn render(settings: &Settings, args: RenderArgs) -> anyhow::Result<ExitCode> {
    let registry = build_registry(settings);
    let stack = build_stack(settings, &registry, &args.stack)?;
    let source = load_input(&args.input)?;

    // Split and original views are composed at working resolution, so the
    // cap is lifted unless a preview was asked for.
    let cap = args.preview_max_dim.unwrap_or(settings.preview_max_dim);
    let whole_frame = args.split.is_none() && !args.original;
    let cap = if args.preview || whole_frame { cap } else { 0 };

    let start = Instant::now();
    let mut status = SessionStatus::new();
    let mut renderer = GpuRenderer::try_new(&settings.preferred_gpu, registry, cap)?;
    renderer.load_source(source)?;

    let (frame, report) = if args.original {
        let report = renderer.render_original()?;
        (renderer.read_surface()?, report)
    } else if let Some(fraction) = args.split {
        let report = renderer.render_split(stack.layers(), fraction)?;
        (renderer.read_surface()?, report)
    } else if args.preview {
        let report = renderer.render(stack.layers())?;
        (renderer.read_surface()?, report)
    } else {
        renderer.render_full_resolution(stack.layers())?
    };

    crate::io::save_png(&frame, &args.output).with_context(|| format!("writing {}", args.output.display()))?;
    status.record_render(&report);
    status.success(format!(
        "{} ({}x{}, {} passes, {:.0?})",
        args.output.display(),
        frame.width(),
        frame.height(),
        report.passes,
        start.elapsed()
    ));
    println!("{}", status);
    Ok(ExitCode::SUCCESS)
}

fn batch(settings: &Settings, args: BatchArgs) -> anyhow::Result<ExitCode> {
    let inputs = crate::io::expand_inputs(&args.inputs)?;
    if inputs.is_empty() {
        bail!("no input files matched the given pattern(s)");
    }
    let registry = build_registry(settings);
    let stack = build_stack(settings, &registry, &args.stack)?;
    let mut renderer = GpuRenderer::try_new(&settings.preferred_gpu, registry, settings.preview_max_dim)?;

    let exporter = BatchExporter::new(BatchSettings {
        chunk_size: args.chunk_size.unwrap_or(settings.export_chunk_size),
        seed_stride: args.seed_stride.unwrap_or(settings.frame_seed_stride),
    });
    let mut source = PathFrames::new(inputs);
    let mut sink = DirectorySink::new(&args.output_dir);

    let mut status = SessionStatus::new();
    let report = match exporter.run(&mut renderer, &mut source, stack.layers(), &mut sink)? {
        BatchOutcome::Completed(report) => report,
        BatchOutcome::AlreadyRunning => bail!("an export is already running"),
    };
    for (index, msg) in &report.failed {
        eprintln!("frame {}: {}", index, msg);
    }
    let summary = format!(
        "{} frame(s) written to {} in {} chunk(s), {} failed",
        report.rendered,
        args.output_dir.display(),
        report.chunks_delivered,
        report.failed.len()
    );
    if report.failed.is_empty() {
        status.success(summary);
        println!("{}", status);
        Ok(ExitCode::SUCCESS)
    } else {
        status.error(summary);
        println!("{}", status);
        Ok(ExitCode::FAILURE)
    }
}

fn animate(settings: &Settings, args: AnimateArgs) -> anyhow::Result<ExitCode> {
    let registry = build_registry(settings);
    let mut stack = build_stack(settings, &registry, &args.stack)?;
    if !stack.layers().iter().any(|l| l.is_animated()) {
        println!("No layer has animation enabled; nothing to do.");
        return Ok(ExitCode::SUCCESS);
    }
    let source = load_input(&args.input)?;
    let mut renderer = GpuRenderer::try_new(&settings.preferred_gpu, registry, settings.preview_max_dim)?;
    renderer.load_source(source)?;
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let animator = Animator::new(args.fps.unwrap_or(settings.animation_fps), settings.frame_seed_stride);
    let mut status = SessionStatus::new();
    let mut written = 0u64;
    let summary = AnimationLoop::new(animator, Some(args.frames)).run(stack.layers_mut(), |frame, layers| {
        let report = renderer.render(layers)?;
        status.record_render(&report);
        let path = args.output_dir.join(format!("frame_{:05}.png", written));
        crate::io::save_png(&renderer.read_surface()?, &path)?;
        tracing::debug!(frame, path = %path.display(), "animation frame written");
        written += 1;
        Ok::<(), anyhow::Error>(())
    })?;

    if summary.stop != StopReason::FrameLimit {
        tracing::info!(stop = ?summary.stop, "animation ended early");
    }
    status.success(format!("{} frame(s) written to {}", summary.frames_rendered, args.output_dir.display()));
    println!("{}", status);
    Ok(ExitCode::SUCCESS)
}

fn list_effects(registry: &EffectRegistry) {
    for (category, effects) in registry.by_category() {
        println!("{}", category);
        for d in effects {
            let params: Vec<String> = d
                .params
                .iter()
                .map(|p| match p.kind {
                    ParamKind::Range { min, max, .. } => format!("{} {}..{}", p.name, min, max),
                    ParamKind::Toggle { .. } => format!("{} on/off", p.name),
                })
                .collect();
            let custom = if d.is_custom { " [custom]" } else { "" };
            println!("  {:<14} {}{}  ({})", d.id, d.name, custom, params.join(", "));
        }
    }
}

fn presets(settings: &Settings, cmd: PresetCommand) -> anyhow::Result<ExitCode> {
    let library = PresetLibrary::new(&settings.presets_dir);
    match cmd {
        PresetCommand::List => {
            for p in builtin_presets() {
                println!("{:<20} {:<12} {} layer(s)", p.name, p.category, p.layers.len());
            }
            for (key, p) in library.list()? {
                println!("{:<20} {:<12} {} layer(s)  [{}]", p.name, p.category, p.layers.len(), key);
            }
        }
        PresetCommand::Save { name, layers } => {
            let registry = build_registry(settings);
            let stack = build_stack(settings, &registry, &StackArgs { layers: Some(layers), preset: None })?;
            let key = library.save(&name, stack.layers())?;
            println!("Saved preset '{}' as {}", name, key);
        }
        PresetCommand::Delete { key } => {
            library.delete(&key).with_context(|| format!("deleting preset '{}'", key))?;
            println!("Deleted preset {}", key);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn render_flags_parse() {
        let cli = Cli::try_parse_from([
            "shaderstack", "render", "-i", "a.png", "-o", "b.png", "--preset", "Noir", "--split", "0.25",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else { panic!("expected render") };
        assert_eq!(args.split, Some(0.25));
        assert_eq!(args.stack.preset.as_deref(), Some("Noir"));
        assert!(!args.preview);
    }

    #[test]
    fn layers_and_preset_conflict() {
        let res = Cli::try_parse_from([
            "shaderstack", "batch", "*.png", "--output-dir", "out", "--layers", "l.json", "--preset", "Noir",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn builtin_presets_are_found_case_insensitively() {
        let lib = PresetLibrary::new(std::env::temp_dir().join("shaderstack-no-such-dir"));
        assert_eq!(find_preset("vintage", &lib).unwrap().name, "Vintage");
        assert!(find_preset("does not exist", &lib).is_err());
    }
}
