// ============================================================================
// Sketchboard CLI: headless import → flattened PNG export
// ============================================================================
//
// Usage examples:
//   sketchboard --input photo.jpg --output sketch.png
//   sketchboard -i photo.jpg --width 800 --height 600 -o framed.png
//   sketchboard -i "shots/*.png" --output-dir flattened/
//
// No window is opened. Each input goes through the same import path the GUI
// uses (scale to fit, centred, one committed action) on a fresh canvas.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::editor::{Command, Editor};
use crate::error::CanvasResult;
use crate::io::{encode_png, load_image};

/// Sketchboard headless importer.
#[derive(Parser, Debug)]
#[command(
    name = "sketchboard",
    about = "Import images onto a Sketchboard canvas and export flattened PNGs",
    long_about = "Load raster images (PNG, JPEG, WEBP, BMP, TGA, ICO, GIF), place each one\n\
                  on a blank canvas scaled to fit and centred, and write the result as PNG.\n\n\
                  Example:\n  \
                  sketchboard -i photo.jpg --width 1024 --height 768 -o out.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for a single input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch runs. Files keep their stem with `.png`.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Canvas width. Defaults to the input image's width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Canvas height. Defaults to the input image's height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Print per-file progress and timing, and log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// `true` when the process was started with an input flag. `main` uses
    /// this to route before any window is created.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

/// Process every input. `0` when all files succeeded, `1` otherwise.
pub fn run(args: CliArgs) -> ExitCode {
    if args.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir for batch runs.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input.display());
        }
        let started = Instant::now();

        let Some(output) = build_output_path(input, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input.display());
            any_failure = true;
            continue;
        };

        match run_one(input, &output, args.width, args.height) {
            Ok(()) => {
                if multi || args.verbose {
                    println!(
                        "  → {} ({:.0}ms)",
                        output.display(),
                        started.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log::error!("{}: {}", input.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn run_one(input: &Path, output: &Path, width: Option<u32>, height: Option<u32>) -> CanvasResult<()> {
    let image = load_image(input)?;
    let mut editor = Editor::new(width.unwrap_or(image.width()), height.unwrap_or(image.height()));
    editor.apply(Command::ImportImage(image))?;
    encode_png(editor.display(), output)
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
pub fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => eprintln!("warning: invalid glob '{}': {}", pattern, e),
        }
    }

    result
}

/// Priority: explicit `--output`, then `--output-dir/<stem>.png`, then
/// `<stem>.png` next to the input (`<stem>_out.png` if that is the input).
pub fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.png", stem));
    if candidate == input {
        Some(parent.join(format!("{}_out.png", stem)))
    } else {
        Some(candidate)
    }
}
