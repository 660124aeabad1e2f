#![forbid(unsafe_code)]
use std::fs::File;
use std::path::Path;
use std::process;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use spatch::{DiffKind, Patcher, Report};

#[derive(Parser, Debug)]
#[command(
    name = "spatcher",
    version,
    about = "apply a binary patch container",
    long_about = None,
)]
struct SpatcherArgs {
    /// `[SOURCE] PATCH TARGET`; with two arguments the target directory is
    /// upgraded in place, `-` as source means "no source"
    #[arg(value_name = "PATH", num_args = 2..=3, required = true)]
    paths: Vec<String>,

    /// keep patching when a change frame's source file is missing
    #[arg(long)]
    keep_going: bool,
}

fn main() {
    let args = SpatcherArgs::parse();
    if let Err(e) = execute(args) {
        eprintln!("error: {}", e);
        process::exit(-1);
    }
}

fn execute(args: SpatcherArgs) -> spatch::Result<()> {
    let (source, patch_path, target) = match args.paths.len() {
        2 => (None, &args.paths[0], &args.paths[1]),
        _ => {
            let source = &args.paths[0];
            let source = if source == "-" {
                None
            } else {
                Some(source.clone())
            };
            (source, &args.paths[1], &args.paths[2])
        }
    };

    // Two arguments upgrade the target tree in place; three patch a tree
    // when the source is a directory and a single file otherwise.
    let tree = if args.paths.len() == 2 {
        true
    } else {
        source
            .as_deref()
            .map(|s| Path::new(s).is_dir())
            .unwrap_or(false)
    };

    let mut patch = File::open(patch_path)?;
    let target = Path::new(target);
    let mut report = ConsoleReport::new();
    let patcher = Patcher::new()
        .source(source)
        .continue_on_missing_source(args.keep_going);
    if tree {
        patcher.apply_tree(&mut patch, target, &mut report)
    } else {
        patcher.apply_file(&mut patch, target, &mut report)
    }
}

/// Renders the library callbacks as console output: one progress bar per
/// frame, diagnostics to the right stream.
struct ConsoleReport {
    bar: Option<ProgressBar>,
}

impl ConsoleReport {
    fn new() -> Self {
        ConsoleReport { bar: None }
    }
}

impl Report for ConsoleReport {
    fn info(&mut self, path: &str, size: i64, kind: DiffKind) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        if kind == DiffKind::Delete {
            println!("delete {}", path);
            return;
        }
        let bar = if size >= 0 {
            let bar = ProgressBar::new(size as u64);
            bar.set_style(
                ProgressStyle::with_template("{msg:<40} {bytes:>10}/{total_bytes:<10} {bar:30}")
                    .unwrap(),
            );
            bar
        } else {
            ProgressBar::new_spinner()
        };
        bar.set_message(path.to_string());
        self.bar = Some(bar);
    }

    fn progress(&mut self, done: i64) -> bool {
        match &self.bar {
            Some(bar) if done >= 0 => bar.set_position(done as u64),
            Some(_) => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
            }
            None => (),
        }
        true
    }

    fn message(&mut self, severity: i32, text: &str) {
        if severity < 0 {
            eprintln!("{}", text);
        } else {
            println!("{}", text);
        }
    }
}
