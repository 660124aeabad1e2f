#![forbid(unsafe_code)]
use std::fs::File;
use std::path::Path;
use std::process;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use spatch::{DiffConfig, DiffKind, Differ, Error, Report};

#[derive(Parser, Debug)]
#[command(
    name = "sdiffer",
    version,
    about = "produce a binary patch container from two files or directory trees",
    long_about = None,
)]
struct SdifferArgs {
    /// configuration file
    #[arg(value_name = "CONFIG", default_value = "sdiffer.ini")]
    config_path: String,
}

fn main() {
    let args = SdifferArgs::parse();
    if let Err(e) = execute(args) {
        eprintln!("error: {}", e);
        process::exit(-1);
    }
}

fn execute(args: SdifferArgs) -> spatch::Result<()> {
    let config = DiffConfig::load(&args.config_path)?;
    let target = Path::new(&config.to);
    let out = File::create(&config.output)?;
    let mut report = ConsoleReport::new();
    let differ = Differ::new().compress(config.compress);

    if target.is_dir() {
        if let Some(source) = config.source() {
            if !source.is_dir() {
                return Err(Error::Config(
                    "`from` must be a directory (or `-`) when `to` is a directory".into(),
                ));
            }
        }
        differ.diff_trees(config.source(), target, out, &mut report)
    } else {
        differ.diff_file(config.source(), target, out, &mut report)
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
