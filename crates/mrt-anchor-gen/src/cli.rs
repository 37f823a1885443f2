use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mrt_xlsx::AnchorMap;

use crate::{generate, TemplateVersion};

#[derive(Parser)]
#[command(about = "Regenerate the Declaration anchor map from blank reporting templates.")]
pub struct Args {
    /// Directory holding `<TYPE>/RMI_<TYPE>_<version>.xlsx`.
    #[arg(long, default_value = "templates")]
    templates: PathBuf,

    /// Anchor map to write, or to compare against with `--check`.
    #[arg(long, default_value = "crates/mrt-xlsx/data/anchors.json")]
    out: PathBuf,

    /// Only rescan these `type@version` entries (repeatable). Other entries are kept from `--out`.
    #[arg(long = "only", value_name = "TYPE@VERSION")]
    only: Vec<TemplateVersion>,

    /// Do not write; exit with status 1 when `--out` differs from the generated map.
    #[arg(long)]
    check: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Written(PathBuf),
    UpToDate,
    OutOfDate,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    match run_with_args(&args)? {
        Outcome::Written(path) => println!("Generated: {}", path.display()),
        Outcome::UpToDate => println!("Excel mapping is up to date."),
        Outcome::OutOfDate => {
            eprintln!(
                "Excel mapping is out of date: {}. Re-run without --check to regenerate it.",
                args.out.display()
            );
            std::process::exit(1);
        }
    }
    Ok(())
}

pub fn run_with_args(args: &Args) -> Result<Outcome> {
    let current = match std::fs::read_to_string(&args.out) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(err).with_context(|| format!("read {}", args.out.display())),
    };

    let base = match (&current, args.only.is_empty()) {
        (Some(text), false) => AnchorMap::from_json(text)
            .with_context(|| format!("parse existing anchor map {}", args.out.display()))?,
        _ => AnchorMap::default(),
    };
    let next = generate(&args.templates, &args.only, base)?.to_json_pretty()?;

    if args.check {
        return Ok(if current.as_deref() == Some(next.as_str()) {
            Outcome::UpToDate
        } else {
            Outcome::OutOfDate
        });
    }

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(&args.out, next).with_context(|| format!("write {}", args.out.display()))?;
    Ok(Outcome::Written(args.out.clone()))
}
