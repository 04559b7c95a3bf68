use std::path::{Path, PathBuf};

use anyhow::Context;
use classweave::{
    classpath::UnitSource,
    metadata::{Scanner, UnitRef},
    weave::{Pipeline, WeaveConfig},
};
use serde::Serialize;

use crate::{
    app::{GlobalOptions, Preset},
    commands::common::{class_path, unit_refs},
    output::{print_output, Align, TabWriter},
};

/// Everything `weave` needs besides the unit list.
pub struct WeaveOptions<'a> {
    pub output: &'a Path,
    pub preset: Preset,
    pub ignore: &'a [String],
    pub dump: Option<&'a Path>,
    pub loader: &'a str,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
struct WovenEntry {
    unit: String,
    size: usize,
    path: PathBuf,
}

#[derive(Debug, Serialize)]
struct SkippedEntry {
    unit: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct WeaveOutput {
    woven: Vec<WovenEntry>,
    unchanged: usize,
    skipped: Vec<SkippedEntry>,
}

fn config(options: &WeaveOptions<'_>) -> WeaveConfig {
    let mut config = match options.preset {
        Preset::Default => WeaveConfig::default(),
        Preset::Minimal => WeaveConfig::minimal(),
        Preset::Strict => WeaveConfig::strict(),
    }
    .with_env();
    for prefix in options.ignore {
        config = config.ignore(prefix);
    }
    if let Some(directory) = options.dump {
        config = config.dump_directory(directory);
    }
    config
}

fn write_unit(root: &Path, unit: &UnitRef, data: &[u8]) -> anyhow::Result<PathBuf> {
    let path = root.join(unit.entry_path());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(&path, data)
        .with_context(|| format!("failed to write class file: {}", path.display()))?;
    Ok(path)
}

pub fn run(names: &[String], options: &WeaveOptions<'_>) -> anyhow::Result<()> {
    let classpath = class_path(options.global)?;
    let units: Vec<UnitRef> = if names.is_empty() {
        classpath.list_units().into_iter().collect()
    } else {
        unit_refs(names)?
    };
    let pipeline = Pipeline::new(Scanner::new(classpath), config(options));
    log::debug!("stages: {}", pipeline.stage_names().join(", "));

    let mut output = WeaveOutput {
        woven: Vec::new(),
        unchanged: 0,
        skipped: Vec::new(),
    };
    for unit in units {
        let data = pipeline
            .scanner()
            .source()
            .read_unit(&unit)
            .with_context(|| format!("failed to read {unit}"))?;

        match pipeline.transform(options.loader, &data) {
            Ok(Some(woven)) => {
                let path = write_unit(options.output, &unit, &woven)?;
                output.woven.push(WovenEntry {
                    unit: unit.qualified_name(),
                    size: woven.len(),
                    path,
                });
            }
            Ok(None) => output.unchanged += 1,
            Err(report) if report.can_continue => {
                report.print();
                output.skipped.push(SkippedEntry {
                    unit: unit.qualified_name(),
                    reason: report.message.clone(),
                });
            }
            Err(report) => {
                report.print();
                report.terminate()
            }
        }
    }

    print_output(&output, options.global, |out| {
        if !out.woven.is_empty() {
            let mut tw = TabWriter::new(vec![
                ("Unit", Align::Left),
                ("Size", Align::Right),
                ("Path", Align::Left),
            ]);
            for entry in &out.woven {
                tw.row(vec![
                    entry.unit.clone(),
                    entry.size.to_string(),
                    entry.path.display().to_string(),
                ]);
            }
            tw.print();
            println!();
        }
        for entry in &out.skipped {
            println!("skipped {}: {}", entry.unit, entry.reason);
        }
        println!(
            "{} unit(s) woven, {} unchanged, {} skipped.",
            out.woven.len(),
            out.unchanged,
            out.skipped.len()
        );
    })
}
