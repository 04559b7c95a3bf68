use classweave::classpath::UnitSource;
use serde::Serialize;

use crate::{app::GlobalOptions, commands::common::class_path, output::print_output};

#[derive(Debug, Serialize)]
struct ListOutput {
    units: Vec<String>,
    count: usize,
}

pub fn run(package: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let classpath = class_path(opts)?;
    let prefix = package.map(|package| package.replace('.', "/"));

    let units: Vec<String> = classpath
        .list_units()
        .into_iter()
        .filter(|unit| prefix.as_deref().is_none_or(|prefix| unit.in_namespace(prefix)))
        .map(|unit| unit.qualified_name())
        .collect();

    let output = ListOutput {
        count: units.len(),
        units,
    };
    print_output(&output, opts, |out| {
        for unit in &out.units {
            println!("{unit}");
        }
        println!("\n{} unit(s) listed.", out.count);
    })
}
