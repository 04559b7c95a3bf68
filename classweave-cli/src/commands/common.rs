use anyhow::Context;
use classweave::{classpath::ClassPath, metadata::UnitRef};

use crate::app::GlobalOptions;

/// The class path from `--classpath`, falling back to `CLASSPATH`.
pub fn class_path(opts: &GlobalOptions) -> anyhow::Result<ClassPath> {
    let classpath = match &opts.classpath {
        Some(list) => ClassPath::parse(list),
        None => ClassPath::from_env(),
    };
    if classpath.roots().next().is_none() {
        anyhow::bail!("no class path given; pass --classpath or set CLASSPATH");
    }
    Ok(classpath)
}

/// Parse a unit name given on the command line, accepting dotted and internal forms.
pub fn unit_ref(name: &str) -> anyhow::Result<UnitRef> {
    let name = name.trim().trim_end_matches(".class");
    if name.is_empty() {
        anyhow::bail!("empty unit name");
    }
    Ok(if name.contains('/') {
        UnitRef::from_internal(name)
    } else {
        UnitRef::from_dotted(name)
    })
}

/// Parse every unit name, reporting the first one that does not parse.
pub fn unit_refs(names: &[String]) -> anyhow::Result<Vec<UnitRef>> {
    names
        .iter()
        .map(|name| unit_ref(name).with_context(|| format!("invalid unit name: {name:?}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_names_accept_both_forms() {
        assert_eq!(
            unit_ref("com.example.Service").unwrap(),
            unit_ref("com/example/Service.class").unwrap()
        );
        assert!(unit_ref("  ").is_err());
    }
}
