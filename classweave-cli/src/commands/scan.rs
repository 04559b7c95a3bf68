use anyhow::Context;
use classweave::metadata::{Member, ScannedUnit, Scanner};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{class_path, unit_refs},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct MemberEntry {
    access: String,
    name: String,
    descriptor: String,
    markers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UnitEntry {
    name: String,
    kind: String,
    access: String,
    supertype: Option<String>,
    interfaces: Vec<String>,
    signature: Option<String>,
    version: String,
    markers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<MemberEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    methods: Option<Vec<MemberEntry>>,
}

#[derive(Debug, Serialize)]
struct ScanOutput {
    units: Vec<UnitEntry>,
}

fn member_entry(member: &impl Member) -> MemberEntry {
    MemberEntry {
        access: member.access_level().to_string(),
        name: member.name().to_string(),
        descriptor: member.descriptor().to_string(),
        markers: member.markers().iter().map(ToString::to_string).collect(),
    }
}

fn unit_entry(unit: &ScannedUnit, members: bool) -> UnitEntry {
    let info = &unit.info;
    UnitEntry {
        name: info.unit.qualified_name(),
        kind: info.kind.to_string(),
        access: info.access_level.to_string(),
        supertype: info.supertype.as_ref().map(|unit| unit.qualified_name()),
        interfaces: info.interfaces.iter().map(|unit| unit.qualified_name()).collect(),
        signature: info.signature.clone(),
        version: format!("{}.{}", info.major_version, info.minor_version),
        markers: info.markers.iter().map(ToString::to_string).collect(),
        fields: members.then(|| unit.content.fields.iter().map(member_entry).collect()),
        methods: members.then(|| unit.content.methods.iter().map(member_entry).collect()),
    }
}

fn print_members(title: &str, members: &[MemberEntry]) {
    println!("  {title}:");
    if members.is_empty() {
        println!("    (none)");
        return;
    }
    let mut tw = TabWriter::new(vec![
        ("Access", Align::Left),
        ("Name", Align::Left),
        ("Descriptor", Align::Left),
        ("Markers", Align::Left),
    ])
    .indent("    ");
    for member in members {
        tw.row(vec![
            member.access.clone(),
            member.name.clone(),
            member.descriptor.clone(),
            member.markers.join(" "),
        ]);
    }
    tw.print();
}

pub fn run(names: &[String], members: bool, opts: &GlobalOptions) -> anyhow::Result<()> {
    let scanner = Scanner::new(class_path(opts)?);

    let mut units = Vec::new();
    for unit in unit_refs(names)? {
        let scanned = scanner
            .scan(&unit)
            .with_context(|| format!("failed to scan {unit}"))?;
        units.push(unit_entry(&scanned, members));
    }

    print_output(&ScanOutput { units }, opts, |out| {
        for (i, unit) in out.units.iter().enumerate() {
            if i > 0 {
                println!();
            }
            println!("{} ({}, {})", unit.name, unit.access, unit.kind);
            if let Some(supertype) = &unit.supertype {
                println!("  extends     {supertype}");
            }
            if !unit.interfaces.is_empty() {
                println!("  implements  {}", unit.interfaces.join(", "));
            }
            if let Some(signature) = &unit.signature {
                println!("  signature   {signature}");
            }
            println!("  version     {}", unit.version);
            for marker in &unit.markers {
                println!("  {marker}");
            }
            if let Some(fields) = &unit.fields {
                print_members("fields", fields);
            }
            if let Some(methods) = &unit.methods {
                print_members("methods", methods);
            }
        }
    })
}
