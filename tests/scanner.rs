//! Integration tests for discovery and scanning over real directories and archives.

use classweave::{
    classfile::builder::SpecValue,
    metadata::generics::{self, ActualType},
    prelude::*,
};
use std::{io::Write, path::Path, sync::Arc};

fn write_unit(root: &Path, internal_name: &str, data: &[u8]) {
    let path = root.join(format!("{internal_name}.class"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

fn jar(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn repeated_scans_return_the_same_model() -> Result<()> {
    let root = tempfile::tempdir().unwrap();
    write_unit(root.path(), "com/example/A", &ClassBuilder::new("com/example/A").build()?);
    let scanner = Scanner::new(ClassPath::new([root.path()]));

    let unit = UnitRef::from_dotted("com.example.A");
    let first = scanner.scan(&unit)?;
    let second = scanner.scan(&unit)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(scanner.len(), 1);
    Ok(())
}

#[test]
fn concurrent_scans_share_one_model() -> Result<()> {
    let root = tempfile::tempdir().unwrap();
    write_unit(root.path(), "com/example/A", &ClassBuilder::new("com/example/A").build()?);
    let scanner = Arc::new(Scanner::new(ClassPath::new([root.path()])));
    let unit = UnitRef::from("com/example/A");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scanner = Arc::clone(&scanner);
            let unit = unit.clone();
            std::thread::spawn(move || scanner.scan(&unit).unwrap())
        })
        .collect();
    let models: Vec<Arc<ScannedUnit>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let cached = scanner.cached(&unit).unwrap();
    assert!(models.iter().all(|model| Arc::ptr_eq(model, &cached)));
    Ok(())
}

#[test]
fn directories_and_nested_archives_are_enumerated() -> Result<()> {
    let root = tempfile::tempdir().unwrap();
    write_unit(root.path(), "com/example/Loose", &ClassBuilder::new("com/example/Loose").build()?);
    write_unit(root.path(), "module-info", &[0xCA, 0xFE, 0xBA, 0xBE]);
    std::fs::write(
        root.path().join("lib.jar"),
        jar(&[
            ("com/example/Packed.class", ClassBuilder::new("com/example/Packed").build()?),
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
        ]),
    )
    .unwrap();
    std::fs::write(root.path().join("broken.jar"), b"not a zip").unwrap();

    let classpath = ClassPath::new([root.path().to_path_buf(), root.path().join("missing")]);
    let units: Vec<String> = classpath
        .list_units()
        .into_iter()
        .map(|unit| unit.qualified_name())
        .collect();
    assert_eq!(units, vec!["com.example.Loose", "com.example.Packed"]);

    let scanner = Scanner::new(classpath);
    let packed = scanner.scan(&UnitRef::from("com/example/Packed"))?;
    assert_eq!(packed.info.kind, UnitKind::Ordinary);
    Ok(())
}

#[test]
fn missing_and_malformed_units_are_discovery_errors() {
    let root = tempfile::tempdir().unwrap();
    write_unit(root.path(), "com/example/Broken", &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]);
    let scanner = Scanner::new(ClassPath::new([root.path()]));

    assert!(matches!(
        scanner.scan(&UnitRef::from("com/example/Nowhere")),
        Err(Error::UnitNotFound(_))
    ));
    let error = scanner
        .scan(&UnitRef::from("com/example/Broken"))
        .unwrap_err();
    assert!(matches!(error, Error::MalformedUnit { .. }));
    assert_eq!(CrashReport::from(error).kind, ReportKind::Discovery);
}

#[test]
fn marker_arrays_are_normalized_to_lists() -> Result<()> {
    let bytes = ClassBuilder::new("com/example/Tagged")
        .annotation(
            AnnotationSpec::new("Lcom/example/Tags;")
                .with(
                    "ints",
                    SpecValue::Array(vec![SpecValue::Int(1), SpecValue::Int(2)]),
                )
                .with(
                    "longs",
                    SpecValue::Array(vec![SpecValue::Long(1), SpecValue::Long(2)]),
                ),
        )
        .build()?;
    let unit = Scanner::new(MemorySource::new().with(bytes)?).scan(&UnitRef::from("com/example/Tagged"))?;
    let marker = unit.info.markers.get(&UnitRef::from("com/example/Tags")).unwrap();

    let ints = marker.get("ints").unwrap().as_list();
    let longs = marker.get("longs").unwrap().as_list();
    assert_eq!(ints, vec![&MarkerValue::Int(1), &MarkerValue::Int(2)]);
    assert_eq!(longs, vec![&MarkerValue::Long(1), &MarkerValue::Long(2)]);
    Ok(())
}

#[test]
fn method_type_variables_resolve_through_the_class_scope() -> Result<()> {
    let bytes = ClassBuilder::new("com/example/Repository")
        .signature("<E:Ljava/lang/Number;>Ljava/lang/Object;")
        .method(
            MethodSpec::new(MethodAccess::PUBLIC | MethodAccess::ABSTRACT, "all", "(Ljava/util/List;)V")
                .signature("<X:TE;>(Ljava/util/List<TX;>;)V"),
        )
        .build()?;
    let unit = ScannedUnit::from_bytes(&bytes)?;
    let method = unit.content.methods.method("all", "(Ljava/util/List;)V").unwrap();
    let scope = unit.method_scope(method)?;

    let shapes = generics::parse_parameter_shapes(&scope, method.signature.as_deref().unwrap())?;
    assert_eq!(
        shapes,
        vec![ActualType::Class {
            unit: UnitRef::from("java/util/List"),
            args: vec![ActualType::class("java/lang/Number")],
        }]
    );
    assert!(matches!(
        generics::parse_field_shape(&scope, "TMissing;"),
        Err(Error::UnknownGenericParameter(_))
    ));
    Ok(())
}
