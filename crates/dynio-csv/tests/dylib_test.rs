//! CSV driver loaded as a real shared library.
//!
//! Cargo builds the `cdylib` next to the test binary; these tests dlopen it
//! through the host loader exactly as an application would.

use std::path::PathBuf;
use std::sync::Arc;

use dynio_core::{DriverHandle, DriverLoader, Error, ModuleRegistry, OptionKind, OptionValue};
use dynio_csv::Csv;

fn csv_module() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let deps = exe.parent()?;
    let prefix = format!("{}dynio_csv", std::env::consts::DLL_PREFIX);
    let is_csv_module = |path: &PathBuf| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(std::env::consts::DLL_SUFFIX))
    };

    let found = [deps, deps.parent()?].into_iter().find_map(|dir| {
        std::fs::read_dir(dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .find(|path| is_csv_module(path))
    });
    found
}

fn loader() -> DriverLoader {
    DriverLoader::new().with_registry(Arc::new(ModuleRegistry::new()))
}

fn open_csv(loader: &DriverLoader) -> Option<DriverHandle<Csv>> {
    let Some(path) = csv_module() else {
        eprintln!("csv cdylib not found next to the test binary, skipping");
        return None;
    };
    let handle = loader.load(&path).unwrap();
    // SAFETY: the csv driver decodes into `dynio_csv::Csv`.
    Some(unsafe { handle.narrow::<Csv>() })
}

fn table() -> Csv {
    let fields = |f: &[&str]| f.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    Csv::new(
        fields(&["COL1", "COL2", "COL3"]),
        vec![fields(&["1", "2", "a"]), fields(&["3", "4", "b"])],
    )
}

#[test]
fn test_csv_with_default_delimiter() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    assert_eq!(csv.name(), "csv");
    let decoded = csv.read(b"COL1,COL2,COL3\n1,2,a\n3,4,b\n").unwrap();
    assert_eq!(decoded, table());
    assert_eq!(csv.write(&decoded).unwrap(), b"COL1,COL2,COL3\n1,2,a\n3,4,b\n");
}

#[test]
fn test_csv_with_colon_delimiter() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    {
        let mut delimiter = csv.option("delimiter").unwrap();
        assert_eq!(delimiter.kind(), OptionKind::Char);
        assert_eq!(delimiter.value().unwrap(), OptionValue::Char(','));
        delimiter.set_char(':').unwrap();
    }

    let decoded = csv.read(b"COL1:COL2:COL3\n1:2:a\n3:4:b\n").unwrap();
    assert_eq!(decoded, table());
    assert_eq!(csv.write(&table()).unwrap(), b"COL1:COL2:COL3\n1:2:a\n3:4:b\n");
}

#[test]
fn test_scenario_without_final_newline() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    assert_eq!(csv.read(b"COL1,COL2,COL3\n1,2,a\n3,4,b").unwrap(), table());

    csv.option("delimiter").unwrap().set_char(':').unwrap();
    assert_eq!(csv.read(b"COL1:COL2:COL3\n1:2:a\n3:4:b").unwrap(), table());
}

#[test]
fn test_ambiguous_table_is_not_encoded() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    let table = Csv::new(
        vec!["a".to_string(), "b".to_string()],
        vec![vec!["1".to_string(), String::new()]],
    );
    match csv.write(&table) {
        Err(Error::EncodeFailed { status, .. }) => {
            assert_eq!(status, dynio_core::DriverStatus::INVALID_INPUT)
        }
        other => panic!("expected EncodeFailed, got {:?}", other),
    }
}

#[test]
fn test_round_trip() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    let encoded = csv.write(&table()).unwrap();
    assert_eq!(csv.read(&encoded).unwrap(), table());
}

#[test]
fn test_option_errors() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    assert!(csv.option("quote").is_none());

    let mut delimiter = csv.option("delimiter").unwrap();
    assert!(matches!(
        delimiter.set_string(";"),
        Err(Error::OptionKindMismatch { .. })
    ));
    assert_eq!(delimiter.value().unwrap(), OptionValue::Char(','));
}

#[test]
fn test_invalid_input_is_reported() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    match csv.read(&[0xff, 0xfe, b'\n']) {
        Err(Error::DecodeFailed { driver, status }) => {
            assert_eq!(driver, "csv");
            assert_eq!(status, dynio_core::DriverStatus::INVALID_INPUT);
        }
        other => panic!("expected DecodeFailed, got {:?}", other),
    }

    // The handle stays usable after a failed call.
    assert_eq!(csv.read(b"a\n1\n").unwrap().len(), 1);
}

#[test]
fn test_module_shared_and_unmapped() {
    let loader = loader();
    let Some(first) = open_csv(&loader) else { return };
    let second = open_csv(&loader).unwrap();

    assert!(Arc::ptr_eq(first.module(), second.module()));
    assert_eq!(loader.registry().open_count(), 1);

    drop(first);
    assert_eq!(loader.registry().open_count(), 1);
    drop(second);
    assert_eq!(loader.registry().open_count(), 0);
}

#[test]
fn test_decoded_table_outlives_module() {
    let loader = loader();
    let Some(mut csv) = open_csv(&loader) else { return };

    let mut decoded = csv.read(b"COL1,COL2,COL3\n1,2,a\n3,4,b\n").unwrap();
    drop(csv);
    assert_eq!(loader.registry().open_count(), 0);

    // The module is unmapped; the table's buffers belong to the host now.
    decoded.rows[0][2].push_str("bc");
    decoded.rows.push(vec!["5".into(), "6".into(), "c".into()]);
    assert_eq!(decoded.rows[0][2], "abc");
    assert_eq!(decoded.len(), 3);
    drop(decoded);
}

#[test]
fn test_load_by_name() {
    let Some(path) = csv_module() else { return };
    let Some(dir) = path.parent() else { return };
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap().to_string();

    let mut loader = loader();
    loader.add_search_path(dir);

    let handle = loader.load_by_name(&file_name).unwrap();
    assert_eq!(handle.name(), "csv");
    assert!(loader.discover().contains(&path));
}

#[cfg(target_os = "linux")]
#[test]
fn test_library_without_entry_points() {
    let loader = loader();
    match loader.load("libc.so.6") {
        Err(Error::MissingEntryPoint { symbol, .. }) => assert_eq!(symbol, "register_driver"),
        other => panic!("expected MissingEntryPoint, got {:?}", other),
    }
    assert_eq!(loader.registry().open_count(), 0);
}
