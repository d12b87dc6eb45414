//! Integration tests for the tarn-store crate.

use std::env;
use std::fs;
use std::path::Path;

use tarn_derive::{Derivation, Graph, HashMode, StorePath, store_path_for};
use tarn_store::{DEFAULT_STORE_DIR, Store, instantiate, store_dir};

fn temp_store(suffix: &str) -> Store {
    let dir = env::temp_dir().join(format!("tarn-store-test-{}-{}", std::process::id(), suffix));
    let _ = fs::remove_dir_all(&dir); // Clean up any previous run
    Store::open_at(dir).unwrap()
}

// Store directory tests

#[test]
fn test_store_dir_default() {
    let dir = store_dir();
    assert!(!dir.as_os_str().is_empty());
    assert!(DEFAULT_STORE_DIR.starts_with('/'));
}

// Store operation tests

#[test]
fn test_open_creates_directory() {
    let store = temp_store("open");
    assert!(store.root().is_dir());
    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_add_source_content_addressed() {
    let store = temp_store("add-source");
    let src = env::temp_dir().join(format!("tarn-test-src-{}.txt", std::process::id()));
    fs::write(&src, b"source material").unwrap();

    let a = store.add_source(&src, None).unwrap();
    let b = store.add_source(&src, None).unwrap();
    assert_eq!(a, b);
    assert!(store.has(&a));
    assert_eq!(store.read(&a).unwrap(), b"source material");

    // The name defaults to the basename, and can be overridden.
    assert!(a.name().starts_with("tarn-test-src-"));
    let named = store.add_source(&src, Some("renamed.txt")).unwrap();
    assert_eq!(named.name(), "renamed.txt");
    assert_ne!(named, a);

    let _ = fs::remove_file(&src);
    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_source_entries_are_read_only() {
    let store = temp_store("read-only");
    let src = env::temp_dir().join(format!("tarn-test-ro-{}.txt", std::process::id()));
    fs::write(&src, b"immutable").unwrap();

    let sp = store.add_source(&src, None).unwrap();
    let perms = fs::metadata(store.to_path(&sp)).unwrap().permissions();
    assert!(perms.readonly());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        assert_eq!(perms.mode() & 0o777, 0o444);
    }

    let _ = fs::remove_file(&src);
    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_no_staging_directories_remain() {
    let store = temp_store("staging");
    let src = env::temp_dir().join(format!("tarn-test-stage-{}.txt", std::process::id()));
    fs::write(&src, b"staged").unwrap();
    store.add_source(&src, None).unwrap();

    let leftovers: Vec<_> = fs::read_dir(store.root())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());

    let _ = fs::remove_file(&src);
    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_list_store_entries() {
    let store = temp_store("list");
    let src = env::temp_dir().join(format!("tarn-test-list-{}.txt", std::process::id()));
    fs::write(&src, b"listed").unwrap();
    let sp = store.add_source(&src, None).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], sp);

    let _ = fs::remove_file(&src);
    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_register_output_atomic_install() {
    let store = temp_store("register");
    let out = store_path_for("output:out", &"9".repeat(64), store.root(), "built-1.0");

    let temp = store.root().join(".tmp-staged");
    fs::create_dir_all(temp.join("bin")).unwrap();
    fs::write(temp.join("bin/app"), b"#!/bin/sh\n").unwrap();

    store.register_output(&temp, &out).unwrap();
    assert!(store.has(&out));
    assert!(!temp.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let out_fs = store.to_path(&out);
        assert_eq!(
            fs::metadata(&out_fs).unwrap().permissions().mode() & 0o777,
            0o555
        );
        assert_eq!(
            fs::metadata(out_fs.join("bin")).unwrap().permissions().mode() & 0o777,
            0o555
        );
        assert_eq!(
            fs::metadata(out_fs.join("bin/app")).unwrap().permissions().mode() & 0o777,
            0o444
        );
    }

    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_register_output_first_writer_wins() {
    let store = temp_store("collide");
    let out = store_path_for("output:out", &"8".repeat(64), store.root(), "built");

    let first = store.root().join(".tmp-a");
    fs::create_dir_all(&first).unwrap();
    fs::write(first.join("data"), b"first").unwrap();
    store.register_output(&first, &out).unwrap();

    let second = store.root().join(".tmp-b");
    fs::create_dir_all(&second).unwrap();
    fs::write(second.join("data"), b"second").unwrap();
    store.register_output(&second, &out).unwrap();

    assert_eq!(fs::read(store.to_path(&out).join("data")).unwrap(), b"first");
    assert!(!second.exists());

    let _ = fs::remove_dir_all(store.root());
}

// Instantiation tests

#[test]
fn test_instantiate_writes_drv_file() {
    let store = temp_store("instantiate");
    let mut g = Graph::new();
    let id = g.add(
        Derivation::builder("hello")
            .system("x86_64-linux")
            .arg("-c")
            .arg("true")
            .build(),
    );

    let inst = instantiate(&store, &g, id).unwrap();
    assert!(store.has(&inst.drv_path));
    assert_eq!(inst.drv_path.name(), "hello.drv");
    assert_eq!(inst.out_path.name(), "hello");

    let file = store.read_drv(&inst.drv_path).unwrap();
    assert_eq!(
        file.out_path(),
        Some(store.to_path(&inst.out_path).display().to_string().as_str())
    );
    assert_eq!(file.system, "x86_64-linux");
    assert_eq!(file.builder, "/bin/sh");

    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_instantiate_deterministic() {
    let store = temp_store("inst-deterministic");
    let mut g = Graph::new();
    let id = g.add(Derivation::builder("pkg").system("x86_64-linux").build());

    let a = instantiate(&store, &g, id).unwrap();
    let b = instantiate(&store, &g, id).unwrap();
    assert_eq!(a, b);

    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_instantiate_deep_chain() {
    let store = temp_store("chain");
    let mut g = Graph::new();
    let mut prev = g.add(Derivation::builder("leaf").system("x86_64-linux").build());
    for level in 1..20 {
        prev = g.add(
            Derivation::builder(format!("level-{level}"))
                .system("x86_64-linux")
                .input(prev)
                .build(),
        );
    }

    instantiate(&store, &g, prev).unwrap();

    let drvs = store.list().unwrap();
    assert_eq!(drvs.iter().filter(|p| p.is_drv()).count(), 20);

    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_instantiate_fixed_output_path_equality() {
    // Two fetch-style derivations with the same declared sha256 but
    // different URLs resolve to the same output path.
    let store = temp_store("fixed-equal");
    let mut g = Graph::new();
    let a = g.add(
        Derivation::builder("blob")
            .arg("https://example.com/one")
            .fixed_output("a".repeat(64), HashMode::Flat)
            .build(),
    );
    let b = g.add(
        Derivation::builder("blob")
            .arg("https://example.org/two")
            .env("MIRROR", "fallback")
            .fixed_output("a".repeat(64), HashMode::Flat)
            .build(),
    );

    let inst_a = instantiate(&store, &g, a).unwrap();
    let inst_b = instantiate(&store, &g, b).unwrap();
    assert_eq!(inst_a.out_path, inst_b.out_path);

    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_instantiate_ingests_local_builder() {
    let store = temp_store("local-builder");
    // A builder reference that is neither a store path nor absolute is
    // treated as a local file and ingested. Relative paths resolve against
    // the working directory, so stage the script there.
    let script = format!("tarn-test-builder-{}.sh", std::process::id());
    fs::write(&script, b"#!/bin/sh\nmkdir -p \"$out\"\n").unwrap();

    let mut g = Graph::new();
    let id = g.add(Derivation::builder("scripted").builder_path(&script).build());

    let inst = instantiate(&store, &g, id).unwrap();
    let file = store.read_drv(&inst.drv_path).unwrap();
    assert!(file.builder.starts_with(&store.root().display().to_string()));
    assert_eq!(file.input_srcs.len(), 1);
    assert_eq!(file.input_srcs[0], file.builder);

    let _ = fs::remove_file(&script);
    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_instantiate_keeps_absolute_builder() {
    let store = temp_store("abs-builder");
    let mut g = Graph::new();
    let id = g.add(Derivation::builder("shelled").builder_path("/bin/sh").build());

    let inst = instantiate(&store, &g, id).unwrap();
    let file = store.read_drv(&inst.drv_path).unwrap();
    assert_eq!(file.builder, "/bin/sh");
    assert!(file.input_srcs.is_empty());

    let _ = fs::remove_dir_all(store.root());
}

#[test]
fn test_instantiate_input_drvs_reference_store() {
    let store = temp_store("input-drvs");
    let mut g = Graph::new();
    let dep = g.add(Derivation::builder("dep").system("x86_64-linux").build());
    let top = g.add(
        Derivation::builder("top")
            .system("x86_64-linux")
            .input(dep)
            .build(),
    );

    let inst = instantiate(&store, &g, top).unwrap();
    let file = store.read_drv(&inst.drv_path).unwrap();
    assert_eq!(file.input_drvs.len(), 1);
    for (drv_abs, outputs) in &file.input_drvs {
        assert_eq!(outputs, &vec!["out".to_string()]);
        let sp = StorePath::parse(Path::new(drv_abs)).unwrap();
        assert!(sp.is_drv());
        assert!(store.has(&sp));
    }

    let _ = fs::remove_dir_all(store.root());
}
