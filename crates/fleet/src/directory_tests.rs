// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::Library;

fn library_with(files: &[(&str, &[u8])]) -> (tempfile::TempDir, Library) {
    let dir = tempfile::tempdir().unwrap();
    for (name, bytes) in files {
        std::fs::write(dir.path().join(name), bytes).unwrap();
    }
    let library = Library::new(vec![dir.path().to_path_buf()]);
    (dir, library)
}

#[test]
fn lists_files_sorted() {
    let (dir, library) = library_with(&[("b.bin", b"b"), ("a.bin", b"a")]);
    assert_eq!(library.files(dir.path()), vec!["a.bin", "b.bin"]);
    let all = library.all_files();
    assert_eq!(all.len(), 2);
    assert!(all[0].ends_with("a.bin"));
}

#[test]
fn contains_only_managed_paths() {
    let (dir, library) = library_with(&[("game.bin", b"x")]);
    let managed = dir.path().join("game.bin").to_string_lossy().into_owned();
    assert!(library.contains(&managed));
    assert!(!library.contains("/elsewhere/game.bin"));
    let missing = dir.path().join("other.bin").to_string_lossy().into_owned();
    assert!(!library.contains(&missing));
}

#[test]
fn applicability_follows_stem_prefix_convention() {
    let (_dir, library) = library_with(&[
        ("crazytaxi-widescreen.patch", b"p"),
        ("crazytaxi_freeplay.patch", b"p"),
        ("crazytaxi2-fix.patch", b"p"),
        ("ikaruga.patch", b"p"),
    ]);
    let applicable = library.applicable_to("roms/crazytaxi.bin");
    assert_eq!(applicable.len(), 2);
    assert!(applicable.iter().all(|p| p.contains("crazytaxi-") || p.contains("crazytaxi_")));
}

#[test]
fn display_names_come_from_filenames() {
    assert_eq!(Library::display_name("roms/crazy_taxi-usa.bin"), "crazy taxi usa");
    assert_eq!(Library::display_name("plain.bin"), "plain");
}

#[test]
fn upload_writes_and_checksums() -> anyhow::Result<()> {
    let (_dir, library) = library_with(&[]);
    let path = library.upload("new.patch", b"0: 00 -> 01\n")?;
    assert!(library.contains(&path));
    assert!(library.checksums().contains_key(&path));

    assert!(library.upload("../escape.patch", b"x").is_err());
    assert!(library.upload("nested/name.patch", b"x").is_err());
    Ok(())
}

#[test]
fn recalculate_tracks_file_changes() -> anyhow::Result<()> {
    let (dir, library) = library_with(&[("a.bin", b"one")]);
    library.recalculate(None);
    let before = library.checksums();

    std::fs::write(dir.path().join("a.bin"), b"two")?;
    library.recalculate(None);
    let after = library.checksums();
    assert_ne!(before, after);

    // A vanished file drops out of the map.
    std::fs::remove_file(dir.path().join("a.bin"))?;
    library.recalculate(None);
    assert!(library.checksums().is_empty());
    Ok(())
}

#[test]
fn load_rejects_unmanaged_paths() {
    let (dir, library) = library_with(&[("blob.sram", b"\x01\x02")]);
    let managed = dir.path().join("blob.sram").to_string_lossy().into_owned();
    assert_eq!(library.load(&managed).unwrap_or_default(), vec![1, 2]);
    assert!(library.load("/etc/passwd").is_err());
}
