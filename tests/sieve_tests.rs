use corpus_sieve::core::scanner::ScanError;
use corpus_sieve::{
    Action, BlurMethod, Disposition, ImageRecord, Manifest, NearDuplicateScope, Sieve,
    SieveConfig, SieveError,
};
use image::{GrayImage, Luma};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 256x256 of 16px blocks with pseudo-random levels: sharp under both metrics,
/// and a different coarse layout per seed.
fn blocks(seed: u64) -> GrayImage {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut levels = [0u8; 256];
    for level in levels.iter_mut() {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        *level = (state >> 56) as u8;
    }
    GrayImage::from_fn(256, 256, |x, y| {
        Luma([levels[((y / 16) * 16 + x / 16) as usize]])
    })
}

/// Sharp to the Laplacian, flat to Sobel.
fn checkerboard() -> GrayImage {
    GrayImage::from_fn(256, 256, |x, y| {
        Luma([if (x + y) % 2 == 0 { 138 } else { 118 }])
    })
}

fn gradient() -> GrayImage {
    GrayImage::from_fn(256, 256, |x, y| Luma([((x + y) / 2) as u8]))
}

fn save(root: &Path, rel: &str, img: &GrayImage) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    img.save(&path).unwrap();
    path
}

fn find<'a>(records: &'a [ImageRecord], path: &Path) -> &'a ImageRecord {
    records
        .iter()
        .find(|r| r.path == path)
        .unwrap_or_else(|| panic!("no record for {}", path.display()))
}

fn config(root: &Path) -> SieveConfig {
    SieveConfig::with_roots([root])
}

#[test]
fn test_small_images_rejected_regardless_of_blur_or_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let small = GrayImage::from_fn(100, 300, |x, _| Luma([if x % 2 == 0 { 0 } else { 255 }]));
    let a = save(root, "aphid/a.png", &small);
    let b = save(root, "aphid/b.png", &small);
    let flat_small = save(root, "aphid/c.png", &GrayImage::from_pixel(10, 10, Luma([9])));

    let mut cfg = config(root);
    cfg.dry_run = true;
    let report = Sieve::new(cfg).unwrap().clean_root(root).unwrap();

    for path in [&a, &b, &flat_small] {
        let record = find(&report.records, path);
        assert_eq!(record.disposition, Disposition::RejectSmall);
        assert!(record.fingerprint.is_none());
        assert!(record.blur_scores.is_empty());
    }
    assert!(report.clusters.is_empty());
}

#[test]
fn test_both_method_keeps_image_failing_only_tenengrad() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let path = save(root, "aphid/checker.png", &checkerboard());
    let blurry = save(root, "aphid/gradient.png", &gradient());

    let mut cfg = config(root);
    cfg.dry_run = true;
    let report = Sieve::new(cfg.clone()).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &path).disposition, Disposition::Keep);
    assert_eq!(find(&report.records, &blurry).disposition, Disposition::RejectBlur);

    cfg.blur.method = BlurMethod::Tenengrad;
    let report = Sieve::new(cfg.clone()).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &path).disposition, Disposition::RejectBlur);

    cfg.blur.method = BlurMethod::Laplacian;
    let report = Sieve::new(cfg).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &path).disposition, Disposition::Keep);
}

#[test]
fn test_duplicate_cluster_keeps_exactly_one() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let img = blocks(7);
    let paths = [
        save(root, "aphid/src/c.png", &img),
        save(root, "aphid/src/a.png", &img),
        save(root, "aphid/src/b.png", &img),
    ];
    save(root, "aphid/src/other.png", &blocks(99));

    let mut cfg = config(root);
    cfg.dry_run = true;
    let report = Sieve::new(cfg).unwrap().clean_root(root).unwrap();

    assert_eq!(report.clusters.len(), 1);
    let cluster = &report.clusters[0];
    assert_eq!(cluster.members.len(), 3);
    assert_eq!(cluster.representative, root.join("aphid/src/a.png"));

    let dispositions: Vec<Disposition> = paths
        .iter()
        .map(|p| find(&report.records, p).disposition)
        .collect();
    assert_eq!(
        dispositions,
        vec![
            Disposition::RejectDuplicate,
            Disposition::Keep,
            Disposition::RejectDuplicate
        ]
    );
    assert_eq!(report.summary.count(Disposition::Keep), 2);
    for path in &paths {
        assert_eq!(find(&report.records, path).cluster_id, Some(cluster.id));
    }
}

#[test]
fn test_cross_source_duplicates_depend_on_scope() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let a = save(root, "class_A/source_X/a.jpg", &blocks(3));
    let b = root.join("class_A/source_Y/b.jpg");
    fs::create_dir_all(b.parent().unwrap()).unwrap();
    fs::copy(&a, &b).unwrap();

    let mut cfg = config(root);
    cfg.dry_run = true;
    cfg.hamming_threshold = 0;

    cfg.near_duplicate_scope = NearDuplicateScope::Class;
    let report = Sieve::new(cfg.clone()).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &a).disposition, Disposition::Keep);
    assert_eq!(find(&report.records, &b).disposition, Disposition::RejectDuplicate);

    cfg.near_duplicate_scope = NearDuplicateScope::Folder;
    let report = Sieve::new(cfg).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &a).disposition, Disposition::Keep);
    assert_eq!(find(&report.records, &b).disposition, Disposition::Keep);
    assert!(report.clusters.is_empty());
}

#[test]
fn test_near_identical_images_cluster_within_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let a = save(root, "aphid/a.png", &blocks(31));
    let mut touched = blocks(31);
    let level = touched.get_pixel(100, 100)[0];
    touched.put_pixel(100, 100, Luma([level.wrapping_add(40)]));
    let b = save(root, "aphid/b.png", &touched);
    let other = save(root, "aphid/c.png", &blocks(77));

    let mut cfg = config(root);
    cfg.dry_run = true;
    cfg.hamming_threshold = 5;
    let report = Sieve::new(cfg).unwrap().clean_root(root).unwrap();

    assert_eq!(find(&report.records, &a).disposition, Disposition::Keep);
    assert_eq!(find(&report.records, &b).disposition, Disposition::RejectDuplicate);
    assert_eq!(find(&report.records, &other).disposition, Disposition::Keep);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].members, vec![a, b]);
}

#[test]
fn test_root_scope_spans_classes() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let a = save(root, "class_A/a.png", &blocks(41));
    let b = save(root, "class_B/b.png", &blocks(41));

    let mut cfg = config(root);
    cfg.dry_run = true;

    cfg.near_duplicate_scope = NearDuplicateScope::Root;
    let report = Sieve::new(cfg.clone()).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &a).disposition, Disposition::Keep);
    assert_eq!(find(&report.records, &b).disposition, Disposition::RejectDuplicate);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].scope_key.to_string(), ".");

    cfg.near_duplicate_scope = NearDuplicateScope::Class;
    let report = Sieve::new(cfg).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &b).disposition, Disposition::Keep);
    assert!(report.clusters.is_empty());
}

#[test]
fn test_zero_byte_file_does_not_stop_scan() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let broken = root.join("broken.jpg");
    fs::write(&broken, b"").unwrap();
    let good = save(root, "aphid/good.png", &blocks(1));

    let report = Sieve::new(config(root)).unwrap().clean_root(root).unwrap();

    let record = find(&report.records, &broken);
    assert_eq!(record.disposition, Disposition::RejectDecodeError);
    assert_eq!((record.width, record.height), (0, 0));
    assert_eq!(find(&report.records, &good).disposition, Disposition::Keep);
    assert_eq!(report.summary.moved, 1);
    assert!(root.join(".trash/decode_error/broken.jpg").exists());
    assert!(good.exists());
}

#[test]
fn test_second_move_run_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    save(root, "aphid/src/1.png", &blocks(11));
    save(root, "aphid/src/2.png", &blocks(11));
    save(root, "aphid/src/3.png", &gradient());
    save(root, "aphid/src/4.png", &GrayImage::from_pixel(50, 50, Luma([1])));
    save(root, "mite/5.png", &blocks(12));

    let sieve = Sieve::new(config(root)).unwrap();
    let first = sieve.clean_root(root).unwrap();
    assert_eq!(first.summary.moved, 3);
    assert!(root.join("aphid/.trash/duplicate/src/2.png").exists());
    assert!(root.join("aphid/.trash/blur/src/3.png").exists());
    assert!(root.join("aphid/.trash/small/src/4.png").exists());
    let manifest_len = Manifest::load(root).unwrap().len();
    assert_eq!(manifest_len, 3);

    let second = sieve.clean_root(root).unwrap();
    assert_eq!(second.summary.moved, 0);
    assert_eq!(second.summary.total, 2);
    assert_eq!(second.summary.count(Disposition::Keep), 2);
    assert_eq!(Manifest::load(root).unwrap().len(), manifest_len);
}

#[test]
fn test_rescue_restores_blur_but_never_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let sharp = save(root, "aphid/src/sharp.png", &blocks(21));
    let original = save(root, "aphid/src/orig.png", &blocks(22));
    let copy = save(root, "aphid/src/zcopy.png", &blocks(22));

    // Default pass quarantines the copy as a duplicate.
    let sieve = Sieve::new(config(root)).unwrap();
    let report = sieve.clean_root(root).unwrap();
    assert_eq!(find(&report.records, &copy).disposition, Disposition::RejectDuplicate);

    // Absurd thresholds send everything left to the blur trash.
    let mut strict = config(root);
    strict.blur.laplacian_threshold = 1e12;
    strict.blur.tenengrad_threshold = 1e12;
    let report = Sieve::new(strict).unwrap().clean_root(root).unwrap();
    assert_eq!(find(&report.records, &sharp).disposition, Disposition::RejectBlur);
    assert_eq!(find(&report.records, &original).disposition, Disposition::RejectBlur);
    assert!(!sharp.exists());
    assert!(!original.exists());

    let mut rescue = config(root);
    rescue.rescue_blur = true;
    rescue.skip_clean = true;
    let reports = Sieve::new(rescue).unwrap().run().unwrap();
    let outcome = reports[0].rescue.as_ref().unwrap();

    assert_eq!(outcome.scanned, 2);
    assert_eq!(outcome.restored.len(), 2);
    assert!(sharp.exists());
    assert!(original.exists());
    assert!(!copy.exists());

    let remaining: Vec<Disposition> = Manifest::load(root)
        .unwrap()
        .entries()
        .map(|(_, e)| e.reason)
        .collect();
    assert_eq!(remaining, vec![Disposition::RejectDuplicate]);
}

#[test]
fn test_delete_action_removes_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let blurry = save(root, "aphid/blurry.png", &gradient());
    let keep = save(root, "aphid/keep.png", &blocks(5));

    let mut cfg = config(root);
    cfg.action = Action::Delete;
    let report = Sieve::new(cfg).unwrap().clean_root(root).unwrap();

    assert_eq!(report.summary.deleted, 1);
    assert!(!blurry.exists());
    assert!(keep.exists());
    assert!(!root.join("aphid/.trash").exists());

    let manifest = Manifest::load(root).unwrap();
    let (_, entry) = manifest.entries().next().unwrap();
    assert!(!entry.is_rescuable());
    assert_eq!(entry.metric_snapshot.width, 256);
}

#[test]
fn test_missing_root_is_fatal_before_any_change() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let blurry = save(root, "aphid/blurry.png", &gradient());

    let cfg = SieveConfig::with_roots([root.to_path_buf(), root.join("missing")]);
    let result = Sieve::new(cfg);
    assert!(matches!(result, Err(SieveError::Config(_))));
    assert!(blurry.exists());
}

#[test]
fn test_dry_run_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let blurry = save(root, "aphid/blurry.png", &gradient());

    let mut cfg = config(root);
    cfg.dry_run = true;
    let reports = Sieve::new(cfg).unwrap().run().unwrap();

    assert_eq!(reports[0].summary.count(Disposition::RejectBlur), 1);
    assert_eq!(reports[0].summary.moved, 0);
    assert!(blurry.exists());
    assert!(Manifest::load(root).unwrap().is_empty());
}

#[test]
fn test_rescue_from_another_directory_after_relative_clean() {
    let temp_dir = TempDir::new().unwrap();
    let work = temp_dir.path().join("work");
    let blurry = save(&work, "data/aphid/g.png", &gradient());
    let sharp = save(&work, "data/aphid/k.png", &blocks(4));

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(&work).unwrap();
    let relative = Path::new("data");
    let cleaned = Sieve::new(config(relative)).and_then(|sieve| sieve.clean_root(relative));
    std::env::set_current_dir(&previous).unwrap();

    assert_eq!(cleaned.unwrap().summary.moved, 1);
    assert!(!blurry.exists());
    assert!(sharp.exists());

    let root = work.join("data");
    let manifest = Manifest::load(&root).unwrap();
    let (_, entry) = manifest.entries().next().unwrap();
    assert_eq!(entry.original_path, PathBuf::from("aphid/g.png"));
    assert_eq!(
        entry.trash_path.as_deref(),
        Some(Path::new("aphid/.trash/blur/g.png"))
    );

    let mut rescue = config(&root);
    rescue.rescue_blur = true;
    rescue.skip_clean = true;
    rescue.blur.laplacian_threshold = 0.0;
    rescue.blur.tenengrad_threshold = 0.0;
    let reports = Sieve::new(rescue).unwrap().run().unwrap();
    let outcome = reports[0].rescue.as_ref().unwrap();

    assert!(outcome.missing.is_empty());
    assert_eq!(outcome.restored.len(), 1);
    assert!(blurry.exists());
    assert!(Manifest::load(&root).unwrap().is_empty());
}

#[test]
fn test_cancelled_sieve_leaves_root_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let blurry = save(root, "aphid/blurry.png", &gradient());

    let sieve = Sieve::new(config(root)).unwrap();
    sieve.cancel();
    let result = sieve.clean_root(root);

    assert!(matches!(result, Err(SieveError::Scan(ScanError::Cancelled))));
    assert!(blurry.exists());
    assert!(Manifest::load(root).unwrap().is_empty());
}
