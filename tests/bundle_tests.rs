use std::fs;

use figure_recipe::api::Reproducer;
use figure_recipe::bundle::{Bundle, RENDER_ENTRY, STYLE_ENTRY};
use figure_recipe::core::{ElementId, LayoutParameters, MmDelta, PanelId};
use figure_recipe::overrides::sidecar_path;
use figure_recipe::recipe::{
    CallLedger, FigureSpec, RecipeConfig, StyleRef, load_recipe, save_recipe,
};
use figure_recipe::render::{RasterRenderer, Renderer};
use figure_recipe::{OverrideSet, RecipeError, StyleDocument};
use indexmap::IndexMap;

#[test]
fn bundle_round_trip_reproduces_identical_files_and_pixels() {
    let source = tempfile::tempdir().expect("tempdir");
    let recipe_path = source.path().join("wave.json");
    let panel = PanelId::grid(0, 0);
    let x: Vec<f64> = (0..500).map(|i| f64::from(i) * 0.02).collect();
    let y: Vec<f64> = x.iter().map(|v| (v * 3.0).cos()).collect();
    let mut ledger = CallLedger::new();
    ledger
        .capture(&panel, "plot", vec![x.into(), y.into()], IndexMap::new())
        .expect("plot");
    let layout = LayoutParameters::default();
    let recipe = save_recipe(
        &recipe_path,
        &ledger,
        FigureSpec::for_grid(&layout, 1, 1).with_dpi(80.0),
        layout,
        StyleRef::default(),
        &RasterRenderer::new().fingerprint(),
        &RecipeConfig::default(),
    )
    .expect("save");

    let mut overrides = OverrideSet::new();
    overrides.apply_element(
        &panel,
        &ElementId::new("plot_000"),
        &StyleDocument::new(),
        MmDelta::new(0.5, 0.0),
    );
    overrides.save(&sidecar_path(&recipe_path)).expect("sidecar");
    let rendered = Reproducer::new(RasterRenderer::new())
        .reproduce(&recipe, Some(&overrides))
        .expect("render");

    let bundle = Bundle::pack_recipe(&recipe_path, Some(&rendered.image)).expect("pack");
    let paths: Vec<&str> = bundle.paths().collect();
    assert_eq!(paths[0], "wave.json");
    assert_eq!(paths[1], "wave.overrides.json");
    assert!(paths.contains(&STYLE_ENTRY));
    assert!(paths.contains(&RENDER_ENTRY));
    assert_eq!(paths.len(), 6, "recipe, sidecar, x, y, style, render: {paths:?}");

    let archive = source.path().join("wave.bundle.json");
    bundle.write_to(&archive).expect("write");
    let target = tempfile::tempdir().expect("tempdir");
    Bundle::read_from(&archive)
        .expect("read")
        .unpack(target.path())
        .expect("unpack");

    for entry in &paths[..4] {
        assert_eq!(
            fs::read(target.path().join(entry)).expect("unpacked"),
            fs::read(source.path().join(entry)).expect("source"),
            "{entry} must be byte identical"
        );
    }

    let unpacked = load_recipe(&target.path().join("wave.json")).expect("load unpacked");
    let sidecar =
        OverrideSet::load(&sidecar_path(&target.path().join("wave.json"))).expect("sidecar");
    let replayed = Reproducer::new(RasterRenderer::new())
        .reproduce(&unpacked, Some(&sidecar))
        .expect("replay");
    assert_eq!(replayed.image, rendered.image);
}

#[test]
fn bundle_with_escaping_path_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let archive = dir.path().join("evil.json");
    fs::write(
        &archive,
        r#"{"format_version": "1.0", "created": "2026-01-01T00:00:00Z", "entries": {"../escape.txt": "aGk="}}"#,
    )
    .expect("write");
    let err = Bundle::read_from(&archive).expect_err("escaping path");
    assert!(matches!(err, RecipeError::InvalidData(_)));
}
