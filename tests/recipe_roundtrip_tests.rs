use figure_recipe::core::{LayoutParameters, PanelId};
use figure_recipe::recipe::{
    ArgSlot, ArgValue, CallLedger, Classification, DataExternalizer, FigureSpec, NdArray,
    RecipeConfig, StorageKind, StyleRef, classify, deserialize, inline_materialize, load_recipe,
    save_recipe, serialize,
};
use figure_recipe::style::{StyleDocument, StylePreset};
use figure_recipe::RecipeError;
use indexmap::IndexMap;
use serde_json::json;

fn kwargs(pairs: &[(&str, ArgValue)]) -> IndexMap<String, ArgValue> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), value.clone()))
        .collect()
}

fn mixed_ledger() -> CallLedger {
    let panel = PanelId::grid(0, 0);
    let mut ledger = CallLedger::new();
    ledger
        .capture(
            &panel,
            "plot",
            vec![vec![0.0, 0.5, 1.0].into(), vec![0.1, 0.7, -0.3].into(), "r--".into()],
            kwargs(&[("label", "trace".into()), ("linewidth", 1.5.into())]),
        )
        .expect("plot");
    ledger
        .capture(
            &panel,
            "scatter",
            vec![vec![1.0, 2.0].into(), vec![3.0, 4.0].into()],
            kwargs(&[("c", "C2".into()), ("zorder", 5_i64.into())]),
        )
        .expect("scatter");
    ledger
        .capture(
            &panel,
            "bar",
            vec![
                NdArray::from_strings(vec!["a".to_owned(), "b".to_owned()]).into(),
                vec![2.0, 5.0].into(),
            ],
            IndexMap::new(),
        )
        .expect("bar");
    ledger
        .capture(
            &panel,
            "imshow",
            vec![NdArray::from_rows(&[vec![0.0, 1.0], vec![2.0, 3.0]])
                .expect("rows")
                .into()],
            IndexMap::new(),
        )
        .expect("imshow");
    ledger
        .capture(&panel, "set_title", vec!["Mixed".into()], IndexMap::new())
        .expect("title");
    ledger
        .capture(&panel, "legend", Vec::new(), IndexMap::new())
        .expect("legend");
    ledger
}

fn figure(layout: &LayoutParameters) -> FigureSpec {
    FigureSpec::for_grid(layout, 1, 1).with_dpi(96.0)
}

#[test]
fn inline_recipe_survives_json_round_trip() {
    let layout = LayoutParameters::default();
    let style = StyleRef::preset(StylePreset::Scientific).with_programmatic(
        StyleDocument::from_value(json!({"lines": {"trace_mm": 0.45}})).expect("style"),
    );
    let recipe = serialize(&mixed_ledger(), figure(&layout), layout, style, "test/1", None)
        .expect("serialize");

    let json = recipe.to_json_pretty().expect("encode");
    let restored = deserialize(&json, None).expect("decode");
    assert_eq!(restored, recipe);
    assert_eq!(restored.to_json_pretty().expect("re-encode"), json);
}

#[test]
fn calls_keep_sequence_and_explicit_z_order() {
    let layout = LayoutParameters::default();
    let recipe = serialize(
        &mixed_ledger(),
        figure(&layout),
        layout,
        StyleRef::default(),
        "test/1",
        None,
    )
    .expect("serialize");
    let panel = recipe.panel(&PanelId::grid(0, 0)).expect("panel");
    let seqs: Vec<u64> = panel.all_calls().map(|call| call.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(panel.calls[1].z_order, Some(5));
    assert_eq!(panel.calls[0].id.as_str(), "plot_000");
}

#[test]
fn externalize_threshold_boundary_is_exact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut externalizer = DataExternalizer::new(dir.path(), "fig_data").with_threshold(64);
    let element = "plot_000".into();

    for len in [63_usize, 64, 65] {
        let values: Vec<f64> = (0..len).map(|i| (i as f64) * 0.1 - 1.0 / 3.0).collect();
        let value: ArgValue = values.into();
        let expected = if len > 64 {
            Classification::Bulk
        } else {
            Classification::Inline
        };
        assert_eq!(classify(&value, 64), expected, "len {len}");

        let data_ref = externalizer
            .externalize(&element, &format!("y{len}"), &value)
            .expect("externalize");
        assert_eq!(data_ref.kind, StorageKind::Table);
        assert_eq!(data_ref.shape, vec![len]);
        let restored = inline_materialize(dir.path(), &element, &format!("y{len}"), &data_ref)
            .expect("read back");
        assert_eq!(restored, value);
    }
}

#[test]
fn non_finite_arrays_use_binary_storage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut externalizer = DataExternalizer::new(dir.path(), "fig_data");
    let value: ArgValue = NdArray::from_rows(&[vec![1.0, f64::NAN], vec![f64::INFINITY, -0.0]])
        .expect("rows")
        .into();
    let element = "imshow_000".into();
    let data_ref = externalizer
        .externalize(&element, "X", &value)
        .expect("externalize");
    assert_eq!(data_ref.kind, StorageKind::Binary);
    let restored = inline_materialize(dir.path(), &element, "X", &data_ref).expect("read back");
    assert!(restored.same_as(&value));
}

#[test]
fn saved_recipe_reloads_with_external_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("figure.json");
    let panel = PanelId::grid(0, 0);
    let mut ledger = CallLedger::new();
    let x: Vec<f64> = (0..200).map(f64::from).collect();
    ledger
        .capture(&panel, "plot", vec![x.clone().into()], IndexMap::new())
        .expect("plot");
    let layout = LayoutParameters::default();

    let saved = save_recipe(
        &path,
        &ledger,
        figure(&layout),
        layout,
        StyleRef::default(),
        "test/1",
        &RecipeConfig::default(),
    )
    .expect("save");
    let loaded = load_recipe(&path).expect("load");

    let call = &loaded.panel(&panel).expect("panel").calls[0];
    let ArgSlot::External(data_ref) = &call.args[0].value else {
        panic!("200 values should be externalized");
    };
    assert!(dir.path().join(&data_ref.path).is_file());
    assert_eq!(loaded.panels, saved.panels);
}

#[test]
fn unsupported_version_is_rejected_before_parsing() {
    let err = deserialize(r#"{"format_version": "9.0", "panels": 17}"#, None).expect_err("version");
    assert!(matches!(err, RecipeError::UnsupportedFormatVersion { .. }));
    let err = deserialize("{}", None).expect_err("missing version");
    assert!(matches!(err, RecipeError::RecipeCorrupt(_)));
}

#[test]
fn unknown_operation_is_rejected_at_capture() {
    let mut ledger = CallLedger::new();
    let err = ledger
        .capture(&PanelId::grid(0, 0), "violinplot", Vec::new(), IndexMap::new())
        .expect_err("unknown");
    assert!(matches!(err, RecipeError::UnsupportedOperation { .. }));
}
