use figure_recipe::core::{LayoutParameters, PanelId, PanelPlacement, solve_layout};
use figure_recipe::style::{StyleDocument, diff, merge};
use figure_recipe::RecipeError;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

const SECTIONS: [&str; 3] = ["fonts", "lines", "ticks"];
const KEYS: [&str; 4] = ["a", "b", "c", "d"];

/// A two-level document over a fixed key universe.
fn layer() -> impl Strategy<Value = StyleDocument> {
    proptest::collection::vec(
        (0..SECTIONS.len(), 0..KEYS.len(), proptest::option::of(-100i32..100)),
        0..12,
    )
    .prop_map(|entries| {
        let mut doc = StyleDocument::new();
        for (section, key, value) in entries {
            if let Some(value) = value {
                doc.set_path(&format!("{}.{}", SECTIONS[section], KEYS[key]), json!(value))
                    .expect("object path");
            }
        }
        doc
    })
}

fn all_paths() -> impl Iterator<Item = String> {
    SECTIONS
        .iter()
        .flat_map(|section| KEYS.iter().map(move |key| format!("{section}.{key}")))
}

proptest! {
    #[test]
    fn merge_prefers_manual_then_programmatic_then_base(
        base in layer(),
        programmatic in layer(),
        manual in layer()
    ) {
        let effective = merge(&base, &programmatic, &manual);
        for path in all_paths() {
            let expected = manual
                .get(&path)
                .or_else(|| programmatic.get(&path))
                .or_else(|| base.get(&path));
            prop_assert_eq!(effective.get(&path), expected, "path {}", path);
        }
    }

    #[test]
    fn diff_enumerates_exactly_the_manual_keys(
        base in layer(),
        programmatic in layer(),
        manual in layer()
    ) {
        let original = merge(&base, &programmatic, &StyleDocument::new());
        let edited = merge(&base, &programmatic, &manual);
        let changes = diff(&original, &edited);
        for path in all_paths() {
            let set_in_manual = manual.get(&path).is_some();
            let differs = set_in_manual && original.get(&path) != manual.get(&path);
            prop_assert_eq!(changes.get(&path).is_some(), differs, "path {}", path);
        }
        prop_assert!(changes.paths().all(|path| manual.get(path).is_some()));
    }

    #[test]
    fn layout_fractions_do_not_depend_on_dpi(
        axes_w in 10.0f64..120.0,
        axes_h in 10.0f64..90.0,
        rows in 1u32..4,
        cols in 1u32..4,
        dpi_a in 30.0f64..600.0,
        dpi_b in 30.0f64..600.0
    ) {
        let params = LayoutParameters::new(axes_w, axes_h);
        let placements: Vec<PanelPlacement> = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| PanelPlacement {
                panel_id: PanelId::grid(row, col),
                row,
                col,
                geometry: None,
            }))
            .collect();
        let size = params.figure_size_mm(rows, cols);
        let solution = solve_layout(&placements, &params, size).expect("fits");

        let figure = figure_recipe::recipe::FigureSpec::new(size.0, size.1);
        for placement in &placements {
            let fraction = solution.fraction_rect(&placement.panel_id).expect("panel");
            let at_a = solution
                .pixel_rect(&placement.panel_id, figure.viewport_at(dpi_a))
                .expect("pixels");
            let at_b = solution
                .pixel_rect(&placement.panel_id, figure.viewport_at(dpi_b))
                .expect("pixels");
            let va = figure.viewport_at(dpi_a);
            let vb = figure.viewport_at(dpi_b);
            prop_assert!((at_a.x / f64::from(va.width) - fraction.x).abs() < 1e-12);
            prop_assert!((at_b.x / f64::from(vb.width) - fraction.x).abs() < 1e-12);
            prop_assert!((at_a.height / f64::from(va.height) - fraction.height).abs() < 1e-12);
        }
    }
}

#[test]
fn diff_of_identical_documents_is_empty() {
    let doc = StyleDocument::from_value(json!({"fonts": {"a": 1}})).expect("object");
    assert!(diff(&doc, &doc).is_empty());
}

#[test]
fn oversized_grid_overflows_instead_of_clipping() {
    let params = LayoutParameters::new(50.0, 40.0);
    let placements = vec![PanelPlacement {
        panel_id: PanelId::grid(0, 1),
        row: 0,
        col: 1,
        geometry: None,
    }];
    let single = params.figure_size_mm(1, 1);
    let err = solve_layout(&placements, &params, single).expect_err("two columns do not fit");
    assert!(matches!(err, RecipeError::LayoutOverflow { axis: "horizontal", .. }));
}

#[test]
fn style_document_keeps_unrelated_sections_on_merge() {
    let mut base = Map::new();
    base.insert("theme".to_owned(), json!({"mode": "light"}));
    let base = StyleDocument::from_map(base);
    let manual = StyleDocument::from_value(json!({"fonts": {"a": 2}})).expect("object");
    let merged = merge(&base, &StyleDocument::new(), &manual);
    assert_eq!(merged.get("theme.mode"), Some(&Value::from("light")));
    assert_eq!(merged.get_f64("fonts.a"), Some(2.0));
}
