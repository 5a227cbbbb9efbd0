use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::core::{ElementId, PanelGeometryMm, PanelId};
use crate::error::{RecipeError, RecipeResult};
use crate::recipe::call::{ArgSlot, Call, CallArg};
use crate::recipe::model::Panel;
use crate::recipe::ops::{CallCategory, Operation};
use crate::recipe::value::ArgValue;
use crate::style::StyleDocument;

/// Reserved kwarg carrying a caller-chosen element id.
pub const ID_KWARG: &str = "id";
/// Reserved kwarg carrying an explicit draw priority.
pub const ZORDER_KWARG: &str = "zorder";

/// Append-only record of drawing calls, keyed by panel.
///
/// Recorded calls are never edited. Re-recording a decoration under an id
/// that is already taken appends a new call that shadows the earlier one
/// at replay.
#[derive(Debug, Clone, Default)]
pub struct CallLedger {
    panels: IndexMap<PanelId, Panel>,
    counters: HashMap<(PanelId, String), u32>,
    next_seq: u64,
    programmatic_style: StyleDocument,
}

impl CallLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or returns) the grid panel at `row`, `col`.
    pub fn panel_mut(&mut self, row: u32, col: u32) -> &mut Panel {
        self.panels
            .entry(PanelId::grid(row, col))
            .or_insert_with(|| Panel::new(row, col))
    }

    /// Registers a panel under an explicit id and grid position.
    pub fn add_panel(&mut self, panel_id: PanelId, row: u32, col: u32) -> RecipeResult<()> {
        if self.panels.contains_key(&panel_id) {
            return Err(RecipeError::InvalidData(format!(
                "panel `{panel_id}` is already registered"
            )));
        }
        self.panels.insert(panel_id, Panel::new(row, col));
        Ok(())
    }

    pub fn set_panel_geometry(
        &mut self,
        panel_id: &PanelId,
        geometry: PanelGeometryMm,
    ) -> RecipeResult<()> {
        let panel = self.panels.get_mut(panel_id).ok_or_else(|| {
            RecipeError::InvalidData(format!("panel `{panel_id}` is not registered"))
        })?;
        panel.layout.geometry_mm = Some(geometry);
        Ok(())
    }

    /// Records the programmatic style layer.
    pub fn set_style(&mut self, style: StyleDocument) {
        self.programmatic_style = style;
    }

    #[must_use]
    pub fn style(&self) -> &StyleDocument {
        &self.programmatic_style
    }

    #[must_use]
    pub fn panels(&self) -> &IndexMap<PanelId, Panel> {
        &self.panels
    }

    #[must_use]
    pub fn panel(&self, panel_id: &PanelId) -> Option<&Panel> {
        self.panels.get(panel_id)
    }

    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.next_seq
    }

    /// Records one drawing operation and returns the element id assigned to it.
    ///
    /// Unknown panel ids of the form `ax_<row>_<col>` are registered on
    /// first use; other unknown ids must be added with [`Self::add_panel`].
    pub fn capture(
        &mut self,
        panel_id: &PanelId,
        operation: &str,
        args: Vec<ArgValue>,
        mut kwargs: IndexMap<String, ArgValue>,
    ) -> RecipeResult<ElementId> {
        let op = Operation::from_name(operation);
        if !op.is_known() {
            return Err(RecipeError::UnsupportedOperation {
                operation: operation.to_owned(),
            });
        }
        let invalid = |reason: String| RecipeError::InvalidArguments {
            operation: operation.to_owned(),
            reason,
        };

        let schema = op.arg_schema();
        if args.len() < schema.min_positional {
            return Err(invalid(format!(
                "expected at least {} positional argument(s), got {}",
                schema.min_positional,
                args.len()
            )));
        }
        for (index, value) in args.iter().enumerate() {
            if has_non_finite_scalar(value) {
                return Err(invalid(format!(
                    "positional argument `{}` holds a non-finite scalar",
                    op.arg_name(index)
                )));
            }
        }
        for (name, value) in &kwargs {
            if value.has_non_finite() {
                return Err(invalid(format!("keyword `{name}` holds a non-finite value")));
            }
        }

        let requested_id = match kwargs.shift_remove(ID_KWARG) {
            None | Some(ArgValue::Null) => None,
            Some(ArgValue::Str(raw)) if !raw.is_empty() => Some(ElementId::new(raw)),
            Some(_) => return Err(invalid("`id` must be a non-empty string".to_owned())),
        };
        let z_order = match kwargs.shift_remove(ZORDER_KWARG) {
            None | Some(ArgValue::Null) => None,
            Some(value) => {
                let raw = value
                    .as_f64()
                    .ok_or_else(|| invalid("`zorder` must be a number".to_owned()))?;
                Some(raw.round() as i32)
            }
        };

        if !self.panels.contains_key(panel_id) {
            let (row, col) = parse_grid_id(panel_id).ok_or_else(|| {
                RecipeError::InvalidData(format!("panel `{panel_id}` is not registered"))
            })?;
            self.panels.insert(panel_id.clone(), Panel::new(row, col));
        }

        let category = op.category();
        let id = self.resolve_id(panel_id, &op, category, requested_id);
        let seq = self.next_seq;
        self.next_seq += 1;

        let call = Call {
            id: id.clone(),
            args: args
                .into_iter()
                .enumerate()
                .map(|(index, value)| CallArg {
                    name: op.arg_name(index),
                    value: ArgSlot::Inline(value),
                })
                .collect(),
            kwargs,
            seq,
            z_order,
            op,
        };
        debug!(
            panel_id = %panel_id,
            element_id = %id,
            operation = %call.op,
            seq,
            args = call.args.len(),
            "captured call"
        );
        if let Some(panel) = self.panels.get_mut(panel_id) {
            panel.sequence_mut(category).push(call);
        }
        Ok(id)
    }

    fn resolve_id(
        &mut self,
        panel_id: &PanelId,
        op: &Operation,
        category: CallCategory,
        requested: Option<ElementId>,
    ) -> ElementId {
        let taken = |ledger: &Self, id: &ElementId| {
            ledger
                .panels
                .get(panel_id)
                .is_some_and(|panel| panel.all_calls().any(|call| &call.id == id))
        };
        let taken_in_category = |ledger: &Self, id: &ElementId| {
            ledger
                .panels
                .get(panel_id)
                .is_some_and(|panel| panel.sequence(category).iter().any(|call| &call.id == id))
        };

        if let Some(id) = requested {
            if !taken(self, &id) {
                return id;
            }
            if category == CallCategory::Decoration && taken_in_category(self, &id) {
                debug!(panel_id = %panel_id, element_id = %id, "decoration shadows earlier call");
                return id;
            }
            debug!(
                panel_id = %panel_id,
                element_id = %id,
                "requested id already taken, assigning automatic id"
            );
        }

        loop {
            let counter = self
                .counters
                .entry((panel_id.clone(), op.name().to_owned()))
                .or_insert(0);
            let candidate = ElementId::new(format!("{}_{:03}", op.name(), *counter));
            *counter += 1;
            if !taken(self, &candidate) {
                return candidate;
            }
        }
    }

    /// Moves the recorded panels and style out of the ledger.
    #[must_use]
    pub fn into_parts(self) -> (IndexMap<PanelId, Panel>, StyleDocument) {
        (self.panels, self.programmatic_style)
    }
}

fn has_non_finite_scalar(value: &ArgValue) -> bool {
    match value {
        ArgValue::Float(value) => !value.is_finite(),
        ArgValue::List(items) => items.iter().any(has_non_finite_scalar),
        ArgValue::Map(entries) => entries.values().any(has_non_finite_scalar),
        _ => false,
    }
}

fn parse_grid_id(panel_id: &PanelId) -> Option<(u32, u32)> {
    let rest = panel_id.as_str().strip_prefix("ax_")?;
    let (row, col) = rest.split_once('_')?;
    Some((row.parse().ok()?, col.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::CallLedger;
    use crate::core::{ElementId, PanelId};
    use crate::error::RecipeError;
    use crate::recipe::value::ArgValue;

    fn kwargs(pairs: &[(&str, ArgValue)]) -> IndexMap<String, ArgValue> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn auto_ids_count_per_panel_and_operation() {
        let mut ledger = CallLedger::new();
        let ax = PanelId::grid(0, 0);
        let other = PanelId::grid(0, 1);
        let xy = || vec![ArgValue::from(vec![0.0, 1.0]), ArgValue::from(vec![1.0, 2.0])];
        let mut capture = |panel: &PanelId, op: &str| {
            ledger
                .capture(panel, op, xy(), IndexMap::new())
                .expect("capture")
        };
        assert_eq!(capture(&ax, "plot"), ElementId::new("plot_000"));
        assert_eq!(capture(&ax, "plot"), ElementId::new("plot_001"));
        assert_eq!(capture(&ax, "scatter"), ElementId::new("scatter_000"));
        assert_eq!(capture(&other, "plot"), ElementId::new("plot_000"));
        assert_eq!(ledger.call_count(), 4);
    }

    #[test]
    fn unsupported_operations_and_short_argument_lists_fail() {
        let mut ledger = CallLedger::new();
        let ax = PanelId::grid(0, 0);
        let err = ledger
            .capture(&ax, "violinplot", Vec::new(), IndexMap::new())
            .expect_err("unsupported");
        assert!(matches!(err, RecipeError::UnsupportedOperation { .. }));
        let err = ledger
            .capture(&ax, "scatter", vec![ArgValue::from(vec![1.0])], IndexMap::new())
            .expect_err("too few args");
        assert!(matches!(err, RecipeError::InvalidArguments { .. }));
        let err = ledger
            .capture(&ax, "axhline", vec![ArgValue::Float(f64::NAN)], IndexMap::new())
            .expect_err("nan scalar");
        assert!(matches!(err, RecipeError::InvalidArguments { .. }));
    }

    #[test]
    fn caller_ids_shadow_decorations_but_not_data() {
        let mut ledger = CallLedger::new();
        let ax = PanelId::grid(0, 0);
        let title = |text: &str| vec![ArgValue::from(text)];
        let first = ledger
            .capture(&ax, "set_title", title("A"), kwargs(&[("id", ArgValue::from("title"))]))
            .expect("first");
        let second = ledger
            .capture(&ax, "set_title", title("B"), kwargs(&[("id", ArgValue::from("title"))]))
            .expect("second");
        assert_eq!(first, second);
        let panel = ledger.panel(&ax).expect("panel");
        assert_eq!(panel.decorations.len(), 2);
        assert_eq!(panel.effective_decorations().len(), 1);

        let xy = vec![ArgValue::from(vec![0.0]), ArgValue::from(vec![1.0])];
        let a = ledger
            .capture(&ax, "plot", xy.clone(), kwargs(&[("id", ArgValue::from("trace"))]))
            .expect("a");
        let b = ledger
            .capture(
                &ax,
                "plot",
                xy,
                kwargs(&[("id", ArgValue::from("trace")), ("zorder", ArgValue::Int(5))]),
            )
            .expect("b");
        assert_eq!(a, ElementId::new("trace"));
        assert_eq!(b, ElementId::new("plot_000"));
        let panel = ledger.panel(&ax).expect("panel");
        assert_eq!(panel.calls[1].z_order, Some(5));
        assert!(panel.calls[1].kwargs.is_empty());
    }

    #[test]
    fn unregistered_non_grid_panels_are_rejected() {
        let mut ledger = CallLedger::new();
        let inset = PanelId::new("inset");
        let title = || vec![ArgValue::from("x")];
        let err = ledger
            .capture(&inset, "set_title", title(), IndexMap::new())
            .expect_err("unregistered");
        assert!(matches!(err, RecipeError::InvalidData(_)));
        ledger.add_panel(inset.clone(), 0, 0).expect("add");
        assert!(
            ledger
                .capture(&inset, "set_title", title(), IndexMap::new())
                .is_ok()
        );
    }
}
