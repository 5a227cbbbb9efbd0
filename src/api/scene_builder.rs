use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "parallel-panels")]
use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::core::units::{mm_to_px, pt_to_px};
use crate::core::{
    DataExtent, DataLimits, DataTransform, DevicePoint, DeviceRect, ElementId, LayoutSolution,
    PanelId, Viewport, nice_ticks,
};
use crate::error::{RecipeError, RecipeResult};
use crate::overrides::{ELEMENTS_SECTION, OverrideSet, element_key};
use crate::recipe::{ArgValue, ArrayData, Call, DType, Operation, Panel, Recipe, RecipeResolver};
use crate::render::{
    Color, Primitive, RenderFrame, SceneItem, TextHAlign, TextMeasure, TextPrimitive, TextVAlign,
};
use crate::style::StyleDocument;

/// Z-order of the axes face, below everything an element can request.
pub const FACE_Z_ORDER: i32 = i32::MIN;
/// Z-order of spines, ticks and tick labels; drawn after data at the same level.
pub const FRAME_Z_ORDER: i32 = 2;

const DEFAULT_BAR_WIDTH: f64 = 0.8;
const DEFAULT_HIST_BINS: usize = 10;
/// Upper bound on histogram bins; larger requests are rejected per call.
const MAX_HIST_BINS: usize = 100_000;
const LABEL_GAP_MM: f64 = 0.5;
const TITLE_GAP_MM: f64 = 1.5;
const LEGEND_PAD_MM: f64 = 1.0;
const LEGEND_SWATCH_MM: f64 = 4.0;
const ARROW_HEAD_MM: f64 = 1.2;

const VIRIDIS: [[u8; 3]; 5] = [
    [0x44, 0x01, 0x54],
    [0x3b, 0x52, 0x8b],
    [0x21, 0x91, 0x8c],
    [0x5e, 0xc9, 0x62],
    [0xfd, 0xe7, 0x25],
];

/// Shared cancellation signal checked between calls.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> RecipeResult<()> {
        if self.is_cancelled() {
            return Err(RecipeError::Cancelled);
        }
        Ok(())
    }
}

/// How replay treats calls that cannot be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayMode {
    /// Skip unknown operations, broken data refs and malformed arguments,
    /// logging and reporting each one.
    #[default]
    Lenient,
    /// Fail on the first such call.
    Strict,
}

/// A call left out of the scene.
#[derive(Debug)]
pub struct SkippedCall {
    pub panel_id: PanelId,
    pub element_id: ElementId,
    pub operation: String,
    pub error: RecipeError,
}

/// Everything the scene builder reads.
#[derive(Debug, Clone, Copy)]
pub struct SceneRequest<'a> {
    pub recipe: &'a Recipe,
    pub style: &'a StyleDocument,
    pub overrides: &'a OverrideSet,
    pub layout: &'a LayoutSolution,
    pub mode: ReplayMode,
    pub cancel: &'a CancelFlag,
}

#[derive(Debug)]
pub struct SceneBuild {
    pub frame: RenderFrame,
    pub skipped: Vec<SkippedCall>,
}

struct PanelScene {
    items: Vec<SceneItem>,
    skipped: Vec<SkippedCall>,
}

/// Converts every panel of the recipe into tagged device primitives.
///
/// Within a panel calls are processed strictly in sequence order; panels are
/// collected in recipe order whether or not they are built in parallel.
pub fn build_scene<M: TextMeasure + ?Sized>(
    request: &SceneRequest<'_>,
    measure: &M,
) -> RecipeResult<SceneBuild> {
    let figure = &request.recipe.figure;
    let viewport = figure.viewport();
    let mut background = Color::from_hex(&figure.background)?;
    if request.style.get_bool("output.transparent") == Some(true) {
        background = background.with_alpha(0.0);
    }

    let panels: Vec<(&PanelId, &Panel)> = request.recipe.panels.iter().collect();
    #[cfg(feature = "parallel-panels")]
    let results: Vec<RecipeResult<PanelScene>> = panels
        .par_iter()
        .map(|(panel_id, panel)| build_panel(request, measure, viewport, panel_id, panel))
        .collect();
    #[cfg(not(feature = "parallel-panels"))]
    let results: Vec<RecipeResult<PanelScene>> = panels
        .iter()
        .map(|(panel_id, panel)| build_panel(request, measure, viewport, panel_id, panel))
        .collect();

    let mut frame = RenderFrame::new(viewport, background);
    let mut skipped = Vec::new();
    for result in results {
        let scene = result?;
        frame.items.extend(scene.items);
        skipped.extend(scene.skipped);
    }
    debug!(
        items = frame.items.len(),
        skipped = skipped.len(),
        width = viewport.width,
        height = viewport.height,
        "built scene"
    );
    Ok(SceneBuild { frame, skipped })
}

fn build_panel<M: TextMeasure + ?Sized>(
    request: &SceneRequest<'_>,
    measure: &M,
    viewport: Viewport,
    panel_id: &PanelId,
    panel: &Panel,
) -> RecipeResult<PanelScene> {
    let rect = request
        .layout
        .pixel_rect(panel_id, viewport)
        .ok_or_else(|| RecipeError::InvalidData(format!("panel `{panel_id}` has no layout")))?;
    let ctx = PanelCtx {
        panel_id,
        rect,
        style: request.style,
        overrides: request.overrides,
        layout: request.layout,
        viewport,
        dpi: request.recipe.figure.dpi,
        palette: palette_from(request.style),
        measure,
        mode: request.mode,
        cancel: request.cancel,
    };
    ctx.build(panel, request.recipe)
}

fn palette_from(style: &StyleDocument) -> Vec<Color> {
    let palette: Vec<Color> = style
        .get("colors.palette")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|raw| Color::from_hex(raw).ok())
                .collect()
        })
        .unwrap_or_default();
    if palette.is_empty() {
        vec![Color::BLACK]
    } else {
        palette
    }
}

/// Parses hex colors, single-letter and common names, and `C<n>` palette
/// references.
pub fn parse_color(raw: &str, palette: &[Color]) -> RecipeResult<Color> {
    let lowered = raw.trim().to_ascii_lowercase();
    if let Some(index) = lowered
        .strip_prefix('c')
        .and_then(|digits| digits.parse::<usize>().ok())
    {
        if let Some(color) = palette.get(index % palette.len().max(1)) {
            return Ok(*color);
        }
    }
    let named = match lowered.as_str() {
        "k" | "black" => "#000000",
        "w" | "white" => "#ffffff",
        "r" | "red" => "#ff0000",
        "g" | "green" => "#008000",
        "b" | "blue" => "#0000ff",
        "c" | "cyan" => "#00bfbf",
        "m" | "magenta" => "#bf00bf",
        "y" | "yellow" => "#bfbf00",
        "gray" | "grey" => "#808080",
        "orange" => "#ffa500",
        "purple" => "#800080",
        "none" => return Ok(Color::rgba(0.0, 0.0, 0.0, 0.0)),
        _ => lowered.as_str(),
    };
    Color::from_hex(named)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Anchor {
    Data(f64, f64),
    Axes(f64, f64),
    Title,
    XLabel,
    YLabel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GridAxis {
    X,
    Y,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LegendLocation {
    UpperRight,
    UpperLeft,
    LowerLeft,
    LowerRight,
}

impl LegendLocation {
    fn from_name(name: &str) -> Self {
        match name {
            "upper left" => Self::UpperLeft,
            "lower left" => Self::LowerLeft,
            "lower right" => Self::LowerRight,
            _ => Self::UpperRight,
        }
    }
}

/// Element geometry in data (or panel-relative) space, before transform.
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Path {
        points: Vec<(f64, f64)>,
        width: f64,
        color: Color,
    },
    Dots {
        points: Vec<(f64, f64)>,
        radius: f64,
        color: Color,
    },
    Boxes {
        boxes: Vec<[f64; 4]>,
        color: Color,
    },
    Area {
        points: Vec<(f64, f64)>,
        color: Color,
    },
    Raster {
        bounds: [f64; 4],
        columns: usize,
        rows: usize,
        cells: Vec<Color>,
    },
    HRule {
        y: f64,
        span: (f64, f64),
        width: f64,
        color: Color,
    },
    VRule {
        x: f64,
        span: (f64, f64),
        width: f64,
        color: Color,
    },
    HBand {
        y0: f64,
        y1: f64,
        color: Color,
    },
    VBand {
        x0: f64,
        x1: f64,
        color: Color,
    },
    Label {
        anchor: Anchor,
        text: String,
        size_px: f64,
        color: Color,
        h_align: TextHAlign,
        v_align: TextVAlign,
    },
    Arrow {
        from: (f64, f64),
        to: (f64, f64),
        width: f64,
        color: Color,
    },
    Grid {
        axis: GridAxis,
        width: f64,
        color: Color,
    },
    Legend {
        entries: Vec<(String, Color)>,
        size_px: f64,
        location: LegendLocation,
        frame: bool,
    },
}

impl Shape {
    fn include_in(&self, extent: &mut DataExtent) {
        match self {
            Self::Path { points, .. } | Self::Dots { points, .. } | Self::Area { points, .. } => {
                for &(x, y) in points {
                    extent.include(x, y);
                }
            }
            Self::Boxes { boxes, .. } => {
                for corners in boxes {
                    extent.include(corners[0], corners[1]);
                    extent.include(corners[2], corners[3]);
                }
            }
            Self::Raster { bounds, .. } => {
                extent.include(bounds[0], bounds[1]);
                extent.include(bounds[2], bounds[3]);
            }
            Self::HRule { y, .. } => extent.include_y(*y),
            Self::VRule { x, .. } => extent.include_x(*x),
            Self::HBand { y0, y1, .. } => {
                extent.include_y(*y0);
                extent.include_y(*y1);
            }
            Self::VBand { x0, x1, .. } => {
                extent.include_x(*x0);
                extent.include_x(*x1);
            }
            Self::Label { .. } | Self::Arrow { .. } | Self::Grid { .. } | Self::Legend { .. } => {}
        }
    }
}

/// Resolved drawing properties of one element.
#[derive(Debug, Clone, Copy)]
struct Paint {
    color: Color,
    line_px: f64,
    font_px: f64,
    visible: bool,
}

/// Positional values of a call with external refs already materialized.
struct CallArgs<'c> {
    call: &'c Call,
    values: Vec<ArgValue>,
}

impl CallArgs<'_> {
    fn invalid(&self, reason: impl Into<String>) -> RecipeError {
        RecipeError::InvalidArguments {
            operation: self.call.op.name().to_owned(),
            reason: reason.into(),
        }
    }

    fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values
            .get(index)
            .filter(|value| !matches!(value, ArgValue::Null))
    }

    /// Positional value, falling back to a kwarg of the same schema name.
    fn slot(&self, index: usize) -> Option<&ArgValue> {
        self.get(index).or_else(|| {
            self.call
                .kwarg(&self.call.op.arg_name(index))
                .filter(|value| !matches!(value, ArgValue::Null))
        })
    }

    fn floats(&self, index: usize) -> RecipeResult<Vec<f64>> {
        self.opt_floats(index)?.ok_or_else(|| {
            self.invalid(format!("missing numeric `{}`", self.call.op.arg_name(index)))
        })
    }

    fn opt_floats(&self, index: usize) -> RecipeResult<Option<Vec<f64>>> {
        match self.slot(index) {
            None => Ok(None),
            Some(value) => value.to_f64_vec().map(Some).ok_or_else(|| {
                self.invalid(format!("`{}` must be numeric", self.call.op.arg_name(index)))
            }),
        }
    }

    fn scalar(&self, index: usize) -> RecipeResult<f64> {
        self.opt_scalar(index)?
            .ok_or_else(|| self.invalid(format!("missing `{}`", self.call.op.arg_name(index))))
    }

    fn opt_scalar(&self, index: usize) -> RecipeResult<Option<f64>> {
        match self.slot(index) {
            None => Ok(None),
            Some(value) => match value.as_f64() {
                Some(number) if number.is_finite() => Ok(Some(number)),
                _ => Err(self.invalid(format!(
                    "`{}` must be a finite number",
                    self.call.op.arg_name(index)
                ))),
            },
        }
    }

    fn text(&self, index: usize) -> RecipeResult<String> {
        match self.slot(index) {
            Some(ArgValue::Str(text)) => Ok(text.clone()),
            Some(ArgValue::Int(value)) => Ok(value.to_string()),
            Some(ArgValue::Float(value)) => Ok(value.to_string()),
            _ => Err(self.invalid(format!("`{}` must be text", self.call.op.arg_name(index)))),
        }
    }

    fn pair(&self, index: usize) -> RecipeResult<Option<(f64, f64)>> {
        match self.opt_floats(index)? {
            None => Ok(None),
            Some(values) if values.len() == 2 && values.iter().all(|v| v.is_finite()) => {
                Ok(Some((values[0], values[1])))
            }
            Some(_) => Err(self.invalid(format!(
                "`{}` must be a finite (x, y) pair",
                self.call.op.arg_name(index)
            ))),
        }
    }

    fn kw_f64(&self, name: &str) -> Option<f64> {
        self.call.kwarg(name).and_then(ArgValue::as_f64)
    }

    fn kw_str(&self, name: &str) -> Option<&str> {
        self.call.kwarg(name).and_then(ArgValue::as_str)
    }

    fn kw_bool(&self, name: &str) -> Option<bool> {
        self.call.kwarg(name).and_then(ArgValue::as_bool)
    }

    /// `x` values, or `0..n` when only `y` was given.
    fn xy(&self) -> RecipeResult<(Vec<f64>, Vec<f64>)> {
        let first = self.floats(0)?;
        let second = match self.get(1) {
            Some(ArgValue::Str(_)) | None => None,
            Some(_) => Some(self.floats(1)?),
        };
        let (x, y) = match second {
            Some(y) => (first, y),
            None => ((0..first.len()).map(|index| index as f64).collect(), first),
        };
        if x.len() != y.len() {
            return Err(self.invalid(format!(
                "x and y lengths differ ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        Ok((x, y))
    }

    fn broadcast(&self, values: Vec<f64>, len: usize, what: &str) -> RecipeResult<Vec<f64>> {
        match values.len() {
            1 => Ok(vec![values[0]; len]),
            n if n == len => Ok(values),
            n => Err(self.invalid(format!("`{what}` has {n} values, expected 1 or {len}"))),
        }
    }

    /// Format string of `plot`-like calls (`"r-"`, `"o"`), positional or kwarg.
    fn fmt(&self) -> &str {
        match self.get(1) {
            Some(ArgValue::Str(fmt)) => fmt,
            _ => match self.get(2) {
                Some(ArgValue::Str(fmt)) => fmt,
                _ => self.kw_str("fmt").unwrap_or(""),
            },
        }
    }
}

struct Draft<'c> {
    call: &'c Call,
    shapes: Vec<Shape>,
}

struct AxisTicks {
    x: Vec<(f64, String)>,
    y: Vec<(f64, String)>,
    tick_len: f64,
    gap: f64,
    label_height: f64,
    y_label_width: f64,
}

struct PanelCtx<'a, M: ?Sized> {
    panel_id: &'a PanelId,
    rect: DeviceRect,
    style: &'a StyleDocument,
    overrides: &'a OverrideSet,
    layout: &'a LayoutSolution,
    viewport: Viewport,
    dpi: f64,
    palette: Vec<Color>,
    measure: &'a M,
    mode: ReplayMode,
    cancel: &'a CancelFlag,
}

impl<M: TextMeasure + ?Sized> PanelCtx<'_, M> {
    fn mm(&self, mm: f64) -> f64 {
        mm_to_px(mm, self.dpi)
    }

    fn pt(&self, pt: f64) -> f64 {
        pt_to_px(pt, self.dpi)
    }

    fn style_f64(&self, path: &str, default: f64) -> f64 {
        self.style.get_f64(path).unwrap_or(default)
    }

    fn style_color(&self, path: &str, default: Color) -> Color {
        self.style
            .get_str(path)
            .and_then(|raw| parse_color(raw, &self.palette).ok())
            .unwrap_or(default)
    }

    fn element_style(&self, id: &ElementId) -> Option<&Map<String, Value>> {
        self.style
            .as_map()
            .get(ELEMENTS_SECTION)?
            .as_object()?
            .get(&element_key(self.panel_id, id))?
            .as_object()
    }

    fn skip_or_fail(
        &self,
        call: &Call,
        error: RecipeError,
        skipped: &mut Vec<SkippedCall>,
    ) -> RecipeResult<()> {
        let recoverable =
            error.is_referential() || matches!(error, RecipeError::InvalidArguments { .. });
        if !recoverable || self.mode == ReplayMode::Strict {
            return Err(error);
        }
        warn!(
            panel_id = %self.panel_id,
            element_id = %call.id,
            operation = call.op.name(),
            error = %error,
            "skipping call during replay"
        );
        skipped.push(SkippedCall {
            panel_id: self.panel_id.clone(),
            element_id: call.id.clone(),
            operation: call.op.name().to_owned(),
            error,
        });
        Ok(())
    }

    /// Overrides win over kwargs, kwargs over style defaults.
    fn paint(
        &self,
        args: &CallArgs<'_>,
        fallback: Color,
        line_mm: f64,
        font_pt: f64,
        default_alpha: Option<f64>,
    ) -> RecipeResult<Paint> {
        let manual = self.element_style(&args.call.id);
        let manual_f64 = |key: &str| manual.and_then(|map| map.get(key)).and_then(Value::as_f64);

        let color = match manual.and_then(|map| map.get("color")).and_then(Value::as_str) {
            Some(raw) => {
                parse_color(raw, &self.palette).map_err(|err| args.invalid(err.to_string()))?
            }
            None => match kwarg_color(args)? {
                Some(raw) => {
                    parse_color(raw, &self.palette).map_err(|err| args.invalid(err.to_string()))?
                }
                None => fallback,
            },
        };
        let alpha = manual_f64("alpha")
            .or_else(|| args.kw_f64("alpha"))
            .or(default_alpha);
        let color = match alpha {
            Some(alpha) if (0.0..=1.0).contains(&alpha) => color.with_alpha(alpha),
            Some(alpha) => return Err(args.invalid(format!("alpha {alpha} outside 0..=1"))),
            None => color,
        };

        let line_px = match manual_f64("linewidth_mm") {
            Some(mm) => self.mm(mm),
            None => match args.kw_f64("linewidth").or_else(|| args.kw_f64("lw")) {
                Some(pt) => self.pt(pt),
                None => self.mm(line_mm),
            },
        };
        let font_px = match manual_f64("fontsize_pt") {
            Some(pt) => self.pt(pt),
            None => self.pt(args.kw_f64("fontsize").unwrap_or(font_pt)),
        };
        if !line_px.is_finite() || line_px < 0.0 || !font_px.is_finite() || font_px <= 0.0 {
            return Err(args.invalid("line width and font size must be finite and positive"));
        }
        let visible = manual
            .and_then(|map| map.get("visible"))
            .and_then(Value::as_bool)
            .or_else(|| args.kw_bool("visible"))
            .unwrap_or(true);
        Ok(Paint {
            color,
            line_px,
            font_px,
            visible,
        })
    }

    fn build(&self, panel: &Panel, recipe: &Recipe) -> RecipeResult<PanelScene> {
        let mut resolver = RecipeResolver::for_recipe(recipe);
        let mut skipped = Vec::new();
        let mut drafts: Vec<Draft<'_>> = Vec::new();
        let mut extent = DataExtent::default();
        let mut xlim = None;
        let mut ylim = None;
        let mut cycle = 0usize;
        let mut legend_candidates: Vec<(Option<String>, Color)> = Vec::new();

        for call in &panel.calls {
            self.cancel.check()?;
            let result = self.resolve(call, &mut resolver).and_then(|args| {
                let uses_cycle = kwarg_color(&args)?.is_none() && fmt_color(args.fmt()).is_none();
                let fallback = match fmt_color(args.fmt()) {
                    Some(color) => color,
                    None => self.palette[cycle % self.palette.len()],
                };
                let outcome = self.data_shapes(&args, fallback);
                if uses_cycle {
                    cycle += 1;
                }
                let label = args.kw_str("label").map(str::to_owned);
                outcome.map(|(shapes, color)| (shapes, color, label))
            });
            match result {
                Ok((shapes, color, label)) => {
                    for shape in &shapes {
                        shape.include_in(&mut extent);
                    }
                    if !shapes.is_empty() {
                        legend_candidates.push((label, color));
                    }
                    drafts.push(Draft { call, shapes });
                }
                Err(error) => self.skip_or_fail(call, error, &mut skipped)?,
            }
        }

        for call in panel.effective_decorations() {
            self.cancel.check()?;
            let result = self.resolve(call, &mut resolver).and_then(|args| match call.op {
                Operation::SetXLim => limits_of(&args).map(|limits| {
                    xlim = Some(limits);
                    Vec::new()
                }),
                Operation::SetYLim => limits_of(&args).map(|limits| {
                    ylim = Some(limits);
                    Vec::new()
                }),
                _ => self.decoration_shapes(&args, &legend_candidates),
            });
            match result {
                Ok(shapes) => {
                    for shape in &shapes {
                        shape.include_in(&mut extent);
                    }
                    drafts.push(Draft { call, shapes });
                }
                Err(error) => self.skip_or_fail(call, error, &mut skipped)?,
            }
        }

        let limits: DataLimits = extent.to_limits(xlim, ylim);
        let transform = DataTransform::new(limits, self.rect)?;
        let ticks = self.axis_ticks(limits);
        let mut items = self.furniture(&transform, &ticks, panel);

        for draft in drafts {
            self.cancel.check()?;
            let delta = self.overrides.position_delta(self.panel_id, &draft.call.id);
            let (dx, dy) = self.layout.mm_delta_to_px(delta.dx, delta.dy, self.viewport);
            for shape in &draft.shapes {
                for primitive in self.realize(shape, &transform, &ticks) {
                    let primitive = if delta.is_zero() {
                        primitive
                    } else {
                        primitive.translated(dx, dy)
                    };
                    trace!(
                        panel_id = %self.panel_id,
                        element_id = %draft.call.id,
                        "emitting primitive"
                    );
                    items.push(SceneItem {
                        panel_id: self.panel_id.clone(),
                        element_id: Some(draft.call.id.clone()),
                        z_order: draft.call.z_order(),
                        seq: draft.call.seq,
                        primitive,
                    });
                }
            }
        }
        items.retain(|item| item.primitive.is_visible());
        Ok(PanelScene { items, skipped })
    }

    fn resolve<'c>(
        &self,
        call: &'c Call,
        resolver: &mut RecipeResolver,
    ) -> RecipeResult<CallArgs<'c>> {
        if !call.op.is_known() {
            return Err(RecipeError::UnsupportedOperation {
                operation: call.op.name().to_owned(),
            });
        }
        let values = resolver.resolve_args(call)?;
        Ok(CallArgs { call, values })
    }

    /// Shapes of a data call plus the color a legend entry should use.
    fn data_shapes(
        &self,
        args: &CallArgs<'_>,
        fallback: Color,
    ) -> RecipeResult<(Vec<Shape>, Color)> {
        let trace_mm = self.style_f64("lines.trace_mm", 0.3);
        let text_pt = self.style_f64("fonts.text_pt", 7.0);
        let paint = self.paint(args, fallback, trace_mm, text_pt, None)?;
        if !paint.visible {
            return Ok((Vec::new(), paint.color));
        }
        let marker_radius = self.mm(self.style_f64("markers.size_mm", 1.0)) / 2.0;
        let shapes = match args.call.op {
            Operation::Plot => {
                let (x, y) = args.xy()?;
                let points: Vec<(f64, f64)> = x.into_iter().zip(y).collect();
                let fmt = args.fmt();
                let marker = args.kw_str("marker").filter(|m| !m.eq_ignore_ascii_case("none"));
                let has_marker = fmt.contains('o') || marker.is_some();
                let line_off = matches!(args.kw_str("linestyle"), Some("none" | "None" | ""));
                let has_line = !line_off && (fmt.contains('-') || !has_marker);
                let mut shapes = Vec::new();
                if has_line {
                    shapes.push(Shape::Path {
                        points: points.clone(),
                        width: paint.line_px,
                        color: paint.color,
                    });
                }
                if has_marker {
                    let radius = match args.kw_f64("markersize") {
                        Some(pt) if pt.is_finite() && pt >= 0.0 => self.pt(pt) / 2.0,
                        Some(pt) => {
                            return Err(args.invalid(format!("markersize {pt} must be >= 0")));
                        }
                        None => marker_radius,
                    };
                    shapes.push(Shape::Dots {
                        points,
                        radius,
                        color: paint.color,
                    });
                }
                shapes
            }
            Operation::Scatter => {
                let (x, y) = args.xy()?;
                let sizes = match args.opt_floats(2)? {
                    Some(sizes) => Some(args.broadcast(sizes, x.len(), "s")?),
                    None => None,
                };
                match sizes {
                    None => vec![Shape::Dots {
                        points: x.into_iter().zip(y).collect(),
                        radius: marker_radius,
                        color: paint.color,
                    }],
                    Some(sizes) => x
                        .into_iter()
                        .zip(y)
                        .zip(sizes)
                        .filter(|(_, size)| size.is_finite() && *size > 0.0)
                        .map(|(point, size)| Shape::Dots {
                            points: vec![point],
                            radius: self.pt(size.sqrt()) / 2.0,
                            color: paint.color,
                        })
                        .collect(),
                }
            }
            Operation::Bar | Operation::Barh => {
                let positions = category_positions(args, 0)?;
                let n = positions.len();
                let lengths = args.broadcast(args.floats(1)?, n, &args.call.op.arg_name(1))?;
                let thickness = match args.opt_floats(2)? {
                    Some(values) => args.broadcast(values, n, &args.call.op.arg_name(2))?,
                    None => vec![DEFAULT_BAR_WIDTH; n],
                };
                let base = match args.opt_floats(3)? {
                    Some(values) => args.broadcast(values, n, &args.call.op.arg_name(3))?,
                    None => vec![0.0; n],
                };
                let horizontal = args.call.op == Operation::Barh;
                let boxes = (0..n)
                    .map(|i| {
                        let half = thickness[i] / 2.0;
                        let (lo, hi) = (positions[i] - half, positions[i] + half);
                        let (start, end) = (base[i], base[i] + lengths[i]);
                        if horizontal {
                            [start, lo, end, hi]
                        } else {
                            [lo, start, hi, end]
                        }
                    })
                    .collect();
                vec![Shape::Boxes {
                    boxes,
                    color: paint.color,
                }]
            }
            Operation::Hist => {
                let values: Vec<f64> =
                    args.floats(0)?.into_iter().filter(|v| v.is_finite()).collect();
                let bins = match args.slot(1).and_then(ArgValue::as_f64) {
                    Some(bins) if bins > MAX_HIST_BINS as f64 => {
                        return Err(args.invalid(format!("bins {bins} exceeds {MAX_HIST_BINS}")));
                    }
                    Some(bins) if bins >= 1.0 && bins.fract() == 0.0 => bins as usize,
                    Some(bins) => {
                        return Err(
                            args.invalid(format!("bins must be a positive integer, got {bins}"))
                        );
                    }
                    None => DEFAULT_HIST_BINS,
                };
                vec![Shape::Boxes {
                    boxes: histogram_boxes(&values, bins),
                    color: paint.color,
                }]
            }
            Operation::FillBetween => {
                let x = args.floats(0)?;
                let y1 = args.broadcast(args.floats(1)?, x.len(), "y1")?;
                let y2 = match args.opt_floats(2)? {
                    Some(values) => args.broadcast(values, x.len(), "y2")?,
                    None => vec![0.0; x.len()],
                };
                let keep: Vec<usize> = (0..x.len())
                    .filter(|&i| x[i].is_finite() && y1[i].is_finite() && y2[i].is_finite())
                    .collect();
                let mut points: Vec<(f64, f64)> = keep.iter().map(|&i| (x[i], y1[i])).collect();
                points.extend(keep.iter().rev().map(|&i| (x[i], y2[i])));
                vec![Shape::Area {
                    points,
                    color: paint.color,
                }]
            }
            Operation::Fill => {
                let (x, y) = args.xy()?;
                vec![Shape::Area {
                    points: x
                        .into_iter()
                        .zip(y)
                        .filter(|(x, y)| x.is_finite() && y.is_finite())
                        .collect(),
                    color: paint.color,
                }]
            }
            Operation::Errorbar => self.errorbar_shapes(args, &paint, marker_radius)?,
            Operation::Step => {
                let (x, y) = args.xy()?;
                let points = step_points(&x, &y, args.kw_str("where").unwrap_or("pre"));
                vec![Shape::Path {
                    points,
                    width: paint.line_px,
                    color: paint.color,
                }]
            }
            Operation::Stem => {
                let (x, y) = args.xy()?;
                let mut shapes: Vec<Shape> = x
                    .iter()
                    .zip(&y)
                    .map(|(&x, &y)| Shape::Path {
                        points: vec![(x, 0.0), (x, y)],
                        width: paint.line_px,
                        color: paint.color,
                    })
                    .collect();
                shapes.push(Shape::Dots {
                    points: x.iter().copied().zip(y.iter().copied()).collect(),
                    radius: marker_radius,
                    color: paint.color,
                });
                let finite = x.iter().copied().filter(|v| v.is_finite());
                let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
                if lo.is_finite() {
                    shapes.push(Shape::Path {
                        points: vec![(lo, 0.0), (hi, 0.0)],
                        width: paint.line_px,
                        color: paint.color,
                    });
                }
                shapes
            }
            Operation::Imshow => vec![self.image_shape(args)?],
            _ => {
                return Err(args.invalid("not a data operation"));
            }
        };
        Ok((shapes, paint.color))
    }

    fn errorbar_shapes(
        &self,
        args: &CallArgs<'_>,
        paint: &Paint,
        marker_radius: f64,
    ) -> RecipeResult<Vec<Shape>> {
        let x = args.floats(0)?;
        let y = args.broadcast(args.floats(1)?, x.len(), "y")?;
        let bar_px = self.mm(self.style_f64("lines.errorbar_mm", 0.2));
        let mut shapes = Vec::new();
        let fmt = args.kw_str("fmt").unwrap_or("-");
        if fmt != "none" {
            let points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
            if fmt.contains('o') {
                shapes.push(Shape::Dots {
                    points: points.clone(),
                    radius: marker_radius,
                    color: paint.color,
                });
            }
            if fmt.contains('-') {
                shapes.push(Shape::Path {
                    points,
                    width: paint.line_px,
                    color: paint.color,
                });
            }
        }
        if let Some(yerr) = args.opt_floats(2)? {
            let yerr = args.broadcast(yerr, x.len(), "yerr")?;
            shapes.extend((0..x.len()).map(|i| Shape::Path {
                points: vec![(x[i], y[i] - yerr[i]), (x[i], y[i] + yerr[i])],
                width: bar_px,
                color: paint.color,
            }));
        }
        if let Some(xerr) = args.opt_floats(3)? {
            let xerr = args.broadcast(xerr, x.len(), "xerr")?;
            shapes.extend((0..x.len()).map(|i| Shape::Path {
                points: vec![(x[i] - xerr[i], y[i]), (x[i] + xerr[i], y[i])],
                width: bar_px,
                color: paint.color,
            }));
        }
        Ok(shapes)
    }

    /// 2-D arrays go through a colormap; `[rows, cols, 3|4]` arrays are RGB(A).
    fn image_shape(&self, args: &CallArgs<'_>) -> RecipeResult<Shape> {
        let Some(ArgValue::Array(array)) = args.slot(0) else {
            return Err(args.invalid("`X` must be an array"));
        };
        let values = array
            .to_f64_vec()
            .ok_or_else(|| args.invalid("`X` must be numeric"))?;
        let (rows, columns, cells) = match *array.shape() {
            [rows, columns] => {
                let finite = values.iter().copied().filter(|v| v.is_finite());
                let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
                let vmin = args.kw_f64("vmin").unwrap_or(lo);
                let vmax = args.kw_f64("vmax").unwrap_or(hi);
                let gray = args.kw_str("cmap") == Some("gray");
                let cells = values
                    .iter()
                    .map(|&value| colormap(value, vmin, vmax, gray))
                    .collect();
                (rows, columns, cells)
            }
            [rows, columns, channels @ (3 | 4)] => {
                let scale = if array.dtype() == DType::Int64 { 255.0 } else { 1.0 };
                let cells = values
                    .chunks_exact(channels)
                    .map(|px| {
                        let channel = |i: usize| (px[i] / scale).clamp(0.0, 1.0);
                        let alpha = if channels == 4 { channel(3) } else { 1.0 };
                        Color::rgba(channel(0), channel(1), channel(2), alpha)
                    })
                    .collect();
                (rows, columns, cells)
            }
            _ => return Err(args.invalid(format!("unsupported image shape {:?}", array.shape()))),
        };
        if rows == 0 || columns == 0 {
            return Err(args.invalid("image must not be empty"));
        }
        Ok(Shape::Raster {
            bounds: [-0.5, rows as f64 - 0.5, columns as f64 - 0.5, -0.5],
            columns,
            rows,
            cells,
        })
    }

    fn decoration_shapes(
        &self,
        args: &CallArgs<'_>,
        legend_candidates: &[(Option<String>, Color)],
    ) -> RecipeResult<Vec<Shape>> {
        let text_color = self.style_color("theme.text_color", Color::BLACK);
        let reference_mm = self.style_f64("lines.reference_mm", 0.2);
        let op = &args.call.op;
        let font_pt = match op {
            Operation::SetTitle => self.style_f64("fonts.title_pt", 8.0),
            Operation::SetXLabel | Operation::SetYLabel => self.style_f64("fonts.label_pt", 7.0),
            Operation::Legend => self.style_f64("fonts.legend_pt", 6.0),
            _ => self.style_f64("fonts.text_pt", 7.0),
        };
        let (fallback, default_alpha) = match op {
            Operation::AxHSpan | Operation::AxVSpan => (
                self.palette[0],
                Some(self.style_f64("theme.span_alpha", 0.25)),
            ),
            Operation::AxHLine | Operation::AxVLine => (self.palette[0], None),
            Operation::Grid => (
                self.style_color("axes.grid_color", Color::rgb(0.8, 0.8, 0.8)),
                None,
            ),
            _ => (text_color, None),
        };
        let line_mm = match op {
            Operation::Grid => self.style_f64("lines.grid_mm", 0.1),
            _ => reference_mm,
        };
        let paint = self.paint(args, fallback, line_mm, font_pt, default_alpha)?;
        if !paint.visible {
            return Ok(Vec::new());
        }
        let fraction = |name: &str, default: f64| args.kw_f64(name).unwrap_or(default);
        let label = |anchor: Anchor, text: String, h_align, v_align| Shape::Label {
            anchor,
            text,
            size_px: paint.font_px,
            color: paint.color,
            h_align,
            v_align,
        };
        let shapes = match op {
            Operation::SetTitle => vec![label(
                Anchor::Title,
                args.text(0)?,
                TextHAlign::Center,
                TextVAlign::Bottom,
            )],
            Operation::SetXLabel => vec![label(
                Anchor::XLabel,
                args.text(0)?,
                TextHAlign::Center,
                TextVAlign::Top,
            )],
            Operation::SetYLabel => vec![label(
                Anchor::YLabel,
                args.text(0)?,
                TextHAlign::Right,
                TextVAlign::Center,
            )],
            Operation::Grid => {
                let visible = args.slot(0).and_then(ArgValue::as_bool).unwrap_or(true);
                if !visible {
                    return Ok(Vec::new());
                }
                let axis = match args.kw_str("axis") {
                    Some("x") => GridAxis::X,
                    Some("y") => GridAxis::Y,
                    _ => GridAxis::Both,
                };
                vec![Shape::Grid {
                    axis,
                    width: paint.line_px,
                    color: paint.color,
                }]
            }
            Operation::AxHLine => vec![Shape::HRule {
                y: args.opt_scalar(0)?.unwrap_or(0.0),
                span: (fraction("xmin", 0.0), fraction("xmax", 1.0)),
                width: paint.line_px,
                color: paint.color,
            }],
            Operation::AxVLine => vec![Shape::VRule {
                x: args.opt_scalar(0)?.unwrap_or(0.0),
                span: (fraction("ymin", 0.0), fraction("ymax", 1.0)),
                width: paint.line_px,
                color: paint.color,
            }],
            Operation::AxHSpan => vec![Shape::HBand {
                y0: args.scalar(0)?,
                y1: args.scalar(1)?,
                color: paint.color,
            }],
            Operation::AxVSpan => vec![Shape::VBand {
                x0: args.scalar(0)?,
                x1: args.scalar(1)?,
                color: paint.color,
            }],
            Operation::Text => {
                let (x, y) = (args.scalar(0)?, args.scalar(1)?);
                let anchor = if args.kw_str("transform") == Some("axes") {
                    Anchor::Axes(x, y)
                } else {
                    Anchor::Data(x, y)
                };
                vec![label(
                    anchor,
                    args.text(2)?,
                    h_align_of(args.kw_str("ha")),
                    v_align_of(args.kw_str("va")),
                )]
            }
            Operation::Annotate => {
                let text = args.text(0)?;
                let xy = args
                    .pair(1)?
                    .ok_or_else(|| args.invalid("missing `xy`"))?;
                let mut shapes = Vec::new();
                let anchor = match args.pair(2)? {
                    Some(xytext) => {
                        shapes.push(Shape::Arrow {
                            from: xytext,
                            to: xy,
                            width: paint.line_px,
                            color: paint.color,
                        });
                        xytext
                    }
                    None => xy,
                };
                shapes.push(label(
                    Anchor::Data(anchor.0, anchor.1),
                    text,
                    h_align_of(args.kw_str("ha")),
                    v_align_of(args.kw_str("va")),
                ));
                shapes
            }
            Operation::Legend => {
                if self.style.get_bool("legend.visible") == Some(false) {
                    return Ok(Vec::new());
                }
                let explicit: Option<Vec<String>> = match args.slot(0) {
                    Some(ArgValue::List(items)) => Some(
                        items
                            .iter()
                            .map(|item| item.as_str().map(str::to_owned))
                            .collect::<Option<Vec<_>>>()
                            .ok_or_else(|| args.invalid("`labels` must be strings"))?,
                    ),
                    Some(ArgValue::Array(array)) => match array.data() {
                        ArrayData::Str(items) => Some(items.clone()),
                        _ => return Err(args.invalid("`labels` must be strings")),
                    },
                    Some(_) => return Err(args.invalid("`labels` must be a list of strings")),
                    None => None,
                };
                let entries: Vec<(String, Color)> = match explicit {
                    Some(labels) => labels
                        .into_iter()
                        .zip(legend_candidates.iter().map(|(_, color)| *color))
                        .collect(),
                    None => legend_candidates
                        .iter()
                        .filter_map(|(label, color)| {
                            label
                                .as_ref()
                                .filter(|label| !label.starts_with('_'))
                                .map(|label| (label.clone(), *color))
                        })
                        .collect(),
                };
                if entries.is_empty() {
                    return Ok(Vec::new());
                }
                let location = args
                    .kw_str("loc")
                    .or_else(|| self.style.get_str("legend.location"))
                    .map_or(LegendLocation::UpperRight, LegendLocation::from_name);
                vec![Shape::Legend {
                    entries,
                    size_px: paint.font_px,
                    location,
                    frame: args
                        .kw_bool("frameon")
                        .or_else(|| self.style.get_bool("legend.frame"))
                        .unwrap_or(true),
                }]
            }
            _ => return Err(args.invalid("not a decoration operation")),
        };
        Ok(shapes)
    }

    fn axis_ticks(&self, limits: DataLimits) -> AxisTicks {
        let count = self.style_f64("ticks.count", 5.0).max(1.0) as usize;
        let tick_px = self.pt(self.style_f64("fonts.tick_pt", 6.0));
        let labelled = |range: (f64, f64)| {
            let values = nice_ticks(range, count);
            let step = values
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).abs())
                .fold(f64::INFINITY, f64::min);
            values
                .iter()
                .map(|&value| (value, format_tick(value, step)))
                .collect::<Vec<_>>()
        };
        let x = labelled(limits.x);
        let y = labelled(limits.y);
        let label_height = self.measure.measure_text("0", tick_px).1;
        let y_label_width = y
            .iter()
            .map(|(_, label)| self.measure.measure_text(label, tick_px).0)
            .fold(0.0, f64::max);
        AxisTicks {
            x,
            y,
            tick_len: self.mm(self.style_f64("ticks.length_mm", 0.8)),
            gap: self.mm(LABEL_GAP_MM),
            label_height,
            y_label_width,
        }
    }

    /// Axes face, optional style grid, spines, ticks and tick labels.
    fn furniture(
        &self,
        transform: &DataTransform,
        ticks: &AxisTicks,
        panel: &Panel,
    ) -> Vec<SceneItem> {
        let rect = self.rect;
        let item = |z_order: i32, seq: u64, primitive: Primitive| SceneItem {
            panel_id: self.panel_id.clone(),
            element_id: None,
            z_order,
            seq,
            primitive,
        };
        let face = self.style_color("axes.facecolor", Color::WHITE);
        let edge = self.style_color("axes.edgecolor", Color::BLACK);
        let tick_color = self.style_color("ticks.color", Color::BLACK);
        let axis_px = self.mm(self.style_f64("lines.axis_mm", 0.2));
        let tick_px = self.pt(self.style_f64("fonts.tick_pt", 6.0));

        let mut items = vec![item(
            FACE_Z_ORDER,
            0,
            Primitive::Rect {
                rect,
                fill: Some(face),
                stroke: None,
            },
        )];

        let has_grid_call = panel.decorations.iter().any(|call| call.op == Operation::Grid);
        if self.style.get_bool("axes.grid") == Some(true) && !has_grid_call {
            let grid = Shape::Grid {
                axis: GridAxis::Both,
                width: self.mm(self.style_f64("lines.grid_mm", 0.1)),
                color: self.style_color("axes.grid_color", Color::rgb(0.8, 0.8, 0.8)),
            };
            items.extend(
                self.realize(&grid, transform, ticks)
                    .into_iter()
                    .map(|primitive| item(Operation::Grid.default_z_order(), 0, primitive)),
            );
        }

        let frame_seq = u64::MAX;
        let mut frame = vec![Primitive::Rect {
            rect,
            fill: None,
            stroke: Some((edge, axis_px)),
        }];
        for (value, label) in &ticks.x {
            let Ok(x) = transform.x_to_device(*value) else {
                continue;
            };
            frame.push(Primitive::Polyline {
                points: vec![
                    DevicePoint::new(x, rect.bottom()),
                    DevicePoint::new(x, rect.bottom() + ticks.tick_len),
                ],
                width: axis_px,
                color: tick_color,
            });
            frame.push(Primitive::Text(TextPrimitive::new(
                label.clone(),
                x,
                rect.bottom() + ticks.tick_len + ticks.gap,
                tick_px,
                tick_color,
                TextHAlign::Center,
                TextVAlign::Top,
            )));
        }
        for (value, label) in &ticks.y {
            let Ok(y) = transform.y_to_device(*value) else {
                continue;
            };
            frame.push(Primitive::Polyline {
                points: vec![
                    DevicePoint::new(rect.x - ticks.tick_len, y),
                    DevicePoint::new(rect.x, y),
                ],
                width: axis_px,
                color: tick_color,
            });
            frame.push(Primitive::Text(TextPrimitive::new(
                label.clone(),
                rect.x - ticks.tick_len - ticks.gap,
                y,
                tick_px,
                tick_color,
                TextHAlign::Right,
                TextVAlign::Center,
            )));
        }
        items.extend(
            frame
                .into_iter()
                .map(|primitive| item(FRAME_Z_ORDER, frame_seq, primitive)),
        );
        items
    }

    fn device(&self, transform: &DataTransform, points: &[(f64, f64)]) -> Vec<DevicePoint> {
        points
            .iter()
            .filter_map(|&(x, y)| transform.data_to_device(x, y).ok())
            .collect()
    }

    fn realize(
        &self,
        shape: &Shape,
        transform: &DataTransform,
        ticks: &AxisTicks,
    ) -> Vec<Primitive> {
        let rect = self.rect;
        match shape {
            Shape::Path { points, width, color } => points
                .split(|(x, y)| !x.is_finite() || !y.is_finite())
                .filter(|run| !run.is_empty())
                .map(|run| Primitive::Polyline {
                    points: self.device(transform, run),
                    width: *width,
                    color: *color,
                })
                .collect(),
            Shape::Dots { points, radius, color } => {
                let centers = self.device(transform, points);
                if centers.is_empty() {
                    return Vec::new();
                }
                vec![Primitive::Markers {
                    centers,
                    radius: *radius,
                    color: *color,
                }]
            }
            Shape::Boxes { boxes, color } => boxes
                .iter()
                .filter_map(|corners| {
                    let a = transform.data_to_device(corners[0], corners[1]).ok()?;
                    let b = transform.data_to_device(corners[2], corners[3]).ok()?;
                    Some(Primitive::Rect {
                        rect: DeviceRect::from_corners(a, b),
                        fill: Some(*color),
                        stroke: None,
                    })
                })
                .collect(),
            Shape::Area { points, color } => {
                let points = self.device(transform, points);
                if points.len() < 3 {
                    return Vec::new();
                }
                vec![Primitive::Polygon { points, fill: *color }]
            }
            Shape::Raster {
                bounds,
                columns,
                rows,
                cells,
            } => {
                let corners = (
                    transform.data_to_device(bounds[0], bounds[1]),
                    transform.data_to_device(bounds[2], bounds[3]),
                );
                let (Ok(a), Ok(b)) = corners else {
                    return Vec::new();
                };
                vec![Primitive::Image {
                    rect: DeviceRect::from_corners(a, b),
                    columns: *columns,
                    rows: *rows,
                    cells: cells.clone(),
                }]
            }
            Shape::HRule { y, span, width, color } => {
                let Ok(y) = transform.y_to_device(*y) else {
                    return Vec::new();
                };
                vec![Primitive::Polyline {
                    points: vec![
                        DevicePoint::new(rect.x + span.0 * rect.width, y),
                        DevicePoint::new(rect.x + span.1 * rect.width, y),
                    ],
                    width: *width,
                    color: *color,
                }]
            }
            Shape::VRule { x, span, width, color } => {
                let Ok(x) = transform.x_to_device(*x) else {
                    return Vec::new();
                };
                vec![Primitive::Polyline {
                    points: vec![
                        DevicePoint::new(x, rect.bottom() - span.0 * rect.height),
                        DevicePoint::new(x, rect.bottom() - span.1 * rect.height),
                    ],
                    width: *width,
                    color: *color,
                }]
            }
            Shape::HBand { y0, y1, color } => {
                let (Ok(a), Ok(b)) = (transform.y_to_device(*y0), transform.y_to_device(*y1)) else {
                    return Vec::new();
                };
                vec![Primitive::Rect {
                    rect: DeviceRect::new(rect.x, a.min(b), rect.width, (a - b).abs()),
                    fill: Some(*color),
                    stroke: None,
                }]
            }
            Shape::VBand { x0, x1, color } => {
                let (Ok(a), Ok(b)) = (transform.x_to_device(*x0), transform.x_to_device(*x1)) else {
                    return Vec::new();
                };
                vec![Primitive::Rect {
                    rect: DeviceRect::new(a.min(b), rect.y, (a - b).abs(), rect.height),
                    fill: Some(*color),
                    stroke: None,
                }]
            }
            Shape::Label {
                anchor,
                text,
                size_px,
                color,
                h_align,
                v_align,
            } => {
                let center = rect.center();
                let position = match *anchor {
                    Anchor::Data(x, y) => match transform.data_to_device(x, y) {
                        Ok(point) => point,
                        Err(_) => return Vec::new(),
                    },
                    Anchor::Axes(fx, fy) => {
                        DevicePoint::new(rect.x + fx * rect.width, rect.bottom() - fy * rect.height)
                    }
                    Anchor::Title => DevicePoint::new(center.x, rect.y - self.mm(TITLE_GAP_MM)),
                    Anchor::XLabel => DevicePoint::new(
                        center.x,
                        rect.bottom() + ticks.tick_len + ticks.gap + ticks.label_height + ticks.gap,
                    ),
                    Anchor::YLabel => DevicePoint::new(
                        rect.x - ticks.tick_len - ticks.gap - ticks.y_label_width - ticks.gap,
                        center.y,
                    ),
                };
                vec![Primitive::Text(TextPrimitive::new(
                    text.clone(),
                    position.x,
                    position.y,
                    *size_px,
                    *color,
                    *h_align,
                    *v_align,
                ))]
            }
            Shape::Arrow { from, to, width, color } => {
                let (Ok(a), Ok(b)) = (
                    transform.data_to_device(from.0, from.1),
                    transform.data_to_device(to.0, to.1),
                ) else {
                    return Vec::new();
                };
                let mut out = vec![Primitive::Polyline {
                    points: vec![a, b],
                    width: *width,
                    color: *color,
                }];
                let length = a.distance_to(b);
                if length > f64::EPSILON {
                    let head = self.mm(ARROW_HEAD_MM).min(length);
                    let (ux, uy) = ((b.x - a.x) / length, (b.y - a.y) / length);
                    let base = DevicePoint::new(b.x - ux * head, b.y - uy * head);
                    let half = head / 2.0;
                    out.push(Primitive::Polygon {
                        points: vec![
                            b,
                            DevicePoint::new(base.x - uy * half, base.y + ux * half),
                            DevicePoint::new(base.x + uy * half, base.y - ux * half),
                        ],
                        fill: *color,
                    });
                }
                out
            }
            Shape::Grid { axis, width, color } => {
                let mut out = Vec::new();
                if matches!(axis, GridAxis::X | GridAxis::Both) {
                    out.extend(ticks.x.iter().filter_map(|(value, _)| {
                        let x = transform.x_to_device(*value).ok()?;
                        Some(Primitive::Polyline {
                            points: vec![
                                DevicePoint::new(x, rect.y),
                                DevicePoint::new(x, rect.bottom()),
                            ],
                            width: *width,
                            color: *color,
                        })
                    }));
                }
                if matches!(axis, GridAxis::Y | GridAxis::Both) {
                    out.extend(ticks.y.iter().filter_map(|(value, _)| {
                        let y = transform.y_to_device(*value).ok()?;
                        Some(Primitive::Polyline {
                            points: vec![
                                DevicePoint::new(rect.x, y),
                                DevicePoint::new(rect.right(), y),
                            ],
                            width: *width,
                            color: *color,
                        })
                    }));
                }
                out
            }
            Shape::Legend {
                entries,
                size_px,
                location,
                frame,
            } => self.legend_primitives(entries, *size_px, *location, *frame),
        }
    }

    fn legend_primitives(
        &self,
        entries: &[(String, Color)],
        size_px: f64,
        location: LegendLocation,
        frame: bool,
    ) -> Vec<Primitive> {
        let rect = self.rect;
        let pad = self.mm(LEGEND_PAD_MM);
        let swatch = self.mm(LEGEND_SWATCH_MM);
        let line_height = entries
            .iter()
            .map(|(label, _)| self.measure.measure_text(label, size_px).1)
            .fold(0.0, f64::max)
            + pad / 2.0;
        let text_width = entries
            .iter()
            .map(|(label, _)| self.measure.measure_text(label, size_px).0)
            .fold(0.0, f64::max);
        let width = pad * 3.0 + swatch + text_width;
        let height = pad * 2.0 + line_height * entries.len() as f64;
        let x = match location {
            LegendLocation::UpperLeft | LegendLocation::LowerLeft => rect.x + pad,
            LegendLocation::UpperRight | LegendLocation::LowerRight => rect.right() - pad - width,
        };
        let y = match location {
            LegendLocation::UpperLeft | LegendLocation::UpperRight => rect.y + pad,
            LegendLocation::LowerLeft | LegendLocation::LowerRight => rect.bottom() - pad - height,
        };
        let mut out = Vec::with_capacity(entries.len() * 2 + 1);
        if frame {
            out.push(Primitive::Rect {
                rect: DeviceRect::new(x, y, width, height),
                fill: Some(self.style_color("axes.facecolor", Color::WHITE)),
                stroke: Some((
                    self.style_color("axes.edgecolor", Color::BLACK),
                    self.mm(self.style_f64("lines.axis_mm", 0.2)),
                )),
            });
        }
        let text_color = self.style_color("theme.text_color", Color::BLACK);
        let line_px = self.mm(self.style_f64("lines.trace_mm", 0.3)).max(1.0);
        for (index, (label, color)) in entries.iter().enumerate() {
            let row_center = y + pad + line_height * (index as f64 + 0.5);
            out.push(Primitive::Polyline {
                points: vec![
                    DevicePoint::new(x + pad, row_center),
                    DevicePoint::new(x + pad + swatch, row_center),
                ],
                width: line_px,
                color: *color,
            });
            out.push(Primitive::Text(TextPrimitive::new(
                label.clone(),
                x + pad * 2.0 + swatch,
                row_center,
                size_px,
                text_color,
                TextHAlign::Left,
                TextVAlign::Center,
            )));
        }
        out
    }
}

fn kwarg_color<'c>(args: &'c CallArgs<'_>) -> RecipeResult<Option<&'c str>> {
    match args.call.kwarg("color").or_else(|| args.call.kwarg("c")) {
        None | Some(ArgValue::Null) => Ok(None),
        Some(ArgValue::Str(raw)) => Ok(Some(raw)),
        Some(_) => Err(args.invalid("only single colors are supported for `color`")),
    }
}

/// Color letter of a `plot` format string such as `"r--"`.
fn fmt_color(fmt: &str) -> Option<Color> {
    let letter = fmt.chars().find(|ch| "bgrcmykw".contains(*ch))?;
    parse_color(&letter.to_string(), &[Color::BLACK]).ok()
}

fn limits_of(args: &CallArgs<'_>) -> RecipeResult<(f64, f64)> {
    let (lo, hi) = match args.opt_floats(0)? {
        Some(values) if values.len() == 2 => (values[0], values[1]),
        _ => (args.scalar(0)?, args.scalar(1)?),
    };
    if !lo.is_finite() || !hi.is_finite() || lo == hi {
        return Err(args.invalid(format!("limits ({lo}, {hi}) must be finite and distinct")));
    }
    Ok((lo, hi))
}

/// Bar positions: numeric values as-is, string categories at 0..n.
fn category_positions(args: &CallArgs<'_>, index: usize) -> RecipeResult<Vec<f64>> {
    match args.slot(index) {
        Some(ArgValue::Array(array)) if array.dtype() == DType::Str => {
            Ok((0..array.len()).map(|i| i as f64).collect())
        }
        Some(ArgValue::List(items)) if items.iter().all(|item| item.as_str().is_some()) => {
            Ok((0..items.len()).map(|i| i as f64).collect())
        }
        _ => args.floats(index),
    }
}

fn histogram_boxes(values: &[f64], bins: usize) -> Vec<[f64; 4]> {
    if values.is_empty() {
        return Vec::new();
    }
    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &value in values {
        let index = (((value - lo) / width).floor() as usize).min(bins - 1);
        counts[index] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let left = lo + width * i as f64;
            [left, 0.0, left + width, count as f64]
        })
        .collect()
}

fn step_points(x: &[f64], y: &[f64], mode: &str) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(x.len() * 2);
    for i in 0..x.len() {
        if i == 0 {
            points.push((x[0], y[0]));
            continue;
        }
        match mode {
            "post" => {
                points.push((x[i], y[i - 1]));
                points.push((x[i], y[i]));
            }
            "mid" => {
                let mid = (x[i - 1] + x[i]) / 2.0;
                points.push((mid, y[i - 1]));
                points.push((mid, y[i]));
                points.push((x[i], y[i]));
            }
            _ => {
                points.push((x[i - 1], y[i]));
                points.push((x[i], y[i]));
            }
        }
    }
    points
}

fn colormap(value: f64, vmin: f64, vmax: f64, gray: bool) -> Color {
    if !value.is_finite() {
        return Color::rgba(0.0, 0.0, 0.0, 0.0);
    }
    let t = if vmax > vmin {
        ((value - vmin) / (vmax - vmin)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    if gray {
        return Color::rgb(t, t, t);
    }
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let index = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let local = scaled - index as f64;
    let lerp = |channel: usize| {
        let a = f64::from(VIRIDIS[index][channel]);
        let b = f64::from(VIRIDIS[index + 1][channel]);
        (a + (b - a) * local) / 255.0
    };
    Color::rgb(lerp(0), lerp(1), lerp(2))
}

fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step.is_finite() && step > 0.0 {
        (-step.log10().floor()).max(0.0) as usize
    } else {
        0
    };
    let text = format!("{value:.decimals$}");
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|ch| ch == '0' || ch == '.') => rest.to_owned(),
        _ => text,
    }
}

fn h_align_of(raw: Option<&str>) -> TextHAlign {
    match raw {
        Some("center") => TextHAlign::Center,
        Some("right") => TextHAlign::Right,
        _ => TextHAlign::Left,
    }
}

fn v_align_of(raw: Option<&str>) -> TextVAlign {
    match raw {
        Some("top") => TextVAlign::Top,
        Some("center") => TextVAlign::Center,
        _ => TextVAlign::Bottom,
    }
}
