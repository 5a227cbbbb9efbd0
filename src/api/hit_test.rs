//! Pixel to element lookup through an identity render.
//!
//! Every element of the scene is redrawn flat in a color unique to it; the
//! resulting image is sampled at the clicked pixel and the color decoded back
//! to the element. Panel furniture and the figure background use reserved
//! colors that never decode to an element.

use std::collections::HashMap;
use std::fmt;

use image::RgbaImage;
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use tracing::debug;

use crate::api::crop::CropBox;
use crate::core::{DevicePoint, DeviceRect, ElementId, PanelId};
use crate::error::{RecipeError, RecipeResult};
use crate::render::{
    Color, Primitive, RenderFrame, Renderer, SceneItem, TextMeasure, segment_distance_sq,
};

/// Hand-picked, maximally separated colors for the first ids.
pub const DISTINCT_COLORS: [[u8; 3]; 12] = [
    [255, 0, 0],
    [0, 200, 0],
    [0, 100, 255],
    [255, 200, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 0],
    [128, 0, 255],
    [0, 255, 128],
    [255, 0, 128],
    [128, 255, 0],
    [0, 128, 255],
];

/// Figure background in the identity render.
pub const BACKGROUND_COLOR: [u8; 3] = [26, 26, 26];
/// Axes face, spines, ticks and tick labels in the identity render.
pub const AXES_COLOR: [u8; 3] = [64, 64, 64];

const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;

/// Identity color of the `index`-th element (0-based).
///
/// Pure and deterministic: the first twelve come from [`DISTINCT_COLORS`],
/// later ones from a golden-ratio hue sweep with varying saturation and
/// value.
#[must_use]
pub fn id_index_to_color(index: usize) -> [u8; 3] {
    if let Some(color) = DISTINCT_COLORS.get(index) {
        return *color;
    }
    let id = index + 1;
    let hue = ((id - DISTINCT_COLORS.len()) as f64 * GOLDEN_RATIO_CONJUGATE) % 1.0;
    let saturation = 0.7 + (id % 3) as f64 * 0.1;
    let value = 0.75 + (id % 4) as f64 * 0.0625;
    hsv_to_rgb8(hue, saturation, value)
}

fn hsv_to_rgb8(h: f64, s: f64, v: f64) -> [u8; 3] {
    let to_u8 = |channel: f64| (channel * 255.0) as u8;
    if s == 0.0 {
        return [to_u8(v); 3];
    }
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [to_u8(r), to_u8(g), to_u8(b)]
}

/// An element addressed by panel, since element ids are unique per panel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HitTarget {
    pub panel_id: PanelId,
    pub element_id: ElementId,
}

impl HitTarget {
    #[must_use]
    pub fn new(panel_id: PanelId, element_id: ElementId) -> Self {
        Self {
            panel_id,
            element_id,
        }
    }
}

impl fmt::Display for HitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.panel_id, self.element_id)
    }
}

/// Assigns identity colors, skipping reserved and already used colors so
/// every target decodes unambiguously.
#[derive(Debug, Clone, Default)]
pub struct IdentityPalette {
    next_index: usize,
    by_target: IndexMap<HitTarget, [u8; 3]>,
    by_color: HashMap<[u8; 3], HitTarget>,
}

impl IdentityPalette {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Color of `target`, assigning the next free one on first use.
    pub fn assign(&mut self, target: &HitTarget) -> [u8; 3] {
        if let Some(color) = self.by_target.get(target) {
            return *color;
        }
        let color = loop {
            let candidate = id_index_to_color(self.next_index);
            self.next_index += 1;
            if candidate != BACKGROUND_COLOR
                && candidate != AXES_COLOR
                && !self.by_color.contains_key(&candidate)
            {
                break candidate;
            }
        };
        self.by_target.insert(target.clone(), color);
        self.by_color.insert(color, target.clone());
        color
    }

    #[must_use]
    pub fn decode(&self, color: [u8; 3]) -> Option<&HitTarget> {
        self.by_color.get(&color)
    }

    #[must_use]
    pub fn color_of(&self, target: &HitTarget) -> Option<[u8; 3]> {
        self.by_target.get(target).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = (&HitTarget, [u8; 3])> {
        self.by_target.iter().map(|(target, color)| (target, *color))
    }
}

/// Clickable geometry of one element in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum HitGeometry {
    /// Points and text: anchor plus measured extent.
    Rect(DeviceRect),
    /// Line-like elements: transformed vertex paths.
    Polyline(Vec<Vec<DevicePoint>>),
    /// Collections and patches: union of polygons.
    Polygons(Vec<Vec<DevicePoint>>),
}

impl HitGeometry {
    #[must_use]
    pub fn bounds(&self) -> Option<DeviceRect> {
        let points: Vec<DevicePoint> = match self {
            Self::Rect(rect) => return Some(*rect),
            Self::Polyline(paths) | Self::Polygons(paths) => {
                paths.iter().flatten().copied().collect()
            }
        };
        let first = points.first()?;
        Some(points.iter().fold(DeviceRect::new(first.x, first.y, 0.0, 0.0), |rect, point| {
            rect.union(DeviceRect::new(point.x, point.y, 0.0, 0.0))
        }))
    }

    /// Distance from `point` to the geometry; zero inside rects and polygons.
    #[must_use]
    pub fn distance_to(&self, point: DevicePoint) -> f64 {
        match self {
            Self::Rect(rect) => rect.distance_to(point),
            Self::Polyline(paths) => paths
                .iter()
                .map(|path| path_distance(path, point, false))
                .fold(f64::INFINITY, f64::min),
            Self::Polygons(polygons) => polygons
                .iter()
                .map(|polygon| {
                    if polygon_contains(polygon, point) {
                        0.0
                    } else {
                        path_distance(polygon, point, true)
                    }
                })
                .fold(f64::INFINITY, f64::min),
        }
    }
}

fn path_distance(path: &[DevicePoint], point: DevicePoint, closed: bool) -> f64 {
    match path {
        [] => f64::INFINITY,
        [single] => single.distance_to(point),
        _ => {
            let open = path
                .windows(2)
                .map(|pair| segment_distance_sq(point, pair[0], pair[1]))
                .fold(f64::INFINITY, f64::min);
            let closing = match (closed, path.first(), path.last()) {
                (true, Some(first), Some(last)) => segment_distance_sq(point, *last, *first),
                _ => f64::INFINITY,
            };
            open.min(closing).sqrt()
        }
    }
}

fn polygon_contains(polygon: &[DevicePoint], point: DevicePoint) -> bool {
    let mut inside = false;
    for (index, a) in polygon.iter().enumerate() {
        let b = polygon[(index + 1) % polygon.len()];
        if (a.y > point.y) != (b.y > point.y) {
            let x = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if point.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

fn rect_polygon(rect: DeviceRect) -> Vec<DevicePoint> {
    vec![
        DevicePoint::new(rect.x, rect.y),
        DevicePoint::new(rect.right(), rect.y),
        DevicePoint::new(rect.right(), rect.bottom()),
        DevicePoint::new(rect.x, rect.bottom()),
    ]
}

/// Geometry of an element from the primitives it produced.
fn geometry_of<M: TextMeasure + ?Sized>(items: &[&SceneItem], measure: &M) -> Option<HitGeometry> {
    let is_patch = |primitive: &Primitive| {
        matches!(
            primitive,
            Primitive::Polygon { .. } | Primitive::Rect { .. } | Primitive::Image { .. }
        )
    };
    if items.iter().any(|item| is_patch(&item.primitive)) {
        let polygons = items
            .iter()
            .filter_map(|item| match &item.primitive {
                Primitive::Polygon { points, .. } => Some(points.clone()),
                Primitive::Rect { rect, .. } | Primitive::Image { rect, .. } => {
                    Some(rect_polygon(*rect))
                }
                _ => None,
            })
            .collect();
        return Some(HitGeometry::Polygons(polygons));
    }
    if items
        .iter()
        .any(|item| matches!(item.primitive, Primitive::Polyline { .. }))
    {
        let paths = items
            .iter()
            .filter_map(|item| match &item.primitive {
                Primitive::Polyline { points, .. } => Some(points.clone()),
                _ => None,
            })
            .collect();
        return Some(HitGeometry::Polyline(paths));
    }
    items
        .iter()
        .filter_map(|item| match &item.primitive {
            Primitive::Markers { centers, radius, .. } => centers
                .iter()
                .map(|center| {
                    let diameter = radius * 2.0;
                    DeviceRect::new(center.x - radius, center.y - radius, diameter, diameter)
                })
                .reduce(DeviceRect::union),
            Primitive::Text(text) => {
                Some(text.bounds(measure.measure_text(&text.text, text.font_size_px)))
            }
            _ => None,
        })
        .reduce(DeviceRect::union)
        .map(HitGeometry::Rect)
}

/// Builds [`HitMap`]s from scenes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HitTester;

impl HitTester {
    /// Renders the identity image of `frame` and indexes element geometry.
    ///
    /// `crop` must be the window applied to the visible render so both images
    /// share coordinates.
    pub fn build<R: Renderer + ?Sized>(
        frame: &RenderFrame,
        renderer: &mut R,
        crop: Option<CropBox>,
    ) -> RecipeResult<HitMap> {
        let mut palette = IdentityPalette::new();
        for item in frame.paint_order() {
            if let Some(element_id) = &item.element_id {
                palette.assign(&HitTarget::new(item.panel_id.clone(), element_id.clone()));
            }
        }
        let identity_frame = frame.recolored(Color::from_rgb8(BACKGROUND_COLOR), |item| {
            let rgb = item
                .element_id
                .as_ref()
                .and_then(|element_id| {
                    palette.color_of(&HitTarget::new(item.panel_id.clone(), element_id.clone()))
                })
                .unwrap_or(AXES_COLOR);
            Color::from_rgb8(rgb)
        });
        let full = renderer.render(&identity_frame)?;
        let (image, offset) = match crop {
            Some(crop) if !crop.is_full(full.width(), full.height()) => {
                (crop.apply(&full), (f64::from(crop.x), f64::from(crop.y)))
            }
            _ => (full, (0.0, 0.0)),
        };

        let mut grouped: IndexMap<HitTarget, Vec<&SceneItem>> = IndexMap::new();
        for item in &frame.items {
            if let Some(element_id) = &item.element_id {
                grouped
                    .entry(HitTarget::new(item.panel_id.clone(), element_id.clone()))
                    .or_default()
                    .push(item);
            }
        }
        let mut regions = IndexMap::with_capacity(grouped.len());
        for (target, items) in grouped {
            let Some(geometry) = geometry_of(&items, &*renderer) else {
                continue;
            };
            let geometry = translate_geometry(geometry, -offset.0, -offset.1);
            let z_order = items.iter().map(|item| item.z_order).max().unwrap_or_default();
            regions.insert(target, HitRegion { geometry, z_order });
        }
        debug!(
            elements = palette.len(),
            width = image.width(),
            height = image.height(),
            "built identity render"
        );
        Ok(HitMap {
            image,
            palette,
            regions,
        })
    }
}

fn translate_geometry(geometry: HitGeometry, dx: f64, dy: f64) -> HitGeometry {
    let shift = |paths: Vec<Vec<DevicePoint>>| {
        paths
            .into_iter()
            .map(|path| {
                path.into_iter()
                    .map(|point| DevicePoint::new(point.x + dx, point.y + dy))
                    .collect()
            })
            .collect()
    };
    match geometry {
        HitGeometry::Rect(rect) => HitGeometry::Rect(rect.translated(dx, dy)),
        HitGeometry::Polyline(paths) => HitGeometry::Polyline(shift(paths)),
        HitGeometry::Polygons(paths) => HitGeometry::Polygons(shift(paths)),
    }
}

/// Geometry and draw priority of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct HitRegion {
    pub geometry: HitGeometry,
    pub z_order: i32,
}

/// Identity render plus per-element geometry; rebuilt after every replay.
#[derive(Debug, Clone)]
pub struct HitMap {
    image: RgbaImage,
    palette: IdentityPalette,
    regions: IndexMap<HitTarget, HitRegion>,
}

impl HitMap {
    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn palette(&self) -> &IdentityPalette {
        &self.palette
    }

    /// Identity colors of every element of `panel_id`.
    #[must_use]
    pub fn identity_colors(&self, panel_id: &PanelId) -> IndexMap<ElementId, [u8; 3]> {
        self.palette
            .targets()
            .filter(|(target, _)| &target.panel_id == panel_id)
            .map(|(target, color)| (target.element_id.clone(), color))
            .collect()
    }

    /// Element drawn on top at pixel `(x, y)`, if any.
    #[must_use]
    pub fn query_point(&self, x: f64, y: f64) -> Option<HitTarget> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let (px, py) = (x.floor() as u32, y.floor() as u32);
        if px >= self.image.width() || py >= self.image.height() {
            return None;
        }
        let pixel = self.image.get_pixel(px, py);
        self.palette.decode([pixel[0], pixel[1], pixel[2]]).cloned()
    }

    #[must_use]
    pub fn region(&self, target: &HitTarget) -> Option<&HitRegion> {
        self.regions.get(target)
    }

    pub fn bbox_of(&self, target: &HitTarget) -> RecipeResult<&HitGeometry> {
        self.regions
            .get(target)
            .map(|region| &region.geometry)
            .ok_or_else(|| RecipeError::InvalidData(format!("no element `{target}` in hit map")))
    }

    /// Closest element within `tolerance_px`; higher z-order wins ties.
    #[must_use]
    pub fn nearest_element(&self, x: f64, y: f64, tolerance_px: f64) -> Option<HitTarget> {
        let point = DevicePoint::new(x, y);
        let mut candidates: SmallVec<[((OrderedFloat<f64>, i32), &HitTarget); 8]> = SmallVec::new();
        for (target, region) in &self.regions {
            let distance = region.geometry.distance_to(point);
            if distance <= tolerance_px {
                candidates.push(((OrderedFloat(distance), -region.z_order), target));
            }
        }
        candidates
            .into_iter()
            .min_by_key(|(key, _)| *key)
            .map(|(_, target)| target.clone())
    }

    /// Exact pick first, then the proximity fallback.
    #[must_use]
    pub fn pick(&self, x: f64, y: f64, tolerance_px: f64) -> Option<HitTarget> {
        self.query_point(x, y)
            .or_else(|| self.nearest_element(x, y, tolerance_px))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AXES_COLOR, BACKGROUND_COLOR, DISTINCT_COLORS, HitTarget, IdentityPalette,
        id_index_to_color,
    };
    use crate::core::{ElementId, PanelId};

    #[test]
    fn first_ids_use_hand_picked_colors() {
        for (index, color) in DISTINCT_COLORS.iter().enumerate() {
            assert_eq!(id_index_to_color(index), *color);
        }
    }

    #[test]
    fn sweep_colors_follow_golden_ratio_hue() {
        // id 13: hue 0.618..., saturation 0.8, value 0.8125.
        assert_eq!(id_index_to_color(12), [41, 89, 207]);
    }

    #[test]
    fn palette_assigns_unique_decodable_colors() {
        let mut palette = IdentityPalette::new();
        let targets: Vec<HitTarget> = (0..300)
            .map(|i| HitTarget::new(PanelId::grid(0, 0), ElementId::new(format!("e{i}"))))
            .collect();
        for target in &targets {
            let color = palette.assign(target);
            assert_ne!(color, BACKGROUND_COLOR);
            assert_ne!(color, AXES_COLOR);
        }
        for target in &targets {
            let color = palette.color_of(target).expect("assigned");
            assert_eq!(palette.decode(color), Some(target));
        }
    }
}
