use crate::core::{DevicePoint, DeviceRect};
use crate::error::{RecipeError, RecipeResult};

/// RGBA color in normalized 0..=1 channel values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    #[must_use]
    pub const fn rgba(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    #[must_use]
    pub const fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Self::rgba(red, green, blue, 1.0)
    }

    #[must_use]
    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        Self::rgb(
            f64::from(rgb[0]) / 255.0,
            f64::from(rgb[1]) / 255.0,
            f64::from(rgb[2]) / 255.0,
        )
    }

    /// Parses `#rrggbb`, `#rrggbbaa` or `#rgb`.
    pub fn from_hex(raw: &str) -> RecipeResult<Self> {
        let invalid = || RecipeError::InvalidData(format!("invalid color `{raw}`"));
        let hex = raw.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |index: usize| -> RecipeResult<u8> {
            u8::from_str_radix(&hex[index..index + 2], 16).map_err(|_| invalid())
        };
        let (rgb, alpha) = match hex.len() {
            3 => {
                let short = |index: usize| -> RecipeResult<u8> {
                    u8::from_str_radix(&hex[index..=index], 16)
                        .map(|value| value * 17)
                        .map_err(|_| invalid())
                };
                ([short(0)?, short(1)?, short(2)?], 255)
            }
            6 => ([channel(0)?, channel(2)?, channel(4)?], 255),
            8 => ([channel(0)?, channel(2)?, channel(4)?], channel(6)?),
            _ => return Err(invalid()),
        };
        Ok(Self::from_rgb8(rgb).with_alpha(f64::from(alpha) / 255.0))
    }

    #[must_use]
    pub fn with_alpha(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }

    #[must_use]
    pub fn to_rgba8(self) -> [u8; 4] {
        let quantize = |value: f64| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            quantize(self.red),
            quantize(self.green),
            quantize(self.blue),
            quantize(self.alpha),
        ]
    }

    pub fn validate(self) -> RecipeResult<()> {
        for (channel, value) in [
            ("red", self.red),
            ("green", self.green),
            ("blue", self.blue),
            ("alpha", self.alpha),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(RecipeError::InvalidData(format!(
                    "color channel `{channel}` must be finite and in [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Horizontal text alignment relative to the anchor x.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextHAlign {
    Left,
    Center,
    Right,
}

/// Vertical text alignment relative to the anchor y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextVAlign {
    Top,
    Center,
    Bottom,
}

/// Draw command for one label in pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPrimitive {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size_px: f64,
    pub color: Color,
    pub h_align: TextHAlign,
    pub v_align: TextVAlign,
}

impl TextPrimitive {
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        x: f64,
        y: f64,
        font_size_px: f64,
        color: Color,
        h_align: TextHAlign,
        v_align: TextVAlign,
    ) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_size_px,
            color,
            h_align,
            v_align,
        }
    }

    /// Device rectangle covered by the text for a measured `(width, height)`.
    #[must_use]
    pub fn bounds(&self, extent: (f64, f64)) -> DeviceRect {
        let (width, height) = extent;
        let x = match self.h_align {
            TextHAlign::Left => self.x,
            TextHAlign::Center => self.x - width / 2.0,
            TextHAlign::Right => self.x - width,
        };
        let y = match self.v_align {
            TextVAlign::Top => self.y,
            TextVAlign::Center => self.y - height / 2.0,
            TextVAlign::Bottom => self.y - height,
        };
        DeviceRect::new(x, y, width, height)
    }

    pub fn validate(&self) -> RecipeResult<()> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(RecipeError::InvalidData(
                "text coordinates must be finite".to_owned(),
            ));
        }
        if !self.font_size_px.is_finite() || self.font_size_px <= 0.0 {
            return Err(RecipeError::InvalidData(
                "font size must be finite and > 0".to_owned(),
            ));
        }
        self.color.validate()
    }
}

/// One device-space drawing command.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Connected stroke through `points`.
    Polyline {
        points: Vec<DevicePoint>,
        width: f64,
        color: Color,
    },
    /// Filled discs of equal radius.
    Markers {
        centers: Vec<DevicePoint>,
        radius: f64,
        color: Color,
    },
    Rect {
        rect: DeviceRect,
        fill: Option<Color>,
        stroke: Option<(Color, f64)>,
    },
    Polygon {
        points: Vec<DevicePoint>,
        fill: Color,
    },
    /// Row-major cell colors laid out over `rect`.
    Image {
        rect: DeviceRect,
        columns: usize,
        rows: usize,
        cells: Vec<Color>,
    },
    Text(TextPrimitive),
}

impl Primitive {
    pub fn validate(&self) -> RecipeResult<()> {
        let finite_points = |points: &[DevicePoint]| {
            points
                .iter()
                .all(|point| point.x.is_finite() && point.y.is_finite())
        };
        let finite_rect = |rect: &DeviceRect| {
            [rect.x, rect.y, rect.width, rect.height]
                .iter()
                .all(|value| value.is_finite())
        };
        match self {
            Self::Polyline {
                points,
                width,
                color,
            } => {
                if !finite_points(points) {
                    return Err(RecipeError::InvalidData(
                        "polyline coordinates must be finite".to_owned(),
                    ));
                }
                if !width.is_finite() || *width < 0.0 {
                    return Err(RecipeError::InvalidData(
                        "line stroke width must be finite and >= 0".to_owned(),
                    ));
                }
                color.validate()
            }
            Self::Markers {
                centers,
                radius,
                color,
            } => {
                if !finite_points(centers) || !radius.is_finite() || *radius < 0.0 {
                    return Err(RecipeError::InvalidData(
                        "markers need finite centers and radius >= 0".to_owned(),
                    ));
                }
                color.validate()
            }
            Self::Rect { rect, fill, stroke } => {
                if !finite_rect(rect) {
                    return Err(RecipeError::InvalidData(
                        "rect geometry must be finite".to_owned(),
                    ));
                }
                if let Some(fill) = fill {
                    fill.validate()?;
                }
                if let Some((color, width)) = stroke {
                    if !width.is_finite() || *width < 0.0 {
                        return Err(RecipeError::InvalidData(
                            "rect stroke width must be finite and >= 0".to_owned(),
                        ));
                    }
                    color.validate()?;
                }
                Ok(())
            }
            Self::Polygon { points, fill } => {
                if points.len() < 3 || !finite_points(points) {
                    return Err(RecipeError::InvalidData(
                        "polygon needs at least 3 finite vertices".to_owned(),
                    ));
                }
                fill.validate()
            }
            Self::Image {
                rect,
                columns,
                rows,
                cells,
            } => {
                if !finite_rect(rect) || columns * rows != cells.len() {
                    return Err(RecipeError::InvalidData(format!(
                        "image grid {rows}x{columns} does not match {} cells",
                        cells.len()
                    )));
                }
                cells.iter().try_for_each(|color| color.validate())
            }
            Self::Text(text) => text.validate(),
        }
    }

    /// False for commands with no extent: empty labels, zero-width strokes
    /// and zero-radius markers.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        match self {
            Self::Polyline { points, width, .. } => !points.is_empty() && *width > 0.0,
            Self::Markers { centers, radius, .. } => !centers.is_empty() && *radius > 0.0,
            Self::Rect { fill, stroke, .. } => {
                fill.is_some() || stroke.is_some_and(|(_, width)| width > 0.0)
            }
            Self::Polygon { .. } => true,
            Self::Image { cells, .. } => !cells.is_empty(),
            Self::Text(text) => !text.text.trim().is_empty(),
        }
    }

    /// Same geometry with every color replaced by `color` at full opacity.
    #[must_use]
    pub fn flat_colored(&self, color: Color) -> Self {
        let color = color.with_alpha(1.0);
        match self {
            Self::Polyline { points, width, .. } => Self::Polyline {
                points: points.clone(),
                width: *width,
                color,
            },
            Self::Markers {
                centers, radius, ..
            } => Self::Markers {
                centers: centers.clone(),
                radius: *radius,
                color,
            },
            Self::Rect { rect, fill, stroke } => Self::Rect {
                rect: *rect,
                fill: fill.map(|_| color),
                stroke: stroke.map(|(_, width)| (color, width)),
            },
            Self::Polygon { points, .. } => Self::Polygon {
                points: points.clone(),
                fill: color,
            },
            Self::Image {
                rect,
                columns,
                rows,
                cells,
            } => Self::Image {
                rect: *rect,
                columns: *columns,
                rows: *rows,
                cells: vec![color; cells.len()],
            },
            Self::Text(text) => Self::Text(TextPrimitive {
                color,
                ..text.clone()
            }),
        }
    }

    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let shift = |points: &[DevicePoint]| {
            points
                .iter()
                .map(|point| DevicePoint::new(point.x + dx, point.y + dy))
                .collect::<Vec<_>>()
        };
        match self {
            Self::Polyline {
                points,
                width,
                color,
            } => Self::Polyline {
                points: shift(points),
                width: *width,
                color: *color,
            },
            Self::Markers {
                centers,
                radius,
                color,
            } => Self::Markers {
                centers: shift(centers),
                radius: *radius,
                color: *color,
            },
            Self::Rect { rect, fill, stroke } => Self::Rect {
                rect: rect.translated(dx, dy),
                fill: *fill,
                stroke: *stroke,
            },
            Self::Polygon { points, fill } => Self::Polygon {
                points: shift(points),
                fill: *fill,
            },
            Self::Image {
                rect,
                columns,
                rows,
                cells,
            } => Self::Image {
                rect: rect.translated(dx, dy),
                columns: *columns,
                rows: *rows,
                cells: cells.clone(),
            },
            Self::Text(text) => Self::Text(TextPrimitive {
                x: text.x + dx,
                y: text.y + dy,
                ..text.clone()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Color, Primitive, TextHAlign, TextPrimitive, TextVAlign};
    use crate::core::{DevicePoint, DeviceRect};

    #[test]
    fn hex_colors_parse_in_all_supported_forms() {
        assert_eq!(Color::from_hex("#ff0000").expect("6").to_rgba8(), [255, 0, 0, 255]);
        assert_eq!(Color::from_hex("#0f0").expect("3").to_rgba8(), [0, 255, 0, 255]);
        assert_eq!(Color::from_hex("#0000ff80").expect("8").to_rgba8(), [0, 0, 255, 128]);
        assert!(Color::from_hex("red").is_err());
        assert!(Color::from_hex("#12345").is_err());
    }

    #[test]
    fn text_bounds_follow_alignment() {
        let text = TextPrimitive::new(
            "Demo",
            100.0,
            50.0,
            16.0,
            Color::BLACK,
            TextHAlign::Center,
            TextVAlign::Bottom,
        );
        assert_eq!(text.bounds((64.0, 16.0)), DeviceRect::new(68.0, 34.0, 64.0, 16.0));
    }

    #[test]
    fn flat_coloring_keeps_geometry_and_forces_opacity() {
        let rect = Primitive::Rect {
            rect: DeviceRect::new(0.0, 0.0, 4.0, 4.0),
            fill: Some(Color::WHITE.with_alpha(0.25)),
            stroke: None,
        };
        let flat = rect.flat_colored(Color::from_rgb8([255, 0, 0]));
        assert_eq!(
            flat,
            Primitive::Rect {
                rect: DeviceRect::new(0.0, 0.0, 4.0, 4.0),
                fill: Some(Color::rgb(1.0, 0.0, 0.0)),
                stroke: None,
            }
        );
    }

    #[test]
    fn zero_extent_commands_are_valid_but_invisible() {
        let line = |width: f64| Primitive::Polyline {
            points: vec![DevicePoint::new(0.0, 0.0), DevicePoint::new(4.0, 4.0)],
            width,
            color: Color::BLACK,
        };
        line(0.0).validate().expect("zero width is valid");
        assert!(!line(0.0).is_visible());
        assert!(line(1.0).is_visible());
        assert!(line(-1.0).validate().is_err());

        let empty = Primitive::Text(TextPrimitive::new(
            "",
            1.0,
            1.0,
            8.0,
            Color::BLACK,
            TextHAlign::Left,
            TextVAlign::Top,
        ));
        empty.validate().expect("empty label is valid");
        assert!(!empty.is_visible());

        let dot = Primitive::Markers {
            centers: vec![DevicePoint::new(2.0, 2.0)],
            radius: 0.0,
            color: Color::BLACK,
        };
        dot.validate().expect("zero radius is valid");
        assert!(!dot.is_visible());
    }
}
