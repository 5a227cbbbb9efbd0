use crate::core::{ElementId, PanelId, Viewport};
use crate::error::{RecipeError, RecipeResult};
use crate::render::{Color, Primitive};

/// One primitive tagged with the element that produced it.
///
/// `element_id` is `None` for panel furniture (axes frame, ticks).
#[derive(Debug, Clone, PartialEq)]
pub struct SceneItem {
    pub panel_id: PanelId,
    pub element_id: Option<ElementId>,
    pub z_order: i32,
    pub seq: u64,
    pub primitive: Primitive,
}

/// Backend-agnostic scene for one figure draw pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub viewport: Viewport,
    pub background: Color,
    pub items: Vec<SceneItem>,
}

impl RenderFrame {
    #[must_use]
    pub fn new(viewport: Viewport, background: Color) -> Self {
        Self {
            viewport,
            background,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: SceneItem) {
        self.items.push(item);
    }

    #[must_use]
    pub fn with_item(mut self, item: SceneItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn validate(&self) -> RecipeResult<()> {
        if !self.viewport.is_valid() {
            return Err(RecipeError::InvalidData(format!(
                "viewport {}x{} must be non-empty",
                self.viewport.width, self.viewport.height
            )));
        }
        self.background.validate()?;
        for item in &self.items {
            item.primitive.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in paint order: ascending z-order, later sequence index on top.
    #[must_use]
    pub fn paint_order(&self) -> Vec<&SceneItem> {
        let mut ordered: Vec<&SceneItem> = self.items.iter().collect();
        ordered.sort_by_key(|item| (item.z_order, item.seq));
        ordered
    }

    /// Copy of the frame where every item is flat-filled with the color
    /// chosen by `color_of`.
    #[must_use]
    pub fn recolored(&self, background: Color, color_of: impl Fn(&SceneItem) -> Color) -> Self {
        Self {
            viewport: self.viewport,
            background,
            items: self
                .items
                .iter()
                .map(|item| SceneItem {
                    primitive: item.primitive.flat_colored(color_of(item)),
                    ..item.clone()
                })
                .collect(),
        }
    }
}
