//! figure-recipe: record drawing calls into portable figure recipes.
//!
//! Calls are captured into an append-only ledger, serialized into a
//! versioned JSON recipe (bulk arrays go to side files), replayed through a
//! [`render::Renderer`] and edited interactively through an identity render
//! that maps pixels back to the calls that drew them.

pub mod api;
pub mod bundle;
pub mod core;
pub mod error;
pub mod interaction;
pub mod overrides;
mod persist;
pub mod recipe;
pub mod render;
pub mod style;
pub mod telemetry;

pub use api::{
    ElementEdit, HitMap, HitTarget, HitTester, OverrideSession, RenderedArtifact, ReplayMode,
    Reproducer, SessionConfig, ValidationPolicy, ValidationReport,
};
pub use bundle::Bundle;
pub use error::{RecipeError, RecipeResult};
pub use overrides::OverrideSet;
pub use recipe::{
    CallLedger, Recipe, RecipeConfig, deserialize, load_recipe, save_recipe, serialize,
};
pub use style::{StyleDocument, StyleLayers};
