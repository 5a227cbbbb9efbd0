//! Replay, hit testing and interactive editing on top of recorded recipes.

mod crop;
mod hit_test;
mod override_session;
mod reproducer;
mod scene_builder;
mod validation;

pub use crop::{CONTENT_THRESHOLD, CropBox};
pub use hit_test::{
    AXES_COLOR, BACKGROUND_COLOR, DISTINCT_COLORS, HitGeometry, HitMap, HitRegion, HitTarget,
    HitTester, IdentityPalette, id_index_to_color,
};
pub use override_session::{ElementEdit, OverrideSession, SessionConfig};
pub use reproducer::{RenderedArtifact, Reproducer, style_layers};
pub use scene_builder::{
    CancelFlag, ReplayMode, SceneBuild, SceneRequest, SkippedCall, build_scene, parse_color,
};
pub use validation::{
    DEFAULT_MSE_THRESHOLD, ValidationPolicy, ValidationReport, validate,
};
