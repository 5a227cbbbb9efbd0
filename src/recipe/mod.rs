//! Recording, storing and loading figure recipes.

pub mod call;
pub mod document;
pub mod externalize;
pub mod ledger;
pub mod model;
pub mod ops;
pub mod value;

pub use call::{ArgSlot, Call, CallArg};
pub use document::{
    RecipeConfig, RecipeResolver, SUPPORTED_FORMAT_VERSIONS, deserialize, load_recipe,
    save_recipe, serialize,
};
pub use externalize::{
    Classification, DEFAULT_INLINE_THRESHOLD, DataExternalizer, ExternalDataRef, StorageKind,
    classify, inline_materialize,
};
pub use ledger::CallLedger;
pub use model::{FORMAT_VERSION, FigureSpec, Panel, PanelLayout, Recipe, StyleRef};
pub use ops::{CallCategory, OPERATION_VOCABULARY_VERSION, Operation};
pub use value::{ArgValue, ArrayData, DType, NdArray, Table};
