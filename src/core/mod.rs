pub mod layout;
pub mod scale;
pub mod transform;
pub mod types;
pub mod units;

pub use layout::{
    LayoutParameters, LayoutSolution, PanelGeometryMm, PanelPlacement, solve_layout,
};
pub use scale::LinearScale;
pub use transform::{DataExtent, DataLimits, DataTransform, nice_ticks};
pub use types::{DevicePoint, DeviceRect, ElementId, MmDelta, MmPoint, PanelId, Viewport};
pub use units::{device_fraction_to_mm, mm_to_device_fraction};
