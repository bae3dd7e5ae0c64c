pub mod overlay;
pub mod scope;
pub mod selection;

pub use overlay::{DEFAULT_CYCLE_BUDGET, OverlayRegistry};
pub use scope::ViewScope;
pub use selection::SelectionController;
