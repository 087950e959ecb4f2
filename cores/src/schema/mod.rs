pub mod check;
pub mod parser;
pub mod types;

pub use check::{check_design, check_layout, check_layout_name, check_schema};
pub use parser::{layout_from_value, parse_layouts_str};
pub use types::{DesignConfig, LayoutConfig, LayoutDefinitions, ViewConfig};
