//! Service Kit - Leaf Tools
//!
//! Tools that implement `toolbox_core::Tool`.

mod get_article;
mod math;

pub use get_article::GetArticleTool;
pub use math::{AdditionTool, ExponentsTool, SubtractionTool};
