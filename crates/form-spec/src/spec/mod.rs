pub mod component;
pub mod form;
pub mod tree;

pub use component::{Component, Conditional, DataNesting, LayoutCell, ValidateBlock};
pub use form::{Display, FormSchema, ParsedComponents, Submission, UserContext, parse_components};
pub use tree::{ComponentTree, NodeId, TreeNode};
