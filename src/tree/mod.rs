pub mod node;
pub mod state;
pub mod store;
pub mod visible;

pub use node::{Node, NodeKind};
pub use state::{ToggleStep, TreeState};
pub use store::{TreeStore, DEFAULT_INITIAL_DEPTH};
pub use visible::visible_nodes;
