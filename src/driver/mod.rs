pub mod hierarchy;
pub mod traits;

pub use hierarchy::{Bounds, TreeNode, UiElement, ViewHierarchy};
pub use traits::{DeviceInfo, Driver, KeyCode, SwipeDirection};
