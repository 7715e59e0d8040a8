pub mod commands;
pub mod driver;
pub mod errors;
pub mod filter;
pub mod proxy;
pub mod runner;

// Re-export common items
pub use commands::{
    AppState, Command, Condition, ElementSelector, FlowConfig, InitFlow, Platform,
};
pub use driver::{DeviceInfo, Driver, TreeNode, UiElement, ViewHierarchy};
pub use errors::{OrchestraError, OrchestraResult};
pub use proxy::{MockRule, NetworkProxy};
pub use runner::{
    BoaScriptEngine, CommandMetadata, ErrorResolution, FlowObserver, NoopObserver, Orchestra,
    OrchestraOptions, ScriptEngine,
};
