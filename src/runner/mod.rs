pub mod events;
pub mod js_engine;
pub mod orchestra;

mod conditions;
mod eval;
mod lookup;

pub use events::{CommandMetadata, ErrorResolution, FlowObserver, NoopObserver};
pub use js_engine::{BoaScriptEngine, ScriptEngine, ScriptLogLevel};
pub use orchestra::{Orchestra, OrchestraOptions};
