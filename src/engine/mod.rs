//! Engine orchestration: source worker, dispatcher, and lifecycle (§4.1).

pub mod dispatcher;
pub mod orchestrator;
pub mod priority_source;
pub mod source_worker;

pub use dispatcher::{Acker, Dispatcher, SourceAcker};
pub use orchestrator::{register_sink, Engine, PreflightSink, SinkHandle};
pub use priority_source::PrioritySource;
pub use source_worker::{SourceHealth, SourceWorker};
