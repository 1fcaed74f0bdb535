#![doc = include_str!("../../../README.md")]
#![expect(clippy::module_name_repetitions, reason = "TypeTag/BoxedValue etc. read clearer with the repetition")]
#![expect(clippy::missing_errors_doc, reason = "error variants are documented on the error enums themselves")]

mod boxed_value;
mod conversions;
mod dispatch;
mod engine;
mod eval;
mod json;
mod module_loader;
mod optimizer;
mod parser;
mod proxy_function;
mod stdlib;
mod tracer;
mod type_tag;

pub use boxed_value::{BadCast, BoxedValue};
pub use conversions::{ConversionError, ConversionExists, TypeConversion, TypeConversions};
pub use dispatch::{CallFrame, DispatchEngine, DispatchState, NameError, NotFound};
pub use engine::{Engine, EngineError, EngineOptions, EngineState};
pub use eval::{EvalError, EvalErrorKind, ExceptionValue, ScriptObject};
pub use json::{from_json, to_json};
pub use module_loader::{ModuleLoader, StaticModuleLoader};
pub use parser::{LexError, ParseError};
pub use proxy_function::{DispatchError, NativeFunction, ProxyFunction};
pub use tracer::{EvalTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent};
pub use type_tag::TypeTag;
