// Source rewriting - applies transform decisions to compilation units

mod editor;
mod emitter;

pub use editor::{expand_to_lines, Edit, EditError, SourceEditor};
pub use emitter::{default_value, EmitError, EmittedUnit, Emitter, OutputLayout, STUB_THROW};
