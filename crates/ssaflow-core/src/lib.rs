pub mod id;
pub mod error;
pub mod types;
pub mod editor;
pub mod diagnostic;
pub mod inst;
pub mod block;
pub mod function;
pub mod package;
pub mod lazy;
pub mod cache;
pub mod program;
pub mod usedef;
pub mod cfg;
pub mod display;

// Re-export commonly used types
pub use block::{BasicBlock, Reachability};
pub use cache::SourceCache;
pub use diagnostic::{ErrorKind, ErrorTag, SsaDiagnostic};
pub use editor::{Position, Range, SourceEditor};
pub use error::CoreError;
pub use function::{Function, FunctionSideEffect};
pub use id::{BlockId, FunctionId, ValueId};
pub use inst::{
    BinaryOp, Call, InstKind, Instruction, MemberCallKind, MemberOf, Opcode, ParameterMemberInner,
    SwitchLabel, UnaryOp, UndefinedKind,
};
pub use lazy::NodeLoader;
pub use package::{ClassBlueprint, Package};
pub use program::{OffsetEntry, Program, ProgramParts};
pub use types::{ConstValue, SsaType};
