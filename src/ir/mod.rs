//! The in-memory IR: entities, operands, instructions, and their ordering.

pub mod condcodes;
pub mod entities;
pub mod function;
pub mod instruction;
pub mod layout;
pub mod opcode;
pub mod operand;

pub use condcodes::Condition;
pub use entities::{FuncRef, Inst};
pub use function::{CallConv, Function, FunctionFlags, LabelJumps};
pub use instruction::{Aux, Instruction, OperandEffect};
pub use layout::Layout;
pub use opcode::{FlagEffects, Opcode, OperandEffects};
pub use operand::{Operand, OperandKind, RegClass, Size, Symbol};
