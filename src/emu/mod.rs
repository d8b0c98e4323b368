mod disasm;
mod execute;
mod font;
mod machine;
mod opcode;
mod quirks;
mod runner;
mod types;

pub use disasm::*;
pub use font::*;
pub use machine::*;
pub use opcode::*;
pub use quirks::*;
pub use runner::*;
pub use types::*;
