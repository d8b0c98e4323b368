use super::{Opcode, OpcodeALU};
use std::fmt;

/// One disassembled instruction: a pure function of the two fetched bytes and
/// their address, independent of any machine state.
pub struct Trace {
    pub address: u16,
    pub bytes: [u8; 2],
    pub mnemonic: &'static str,
    pub operands: String,
}

impl Trace {
    pub fn disassemble(address: u16, bytes: [u8; 2]) -> Self {
        let (mnemonic, operands) = describe(Opcode::decode(u16::from_be_bytes(bytes)));

        Trace {
            address,
            bytes,
            mnemonic,
            operands,
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x} {:02x} {:02x} {:<10}{}",
            self.address, self.bytes[0], self.bytes[1], self.mnemonic, self.operands
        )
    }
}

/// Mnemonic and operand text for one opcode. A "." suffix marks instructions
/// that modify VF.
fn describe(opcode: Opcode) -> (&'static str, String) {
    match opcode {
        Opcode::ClearDisplay => ("CLS", String::new()),
        Opcode::Return => ("RTS", String::new()),
        Opcode::Jump { nnn } => ("JUMP", format!("${nnn:03x}")),
        Opcode::JumpWithOffset { nnn } => ("JUMP", format!("${nnn:03x}(V0)")),
        Opcode::Call { nnn } => ("CALL", format!("${nnn:03x}")),
        Opcode::SkipRegEqualImm { x, nn } => ("SKIP_EQ", format!("V{x:X},#${nn:02x}")),
        Opcode::SkipRegNotEqualImm { x, nn } => ("SKIP_NE", format!("V{x:X},#${nn:02x}")),
        Opcode::SkipRegEqualReg { x, y } => ("SKIP_EQ", format!("V{x:X},V{y:X}")),
        Opcode::SkipRegNotEqualReg { x, y } => ("SKIP_NE", format!("V{x:X},V{y:X}")),
        Opcode::SetRegImm { x, nn } => ("MVI", format!("V{x:X},#${nn:02x}")),
        Opcode::AddRegImm { x, nn } => ("ADI", format!("V{x:X},#${nn:02x}")),
        Opcode::SetIndexImm { nnn } => ("MVI", format!("I,#${nnn:03x}")),
        Opcode::AddIndexReg { x } => ("ADI", format!("I,V{x:X}")),
        Opcode::ALU { x, y, op } => {
            match op {
                OpcodeALU::Set => ("MOV", format!("V{x:X},V{y:X}")),
                OpcodeALU::Or => ("OR", format!("V{x:X},V{y:X}")),
                OpcodeALU::And => ("AND", format!("V{x:X},V{y:X}")),
                OpcodeALU::Xor => ("XOR", format!("V{x:X},V{y:X}")),
                OpcodeALU::Add => ("ADD.", format!("V{x:X},V{y:X}")),
                OpcodeALU::Sub => ("SUB.", format!("V{x:X},V{x:X},V{y:X}")),
                OpcodeALU::ShiftRight => ("SHR.", format!("V{x:X},V{y:X}")),
                OpcodeALU::SubReverse => ("SUBB.", format!("V{x:X},V{y:X},V{y:X}")),
                OpcodeALU::ShiftLeft => ("SHL.", format!("V{x:X},V{y:X}")),
            }
        }
        Opcode::Random { x, nn } => ("RNDMSK", format!("V{x:X},#${nn:02x}")),
        Opcode::Draw { x, y, n } => ("SPRITE", format!("V{x:X},V{y:X},#${n:01x}")),
        Opcode::SkipIfPressed { x } => ("SKIPKEY_Y", format!("V{x:X}")),
        Opcode::SkipIfNotPressed { x } => ("SKIPKEY_N", format!("V{x:X}")),
        Opcode::WaitForKey { x } => ("KEY", format!("V{x:X}")),
        Opcode::ReadDelayTimer { x } => ("MOV", format!("V{x:X},DELAY")),
        Opcode::SetDelayTimer { x } => ("MOV", format!("DELAY,V{x:X}")),
        Opcode::SetSoundTimer { x } => ("MOV", format!("SOUND,V{x:X}")),
        Opcode::FontChar { x } => ("SPRITECHAR", format!("I,V{x:X}")),
        Opcode::BCD { x } => ("MOVBCD", format!("(I),V{x:X}")),
        Opcode::StoreRegs { x } => ("MOVM", format!("(I),V0-V{x:X}")),
        Opcode::LoadRegs { x } => ("MOVM", format!("V0-V{x:X},(I)")),
        Opcode::Unknown(word) => ("UNKNOWN", format!("#${word:04x}")),
    }
}
