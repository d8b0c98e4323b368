/// Result type for a single CPU step.
#[derive(Debug)]
pub enum StepResult {
    /// Continue executing instructions in the current frame.
    Continue,
    /// Wait for the next frame before continuing
    /// (after a draw, or while a key-wait is pending, so the frontend can present and poll input).
    WaitForNextFrame,
}

/// Error types that can occur during CHIP-8 emulation.
///
/// Out-of-range memory and stack accesses are not errors: they are masked into
/// the valid range, matching the leniency of historical interpreters.
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Unimplemented opcode {opcode:04X} at address {address:#05X}")]
    UnimplementedOpcode { address: u16, opcode: u16 },
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
