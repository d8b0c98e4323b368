/// Configuration flags for opcode behaviors that differ between historical
/// CHIP-8 interpreter lineages.
///
/// The defaults match the canonical semantics this interpreter documents; a
/// ROM written for a specific lineage may need different settings.
#[derive(Clone, Copy, Debug)]
pub struct Quirks {
    /// 8XY6/8XYE seed the shift from VY instead of shifting VX in place
    /// (original COSMAC VIP behavior).
    pub shift_reads_vy: bool,
    /// FX55/FX65 advance I by X+1 after the transfer. When false, I is left
    /// unchanged (SUPER-CHIP behavior).
    pub load_store_increments_i: bool,
    /// DXYN wraps sprite rows/columns around the screen edges instead of
    /// clipping them.
    pub sprite_wraps: bool,
    /// A jump targeting its own address sets the halt flag (idle-loop
    /// detection).
    pub jump_to_self_halts: bool,
}

impl Default for Quirks {
    fn default() -> Self {
        Quirks {
            shift_reads_vy: false,
            load_store_increments_i: true,
            sprite_wraps: false,
            jump_to_self_halts: true,
        }
    }
}
