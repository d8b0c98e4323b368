use super::{
    DISPLAY_X, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS, MachineError, Opcode, Quirks,
    StepResult,
};
use crate::u4;

// Memory map, from the bottom up: font table, program/data, call stack
// (growing downward), bit-packed framebuffer.
pub(crate) const MEMORY_SIZE: usize = 4096;
pub(crate) const ROM_START_ADDRESS: usize = 0x200;
pub(crate) const STACK_FLOOR: u16 = 0xEA0;
pub(crate) const STACK_TOP: u16 = 0xF00;
pub(crate) const DISPLAY_START_ADDRESS: usize = 0xF00;

pub(crate) const ADDRESS_MASK: u16 = 0x0FFF;

/// In-flight FX0A key-wait: a snapshot of the keypad from the previous cycle
/// and the key whose release is awaited once a fresh press has been seen.
pub(crate) struct KeyWait {
    pub(crate) snapshot: [bool; 16],
    pub(crate) pressed: Option<u8>,
}

/// The CHIP-8 machine state: the single mutable aggregate the interpreter
/// executes against.
pub struct MachineState {
    /// 4KB memory array; also holds the call stack and the framebuffer.
    pub(crate) memory: [u8; MEMORY_SIZE],

    /// Program counter: address of the next instruction to execute.
    pub(crate) pc: u16,
    /// Index register: used for memory operations.
    pub(crate) i: u16,
    /// Stack pointer into the reserved stack region, moving in steps of 2.
    pub(crate) sp: u16,
    /// General-purpose registers V0-VF (VF doubles as the flag register).
    pub(crate) v: [u8; 16],

    /// Delay timer: decrements at 60Hz until it reaches 0.
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, beeps while non-zero.
    pub(crate) sound_timer: u8,

    /// Set by idle-loop detection or an external quit request; once set, no
    /// further instruction executes.
    pub(crate) halt: bool,
    /// Set whenever the framebuffer changes; cleared by the presenter.
    pub(crate) redraw: bool,

    /// Keypad state: 16 keys mapped as booleans (true = pressed).
    pub(crate) keypad: [bool; 16],
    /// Allocated while an FX0A key-wait is active, discarded when it resolves.
    pub(crate) key_wait: Option<KeyWait>,

    pub(crate) quirks: Quirks,
}

impl MachineState {
    pub fn new() -> Self {
        MachineState {
            memory: [0; MEMORY_SIZE],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            sp: STACK_TOP,
            v: [0; 16],
            delay_timer: 0,
            sound_timer: 0,
            halt: false,
            redraw: false,
            keypad: [false; 16],
            key_wait: None,
            quirks: Quirks::default(),
        }
    }

    pub fn with_quirks(quirks: Quirks) -> Self {
        MachineState {
            quirks,
            ..Self::new()
        }
    }

    /// Loads a ROM into memory at 0x200 and initializes the font table.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), MachineError> {
        let max_size = MEMORY_SIZE - ROM_START_ADDRESS;
        if rom.len() > max_size {
            return Err(MachineError::RomTooLarge {
                size: rom.len(),
                max_size,
            });
        }

        self.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        self.memory[ROM_START_ADDRESS..ROM_START_ADDRESS + rom.len()].copy_from_slice(rom);
        self.pc = ROM_START_ADDRESS as u16;

        Ok(())
    }

    /// Executes a single CPU step (fetch, decode, execute).
    ///
    /// Must not be called once the halt flag is set; the runner checks it
    /// before every step.
    pub fn step(&mut self) -> Result<StepResult, MachineError> {
        let address = self.pc & ADDRESS_MASK;
        let word = self.fetch();
        self.execute(address, Opcode::decode(word))
    }

    /// Decrements the delay and sound timers. Called at 60Hz, independent of
    /// the instruction rate.
    pub fn timers_cycle(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Returns true while the sound timer is non-zero.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    pub fn halted(&self) -> bool {
        self.halt
    }

    /// External cancellation: stops execution before the next step.
    pub fn request_halt(&mut self) {
        self.halt = true;
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    /// The bit-packed framebuffer: 64x32 pixels, row-major, MSB first within
    /// each byte.
    pub fn framebuffer(&self) -> &[u8] {
        &self.memory[DISPLAY_START_ADDRESS..]
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        let byte = self.memory[DISPLAY_START_ADDRESS + y * (DISPLAY_X / 8) + x / 8];
        byte & (0x80 >> (x % 8)) != 0
    }

    pub fn redraw_pending(&self) -> bool {
        self.redraw
    }

    /// Consumes the redraw flag, returning whether a redraw was pending.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::replace(&mut self.redraw, false)
    }

    /// Return addresses currently on the call stack, oldest first.
    pub fn stack_frames(&self) -> Vec<u16> {
        (self.sp..STACK_TOP)
            .step_by(2)
            .rev()
            .map(|addr| self.read_word(addr))
            .collect()
    }

    /// Fetches the next big-endian instruction word and advances PC by 2.
    fn fetch(&mut self) -> u16 {
        let high = self.read(self.pc);
        let low = self.read(self.pc.wrapping_add(1));
        self.pc = self.pc.wrapping_add(2);

        u16::from_be_bytes([high, low])
    }

    /// Reads one byte, masking the address into the 4096-byte range.
    pub(crate) fn read(&self, addr: u16) -> u8 {
        self.memory[(addr & ADDRESS_MASK) as usize]
    }

    /// Writes one byte, masking the address into the 4096-byte range.
    pub(crate) fn write(&mut self, addr: u16, value: u8) {
        self.memory[(addr & ADDRESS_MASK) as usize] = value;
    }

    /// Reads a big-endian 16-bit word, used for stack entries.
    pub(crate) fn read_word(&self, addr: u16) -> u16 {
        u16::from_be_bytes([self.read(addr), self.read(addr.wrapping_add(1))])
    }

    /// Writes a big-endian 16-bit word, used for stack entries.
    pub(crate) fn write_word(&mut self, addr: u16, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.write(addr, high);
        self.write(addr.wrapping_add(1), low);
    }

    /// Pushes a return address. SP is clamped at the stack floor, so an
    /// overflowing ROM overwrites the deepest frame instead of escaping the
    /// region.
    pub(crate) fn stack_push(&mut self, value: u16) {
        self.sp = self.sp.saturating_sub(2).max(STACK_FLOOR);
        self.write_word(self.sp, value);
    }

    /// Pops a return address. SP is clamped at the region top, so a return
    /// with an empty stack re-reads the topmost slot instead of escaping.
    pub(crate) fn stack_pop(&mut self) -> u16 {
        let value = self.read_word(self.sp.min(STACK_TOP - 2));
        self.sp = (self.sp + 2).min(STACK_TOP);
        value
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}
