use super::machine::{ADDRESS_MASK, DISPLAY_START_ADDRESS, KeyWait};
use super::{
    DISPLAY_X, DISPLAY_Y, FONT_START_ADDRESS, MachineError, MachineState, Opcode, OpcodeALU,
    StepResult,
};
use crate::u4;

impl MachineState {
    /// Executes one decoded opcode. `address` is the address the instruction
    /// was fetched from; PC has already been advanced past it.
    pub(crate) fn execute(
        &mut self,
        address: u16,
        opcode: Opcode,
    ) -> Result<StepResult, MachineError> {
        match opcode {
            Opcode::ClearDisplay => {
                self.memory[DISPLAY_START_ADDRESS..].fill(0);
                self.redraw = true;
            }
            Opcode::Jump { nnn } => {
                self.jump(address, nnn);
            }
            Opcode::JumpWithOffset { nnn } => {
                let target = nnn.wrapping_add(self.v[0].into()) & ADDRESS_MASK;
                self.jump(address, target);
            }
            Opcode::Call { nnn } => {
                self.stack_push(self.pc);
                self.pc = nnn;
            }
            Opcode::Return => {
                self.pc = self.stack_pop();
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if self.v[x] == nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if self.v[x] != nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if self.v[x] == self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if self.v[x] != self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = rand::random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into()) & ADDRESS_MASK;
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n);
                return Ok(StepResult::WaitForNextFrame);
            }
            Opcode::SkipIfPressed { x } => {
                if self.keypad[self.v[x] as usize & 0x0F] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !self.keypad[self.v[x] as usize & 0x0F] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::WaitForKey { x } => {
                return Ok(self.execute_wait_for_key(x));
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                let digit = self.v[x] & 0x0F;
                self.i = FONT_START_ADDRESS as u16 + digit as u16 * 5;
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                self.write(self.i, value / 100);
                self.write(self.i.wrapping_add(1), (value / 10) % 10);
                self.write(self.i.wrapping_add(2), value % 10);
            }
            Opcode::StoreRegs { x } => {
                for reg_index in 0..=u16::from(x) {
                    self.write(self.i.wrapping_add(reg_index), self.v[reg_index as usize]);
                }
                if self.quirks.load_store_increments_i {
                    self.i = self.i.wrapping_add(u16::from(x) + 1) & ADDRESS_MASK;
                }
            }
            Opcode::LoadRegs { x } => {
                for reg_index in 0..=u16::from(x) {
                    self.v[reg_index as usize] = self.read(self.i.wrapping_add(reg_index));
                }
                if self.quirks.load_store_increments_i {
                    self.i = self.i.wrapping_add(u16::from(x) + 1) & ADDRESS_MASK;
                }
            }
            Opcode::Unknown(opcode) => {
                return Err(MachineError::UnimplementedOpcode { address, opcode });
            }
        };

        Ok(StepResult::Continue)
    }

    /// A jump targeting its own address is an idle loop; detecting it lets the
    /// scheduler stop instead of spinning.
    fn jump(&mut self, address: u16, target: u16) {
        self.pc = target;
        if self.quirks.jump_to_self_halts && target == address {
            self.halt = true;
        }
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        match op {
            OpcodeALU::Set => self.v[x] = self.v[y],
            OpcodeALU::Or => self.v[x] |= self.v[y],
            OpcodeALU::And => self.v[x] &= self.v[y],
            OpcodeALU::Xor => self.v[x] ^= self.v[y],
            OpcodeALU::Add => {
                let (res, overflow) = self.v[x].overflowing_add(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = if overflow { 1 } else { 0 };
            }
            OpcodeALU::Sub => {
                let (res, borrow) = self.v[x].overflowing_sub(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = if borrow { 0 } else { 1 }; // Notice that borrow is inverted
            }
            OpcodeALU::SubReverse => {
                let (res, borrow) = self.v[y].overflowing_sub(self.v[x]);
                self.v[x] = res;
                self.v[0xF] = if borrow { 0 } else { 1 };
            }
            OpcodeALU::ShiftRight => {
                let src = if self.quirks.shift_reads_vy {
                    self.v[y]
                } else {
                    self.v[x]
                };
                self.v[x] = src >> 1;
                self.v[0xF] = src & 1;
            }
            OpcodeALU::ShiftLeft => {
                let src = if self.quirks.shift_reads_vy {
                    self.v[y]
                } else {
                    self.v[x]
                };
                self.v[x] = src << 1;
                self.v[0xF] = (src >> 7) & 1;
            }
        }
    }

    /// XOR-blits an N-row sprite from memory at I onto the bit-packed
    /// framebuffer. VF reports whether any lit pixel was erased.
    fn execute_draw(&mut self, x: u4, y: u4, n: u4) {
        let x_pos = self.v[x] as usize % DISPLAY_X;
        let y_pos = self.v[y] as usize % DISPLAY_Y;

        self.v[0xF] = 0;
        let mut changed = false;

        for row in 0..usize::from(n) {
            let sprite_byte = self.read(self.i.wrapping_add(row as u16));

            let mut py = y_pos + row;
            if py >= DISPLAY_Y {
                if self.quirks.sprite_wraps {
                    py %= DISPLAY_Y;
                } else {
                    break;
                }
            }

            for col in 0..8 {
                if sprite_byte & (0x80 >> col) == 0 {
                    continue;
                }

                let mut px = x_pos + col;
                if px >= DISPLAY_X {
                    if self.quirks.sprite_wraps {
                        px %= DISPLAY_X;
                    } else {
                        break;
                    }
                }

                let index = DISPLAY_START_ADDRESS + py * (DISPLAY_X / 8) + px / 8;
                let mask = 0x80 >> (px % 8);

                if self.memory[index] & mask != 0 {
                    self.v[0xF] = 1;
                }
                self.memory[index] ^= mask;
                changed = true;
            }
        }

        if changed {
            self.redraw = true;
        }
    }

    /// FX0A: hold PC on this instruction until a full press-then-release edge
    /// is seen on some key. Level state at entry is deliberately ignored; only
    /// transitions count.
    fn execute_wait_for_key(&mut self, x: u4) -> StepResult {
        let Some(wait) = self.key_wait.as_mut() else {
            // The wait begins: latch the current keypad so held keys don't
            // register, and re-execute this instruction next cycle.
            self.key_wait = Some(KeyWait {
                snapshot: self.keypad,
                pressed: None,
            });
            self.pc = self.pc.wrapping_sub(2);
            return StepResult::WaitForNextFrame;
        };

        if let Some(key) = wait.pressed {
            if !self.keypad[key as usize] {
                // Full press-then-release observed; the wait resolves.
                self.v[x] = key;
                self.key_wait = None;
                return StepResult::Continue;
            }
        } else {
            wait.pressed = (0..16usize)
                .find(|&key| !wait.snapshot[key] && self.keypad[key])
                .map(|key| key as u8);
            wait.snapshot = self.keypad;
        }

        self.pc = self.pc.wrapping_sub(2);
        StepResult::WaitForNextFrame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::Quirks;

    fn machine_with(rom: &[u8]) -> MachineState {
        let mut machine = MachineState::new();
        machine.load(rom).unwrap();
        machine
    }

    fn alu(x: u8, y: u8, op: OpcodeALU) -> Opcode {
        Opcode::ALU {
            x: u4::new(x),
            y: u4::new(y),
            op,
        }
    }

    #[test]
    fn add_carry_flag_exhaustive() {
        let mut machine = MachineState::new();

        for vx in 0..=255u16 {
            for vy in 0..=255u16 {
                machine.v[0] = vx as u8;
                machine.v[1] = vy as u8;
                machine.execute(0x200, alu(0, 1, OpcodeALU::Add)).unwrap();

                let sum = vx + vy;
                assert_eq!(machine.v[0], (sum % 256) as u8);
                assert_eq!(machine.v[0xF], (sum > 255) as u8);
            }
        }
    }

    #[test]
    fn sub_borrow_flag_exhaustive() {
        let mut machine = MachineState::new();

        for vx in 0..=255u8 {
            for vy in 0..=255u8 {
                machine.v[0] = vx;
                machine.v[1] = vy;
                machine.execute(0x200, alu(0, 1, OpcodeALU::Sub)).unwrap();

                assert_eq!(machine.v[0], vx.wrapping_sub(vy));
                assert_eq!(machine.v[0xF], (vx >= vy) as u8);
            }
        }
    }

    #[test]
    fn sub_reverse_inverts_operands() {
        let mut machine = MachineState::new();
        machine.v[2] = 10;
        machine.v[3] = 25;

        machine
            .execute(0x200, alu(2, 3, OpcodeALU::SubReverse))
            .unwrap();

        assert_eq!(machine.v[2], 15);
        assert_eq!(machine.v[0xF], 1);
    }

    #[test]
    fn bitwise_ops_leave_vf_alone() {
        let mut machine = MachineState::new();
        machine.v[0xF] = 1;
        machine.v[0] = 0b1100;
        machine.v[1] = 0b1010;

        machine.execute(0x200, alu(0, 1, OpcodeALU::Xor)).unwrap();

        assert_eq!(machine.v[0], 0b0110);
        assert_eq!(machine.v[0xF], 1);
    }

    #[test]
    fn shifts_operate_on_vx_by_default() {
        let mut machine = MachineState::new();
        machine.v[0] = 0b1000_0011;
        machine.v[1] = 0xFF;

        machine
            .execute(0x200, alu(0, 1, OpcodeALU::ShiftRight))
            .unwrap();
        assert_eq!(machine.v[0], 0b0100_0001);
        assert_eq!(machine.v[0xF], 1);

        machine.v[0] = 0b1000_0010;
        machine
            .execute(0x200, alu(0, 1, OpcodeALU::ShiftLeft))
            .unwrap();
        assert_eq!(machine.v[0], 0b0000_0100);
        assert_eq!(machine.v[0xF], 1);
    }

    #[test]
    fn shifts_read_vy_when_quirk_enabled() {
        let mut machine = MachineState::with_quirks(Quirks {
            shift_reads_vy: true,
            ..Quirks::default()
        });
        machine.v[0] = 0xFF;
        machine.v[1] = 0b0000_0110;

        machine
            .execute(0x200, alu(0, 1, OpcodeALU::ShiftRight))
            .unwrap();

        assert_eq!(machine.v[0], 0b0000_0011);
        assert_eq!(machine.v[0xF], 0);
        assert_eq!(machine.v[1], 0b0000_0110);
    }

    #[test]
    fn clear_display_zeroes_framebuffer_and_sets_redraw() {
        let mut machine = machine_with(&[0x00, 0xE0]);
        machine.memory[DISPLAY_START_ADDRESS..].fill(0xFF);

        machine.step().unwrap();

        assert!(machine.framebuffer().iter().all(|&byte| byte == 0));
        assert!(machine.take_redraw());
        assert!(!machine.redraw_pending());
    }

    #[test]
    fn sprite_draw_is_self_inverse() {
        let mut machine = MachineState::new();
        machine.load(&[]).unwrap();
        machine.v[0] = 10;
        machine.v[1] = 5;
        machine.i = 0; // The "0" font glyph

        let draw = Opcode::Draw {
            x: u4::new(0),
            y: u4::new(1),
            n: u4::new(5),
        };

        machine.execute(0x200, draw).unwrap();
        assert_eq!(machine.v[0xF], 0);
        assert!(machine.pixel(10, 5));
        assert!(machine.take_redraw());

        // Drawing the same sprite again erases it completely.
        machine.execute(0x200, draw).unwrap();
        assert_eq!(machine.v[0xF], 1);
        assert!(machine.framebuffer().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn sprite_draw_clips_at_screen_edges() {
        let mut machine = MachineState::new();
        machine.load(&[]).unwrap();
        machine.v[0] = 62;
        machine.v[1] = 30;
        machine.i = 0;

        machine
            .execute(
                0x200,
                Opcode::Draw {
                    x: u4::new(0),
                    y: u4::new(1),
                    n: u4::new(5),
                },
            )
            .unwrap();

        // The glyph's top row is 0xF0: only the two columns left of the edge
        // survive, and nothing wraps to the opposite side.
        assert!(machine.pixel(62, 30));
        assert!(machine.pixel(63, 30));
        assert!(machine.pixel(62, 31));
        for y in 0..DISPLAY_Y {
            assert!(!machine.pixel(0, y));
            assert!(!machine.pixel(1, y));
        }
        for x in 0..DISPLAY_X {
            assert!(!machine.pixel(x, 0));
        }
    }

    #[test]
    fn sprite_draw_wraps_when_quirk_enabled() {
        let mut machine = MachineState::with_quirks(Quirks {
            sprite_wraps: true,
            ..Quirks::default()
        });
        machine.load(&[]).unwrap();
        machine.v[0] = 62;
        machine.v[1] = 31;
        machine.i = 0;

        machine
            .execute(
                0x200,
                Opcode::Draw {
                    x: u4::new(0),
                    y: u4::new(1),
                    n: u4::new(2),
                },
            )
            .unwrap();

        // Top row of the glyph is 0xF0 at (62, 31): two pixels stay, two wrap
        // to x=0..1; the second row wraps to y=0.
        assert!(machine.pixel(62, 31));
        assert!(machine.pixel(0, 31));
        assert!(machine.pixel(1, 31));
        assert!(machine.pixel(62, 0));
    }

    #[test]
    fn coordinates_are_masked_before_drawing() {
        let mut machine = MachineState::new();
        machine.load(&[]).unwrap();
        machine.v[0] = 64 + 3;
        machine.v[1] = 32 + 2;
        machine.i = 0;

        machine
            .execute(
                0x200,
                Opcode::Draw {
                    x: u4::new(0),
                    y: u4::new(1),
                    n: u4::new(1),
                },
            )
            .unwrap();

        assert!(machine.pixel(3, 2));
    }

    #[test]
    fn store_load_round_trips_and_advances_index() {
        let mut machine = MachineState::new();
        let values = [3, 1, 4, 1, 5];
        machine.v[..5].copy_from_slice(&values);
        machine.i = 0x300;

        machine
            .execute(0x200, Opcode::StoreRegs { x: u4::new(4) })
            .unwrap();
        assert_eq!(machine.i, 0x305);
        assert_eq!(machine.memory[0x300..0x305], values);

        machine.v[..5].copy_from_slice(&[0; 5]);
        machine.i = 0x300;
        machine
            .execute(0x200, Opcode::LoadRegs { x: u4::new(4) })
            .unwrap();

        assert_eq!(machine.v[..5], values);
        assert_eq!(machine.i, 0x305);
    }

    #[test]
    fn store_load_leave_index_when_quirk_disabled() {
        let mut machine = MachineState::with_quirks(Quirks {
            load_store_increments_i: false,
            ..Quirks::default()
        });
        machine.v[0] = 42;
        machine.i = 0x300;

        machine
            .execute(0x200, Opcode::StoreRegs { x: u4::new(0) })
            .unwrap();
        machine
            .execute(0x200, Opcode::LoadRegs { x: u4::new(0) })
            .unwrap();

        assert_eq!(machine.i, 0x300);
        assert_eq!(machine.v[0], 42);
    }

    #[test]
    fn bcd_stores_decimal_digits() {
        let mut machine = MachineState::new();
        machine.v[7] = 254;
        machine.i = 0x400;

        machine.execute(0x200, Opcode::BCD { x: u4::new(7) }).unwrap();

        assert_eq!(machine.memory[0x400..0x403], [2, 5, 4]);
    }

    #[test]
    fn font_char_points_index_at_glyph() {
        let mut machine = MachineState::new();
        machine.load(&[]).unwrap();
        machine.v[2] = 0x1A; // Only the low nibble selects the glyph

        machine
            .execute(0x200, Opcode::FontChar { x: u4::new(2) })
            .unwrap();

        assert_eq!(machine.i, 0xA * 5);
        assert_eq!(machine.read(machine.i), 0xF0);
    }

    #[test]
    fn add_index_wraps_mod_4096() {
        let mut machine = MachineState::new();
        machine.i = 0xFFF;
        machine.v[0] = 2;

        machine
            .execute(0x200, Opcode::AddIndexReg { x: u4::new(0) })
            .unwrap();

        assert_eq!(machine.i, 0x001);
    }

    #[test]
    fn timer_opcodes_transfer_values() {
        let mut machine = MachineState::new();
        machine.v[3] = 77;

        machine
            .execute(0x200, Opcode::SetDelayTimer { x: u4::new(3) })
            .unwrap();
        machine
            .execute(0x200, Opcode::SetSoundTimer { x: u4::new(3) })
            .unwrap();
        machine
            .execute(0x200, Opcode::ReadDelayTimer { x: u4::new(4) })
            .unwrap();

        assert_eq!(machine.delay_timer, 77);
        assert_eq!(machine.sound_timer, 77);
        assert_eq!(machine.v[4], 77);
        assert!(machine.should_beep());
    }

    #[test]
    fn skips_advance_pc_by_two_extra() {
        // 3005: skip if V0 == 05 (taken), then 4005: skip if V0 != 05 (not taken)
        let mut machine = machine_with(&[0x30, 0x05, 0xFF, 0xFF, 0x40, 0x05]);
        machine.v[0] = 5;

        machine.step().unwrap();
        assert_eq!(machine.pc, 0x204);

        machine.step().unwrap();
        assert_eq!(machine.pc, 0x206);
    }

    #[test]
    fn key_skips_consult_the_keypad() {
        let mut machine = MachineState::new();
        machine.v[0] = 0xB;
        machine.set_key(u4::new(0xB), true);
        machine.pc = 0x202;

        machine
            .execute(0x200, Opcode::SkipIfPressed { x: u4::new(0) })
            .unwrap();
        assert_eq!(machine.pc, 0x204);

        machine
            .execute(0x202, Opcode::SkipIfNotPressed { x: u4::new(0) })
            .unwrap();
        assert_eq!(machine.pc, 0x204);
    }

    #[test]
    fn call_and_return_use_the_in_memory_stack() {
        let mut machine = machine_with(&[0x23, 0x00]);
        machine.memory[0x300] = 0x00;
        machine.memory[0x301] = 0xEE;

        machine.step().unwrap();
        assert_eq!(machine.pc, 0x300);
        assert_eq!(machine.stack_frames(), vec![0x202]);

        machine.step().unwrap();
        assert_eq!(machine.pc, 0x202);
        assert!(machine.stack_frames().is_empty());
    }

    #[test]
    fn self_jump_sets_halt() {
        let mut machine = machine_with(&[0x12, 0x00]);

        machine.step().unwrap();

        assert!(machine.halted());
        assert_eq!(machine.pc, 0x200);
    }

    #[test]
    fn self_jump_with_offset_sets_halt() {
        let mut machine = machine_with(&[0xB1, 0xF0]);
        machine.v[0] = 0x10;

        machine.step().unwrap();

        assert!(machine.halted());
    }

    #[test]
    fn self_jump_quirk_can_be_disabled() {
        let mut machine = MachineState::with_quirks(Quirks {
            jump_to_self_halts: false,
            ..Quirks::default()
        });
        machine.load(&[0x12, 0x00]).unwrap();

        machine.step().unwrap();

        assert!(!machine.halted());
        assert_eq!(machine.pc, 0x200);
    }

    #[test]
    fn unknown_opcode_reports_address_and_word() {
        let mut machine = machine_with(&[0x5A, 0xB1]);

        let err = machine.step().unwrap_err();

        assert!(matches!(
            err,
            MachineError::UnimplementedOpcode {
                address: 0x200,
                opcode: 0x5AB1
            }
        ));
    }

    #[test]
    fn key_wait_holds_pc_without_a_transition() {
        let mut machine = machine_with(&[0xF0, 0x0A]);

        for _ in 0..3 {
            machine.step().unwrap();
            assert_eq!(machine.pc, 0x200);
        }
    }

    #[test]
    fn key_wait_ignores_a_press_without_release() {
        let mut machine = machine_with(&[0xF0, 0x0A]);
        machine.step().unwrap();

        machine.set_key(u4::new(5), true);
        for _ in 0..3 {
            machine.step().unwrap();
            assert_eq!(machine.pc, 0x200);
        }
        assert_eq!(machine.v[0], 0);
    }

    #[test]
    fn key_wait_resolves_on_press_then_release() {
        let mut machine = machine_with(&[0xF0, 0x0A]);
        machine.step().unwrap();

        machine.set_key(u4::new(5), true);
        machine.step().unwrap();

        machine.set_key(u4::new(5), false);
        machine.step().unwrap();

        assert_eq!(machine.v[0], 5);
        assert_eq!(machine.pc, 0x202);
        assert!(machine.key_wait.is_none());
    }

    #[test]
    fn key_wait_ignores_keys_held_at_entry() {
        let mut machine = machine_with(&[0xF0, 0x0A]);
        machine.set_key(u4::new(2), true);

        // The held key never produces a 0->1 edge, so it cannot resolve the
        // wait, even after it is released.
        for _ in 0..3 {
            machine.step().unwrap();
        }
        machine.set_key(u4::new(2), false);
        machine.step().unwrap();
        assert_eq!(machine.pc, 0x200);

        // A fresh press-then-release of the same key does resolve it.
        machine.set_key(u4::new(2), true);
        machine.step().unwrap();
        machine.set_key(u4::new(2), false);
        machine.step().unwrap();

        assert_eq!(machine.v[0], 2);
        assert_eq!(machine.pc, 0x202);
    }

    #[test]
    fn random_applies_the_mask() {
        let mut machine = MachineState::new();

        machine
            .execute(
                0x200,
                Opcode::Random {
                    x: u4::new(0),
                    nn: 0x0F,
                },
            )
            .unwrap();

        assert_eq!(machine.v[0] & 0xF0, 0);
    }

    #[test]
    fn program_of_set_and_add_runs_end_to_end() {
        let mut machine = machine_with(&[0x60, 0x05, 0x70, 0x03]);

        machine.step().unwrap();
        machine.step().unwrap();

        assert_eq!(machine.v[0], 8);
        assert_eq!(machine.pc, 0x204);
        assert_eq!(machine.v[0xF], 0);
    }

    #[test]
    fn set_index_program_runs_end_to_end() {
        let mut machine = machine_with(&[0xA2, 0x20]);

        machine.step().unwrap();

        assert_eq!(machine.i, 0x220);
    }
}
