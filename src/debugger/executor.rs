use super::commands::{BreakpointAction, Command, CommandError, CommandResult, SetTarget};
use crate::emu::{MachineError, Runner, RunnerResult, Trace};
use std::collections::HashSet;

/// Applies debugger commands to the runner and drives execution while the
/// debugger is in running mode.
pub struct Executor {
    is_running: bool,
    runner: Runner,
    breakpoints: HashSet<u16>,
}

impl Executor {
    pub fn new(runner: Runner) -> Self {
        Self {
            is_running: false,
            runner,
            breakpoints: HashSet::new(),
        }
    }

    pub fn poll(&mut self, dt: f32) -> Result<RunnerResult, MachineError> {
        if !self.is_running {
            return Ok(RunnerResult::Ok);
        }

        let result = self
            .runner
            .update_with_breakpoints(dt, Some(&self.breakpoints));

        if matches!(result, Err(_) | Ok(RunnerResult::HitBreakpoint)) {
            self.is_running = false;
        }

        result
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.is_running = true;
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.is_running = false;
                Ok(CommandResult::Ok)
            }
            Command::Step => self.execute_step(),
            Command::Breakpoint { action } => self.handle_breakpoint(action),
            Command::Set { target, value } => self.handle_set(target, value),
            Command::Mem { start, len } => Ok(CommandResult::MemDump {
                data: (0..len)
                    .map(|offset| self.machine().read(start.wrapping_add(offset)))
                    .collect(),
                offset: start,
            }),
            Command::Disasm { start, len } => Ok(CommandResult::Disasm(
                (0..len)
                    .map(|index| {
                        let addr = start.wrapping_add(index * 2);
                        let bytes = [
                            self.machine().read(addr),
                            self.machine().read(addr.wrapping_add(1)),
                        ];
                        Trace::disassemble(addr, bytes)
                    })
                    .collect(),
            )),
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    fn execute_step(&mut self) -> Result<CommandResult, CommandError> {
        if !self.machine().halted() {
            self.runner.machine_mut().step()?;
        }
        Ok(CommandResult::Ok)
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.machine().pixel(x, y)
    }

    pub fn pc(&self) -> u16 {
        self.machine().pc
    }

    pub fn index(&self) -> u16 {
        self.machine().i
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.machine().v
    }

    pub fn stack_frames(&self) -> Vec<u16> {
        self.machine().stack_frames()
    }

    pub fn delay_timer(&self) -> u8 {
        self.machine().delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.machine().sound_timer
    }

    pub fn keypad(&self) -> &[bool; 16] {
        &self.machine().keypad
    }

    pub fn runner_mut(&mut self) -> &mut Runner {
        &mut self.runner
    }

    fn machine(&self) -> &crate::emu::MachineState {
        self.runner.machine_ref()
    }

    fn handle_breakpoint(
        &mut self,
        action: BreakpointAction,
    ) -> Result<CommandResult, CommandError> {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut breakpoints: Vec<u16> = self.breakpoints.iter().cloned().collect();
                breakpoints.sort();
                return Ok(CommandResult::Breakpoints(breakpoints));
            }
        };

        Ok(CommandResult::Ok)
    }

    fn handle_set(&mut self, target: SetTarget, value: u16) -> Result<CommandResult, CommandError> {
        let machine = self.runner.machine_mut();

        match target {
            SetTarget::V(reg) => {
                if value > 0xFF {
                    return Err(CommandError::ValueOutOfRange);
                }
                machine.v[reg] = value as u8;
            }
            SetTarget::I => {
                machine.i = value;
            }
            SetTarget::Pc => {
                machine.pc = value;
            }
        }

        Ok(CommandResult::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::MachineState;
    use crate::u4;

    fn executor_with(rom: &[u8]) -> Executor {
        let mut machine = MachineState::new();
        machine.load(rom).unwrap();
        Executor::new(Runner::with_cpu_hz(machine, 64.0))
    }

    #[test]
    fn step_executes_one_instruction() {
        let mut executor = executor_with(&[0x60, 0x05]);

        executor.execute(Command::Step).unwrap();

        assert_eq!(executor.registers()[0], 5);
        assert_eq!(executor.pc(), 0x202);
    }

    #[test]
    fn step_is_a_no_op_once_halted() {
        let mut executor = executor_with(&[0x12, 0x00]);

        executor.execute(Command::Step).unwrap();
        executor.execute(Command::Step).unwrap();

        assert_eq!(executor.pc(), 0x200);
    }

    #[test]
    fn poll_pauses_on_breakpoint() {
        let mut executor = executor_with(&[0x70, 0x01, 0x12, 0x00]);
        executor
            .execute(Command::Breakpoint {
                action: BreakpointAction::Set { addr: 0x202 },
            })
            .unwrap();
        executor.execute(Command::Run).unwrap();

        let result = executor.poll(1.0).unwrap();

        assert!(matches!(result, RunnerResult::HitBreakpoint));
        assert!(!executor.is_running());
    }

    #[test]
    fn breakpoint_list_is_sorted() {
        let mut executor = executor_with(&[]);
        for addr in [0x400u16, 0x200, 0x300] {
            executor
                .execute(Command::Breakpoint {
                    action: BreakpointAction::Set { addr },
                })
                .unwrap();
        }

        let result = executor
            .execute(Command::Breakpoint {
                action: BreakpointAction::List,
            })
            .unwrap();

        assert!(
            matches!(result, CommandResult::Breakpoints(bps) if bps == vec![0x200, 0x300, 0x400])
        );
    }

    #[test]
    fn set_rejects_oversized_register_values() {
        let mut executor = executor_with(&[]);

        let result = executor.execute(Command::Set {
            target: SetTarget::V(u4::new(0)),
            value: 0x100,
        });

        assert!(matches!(result, Err(CommandError::ValueOutOfRange)));
    }

    #[test]
    fn mem_dump_reads_loaded_rom() {
        let mut executor = executor_with(&[0xA2, 0x20]);

        let result = executor
            .execute(Command::Mem {
                start: 0x200,
                len: 2,
            })
            .unwrap();

        assert!(matches!(
            result,
            CommandResult::MemDump { data, offset: 0x200 } if data == vec![0xA2, 0x20]
        ));
    }

    #[test]
    fn disasm_walks_instruction_words() {
        let mut executor = executor_with(&[0x60, 0x05, 0x70, 0x03]);

        let result = executor
            .execute(Command::Disasm {
                start: 0x200,
                len: 2,
            })
            .unwrap();

        let CommandResult::Disasm(traces) = result else {
            panic!("expected disasm result");
        };
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].mnemonic, "MVI");
        assert_eq!(traces[1].mnemonic, "ADI");
        assert_eq!(traces[1].address, 0x202);
    }
}
