use super::{MachineError, MachineState, StepResult};
use crate::u4;
use std::collections::HashSet;

/// Default instruction rate, matching the original machine's tuning.
pub const DEFAULT_CPU_HZ: f32 = 700.0;
/// The delay and sound timers always tick at 60Hz, regardless of CPU rate.
pub const TIMER_HZ: f32 = 60.0;

const TIMER_TIME_STEP: f32 = 1.0 / TIMER_HZ;

/// High-level runner that overlays the instruction clock and the 60Hz timer
/// clock on the machine, driven by external "advance by dt" calls.
pub struct Runner {
    machine: MachineState,
    cpu_time_step: f32,
    cpu_dt_accumulator: f32,
    timer_dt_accumulator: f32,
}

pub enum RunnerResult {
    Ok,
    HitBreakpoint,
}

impl Runner {
    pub fn new(machine: MachineState) -> Self {
        Self::with_cpu_hz(machine, DEFAULT_CPU_HZ)
    }

    pub fn with_cpu_hz(machine: MachineState, cpu_hz: f32) -> Self {
        Self {
            machine,
            cpu_time_step: 1.0 / cpu_hz,
            cpu_dt_accumulator: 0.0,
            timer_dt_accumulator: 0.0,
        }
    }

    /// Advance the machine by delta time, handling both CPU and timer cycles.
    ///
    /// Executes as many steps as the elapsed time covers, carrying the
    /// fractional remainder forward; ticks the timers once per accumulated
    /// 1/60s, consuming only the whole portions so neither clock drifts.
    pub fn update(&mut self, dt: f32) -> Result<RunnerResult, MachineError> {
        self.update_with_breakpoints(dt, None)
    }

    /// Like `update` but pauses when PC lands on a breakpoint.
    pub fn update_with_breakpoints(
        &mut self,
        dt: f32,
        breakpoints: Option<&HashSet<u16>>,
    ) -> Result<RunnerResult, MachineError> {
        self.cpu_dt_accumulator += dt;
        self.timer_dt_accumulator += dt;

        while self.timer_dt_accumulator >= TIMER_TIME_STEP {
            self.timer_dt_accumulator -= TIMER_TIME_STEP;
            self.machine.timers_cycle();
        }

        while self.cpu_dt_accumulator >= self.cpu_time_step {
            self.cpu_dt_accumulator -= self.cpu_time_step;

            // Once halted (idle loop or external quit), no instruction runs.
            if self.machine.halted() {
                self.cpu_dt_accumulator = 0.0;
                break;
            }

            let result = self.machine.step()?;

            if let Some(breakpoints) = &breakpoints
                && breakpoints.contains(&self.machine.pc)
            {
                self.cpu_dt_accumulator = 0.0;
                return Ok(RunnerResult::HitBreakpoint);
            }

            match result {
                StepResult::WaitForNextFrame => {
                    // Stop the batch so the frontend can present the frame.
                    // The accumulator is cleared to avoid catching up too fast
                    // in the next frame.
                    self.cpu_dt_accumulator = 0.0;
                    break;
                }
                StepResult::Continue => {}
            }
        }

        Ok(RunnerResult::Ok)
    }

    /// Returns true while the sound timer is active.
    pub fn should_beep(&self) -> bool {
        self.machine.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.machine.set_key(key, pressed)
    }

    /// Get the state of a display pixel (true = on).
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.machine.pixel(x, y)
    }

    pub fn machine_ref(&self) -> &MachineState {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut MachineState {
        &mut self.machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // V0 += 1, then jump back: two instructions per loop iteration.
    const COUNTING_LOOP: [u8; 4] = [0x70, 0x01, 0x12, 0x00];

    fn runner_with(rom: &[u8], cpu_hz: f32) -> Runner {
        let mut machine = MachineState::new();
        machine.load(rom).unwrap();
        Runner::with_cpu_hz(machine, cpu_hz)
    }

    #[test]
    fn executes_rate_times_dt_instructions() {
        // 64Hz with dt an exact multiple of the step keeps the float
        // arithmetic exact: 0.5s covers exactly 32 instructions.
        let mut runner = runner_with(&COUNTING_LOOP, 64.0);

        runner.update(0.5).unwrap();

        assert_eq!(runner.machine_ref().v[0], 16);
    }

    #[test]
    fn carries_fractional_remainder_between_updates() {
        let mut runner = runner_with(&COUNTING_LOOP, 64.0);
        let half_step = 1.0 / 128.0;

        // Half an instruction's worth of time: nothing runs yet.
        runner.update(half_step).unwrap();
        assert_eq!(runner.machine_ref().pc, 0x200);

        // The remainder carries, so the second half completes one step.
        runner.update(half_step).unwrap();
        assert_eq!(runner.machine_ref().v[0], 1);
        assert_eq!(runner.machine_ref().pc, 0x202);
    }

    #[test]
    fn timers_tick_once_per_sixtieth_of_a_second() {
        let mut runner = runner_with(&COUNTING_LOOP, 64.0);
        runner.machine_mut().delay_timer = 3;
        runner.machine_mut().sound_timer = 1;

        runner.update(1.0 / TIMER_HZ).unwrap();
        assert_eq!(runner.machine_ref().delay_timer, 2);
        assert_eq!(runner.machine_ref().sound_timer, 0);

        // Floor at zero, never negative.
        for _ in 0..10 {
            runner.update(1.0 / TIMER_HZ).unwrap();
        }
        assert_eq!(runner.machine_ref().delay_timer, 0);
        assert_eq!(runner.machine_ref().sound_timer, 0);
    }

    #[test]
    fn timer_rate_is_independent_of_cpu_rate() {
        for cpu_hz in [64.0, 1024.0] {
            let mut runner = runner_with(&COUNTING_LOOP, cpu_hz);
            runner.machine_mut().delay_timer = 60;

            for _ in 0..45 {
                runner.update(1.0 / TIMER_HZ).unwrap();
            }

            assert_eq!(runner.machine_ref().delay_timer, 15);
        }
    }

    #[test]
    fn halt_stops_all_further_execution() {
        let mut runner = runner_with(&[0x12, 0x00], 64.0);

        runner.update(1.0).unwrap();

        assert!(runner.machine_ref().halted());
        assert_eq!(runner.machine_ref().pc, 0x200);

        // Further updates execute nothing, but don't error either.
        runner.update(1.0).unwrap();
        assert_eq!(runner.machine_ref().pc, 0x200);
    }

    #[test]
    fn external_halt_request_is_honored_before_any_step() {
        let mut runner = runner_with(&COUNTING_LOOP, 64.0);
        runner.machine_mut().request_halt();

        runner.update(1.0).unwrap();

        assert_eq!(runner.machine_ref().v[0], 0);
        assert_eq!(runner.machine_ref().pc, 0x200);
    }

    #[test]
    fn draw_ends_the_batch_early() {
        // D001 draws, then the counting loop would run; the draw must end the
        // update so the frame can be presented first.
        let mut runner = runner_with(&[0xD0, 0x01, 0x70, 0x01, 0x12, 0x02], 64.0);

        runner.update(1.0).unwrap();

        assert_eq!(runner.machine_ref().pc, 0x202);
        assert_eq!(runner.machine_ref().v[0], 0);
    }

    #[test]
    fn breakpoint_pauses_execution() {
        let mut runner = runner_with(&COUNTING_LOOP, 64.0);
        let breakpoints = HashSet::from([0x202u16]);

        let result = runner
            .update_with_breakpoints(1.0, Some(&breakpoints))
            .unwrap();

        assert!(matches!(result, RunnerResult::HitBreakpoint));
        assert_eq!(runner.machine_ref().pc, 0x202);
        assert_eq!(runner.machine_ref().v[0], 1);
    }

    #[test]
    fn unknown_opcode_surfaces_as_an_error() {
        let mut runner = runner_with(&[0xFF, 0xFF], 64.0);

        assert!(matches!(
            runner.update(1.0),
            Err(MachineError::UnimplementedOpcode {
                address: 0x200,
                opcode: 0xFFFF
            })
        ));
    }
}
