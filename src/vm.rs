//! The virtual machine: register file, call stacks, the 64-thread
//! cooperative scheduler and the tic loop tying every subsystem together.

pub mod ops;

use std::sync::{Arc, Mutex};

use tracing::{debug, info, trace};

use crate::audio::{Audio, ClassicMixer};
use crate::errors::{Error, Result};
use crate::gfx::Video;
use crate::host::Host;
use crate::input::{ButtonState, LeftRightDir, UpDownDir, UserInput};
use crate::parts::GamePart;
use crate::res::{ResourceManager, ResourceRepository};

pub const NUM_THREADS: usize = 64;
pub const NUM_REGISTERS: usize = 256;

/// Watchdog against malformed bytecode: a thread executing more than this
/// many instructions in one tic is considered stuck.
pub const DEFAULT_INSTRUCTION_BUDGET: usize = 10_000;

/// Well-known register ids.
pub mod regs {
    /// Seeded at machine construction so scripts can randomize.
    pub const RANDOM_SEED: u8 = 0x3c;
    /// Last character typed, observed by the password-entry part.
    pub const LAST_KEYCHAR: u8 = 0xda;
    /// Vertical input direction, -1/0/+1.
    pub const HERO_POS_UP_DOWN: u8 = 0xe5;
    /// Written from the music sheet to synchronize scripts with playback.
    pub const MUSIC_SYNC: u8 = 0xf4;
    /// Zeroed every time a frame is presented.
    pub const FRAME_COUNTER: u8 = 0xf7;
    /// Vertical scroll applied by flagged buffer copies.
    pub const SCROLL_Y: u8 = 0xf9;
    /// Action button state, 0/1.
    pub const HERO_ACTION: u8 = 0xfa;
    /// Mirror of the vertical direction, kept for the jump/crouch logic.
    pub const HERO_POS_JUMP_DOWN: u8 = 0xfb;
    /// Horizontal input direction, -1/0/+1.
    pub const HERO_POS_LEFT_RIGHT: u8 = 0xfc;
    /// Direction bits: right 1, left 2, down 4, up 8.
    pub const HERO_POS_MASK: u8 = 0xfd;
    /// Direction bits plus 0x80 when the action button is down.
    pub const HERO_ACTION_POS_MASK: u8 = 0xfe;
    /// Frames the game wants to wait before presenting, ×20 ms.
    pub const FRAME_DURATION: u8 = 0xff;
}

/// The 256 registers. The canonical view is signed 16-bit; the unsigned
/// accessors reinterpret the same bits for the logical instructions.
#[derive(Clone)]
pub struct Registers([i16; NUM_REGISTERS]);

impl Registers {
    fn new() -> Registers {
        Registers([0; NUM_REGISTERS])
    }

    pub fn signed(&self, id: u8) -> i16 {
        self.0[id as usize]
    }

    pub fn set_signed(&mut self, id: u8, value: i16) {
        self.0[id as usize] = value;
    }

    pub fn unsigned(&self, id: u8) -> u16 {
        self.0[id as usize] as u16
    }

    pub fn set_unsigned(&mut self, id: u8, value: u16) {
        self.0[id as usize] = value as i16;
    }
}

/// Call stack bound of the original interpreter.
pub const MAX_CALL_DEPTH: usize = 64;

/// Per-thread stack of return addresses.
#[derive(Clone, Debug, Default)]
pub struct CallStack {
    frames: Vec<u16>,
}

impl CallStack {
    pub fn push(&mut self, addr: u16) -> Result<()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(Error::StackOverflow);
        }
        self.frames.push(addr);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16> {
        self.frames.pop().ok_or(Error::StackUnderflow)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Where a thread stands in its program, if anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Execution {
    Inactive,
    Active(u16),
}

/// One scheduler entry. State transitions requested by instructions are
/// stored in the `scheduled_*` fields and only become current at the top
/// of the next tic, so a tic never observes its own control-flow edits.
#[derive(Clone, Debug)]
pub struct Thread {
    execution: Execution,
    paused: bool,
    scheduled_execution: Option<Execution>,
    scheduled_pause: Option<bool>,
    call_stack: CallStack,
}

impl Default for Thread {
    fn default() -> Thread {
        Thread {
            execution: Execution::Inactive,
            paused: false,
            scheduled_execution: None,
            scheduled_pause: None,
            call_stack: CallStack::default(),
        }
    }
}

impl Thread {
    pub fn execution(&self) -> Execution {
        self.execution
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn scheduled_execution(&self) -> Option<Execution> {
        self.scheduled_execution
    }

    pub fn scheduled_pause(&self) -> Option<bool> {
        self.scheduled_pause
    }

    /// Move the scheduled transitions, if any, into the current state.
    /// An applied activation starts from a clean call stack.
    fn apply_scheduled(&mut self) {
        if let Some(execution) = self.scheduled_execution.take() {
            self.execution = execution;
            self.call_stack.clear();
        }
        if let Some(paused) = self.scheduled_pause.take() {
            self.paused = paused;
        }
    }
}

/// Byte-addressable cursor over the current bytecode. Every read advances
/// it; jumps must stay inside the program.
pub struct ProgramCursor<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> ProgramCursor<'a> {
    pub fn new(code: &'a [u8], addr: u16) -> Result<ProgramCursor<'a>> {
        let mut cursor = ProgramCursor { code, pos: 0 };
        cursor.jump(addr)?;
        Ok(cursor)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self
            .code
            .get(self.pos)
            .copied()
            .ok_or(Error::EndOfProgram)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(((self.read_u8()? as u16) << 8) | self.read_u8()? as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn jump(&mut self, addr: u16) -> Result<()> {
        if (addr as usize) >= self.code.len() {
            return Err(Error::InvalidAddress(addr));
        }
        self.pos = addr as usize;
        Ok(())
    }

    pub fn position(&self) -> u16 {
        self.pos as u16
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.code.len()
    }
}

/// The mutable machine state instructions operate on, separated from the
/// passive subsystems so an executing instruction can borrow both.
pub struct MachineState {
    pub(crate) regs: Registers,
    pub(crate) threads: [Thread; NUM_THREADS],
    pub(crate) scheduled_part: Option<GamePart>,
    pub(crate) current_part: Option<GamePart>,
}

impl MachineState {
    fn new(seed: u16) -> MachineState {
        let mut regs = Registers::new();
        // Startup values the original scripts rely on.
        regs.set_signed(0x54, 0x81);
        regs.set_unsigned(regs::RANDOM_SEED, seed);
        regs.set_signed(0xbc, 0x10);
        regs.set_unsigned(0xc6, 0x80);
        regs.set_signed(0xf2, 4000);
        regs.set_signed(0xdc, 33);

        MachineState {
            regs,
            threads: std::array::from_fn(|_| Thread::default()),
            scheduled_part: None,
            current_part: None,
        }
    }
}

/// The whole machine: scheduler state plus exclusively-owned subsystems.
///
/// Hosts construct one per game, call [`Machine::run_tic`] once per frame
/// and pull PCM from the handle returned by [`Machine::mixer`].
pub struct Machine {
    state: MachineState,
    /// Bytecode of the current game part.
    code: Vec<u8>,
    res: ResourceManager,
    video: Video,
    audio: Audio,
    instruction_budget: usize,
    tic: u64,
}

impl Machine {
    pub fn new(repository: Box<dyn ResourceRepository>, seed: u16) -> Result<Machine> {
        Ok(Machine {
            state: MachineState::new(seed),
            code: Vec::new(),
            res: ResourceManager::new(repository)?,
            video: Video::new(),
            audio: Audio::new(),
            instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
            tic: 0,
        })
    }

    /// Ask for `part` to be loaded at the top of the next tic.
    pub fn schedule_part(&mut self, part: GamePart) {
        self.state.scheduled_part = Some(part);
    }

    pub fn scheduled_part(&self) -> Option<GamePart> {
        self.state.scheduled_part
    }

    pub fn current_part(&self) -> Option<GamePart> {
        self.state.current_part
    }

    pub fn register(&self, id: u8) -> i16 {
        self.state.regs.signed(id)
    }

    pub fn thread(&self, id: u8) -> &Thread {
        &self.state.threads[id as usize]
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.res
    }

    pub fn video(&self) -> &Video {
        &self.video
    }

    /// Shared mixer handle for the host's audio callback.
    pub fn mixer(&self) -> Arc<Mutex<ClassicMixer>> {
        self.audio.mixer()
    }

    /// Current music pattern delay, observable for tests and hosts.
    pub fn music_delay(&self) -> u16 {
        self.audio.music_delay()
    }

    pub fn set_instruction_budget(&mut self, budget: usize) {
        self.instruction_budget = budget;
    }

    /// Run one tic: load any scheduled part, apply input, apply deferred
    /// thread transitions, then run every active thread in id order.
    #[tracing::instrument(skip(self, input, host), fields(tic = self.tic))]
    pub fn run_tic(&mut self, input: &UserInput, host: &mut dyn Host) -> Result<()> {
        if let Some(part) = self.state.scheduled_part.take() {
            self.load_part(part)?;
        }

        self.apply_input(input);

        for thread in self.state.threads.iter_mut() {
            thread.apply_scheduled();
        }

        if let Some(sync) = self.audio.tick() {
            self.state.regs.set_signed(regs::MUSIC_SYNC, sync);
        }

        for id in 0..NUM_THREADS {
            let thread = &self.state.threads[id];
            if thread.paused {
                continue;
            }
            let Execution::Active(addr) = thread.execution else {
                continue;
            };
            trace!("running thread {:02x} @{:04x}", id, addr);
            self.run_thread(id as u8, addr, host)?;
        }

        self.tic += 1;
        Ok(())
    }

    /// Execute one thread until it yields, dies, or trips the watchdog.
    fn run_thread(&mut self, thread_id: u8, addr: u16, host: &mut dyn Host) -> Result<()> {
        let mut cursor = ProgramCursor::new(&self.code, addr)?;
        let mut executed = 0usize;

        loop {
            if executed >= self.instruction_budget {
                return Err(Error::ThreadStalled(thread_id));
            }

            let instruction = ops::Instruction::decode(&mut cursor)?;
            trace!(
                "thread {:02x} @{:04x}: {:?}",
                thread_id,
                cursor.position(),
                instruction
            );

            let mut ctx = ops::OpContext {
                state: &mut self.state,
                res: &mut self.res,
                video: &mut self.video,
                audio: &mut self.audio,
                host: &mut *host,
            };
            match instruction.execute(thread_id, &mut cursor, &mut ctx)? {
                ops::Action::Continue => executed += 1,
                ops::Action::Yield => {
                    let position = cursor.position();
                    self.state.threads[thread_id as usize].execution = Execution::Active(position);
                    debug!("thread {:02x} yielded @{:04x}", thread_id, position);
                    break;
                }
                ops::Action::Deactivate => {
                    self.state.threads[thread_id as usize].execution = Execution::Inactive;
                    debug!("thread {:02x} ended", thread_id);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Load `part` and reset the scheduler: every thread inactive and
    /// running with a clean stack, except the main thread which starts at
    /// address 0.
    fn load_part(&mut self, part: GamePart) -> Result<()> {
        info!(?part, "switching game part");

        let assets = self.res.load_part(part)?;
        self.code = assets.bytecode;
        self.video
            .set_part_data(assets.palettes, assets.polygons, assets.animations);
        self.audio.reset();

        for thread in self.state.threads.iter_mut() {
            *thread = Thread::default();
        }
        self.state.threads[0].execution = Execution::Active(0);
        self.state.current_part = Some(part);
        // Another value the original scripts expect after a part switch.
        self.state.regs.set_signed(0xe4, 0x14);

        Ok(())
    }

    /// Write the input snapshot into the well-known registers and handle
    /// the password-screen request.
    fn apply_input(&mut self, input: &UserInput) {
        let regs = &mut self.state.regs;
        let mut mask = 0i16;

        regs.set_signed(
            regs::HERO_POS_UP_DOWN,
            match input.vertical {
                UpDownDir::Up => {
                    mask |= 0x8;
                    -1
                }
                UpDownDir::Neutral => 0,
                UpDownDir::Down => {
                    mask |= 0x4;
                    1
                }
            },
        );
        regs.set_signed(
            regs::HERO_POS_JUMP_DOWN,
            regs.signed(regs::HERO_POS_UP_DOWN),
        );

        regs.set_signed(
            regs::HERO_POS_LEFT_RIGHT,
            match input.horizontal {
                LeftRightDir::Left => {
                    mask |= 0x2;
                    -1
                }
                LeftRightDir::Neutral => 0,
                LeftRightDir::Right => {
                    mask |= 0x1;
                    1
                }
            },
        );
        regs.set_signed(regs::HERO_POS_MASK, mask);

        regs.set_signed(
            regs::HERO_ACTION,
            match input.action {
                ButtonState::Released => 0,
                ButtonState::Pushed => {
                    mask |= 0x80u8 as i16;
                    1
                }
            },
        );
        regs.set_signed(regs::HERO_ACTION_POS_MASK, mask);

        if self.state.current_part == Some(GamePart::Password) {
            if let Some(c) = input.last_char {
                if c.is_ascii() {
                    regs.set_signed(regs::LAST_KEYCHAR, c.to_ascii_uppercase() as i16);
                }
            }
        }

        if input.request_password_screen {
            if let Some(part) = self.state.current_part {
                if part.allows_password_screen() {
                    info!("password screen requested");
                    self.state.scheduled_part = Some(GamePart::Password);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::host::NullHost;
    use crate::res::{ResourceDescriptor, ResourceKind};

    /// In-memory repository with one blob per resource id. Descriptors
    /// carry their id in `bank_offset` so reads can find their blob.
    struct TaggedRepository {
        blobs: Vec<(ResourceKind, Vec<u8>)>,
    }

    impl ResourceRepository for TaggedRepository {
        fn descriptors(&self) -> Result<Vec<ResourceDescriptor>> {
            Ok(self
                .blobs
                .iter()
                .enumerate()
                .map(|(id, (kind, data))| ResourceDescriptor {
                    kind: *kind,
                    bank_id: 1,
                    bank_offset: id as u32,
                    packed_size: data.len(),
                    size: data.len(),
                })
                .collect())
        }

        fn read_raw(&self, desc: &ResourceDescriptor, dest: &mut [u8]) -> Result<()> {
            let (_, data) = &self.blobs[desc.bank_offset as usize];
            dest.copy_from_slice(&data[..dest.len()]);
            Ok(())
        }
    }

    /// Bytecode assembler for tests.
    #[derive(Default)]
    struct Assembler(Vec<u8>);

    impl Assembler {
        fn op(mut self, bytes: &[u8]) -> Self {
            self.0.extend_from_slice(bytes);
            self
        }

        fn seti(self, reg: u8, value: i16) -> Self {
            let [hi, lo] = value.to_be_bytes();
            self.op(&[0x00, reg, hi, lo])
        }

        fn addi(self, reg: u8, value: i16) -> Self {
            let [hi, lo] = value.to_be_bytes();
            self.op(&[0x03, reg, hi, lo])
        }

        fn jnz(self, reg: u8, addr: u16) -> Self {
            let [hi, lo] = addr.to_be_bytes();
            self.op(&[0x09, reg, hi, lo])
        }

        fn control_threads(self, first: u8, last: u8, op: u8) -> Self {
            self.op(&[0x0c, first, last, op])
        }

        fn control_resources(self, id: u16) -> Self {
            let [hi, lo] = id.to_be_bytes();
            self.op(&[0x19, hi, lo])
        }

        fn render(self, buffer: u8) -> Self {
            self.op(&[0x10, buffer])
        }

        fn kill(self) -> Self {
            self.op(&[0x11])
        }

        fn yield_thread(self) -> Self {
            self.op(&[0x06])
        }

        fn build(self) -> Vec<u8> {
            self.0
        }
    }

    fn sound_blob(payload: &[u8]) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&((payload.len() / 2) as u16).to_be_bytes());
        blob.extend_from_slice(&0u16.to_be_bytes());
        blob.extend_from_slice(&[0u8; 4]);
        blob.extend_from_slice(payload);
        blob
    }

    /// A machine whose copy-protection part runs `bytecode`.
    fn machine_with_bytecode(bytecode: Vec<u8>) -> Machine {
        let mut repo = TaggedRepository { blobs: Vec::new() };
        let mut set = |id: usize, kind: ResourceKind, data: Vec<u8>| {
            while repo.blobs.len() <= id {
                repo.blobs.push((ResourceKind::Sound, Vec::new()));
            }
            repo.blobs[id] = (kind, data);
        };

        // Copy-protection part (0x14..0x16) plus the password part
        // (0x7d..0x7f) and an audio resource at 42.
        set(0x14, ResourceKind::Palettes, vec![0u8; 1024]);
        set(0x15, ResourceKind::Bytecode, bytecode);
        set(0x16, ResourceKind::Polygons, vec![0xc0, 0, 0, 1, 0, 0]);
        set(0x17, ResourceKind::Palettes, vec![0u8; 1024]);
        set(
            0x18,
            ResourceKind::Bytecode,
            Assembler::default().yield_thread().build(),
        );
        set(0x19, ResourceKind::Polygons, vec![0xc0, 0, 0, 1, 0, 0]);
        set(0x7d, ResourceKind::Palettes, vec![0u8; 1024]);
        set(
            0x7e,
            ResourceKind::Bytecode,
            Assembler::default().yield_thread().build(),
        );
        set(0x7f, ResourceKind::Polygons, vec![0xc0, 0, 0, 1, 0, 0]);
        set(42, ResourceKind::Sound, sound_blob(&[10, 20, 30, 40]));

        let mut machine = Machine::new(Box::new(repo), 0).unwrap();
        machine.schedule_part(GamePart::CopyProtection);
        machine
    }

    #[derive(Default)]
    struct RecordingHost {
        frames: Vec<(usize, Duration)>,
    }

    impl Host for RecordingHost {
        fn video_frame_ready(&mut self, buffer_index: usize, delay: Duration) {
            self.frames.push((buffer_index, delay));
        }
    }

    #[test]
    fn kill_and_resume_scheduling() {
        // Thread 0 resumes 1..=63 and dies. The resume only lands next
        // tic, and is cleared once applied.
        let code = Assembler::default()
            .control_threads(1, 63, 0)
            .kill()
            .build();
        let mut machine = machine_with_bytecode(code);
        let mut host = NullHost;

        machine.run_tic(&UserInput::default(), &mut host).unwrap();

        assert_eq!(machine.thread(0).execution(), Execution::Inactive);
        for id in 1..64 {
            assert_eq!(machine.thread(id).scheduled_pause(), Some(false));
            assert!(!machine.thread(id).is_paused());
        }

        machine.run_tic(&UserInput::default(), &mut host).unwrap();
        for id in 0..64 {
            assert_eq!(machine.thread(id).scheduled_pause(), None);
            assert!(!machine.thread(id).is_paused());
        }
    }

    #[test]
    fn wrapping_arithmetic() {
        let code = Assembler::default()
            .seti(0, i16::MAX)
            .addi(0, 1)
            .yield_thread()
            .build();
        let mut machine = machine_with_bytecode(code);
        machine.run_tic(&UserInput::default(), &mut NullHost).unwrap();

        assert_eq!(machine.register(0), i16::MIN);
    }

    #[test]
    fn jump_if_not_zero_counts_down() {
        let code = Assembler::default()
            .seti(0, 3) // 4 bytes
            .jnz(0, 4) // loop back onto itself
            .yield_thread()
            .build();
        let mut machine = machine_with_bytecode(code);
        machine.run_tic(&UserInput::default(), &mut NullHost).unwrap();

        assert_eq!(machine.register(0), 0);
        // The thread yielded with its cursor right after the yield op.
        assert_eq!(machine.thread(0).execution(), Execution::Active(9));
    }

    #[test]
    fn control_resources_dispatch() {
        let code = Assembler::default()
            .control_resources(42)
            .yield_thread()
            .build();
        let mut machine = machine_with_bytecode(code);
        machine.run_tic(&UserInput::default(), &mut NullHost).unwrap();

        // The sound resource is now resident.
        assert!(machine.resources().resident(42).is_some());

        // Unload-everything request.
        let code = Assembler::default()
            .control_resources(42)
            .control_resources(0)
            .yield_thread()
            .build();
        let mut machine = machine_with_bytecode(code);
        machine.run_tic(&UserInput::default(), &mut NullHost).unwrap();
        assert!(machine.resources().resident(42).is_none());

        // A game-part id schedules the part instead of loading.
        let code = Assembler::default()
            .control_resources(0x11) // Intro via compact id 17
            .yield_thread()
            .build();
        let mut machine = machine_with_bytecode(code);
        machine.run_tic(&UserInput::default(), &mut NullHost).unwrap();
        assert_eq!(machine.scheduled_part(), Some(GamePart::Intro));

        // Loading the next part evicts resident resources.
        machine.run_tic(&UserInput::default(), &mut NullHost).unwrap();
        assert_eq!(machine.current_part(), Some(GamePart::Intro));
        assert!(machine.resources().resident(42).is_none());
    }

    #[test]
    fn frame_pacing() {
        let code = Assembler::default()
            .seti(regs::FRAME_DURATION as u8, 5)
            .render(0xff)
            .yield_thread()
            .build();
        let mut machine = machine_with_bytecode(code);
        let mut host = RecordingHost::default();
        machine.run_tic(&UserInput::default(), &mut host).unwrap();

        assert_eq!(machine.register(regs::FRAME_COUNTER), 0);
        assert_eq!(host.frames.len(), 1);
        // Initial back buffer is 1; delay is 5 × 20 ms.
        assert_eq!(host.frames[0], (1, Duration::from_millis(100)));
    }

    #[test]
    fn password_screen_gate() {
        let mut machine = machine_with_bytecode(
            Assembler::default()
                .control_resources(0x11)
                .yield_thread()
                .build(),
        );

        // Copy protection forbids the password screen.
        let mut input = UserInput {
            request_password_screen: true,
            ..Default::default()
        };
        machine.run_tic(&input, &mut NullHost).unwrap();
        // The running bytecode scheduled the intro; the gate must not have
        // overridden anything while in copy protection.
        assert_eq!(machine.scheduled_part(), Some(GamePart::Intro));

        // From the intro the request is honored.
        machine.run_tic(&input, &mut NullHost).unwrap();
        assert_eq!(machine.current_part(), Some(GamePart::Intro));
        assert_eq!(machine.scheduled_part(), Some(GamePart::Password));

        // In the password part the typed character lands, uppercased, in
        // its register.
        input.request_password_screen = false;
        input.last_char = Some('j');
        machine.run_tic(&input, &mut NullHost).unwrap();
        assert_eq!(machine.current_part(), Some(GamePart::Password));
        machine.run_tic(&input, &mut NullHost).unwrap();
        assert_eq!(machine.register(regs::LAST_KEYCHAR), 'J' as i16);
    }

    #[test]
    fn directional_input_lands_in_registers() {
        let code = Assembler::default().yield_thread().build();
        let mut machine = machine_with_bytecode(code);

        let input = UserInput {
            horizontal: LeftRightDir::Left,
            vertical: UpDownDir::Up,
            action: ButtonState::Pushed,
            ..Default::default()
        };
        machine.run_tic(&input, &mut NullHost).unwrap();

        assert_eq!(machine.register(regs::HERO_POS_LEFT_RIGHT), -1);
        assert_eq!(machine.register(regs::HERO_POS_UP_DOWN), -1);
        assert_eq!(machine.register(regs::HERO_POS_JUMP_DOWN), -1);
        assert_eq!(machine.register(regs::HERO_ACTION), 1);
        assert_eq!(machine.register(regs::HERO_POS_MASK), 0xa);
        assert_eq!(machine.register(regs::HERO_ACTION_POS_MASK), 0x8a);
    }

    #[test]
    fn stalled_thread_is_reported() {
        // An infinite loop: jump to self.
        let code = Assembler::default().op(&[0x07, 0x00, 0x00]).build();
        let mut machine = machine_with_bytecode(code);
        machine.set_instruction_budget(100);

        assert!(matches!(
            machine.run_tic(&UserInput::default(), &mut NullHost),
            Err(Error::ThreadStalled(0))
        ));
    }

    #[test]
    fn stack_depth_is_bounded() {
        let mut stack = CallStack::default();
        for i in 0..MAX_CALL_DEPTH {
            stack.push(i as u16).unwrap();
        }
        assert!(matches!(stack.push(0), Err(Error::StackOverflow)));
        assert_eq!(stack.depth(), MAX_CALL_DEPTH);

        stack.clear();
        assert!(matches!(stack.pop(), Err(Error::StackUnderflow)));
    }

    #[test]
    fn cursor_reads_and_jumps() {
        let code = [0x12, 0x34, 0x56, 0xff, 0xfe];
        let mut cursor = ProgramCursor::new(&code, 0).unwrap();
        assert_eq!(cursor.read_u8().unwrap(), 0x12);
        assert_eq!(cursor.read_u16().unwrap(), 0x3456);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert!(cursor.is_at_end());
        assert!(matches!(cursor.read_u8(), Err(Error::EndOfProgram)));

        cursor.jump(1).unwrap();
        assert_eq!(cursor.position(), 1);
        assert!(matches!(cursor.jump(5), Err(Error::InvalidAddress(5))));
    }

    #[test]
    fn deterministic_across_runs() {
        let build = || {
            machine_with_bytecode(
                Assembler::default()
                    .seti(3, 1234)
                    .addi(3, -234)
                    .control_threads(5, 6, 1)
                    .render(0xff)
                    .yield_thread()
                    .build(),
            )
        };

        let mut a = build();
        let mut b = build();
        for _ in 0..3 {
            a.run_tic(&UserInput::default(), &mut NullHost).unwrap();
            b.run_tic(&UserInput::default(), &mut NullHost).unwrap();
        }

        for id in 0..=255u8 {
            assert_eq!(a.register(id), b.register(id));
        }
        for id in 0..NUM_THREADS {
            assert_eq!(
                a.thread(id as u8).execution(),
                b.thread(id as u8).execution()
            );
        }
        for buffer in 0..4 {
            assert_eq!(
                a.video().buffer(buffer).pixels()[..],
                b.video().buffer(buffer).pixels()[..]
            );
        }
    }

    /// End-to-end run over real game data, when a data directory with the
    /// manifest layout described in [`crate::res`] is available.
    #[test]
    #[ignore = "needs a game data directory in AWVM_DATA_DIR"]
    fn intro_reaches_first_gameplay_part() {
        let dir = std::env::var("AWVM_DATA_DIR").expect("AWVM_DATA_DIR not set");
        let repository = Box::new(crate::res::DiskRepository::new(dir));
        let mut machine = Machine::new(repository, 0).unwrap();
        machine.schedule_part(GamePart::Intro);

        for _ in 0..10_000 {
            machine.run_tic(&UserInput::default(), &mut NullHost).unwrap();
            if machine.scheduled_part() == Some(GamePart::Lake) {
                return;
            }
        }
        panic!("intro did not schedule the first gameplay part");
    }
}
