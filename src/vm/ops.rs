//! Decoding and execution of the bytecode instruction set.
//!
//! The first byte of an instruction is examined: if its top bit is set it
//! is a background-polygon draw carrying a 15-bit address; if the next
//! bit is set it is a sprite-polygon draw whose low six bits select the
//! x/y/scale operand sources; otherwise it is a small opcode number with
//! a fixed payload.

use std::time::Duration;

use tracing::warn;

use crate::audio::music::MusicModule;
use crate::audio::{Audio, SoundSample, MAX_VOLUME, NUM_AUDIO_CHANNELS, PLAYBACK_FREQUENCY};
use crate::errors::{Error, Result};
use crate::gfx::{PolySegment, Video, DEFAULT_ZOOM};
use crate::host::Host;
use crate::parts::GamePart;
use crate::res::{LoadedResource, ResourceKind, ResourceManager};

use super::{regs, Execution, MachineState, ProgramCursor, Registers, NUM_THREADS};

/// What the scheduler should do with the current thread after an
/// instruction has executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Yield,
    Deactivate,
}

/// The machine subsystems an executing instruction may touch. Borrowed
/// field-by-field from the machine so the program bytes stay borrowed
/// through the cursor.
pub struct OpContext<'a> {
    pub state: &'a mut MachineState,
    pub res: &'a mut ResourceManager,
    pub video: &'a mut Video,
    pub audio: &'a mut Audio,
    pub host: &'a mut dyn Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Condition {
    fn eval(self, lhs: i16, rhs: i16) -> bool {
        match self {
            Condition::Equal => lhs == rhs,
            Condition::NotEqual => lhs != rhs,
            Condition::Greater => lhs > rhs,
            Condition::GreaterOrEqual => lhs >= rhs,
            Condition::Less => lhs < rhs,
            Condition::LessOrEqual => lhs <= rhs,
        }
    }
}

/// An operand that is either an immediate or read from a register at
/// execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Immediate(i16),
    Register(u8),
}

impl Source {
    fn resolve(self, regs: &Registers) -> i16 {
        match self {
            Source::Immediate(value) => value,
            Source::Register(id) => regs.signed(id),
        }
    }
}

/// Zoom operand of a sprite-polygon draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteScale {
    Default,
    Immediate(u16),
    Register(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadsOp {
    Resume,
    Pause,
    Deactivate,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    RegisterSet { dst: u8, value: i16 },
    RegisterCopy { dst: u8, src: u8 },
    RegisterAdd { dst: u8, src: u8 },
    RegisterAddConst { dst: u8, value: i16 },
    RegisterSub { dst: u8, src: u8 },
    RegisterAnd { dst: u8, value: u16 },
    RegisterOr { dst: u8, value: u16 },
    RegisterShiftLeft { dst: u8, amount: u8 },
    RegisterShiftRight { dst: u8, amount: u8 },
    Jump { addr: u16 },
    Call { addr: u16 },
    Return,
    JumpConditional {
        condition: Condition,
        reg: u8,
        operand: Source,
        addr: u16,
    },
    JumpIfNotZero { reg: u8, addr: u16 },
    Yield,
    Kill,
    ActivateThread { thread: u8, addr: u16 },
    ControlThreads { first: u8, last: u8, op: ThreadsOp },
    ControlResources { id: u16 },
    PlaySound {
        resource: u16,
        frequency: u8,
        volume: u8,
        channel: u8,
    },
    PlayMusic {
        resource: u16,
        delay: u16,
        position: u8,
    },
    SelectPalette { palette: u8 },
    SelectVideoBuffer { buffer: u8 },
    FillVideoBuffer { buffer: u8, color: u8 },
    CopyVideoBuffer { src: u8, dst: u8 },
    RenderVideoBuffer { buffer: u8 },
    DrawString {
        string: u16,
        x: u8,
        y: u8,
        color: u8,
    },
    DrawBackgroundPolygon { addr: u16, x: i16, y: i16 },
    DrawSpritePolygon {
        addr: u16,
        x: Source,
        y: Source,
        scale: SpriteScale,
        segment: PolySegment,
    },
}

impl Instruction {
    /// Parse the next instruction, advancing the cursor past its payload.
    pub fn decode(cursor: &mut ProgramCursor) -> Result<Instruction> {
        let opcode = cursor.read_u8()?;

        if opcode & 0x80 != 0 {
            return Self::decode_background_polygon(opcode, cursor);
        }
        if opcode & 0x40 != 0 {
            return Self::decode_sprite_polygon(opcode, cursor);
        }

        Ok(match opcode {
            0x00 => Instruction::RegisterSet {
                dst: cursor.read_u8()?,
                value: cursor.read_i16()?,
            },
            0x01 => Instruction::RegisterCopy {
                dst: cursor.read_u8()?,
                src: cursor.read_u8()?,
            },
            0x02 => Instruction::RegisterAdd {
                dst: cursor.read_u8()?,
                src: cursor.read_u8()?,
            },
            0x03 => Instruction::RegisterAddConst {
                dst: cursor.read_u8()?,
                value: cursor.read_i16()?,
            },
            0x04 => Instruction::Call {
                addr: cursor.read_u16()?,
            },
            0x05 => Instruction::Return,
            0x06 => Instruction::Yield,
            0x07 => Instruction::Jump {
                addr: cursor.read_u16()?,
            },
            0x08 => Instruction::ActivateThread {
                thread: cursor.read_u8()?,
                addr: cursor.read_u16()?,
            },
            0x09 => Instruction::JumpIfNotZero {
                reg: cursor.read_u8()?,
                addr: cursor.read_u16()?,
            },
            0x0a => Self::decode_conditional_jump(cursor)?,
            0x0b => {
                let palette = cursor.read_u8()?;
                // The second byte was a fade speed; always 0xff in the
                // shipped data and ignored by every interpreter since.
                let _ = cursor.read_u8()?;
                Instruction::SelectPalette { palette }
            }
            0x0c => {
                let first = cursor.read_u8()?;
                let last = cursor.read_u8()?;
                let op = match cursor.read_u8()? {
                    0 => ThreadsOp::Resume,
                    1 => ThreadsOp::Pause,
                    2 => ThreadsOp::Deactivate,
                    raw => return Err(Error::InvalidOpcode(raw)),
                };
                Instruction::ControlThreads { first, last, op }
            }
            0x0d => Instruction::SelectVideoBuffer {
                buffer: cursor.read_u8()?,
            },
            0x0e => Instruction::FillVideoBuffer {
                buffer: cursor.read_u8()?,
                color: cursor.read_u8()?,
            },
            0x0f => Instruction::CopyVideoBuffer {
                src: cursor.read_u8()?,
                dst: cursor.read_u8()?,
            },
            0x10 => Instruction::RenderVideoBuffer {
                buffer: cursor.read_u8()?,
            },
            0x11 => Instruction::Kill,
            0x12 => Instruction::DrawString {
                string: cursor.read_u16()?,
                x: cursor.read_u8()?,
                y: cursor.read_u8()?,
                color: cursor.read_u8()?,
            },
            0x13 => Instruction::RegisterSub {
                dst: cursor.read_u8()?,
                src: cursor.read_u8()?,
            },
            0x14 => Instruction::RegisterAnd {
                dst: cursor.read_u8()?,
                value: cursor.read_u16()?,
            },
            0x15 => Instruction::RegisterOr {
                dst: cursor.read_u8()?,
                value: cursor.read_u16()?,
            },
            0x16 => {
                let dst = cursor.read_u8()?;
                // The amount is stored as a word; only 4 bits carry.
                let amount = (cursor.read_u16()? & 0xf) as u8;
                Instruction::RegisterShiftLeft { dst, amount }
            }
            0x17 => {
                let dst = cursor.read_u8()?;
                let amount = (cursor.read_u16()? & 0xf) as u8;
                Instruction::RegisterShiftRight { dst, amount }
            }
            0x18 => Instruction::PlaySound {
                resource: cursor.read_u16()?,
                frequency: cursor.read_u8()?,
                volume: cursor.read_u8()?,
                channel: cursor.read_u8()?,
            },
            0x19 => Instruction::ControlResources {
                id: cursor.read_u16()?,
            },
            0x1a => Instruction::PlayMusic {
                resource: cursor.read_u16()?,
                delay: cursor.read_u16()?,
                position: cursor.read_u8()?,
            },
            _ => return Err(Error::InvalidOpcode(opcode)),
        })
    }

    fn decode_background_polygon(opcode: u8, cursor: &mut ProgramCursor) -> Result<Instruction> {
        // The low 7 bits and the next byte form a 15-bit word address.
        let low = cursor.read_u8()? as u16;
        let addr = ((((opcode & 0x7f) as u16) << 8) | low) << 1;

        let mut x = cursor.read_u8()? as i16;
        let mut y = cursor.read_u8()? as i16;
        // A single byte cannot address the right edge of the screen; the
        // vertical excess carries into x.
        let excess = y - 199;
        if excess > 0 {
            y = 199;
            x += excess;
        }

        Ok(Instruction::DrawBackgroundPolygon { addr, x, y })
    }

    fn decode_sprite_polygon(opcode: u8, cursor: &mut ProgramCursor) -> Result<Instruction> {
        let addr = cursor.read_u16()?.wrapping_mul(2);

        let x = match (opcode >> 4) & 0x3 {
            0 => Source::Immediate(cursor.read_i16()?),
            1 => Source::Register(cursor.read_u8()?),
            2 => Source::Immediate(cursor.read_u8()? as i16),
            _ => Source::Immediate(cursor.read_u8()? as i16 + 0x100),
        };
        let y = match (opcode >> 2) & 0x3 {
            0 => Source::Immediate(cursor.read_i16()?),
            1 => Source::Register(cursor.read_u8()?),
            _ => Source::Immediate(cursor.read_u8()? as i16),
        };
        let (scale, segment) = match opcode & 0x3 {
            0 => (SpriteScale::Default, PolySegment::Polygons),
            1 => (
                SpriteScale::Register(cursor.read_u8()?),
                PolySegment::Polygons,
            ),
            2 => (
                SpriteScale::Immediate(cursor.read_u8()? as u16),
                PolySegment::Polygons,
            ),
            _ => (SpriteScale::Default, PolySegment::Animations),
        };

        Ok(Instruction::DrawSpritePolygon {
            addr,
            x,
            y,
            scale,
            segment,
        })
    }

    fn decode_conditional_jump(cursor: &mut ProgramCursor) -> Result<Instruction> {
        // The mode byte selects the condition (low bits) and the operand
        // form (high bits).
        let mode = cursor.read_u8()?;
        let reg = cursor.read_u8()?;
        let operand = if mode & 0x80 != 0 {
            Source::Register(cursor.read_u8()?)
        } else if mode & 0x40 != 0 {
            Source::Immediate(cursor.read_i16()?)
        } else {
            Source::Immediate(cursor.read_u8()? as i16)
        };
        let addr = cursor.read_u16()?;

        let condition = match mode & 0x7 {
            0 => Condition::Equal,
            1 => Condition::NotEqual,
            2 => Condition::Greater,
            3 => Condition::GreaterOrEqual,
            4 => Condition::Less,
            5 => Condition::LessOrEqual,
            _ => return Err(Error::InvalidOpcode(mode)),
        };

        Ok(Instruction::JumpConditional {
            condition,
            reg,
            operand,
            addr,
        })
    }

    /// Execute against the machine. Every effect other than the returned
    /// [`Action`] is a side effect on `ctx` or the cursor.
    pub fn execute(
        &self,
        thread_id: u8,
        cursor: &mut ProgramCursor,
        ctx: &mut OpContext,
    ) -> Result<Action> {
        let regs = &mut ctx.state.regs;

        match *self {
            Instruction::RegisterSet { dst, value } => regs.set_signed(dst, value),
            Instruction::RegisterCopy { dst, src } => regs.set_signed(dst, regs.signed(src)),
            Instruction::RegisterAdd { dst, src } => {
                regs.set_signed(dst, regs.signed(dst).wrapping_add(regs.signed(src)))
            }
            Instruction::RegisterAddConst { dst, value } => {
                regs.set_signed(dst, regs.signed(dst).wrapping_add(value))
            }
            Instruction::RegisterSub { dst, src } => {
                regs.set_signed(dst, regs.signed(dst).wrapping_sub(regs.signed(src)))
            }
            Instruction::RegisterAnd { dst, value } => {
                regs.set_unsigned(dst, regs.unsigned(dst) & value)
            }
            Instruction::RegisterOr { dst, value } => {
                regs.set_unsigned(dst, regs.unsigned(dst) | value)
            }
            Instruction::RegisterShiftLeft { dst, amount } => {
                regs.set_unsigned(dst, regs.unsigned(dst) << amount)
            }
            Instruction::RegisterShiftRight { dst, amount } => {
                regs.set_unsigned(dst, regs.unsigned(dst) >> amount)
            }

            Instruction::Jump { addr } => cursor.jump(addr)?,
            Instruction::Call { addr } => {
                let thread = &mut ctx.state.threads[thread_id as usize];
                thread.call_stack.push(cursor.position())?;
                cursor.jump(addr)?;
            }
            Instruction::Return => {
                let thread = &mut ctx.state.threads[thread_id as usize];
                let addr = thread.call_stack.pop()?;
                cursor.jump(addr)?;
            }
            Instruction::JumpConditional {
                condition,
                reg,
                operand,
                addr,
            } => {
                if condition.eval(regs.signed(reg), operand.resolve(regs)) {
                    cursor.jump(addr)?;
                }
            }
            Instruction::JumpIfNotZero { reg, addr } => {
                let value = regs.signed(reg).wrapping_sub(1);
                regs.set_signed(reg, value);
                if value != 0 {
                    cursor.jump(addr)?;
                }
            }

            Instruction::Yield => return Ok(Action::Yield),
            Instruction::Kill => return Ok(Action::Deactivate),

            Instruction::ActivateThread { thread, addr } => {
                if thread as usize >= NUM_THREADS {
                    return Err(Error::InvalidThreadId(thread));
                }
                ctx.state.threads[thread as usize].scheduled_execution =
                    Some(Execution::Active(addr));
            }
            Instruction::ControlThreads { first, last, op } => {
                if last as usize >= NUM_THREADS {
                    return Err(Error::InvalidThreadId(last));
                }
                if first > last {
                    return Err(Error::InvalidThreadId(first));
                }
                for thread in &mut ctx.state.threads[first as usize..=last as usize] {
                    match op {
                        ThreadsOp::Resume => thread.scheduled_pause = Some(false),
                        ThreadsOp::Pause => thread.scheduled_pause = Some(true),
                        ThreadsOp::Deactivate => {
                            thread.scheduled_execution = Some(Execution::Inactive)
                        }
                    }
                }
            }

            Instruction::ControlResources { id } => self.control_resources(id, ctx)?,

            Instruction::PlaySound {
                resource,
                frequency,
                volume,
                channel,
            } => {
                if channel as usize >= NUM_AUDIO_CHANNELS {
                    return Err(Error::InvalidChannelId(channel));
                }
                if volume > MAX_VOLUME {
                    return Err(Error::VolumeOutOfRange(volume));
                }
                if volume == 0 {
                    ctx.audio.stop_channel(channel);
                } else if !ctx.audio.has_sample(resource as u8) {
                    warn!("sound {:#06x} is not loaded, ignoring play", resource);
                } else {
                    // Out-of-table frequency ids clamp to the last entry.
                    let index = (frequency as usize).min(PLAYBACK_FREQUENCY.len() - 1);
                    ctx.audio
                        .play_sound(resource as u8, channel, PLAYBACK_FREQUENCY[index], volume);
                }
            }
            Instruction::PlayMusic {
                resource,
                delay,
                position,
            } => self.play_music(resource, delay, position, ctx)?,

            Instruction::SelectPalette { palette } => ctx.video.select_palette(palette)?,
            Instruction::SelectVideoBuffer { buffer } => {
                ctx.video.select_target(buffer)?;
            }
            Instruction::FillVideoBuffer { buffer, color } => {
                let index = ctx.video.fill(buffer, color)?;
                ctx.host.video_buffer_changed(index);
            }
            Instruction::CopyVideoBuffer { src, dst } => {
                let dst_index = ctx.video.resolve_raw(dst)?;
                // A flagged source applies the vertical-scroll register.
                let (src_index, vscroll) = if src < 0xfe && src & 0x80 != 0 {
                    ((src & 0x3) as usize, regs.signed(regs::SCROLL_Y))
                } else {
                    (ctx.video.resolve_raw(src)?, 0)
                };
                ctx.video.copy(src_index, dst_index, vscroll);
                ctx.host.video_buffer_changed(dst_index);
            }
            Instruction::RenderVideoBuffer { buffer } => {
                let delay_frames = regs.unsigned(regs::FRAME_DURATION) as u64;
                regs.set_signed(regs::FRAME_COUNTER, 0);
                let front = ctx.video.render(buffer)?;
                ctx.host
                    .video_frame_ready(front, Duration::from_millis(delay_frames * 20));
            }
            Instruction::DrawString {
                string,
                x,
                y,
                color,
            } => {
                let index = ctx.video.draw_string(string, x, y, color)?;
                ctx.host.video_buffer_changed(index);
            }
            Instruction::DrawBackgroundPolygon { addr, x, y } => {
                let index =
                    ctx.video
                        .draw_polygons(PolySegment::Polygons, addr, (x, y), DEFAULT_ZOOM)?;
                ctx.host.video_buffer_changed(index);
            }
            Instruction::DrawSpritePolygon {
                addr,
                x,
                y,
                scale,
                segment,
            } => {
                let pos = (x.resolve(regs), y.resolve(regs));
                let zoom = match scale {
                    SpriteScale::Default => DEFAULT_ZOOM,
                    SpriteScale::Immediate(zoom) => zoom,
                    SpriteScale::Register(id) => regs.unsigned(id),
                };
                let index = ctx.video.draw_polygons(segment, addr, pos, zoom)?;
                ctx.host.video_buffer_changed(index);
            }
        }

        Ok(Action::Continue)
    }

    /// The three-way dispatch of the load-resource opcode: free
    /// everything, schedule a game part, or make one resource resident.
    fn control_resources(&self, id: u16, ctx: &mut OpContext) -> Result<()> {
        if id == 0 {
            ctx.res.unload_all();
            ctx.audio.reset();
            return Ok(());
        }

        if let Some(part) = GamePart::from_request_id(id) {
            ctx.state.scheduled_part = Some(part);
            return Ok(());
        }

        match ctx.res.load_individual(id)? {
            LoadedResource::Bitmap(data) => {
                ctx.video.blit_bitmap(&data)?;
                ctx.host.video_buffer_changed(0);
            }
            LoadedResource::Resident(ResourceKind::Sound) => {
                if let Some(bytes) = ctx.res.resident(id as u8) {
                    match SoundSample::parse(bytes) {
                        Ok(sample) if sample.is_empty() => {
                            warn!("sound resource {:#06x} has no payload", id)
                        }
                        Ok(sample) => ctx.audio.add_sample(id as u8, sample),
                        Err(e) => warn!("resource {:#06x} is not a valid sample: {}", id, e),
                    }
                }
            }
            LoadedResource::Resident(_) => (),
            LoadedResource::Empty => warn!("load of empty resource slot {:#06x}", id),
        }
        Ok(())
    }

    /// The three-way dispatch of the music opcode: start a module, adjust
    /// the pattern delay, or stop playback.
    fn play_music(&self, resource: u16, delay: u16, position: u8, ctx: &mut OpContext) -> Result<()> {
        if resource == 0 {
            if delay != 0 {
                ctx.audio.set_music_delay(delay);
            } else {
                ctx.audio.stop_music();
            }
            return Ok(());
        }

        match ctx.res.load_individual(resource)? {
            LoadedResource::Resident(ResourceKind::Music) => (),
            _ => {
                warn!("resource {:#06x} is not music", resource);
                return Ok(());
            }
        }
        let Some(bytes) = ctx.res.resident(resource as u8) else {
            return Ok(());
        };
        let module = MusicModule::parse(bytes)?;

        // Make the instrument samples available to the mixer.
        let instruments = module.instruments;
        for instrument in instruments.iter().filter(|i| i.resource != 0) {
            match ctx.res.load_individual(instrument.resource)? {
                LoadedResource::Resident(ResourceKind::Sound) => {
                    if let Some(bytes) = ctx.res.resident(instrument.resource as u8) {
                        match SoundSample::parse(bytes) {
                            Ok(sample) if !sample.is_empty() => {
                                ctx.audio.add_sample(instrument.resource as u8, sample)
                            }
                            Ok(_) => warn!("instrument {:#06x} is empty", instrument.resource),
                            Err(e) => warn!(
                                "instrument {:#06x} is not a valid sample: {}",
                                instrument.resource, e
                            ),
                        }
                    }
                }
                _ => warn!("instrument {:#06x} is not a sound", instrument.resource),
            }
        }

        ctx.audio.play_music(module, position as u16, delay);
        Ok(())
    }
}
