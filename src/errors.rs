//! The crate-wide error type.
//!
//! Most errors bubble up to [`crate::vm::Machine::run_tic`], which aborts
//! the tic and leaves the machine in a defined (if partially mutated)
//! state; hosts should treat them as fatal. Out-of-bounds draws are never
//! errors — they are clipped by the rasterizer.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Resources and IO.
    #[error("resource id {0:#06x} is out of range or names an empty slot")]
    InvalidResourceId(u16),
    #[error("destination buffer holds {actual} bytes but the resource needs {needed}")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("resource data ends prematurely")]
    TruncatedData,
    #[error("compressed resource data is malformed")]
    InvalidCompressedData,
    #[error("resource manifest is malformed")]
    InvalidManifest,
    #[error("resource size fields are inconsistent")]
    InvalidResourceSize,
    #[error("repository failure")]
    Repository(#[from] io::Error),

    // Bytecode.
    #[error("unknown opcode {0:#04x}")]
    InvalidOpcode(u8),
    #[error("program ended in the middle of an instruction")]
    EndOfProgram,
    #[error("address {0:#06x} is outside the current program")]
    InvalidAddress(u16),
    #[error("thread id {0:#04x} is out of range")]
    InvalidThreadId(u8),
    #[error("color index {0:#04x} is not drawable here")]
    InvalidColorId(u8),
    #[error("byte {0:#04x} does not select a video buffer")]
    InvalidBufferId(u8),
    #[error("string id {0:#06x} is not in the string table")]
    InvalidStringId(u16),
    #[error("channel id {0} is out of range")]
    InvalidChannelId(u8),
    #[error("volume {0} is outside the 0..=63 range")]
    VolumeOutOfRange(u8),
    #[error("palette id {0} is out of range")]
    InvalidPaletteId(u8),

    // Control flow.
    #[error("call stack overflow")]
    StackOverflow,
    #[error("call stack underflow")]
    StackUnderflow,

    // Scheduling.
    #[error("thread {0:#04x} exceeded the per-tic instruction budget")]
    ThreadStalled(u8),

    // Decoder and rasterizer.
    #[error("back-reference outside the destination buffer")]
    CopyOutOfRange,
    #[error("decompressed data failed checksum verification")]
    ChecksumMismatch,
    #[error("polygon data is malformed")]
    InvalidPolygonData,
}

pub type Result<T> = std::result::Result<T, Error>;
