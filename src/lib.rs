//! Core of a reimplementation of the Another World (1991) engine.
//!
//! The crate drives the game's virtual machine: 64 cooperatively-scheduled
//! bytecode threads mutating a 256-slot register file, four 320×200
//! indexed-color framebuffers filled by a polygon rasterizer, and a
//! 4-channel PCM mixer, all fed from the compressed bank files the game
//! shipped with.
//!
//! The host side (window, event loop, audio device, CLI) is out of scope;
//! it talks to the core through [`host::Host`] and
//! [`res::ResourceRepository`], calls [`vm::Machine::run_tic`] once per
//! frame and pulls PCM from [`audio::ClassicMixer::mix`].

pub mod audio;
pub mod errors;
mod font;
pub mod gfx;
pub mod host;
pub mod input;
pub mod parts;
pub mod res;
pub mod strings;
pub mod vm;

pub use errors::{Error, Result};
pub use vm::Machine;
