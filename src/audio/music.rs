//! Music playback.
//!
//! Music is a rudimentary 4-channel module format: samples are regular
//! sound resources, and the sheet is a list of 1024-byte patterns whose
//! playback order comes from an order table. As the current pattern
//! unrolls, notes send samples to the mixer at the frequency encoded by
//! the note word.

use std::io::Read;

use byteorder::{ReadBytesExt, BE};
use tracing::{debug, warn};

use crate::audio::{ClassicMixer, MAX_VOLUME};
use crate::errors::{Error, Result};

pub const NUM_INSTRUMENTS: usize = 15;
const ORDER_TABLE_LEN: usize = 0x80;
const LINES_PER_PATTERN: u8 = 64;
const PATTERN_LEN: usize = LINES_PER_PATTERN as usize * 4 * 4;

/// An instrument slot: the sound resource to play and its base volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct Instrument {
    pub resource: u16,
    pub volume: u16,
}

/// A note is two words. The first is the note itself with a few special
/// values:
///
/// * `0xFFFE` stops playback on the channel.
/// * `0xFFFD` forwards the second word to the music-sync VM register.
/// * `0x0000` is silence.
/// * Values in `0x37..0x1000` play at 7159092 / (note × 2) Hz.
///
/// For played notes, the second word holds the 1-based instrument number
/// in its top nibble, an optional volume-slide effect (5 up, 6 down) in
/// the next one, and the effect amount in the low byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternNote(u16, u16);

enum SampleEffect {
    VolumeUp(u8),
    VolumeDown(u8),
}

enum NoteType {
    Stop,
    Sync(i16),
    Play {
        instrument: u8,
        freq: u16,
        effect: Option<SampleEffect>,
    },
}

impl PatternNote {
    fn parse(&self) -> Option<NoteType> {
        match self.0 {
            0xfffe => Some(NoteType::Stop),
            0xfffd => Some(NoteType::Sync(self.1 as i16)),
            note @ 0x37..=0xfff => {
                let instrument = ((self.1 & 0xf000) >> 12) as u8;
                if instrument == 0 {
                    return None;
                }
                let freq = (7_159_092u32 / (note as u32 * 2)) as u16;
                let param = (self.1 & 0x00ff) as u8;
                let effect = match ((self.1 & 0x0f00) >> 8) as u8 {
                    5 => Some(SampleEffect::VolumeUp(param)),
                    6 => Some(SampleEffect::VolumeDown(param)),
                    _ => None,
                };

                Some(NoteType::Play {
                    instrument,
                    freq,
                    effect,
                })
            }
            _ => None,
        }
    }
}

pub type PatternLine = [PatternNote; 4];

pub struct MusicPattern {
    pub lines: [PatternLine; LINES_PER_PATTERN as usize],
}

/// A parsed music resource.
pub struct MusicModule {
    /// Default pattern delay, overridable by the play-music instruction.
    pub delay: u16,
    pub instruments: [Instrument; NUM_INSTRUMENTS],
    pub num_order: u16,
    pub order_table: [u8; ORDER_TABLE_LEN],
    pub patterns: Vec<MusicPattern>,
}

impl MusicModule {
    pub fn parse(bytes: &[u8]) -> Result<MusicModule> {
        let mut reader = bytes;
        let delay = reader.read_u16::<BE>().map_err(|_| Error::TruncatedData)?;

        let mut instruments = [Instrument::default(); NUM_INSTRUMENTS];
        for instrument in instruments.iter_mut() {
            instrument.resource = reader.read_u16::<BE>().map_err(|_| Error::TruncatedData)?;
            instrument.volume = reader.read_u16::<BE>().map_err(|_| Error::TruncatedData)?;
        }

        let num_order = reader.read_u16::<BE>().map_err(|_| Error::TruncatedData)?;
        let mut order_table = [0u8; ORDER_TABLE_LEN];
        reader
            .read_exact(&mut order_table)
            .map_err(|_| Error::TruncatedData)?;
        if num_order as usize > ORDER_TABLE_LEN {
            return Err(Error::InvalidResourceSize);
        }

        let mut patterns = Vec::new();
        loop {
            let mut raw = [0u8; PATTERN_LEN];
            match reader.read_exact(&mut raw) {
                Ok(()) => (),
                // A partial trailing pattern is ignored, matching the
                // original's indifference to the resource tail.
                Err(_) => break,
            }
            let mut lines = [[PatternNote::default(); 4]; LINES_PER_PATTERN as usize];
            for (i, chunk) in raw.chunks_exact(4).enumerate() {
                let note = u16::from_be_bytes([chunk[0], chunk[1]]);
                let arg = u16::from_be_bytes([chunk[2], chunk[3]]);
                lines[i / 4][i % 4] = PatternNote(note, arg);
            }
            patterns.push(MusicPattern { lines });
        }

        debug!(
            delay,
            num_order,
            num_patterns = patterns.len(),
            "parsed music module"
        );
        Ok(MusicModule {
            delay,
            instruments,
            num_order,
            order_table,
            patterns,
        })
    }
}

enum PlayerState {
    Stopped,
    Playing {
        module: MusicModule,
        /// Index in the order table of the current pattern.
        order: u16,
        /// Line to play next in the current pattern.
        line: u8,
    },
}

/// Unrolls the current module one pattern line at a time, paced by the
/// module delay.
///
/// The delay is the original timer value: one line every
/// `delay × 60 / 7050` milliseconds, which the machine quantizes to its
/// 20 ms tic.
pub struct MusicPlayer {
    state: PlayerState,
    delay: u16,
    accumulated_ms: u32,
    sync: Option<i16>,
}

impl MusicPlayer {
    pub fn new() -> MusicPlayer {
        MusicPlayer {
            state: PlayerState::Stopped,
            delay: 0,
            accumulated_ms: 0,
            sync: None,
        }
    }

    pub fn play(&mut self, module: MusicModule, position: u16, delay: u16) {
        self.delay = if delay != 0 { delay } else { module.delay };
        self.accumulated_ms = 0;
        self.sync = None;
        self.state = PlayerState::Playing {
            module,
            order: position,
            line: 0,
        };
        debug!(position, delay = self.delay, "music started");
    }

    pub fn set_delay(&mut self, delay: u16) {
        self.delay = delay;
    }

    pub fn delay(&self) -> u16 {
        self.delay
    }

    pub fn stop(&mut self) {
        self.state = PlayerState::Stopped;
        self.sync = None;
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayerState::Playing { .. })
    }

    fn line_interval_ms(&self) -> u32 {
        self.delay as u32 * 60 / 7050
    }

    /// Account `elapsed_ms` of wall time and play every line that became
    /// due. Returns the latest music-sync value requested by the sheet.
    pub fn tick(&mut self, elapsed_ms: u32, mixer: &mut ClassicMixer) -> Option<i16> {
        if !self.is_playing() {
            return None;
        }

        let interval = self.line_interval_ms().max(1);
        self.accumulated_ms += elapsed_ms;
        while self.accumulated_ms >= interval && self.is_playing() {
            self.accumulated_ms -= interval;
            self.process_line(mixer);
        }

        self.sync.take()
    }

    /// Play one pattern line and advance.
    fn process_line(&mut self, mixer: &mut ClassicMixer) {
        let PlayerState::Playing {
            module,
            order,
            line,
        } = &mut self.state
        else {
            return;
        };

        let pattern_index = module.order_table[*order as usize & (ORDER_TABLE_LEN - 1)];
        let Some(pattern) = module.patterns.get(pattern_index as usize) else {
            warn!("order entry {} names missing pattern {}", order, pattern_index);
            self.state = PlayerState::Stopped;
            return;
        };
        let notes = &pattern.lines[*line as usize];

        for (channel, note) in notes.iter().enumerate() {
            match note.parse() {
                None => (),
                Some(NoteType::Stop) => mixer.stop(channel as u8),
                Some(NoteType::Sync(value)) => {
                    debug!("music sync {:04x}", value);
                    self.sync = Some(value);
                }
                Some(NoteType::Play {
                    instrument,
                    freq,
                    effect,
                }) => {
                    let instrument = &module.instruments[instrument as usize - 1];
                    if instrument.resource == 0 {
                        continue;
                    }
                    let mut volume = instrument.volume as i16;
                    match effect {
                        None => (),
                        Some(SampleEffect::VolumeUp(param)) => volume += param as i16,
                        Some(SampleEffect::VolumeDown(param)) => volume -= param as i16,
                    }
                    let volume = volume.clamp(0, MAX_VOLUME as i16) as u8;

                    mixer.play(instrument.resource as u8, channel as u8, freq, volume);
                }
            }
        }

        *line += 1;
        if *line >= LINES_PER_PATTERN {
            *line = 0;
            *order += 1;
            if *order >= module.num_order {
                debug!("end of order table, music stops");
                self.state = PlayerState::Stopped;
            }
        }
    }
}

impl Default for MusicPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SoundSample;

    /// A module with one pattern: line 0 plays instrument 1 (note 0x37),
    /// line 1 requests a sync value, line 2 stops channel 0.
    fn test_module_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u16.to_be_bytes()); // delay
        for i in 0..NUM_INSTRUMENTS as u16 {
            let resource: u16 = if i == 0 { 42 } else { 0 };
            bytes.extend_from_slice(&resource.to_be_bytes());
            bytes.extend_from_slice(&0x20u16.to_be_bytes());
        }
        bytes.extend_from_slice(&1u16.to_be_bytes()); // one order entry
        bytes.extend_from_slice(&[0u8; ORDER_TABLE_LEN]);

        let mut pattern = [0u8; PATTERN_LEN];
        // Line 0, channel 0: note 0x37, instrument 1.
        pattern[0..2].copy_from_slice(&0x37u16.to_be_bytes());
        pattern[2..4].copy_from_slice(&0x1000u16.to_be_bytes());
        // Line 1, channel 0: sync word 0x1234.
        pattern[16..18].copy_from_slice(&0xfffdu16.to_be_bytes());
        pattern[18..20].copy_from_slice(&0x1234u16.to_be_bytes());
        // Line 2, channel 0: stop.
        pattern[32..34].copy_from_slice(&0xfffeu16.to_be_bytes());
        bytes.extend_from_slice(&pattern);
        bytes
    }

    fn mixer_with_sample_42() -> ClassicMixer {
        let mut mixer = ClassicMixer::new();
        let mut resource = Vec::new();
        resource.extend_from_slice(&4u16.to_be_bytes());
        resource.extend_from_slice(&0u16.to_be_bytes());
        resource.extend_from_slice(&[0u8; 4]);
        resource.extend_from_slice(&[50u8; 8]);
        mixer.add_sample(42, SoundSample::parse(&resource).unwrap());
        mixer
    }

    #[test]
    fn module_parsing() {
        let module = MusicModule::parse(&test_module_bytes()).unwrap();
        assert_eq!(module.delay, 100);
        assert_eq!(module.instruments[0].resource, 42);
        assert_eq!(module.num_order, 1);
        assert_eq!(module.patterns.len(), 1);
    }

    #[test]
    fn truncated_module_is_rejected() {
        assert!(matches!(
            MusicModule::parse(&[0u8; 10]),
            Err(Error::TruncatedData)
        ));
    }

    #[test]
    fn notes_drive_the_mixer() {
        let module = MusicModule::parse(&test_module_bytes()).unwrap();
        let mut mixer = mixer_with_sample_42();
        let mut player = MusicPlayer::new();
        player.play(module, 0, 0);
        assert_eq!(player.delay(), 100);

        // Line 0 starts the sample on channel 0.
        player.process_line(&mut mixer);
        let mut out = [0i8; 4];
        mixer.mix(&mut out, 8000);
        assert_ne!(out[0], 0);

        // Line 1 records the sync value for the machine to pick up.
        player.process_line(&mut mixer);
        assert_eq!(player.sync, Some(0x1234));

        // Line 2 stops the channel.
        player.process_line(&mut mixer);
        mixer.mix(&mut out, 8000);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn playback_stops_at_end_of_order_table() {
        let module = MusicModule::parse(&test_module_bytes()).unwrap();
        let mut mixer = mixer_with_sample_42();
        let mut player = MusicPlayer::new();
        player.play(module, 0, 0);

        for _ in 0..LINES_PER_PATTERN {
            player.process_line(&mut mixer);
        }
        assert!(!player.is_playing());
    }

    #[test]
    fn tick_paces_lines_with_the_delay() {
        let module = MusicModule::parse(&test_module_bytes()).unwrap();
        let mut mixer = mixer_with_sample_42();
        let mut player = MusicPlayer::new();
        // Delay 5875 -> one line every 50 ms.
        player.play(module, 0, 5875);

        // 40 ms: not due yet.
        let sync = player.tick(40, &mut mixer);
        assert!(sync.is_none());
        // 40 more: line 0 plays. One more tick: line 1 syncs.
        player.tick(40, &mut mixer);
        let sync = player.tick(40, &mut mixer);
        assert_eq!(sync, Some(0x1234));
    }
}
