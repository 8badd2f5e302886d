//! The audio subsystem: a 4-channel sample mixer and the music player
//! driving it.
//!
//! The mixer is the only piece of the core that crosses a thread
//! boundary: the host's audio callback calls [`ClassicMixer::mix`] while
//! the scheduler thread issues play/stop commands, so the machine owns it
//! behind an `Arc<Mutex<_>>` and hands clones of the handle out.

pub mod music;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use byteorder::{ReadBytesExt, BE};
use tracing::{debug, error, warn};

use crate::errors::Result;

use self::music::{MusicModule, MusicPlayer};

pub const NUM_AUDIO_CHANNELS: usize = 4;

/// Volume values live in 0..=0x3f.
pub const MAX_VOLUME: u8 = 0x3f;

/// Playback frequencies in Hz for the frequency id carried by the
/// play-sound instruction.
pub const PLAYBACK_FREQUENCY: [u16; 40] = [
    0x0CFF, 0x0DC3, 0x0E91, 0x0F6F, 0x1056, 0x114E, 0x1259, 0x136C, 0x149F, 0x15D9, 0x1726, 0x1888,
    0x19FD, 0x1B86, 0x1D21, 0x1EDE, 0x20AB, 0x229C, 0x24B3, 0x26D7, 0x293F, 0x2BB2, 0x2E4C, 0x3110,
    0x33FB, 0x370D, 0x3A43, 0x3DDF, 0x4157, 0x4538, 0x4998, 0x4DAE, 0x5240, 0x5764, 0x5C9A, 0x61C8,
    0x6793, 0x6E19, 0x7485, 0x7BBD,
];

/// A sound resource reinterpreted as a sample: a header of two big-endian
/// word counts (length before the loop point, length after it), four
/// packing bytes, then signed 8-bit PCM.
#[derive(Debug, Clone)]
pub struct SoundSample {
    data: Vec<i8>,
    loop_pos: Option<usize>,
}

const SAMPLE_HEADER_LEN: usize = 8;

impl SoundSample {
    pub fn parse(bytes: &[u8]) -> Result<SoundSample> {
        let mut header = bytes;
        let len = header.read_u16::<BE>()? as usize * 2;
        let loop_len = header.read_u16::<BE>()? as usize * 2;
        let _ = header.read_u32::<BE>()?;

        let payload = &bytes[SAMPLE_HEADER_LEN..];
        let mut total = len + loop_len;
        if total > payload.len() {
            warn!(
                "sound header claims {} bytes but the resource holds {}",
                total,
                payload.len()
            );
            total = payload.len();
        }

        Ok(SoundSample {
            data: payload[..total].iter().map(|&b| b as i8).collect(),
            // A loop point at or past the clamped end cannot be honored.
            loop_pos: (loop_len > 0 && len < total).then_some(len),
        })
    }

    /// Position playback wraps to once the end is reached, if any.
    pub fn loop_pos(&self) -> Option<usize> {
        self.loop_pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A mixer channel, either idle or playing a sample.
#[derive(Default)]
enum MixerChannel {
    #[default]
    Inactive,
    Active {
        /// Resource id of the sample being played.
        sample_id: u8,
        /// Playback volume, 0..=0x3f.
        volume: u8,
        /// Requested playback frequency in Hz.
        freq: u16,
        /// Sample position ×256, so sub-sample progress survives between
        /// mix calls.
        chunk_pos: usize,
    },
}

/// 4-channel mixer producing mono signed 8-bit PCM, mimicking the
/// original game's output path.
pub struct ClassicMixer {
    channels: [MixerChannel; NUM_AUDIO_CHANNELS],
    samples: BTreeMap<u8, SoundSample>,
}

impl ClassicMixer {
    pub fn new() -> Self {
        Self {
            channels: Default::default(),
            samples: Default::default(),
        }
    }

    /// Register `sample` under `id` for later playback.
    pub fn add_sample(&mut self, id: u8, sample: SoundSample) {
        self.samples.insert(id, sample);
    }

    pub fn has_sample(&self, id: u8) -> bool {
        self.samples.contains_key(&id)
    }

    /// Start playing `sample_id` on `channel`, replacing whatever was
    /// there. The caller has validated the channel and volume ranges.
    pub fn play(&mut self, sample_id: u8, channel: u8, freq: u16, volume: u8) {
        let Some(channel) = self.channels.get_mut(channel as usize) else {
            error!("invalid channel index {}", channel);
            return;
        };

        *channel = MixerChannel::Active {
            sample_id,
            volume,
            freq,
            chunk_pos: 0,
        };
    }

    pub fn stop(&mut self, channel: u8) {
        debug!("channel {}: stop", channel);
        let Some(channel) = self.channels.get_mut(channel as usize) else {
            error!("invalid channel index {}", channel);
            return;
        };
        *channel = MixerChannel::Inactive;
    }

    /// Stop playback and drop all loaded samples.
    pub fn reset(&mut self) {
        self.channels = Default::default();
        self.samples = Default::default();
    }

    /// Fill `out` with the saturating sum of all active channels,
    /// resampled for an output rate of `sample_rate` Hz.
    pub fn mix(&mut self, out: &mut [i8], sample_rate: u32) {
        out.fill(0);
        if sample_rate == 0 {
            return;
        }

        for (ch_id, channel) in self.channels.iter_mut().enumerate() {
            if let MixerChannel::Active {
                sample_id,
                volume,
                freq,
                chunk_pos,
            } = channel
            {
                let sample = match self.samples.get(sample_id) {
                    Some(sample) if !sample.is_empty() => sample,
                    Some(_) | None => {
                        warn!("sample {:02x} is not playable, stopping channel", sample_id);
                        *channel = MixerChannel::Inactive;
                        continue;
                    }
                };
                let loop_pos = sample.loop_pos();
                let chunk_inc = ((*freq as usize) << 8) / sample_rate as usize;

                'chan: for c in out.iter_mut() {
                    let mut sample_pos = *chunk_pos >> 8;
                    let delta = *chunk_pos & 0xff;

                    if sample_pos >= sample.len() {
                        match loop_pos {
                            None => {
                                debug!("channel {}: end of sample", ch_id);
                                *channel = MixerChannel::Inactive;
                                break 'chan;
                            }
                            Some(p) => {
                                sample_pos = p + (sample_pos - sample.len()) % (sample.len() - p);
                                *chunk_pos = (sample_pos << 8) + delta;
                            }
                        }
                    }

                    // Neighboring sample for interpolation.
                    let next_sample_pos = match sample_pos + 1 {
                        pos if pos >= sample.len() => match loop_pos {
                            None => sample_pos,
                            Some(p) => p,
                        },
                        pos => pos,
                    };

                    // Interpolate, scale by volume, mix and clamp.
                    let ilc = delta as isize;
                    let s1 = sample.data[sample_pos] as isize;
                    let s2 = sample.data[next_sample_pos] as isize;
                    let s = (s1 * (0x100 - ilc) + s2 * ilc) >> 8;
                    let v = s as i16 * *volume as i16 / 0x40;
                    *c = (v + *c as i16).clamp(i8::MIN as i16, i8::MAX as i16) as i8;

                    *chunk_pos += chunk_inc;
                }
            }
        }
    }
}

impl Default for ClassicMixer {
    fn default() -> Self {
        Self::new()
    }
}

/// Duration the machine accounts to one tic when advancing music.
pub(crate) const TIC_MS: u32 = 20;

/// Machine-facing front of the audio subsystem: the shared mixer handle
/// plus the music player state.
pub struct Audio {
    mixer: Arc<Mutex<ClassicMixer>>,
    player: MusicPlayer,
}

impl Audio {
    pub fn new() -> Audio {
        Audio {
            mixer: Arc::new(Mutex::new(ClassicMixer::new())),
            player: MusicPlayer::new(),
        }
    }

    /// Clone of the mixer handle, for the host's audio callback.
    pub fn mixer(&self) -> Arc<Mutex<ClassicMixer>> {
        Arc::clone(&self.mixer)
    }

    fn with_mixer<R>(&self, f: impl FnOnce(&mut ClassicMixer) -> R) -> R {
        // The audio callback never panics while holding the lock; treat a
        // poisoned mutex as still usable.
        let mut guard = match self.mixer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub(crate) fn add_sample(&self, id: u8, sample: SoundSample) {
        self.with_mixer(|mixer| mixer.add_sample(id, sample));
    }

    pub(crate) fn has_sample(&self, id: u8) -> bool {
        self.with_mixer(|mixer| mixer.has_sample(id))
    }

    pub(crate) fn play_sound(&self, sample_id: u8, channel: u8, freq: u16, volume: u8) {
        self.with_mixer(|mixer| mixer.play(sample_id, channel, freq, volume));
    }

    pub(crate) fn stop_channel(&self, channel: u8) {
        self.with_mixer(|mixer| mixer.stop(channel));
    }

    pub(crate) fn play_music(&mut self, module: MusicModule, position: u16, delay: u16) {
        self.player.play(module, position, delay);
    }

    pub(crate) fn set_music_delay(&mut self, delay: u16) {
        self.player.set_delay(delay);
    }

    pub(crate) fn stop_music(&mut self) {
        self.player.stop();
    }

    /// Current music pattern delay, observable for tests and hosts.
    pub fn music_delay(&self) -> u16 {
        self.player.delay()
    }

    pub fn music_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// Stop everything when a new game part takes over.
    pub(crate) fn reset(&mut self) {
        self.player.stop();
        self.with_mixer(|mixer| mixer.reset());
    }

    /// Advance music playback by one tic. Returns a value for the
    /// music-sync register when the pattern requests one.
    pub(crate) fn tick(&mut self) -> Option<i16> {
        let Audio { mixer, player } = self;
        let mut guard = match mixer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        player.tick(TIC_MS, &mut guard)
    }
}

impl Default for Audio {
    fn default() -> Self {
        Self::new()
    }
}
