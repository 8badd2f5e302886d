//! In-place decoder for the byte-killer compression used by the bank files.
//!
//! The compressed stream is consumed from its END backwards, and the output
//! is written from the end of the destination backwards, so a resource can
//! be decompressed in place: the caller copies the packed bytes to the
//! start of a buffer sized for the unpacked data and the decoder fills the
//! buffer from the other side.
//!
//! The last three 32-bit big-endian words of the packed data are, in file
//! order: the initial bit reservoir, the checksum, and the unpacked size.
//! Bits are drawn from 32-bit reservoirs; the highest set bit of each
//! reservoir is a sentinel marking its end. Opcodes interleave two
//! primitives: emit the next N literal bytes from the stream, and copy N
//! already-written bytes from a small offset ahead of the write cursor.

use tracing::trace;

use crate::errors::{Error, Result};

/// Decode `data[..packed_len]` in place so that on return the whole of
/// `data` holds the unpacked resource.
pub fn unpack_in_place(data: &mut [u8], packed_len: usize) -> Result<()> {
    UnpackContext::new(data, packed_len)?.unpack()
}

struct UnpackContext<'a> {
    /// Sized for the unpacked data, filled with packed data up to `i_buf`.
    data: &'a mut [u8],
    /// Running checksum, must be zero once every reservoir has been read.
    crc: u32,
    /// Current bit reservoir.
    chk: u32,
    /// Input (packed) cursor, moving towards 0.
    i_buf: usize,
    /// Output (unpacked) cursor, moving towards 0.
    o_buf: usize,
}

impl<'a> UnpackContext<'a> {
    fn new(data: &'a mut [u8], packed_len: usize) -> Result<UnpackContext<'a>> {
        if packed_len > data.len() || packed_len < 12 || packed_len % 4 != 0 {
            return Err(Error::InvalidCompressedData);
        }

        let mut i_buf = packed_len - 4;
        let data_size = word_at(data, i_buf) as usize;
        if data_size != data.len() {
            return Err(Error::InvalidCompressedData);
        }
        i_buf -= 4;
        let crc = word_at(data, i_buf);
        i_buf -= 4;
        let chk = word_at(data, i_buf);

        Ok(UnpackContext {
            data,
            crc: crc ^ chk,
            chk,
            i_buf,
            o_buf: data_size,
        })
    }

    fn rcr(&mut self) -> bool {
        let rcf = (self.chk & 1) == 1;
        self.chk >>= 1;
        rcf
    }

    fn next_bit(&mut self) -> Result<bool> {
        let cf = self.rcr();
        // The reservoir still holds bits above the sentinel.
        if self.chk != 0 {
            return Ok(cf);
        }

        // `cf` was the sentinel; refill from the next reservoir down.
        if self.i_buf < 4 {
            return Err(Error::TruncatedData);
        }
        self.i_buf -= 4;
        self.chk = word_at(self.data, self.i_buf);
        self.crc ^= self.chk;
        // Return the first bit of the fresh word and plant the sentinel so
        // all 32 bits get consumed before the next refill.
        let cf = self.rcr();
        self.chk |= 1 << 31;
        Ok(cf)
    }

    /// The integer made of the next `num_bits` bits, MSB first.
    fn get_code(&mut self, num_bits: u8) -> Result<u16> {
        let mut c = 0u16;
        for _ in 0..num_bits {
            c <<= 1;
            c |= self.next_bit()? as u16;
        }
        Ok(c)
    }

    /// Step the output cursor down one byte, refusing to cross into the
    /// not-yet-consumed packed input.
    fn step_output(&mut self) -> Result<usize> {
        if self.o_buf == 0 || self.o_buf <= self.i_buf {
            return Err(Error::InvalidCompressedData);
        }
        self.o_buf -= 1;
        Ok(self.o_buf)
    }

    /// Emit `get_code(num_bits) + add_count` literal bytes from the stream.
    fn literal_run(&mut self, num_bits: u8, add_count: u16) -> Result<()> {
        let count = self.get_code(num_bits)? + add_count;
        trace!(count, "literal run");
        for _ in 0..count {
            let byte = self.get_code(8)? as u8;
            let pos = self.step_output()?;
            self.data[pos] = byte;
        }
        Ok(())
    }

    /// Copy `count` already-emitted bytes from `get_code(num_bits)` bytes
    /// ahead of the write cursor.
    fn copy_run(&mut self, num_bits: u8, count: u16) -> Result<()> {
        let offset = self.get_code(num_bits)? as usize;
        trace!(count, offset, "copy run");
        for _ in 0..count {
            let pos = self.step_output()?;
            let src = pos + offset;
            if src >= self.data.len() {
                return Err(Error::CopyOutOfRange);
            }
            self.data[pos] = self.data[src];
        }
        Ok(())
    }

    fn unpack(mut self) -> Result<()> {
        loop {
            if self.next_bit()? {
                match self.get_code(2)? {
                    3 => self.literal_run(8, 9)?,
                    c @ 0..=1 => self.copy_run((c + 9) as u8, c + 3)?,
                    _ => {
                        let size = self.get_code(8)?;
                        self.copy_run(12, size + 1)?;
                    }
                }
            } else if self.next_bit()? {
                self.copy_run(8, 2)?;
            } else {
                self.literal_run(3, 1)?;
            }
            if self.o_buf == 0 {
                break;
            }
        }

        match self.crc {
            0 => Ok(()),
            _ => Err(Error::ChecksumMismatch),
        }
    }
}

fn word_at(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test-side encoder producing streams in the exact bit layout the
    /// decoder consumes.
    #[derive(Default)]
    struct Packer {
        bits: Vec<bool>,
    }

    impl Packer {
        fn put(&mut self, value: u16, num_bits: u8) {
            for i in (0..num_bits).rev() {
                self.bits.push(value & (1 << i) != 0);
            }
        }

        /// Emit bytes that land at the current tail of the destination,
        /// last byte first.
        fn literal_run(&mut self, bytes: &[u8]) {
            assert!(!bytes.is_empty() && bytes.len() <= 8);
            self.put(0b00, 2);
            self.put(bytes.len() as u16 - 1, 3);
            for b in bytes.iter().rev() {
                self.put(*b as u16, 8);
            }
        }

        /// Long copy: `count` bytes from `offset` ahead of the cursor.
        fn long_copy(&mut self, count: u16, offset: u16) {
            assert!((1..=256).contains(&count));
            self.put(0b110, 3);
            self.put(count - 1, 8);
            self.put(offset, 12);
        }

        /// Pack the accumulated bits plus the three header words.
        fn finish(self, unpacked_len: usize) -> Vec<u8> {
            let initial_len = self.bits.len() % 32;
            let mut initial = 1u32 << initial_len;
            for (i, bit) in self.bits[..initial_len].iter().enumerate() {
                initial |= (*bit as u32) << i;
            }

            let mut refills = Vec::new();
            for chunk in self.bits[initial_len..].chunks(32) {
                let mut word = 0u32;
                for (i, bit) in chunk.iter().enumerate() {
                    word |= (*bit as u32) << i;
                }
                refills.push(word);
            }

            let crc = refills.iter().fold(initial, |acc, w| acc ^ w);

            let mut out = Vec::new();
            // Reservoirs are consumed downwards from the initial word.
            for word in refills.iter().rev() {
                out.extend_from_slice(&word.to_be_bytes());
            }
            out.extend_from_slice(&initial.to_be_bytes());
            out.extend_from_slice(&crc.to_be_bytes());
            out.extend_from_slice(&(unpacked_len as u32).to_be_bytes());
            out
        }
    }

    /// One literal byte then a long back-reference replicating it.
    fn packed_run_of(byte: u8, len: usize) -> Vec<u8> {
        let mut packer = Packer::default();
        packer.literal_run(&[byte]);
        packer.long_copy(len as u16 - 1, 1);
        packer.finish(len)
    }

    #[test]
    fn unpack_replicated_byte() {
        let packed = packed_run_of(0xab, 64);
        let packed_len = packed.len();

        let mut data = vec![0u8; 64];
        data[..packed_len].copy_from_slice(&packed);
        unpack_in_place(&mut data, packed_len).unwrap();

        assert_eq!(data, vec![0xab; 64]);
    }

    #[test]
    fn unpack_tiled_pattern() {
        // The first operation of the stream fills the TAIL of the
        // destination; the back-reference then tiles it downwards.
        let pattern = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut packer = Packer::default();
        packer.literal_run(&pattern);
        packer.long_copy(56, 8);
        let packed = packer.finish(64);
        let packed_len = packed.len();

        let mut data = vec![0u8; 64];
        data[..packed_len].copy_from_slice(&packed);
        unpack_in_place(&mut data, packed_len).unwrap();

        let expected: Vec<u8> = pattern.iter().copied().cycle().take(64).collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let mut packed = packed_run_of(0x55, 64);
        let packed_len = packed.len();
        // Corrupt the checksum word (third-from-last).
        let crc_pos = packed_len - 8;
        packed[crc_pos] ^= 0xff;

        let mut data = vec![0u8; 64];
        data[..packed_len].copy_from_slice(&packed);
        assert!(matches!(
            unpack_in_place(&mut data, packed_len),
            Err(Error::ChecksumMismatch)
        ));
    }

    #[test]
    fn out_of_range_copy_is_reported() {
        let mut packer = Packer::default();
        packer.literal_run(&[0xaa]);
        // Offset way past the end of a 64-byte destination.
        packer.long_copy(63, 0xfff);
        let packed = packer.finish(64);
        let packed_len = packed.len();

        let mut data = vec![0u8; 64];
        data[..packed_len].copy_from_slice(&packed);
        assert!(matches!(
            unpack_in_place(&mut data, packed_len),
            Err(Error::CopyOutOfRange)
        ));
    }

    #[test]
    fn truncated_stream_is_reported() {
        // A stream that asks for more bits than its reservoirs hold: the
        // initial word runs dry with no refill below it.
        let mut packer = Packer::default();
        packer.literal_run(&[0xaa]);
        let mut packed = packer.finish(64);
        let packed_len = packed.len();

        // Claim a larger output so the decoder keeps asking for opcodes.
        let size_pos = packed_len - 4;
        packed[size_pos..].copy_from_slice(&128u32.to_be_bytes());

        let mut data = vec![0u8; 128];
        data[..packed_len].copy_from_slice(&packed);
        assert!(matches!(
            unpack_in_place(&mut data, packed_len),
            Err(Error::TruncatedData)
        ));
    }

    #[test]
    fn size_header_must_match_buffer() {
        let packed = packed_run_of(0x11, 64);
        let packed_len = packed.len();

        let mut data = vec![0u8; 65];
        data[..packed_len].copy_from_slice(&packed);
        assert!(matches!(
            unpack_in_place(&mut data, packed_len),
            Err(Error::InvalidCompressedData)
        ));
    }
}
