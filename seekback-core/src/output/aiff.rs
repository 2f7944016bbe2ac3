//! Streaming AIFF encoder for mono 32-bit big-endian PCM.
//!
//! The total length of a dump is unknown until capture stops, so the writer
//! emits the full header with zeroed size fields up front and patches them
//! in `finalize`.
//!
//! ## Layout
//!
//! ```text
//! 0   "FORM"  4   form size*   8   "AIFF"
//! 12  "COMM"  16  18           20  channels=1   22  sample frames*
//! 26  bits=32 28  sample rate (80-bit extended, 10 bytes)
//! 38  "SSND"  42  ssnd size*   46  offset=0     50  block size=0
//! 54  samples...
//! ```
//! `*` fields are written as zero and patched on finalize.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::buffering::frame::Sample;
use crate::error::{Result, SeekbackError};

pub const HEADER_LEN: u64 = 54;
pub const FORM_SIZE_OFFSET: u64 = 4;
pub const SAMPLE_COUNT_OFFSET: u64 = 22;
pub const SSND_SIZE_OFFSET: u64 = 42;

const COMM_CHUNK_SIZE: u32 = 18;
const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 32;
const BYTES_PER_SAMPLE: u64 = 4;
/// "AIFF" tag + COMM chunk + SSND chunk header, all counted in the FORM size.
const FORM_OVERHEAD: u64 = 4 + 8 + COMM_CHUNK_SIZE as u64 + 8 + 8;
/// SSND offset + block size words, counted in the SSND size.
const SSND_OVERHEAD: u64 = 8;

/// Most samples a single container can hold before its FORM size overflows
/// the signed 32-bit field.
pub const MAX_SAMPLES: u64 = (i32::MAX as u64 - FORM_OVERHEAD) / BYTES_PER_SAMPLE;

/// FORM chunk payload size for `samples` mono samples.
pub fn form_size(samples: u64) -> u64 {
    FORM_OVERHEAD + BYTES_PER_SAMPLE * samples
}

/// SSND chunk payload size for `samples` mono samples.
pub fn ssnd_size(samples: u64) -> u64 {
    SSND_OVERHEAD + BYTES_PER_SAMPLE * samples
}

/// Encode an integral sample rate as an IEEE 754 80-bit extended float.
pub fn encode_extended(rate: u32) -> [u8; 10] {
    let mut out = [0u8; 10];
    if rate == 0 {
        return out;
    }
    let msb = 31 - rate.leading_zeros();
    let exponent = 16_383 + msb as u16;
    let mantissa = (rate as u64) << (63 - msb);
    BigEndian::write_u16(&mut out[..2], exponent);
    BigEndian::write_u64(&mut out[2..], mantissa);
    out
}

/// Decode an IEEE 754 80-bit extended float.
pub fn decode_extended(bytes: &[u8; 10]) -> f64 {
    let sign_exp = BigEndian::read_u16(&bytes[..2]);
    let mantissa = BigEndian::read_u64(&bytes[2..]);
    let exponent = (sign_exp & 0x7fff) as i32;
    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    let value = mantissa as f64 * 2f64.powi(exponent - 16_383 - 63);
    if sign_exp & 0x8000 != 0 {
        -value
    } else {
        value
    }
}

/// Streaming writer; created per dump and consumed by [`AiffWriter::finalize`].
pub struct AiffWriter<W: Write + Seek> {
    inner: W,
    samples: u64,
    scratch: Vec<u8>,
}

impl<W: Write + Seek> AiffWriter<W> {
    /// Write the header with placeholder sizes.
    pub fn new(mut inner: W, sample_rate: u32) -> io::Result<Self> {
        // FORM
        inner.write_all(b"FORM")?;
        inner.write_u32::<BigEndian>(0)?;
        inner.write_all(b"AIFF")?;

        // COMM
        inner.write_all(b"COMM")?;
        inner.write_u32::<BigEndian>(COMM_CHUNK_SIZE)?;
        inner.write_u16::<BigEndian>(CHANNELS)?;
        inner.write_u32::<BigEndian>(0)?;
        inner.write_u16::<BigEndian>(BITS_PER_SAMPLE)?;
        inner.write_all(&encode_extended(sample_rate))?;

        // SSND
        inner.write_all(b"SSND")?;
        inner.write_u32::<BigEndian>(0)?;
        inner.write_u32::<BigEndian>(0)?; // offset
        inner.write_u32::<BigEndian>(0)?; // block size

        Ok(Self {
            inner,
            samples: 0,
            scratch: Vec::new(),
        })
    }

    /// Append samples to the SSND payload.
    pub fn write_samples(&mut self, samples: &[Sample]) -> io::Result<()> {
        self.scratch.resize(samples.len() * BYTES_PER_SAMPLE as usize, 0);
        BigEndian::write_i32_into(samples, &mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        self.samples += samples.len() as u64;
        Ok(())
    }

    /// Samples written so far.
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Whether `additional` more samples still fit in the size fields.
    pub fn fits(&self, additional: usize) -> bool {
        self.samples + additional as u64 <= MAX_SAMPLES
    }

    /// Patch the three size fields, flush, and hand back the inner writer
    /// positioned at the end of the data.
    pub fn finalize(mut self) -> io::Result<W> {
        let form = form_size(self.samples);
        let ssnd = ssnd_size(self.samples);
        if self.samples > MAX_SAMPLES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} samples exceed the 32-bit AIFF size fields",
                    self.samples
                ),
            ));
        }

        self.inner.seek(SeekFrom::Start(FORM_SIZE_OFFSET))?;
        self.inner.write_u32::<BigEndian>(form as u32)?;
        self.inner.seek(SeekFrom::Start(SAMPLE_COUNT_OFFSET))?;
        self.inner.write_u32::<BigEndian>(self.samples as u32)?;
        self.inner.seek(SeekFrom::Start(SSND_SIZE_OFFSET))?;
        self.inner.write_u32::<BigEndian>(ssnd as u32)?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Parsed header of a container produced by [`AiffWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct AiffHeader {
    pub form_size: u32,
    pub channels: u16,
    pub sample_frames: u32,
    pub bits_per_sample: u16,
    pub sample_rate: f64,
    pub ssnd_size: u32,
    pub ssnd_offset: u32,
    pub block_size: u32,
}

impl AiffHeader {
    /// Read and validate the fixed 54-byte header.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        expect_tag(&mut r, b"FORM")?;
        let form_size = r.read_u32::<BigEndian>()?;
        expect_tag(&mut r, b"AIFF")?;

        expect_tag(&mut r, b"COMM")?;
        let comm_size = r.read_u32::<BigEndian>()?;
        if comm_size != COMM_CHUNK_SIZE {
            return Err(SeekbackError::MalformedContainer(format!(
                "COMM chunk size {comm_size}, expected {COMM_CHUNK_SIZE}"
            )));
        }
        let channels = r.read_u16::<BigEndian>()?;
        let sample_frames = r.read_u32::<BigEndian>()?;
        let bits_per_sample = r.read_u16::<BigEndian>()?;
        let mut rate = [0u8; 10];
        r.read_exact(&mut rate)?;

        expect_tag(&mut r, b"SSND")?;
        let ssnd_size = r.read_u32::<BigEndian>()?;
        let ssnd_offset = r.read_u32::<BigEndian>()?;
        let block_size = r.read_u32::<BigEndian>()?;

        Ok(Self {
            form_size,
            channels,
            sample_frames,
            bits_per_sample,
            sample_rate: decode_extended(&rate),
            ssnd_size,
            ssnd_offset,
            block_size,
        })
    }

    /// Bytes of sample data the header claims.
    pub fn payload_len(&self) -> u64 {
        self.sample_frames as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8)
    }

    /// Verify the size fields against a file of `file_len` bytes.
    pub fn check_consistency(&self, file_len: u64) -> Result<()> {
        if file_len < HEADER_LEN {
            return Err(SeekbackError::MalformedContainer(format!(
                "{file_len} bytes is shorter than the {HEADER_LEN}-byte header"
            )));
        }
        let payload = file_len - HEADER_LEN;
        if self.payload_len() != payload {
            return Err(SeekbackError::MalformedContainer(format!(
                "header claims {} sample bytes, file holds {payload}",
                self.payload_len()
            )));
        }
        if self.form_size as u64 != file_len - 8 {
            return Err(SeekbackError::MalformedContainer(format!(
                "FORM size {} does not match file length {file_len}",
                self.form_size
            )));
        }
        if self.ssnd_size as u64 != SSND_OVERHEAD + payload {
            return Err(SeekbackError::MalformedContainer(format!(
                "SSND size {} does not match {payload} payload bytes",
                self.ssnd_size
            )));
        }
        Ok(())
    }
}

/// Read `count` big-endian samples following the header.
pub fn read_samples<R: Read>(mut r: R, count: usize) -> Result<Vec<Sample>> {
    let mut samples = vec![0; count];
    r.read_i32_into::<BigEndian>(&mut samples)?;
    Ok(samples)
}

fn expect_tag<R: Read>(r: &mut R, tag: &[u8; 4]) -> Result<()> {
    let mut found = [0u8; 4];
    r.read_exact(&mut found)?;
    if &found != tag {
        return Err(SeekbackError::MalformedContainer(format!(
            "expected {:?} chunk, found {:?}",
            String::from_utf8_lossy(tag),
            String::from_utf8_lossy(&found)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    #[test]
    fn sample_rate_44100_matches_reference_bytes() {
        assert_eq!(
            encode_extended(44_100),
            [0x40, 0x0e, 0xac, 0x44, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn extended_decodes_common_rates() {
        for rate in [1u32, 8_000, 16_000, 22_050, 44_100, 48_000, 96_000, 192_000] {
            assert_relative_eq!(decode_extended(&encode_extended(rate)), rate as f64);
        }
        assert_eq!(decode_extended(&encode_extended(0)), 0.0);
    }

    #[test]
    fn size_limit_is_the_largest_patchable_count() {
        assert!(form_size(MAX_SAMPLES) <= i32::MAX as u64);
        assert!(form_size(MAX_SAMPLES + 1) > i32::MAX as u64);

        let mut writer = AiffWriter::new(Cursor::new(Vec::new()), 44_100).unwrap();
        writer.samples = MAX_SAMPLES - 64;
        assert!(writer.fits(64));
        assert!(!writer.fits(65));

        writer.samples = MAX_SAMPLES + 1;
        let err = writer.finalize().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn empty_container_is_header_only() {
        let writer = AiffWriter::new(Cursor::new(Vec::new()), 44_100).unwrap();
        let bytes = writer.finalize().unwrap().into_inner();
        assert_eq!(bytes.len() as u64, HEADER_LEN);
        assert_eq!(&bytes[0..4], b"FORM");
        assert_eq!(&bytes[4..8], &46u32.to_be_bytes());
        assert_eq!(&bytes[8..12], b"AIFF");
        assert_eq!(&bytes[12..16], b"COMM");
        assert_eq!(&bytes[16..20], &18u32.to_be_bytes());
        assert_eq!(&bytes[20..22], &1u16.to_be_bytes());
        assert_eq!(&bytes[22..26], &0u32.to_be_bytes());
        assert_eq!(&bytes[26..28], &32u16.to_be_bytes());
        assert_eq!(&bytes[38..42], b"SSND");
        assert_eq!(&bytes[42..46], &8u32.to_be_bytes());
        assert_eq!(&bytes[46..54], &[0u8; 8]);
    }

    #[test]
    fn patched_fields_track_sample_count() {
        let mut writer = AiffWriter::new(Cursor::new(Vec::new()), 48_000).unwrap();
        writer.write_samples(&[1, -1, i32::MAX]).unwrap();
        writer.write_samples(&[i32::MIN, 0]).unwrap();
        assert_eq!(writer.sample_count(), 5);
        let bytes = writer.finalize().unwrap().into_inner();

        assert_eq!(bytes.len(), 54 + 20);
        assert_eq!(&bytes[4..8], &(46u32 + 20).to_be_bytes());
        assert_eq!(&bytes[22..26], &5u32.to_be_bytes());
        assert_eq!(&bytes[42..46], &(8u32 + 20).to_be_bytes());
        assert_eq!(&bytes[54..58], &1i32.to_be_bytes());
        assert_eq!(&bytes[58..62], &(-1i32).to_be_bytes());
        assert_eq!(&bytes[70..74], &0i32.to_be_bytes());
    }

    #[test]
    fn parsed_header_is_consistent_with_payload() {
        let mut writer = AiffWriter::new(Cursor::new(Vec::new()), 44_100).unwrap();
        let samples: Vec<Sample> = (0..128).map(|i| i * 1000 - 64_000).collect();
        writer.write_samples(&samples).unwrap();
        let bytes = writer.finalize().unwrap().into_inner();

        let mut cursor = Cursor::new(&bytes);
        let header = AiffHeader::read_from(&mut cursor).unwrap();
        assert_eq!(header.channels, 1);
        assert_eq!(header.bits_per_sample, 32);
        assert_eq!(header.sample_frames, 128);
        assert_eq!(header.ssnd_offset, 0);
        assert_eq!(header.block_size, 0);
        assert_relative_eq!(header.sample_rate, 44_100.0);
        header.check_consistency(bytes.len() as u64).unwrap();

        let decoded = read_samples(&mut cursor, header.sample_frames as usize).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn truncated_payload_fails_consistency_check() {
        let mut writer = AiffWriter::new(Cursor::new(Vec::new()), 44_100).unwrap();
        writer.write_samples(&[7; 10]).unwrap();
        let bytes = writer.finalize().unwrap().into_inner();
        let header = AiffHeader::read_from(Cursor::new(&bytes)).unwrap();
        let err = header.check_consistency(bytes.len() as u64 - 4).unwrap_err();
        assert!(matches!(err, SeekbackError::MalformedContainer(_)));
    }

    #[test]
    fn rejects_foreign_magic() {
        let mut bytes = vec![0u8; 54];
        bytes[..4].copy_from_slice(b"RIFF");
        let err = AiffHeader::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SeekbackError::MalformedContainer(_)));
    }
}
