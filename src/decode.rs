/*!
# Prontopng: Decoding.

Framing validation and the decode dispatch. The chunk walk is strict in a
particular direction: anything malformed is an error, anything well-formed
but outside the encoder's profile — unknown critical chunks, a missing
self-identification tag, more than one IDAT — is [`DecodeError::ForeignPng`],
the signal to retry with a general-purpose PNG library.

The IDAT's own CRC is deliberately not verified here; the bit-level
constraints inside the inflate loop provide a stronger integrity check for
far less work. Every other chunk's CRC is verified (unless the
`no-chunk-crc` feature says otherwise, for fuzzing).
*/

use crate::chunk;
use crate::DecodedImage;
use crate::error::DecodeError;
use crate::ImageInfo;
use crate::inflate;
use crate::MAX_DIMENSION;
use crate::MAX_PIXELS;



/// # Smallest Conceivable File.
///
/// Signature + IHDR + one empty chunk + the IDAT's minimum + IEND.
const MIN_FILE_SIZE: usize = 58;

/// # IDAT Chunk Type.
const IDAT: [u8; 4] = *b"IDAT";

/// # IEND Chunk Type.
const IEND: [u8; 4] = *b"IEND";



/// # Parsed Framing.
///
/// Everything `get_info` reports, plus where the pixel data lives.
pub(crate) struct Framing {
	/// # Image Width.
	pub(crate) width: u32,

	/// # Image Height.
	pub(crate) height: u32,

	/// # Channels Stored in the File.
	pub(crate) channels: u32,

	/// # IDAT Chunk Offset (From File Start).
	idat_ofs: usize,

	/// # IDAT Payload Length.
	idat_len: usize,
}



/// # Lightweight Info Parse.
pub(crate) fn info(src: &[u8]) -> Result<ImageInfo, DecodeError> {
	let framing = parse_framing(src)?;
	Ok(ImageInfo {
		width: framing.width,
		height: framing.height,
		channels_in_file: framing.channels,
	})
}

/// # Full Decode.
pub(crate) fn decode(src: &[u8], desired_channels: u32) -> Result<DecodedImage, DecodeError> {
	if desired_channels != 3 && desired_channels != 4 {
		return Err(DecodeError::InvalidChannels);
	}

	let framing = parse_framing(src)?;
	let w = framing.width as usize;
	let h = framing.height as usize;

	let needed = u64::from(framing.width) * u64::from(framing.height) * u64::from(desired_channels);
	if needed > u64::from(u32::MAX) { return Err(DecodeError::DimensionsTooLarge); }

	let mut pixels = vec![0_u8; needed as usize];

	// The inflate routines see everything from the IDAT payload onward;
	// their bit-level read-ahead leans on the trailing chunk bytes.
	let data = &src[framing.idat_ofs + 8..];
	match (framing.channels, desired_channels) {
		(3, 3) => inflate::inflate_pixels::<3, 3>(data, framing.idat_len, &mut pixels, w, h),
		(3, _) => inflate::inflate_pixels::<3, 4>(data, framing.idat_len, &mut pixels, w, h),
		(_, 3) => inflate::inflate_pixels::<4, 3>(data, framing.idat_len, &mut pixels, w, h),
		_ => inflate::inflate_pixels::<4, 4>(data, framing.idat_len, &mut pixels, w, h),
	}
		.map_err(|_| DecodeError::ForeignPng)?;

	Ok(DecodedImage {
		width: framing.width,
		height: framing.height,
		channels_in_file: framing.channels,
		pixels,
	})
}

/// # Validate the Framing.
///
/// Signature, IHDR, then a full chunk walk: verify framing and checksums,
/// require the self-identification chunk before a single IDAT, skip
/// ancillary chunks, and reject unknown critical ones as foreign.
fn parse_framing(src: &[u8]) -> Result<Framing, DecodeError> {
	if src.len() < MIN_FILE_SIZE || src[..8] != chunk::PNG_SIG {
		return Err(DecodeError::NotPng);
	}

	// IHDR: exact length, verified CRC.
	if chunk::read_be32(src, 8) != Some(13) { return Err(DecodeError::NotPng); }
	if chunk::read_be32(src, 29) != Some(chunk::crc32(&src[12..29])) {
		return Err(DecodeError::HeaderCrc32);
	}

	let width = chunk::read_be32(src, 16).unwrap_or(0);
	let height = chunk::read_be32(src, 20).unwrap_or(0);
	if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
		return Err(DecodeError::InvalidDimensions);
	}
	if u64::from(width) * u64::from(height) > MAX_PIXELS {
		return Err(DecodeError::InvalidDimensions);
	}

	// Bit depth 8, true color with or without alpha, and nothing fancy.
	if src[24] != 8 || src[26] != 0 || src[27] != 0 || src[28] != 0 {
		return Err(DecodeError::ForeignPng);
	}
	let channels = match src[25] {
		2 => 3,
		6 => 4,
		_ => return Err(DecodeError::ForeignPng),
	};

	// Walk the remaining chunks.
	let mut found_ident = false;
	let mut idat_ofs = 0_usize;
	let mut idat_len = 0_usize;
	let mut pos = 33;
	loop {
		if pos > src.len() || src.len() - pos < 12 { return Err(DecodeError::ChunkParsing); }

		let chunk_len = chunk::read_be32(src, pos)
			.ok_or(DecodeError::ChunkParsing)? as usize;
		if chunk_len > src.len() - pos - 12 { return Err(DecodeError::ChunkParsing); }

		let kind = [src[pos + 4], src[pos + 5], src[pos + 6], src[pos + 7]];
		if ! kind.iter().all(u8::is_ascii_alphabetic) {
			return Err(DecodeError::ChunkParsing);
		}

		// Every chunk but the IDAT gets its CRC verified.
		if cfg!(not(feature = "no-chunk-crc")) && kind != IDAT {
			let expected = chunk::read_be32(src, pos + 8 + chunk_len);
			if expected != Some(chunk::crc32(&src[pos + 4..pos + 8 + chunk_len])) {
				return Err(DecodeError::HeaderCrc32);
			}
		}

		match kind {
			IEND => break,
			IDAT => {
				// A second IDAT, or one before the self-identification
				// chunk, means this is somebody else's PNG.
				if idat_ofs != 0 || ! found_ident { return Err(DecodeError::ForeignPng); }
				if chunk_len < 7 { return Err(DecodeError::InvalidIdat); }
				idat_ofs = pos;
				idat_len = chunk_len;
			}
			chunk::IDENT_TYPE => {
				let payload = &src[pos + 8..pos + 8 + chunk_len];
				if
					found_ident ||
					chunk_len != 5 ||
					payload[..4] != chunk::IDENT_MAGIC ||
					payload[4] != chunk::IDENT_VERSION
				{
					return Err(DecodeError::ForeignPng);
				}
				found_ident = true;
			}
			_ =>
				// Ancillary chunks skip; unknown critical chunks disqualify.
				if kind[0] & 32 == 0 { return Err(DecodeError::ForeignPng); },
		}

		pos += 12 + chunk_len;
	}

	if ! found_ident || idat_ofs == 0 { return Err(DecodeError::ForeignPng); }

	Ok(Framing { width, height, channels, idat_ofs, idat_len })
}



#[cfg(test)]
mod test {
	use super::*;

	/// # Minimal Hand-Rolled Foreign PNG.
	///
	/// A structurally valid 1x1 RGB PNG with a stored-block zlib stream
	/// and no self-identification chunk.
	fn foreign_png() -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(&chunk::PNG_SIG);

		let mut ihdr = Vec::new();
		ihdr.extend_from_slice(&1_u32.to_be_bytes());
		ihdr.extend_from_slice(&1_u32.to_be_bytes());
		ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
		chunk::write_chunk(&mut out, *b"IHDR", &ihdr);

		// Filtered scanline: filter 0, pixel (1, 2, 3).
		let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&[0, 1, 2, 3], 6);
		chunk::write_chunk(&mut out, *b"IDAT", &zlib);
		chunk::write_chunk(&mut out, *b"IEND", &[]);
		out
	}

	#[test]
	fn t_not_png() {
		assert_eq!(info(&[]), Err(DecodeError::NotPng));
		assert_eq!(info(&[0_u8; 64]), Err(DecodeError::NotPng));

		let mut bad = foreign_png();
		bad[0] ^= 1;
		while bad.len() < MIN_FILE_SIZE { bad.push(0); }
		assert_eq!(info(&bad), Err(DecodeError::NotPng));
	}

	#[test]
	fn t_foreign_rejection() {
		// Well-formed, but not ours: no self-identification chunk.
		let png = foreign_png();
		assert_eq!(info(&png), Err(DecodeError::ForeignPng));
		assert_eq!(decode(&png, 3).map(|_| ()), Err(DecodeError::ForeignPng));
	}

	#[test]
	fn t_ihdr_crc() {
		let mut png = foreign_png();
		png[30] ^= 0xFF; // Inside the IHDR CRC.
		assert_eq!(info(&png), Err(DecodeError::HeaderCrc32));
	}

	#[test]
	fn t_bad_desired_channels() {
		assert_eq!(
			decode(&foreign_png(), 2).map(|_| ()),
			Err(DecodeError::InvalidChannels),
		);
	}

	#[test]
	fn t_bad_dimensions() {
		let mut png = foreign_png();
		png[16..20].copy_from_slice(&0_u32.to_be_bytes());
		// Zero width also breaks the IHDR CRC, so repair it.
		let crc = chunk::crc32(&png[12..29]);
		png[29..33].copy_from_slice(&crc.to_be_bytes());
		assert_eq!(info(&png), Err(DecodeError::InvalidDimensions));
	}
}
