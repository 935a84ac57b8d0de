/*!
# Prontopng.

A very fast encoder and decoder for a restricted subset of PNG.

The files this crate writes are ordinary PNGs — any conformant reader can
open them — but internally every image uses one fixed compression shape:
a single dynamic-Huffman Deflate block, the Up row filter, and
back-references whose distance always equals the pixel stride. That
restriction keeps the encoder branch-light and lets the decoder run
table-driven with bulk copies, which is where the order-of-magnitude
speedup over general PNG libraries comes from.

The flip side: the decoder only accepts files this crate produced. It
tags its own output with a private ancillary chunk and refuses anything
without it — or anything that strays from the restricted Deflate shape —
with [`DecodeError::ForeignPng`], at which point the caller should fall
back to a general-purpose PNG library.

Supported images are 8-bit RGB or RGBA, up to `2^24` pixels per axis and
`2^30` pixels total. No interlacing, no palettes, no ancillary chunks
beyond the self-identification tag.
*/

#![deny(unsafe_code)]

#![warn(
	clippy::filetype_is_file,
	clippy::integer_division,
	clippy::needless_borrow,
	clippy::nursery,
	clippy::pedantic,
	clippy::perf,
	clippy::suboptimal_flops,
	clippy::unneeded_field_pattern,
	macro_use_extern_crate,
	missing_copy_implementations,
	missing_debug_implementations,
	missing_docs,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unreachable_pub,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]

#![allow(
	clippy::cast_possible_truncation,
	clippy::module_name_repetitions,
)]

mod bits;
mod chunk;
mod decode;
mod deflate;
mod encode;
mod error;
mod huffman;
mod inflate;
mod tables;

pub use error::{
	DecodeError,
	EncodeError,
};

use std::ops::BitOr;
use std::ops::BitOrAssign;



/// # Maximum Width/Height.
pub(crate) const MAX_DIMENSION: u32 = 1 << 24;

/// # Maximum Total Pixels.
pub(crate) const MAX_PIXELS: u64 = 1 << 30;



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Encoding Flags.
///
/// A tiny bitset; combine members with `|`. Unrecognized bits are
/// ignored.
pub struct EncodeFlags(u8);

impl EncodeFlags {
	/// # No Flags.
	pub const NONE: Self = Self(0);

	/// # Two-Pass Encoding.
	///
	/// Build image-specific Huffman tables from observed frequencies
	/// instead of replaying the pre-trained ones. Slower, usually a few
	/// percent smaller.
	pub const SLOWER: Self = Self(0b0000_0001);

	/// # Skip Compression.
	///
	/// Go straight to stored (uncompressed) blocks.
	pub const FORCE_UNCOMPRESSED: Self = Self(0b0000_0010);

	#[must_use]
	/// # Contains?
	pub const fn contains(self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}
}

impl BitOr for EncodeFlags {
	type Output = Self;

	#[inline]
	fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl BitOrAssign for EncodeFlags {
	#[inline]
	fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}



#[derive(Debug, Clone)]
/// # A Decoded Image.
pub struct DecodedImage {
	/// # Width (Pixels).
	pub width: u32,

	/// # Height (Pixels).
	pub height: u32,

	/// # Channels Stored in the File (3 or 4).
	///
	/// May differ from the requested output layout.
	pub channels_in_file: u32,

	/// # Pixel Data.
	///
	/// Row-major, top to bottom, `width * height * desired_channels`
	/// bytes.
	pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Image Details.
///
/// What [`get_info`] reports without touching the pixel data.
pub struct ImageInfo {
	/// # Width (Pixels).
	pub width: u32,

	/// # Height (Pixels).
	pub height: u32,

	/// # Channels Stored in the File (3 or 4).
	pub channels_in_file: u32,
}



/// # Encode an Image.
///
/// Pixels are 8-bit samples, row-major, top to bottom, `channels ∈ {3, 4}`
/// (RGB or RGBA). Returns a complete PNG file.
///
/// ## Errors
///
/// Only invalid input fails: bad channel counts, out-of-range dimensions,
/// or a pixel slice that does not match them. Incompressible data is not
/// an error; it falls back to stored blocks transparently.
///
/// ## Examples
///
/// ```
/// let png = prontopng::encode(
///     &[10, 20, 30],
///     1,
///     1,
///     3,
///     prontopng::EncodeFlags::NONE,
/// ).unwrap();
///
/// let back = prontopng::decode(&png, 3).unwrap();
/// assert_eq!(back.pixels, &[10, 20, 30]);
/// ```
pub fn encode(
	pixels: &[u8],
	width: u32,
	height: u32,
	channels: u32,
	flags: EncodeFlags,
) -> Result<Vec<u8>, EncodeError> {
	if channels != 3 && channels != 4 {
		return Err(EncodeError::InvalidChannels);
	}
	if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
		return Err(EncodeError::InvalidDimensions);
	}

	let total = u64::from(width) * u64::from(height);
	if total > MAX_PIXELS { return Err(EncodeError::InvalidDimensions); }
	if pixels.len() as u64 != total * u64::from(channels) {
		return Err(EncodeError::PixelBufferSize);
	}

	Ok(encode::encode_trusted(pixels, width, height, channels, flags))
}

/// # Decode an Image.
///
/// `desired_channels ∈ {3, 4}` selects the output layout independently of
/// what the file stores: decoding an RGB file to four channels fills the
/// alpha with `0xFF`; decoding an RGBA file to three drops it.
///
/// ## Errors
///
/// Corrupt files produce the specific error they earned;
/// [`DecodeError::ForeignPng`] means a well-formed PNG this crate did not
/// write, which a general-purpose decoder should handle instead. No
/// partial output is returned on any error.
pub fn decode(src: &[u8], desired_channels: u32) -> Result<DecodedImage, DecodeError> {
	decode::decode(src, desired_channels)
}

/// # Peek at an Image.
///
/// Validate the framing and self-identification chunk and report the
/// dimensions and stored channel count, without decoding pixel data.
///
/// ## Errors
///
/// Same taxonomy as [`decode`], minus anything that requires looking at
/// the compressed stream.
pub fn get_info(src: &[u8]) -> Result<ImageInfo, DecodeError> {
	decode::info(src)
}



#[cfg(test)]
mod test {
	use super::*;

	/// # Cheap Deterministic Randomness.
	///
	/// A multiply-with-carry generator; good enough to make incompressible
	/// test pixels, stable across platforms.
	struct Ran {
		w: u32,
		z: u32,
	}

	impl Ran {
		const fn new() -> Self { Self { w: 1, z: 2 } }

		fn next(&mut self) -> u32 {
			self.z = 36_969_u32.wrapping_mul(self.z & 65_535).wrapping_add(self.z >> 16);
			self.w = 18_000_u32.wrapping_mul(self.w & 65_535).wrapping_add(self.w >> 16);
			(self.z << 16).wrapping_add(self.w)
		}

		fn fill(&mut self, buf: &mut [u8]) {
			for b in buf { *b = self.next() as u8; }
		}
	}

	/// # Extract the IDAT Payload.
	///
	/// The encoder's layout is fixed, so the zlib stream always starts at
	/// byte 58, with its length four bytes earlier.
	fn idat(png: &[u8]) -> &[u8] {
		let len = u32::from_be_bytes([png[50], png[51], png[52], png[53]]) as usize;
		&png[58..58 + len]
	}

	/// # Reference Unfilter.
	///
	/// Undo the scanline filters the slow, obvious way, for checking the
	/// encoder against an independent inflate.
	fn unfilter(filtered: &[u8], w: usize, h: usize, c: usize) -> Vec<u8> {
		let bpl = w * c;
		let mut out = vec![0_u8; bpl * h];
		for y in 0..h {
			let row = &filtered[y * (bpl + 1)..(y + 1) * (bpl + 1)];
			match row[0] {
				0 => out[y * bpl..(y + 1) * bpl].copy_from_slice(&row[1..]),
				2 => for i in 0..bpl {
					let up = out[(y - 1) * bpl + i];
					out[y * bpl + i] = row[1 + i].wrapping_add(up);
				},
				f => panic!("unexpected filter byte {f}"),
			}
		}
		out
	}

	/// # Round-Trip Both Encoders.
	fn roundtrip(pixels: &[u8], w: u32, h: u32, c: u32) {
		for flags in [EncodeFlags::NONE, EncodeFlags::SLOWER] {
			let png = encode(pixels, w, h, c, flags).unwrap();
			let back = decode(&png, c).unwrap();
			assert_eq!(back.width, w);
			assert_eq!(back.height, h);
			assert_eq!(back.channels_in_file, c);
			assert_eq!(back.pixels, pixels, "round-trip failed ({flags:?})");
		}
	}

	#[test]
	fn t_roundtrip_1x1() {
		let pixels = [10_u8, 20, 30];
		roundtrip(&pixels, 1, 1, 3);

		let png = encode(&pixels, 1, 1, 3, EncodeFlags::NONE).unwrap();

		// Signature and self-identification, byte for byte.
		assert_eq!(&png[..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
		assert_eq!(&png[37..41], b"fdEC");
		assert_eq!(&png[41..46], &[0x52, 0x24, 0x93, 0xE3, 0x00]);

		let info = get_info(&png).unwrap();
		assert_eq!(
			info,
			ImageInfo { width: 1, height: 1, channels_in_file: 3 },
		);
	}

	#[test]
	fn t_roundtrip_4x1_rgba() {
		roundtrip(&[0_u8; 16], 4, 1, 4);
	}

	#[test]
	fn t_roundtrip_2x2_filter() {
		// Identical rows: row one must arrive Up-filtered to all zeroes.
		let pixels = [1_u8, 2, 3, 4, 5, 6, 1, 2, 3, 4, 5, 6];
		roundtrip(&pixels, 2, 2, 3);

		let png = encode(&pixels, 2, 2, 3, EncodeFlags::NONE).unwrap();
		let filtered = miniz_oxide::inflate::decompress_to_vec_zlib(idat(&png)).unwrap();
		assert_eq!(filtered, [0, 1, 2, 3, 4, 5, 6, 2, 0, 0, 0, 0, 0, 0]);
	}

	#[test]
	fn t_roundtrip_flat_color() {
		// A flat image compresses to almost nothing: proof the encoder is
		// using back-references and not just literals.
		let pixels: Vec<u8> = std::iter::repeat([7_u8, 8, 9, 255])
			.take(64)
			.flatten()
			.collect();
		roundtrip(&pixels, 64, 1, 4);

		let png = encode(&pixels, 64, 1, 4, EncodeFlags::NONE).unwrap();
		assert!(idat(&png).len() < 100, "flat image failed to compress");
	}

	#[test]
	fn t_roundtrip_random() {
		// Uniform noise: incompressible, so this lands on the stored-block
		// fallback, which must still round-trip.
		let mut pixels = vec![0_u8; 256 * 256 * 4];
		Ran::new().fill(&mut pixels);
		roundtrip(&pixels, 256, 256, 4);
	}

	#[test]
	fn t_roundtrip_max_width() {
		let mut pixels = vec![0_u8; 8193 * 3];
		Ran::new().fill(&mut pixels[..96]);
		roundtrip(&pixels, 8193, 1, 3);
	}

	#[test]
	fn t_forced_uncompressed() {
		let pixels = [1_u8, 2, 3, 4, 5, 6];
		let png = encode(&pixels, 2, 1, 3, EncodeFlags::FORCE_UNCOMPRESSED).unwrap();

		// The zlib stream must hold stored blocks (BTYPE 0).
		let z = idat(&png);
		assert_eq!(&z[..2], &[0x78, 0x01]);
		assert_eq!(z[2] & 6, 0);

		let back = decode(&png, 3).unwrap();
		assert_eq!(back.pixels, pixels);
	}

	#[test]
	fn t_interop() {
		// The acid test for spec conformance: a third-party inflate must
		// accept our stream, and unfiltering its output must reproduce the
		// pixels.
		let mut pixels = vec![0_u8; 31 * 17 * 3];
		for (i, b) in pixels.iter_mut().enumerate() {
			*b = ((i / 3) % 97) as u8; // A gently repetitive gradient.
		}

		for flags in [EncodeFlags::NONE, EncodeFlags::SLOWER, EncodeFlags::FORCE_UNCOMPRESSED] {
			let png = encode(&pixels, 31, 17, 3, flags).unwrap();
			let filtered = miniz_oxide::inflate::decompress_to_vec_zlib(idat(&png)).unwrap();
			assert_eq!(unfilter(&filtered, 31, 17, 3), pixels, "interop failed ({flags:?})");
		}
	}

	#[test]
	fn t_channel_reinterpretation() {
		// RGB in, RGBA out: opaque alpha appears.
		let rgb = [10_u8, 20, 30, 40, 50, 60];
		let png = encode(&rgb, 2, 1, 3, EncodeFlags::NONE).unwrap();
		let back = decode(&png, 4).unwrap();
		assert_eq!(back.channels_in_file, 3);
		assert_eq!(back.pixels, [10, 20, 30, 255, 40, 50, 60, 255]);

		// RGBA in, RGB out: alpha vanishes.
		let rgba = [1_u8, 2, 3, 128, 4, 5, 6, 7];
		let png = encode(&rgba, 2, 1, 4, EncodeFlags::NONE).unwrap();
		let back = decode(&png, 3).unwrap();
		assert_eq!(back.channels_in_file, 4);
		assert_eq!(back.pixels, [1, 2, 3, 4, 5, 6]);

		// Same again through the stored path.
		let png = encode(&rgba, 2, 1, 4, EncodeFlags::FORCE_UNCOMPRESSED).unwrap();
		assert_eq!(decode(&png, 3).unwrap().pixels, [1, 2, 3, 4, 5, 6]);
	}

	#[test]
	fn t_truncation() {
		let pixels = [10_u8, 20, 30];
		let png = encode(&pixels, 1, 1, 3, EncodeFlags::NONE).unwrap();

		// Chopping any amount off the end must error, never wedge.
		for cut in 1..png.len() {
			assert!(
				decode(&png[..png.len() - cut], 3).is_err(),
				"decode accepted a file truncated by {cut}",
			);
		}
	}

	#[test]
	fn t_bit_flips() {
		let mut pixels = vec![0_u8; 24 * 4 * 3];
		Ran::new().fill(&mut pixels[..48]);
		let png = encode(&pixels, 24, 4, 3, EncodeFlags::SLOWER).unwrap();
		let idat_len = idat(&png).len();

		// Structural damage is always caught: a bad zlib header, a cleared
		// BFINAL, a hijacked block type.
		for (pos, bit) in [(58, 0), (58 + 1, 3), (58 + 2, 0), (58 + 2, 1)] {
			let mut bad = png.clone();
			bad[pos] ^= 1 << bit;
			assert!(decode(&bad, 3).is_err(), "flip at {pos}:{bit} slipped through");
		}

		// Arbitrary flips anywhere in the payload must resolve cleanly —
		// an error, or a decode within bounds — never a panic or overrun.
		for i in 0..idat_len {
			let mut bad = png.clone();
			bad[58 + i] ^= 1 << (i % 8);
			if let Ok(out) = decode(&bad, 3) {
				assert_eq!(out.pixels.len(), pixels.len());
			}
		}
	}

	#[test]
	fn t_deterministic() {
		let mut pixels = vec![0_u8; 16 * 16 * 4];
		Ran::new().fill(&mut pixels[..64]);

		for flags in [EncodeFlags::NONE, EncodeFlags::SLOWER] {
			let a = encode(&pixels, 16, 16, 4, flags).unwrap();
			let b = encode(&pixels, 16, 16, 4, flags).unwrap();
			assert_eq!(a, b);
		}

		// And everything before the IDAT length is flag-independent.
		let a = encode(&pixels, 16, 16, 4, EncodeFlags::NONE).unwrap();
		let b = encode(&pixels, 16, 16, 4, EncodeFlags::SLOWER).unwrap();
		assert_eq!(a[..50], b[..50]);
	}

	#[test]
	fn t_ancillary_chunks() {
		let pixels = [10_u8, 20, 30];
		let png = encode(&pixels, 1, 1, 3, EncodeFlags::NONE).unwrap();

		// Splice an ancillary chunk in front of the IDAT: it should be
		// CRC-checked, then skipped.
		let mut spliced = png[..50].to_vec();
		crate::chunk::write_chunk(&mut spliced, *b"tEXt", b"Comment\0hi");
		spliced.extend_from_slice(&png[50..]);
		assert_eq!(decode(&spliced, 3).unwrap().pixels, pixels);

		// Corrupt its CRC and the file is rejected outright.
		let mut corrupt = spliced.clone();
		let crc_at = 50 + 8 + 10;
		corrupt[crc_at] ^= 0xFF;
		assert_eq!(decode(&corrupt, 3).map(|_| ()), Err(DecodeError::HeaderCrc32));

		// An unknown critical chunk, by contrast, means "not ours".
		let mut critical = png[..50].to_vec();
		crate::chunk::write_chunk(&mut critical, *b"PLTE", &[0, 0, 0]);
		critical.extend_from_slice(&png[50..]);
		assert_eq!(decode(&critical, 3).map(|_| ()), Err(DecodeError::ForeignPng));
	}

	#[test]
	fn t_encode_validation() {
		let px = [0_u8; 12];
		assert_eq!(
			encode(&px, 2, 2, 2, EncodeFlags::NONE),
			Err(EncodeError::InvalidChannels),
		);
		assert_eq!(
			encode(&px, 0, 4, 3, EncodeFlags::NONE),
			Err(EncodeError::InvalidDimensions),
		);
		assert_eq!(
			encode(&px, (1 << 24) + 1, 1, 3, EncodeFlags::NONE),
			Err(EncodeError::InvalidDimensions),
		);
		// Per-axis fine, product over budget.
		assert_eq!(
			encode(&px, 1 << 23, 1 << 23, 3, EncodeFlags::NONE),
			Err(EncodeError::InvalidDimensions),
		);
		assert_eq!(
			encode(&px, 2, 2, 4, EncodeFlags::NONE),
			Err(EncodeError::PixelBufferSize),
		);
	}
}
