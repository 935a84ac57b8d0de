/*!
# Prontopng: Errors.
*/

use std::error::Error;
use std::fmt;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Encoding Error.
///
/// The only way encoding can fail is bad input; compression shortfalls are
/// handled internally by falling back to stored (uncompressed) blocks.
pub enum EncodeError {
	/// # Invalid Channel Count.
	///
	/// Only 3 (RGB) and 4 (RGBA) channel images are supported.
	InvalidChannels,

	/// # Invalid Dimensions.
	///
	/// Width and height must be between `1` and `2^24`, and their product
	/// must not exceed `2^30`.
	InvalidDimensions,

	/// # Wrong Pixel Buffer Size.
	///
	/// The pixel slice must hold exactly `width * height * channels` bytes.
	PixelBufferSize,
}

impl EncodeError {
	#[must_use]
	/// # As Str.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::InvalidChannels => "channel count must be three or four",
			Self::InvalidDimensions => "image dimensions are out of range",
			Self::PixelBufferSize => "pixel buffer does not match the dimensions",
		}
	}
}

impl fmt::Display for EncodeError {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Error for EncodeError {}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Decoding Error.
///
/// All decode failures are recoverable at the application level; no partial
/// output is ever returned.
///
/// [`DecodeError::ForeignPng`] deserves special mention: it flags streams
/// that are valid-looking PNGs but were not produced by this crate's encoder.
/// Callers seeing it should retry with a general-purpose PNG library.
pub enum DecodeError {
	/// # Chunk Parsing Failed.
	///
	/// Malformed chunk framing: a truncated prefix, a length running past the
	/// end of the file, or a type code outside the ASCII-letter alphabet.
	ChunkParsing,

	/// # Dimensions Too Large.
	///
	/// The requested output exceeds what can be addressed on this host.
	DimensionsTooLarge,

	/// # Not Our PNG.
	///
	/// The file deviates from the restricted profile this crate emits; a
	/// general-purpose PNG decoder should be used instead.
	ForeignPng,

	/// # Header CRC Mismatch.
	///
	/// The IHDR or an ancillary chunk failed its CRC-32 check.
	HeaderCrc32,

	/// # Invalid Channel Count.
	///
	/// The requested output layout must be 3 (RGB) or 4 (RGBA) channels.
	InvalidChannels,

	/// # Invalid Dimensions.
	///
	/// The IHDR width/height fields are zero or out of range.
	InvalidDimensions,

	/// # Invalid IDAT.
	///
	/// The image data chunk is missing, duplicated, or too short.
	InvalidIdat,

	/// # Not a PNG.
	///
	/// The signature is wrong or the file is impossibly short.
	NotPng,
}

impl DecodeError {
	#[must_use]
	/// # As Str.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ChunkParsing => "malformed chunk framing",
			Self::DimensionsTooLarge => "dimensions exceed host limits",
			Self::ForeignPng => "not produced by this encoder; use a general png decoder",
			Self::HeaderCrc32 => "header crc32 mismatch",
			Self::InvalidChannels => "desired channel count must be three or four",
			Self::InvalidDimensions => "header dimensions are out of range",
			Self::InvalidIdat => "missing, duplicate, or undersized IDAT",
			Self::NotPng => "not a png file",
		}
	}
}

impl fmt::Display for DecodeError {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Error for DecodeError {}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Output Buffer Overflow.
///
/// Internal marker raised when a compressed stream would outgrow its
/// (pessimistically sized) output buffer. It never escapes the crate: the
/// encoder responds by rewriting the image with stored blocks instead.
pub(crate) struct SinkFull;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Unrecognized Stream.
///
/// Internal marker raised by the inflate routines whenever the data deviates
/// from the restricted Deflate shape the encoder produces. The public API
/// reports it as [`DecodeError::ForeignPng`].
pub(crate) struct ForeignStream;
