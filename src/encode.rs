/*!
# Prontopng: Encoding.

Filtering, orchestration, and framing. Rows are staged through a scratch
buffer — filter byte first, then the (possibly delta-coded) samples — and
handed to whichever Deflate path the flags call for. If the compressed
stream would outgrow its buffer, the rows are re-staged unfiltered and
written as stored blocks instead, so encoding never fails on content.

The output layout is fixed: signature, IHDR, the self-identification
chunk, one IDAT, IEND. The first 58 bytes (through the IDAT length and
type) are reserved up front so the zlib stream can be written in place and
the header patched afterwards.
*/

use crate::chunk;
use crate::deflate;
use crate::EncodeFlags;



/// # Reserved Header Bytes.
///
/// Signature (8) + IHDR (25) + self-identification chunk (17) + IDAT
/// length and type (8).
const PNG_HEADER_SIZE: usize = 58;



/// # Encode (Validated Input).
///
/// The public wrapper has already vetted dimensions, channel count, and
/// buffer size; from here on nothing can fail.
pub(crate) fn encode_trusted(
	pixels: &[u8],
	width: u32,
	height: u32,
	channels: u32,
	flags: EncodeFlags,
) -> Vec<u8> {
	let w = width as usize;
	let h = height as usize;
	let c = channels as usize;
	let raw_len = (w * c + 1) * h;

	// Stage the filtered scanlines: None for row zero, Up thereafter.
	let filtered = filter_rows(pixels, w, h, c, true);

	// The compressed stream gets a buffer the size of the raw data; if it
	// cannot beat that, it is not worth keeping.
	let mut out = vec![0_u8; (PNG_HEADER_SIZE + raw_len + 7) & ! 7];

	let mut zlib_len = 0;
	if ! flags.contains(EncodeFlags::FORCE_UNCOMPRESSED) {
		let dst = &mut out[PNG_HEADER_SIZE..];
		let written = match (c, flags.contains(EncodeFlags::SLOWER)) {
			(3, true) => deflate::compress_two_pass::<3>(&filtered, width, height, dst),
			(3, false) => deflate::compress_one_pass::<3>(&filtered, width, height, dst),
			(_, true) => deflate::compress_two_pass::<4>(&filtered, width, height, dst),
			(_, false) => deflate::compress_one_pass::<4>(&filtered, width, height, dst),
		};
		if let Ok(n) = written { zlib_len = n; }
	}

	if zlib_len == 0 {
		// Compression was skipped or came up short. Re-stage with filter
		// None everywhere and write stored blocks into an exactly-sized
		// buffer.
		let filtered = filter_rows(pixels, w, h, c, false);
		let blocks = raw_len.div_ceil(65_535);
		out.resize(PNG_HEADER_SIZE + 6 + raw_len + blocks * 5, 0);

		match deflate::write_stored(&filtered[..raw_len], &mut out[PNG_HEADER_SIZE..]) {
			Ok(n) => { zlib_len = n; }
			// The buffer covers the worst case by construction.
			Err(_) => unreachable!("stored-block buffer undersized"),
		}
	}

	out.truncate(PNG_HEADER_SIZE + zlib_len);
	write_header(&mut out, width, height, channels, zlib_len as u32);

	// Close out the IDAT (CRC over type + payload), then IEND.
	let idat_crc = chunk::crc32(&out[54..]);
	out.extend_from_slice(&idat_crc.to_be_bytes());
	chunk::write_chunk(&mut out, *b"IEND", &[]);

	out
}

/// # Stage Filtered Scanlines.
///
/// Produce the byte stream Deflate will see: each row prefixed by its
/// filter tag, with Up rows delta-coded modulo 256 against the row above.
/// The buffer carries four bytes of zero padding so the tokenizer's
/// word-at-a-time pixel reads never run off the end.
fn filter_rows(pixels: &[u8], w: usize, h: usize, c: usize, up: bool) -> Vec<u8> {
	let bpl = w * c;
	let mut out = vec![0_u8; (bpl + 1) * h + 4];

	let mut pos = 0;
	for y in 0..h {
		let row = &pixels[y * bpl..(y + 1) * bpl];
		if up && y != 0 {
			out[pos] = 2;
			pos += 1;

			let prev = &pixels[(y - 1) * bpl..y * bpl];
			for ((d, &s), &p) in out[pos..pos + bpl].iter_mut().zip(row).zip(prev) {
				*d = s.wrapping_sub(p);
			}
		}
		else {
			out[pos] = 0;
			pos += 1;
			out[pos..pos + bpl].copy_from_slice(row);
		}
		pos += bpl;
	}

	out
}

/// # Patch In the File Header.
///
/// Signature, IHDR (with CRC), the self-identification chunk (with CRC),
/// and the IDAT length/type, all in their reserved slots.
fn write_header(out: &mut [u8], width: u32, height: u32, channels: u32, idat_len: u32) {
	out[..8].copy_from_slice(&chunk::PNG_SIG);

	// IHDR.
	out[8..12].copy_from_slice(&13_u32.to_be_bytes());
	out[12..16].copy_from_slice(b"IHDR");
	out[16..20].copy_from_slice(&width.to_be_bytes());
	out[20..24].copy_from_slice(&height.to_be_bytes());
	out[24] = 8; // Bit depth.
	out[25] = if channels == 3 { 2 } else { 6 }; // Color type.
	out[26] = 0; // Compression.
	out[27] = 0; // Filter method.
	out[28] = 0; // Interlace.
	let crc = chunk::crc32(&out[12..29]);
	out[29..33].copy_from_slice(&crc.to_be_bytes());

	// Self-identification.
	out[33..37].copy_from_slice(&5_u32.to_be_bytes());
	out[37..41].copy_from_slice(&chunk::IDENT_TYPE);
	out[41..45].copy_from_slice(&chunk::IDENT_MAGIC);
	out[45] = chunk::IDENT_VERSION;
	let crc = chunk::crc32(&out[37..46]);
	out[46..50].copy_from_slice(&crc.to_be_bytes());

	// IDAT length and type; its payload is already in place and its CRC
	// comes later.
	out[50..54].copy_from_slice(&idat_len.to_be_bytes());
	out[54..58].copy_from_slice(b"IDAT");
}
