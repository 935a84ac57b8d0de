/*!
# Prontopng: Chunks and Checksums.

PNG frames everything as `length ‖ type ‖ payload ‖ crc32(type ‖ payload)`,
lengths and checksums big-endian. The helpers here cover both directions,
along with the two checksum adapters the rest of the crate leans on:
CRC-32 (delegated to `crc32fast`) for chunk integrity, and Adler-32
(delegated to `adler32`) for the zlib trailer.
*/

use adler32::RollingAdler32;



/// # PNG File Signature.
pub(crate) const PNG_SIG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// # Self-Identification Chunk Type.
///
/// A private, ancillary, do-not-copy chunk marking files written by this
/// encoder. The decoder refuses files without it.
pub(crate) const IDENT_TYPE: [u8; 4] = *b"fdEC";

/// # Self-Identification Magic.
pub(crate) const IDENT_MAGIC: [u8; 4] = [82, 36, 147, 227];

/// # Self-Identification Format Version.
pub(crate) const IDENT_VERSION: u8 = 0;



#[inline]
/// # CRC-32.
///
/// One-shot CRC-32 over `data` (seed zero). The heavy lifting belongs to
/// `crc32fast`; this crate only cares about the answer.
pub(crate) fn crc32(data: &[u8]) -> u32 { crc32fast::hash(data) }

#[inline]
/// # Adler-32.
///
/// One-shot Adler-32 over `data` (seed one), for the zlib stream trailer.
pub(crate) fn adler32(data: &[u8]) -> u32 {
	RollingAdler32::from_buffer(data).hash()
}



/// # Append a Chunk.
///
/// Write a complete chunk — length, type, payload, CRC — onto `out`.
pub(crate) fn write_chunk(out: &mut Vec<u8>, kind: [u8; 4], payload: &[u8]) {
	out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
	let crc_from = out.len();
	out.extend_from_slice(&kind);
	out.extend_from_slice(payload);
	let crc = crc32(&out[crc_from..]);
	out.extend_from_slice(&crc.to_be_bytes());
}

#[inline]
/// # Read a Big-Endian u32.
///
/// Pull four bytes starting at `pos`, or `None` if the slice comes up
/// short.
pub(crate) fn read_be32(src: &[u8], pos: usize) -> Option<u32> {
	let chunk = src.get(pos..pos + 4)?;
	Some(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_crc32() {
		// The well-known check value.
		assert_eq!(crc32(b"123456789"), 0xCBF4_3926);

		// And the IEND chunk's famous constant.
		assert_eq!(crc32(b"IEND"), 0xAE42_6082);
	}

	#[test]
	fn t_adler32() {
		assert_eq!(adler32(b""), 1);
		assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
	}

	#[test]
	fn t_write_chunk() {
		let mut out = Vec::new();
		write_chunk(&mut out, *b"IEND", &[]);
		assert_eq!(
			out,
			[0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82],
		);
	}

	#[test]
	fn t_read_be32() {
		let src = [0_u8, 0, 1, 2, 0xFF];
		assert_eq!(read_be32(&src, 0), Some(0x0000_0102));
		assert_eq!(read_be32(&src, 1), Some(0x0001_02FF));
		assert_eq!(read_be32(&src, 2), None);
	}
}
