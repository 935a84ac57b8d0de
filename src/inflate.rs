/*!
# Prontopng: Restricted Inflate.

The decoder only accepts the streams its own encoder writes: one final
Deflate block, dynamic tables with a single one-bit distance code at the
stride's symbol, Up-or-None row filters, stride-aligned match lengths that
never cross a scanline. Anything else bails with [`ForeignStream`] and the
caller hands the file to a general-purpose PNG library.

Decoding is table-driven: every literal/length code resolves in one probe
of a `2^12`-entry table, and when two consecutive literal codes fit inside
the probe width the second rides along in the same entry, halving lookups
in the common case.

Unfiltering happens inline. Matches at distance-equal-to-stride expand to
"repeat the previous delta", so a run over a zero delta is a straight copy
of the previous row.
*/

use crate::deflate::{
	NUM_DIST,
	NUM_LITLEN,
};
use crate::error::ForeignStream;
use crate::tables::{
	CODE_LENGTH_ORDER,
	MATCH_LEN_BASE,
	MATCH_LEN_EXTRA,
};



/// # Lookup Table Probe Width (Bits).
const TABLE_BITS: u32 = 12;

/// # Lookup Table Size.
const TABLE_SIZE: usize = 1 << TABLE_BITS;

/// # Symbol Mask (Nine Bits).
const SYM_MASK: u32 = 511;

/// # End-of-Block Symbol.
const END_OF_BLOCK: u32 = 256;



/// # Bit Source.
///
/// The inverse of the encoder's sink: a 64-bit accumulator topped up four
/// bytes at a time, little-endian. Refilling reads ahead of the symbols
/// being decoded — by design, since the zlib trailer and the chunk framing
/// behind it guarantee slack — and a refill that would run off the slice
/// is the universal "stream ended early" failure.
struct BitSource<'a> {
	/// # Source Bytes.
	src: &'a [u8],

	/// # Read Cursor.
	ofs: usize,

	/// # Pending Bits.
	buf: u64,

	/// # Pending Bit Count.
	len: u32,
}

impl<'a> BitSource<'a> {
	/// # New.
	///
	/// Prime the accumulator with the first four bytes after `ofs`.
	fn new(src: &'a [u8], ofs: usize) -> Result<Self, ForeignStream> {
		let mut out = Self { src, ofs, buf: 0, len: 0 };
		out.refill()?;
		Ok(out)
	}

	#[inline]
	/// # Top Up to At Least 32 Bits.
	fn refill(&mut self) -> Result<(), ForeignStream> {
		if self.len < 32 {
			let end = self.ofs + 4;
			if end > self.src.len() { return Err(ForeignStream); }
			let next = u32::from_le_bytes([
				self.src[self.ofs],
				self.src[self.ofs + 1],
				self.src[self.ofs + 2],
				self.src[self.ofs + 3],
			]);
			self.buf |= u64::from(next) << self.len;
			self.ofs = end;
			self.len += 32;
		}
		Ok(())
	}

	#[inline]
	/// # Peek the Probe Window.
	fn peek(&self) -> usize {
		debug_assert!(self.len >= TABLE_BITS, "BUG: peeking a drained accumulator?!");
		(self.buf & (TABLE_SIZE as u64 - 1)) as usize
	}

	#[inline]
	/// # Read Bits (Refilling).
	fn get(&mut self, nbits: u32) -> Result<u32, ForeignStream> {
		let out = (self.buf & ((1_u64 << nbits) - 1)) as u32;
		self.buf >>= nbits;
		self.len -= nbits;
		self.refill()?;
		Ok(out)
	}

	#[inline]
	/// # Skip Bits (Refilling).
	fn skip(&mut self, nbits: u32) -> Result<(), ForeignStream> {
		self.buf >>= nbits;
		self.len -= nbits;
		self.refill()
	}

	#[inline]
	/// # Read Bits (No Refill).
	///
	/// Only for small reads immediately after a refilling operation.
	fn get_ne(&mut self, nbits: u32) -> u32 {
		debug_assert!(self.len >= nbits, "BUG: over-reading the accumulator?!");
		let out = (self.buf & ((1_u64 << nbits) - 1)) as u32;
		self.buf >>= nbits;
		self.len -= nbits;
		out
	}

	#[inline]
	/// # Skip Bits (No Refill).
	fn skip_ne(&mut self, nbits: u32) {
		debug_assert!(self.len >= nbits, "BUG: over-skipping the accumulator?!");
		self.buf >>= nbits;
		self.len -= nbits;
	}
}



/// # Build a Decoder Table.
///
/// Reconstruct canonical codes from `sizes` and spread each across every
/// probe index sharing its low bits. Each entry packs the symbol in its
/// low nine bits and the code length in the four above; the completeness
/// check rejects any length set that under- or over-subscribes the code
/// space, except for the deliberate single-code tables.
fn build_decoder_table(
	sizes: &[u8],
	table: &mut [u32; TABLE_SIZE],
) -> Result<(), ForeignStream> {
	let mut num_codes = [0_u32; 16];
	for &s in sizes {
		if s > 15 { return Err(ForeignStream); }
		num_codes[s as usize] += 1;
	}

	let mut next_code = [0_u32; 17];
	let mut total = 0_u32;
	for i in 1..=15 {
		total = (total + num_codes[i]) << 1;
		next_code[i + 1] = total;
	}

	if total != 0x1_0000 {
		// Short of one special case — a lone code, as the distance table
		// always is — an incomplete (or oversubscribed) code is garbage.
		let used: u32 = num_codes[1..].iter().sum();
		if used != 1 { return Err(ForeignStream); }
	}

	let mut codes = [0_u32; NUM_LITLEN];
	for (c, &s) in codes.iter_mut().zip(sizes.iter()) {
		*c = next_code[s as usize];
		next_code[s as usize] += 1;
	}

	table.fill(0);
	for (sym, &size) in sizes.iter().enumerate() {
		if size == 0 { continue; }

		let wire = codes[sym].reverse_bits() >> (32 - u32::from(size));
		let entry = sym as u32 | (u32::from(size) << 9);

		let step = 1_usize << size;
		let mut pos = wire as usize;
		while pos < TABLE_SIZE {
			table[pos] = entry;
			pos += step;
		}
	}

	Ok(())
}

/// # Parse the Dynamic-Table Preamble.
///
/// Read HLIT/HDIST/HCLEN, decode the code-length alphabet, expand the
/// run-length-coded size lists, and gate hard on the restricted shape:
/// the distance alphabet must hold exactly one code, one bit long, at the
/// stride's symbol, and no literal/length code may be wider than the probe.
///
/// On success `lit_table` is ready for the fast loop, including the
/// packed-second-literal acceleration.
fn prepare_dynamic_block(
	bits: &mut BitSource,
	channels: usize,
	lit_table: &mut [u32; TABLE_SIZE],
) -> Result<(), ForeignStream> {
	let num_lit = bits.get(5)? as usize + 257;
	let num_dist = bits.get(5)? as usize + 1;
	if num_dist != channels { return Err(ForeignStream); }

	let total = num_lit + num_dist;
	if total > NUM_LITLEN + NUM_DIST { return Err(ForeignStream); }

	let num_cl = bits.get(4)? as usize + 4;
	let mut cl_sizes = [0_u8; 19];
	for &o in &CODE_LENGTH_ORDER[..num_cl] {
		cl_sizes[o as usize] = bits.get(3)? as u8;
	}

	let mut cl_table = [0_u32; TABLE_SIZE];
	build_decoder_table(&cl_sizes, &mut cl_table)?;

	// Expand the packed size lists, tracking the narrowest literal code for
	// the packing pass below.
	let mut code_sizes = [0_u8; NUM_LITLEN + NUM_DIST];
	let mut min_code_size = 15_u32;
	let mut cur = 0_usize;
	while cur < total {
		let entry = cl_table[bits.peek()];
		let len = (entry >> 9) & 15;
		if len == 0 { return Err(ForeignStream); }
		bits.skip(len)?;

		let sym = entry & SYM_MASK;
		if sym <= 15 {
			// Codes wider than the probe cannot come from our encoder.
			if sym > TABLE_BITS { return Err(ForeignStream); }
			if sym != 0 { min_code_size = min_code_size.min(sym); }
			code_sizes[cur] = sym as u8;
			cur += 1;
			continue;
		}

		let (rep_len, rep_size) = match sym {
			16 =>
				if cur == 0 { return Err(ForeignStream); }
				else { (bits.get(2)? + 3, code_sizes[cur - 1]) },
			17 => (bits.get(3)? + 3, 0),
			_ => (bits.get(7)? + 11, 0),
		};

		if cur + rep_len as usize > total { return Err(ForeignStream); }
		for _ in 0..rep_len {
			code_sizes[cur] = rep_size;
			cur += 1;
		}
	}

	// The distance gate: one code total, one bit wide, at the stride's
	// symbol — and its wire value must be zero, which "one code total"
	// guarantees for a canonical table.
	let dist_total: u32 = code_sizes[num_lit..total].iter().map(|&s| u32::from(s)).sum();
	if dist_total != 1 || code_sizes[num_lit + channels - 1] != 1 {
		return Err(ForeignStream);
	}

	build_decoder_table(&code_sizes[..num_lit], lit_table)?;

	// Pack a second literal into any entry with room left in the probe for
	// its successor.
	for i in 0..TABLE_SIZE {
		let entry = lit_table[i];
		if entry & 256 != 0 { continue; }

		let sym_bits = (entry >> 9) & 15;
		if sym_bits == 0 { continue; }

		let bits_left = TABLE_BITS - sym_bits;
		if bits_left < min_code_size { continue; }

		let next = lit_table[i >> sym_bits];
		let next_bits = (next >> 9) & 15;
		if next_bits == 0 || bits_left < next_bits { continue; }

		lit_table[i] |= ((next & SYM_MASK) << 16) | (next_bits << 25);
	}

	Ok(())
}



/// # Inflate Into Pixels.
///
/// Decode a whole zlib stream straight into the caller's pixel buffer,
/// unfiltering as it goes and converting between 3- and 4-channel layouts
/// on the fly. `src` starts at the IDAT payload but extends through the
/// rest of the file; the bit source's read-ahead depends on that slack.
pub(crate) fn inflate_pixels<const SRC: usize, const DST: usize>(
	src: &[u8],
	zlib_len: usize,
	dst: &mut [u8],
	width: usize,
	height: usize,
) -> Result<(), ForeignStream> {
	if src.len() < zlib_len + 4 || zlib_len < 7 { return Err(ForeignStream); }
	if src[0] != 0x78 || src[1] != 0x01 { return Err(ForeignStream); }

	// Stored blocks are their own little world.
	if src[2] & 6 == 0 {
		return inflate_stored::<SRC, DST>(src, zlib_len, dst, width, height);
	}

	let mut bits = BitSource::new(src, 2)?;
	let bfinal = bits.get(1)?;
	let btype = bits.get(2)?;
	if bfinal != 1 || btype != 2 { return Err(ForeignStream); }

	let mut lit_table = [0_u32; TABLE_SIZE];
	prepare_dynamic_block(&mut bits, SRC, &mut lit_table)?;

	// Components that survive a layout conversion.
	let comps = if SRC < DST { SRC } else { DST };
	let dst_bpl = width * DST;

	let mut row_start = 0_usize;
	for y in 0..height {
		// Every scanline opens with its filter byte, itself an ordinary
		// literal in the stream.
		let entry = lit_table[bits.peek()];
		let flen = (entry >> 9) & 15;
		if flen == 0 { return Err(ForeignStream); }
		bits.skip(flen)?;

		let expected = if y == 0 { 0 } else { 2 };
		if entry & SYM_MASK != expected { return Err(ForeignStream); }

		let mut x = 0_usize;
		let mut prev_delta = [0_u8; SRC];
		while x < dst_bpl {
			let entry = lit_table[bits.peek()];
			let len0 = (entry >> 9) & 15;
			if len0 == 0 { return Err(ForeignStream); }
			bits.skip(len0)?;

			if entry & 256 != 0 {
				// A match (or a premature end-of-block, which is fatal).
				let sym = entry & SYM_MASK;
				if sym == END_OF_BLOCK || sym > 285 { return Err(ForeignStream); }

				let idx = (sym - 257) as usize;
				let mut run_len = usize::from(MATCH_LEN_BASE[idx]);
				if sym >= 265 {
					run_len += bits.get_ne(u32::from(MATCH_LEN_EXTRA[idx])) as usize;
				}

				// The lone distance code: one bit, value zero.
				bits.skip_ne(1);

				// Runs must cover whole pixels and stay inside the row.
				if run_len % SRC != 0 { return Err(ForeignStream); }
				let end = x + run_len / SRC * DST;
				if end > dst_bpl { return Err(ForeignStream); }

				if y == 0 {
					// No previous row: the run expands to the delta itself.
					while x < end {
						let base = row_start + x;
						dst[base..base + comps].copy_from_slice(&prev_delta[..comps]);
						if DST > SRC { dst[base + 3] = 0xFF; }
						x += DST;
					}
				}
				else if prev_delta == [0; SRC] {
					// Zero delta: the run is a verbatim copy of the row above.
					let above = row_start - dst_bpl;
					dst.copy_within(above + x..above + end, row_start + x);
					x = end;
				}
				else {
					while x < end {
						let base = row_start + x;
						for i in 0..comps {
							dst[base + i] = dst[base - dst_bpl + i].wrapping_add(prev_delta[i]);
						}
						if DST > SRC { dst[base + 3] = 0xFF; }
						x += DST;
					}
				}
			}
			else {
				// A literal pixel: one byte per source channel, the later
				// ones often pre-decoded into the previous probe's entry.
				let mut lit = [0_u8; SRC];
				lit[0] = (entry & 0xFF) as u8;
				let mut carry = entry;
				for slot in lit.iter_mut().skip(1) {
					let packed_bits = carry >> 25;
					let sym =
						if packed_bits != 0 {
							let sym = (carry >> 16) & SYM_MASK;
							bits.skip_ne(packed_bits);
							carry = 0;
							sym
						}
						else {
							let fresh = lit_table[bits.peek()];
							let flen = (fresh >> 9) & 15;
							if flen == 0 { return Err(ForeignStream); }
							bits.skip(flen)?;
							carry = fresh;
							fresh & SYM_MASK
						};

					// Matches only ever begin on pixel boundaries.
					if sym >= 256 { return Err(ForeignStream); }
					*slot = sym as u8;
				}

				let base = row_start + x;
				if y == 0 {
					dst[base..base + comps].copy_from_slice(&lit[..comps]);
				}
				else {
					for i in 0..comps {
						dst[base + i] = dst[base - dst_bpl + i].wrapping_add(lit[i]);
					}
				}
				if DST > SRC { dst[base + 3] = 0xFF; }

				x += DST;
				prev_delta = lit;
			}
		}

		row_start += dst_bpl;
	}

	// The stream must close with the end-of-block symbol, zero-pad to a
	// byte boundary, and leave exactly the four Adler-32 trailer bytes.
	// (The trailer itself goes unverified; the structural checks above
	// catch corruption with overwhelming probability.)
	let entry = lit_table[bits.peek()];
	let elen = (entry >> 9) & 15;
	if elen == 0 || entry & SYM_MASK != END_OF_BLOCK { return Err(ForeignStream); }
	bits.skip_ne(elen);
	bits.skip_ne(bits.len & 7);

	let read_ahead = (bits.len >> 3) as usize;
	if bits.ofs < read_ahead { return Err(ForeignStream); }
	if bits.ofs - read_ahead + 4 != zlib_len { return Err(ForeignStream); }

	Ok(())
}

/// # Inflate Stored Blocks.
///
/// The fallback format: filter-0 scanlines chopped into `≤ 65535`-byte
/// stored blocks. Rare enough that this path favors clarity over speed,
/// converting channel layouts byte by byte.
fn inflate_stored<const SRC: usize, const DST: usize>(
	src: &[u8],
	zlib_len: usize,
	dst: &mut [u8],
	width: usize,
	height: usize,
) -> Result<(), ForeignStream> {
	let src_bpl = width * SRC;
	let dst_len = width * DST * height;

	let mut ofs = 2_usize;
	let mut dst_ofs = 0_usize;
	let mut raster = 0_usize;
	let mut comp = 0_usize;
	loop {
		if ofs >= src.len() { return Err(ForeignStream); }
		let hdr = src[ofs];
		let bfinal = hdr & 1 != 0;
		if hdr & 6 != 0 { return Err(ForeignStream); }
		ofs += 1;

		if ofs + 4 > src.len() { return Err(ForeignStream); }
		let len = usize::from(u16::from_le_bytes([src[ofs], src[ofs + 1]]));
		let nlen = usize::from(u16::from_le_bytes([src[ofs + 2], src[ofs + 3]]));
		ofs += 4;
		if len != ! nlen & 0xFFFF { return Err(ForeignStream); }
		if ofs + len > src.len() { return Err(ForeignStream); }

		for &b in &src[ofs..ofs + len] {
			if raster == 0 {
				// Scanline boundary: the filter byte, which must be None.
				if b != 0 { return Err(ForeignStream); }
			}
			else {
				if comp < DST {
					if dst_ofs == dst_len { return Err(ForeignStream); }
					dst[dst_ofs] = b;
					dst_ofs += 1;
				}
				comp += 1;
				if comp == SRC {
					if DST > SRC {
						if dst_ofs == dst_len { return Err(ForeignStream); }
						dst[dst_ofs] = 0xFF;
						dst_ofs += 1;
					}
					comp = 0;
				}
			}

			raster += 1;
			if raster == src_bpl + 1 { raster = 0; }
		}
		ofs += len;

		if bfinal { break; }
	}

	if comp != 0 { return Err(ForeignStream); }
	if ofs + 4 != zlib_len { return Err(ForeignStream); }
	if dst_ofs != dst_len { return Err(ForeignStream); }

	Ok(())
}
