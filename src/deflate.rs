/*!
# Prontopng: Restricted Deflate.

Everything here emits exactly one zlib-framed Deflate block per image:
a dynamic-table block carrying the filtered scanlines, or (when the
compressed form would outgrow its buffer) a chain of stored blocks.

The compressed tokenization never searches for matches. Pixels repeat or
they don't: the scan compares each stride-sized word against its
predecessor, and every back-reference has distance equal to the stride.
That restriction is what lets the single distance code collapse to one bit
— folded into the length code's extra-bits write — and what the matching
decoder banks on.

Two compressed paths share the tokenizer. The two-pass path histograms the
tokens and builds fresh Huffman tables for each image; the one-pass path
replays a corpus-trained preamble from `tables` and streams straight
through its canned codes.
*/

use crate::bits::BitSink;
use crate::chunk;
use crate::error::SinkFull;
use crate::huffman::{
	CodeTable,
	LIMIT_CODE_LENGTH,
	LIMIT_LITLEN,
	rescale_counts,
};
use crate::tables::{
	BIT_MASKS,
	CODE_LENGTH_ORDER,
	LENGTH_EXTRA,
	LENGTH_SYMBOLS,
	ONE_PASS_CODES_3,
	ONE_PASS_CODES_4,
	ONE_PASS_PREAMBLE_3,
	ONE_PASS_PREAMBLE_4,
	ONE_PASS_STATE_3,
	ONE_PASS_STATE_4,
};



/// # Size of the Literal/Length Alphabet.
pub(crate) const NUM_LITLEN: usize = 288;

/// # Size of the Distance Alphabet.
pub(crate) const NUM_DIST: usize = 32;

/// # End-of-Block Symbol.
const END_OF_BLOCK: usize = 256;

/// # Extra-Bit Counts for the Code-Length RLE Symbols 16/17/18.
const RLE_EXTRA: [u32; 3] = [2, 3, 7];



#[inline]
/// # Read One Pixel as a Little-Endian Word.
///
/// Always loads four bytes (the staging buffer is padded to allow it) and
/// masks down to the stride.
fn read_px(src: &[u8], ofs: usize, mask: u32) -> u32 {
	u32::from_le_bytes([src[ofs], src[ofs + 1], src[ofs + 2], src[ofs + 3]]) & mask
}

#[inline]
/// # Emit One Huffman Code.
fn put_code<const N: usize>(sink: &mut BitSink, table: &CodeTable<N>, sym: usize) {
	debug_assert!(table.sizes[sym] != 0, "BUG: emitting a zero-length code?!");
	sink.put(u32::from(table.codes[sym]), u32::from(table.sizes[sym]));
}

#[inline]
/// # Emit One Canned Code.
fn put_canned(sink: &mut BitSink, codes: &[(u8, u16); NUM_LITLEN], sym: usize) {
	let (size, code) = codes[sym];
	debug_assert!(size != 0, "BUG: emitting a zero-length canned code?!");
	sink.put(u32::from(code), u32::from(size));
}

/// # Append a Big-Endian u32.
///
/// Bounds-checked like every other output write; returns the new cursor.
fn write_be32(dst: &mut [u8], pos: usize, value: u32) -> Result<usize, SinkFull> {
	let end = pos + 4;
	if end > dst.len() { return Err(SinkFull); }
	dst[pos..end].copy_from_slice(&value.to_be_bytes());
	Ok(end)
}



/// # Write the Dynamic-Block Preamble.
///
/// Builds both Huffman tables from the (rescaled) histograms, then
/// serializes HLIT/HDIST/HCLEN, the code-length alphabet in its fixed
/// swizzle order, and the run-length-packed table lengths. Returns the
/// literal/length table for the data pass; the distance table needs no
/// return because its single code is one bit wide with value zero.
///
/// All writes drain byte-by-byte so the accumulator holds at most seven
/// bits on return.
fn start_dynamic_block(
	lit_counts: &[u16; NUM_LITLEN],
	dist_counts: &[u16; NUM_DIST],
	sink: &mut BitSink,
) -> Result<CodeTable<NUM_LITLEN>, SinkFull> {
	/// # Flush a Pending Repeat Run.
	fn flush_repeat(run: &mut u16, prev: u8, packed: &mut Vec<u8>, cl: &mut [u16; 19]) {
		if *run != 0 {
			if *run < 3 {
				cl[prev as usize] += *run;
				for _ in 0..*run { packed.push(prev); }
			}
			else {
				cl[16] += 1;
				packed.push(16);
				packed.push((*run - 3) as u8);
			}
			*run = 0;
		}
	}

	/// # Flush a Pending Zero Run.
	fn flush_zero(run: &mut u16, packed: &mut Vec<u8>, cl: &mut [u16; 19]) {
		if *run != 0 {
			if *run < 3 {
				cl[0] += *run;
				for _ in 0..*run { packed.push(0); }
			}
			else if *run <= 10 {
				cl[17] += 1;
				packed.push(17);
				packed.push((*run - 3) as u8);
			}
			else {
				cl[18] += 1;
				packed.push(18);
				packed.push((*run - 11) as u8);
			}
			*run = 0;
		}
	}

	let lit = CodeTable::from_counts(lit_counts, LIMIT_LITLEN);
	let dist = CodeTable::from_counts(dist_counts, LIMIT_LITLEN);
	debug_assert!(
		dist.sizes.iter().zip(dist.codes.iter()).all(|(&s, &c)| c == 0 && s <= 1),
		"BUG: the distance table should be a lone one-bit code?!",
	);

	// Trim trailing unused symbols from both alphabets.
	let mut num_lit = 286;
	while num_lit > 257 && lit.sizes[num_lit - 1] == 0 { num_lit -= 1; }
	let mut num_dist = 30;
	while num_dist > 1 && dist.sizes[num_dist - 1] == 0 { num_dist -= 1; }

	// Run-length pack the concatenated length lists, histogramming the
	// code-length alphabet as we go.
	let mut cl_counts = [0_u16; 19];
	let mut packed: Vec<u8> = Vec::with_capacity(num_lit + num_dist);
	let mut prev = 0xFF_u8;
	let mut zero_run = 0_u16;
	let mut repeat_run = 0_u16;
	for &size in lit.sizes[..num_lit].iter().chain(dist.sizes[..num_dist].iter()) {
		if size == 0 {
			flush_repeat(&mut repeat_run, prev, &mut packed, &mut cl_counts);
			zero_run += 1;
			if zero_run == 138 { flush_zero(&mut zero_run, &mut packed, &mut cl_counts); }
		}
		else {
			flush_zero(&mut zero_run, &mut packed, &mut cl_counts);
			if size == prev {
				repeat_run += 1;
				if repeat_run == 6 {
					flush_repeat(&mut repeat_run, prev, &mut packed, &mut cl_counts);
				}
			}
			else {
				flush_repeat(&mut repeat_run, prev, &mut packed, &mut cl_counts);
				cl_counts[size as usize] += 1;
				packed.push(size);
			}
		}
		prev = size;
	}
	if repeat_run != 0 {
		flush_repeat(&mut repeat_run, prev, &mut packed, &mut cl_counts);
	}
	else {
		flush_zero(&mut zero_run, &mut packed, &mut cl_counts);
	}

	let cl = CodeTable::from_counts(&cl_counts, LIMIT_CODE_LENGTH);

	// How many of the swizzled 3-bit lengths actually need writing.
	let num_cl = CODE_LENGTH_ORDER.iter()
		.rposition(|&o| cl.sizes[o as usize] != 0)
		.map_or(0, |p| p + 1)
		.max(4);

	// Block type: dynamic.
	sink.put_drain(2, 2)?;

	sink.put_drain((num_lit - 257) as u32, 5)?;
	sink.put_drain((num_dist - 1) as u32, 5)?;
	sink.put_drain((num_cl - 4) as u32, 4)?;
	for &o in &CODE_LENGTH_ORDER[..num_cl] {
		sink.put_drain(u32::from(cl.sizes[o as usize]), 3)?;
	}

	// And the packed lengths themselves.
	let mut i = 0;
	while i < packed.len() {
		let code = packed[i] as usize;
		i += 1;
		sink.put_drain(u32::from(cl.codes[code]), u32::from(cl.sizes[code]))?;
		if code >= 16 {
			sink.put_drain(u32::from(packed[i]), RLE_EXTRA[code - 16])?;
			i += 1;
		}
	}

	Ok(lit)
}



/// # Tokenize the Filtered Scanlines.
///
/// One pass over the rows, producing the token stream and the
/// literal/length histogram. Each token packs its kind into the low byte:
/// `1` for a filter byte, `0` for a stride's worth of literals, anything
/// else for a back-reference of `tag + 1` bytes.
fn tokenize<const C: usize>(
	filtered: &[u8],
	bpl: usize,
	height: usize,
	tokens: &mut Vec<u64>,
	freqs: &mut [u32; NUM_LITLEN],
) {
	/// # Record a Literal Run.
	fn push_literals<const C: usize>(lits: u32, tokens: &mut Vec<u64>, freqs: &mut [u32; NUM_LITLEN]) {
		tokens.push(u64::from(lits) << 8);
		for i in 0..C {
			freqs[((lits >> (8 * i)) & 0xFF) as usize] += 1;
		}
	}

	let mask: u32 = if C == 3 { 0x00FF_FFFF } else { 0xFFFF_FFFF };
	let cap: usize = if C == 3 { 255 } else { 252 };

	let mut ofs = 0;
	for _ in 0..height {
		let end = ofs + bpl;

		let filter = filtered[ofs];
		ofs += 1;
		tokens.push(1 | (u64::from(filter) << 8));
		freqs[filter as usize] += 1;

		// The first pixel of a row is always literal.
		let mut prev = read_px(filtered, ofs, mask);
		push_literals::<C>(prev, tokens, freqs);
		ofs += C;

		while ofs < end {
			let lits = read_px(filtered, ofs, mask);
			if lits == prev {
				// Ride the repetition out, but never past the row or the
				// encodable ceiling.
				let max_len = cap.min(end - ofs);
				let mut match_len = C;
				while match_len < max_len && read_px(filtered, ofs + match_len, mask) == lits {
					match_len += C;
				}

				tokens.push((match_len - 1) as u64);
				freqs[LENGTH_SYMBOLS[match_len - 3] as usize] += 1;
				ofs += match_len;
			}
			else {
				push_literals::<C>(lits, tokens, freqs);
				prev = lits;
				ofs += C;
			}
		}
	}
}



/// # Two-Pass Compression.
///
/// Tokenize and histogram first, then build image-specific tables and emit.
/// Returns the zlib stream's length, or `SinkFull` if `dst` proved too
/// small (the caller's cue to use stored blocks instead).
pub(crate) fn compress_two_pass<const C: usize>(
	filtered: &[u8],
	width: u32,
	height: u32,
	dst: &mut [u8],
) -> Result<usize, SinkFull> {
	let bpl = 1 + width as usize * C;
	let raw_len = bpl * height as usize;
	debug_assert!(filtered.len() >= raw_len + 4, "BUG: staging buffer missing its padding?!");

	let mut sink = BitSink::new(dst);
	sink.put(0x78, 8);
	sink.put(0x01, 8);
	sink.put(1, 1); // BFINAL.

	let mut tokens: Vec<u64> = Vec::with_capacity((width as usize + 1) * height as usize);
	let mut freqs = [0_u32; NUM_LITLEN];
	tokenize::<C>(filtered, bpl, height as usize, &mut tokens, &mut freqs);

	freqs[END_OF_BLOCK] = 1;
	let lit_counts = rescale_counts(&freqs);

	// The single distance symbol for this stride.
	let mut dist_counts = [0_u16; NUM_DIST];
	dist_counts[C - 1] = 1;

	let lit = start_dynamic_block(&lit_counts, &dist_counts, &mut sink)?;
	debug_assert!(
		lit.sizes[END_OF_BLOCK] != 0 && sink.bit_len() <= 7,
		"BUG: preamble left the accumulator unaligned?!",
	);

	for &token in &tokens {
		match token & 0xFF {
			0 => {
				let mut lits = (token >> 8) as u32;
				for i in 0..C {
					put_code(&mut sink, &lit, (lits & 0xFF) as usize);
					lits >>= 8;
					if C == 4 && i == 2 && sink.bit_len() >= 49 { sink.flush()?; }
				}
			}
			1 => put_code(&mut sink, &lit, (token >> 8) as usize),
			tag => {
				let adj = (tag as usize + 1) - 3;
				put_code(&mut sink, &lit, LENGTH_SYMBOLS[adj] as usize);

				// The distance code is one bit, value zero; tack it onto the
				// length's extra bits.
				let extra = LENGTH_EXTRA[adj] as usize;
				sink.put(adj as u32 & BIT_MASKS[extra], extra as u32 + 1);
			}
		}
		sink.flush()?;
	}

	put_code(&mut sink, &lit, END_OF_BLOCK);
	let len = sink.finish()?;
	write_be32(dst, len, chunk::adler32(&filtered[..raw_len]))
}

/// # One-Pass Compression.
///
/// Copy the corpus-trained preamble, resume the bit stream where it left
/// off, and emit tokens straight through the canned code table — no
/// histogram, no sort, no table build.
pub(crate) fn compress_one_pass<const C: usize>(
	filtered: &[u8],
	width: u32,
	height: u32,
	dst: &mut [u8],
) -> Result<usize, SinkFull> {
	/// # Emit a Stride's Worth of Literals.
	fn put_px<const C: usize>(
		sink: &mut BitSink,
		codes: &[(u8, u16); NUM_LITLEN],
		lits: u32,
	) -> Result<(), SinkFull> {
		let mut lits = lits;
		for i in 0..C {
			put_canned(sink, codes, (lits & 0xFF) as usize);
			lits >>= 8;
			if C == 4 && i == 2 && sink.bit_len() >= 49 { sink.flush()?; }
		}
		Ok(())
	}

	let bpl = 1 + width as usize * C;
	let raw_len = bpl * height as usize;
	debug_assert!(filtered.len() >= raw_len + 4, "BUG: staging buffer missing its padding?!");

	let mask: u32 = if C == 3 { 0x00FF_FFFF } else { 0xFFFF_FFFF };
	let cap: usize = if C == 3 { 255 } else { 252 };
	let (preamble, state, codes): (&[u8], (u64, u32), &[(u8, u16); NUM_LITLEN]) =
		if C == 3 { (&ONE_PASS_PREAMBLE_3, ONE_PASS_STATE_3, &ONE_PASS_CODES_3) }
		else { (&ONE_PASS_PREAMBLE_4, ONE_PASS_STATE_4, &ONE_PASS_CODES_4) };

	if dst.len() < preamble.len() { return Err(SinkFull); }
	dst[..preamble.len()].copy_from_slice(preamble);
	let mut sink = BitSink::resume(dst, preamble.len(), state.0, state.1);

	let mut ofs = 0;
	for _ in 0..height {
		let end = ofs + bpl;

		let filter = filtered[ofs] as usize;
		ofs += 1;
		put_canned(&mut sink, codes, filter);
		if C == 4 { sink.flush()?; }

		let mut prev = read_px(filtered, ofs, mask);
		put_px::<C>(&mut sink, codes, prev)?;
		ofs += C;
		sink.flush()?;

		while ofs < end {
			let lits = read_px(filtered, ofs, mask);
			let mut literals = lits != prev;

			if ! literals {
				let max_len = cap.min(end - ofs);
				let mut match_len = C;
				while match_len < max_len && read_px(filtered, ofs + match_len, mask) == lits {
					match_len += C;
				}

				let adj = match_len - 3;
				let sym = LENGTH_SYMBOLS[adj] as usize;
				let extra = LENGTH_EXTRA[adj] as u32;

				// A single-pixel "match" is not always a win at this stride;
				// take whichever costs fewer bits. (Ties go to the match.)
				if C == 4 && match_len == 4 {
					let lit_bits: u32 = (0..4)
						.map(|i| u32::from(codes[((lits >> (8 * i)) & 0xFF) as usize].0))
						.sum();
					if u32::from(codes[sym].0) + extra + 1 > lit_bits { literals = true; }
				}

				if ! literals {
					put_canned(&mut sink, codes, sym);
					sink.put(adj as u32 & BIT_MASKS[extra as usize], extra + 1);
					ofs += match_len;
				}
			}

			if literals {
				put_px::<C>(&mut sink, codes, lits)?;
				prev = lits;
				ofs += C;
			}

			sink.flush()?;
		}
	}

	debug_assert!(sink.bit_len() <= 7, "BUG: token stream left the accumulator overfull?!");
	put_canned(&mut sink, codes, END_OF_BLOCK);
	let len = sink.finish()?;
	write_be32(dst, len, chunk::adler32(&filtered[..raw_len]))
}

/// # Stored-Block Fallback.
///
/// A zlib stream of uncompressed blocks: header, then `≤ 65535`-byte
/// chunks each fronted by `BFINAL ‖ LEN ‖ !LEN`, then the Adler-32
/// trailer. No entropy coding, no filtering assumptions — `src` here is
/// the filter-0 staging buffer, exactly as it should appear after
/// inflation.
pub(crate) fn write_stored(src: &[u8], dst: &mut [u8]) -> Result<usize, SinkFull> {
	if dst.len() < 2 { return Err(SinkFull); }
	dst[0] = 0x78;
	dst[1] = 0x01;
	let mut pos = 2;

	let mut ofs = 0;
	while ofs < src.len() {
		let remaining = src.len() - ofs;
		let block = remaining.min(65_535);
		let last = block == remaining;

		let end = pos + 5 + block;
		if end > dst.len() { return Err(SinkFull); }

		dst[pos] = u8::from(last);
		dst[pos + 1..pos + 3].copy_from_slice(&(block as u16).to_le_bytes());
		dst[pos + 3..pos + 5].copy_from_slice(&(! (block as u16)).to_le_bytes());
		dst[pos + 5..end].copy_from_slice(&src[ofs..ofs + block]);

		ofs += block;
		pos = end;
	}

	write_be32(dst, pos, chunk::adler32(src))
}



#[cfg(test)]
mod test {
	use super::*;

	/// # Pad a Staging Buffer.
	///
	/// The tokenizer reads four bytes at a time; give it the same slack the
	/// encoder's staging allocation provides.
	fn pad(raw: &[u8]) -> Vec<u8> {
		let mut v = raw.to_vec();
		v.resize(raw.len() + 4, 0);
		v
	}

	/// # Inflate With an Independent Implementation.
	fn oracle(zlib: &[u8]) -> Vec<u8> {
		miniz_oxide::inflate::decompress_to_vec_zlib(zlib)
			.expect("the oracle rejected our stream")
	}

	#[test]
	fn t_two_pass_rgb() {
		// Two 2px rows; the second repeats a pixel to force a match token.
		let raw: &[u8] = &[
			0, 1, 2, 3, 4, 5, 6,
			2, 9, 9, 9, 9, 9, 9,
		];
		let filtered = pad(raw);
		let mut dst = vec![0_u8; 256];
		let len = compress_two_pass::<3>(&filtered, 2, 2, &mut dst).unwrap();
		assert_eq!(oracle(&dst[..len]), raw);
	}

	#[test]
	fn t_two_pass_rgba() {
		let raw: &[u8] = &[
			0, 1, 2, 3, 4, 200, 201, 202, 203,
			2, 0, 0, 0, 0, 0, 0, 0, 0,
		];
		let filtered = pad(raw);
		let mut dst = vec![0_u8; 256];
		let len = compress_two_pass::<4>(&filtered, 2, 2, &mut dst).unwrap();
		assert_eq!(oracle(&dst[..len]), raw);
	}

	#[test]
	fn t_one_pass_rgb() {
		let raw: &[u8] = &[
			0, 10, 20, 30, 10, 20, 30, 10, 20, 30, 10, 20, 30,
			2, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0,
		];
		let filtered = pad(raw);
		let mut dst = vec![0_u8; 256];
		let len = compress_one_pass::<3>(&filtered, 4, 2, &mut dst).unwrap();
		assert_eq!(oracle(&dst[..len]), raw);
	}

	#[test]
	fn t_one_pass_rgba() {
		let raw: &[u8] = &[
			0, 1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4, 255, 255, 255, 255,
			2, 0, 0, 0, 0, 0, 0, 0, 0, 7, 7, 7, 7, 7, 7, 7, 7,
		];
		let filtered = pad(raw);
		let mut dst = vec![0_u8; 256];
		let len = compress_one_pass::<4>(&filtered, 4, 2, &mut dst).unwrap();
		assert_eq!(oracle(&dst[..len]), raw);
	}

	#[test]
	fn t_long_run() {
		// A whole row of one color: the run must clamp at the stride
		// ceiling and chain multiple matches without crossing the row.
		let mut raw = vec![0_u8; 1 + 300 * 3];
		raw[0] = 0;
		for (i, b) in raw[1..].iter_mut().enumerate() { *b = [5, 6, 7][i % 3]; }
		let filtered = pad(&raw);
		let mut dst = vec![0_u8; 1024];
		let len = compress_two_pass::<3>(&filtered, 300, 1, &mut dst).unwrap();
		assert_eq!(oracle(&dst[..len]), raw);
	}

	#[test]
	fn t_tokenize_run() {
		// 4x1 RGBA, all zero: a filter token, one literal pixel, then a
		// single twelve-byte back-reference covering the rest of the row.
		let filtered = pad(&[0_u8; 17]);
		let mut tokens = Vec::new();
		let mut freqs = [0_u32; NUM_LITLEN];
		tokenize::<4>(&filtered, 17, 1, &mut tokens, &mut freqs);

		assert_eq!(tokens, [1, 0, 11]);
		assert_eq!(freqs[0], 5); // Filter byte + four literal zeroes.
		assert_eq!(freqs[LENGTH_SYMBOLS[12 - 3] as usize], 1);
	}

	#[test]
	fn t_sink_full() {
		// An incompressible payload into a tiny buffer must fail cleanly.
		let mut raw = vec![0_u8; 1 + 64 * 3];
		let mut state = 0x2545_F491_4F6C_DD1D_u64;
		for b in &mut raw[1..] {
			state ^= state << 13;
			state ^= state >> 7;
			state ^= state << 17;
			*b = state as u8;
		}
		let filtered = pad(&raw);
		let mut dst = vec![0_u8; 64];
		assert!(compress_two_pass::<3>(&filtered, 64, 1, &mut dst).is_err());
	}

	#[test]
	fn t_stored() {
		let src: Vec<u8> = (0..70_000_u32).map(|i| (i % 251) as u8).collect();
		let mut dst = vec![0_u8; src.len() + 64];
		let len = write_stored(&src, &mut dst).unwrap();
		assert_eq!(oracle(&dst[..len]), src);

		// And it refuses to overflow.
		let mut tiny = vec![0_u8; 32];
		assert!(write_stored(&src, &mut tiny).is_err());
	}
}
