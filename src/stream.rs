//! Read-only symbol streams consumed by the simulators.
//!
//! A stream yields integer symbol codes with O(1) lookahead and supports the
//! mark/seek discipline prediction relies on: a prediction call marks the
//! stream, speculates arbitrarily far ahead, then seeks back and releases
//! before returning. Character streams deal in code points, never UTF-16
//! code units.

use crate::error::DecodeError;

/// End of input as a symbol code.
pub const EOF: i32 = -1;

pub trait SymbolStream {
	/// Lookahead relative to the cursor: `la(1)` is the next symbol to be
	/// consumed, `la(-1)` the most recently consumed one. `k == 0` is
	/// meaningless.
	fn la(&mut self, k: isize) -> i32;

	fn index(&self) -> usize;

	/// Total number of symbols (code points for character streams).
	fn size(&self) -> usize;

	fn consume(&mut self);

	/// Declares intent to seek back to or before the current index. Markers
	/// nest; each must be released exactly once.
	fn mark(&mut self) -> usize;

	fn release(&mut self, marker: usize);

	fn seek(&mut self, index: usize);
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodePolicy {
	/// Malformed sequences become U+FFFD.
	Replace,
	/// Malformed sequences fail decoding.
	Report,
}

/// A fully buffered stream of integer symbols.
#[derive(Debug, Clone)]
pub struct Buffered {
	symbols: Vec<i32>,
	index: usize,
	marks: usize,
}

/// Token streams and code-point streams are the same machine with different
/// construction paths.
pub type TokenStream = Buffered;
pub type CodePointStream = Buffered;

impl Buffered {
	pub fn new(symbols: Vec<i32>) -> Self {
		Self {
			symbols,
			index: 0,
			marks: 0,
		}
	}

	pub fn from_str(input: &str) -> Self {
		Self::new(input.chars().map(u32::from).map(|cp| cp as i32).collect::<Vec<_>>())
	}

	pub fn from_utf8(bytes: &[u8], policy: DecodePolicy) -> Result<Self, DecodeError> {
		let mut symbols: Vec<i32> = Vec::new();
		let mut remaining: &[u8] = bytes;
		let mut offset: usize = 0;
		while !remaining.is_empty() {
			match str::from_utf8(remaining) {
				Ok(valid) => {
					symbols.extend(valid.chars().map(|ch| u32::from(ch) as i32));
					break;
				},
				Err(error) => {
					let (valid, after): (&[u8], &[u8]) = remaining.split_at(error.valid_up_to());
					symbols.extend(
						str::from_utf8(valid)
							.unwrap()
							.chars()
							.map(|ch| u32::from(ch) as i32),
					);
					if policy == DecodePolicy::Report {
						return Err(DecodeError::Malformed {
							encoding: "UTF-8",
							offset: offset + error.valid_up_to(),
						});
					}
					symbols.push(u32::from(char::REPLACEMENT_CHARACTER) as i32);
					// An incomplete sequence at the very end consumes the rest.
					let skip: usize = error.error_len().unwrap_or(after.len());
					offset += error.valid_up_to() + skip;
					remaining = &after[skip..];
				},
			}
		}
		Ok(Self::new(symbols))
	}

	pub fn from_utf16(units: &[u16], policy: DecodePolicy) -> Result<Self, DecodeError> {
		let mut symbols: Vec<i32> = Vec::new();
		for (offset, decoded) in char::decode_utf16(units.iter().copied()).enumerate() {
			match decoded {
				Ok(ch) => symbols.push(u32::from(ch) as i32),
				Err(_) if policy == DecodePolicy::Replace => {
					symbols.push(u32::from(char::REPLACEMENT_CHARACTER) as i32);
				},
				Err(_) => {
					return Err(DecodeError::Malformed {
						encoding: "UTF-16",
						offset,
					});
				},
			}
		}
		Ok(Self::new(symbols))
	}

	pub fn from_utf32(units: &[u32], policy: DecodePolicy) -> Result<Self, DecodeError> {
		let mut symbols: Vec<i32> = Vec::new();
		for (offset, &unit) in units.iter().enumerate() {
			match char::from_u32(unit) {
				Some(ch) => symbols.push(u32::from(ch) as i32),
				None if policy == DecodePolicy::Replace => {
					symbols.push(u32::from(char::REPLACEMENT_CHARACTER) as i32);
				},
				None => {
					return Err(DecodeError::Malformed {
						encoding: "UTF-32",
						offset,
					});
				},
			}
		}
		Ok(Self::new(symbols))
	}
}

impl SymbolStream for Buffered {
	fn la(&mut self, k: isize) -> i32 {
		assert_ne!(k, 0);
		let position: isize = if k > 0 {
			self.index as isize + k - 1
		} else {
			self.index as isize + k
		};
		if position < 0 {
			return EOF;
		}
		self.symbols.get(position as usize).copied().unwrap_or(EOF)
	}

	fn index(&self) -> usize {
		self.index
	}

	fn size(&self) -> usize {
		self.symbols.len()
	}

	fn consume(&mut self) {
		assert!(self.index < self.symbols.len(), "consumed past end of input");
		self.index += 1;
	}

	fn mark(&mut self) -> usize {
		self.marks += 1;
		self.marks
	}

	fn release(&mut self, _marker: usize) {
		assert!(self.marks > 0, "released more markers than taken");
		self.marks -= 1;
	}

	fn seek(&mut self, index: usize) {
		self.index = index.min(self.symbols.len());
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn lookahead_and_seeking() {
		let mut stream: Buffered = Buffered::new(vec![10, 20, 30]);
		assert_eq!(stream.la(1), 10);
		assert_eq!(stream.la(3), 30);
		assert_eq!(stream.la(4), EOF);
		assert_eq!(stream.la(-1), EOF);

		let marker: usize = stream.mark();
		stream.consume();
		stream.consume();
		assert_eq!(stream.la(1), 30);
		assert_eq!(stream.la(-1), 20);
		stream.seek(0);
		stream.release(marker);
		assert_eq!(stream.index(), 0);
		assert_eq!(stream.la(1), 10);
	}

	#[test]
	fn code_points_not_code_units() {
		// Supplementary-plane characters count once each.
		let input: &str = "a\u{1D5BA}c";
		let stream: Buffered = Buffered::from_str(input);
		assert_eq!(stream.size(), 3);
		assert_eq!(input.encode_utf16().count(), 4);

		let from_utf16: Buffered =
			Buffered::from_utf16(&input.encode_utf16().collect::<Vec<_>>(), DecodePolicy::Report).unwrap();
		assert_eq!(from_utf16.size(), 3);
	}

	#[test]
	fn malformed_utf8() {
		let bytes: &[u8] = b"ab\xffcd";
		let replaced: Buffered = Buffered::from_utf8(bytes, DecodePolicy::Replace).unwrap();
		assert_eq!(replaced.size(), 5);
		assert_eq!(
			replaced.symbols[2],
			u32::from(char::REPLACEMENT_CHARACTER) as i32
		);

		let error: DecodeError = Buffered::from_utf8(bytes, DecodePolicy::Report).unwrap_err();
		assert_eq!(
			error,
			DecodeError::Malformed {
				encoding: "UTF-8",
				offset: 2,
			}
		);
	}

	#[test]
	fn malformed_utf16_and_utf32() {
		// A lone high surrogate.
		let units: &[u16] = &[0x0061, 0xD800, 0x0062];
		let replaced: Buffered = Buffered::from_utf16(units, DecodePolicy::Replace).unwrap();
		assert_eq!(replaced.size(), 3);
		assert!(Buffered::from_utf16(units, DecodePolicy::Report).is_err());

		let units: &[u32] = &[0x61, 0x11_0000, 0x62];
		assert!(Buffered::from_utf32(units, DecodePolicy::Report).is_err());
		assert_eq!(Buffered::from_utf32(units, DecodePolicy::Replace).unwrap().size(), 3);
	}
}
