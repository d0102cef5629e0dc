use num_traits::CheckedAdd;
use num_traits::CheckedMul;
use num_traits::FromPrimitive;
use num_traits::Zero;

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeHexError {
    Empty,
    NotAscii,
    OddLength,
    Overflow,
}

impl core::fmt::Display for DecodeHexError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeHexError::Empty => f.write_str("no hex digits"),
            DecodeHexError::NotAscii => f.write_str("not an ASCII hex digit"),
            DecodeHexError::OddLength => f.write_str("odd number of hex digits"),
            DecodeHexError::Overflow => f.write_str("value does not fit the target type"),
        }
    }
}

fn ascii2byte(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode a big-endian hex string into an integer.
pub fn decode_hex<I>(buf: &[u8]) -> Result<I, DecodeHexError>
where
    I: FromPrimitive + Zero + CheckedAdd + CheckedMul,
{
    use DecodeHexError::*;

    if buf.is_empty() {
        return Err(Empty);
    }

    let radix = I::from_u8(16).ok_or(Overflow)?;
    let mut result = I::zero();
    for &digit in buf {
        let x = I::from_u8(ascii2byte(digit).ok_or(NotAscii)?).ok_or(Overflow)?;
        result = result.checked_mul(&radix).ok_or(Overflow)?;
        result = result.checked_add(&x).ok_or(Overflow)?;
    }

    Ok(result)
}

/// Decode a hex string into a mutable byte slice _in place_, returning the
/// decoded prefix.
pub fn decode_hex_buf(buf: &mut [u8]) -> Result<&mut [u8], DecodeHexError> {
    use DecodeHexError::*;

    if buf.len() % 2 != 0 {
        return Err(OddLength);
    }

    let decoded_len = buf.len() / 2;
    for i in 0..decoded_len {
        let hi = ascii2byte(buf[i * 2]).ok_or(NotAscii)?;
        let lo = ascii2byte(buf[i * 2 + 1]).ok_or(NotAscii)?;
        buf[i] = hi << 4 | lo;
    }

    Ok(&mut buf[..decoded_len])
}
