//! Distance literals
//!
//! Travel distances are written as `z` for every full 255 units, then the
//! remainder: a three digit decimal for 52 and up, otherwise a code from a
//! 52 entry table (`a`..`y` for 1..25, `|a`..`|z` for 26..51, nothing for 0).

use lhykit_core::ProtocolError;

const FULL_STRIDE: u64 = 255;
const TABLE_LEN: u64 = 52;

/// Encode a travel distance
pub fn encode_distance(value: i64) -> Result<Vec<u8>, ProtocolError> {
    if value < 0 {
        return Err(ProtocolError::NegativeDistance { value });
    }
    let mut out = Vec::new();
    write_distance(&mut out, value.unsigned_abs());
    Ok(out)
}

/// Append the literal for `value` to `out`
pub(crate) fn write_distance(out: &mut Vec<u8>, value: u64) {
    let strides = value / FULL_STRIDE;
    let rest = value % FULL_STRIDE;
    out.extend(std::iter::repeat_n(b'z', strides as usize));
    if rest >= TABLE_LEN {
        out.extend_from_slice(format!("{:03}", rest).as_bytes());
    } else {
        match rest {
            0 => {}
            1..=25 => out.push(b'a' + (rest - 1) as u8),
            _ => {
                out.push(b'|');
                out.push(b'a' + (rest - 26) as u8);
            }
        }
    }
}

/// Decode a complete distance literal, `None` if it is malformed
pub fn decode_distance(bytes: &[u8]) -> Option<i64> {
    let strides = bytes.iter().take_while(|&&b| b == b'z').count();
    let mut value = strides as i64 * FULL_STRIDE as i64;
    let rest = &bytes[strides..];
    match rest {
        [] => {}
        [b'|', code @ b'a'..=b'z'] => value += i64::from(code - b'a') + 26,
        [code @ b'a'..=b'y'] => value += i64::from(code - b'a') + 1,
        [a, b, c] if rest.iter().all(u8::is_ascii_digit) => {
            let digits = i64::from(a - b'0') * 100 + i64::from(b - b'0') * 10 + i64::from(c - b'0');
            if !(TABLE_LEN as i64..FULL_STRIDE as i64).contains(&digits) {
                return None;
            }
            value += digits;
        }
        _ => return None,
    }
    Some(value)
}
