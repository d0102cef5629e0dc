use super::common::hex::decode_hex;

/// Frame validation error. Any of these cause the session to nack and wait
/// for a retransmission; they never reach command handlers.
#[derive(Debug)]
pub enum PacketError {
    #[allow(dead_code)] // used as part of Debug impl
    ChecksumMismatched {
        checksum: u8,
        calculated: u8,
    },
    Malformed,
    MalformedChecksum,
    MalformedRunLength,
}

impl core::fmt::Display for PacketError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PacketError::ChecksumMismatched {
                checksum,
                calculated,
            } => write!(
                f,
                "checksum mismatch (got {:#04x}, calculated {:#04x})",
                checksum, calculated
            ),
            PacketError::Malformed => f.write_str("malformed frame"),
            PacketError::MalformedChecksum => f.write_str("malformed checksum digits"),
            PacketError::MalformedRunLength => f.write_str("malformed run-length encoding"),
        }
    }
}

/// Validate a raw `$<body>#<hh>` frame and return the decoded payload.
///
/// The checksum is the modulo-256 sum of the body bytes as transmitted;
/// run-length runs (`<c>*<n>`, expanding to `n - 28` copies of `c` in
/// total) are expanded only after the checksum has been verified. Clients
/// rarely produce RLE, but the protocol permits it anywhere, and escaped
/// binary payloads never contain a raw `*`, so expansion is safe to apply
/// to every inbound body.
pub fn decode(raw: &[u8]) -> Result<Vec<u8>, PacketError> {
    if raw.len() < 4 || raw[0] != b'$' || raw[raw.len() - 3] != b'#' {
        return Err(PacketError::Malformed);
    }

    let body = &raw[1..raw.len() - 3];
    let checksum = decode_hex::<u8>(&raw[raw.len() - 2..])
        .map_err(|_| PacketError::MalformedChecksum)?;
    let calculated = body.iter().fold(0u8, |a, x| a.wrapping_add(*x));
    if calculated != checksum {
        return Err(PacketError::ChecksumMismatched {
            checksum,
            calculated,
        });
    }

    let mut payload = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        match body[i] {
            b'*' => {
                let prev = *payload.last().ok_or(PacketError::MalformedRunLength)?;
                let count = *body.get(i + 1).ok_or(PacketError::MalformedRunLength)?;
                if count < 29 {
                    return Err(PacketError::MalformedRunLength);
                }
                // `prev` has been emitted once already, so a count byte of
                // `n` adds `n - 29` further copies
                for _ in 0..count - 29 {
                    payload.push(prev);
                }
                i += 2;
            }
            b => {
                payload.push(b);
                i += 1;
            }
        }
    }

    Ok(payload)
}

/// Decode `}`-escapes in a binary payload _in place_, returning the decoded
/// prefix.
///
/// Escapes are not part of general frame decoding: only packets defined to
/// carry binary data (`X` here) interpret them, after [`decode`] has
/// validated the frame and expanded any run-length runs.
pub fn unescape_binary(data: &mut [u8]) -> Result<&mut [u8], PacketError> {
    let mut w = 0;
    let mut r = 0;
    while r < data.len() {
        match data[r] {
            b'}' => {
                r += 1;
                let b = *data.get(r).ok_or(PacketError::Malformed)?;
                data[w] = b ^ 0x20;
            }
            b => data[w] = b,
        }
        r += 1;
        w += 1;
    }
    Ok(&mut data[..w])
}
