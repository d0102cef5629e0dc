use super::hex::decode_hex;

/// Wire-level thread-id selector, as found in `H` and `vCont` packets.
///
/// Ids on the wire are 1-based; `0` means "any thread" and `-1` means "all
/// threads". Multi-process `p<pid>.<tid>` syntax is not spoken here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSelector {
    /// All threads (`-1`).
    All,
    /// Any thread (`0`).
    Any,
    /// A specific 1-based wire id.
    WithId(usize),
}

pub fn parse_id_selector(buf: &[u8]) -> Option<IdSelector> {
    match buf {
        b"-1" => Some(IdSelector::All),
        b"0" => Some(IdSelector::Any),
        _ => match decode_hex::<usize>(buf).ok()? {
            0 => None,
            id => Some(IdSelector::WithId(id)),
        },
    }
}
