//! ISOBMFF (MP4) box parsing utilities.
//! Centralizes boilerplate for traversing MP4 structures in memory.

/// Boxes whose payload is nothing but child boxes
pub const CONTAINER_BOXES: &[&[u8; 4]] = &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"udta"];

/// Walk all top-level boxes in a buffer, and recursively traverse specified container boxes.
/// `callback` is invoked for EVERY box in pre-order traversal.
/// The callback signature is `|box_type: &[u8; 4], payload: &[u8]|`.
///
/// 64-bit `largesize` headers are honoured; a box running past the buffer
/// ends the walk.
pub fn walk_boxes<'a, F>(data: &'a [u8], containers: &[&[u8; 4]], callback: &mut F)
where
    F: FnMut(&[u8; 4], &'a [u8]),
{
    let mut pos = 0;
    while pos + 8 <= data.len() {
        let (size, header) = match read_u32(data, pos) {
            Some(1) => match read_u64(data, pos + 8) {
                Some(large) => (large as usize, 16),
                None => break,
            },
            Some(0) => (data.len() - pos, 8), // extends to end of buffer
            Some(s) => (s as usize, 8),
            None => break,
        };
        if size < header || pos + size > data.len() {
            break;
        }
        let btype = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
        let payload = &data[pos + header..pos + size];

        callback(&btype, payload);

        if containers.contains(&&btype) {
            walk_boxes(payload, containers, callback);
        }

        pos += size;
    }
}

/// Payload of the first box of type `wanted`, searching through `containers`.
pub fn find_box<'a>(data: &'a [u8], containers: &[&[u8; 4]], wanted: &[u8; 4]) -> Option<&'a [u8]> {
    let mut found = None;
    walk_boxes(data, containers, &mut |btype, payload| {
        if found.is_none() && btype == wanted {
            found = Some(payload);
        }
    });
    found
}

pub fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

pub fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_u64(data: &[u8], pos: usize) -> Option<u64> {
    data.get(pos..pos + 8).map(|b| {
        u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}
