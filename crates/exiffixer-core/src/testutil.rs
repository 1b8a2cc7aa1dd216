//! In-memory image fixtures carrying EXIF date tags.

const TAG_DATETIME: u16 = 0x0132;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_DATETIME_ORIGINAL: u16 = 0x9003;
const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;

struct Entry {
    tag: u16,
    typ: u16,
    count: u32,
    value: u32,
}

fn push_ifd(out: &mut Vec<u8>, entries: &[Entry]) {
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for e in entries {
        out.extend_from_slice(&e.tag.to_be_bytes());
        out.extend_from_slice(&e.typ.to_be_bytes());
        out.extend_from_slice(&e.count.to_be_bytes());
        out.extend_from_slice(&e.value.to_be_bytes());
    }
    out.extend_from_slice(&0u32.to_be_bytes());
}

fn ifd_len(entries: usize) -> u32 {
    (2 + 12 * entries + 4) as u32
}

/// Big-endian TIFF structure with optional DateTimeOriginal and DateTime.
/// Strings longer than four bytes are stored out of line, as EXIF requires.
pub fn tiff_with_dates(original: Option<&str>, datetime: Option<&str>) -> Vec<u8> {
    let ifd0_count = datetime.is_some() as usize + original.is_some() as usize;
    let ifd0_offset = 8u32;
    let exif_offset = ifd0_offset + ifd_len(ifd0_count);
    let exif_len = if original.is_some() { ifd_len(1) } else { 0 };
    let mut data_offset = exif_offset + exif_len;

    let mut ifd0 = Vec::new();
    let mut data = Vec::new();
    let mut ascii_entry = |tag: u16, s: &str, data_offset: &mut u32| {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        let count = bytes.len() as u32;
        if count <= 4 {
            bytes.resize(4, 0);
            Entry { tag, typ: TYPE_ASCII, count, value: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) }
        } else {
            let e = Entry { tag, typ: TYPE_ASCII, count, value: *data_offset };
            *data_offset += count;
            data.extend_from_slice(&bytes);
            e
        }
    };

    if let Some(dt) = datetime {
        ifd0.push(ascii_entry(TAG_DATETIME, dt, &mut data_offset));
    }
    let exif_entries: Vec<Entry> = match original {
        Some(orig) => {
            ifd0.push(Entry { tag: TAG_EXIF_IFD, typ: TYPE_LONG, count: 1, value: exif_offset });
            vec![ascii_entry(TAG_DATETIME_ORIGINAL, orig, &mut data_offset)]
        }
        None => vec![],
    };

    let mut out = b"MM\x00\x2A".to_vec();
    out.extend_from_slice(&ifd0_offset.to_be_bytes());
    push_ifd(&mut out, &ifd0);
    if !exif_entries.is_empty() {
        push_ifd(&mut out, &exif_entries);
    }
    out.extend_from_slice(&data);
    out
}

/// Minimal JPEG: SOI, APP1 Exif segment, EOI.
pub fn jpeg_with_exif(original: Option<&str>, datetime: Option<&str>) -> Vec<u8> {
    let tiff = tiff_with_dates(original, datetime);
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\x00\x00");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// Minimal PNG: signature, eXIf chunk, IEND. Chunk CRCs are left zeroed.
pub fn png_with_exif(original: Option<&str>, datetime: Option<&str>) -> Vec<u8> {
    let tiff = tiff_with_dates(original, datetime);
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    out.extend_from_slice(&(tiff.len() as u32).to_be_bytes());
    out.extend_from_slice(b"eXIf");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(b"IEND");
    out.extend_from_slice(&0u32.to_be_bytes());
    out
}
