use std::io::{BufRead, Seek};

use chrono::{Local, LocalResult, NaiveDateTime, TimeZone};
use exif::{Exif, In, Reader, Tag, Value};

use super::{DateSource, ExtractedDate};
use crate::error::FixError;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
/// Byte layout of `YYYY:MM:DD HH:MM:SS`; `d` marks a digit.
const EXIF_DATETIME_SHAPE: &[u8; 19] = b"dddd:dd:dd dd:dd:dd";

/// Raw EXIF attribute lookup over an image container.
pub struct ExifAttributes {
    exif: Exif,
}

impl ExifAttributes {
    /// Locate and parse the EXIF block of a JPEG, TIFF, HEIF, PNG or WebP stream.
    pub fn read<R: BufRead + Seek>(reader: &mut R) -> Result<Self, exif::Error> {
        let exif = Reader::new().read_from_container(reader)?;
        Ok(Self { exif })
    }

    /// ASCII value of a primary-image tag, exactly as stored.
    pub fn attribute(&self, tag: Tag) -> Option<String> {
        let field = self.exif.get_field(tag, In::PRIMARY)?;
        match field.value {
            Value::Ascii(ref parts) => parts
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }
}

/// Capture date of a photo: `DateTimeOriginal`, else `DateTime`.
///
/// Only the first tag present is parsed. A malformed `DateTimeOriginal` is not
/// replaced by `DateTime`.
pub fn photo_date<R: BufRead + Seek>(reader: &mut R) -> Result<ExtractedDate, FixError> {
    let attrs = ExifAttributes::read(reader).map_err(|e| FixError::ResourceFault {
        what: "EXIF block".to_string(),
        message: e.to_string(),
    })?;

    let (raw, source) = match attrs.attribute(Tag::DateTimeOriginal) {
        Some(raw) => (raw, DateSource::DateTimeOriginal),
        None => match attrs.attribute(Tag::DateTime) {
            Some(raw) => (raw, DateSource::DateTime),
            None => return Err(FixError::MetadataAbsent),
        },
    };

    let millis = parse_exif_datetime(&raw)?;
    ExtractedDate::new(millis, source).ok_or(FixError::ParseFailure(raw))
}

/// Same as [`photo_date`], with every failure folded into `None`.
pub fn extract_photo_date<R: BufRead + Seek>(reader: &mut R) -> Option<ExtractedDate> {
    match photo_date(reader) {
        Ok(date) => Some(date),
        Err(e) => {
            tracing::debug!("no photo date: {}", e);
            None
        }
    }
}

/// Parse `YYYY:MM:DD HH:MM:SS` as wall-clock time in the current local zone.
pub fn parse_exif_datetime(s: &str) -> Result<i64, FixError> {
    parse_exif_datetime_in(s, &Local)
}

/// Parse `YYYY:MM:DD HH:MM:SS` as wall-clock time in `tz`.
///
/// A time repeated by a DST fall-back resolves to the later instant (standard
/// time). A time skipped by a spring-forward jump fails.
pub fn parse_exif_datetime_in<Tz: TimeZone>(s: &str, tz: &Tz) -> Result<i64, FixError> {
    if !has_exif_shape(s) {
        return Err(FixError::ParseFailure(s.to_string()));
    }
    let naive = NaiveDateTime::parse_from_str(s, EXIF_DATETIME_FORMAT)
        .map_err(|_| FixError::ParseFailure(s.to_string()))?;
    match naive.and_local_timezone(tz.clone()) {
        LocalResult::Single(t) => Ok(t.timestamp_millis()),
        LocalResult::Ambiguous(a, b) => Ok(a.timestamp_millis().max(b.timestamp_millis())),
        LocalResult::None => Err(FixError::ParseFailure(s.to_string())),
    }
}

fn has_exif_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == EXIF_DATETIME_SHAPE.len()
        && bytes
            .iter()
            .zip(EXIF_DATETIME_SHAPE.iter())
            .all(|(&b, &shape)| match shape {
                b'd' => b.is_ascii_digit(),
                other => b == other,
            })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{jpeg_with_exif, png_with_exif};
    use chrono_tz::America::New_York;
    use std::io::Cursor;

    fn local_millis(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .earliest()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_parse_exif_datetime_local() {
        let expected = local_millis(2023, 8, 15, 10, 30, 0);
        assert_eq!(parse_exif_datetime("2023:08:15 10:30:00").unwrap(), expected);
    }

    #[test]
    fn test_repeated_hour_takes_standard_time() {
        // 01:30 happens twice on 2023-11-05 in New York: EDT first, then EST.
        let millis = parse_exif_datetime_in("2023:11:05 01:30:00", &New_York).unwrap();
        assert_eq!(millis, 1_699_165_800_000);
    }

    #[test]
    fn test_skipped_hour_fails() {
        // Clocks jump from 02:00 to 03:00 on 2023-03-12 in New York.
        assert!(matches!(
            parse_exif_datetime_in("2023:03:12 02:30:00", &New_York),
            Err(FixError::ParseFailure(_))
        ));
        assert!(parse_exif_datetime_in("2023:03:12 03:30:00", &New_York).is_ok());
    }

    #[test]
    fn test_parse_exif_datetime_rejects_deviations() {
        for bad in [
            "2023-08-15 10:30:00",
            "2023:08:15T10:30:00",
            "2023:08:15 10:30:00 ",
            "2023:08:15 10:30",
            "2023:8:15 10:30:00",
            "0000:00:00 00:00:00",
            "2023:13:01 00:00:00",
            "",
        ] {
            assert!(parse_exif_datetime(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_original_preferred_over_datetime() {
        let bytes = jpeg_with_exif(Some("2021:01:02 03:04:05"), Some("2022:02:02 02:02:02"));
        let date = extract_photo_date(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(date.source(), DateSource::DateTimeOriginal);
        assert_eq!(date.epoch_millis(), local_millis(2021, 1, 2, 3, 4, 5));
    }

    #[test]
    fn test_datetime_used_when_original_missing() {
        let bytes = jpeg_with_exif(None, Some("2022:02:02 02:02:02"));
        let date = extract_photo_date(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(date.source(), DateSource::DateTime);
        assert_eq!(date.epoch_millis(), local_millis(2022, 2, 2, 2, 2, 2));
    }

    #[test]
    fn test_malformed_original_is_not_superseded() {
        let bytes = jpeg_with_exif(Some("2021-01-02 03:04:05"), Some("2022:02:02 02:02:02"));
        assert!(extract_photo_date(&mut Cursor::new(bytes.clone())).is_none());
        assert!(matches!(
            photo_date(&mut Cursor::new(bytes)),
            Err(FixError::ParseFailure(_))
        ));
    }

    #[test]
    fn test_no_date_tags() {
        let bytes = jpeg_with_exif(None, None);
        assert!(matches!(
            photo_date(&mut Cursor::new(bytes)),
            Err(FixError::MetadataAbsent)
        ));
    }

    #[test]
    fn test_corrupt_container_is_none() {
        let garbage = b"\xFF\xD8\xFF\xE1\x00\x10Exif\x00\x00MM\x00".to_vec();
        assert!(extract_photo_date(&mut Cursor::new(garbage)).is_none());
        assert!(extract_photo_date(&mut Cursor::new(b"plain text".to_vec())).is_none());
    }

    #[test]
    fn test_png_exif_chunk() {
        let bytes = png_with_exif(Some("2020:06:01 12:00:00"), None);
        let date = extract_photo_date(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(date.epoch_millis(), local_millis(2020, 6, 1, 12, 0, 0));
    }
}
