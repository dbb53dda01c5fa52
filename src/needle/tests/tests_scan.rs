#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use crate::needle::{Needle, NeedleError, MetaHeaders, NEEDLE_HEADER_SIZE, PAD_LEN};

    /// Appends a few records of uneven sizes, one with metadata.
    fn sample_stream() -> (Vec<u8>, Vec<u64>) {
        let mut buf = Vec::new();
        let ids = vec![10, 11, 12, 13];
        for (i, id) in ids.iter().enumerate() {
            let mut needle = Needle::new(*id, *id as u32, vec![b'x'; i * 7 + 1]);
            if i == 2 {
                needle.meta.set("X-Filename", "third.bin");
            }
            needle.append(&mut buf).unwrap();
        }
        (buf, ids)
    }

    #[test]
    fn sequential_scan_skips_payloads() {
        let (buf, ids) = sample_stream();
        let mut cursor = Cursor::new(&buf);

        let mut seen = Vec::new();
        while let Some((needle, jump)) = Needle::peek_header(&mut cursor).unwrap() {
            seen.push(needle.id);
            cursor.seek(SeekFrom::Current(i64::from(jump))).unwrap();
        }
        assert_eq!(seen, ids);
        assert_eq!(cursor.position(), buf.len() as u64);
    }

    #[test]
    fn jump_lands_on_record_boundaries() {
        let (buf, _) = sample_stream();
        let mut cursor = Cursor::new(&buf);

        let mut offset = 0u64;
        while let Some((_, jump)) = Needle::peek_header(&mut cursor).unwrap() {
            offset += u64::from(jump) + u64::from(NEEDLE_HEADER_SIZE);
            assert_eq!(offset % u64::from(PAD_LEN), 0);
            cursor.seek(SeekFrom::Start(offset)).unwrap();
        }
    }

    #[test]
    fn peek_on_empty_stream_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(Needle::peek_header(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn partial_header_is_unexpected_eof() {
        let (buf, _) = sample_stream();
        let mut cursor = Cursor::new(&buf[..10]);
        let err = Needle::peek_header(&mut cursor).unwrap_err();
        assert!(matches!(err, NeedleError::UnexpectedEof));
    }

    #[test]
    fn header_fields_survive_the_peek() {
        let mut buf = Vec::new();
        let mut needle = Needle::new(99, 0xCAFE, vec![b'z'; 33]);
        needle.set_gzipped();
        let mut meta = MetaHeaders::new();
        meta.set("Content-Type", "text/csv");
        needle.meta = meta;
        needle.append(&mut buf).unwrap();

        let mut cursor = Cursor::new(&buf);
        let (peeked, jump) = Needle::peek_header(&mut cursor).unwrap().unwrap();
        assert_eq!(peeked.id, 99);
        assert_eq!(peeked.cookie, 0xCAFE);
        assert_eq!(peeked.size, 33);
        assert!(peeked.is_gzipped());
        assert_eq!(
            u64::from(jump) + u64::from(NEEDLE_HEADER_SIZE),
            buf.len() as u64
        );
    }
}
