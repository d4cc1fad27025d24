//! Minimal RIFF chunk walking over a seekable source.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{LoadError, ParseError};

pub type FourCc = [u8; 4];

/// A chunk header: four-character id and the location of its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: FourCc,
    pub size: u32,
    /// Offset of the first data byte (just after the 8-byte header).
    pub data_offset: u64,
}

impl Chunk {
    /// Offset of the first byte after the chunk data.
    pub fn end(&self) -> u64 {
        self.data_offset + u64::from(self.size)
    }

    /// Offset of the next sibling. Chunk data is padded to an even length.
    pub fn next(&self) -> u64 {
        self.end() + u64::from(self.size & 1)
    }

    pub fn offset(&self) -> usize {
        (self.data_offset - 8) as usize
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }
}

/// Turn an I/O failure at `offset` into a load error. Running out of data is
/// a `Truncated` parse error, anything else stays an I/O error.
pub fn io_error(e: io::Error, offset: u64, what: &str) -> LoadError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ParseError::truncated(offset as usize, format!("data ends inside {}", what)).into()
    } else {
        e.into()
    }
}

pub fn read_fourcc<R: Read>(source: &mut R) -> io::Result<FourCc> {
    let mut id = [0u8; 4];
    source.read_exact(&mut id)?;
    Ok(id)
}

/// Read the chunk header at `offset`. The chunk must end at or before `limit`.
pub fn read_chunk_header<R: Read + Seek>(
    source: &mut R,
    offset: u64,
    limit: u64,
) -> Result<Chunk, LoadError> {
    source.seek(SeekFrom::Start(offset))?;
    let id = read_fourcc(source).map_err(|e| io_error(e, offset, "a chunk header"))?;
    let size = source
        .read_u32::<LittleEndian>()
        .map_err(|e| io_error(e, offset, "a chunk header"))?;

    let chunk = Chunk {
        id,
        size,
        data_offset: offset + 8,
    };
    if chunk.end() > limit {
        return Err(ParseError::truncated(
            offset as usize,
            format!(
                "chunk '{}' declares {} bytes but only {} remain",
                chunk.name(),
                size,
                limit.saturating_sub(chunk.data_offset)
            ),
        )
        .into());
    }
    Ok(chunk)
}

/// Headers of the sibling chunks laid out in `[start, end)`.
pub fn read_children<R: Read + Seek>(
    source: &mut R,
    start: u64,
    end: u64,
) -> Result<Vec<Chunk>, LoadError> {
    let mut chunks = Vec::new();
    let mut pos = start;
    while pos + 8 <= end {
        let chunk = read_chunk_header(source, pos, end)?;
        pos = chunk.next();
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// The list type of a `LIST` chunk.
pub fn read_list_type<R: Read + Seek>(source: &mut R, chunk: &Chunk) -> Result<FourCc, LoadError> {
    if chunk.size < 4 {
        return Err(ParseError::malformed(chunk.offset(), "LIST chunk has no list type").into());
    }
    source.seek(SeekFrom::Start(chunk.data_offset))?;
    read_fourcc(source).map_err(|e| io_error(e, chunk.data_offset, "a LIST type"))
}

/// Read a chunk's data into memory.
pub fn read_body<R: Read + Seek>(source: &mut R, chunk: &Chunk) -> Result<Vec<u8>, LoadError> {
    source.seek(SeekFrom::Start(chunk.data_offset))?;
    let mut body = vec![0u8; chunk.size as usize];
    source
        .read_exact(&mut body)
        .map_err(|e| io_error(e, chunk.data_offset, &format!("chunk '{}'", chunk.name())))?;
    Ok(body)
}

/// A fixed-size text field, cut at the first NUL.
pub fn fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;
    use std::io::Cursor;

    #[test]
    fn test_read_children_with_padding() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"abcd\x03\x00\x00\x00xyz\x00");
        bytes.extend_from_slice(b"efgh\x02\x00\x00\x00hi");
        let mut cursor = Cursor::new(bytes.clone());
        let chunks = read_children(&mut cursor, 0, bytes.len() as u64).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0].id, b"abcd");
        assert_eq!(chunks[0].size, 3);
        assert_eq!(chunks[1].data_offset, 20);
        assert_eq!(read_body(&mut cursor, &chunks[1]).unwrap(), b"hi");
    }

    #[test]
    fn test_oversized_chunk_is_truncated() {
        let bytes = b"abcd\x10\x00\x00\x00short".to_vec();
        let mut cursor = Cursor::new(bytes.clone());
        let err = read_children(&mut cursor, 0, bytes.len() as u64).unwrap_err();
        let parse = err.as_parse_error().unwrap();
        assert_eq!(parse.kind, ParseErrorKind::Truncated);
        assert_eq!(parse.offset, 0);
    }

    #[test]
    fn test_fixed_string() {
        assert_eq!(fixed_string(b"Piano\0\0garbage"), "Piano");
        assert_eq!(fixed_string(b"Full"), "Full");
    }
}
