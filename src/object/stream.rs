//! Readable streams and the in-memory implementation.

use super::{ClassId, FinalConstruct, Object};
use crate::error::{Error, Result};
use crate::variant::Variant;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use std::sync::Arc;

pub const CLSID_MEMORY_STREAM: ClassId = 0xB7A2_4E10;

/// Seekable byte source. Methods take `&self` so a stream can be shared.
pub trait ReadableStream: Send + Sync {
    fn size(&self) -> u64;
    fn position(&self) -> u64;
    /// Move the read cursor; positions past the end are rejected
    fn set_position(&self, position: u64) -> Result<u64>;
    /// Read from the cursor; returns 0 at end of stream
    fn read(&self, buf: &mut [u8]) -> Result<usize>;
    fn class_id(&self) -> ClassId {
        CLSID_MEMORY_STREAM
    }
}

/// Stream over an owned byte buffer
#[derive(Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: Mutex<u64>,
}

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            position: Mutex::new(0),
        }
    }

    /// Move the cursor, clamping to the end
    pub fn seek_to(&self, position: u64) {
        *self.position.lock() = position.min(self.data.len() as u64);
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ReadableStream for MemoryStream {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&self) -> u64 {
        *self.position.lock()
    }

    fn set_position(&self, position: u64) -> Result<u64> {
        if position > self.size() {
            return Err(Error::OutOfRange(format!(
                "position {position} is beyond stream size {}",
                self.size()
            )));
        }
        *self.position.lock() = position;
        Ok(position)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut position = self.position.lock();
        let start = (*position as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        *position += n as u64;
        Ok(n)
    }
}

impl Object for MemoryStream {
    fn class_id(&self) -> ClassId {
        CLSID_MEMORY_STREAM
    }
}

/// Config: `{"data": base64?, "position": int?}`
impl FinalConstruct for MemoryStream {
    fn final_construct(&mut self, config: &Variant) -> Result<()> {
        if let Some(encoded) = config.get("data") {
            let encoded = encoded
                .as_str()
                .ok_or_else(|| Error::invalid_argument("field <data> must be a base64 string"))?;
            self.data = BASE64
                .decode(encoded)
                .map_err(|e| Error::invalid_argument(format!("field <data>: {e}")))?;
        }
        self.seek_to(config.get_or("position", 0).convert::<u64>());
        Ok(())
    }
}

pub fn create_memory_stream(data: Vec<u8>) -> Arc<dyn ReadableStream> {
    Arc::new(MemoryStream::new(data))
}

/// Read the whole stream from offset 0; the cursor position is preserved.
pub fn read_all(stream: &dyn ReadableStream) -> Result<Vec<u8>> {
    let saved = stream.position();
    stream.set_position(0)?;
    let mut data = Vec::with_capacity(stream.size() as usize);
    let mut chunk = [0u8; 8192];
    let result = loop {
        match stream.read(&mut chunk) {
            Ok(0) => break Ok(()),
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(e) => break Err(e),
        }
    };
    stream.set_position(saved)?;
    result.map(|_| data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;
    use crate::object::{create_object, downcast};

    #[test]
    fn test_read_and_seek() {
        let stream = MemoryStream::new(b"hello world".to_vec());
        let mut buf = [0u8; 5];
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(stream.position(), 5);

        stream.set_position(6).unwrap();
        let mut rest = [0u8; 16];
        assert_eq!(stream.read(&mut rest).unwrap(), 5);
        assert_eq!(&rest[..5], b"world");
        assert_eq!(stream.read(&mut rest).unwrap(), 0);

        assert!(matches!(stream.set_position(100), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_read_all_preserves_position() {
        let stream = MemoryStream::new(b"abcdef".to_vec());
        stream.set_position(3).unwrap();
        assert_eq!(read_all(&stream).unwrap(), b"abcdef".to_vec());
        assert_eq!(stream.position(), 3);
    }

    #[test]
    fn test_create_from_registry() {
        let obj = create_object(CLSID_MEMORY_STREAM, &dict! { "data" => "AAEC", "position" => 2 }).unwrap();
        let stream = downcast::<MemoryStream>(&obj).unwrap();
        assert_eq!(stream.data(), &[0u8, 1, 2]);
        assert_eq!(stream.position(), 2);

        let err = create_object(CLSID_MEMORY_STREAM, &dict! { "data" => 5 }).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
