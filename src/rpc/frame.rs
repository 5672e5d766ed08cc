//! Length-prefixed framing.
//!
//! Every frame is a 4-byte big-endian length followed by the payload. A message
//! is one JSON header frame followed by `attachments` raw binary frames.

use crate::error::{Error, Result};
use serde_json::Value;
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
pub const MAX_ATTACHMENTS: usize = 1024;

/// Header JSON plus binary side-channel frames
pub type Message = (Value, Vec<Vec<u8>>);

fn check_len(len: usize) -> Result<()> {
    if len > MAX_FRAME_SIZE {
        return Err(Error::invalid_format(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
        )));
    }
    Ok(())
}

fn attachment_count(header: &Value) -> Result<usize> {
    let count = header.get("attachments").and_then(Value::as_u64).unwrap_or(0) as usize;
    if count > MAX_ATTACHMENTS {
        return Err(Error::invalid_format(format!("too many attachments: {count}")));
    }
    Ok(count)
}

pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> Result<()> {
    check_len(payload.len())?;
    w.write_all(&(payload.len() as u32).to_be_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

pub fn read_frame<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    r.read_exact(&mut len)?;
    let len = u32::from_be_bytes(len) as usize;
    check_len(len)?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_message<W: Write>(w: &mut W, header: &Value, attachments: &[Vec<u8>]) -> Result<()> {
    write_frame(w, &serde_json::to_vec(header)?)?;
    for attachment in attachments {
        write_frame(w, attachment)?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_message<R: Read>(r: &mut R) -> Result<Message> {
    let header: Value = serde_json::from_slice(&read_frame(r)?)?;
    let count = attachment_count(&header)?;
    let mut attachments = Vec::with_capacity(count);
    for _ in 0..count {
        attachments.push(read_frame(r)?);
    }
    Ok((header, attachments))
}

pub async fn write_frame_async<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> Result<()> {
    check_len(payload.len())?;
    w.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    w.write_all(payload).await?;
    Ok(())
}

/// `None` when the peer closed the connection before a new frame
pub async fn read_frame_async<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match r.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len) as usize;
    check_len(len)?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_message_async<W: AsyncWrite + Unpin>(
    w: &mut W,
    header: &Value,
    attachments: &[Vec<u8>],
) -> Result<()> {
    write_frame_async(w, &serde_json::to_vec(header)?).await?;
    for attachment in attachments {
        write_frame_async(w, attachment).await?;
    }
    w.flush().await?;
    Ok(())
}

pub async fn read_message_async<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Message>> {
    let Some(header) = read_frame_async(r).await? else {
        return Ok(None);
    };
    let header: Value = serde_json::from_slice(&header)?;
    let count = attachment_count(&header)?;
    let mut attachments = Vec::with_capacity(count);
    for _ in 0..count {
        let frame = read_frame_async(r)
            .await?
            .ok_or_else(|| Error::ConnectionError("connection closed inside a message".into()))?;
        attachments.push(frame);
    }
    Ok(Some((header, attachments)))
}
