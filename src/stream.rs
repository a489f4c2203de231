#![forbid(unsafe_code)]

//! Newline-delimited JSON transport for [`BatchRecord`]s.
//!
//! The sending side turns a channel of records into a chunked HTTP body, one
//! JSON object per line. The receiving side buffers partial lines until a full
//! record is available, so chunk boundaries never matter.

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::{io::AsyncRead, sync::mpsc};
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};

use crate::pipeline::BatchRecord;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Serializes one record followed by `\n`.
pub fn encode_line(record: &BatchRecord) -> Result<Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Body that yields one line per received record and ends once every sender
/// is dropped.
pub fn ndjson_body(records: mpsc::Receiver<BatchRecord>) -> Body {
    let lines = futures::stream::unfold(records, |mut records| async move {
        let record = records.recv().await?;
        Some((encode_line(&record), records))
    });
    Body::from_stream(lines)
}

#[derive(Debug, thiserror::Error)]
pub enum StreamDecodeError {
    #[error("reading stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("splitting stream into lines: {0}")]
    Lines(#[from] LinesCodecError),
    #[error("decoding record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reassembles records from arbitrarily split NDJSON bytes. Blank lines are
/// ignored.
#[derive(Debug, Default)]
pub struct BatchRecordDecoder {
    lines: LinesCodec,
}

impl BatchRecordDecoder {
    fn parse(line: Option<String>) -> Result<Option<Option<BatchRecord>>, StreamDecodeError> {
        match line {
            None => Ok(None),
            Some(line) if line.trim().is_empty() => Ok(Some(None)),
            Some(line) => Ok(Some(Some(serde_json::from_str(&line)?))),
        }
    }
}

impl Decoder for BatchRecordDecoder {
    type Item = BatchRecord;
    type Error = StreamDecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BatchRecord>, StreamDecodeError> {
        loop {
            match Self::parse(self.lines.decode(src)?)? {
                None => return Ok(None),
                Some(None) => continue,
                Some(record) => return Ok(record),
            }
        }
    }

    fn decode_eof(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<BatchRecord>, StreamDecodeError> {
        loop {
            match Self::parse(self.lines.decode_eof(src)?)? {
                None => return Ok(None),
                Some(None) => continue,
                Some(record) => return Ok(record),
            }
        }
    }
}

/// Reads records until the stream ends or a terminal record arrives.
pub async fn read_records<R>(reader: R) -> Result<Vec<BatchRecord>, StreamDecodeError>
where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(reader, BatchRecordDecoder::default());
    let mut records = Vec::new();
    while let Some(record) = framed.next().await {
        let record = record?;
        let terminal = record.is_terminal();
        records.push(record);
        if terminal {
            break;
        }
    }
    Ok(records)
}
