use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The stream closed with a partial frame still buffered. Distinct from
    /// a clean close observed between frames, which decodes as end-of-stream.
    #[error("stream closed mid-frame")]
    FrameTruncated,

    #[error("frame of {len} bytes exceeds the maximum frame size")]
    FrameTooLarge { len: usize },

    /// A `MESSAGES` batch whose entries do not have the expected
    /// `{sender, recipient, timestamp, body}` shape.
    #[error("malformed message batch: {0}")]
    MalformedMessage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
