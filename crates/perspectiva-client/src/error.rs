use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The server answered, but without the fields that confirm the write
    /// (`created_at` on element 0, or `message` for deletes).
    #[error("Server did not confirm the mutation")]
    Unconfirmed,

    #[error("Could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}
