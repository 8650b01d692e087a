#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{feed}: request failed: {error}")]
    Transport {
        feed: &'static str,
        #[source]
        error: reqwest::Error,
    },

    #[error("{feed}: HTTP {status}")]
    Status { feed: &'static str, status: u16 },

    #[error("{feed}: unexpected payload: {detail}")]
    Decode { feed: &'static str, detail: String },
}

impl FetchError {
    pub fn decode(feed: &'static str, detail: impl Into<String>) -> Self {
        FetchError::Decode {
            feed,
            detail: detail.into(),
        }
    }

    pub fn feed(&self) -> &'static str {
        match self {
            FetchError::Transport { feed, .. }
            | FetchError::Status { feed, .. }
            | FetchError::Decode { feed, .. } => feed,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Transport { error, .. } if error.is_timeout())
    }
}
