use crate::CommentId;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment not found {0:?}")]
    NotFound(CommentId),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Comment content is empty")]
    EmptyContent,

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_their_details() {
        assert_eq!(
            Error::Unavailable(String::from("connection reset")).to_string(),
            "Service unavailable: connection reset"
        );
        assert_eq!(
            Error::NotFound(CommentId::stub()).to_string(),
            format!("Comment not found {:?}", CommentId::stub())
        );
    }
}
