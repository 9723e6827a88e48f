use crate::application::repos::StoreError;

pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Serialization(format!("column {index}: {source}"))
        }
        sqlx::Error::Decode(source) => StoreError::Serialization(source.to_string()),
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            StoreError::Unavailable("statement timed out".to_string())
        }
        other => StoreError::unavailable(other),
    }
}

/// Like [`map_sqlx_error`], but a row that cannot be decoded is reported as
/// corrupt data for `keyword`.
pub fn map_row_error(err: sqlx::Error, keyword: &str) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { source, .. } => StoreError::Corrupt {
            keyword: keyword.to_string(),
            message: source.to_string(),
        },
        sqlx::Error::Decode(source) => StoreError::Corrupt {
            keyword: keyword.to_string(),
            message: source.to_string(),
        },
        other => map_sqlx_error(other),
    }
}
