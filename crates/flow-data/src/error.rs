//! 저장소 오류 타입.

use flow_core::FlowError;
use thiserror::Error;

/// 데이터베이스 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 저장된 값이 도메인 형식과 맞지 않음
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<DataError> for FlowError {
    fn from(err: DataError) -> Self {
        FlowError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_flow_error() {
        let err: FlowError = DataError::PoolExhausted.into();
        assert!(matches!(err, FlowError::Storage(ref m) if m.contains("pool")));
        assert_eq!(err.kind(), "storage_error");
    }

    #[test]
    fn test_from_sqlx_error() {
        assert!(matches!(
            DataError::from(sqlx::Error::PoolTimedOut),
            DataError::PoolExhausted
        ));
        assert!(matches!(
            DataError::from(sqlx::Error::RowNotFound),
            DataError::QueryError(_)
        ));
    }
}
