//! 브로커리지 커넥터.

pub mod kis;
