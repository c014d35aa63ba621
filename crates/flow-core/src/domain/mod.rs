//! 수집 도메인 모델.

mod credential;
mod market;
mod record;
mod slot;
mod snapshot;

pub use credential::*;
pub use market::*;
pub use record::*;
pub use slot::*;
pub use snapshot::*;
