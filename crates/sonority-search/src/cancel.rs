//! Cooperative cancellation of engine loads.
//!
//! Each load gets its own [`CancellationToken`]. Long loops poll it at
//! iteration and batch boundaries; nothing is interrupted from the outside.

pub use tokio_util::sync::CancellationToken;

use crate::error::{LoadError, LoadResult};

/// Turns a cancelled token into [`LoadError::Cancelled`].
pub trait CancelCheck {
    fn check(&self) -> LoadResult<()>;
}

impl CancelCheck for CancellationToken {
    fn check(&self) -> LoadResult<()> {
        if self.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }
}
