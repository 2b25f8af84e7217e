use async_trait::async_trait;

use crate::{
    dispatch::AlertDispatcher,
    engine::{TimerEntry, WarningThreshold},
    error::DispatchError,
};

/// Accepts every alert and does nothing with it.
pub struct Silent;

#[async_trait]
impl AlertDispatcher for Silent {
    async fn notify_warning(
        &self,
        _: &TimerEntry,
        _: &WarningThreshold,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn notify_spawn(&self, _: &TimerEntry, _: bool) -> Result<(), DispatchError> {
        Ok(())
    }
}
