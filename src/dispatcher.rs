//! Feed dispatcher — binds and unbinds per-slot image streams.
//!
//! Both passes walk every grid position exactly once and overwrite the
//! whole surface, so no stale binding survives a partial earlier pass.
//! The dispatcher keeps no state of its own; everything is derived from
//! the registry at call time.

use std::sync::Arc;

use tracing::info;

use crate::backend::Backend;
use crate::page::{Page, SurfaceState};
use crate::slots::SlotRegistry;

pub struct FeedDispatcher {
    registry: Arc<SlotRegistry>,
    page: Page,
    backend: Arc<dyn Backend>,
}

impl FeedDispatcher {
    #[must_use]
    pub fn new(registry: Arc<SlotRegistry>, page: Page, backend: Arc<dyn Backend>) -> Self {
        Self { registry, page, backend }
    }

    /// Bind every sourced slot to its stream and clear every other slot.
    /// Returns the number of feeds bound.
    pub fn start_all(&self) -> usize {
        let mut started = 0;
        for slot in self.registry.iter() {
            let surface = match &slot.source {
                Some(source) => {
                    started += 1;
                    SurfaceState::streaming(source.stream_path())
                }
                None => SurfaceState::cleared(),
            };
            self.page.set_surface(slot.index, surface);
        }
        info!(started, "camera feeds started");
        started
    }

    /// Notify the backend for every sourced slot, then clear every surface.
    /// Clearing never waits on the notifications. Returns the number of
    /// stop notifications issued.
    pub fn stop_all(&self) -> usize {
        let mut notified = 0;
        for slot in self.registry.iter() {
            if let Some(source) = slot.source.as_ref().filter(|source| source.stop_target().is_some()) {
                self.backend.stop_video(Some(source));
                notified += 1;
            }
            self.page.set_surface(slot.index, SurfaceState::cleared());
        }
        info!(notified, "camera feeds stopped");
        notified
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
