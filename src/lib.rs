//! Client-side session controller for a 20-slot camera monitoring page.
//!
//! The crate drives a grid of camera feeds through an Idle/Live session,
//! polls the backend for detections and raises a single alert popup, and
//! follows uploaded videos through server-side processing. Everything a
//! user would see lives in [`page::PageModel`]; the [`backend::Backend`],
//! [`page::PageHost`] and [`page::AlertSound`] traits are the seams to the
//! outside world.

pub mod alert;
pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod highlight;
pub mod page;
mod poll;
pub mod session;
pub mod slots;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, BackendError, HttpBackend, UploadPayload};
pub use config::{ControllerConfig, Timings};
pub use page::{AlertSound, AudioError, Page, PageHost, PageModel};
pub use session::{SessionController, SessionState};
pub use slots::{GRID_SLOTS, SlotRegistry, SourceRef};
