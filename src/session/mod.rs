//! Session state machine.
//!
//! A [`Session`] is the only owner of the camera. The presentation layer
//! drives it with commands (`open`, `capture`, `switch`, `retake`, `save`,
//! `close`, `retry`), feeds it frame-source events (`stream_ready`,
//! `playback_failed`) and renders the [`SessionSnapshot`]s it publishes.
//!
//! ```text
//!          open            ok
//!  Idle ─────────▶ Requesting ─────▶ Live ◀──── retake ──── Captured
//!   ▲                  │  ▲           │  └──── capture ────────▶│
//!   │                  │  └─ switch ──┘                         │
//!   │                  ▼ err                                    │
//!   └──── close ──── Error ◀──── playback failure ──────────────┘
//! ```

mod error;
mod machine;
mod state;

pub use error::{CommandError, ErrorKind, SessionError};
pub use machine::Session;
pub use state::{CommandKind, SavedPhoto, SessionSnapshot, SessionState};
