//! Session memory for single-merchant advisory conversations.
//!
//! A [`SessionState`] is created once by [`SessionManager::initialize`] and
//! then threaded through every manager call, each of which returns a new
//! value. The inspector and snapshot builder only read it.

pub mod cache;
pub mod error;
pub mod ids;
pub mod inspector;
pub mod manager;
pub mod snapshot;
pub mod state;
pub mod traits;

pub use cache::{CacheConfig, CacheLookup, MissReason, DEFAULT_TTL_SECONDS};
pub use error::{Result, SessionError};
pub use ids::{
    extract_merchant_id, generate_session_id, generate_thread_id, normalize_merchant_id,
    MERCHANT_PREFIX,
};
pub use inspector::{print_session_state, render_session_state, SessionExport, SessionSummary};
pub use manager::SessionManager;
pub use snapshot::{create_session_snapshot, message_event, snapshot_event};
pub use state::{normalize_topic, AdvisorNote, Recommendation, SessionState, KNOWN_SEGMENTS};
pub use traits::{Clock, ManualClock, SystemClock};
