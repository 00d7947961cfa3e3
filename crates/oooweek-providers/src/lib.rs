//! Calendar provider seam, Google implementation and OOO aggregation.
//!
//! This crate provides everything between the credential store and the
//! rendered grid:
//!
//! - [`CalendarProvider`] - The trait calendar backends implement
//! - [`RawEvent`] - Provider-agnostic raw event data
//! - [`to_ooo_event`] - Conversion of raw events into [`oooweek_core::OooEvent`]
//! - [`Aggregator`] - Group expansion and concurrent per-member fetching
//! - [`CredentialStore`] - Named secret storage (OS keyring or file)
//! - [`ProviderError`] - Error types for provider operations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Google API     │     │ CredentialStore  │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ GoogleProvider  │ ◄── │     AuthFlow     │
//! └────────┬────────┘     └──────────────────┘
//!          │ CalendarProvider
//!          ▼
//! ┌─────────────────┐
//! │   Aggregator    │  one task per member
//! └────────┬────────┘
//!          │ to_ooo_event()
//!          ▼
//!   EventsByPerson
//! ```

pub mod aggregate;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod normalize;
pub mod provider;
pub mod raw_event;
pub mod store;

// Re-export main types at crate root
pub use aggregate::{Aggregator, Collected, MemberFailure};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use normalize::{collect_member_events, resolve_time, to_ooo_event};
pub use provider::{
    BoxFuture, BusyPeriod, CalendarProvider, EventQuery, ExpansionLimits, FreeBusyCalendar,
    FreeBusyError, FreeBusyQuery,
};
pub use raw_event::{OUT_OF_OFFICE, RawEvent, RawEventTime};
pub use store::{
    CredentialStore, FileStore, KeyringStore, MemoryStore, SecretKeys, StoreError,
    delete_if_present,
};
