//! Core types: query window, OOO events, presence grid, week rendering

pub mod event;
pub mod format;
pub mod grid;
pub mod time;
pub mod tracing;

pub use event::{EventsByPerson, OooEvent};
pub use format::{ellipsis, render, render_text, GridOptions, PersonRow, WeekBlock};
pub use grid::PresenceGrid;
pub use time::{
    parse_duration, resolve_timezone, system_timezone, DurationParseError, QueryWindow,
    TimezoneError, WindowError,
};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
