//! Weekly OOO table rendering.
//!
//! Events are folded into a [`PresenceGrid`] and partitioned into one
//! [`WeekBlock`] per week of the [`QueryWindow`]. A block renders as:
//!
//! ```text
//! Mar 3 - Mar 9        | Mon | Tue | Wed | Thu | Fri | Sat | Sun |
//! ----------------------------------------------------------------
//! alice@example.com    |     |     |     | OOO |     |     |     |
//! ----------------------------------------------------------------
//! ```
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use chrono_tz::Tz;
//! use oooweek_core::format::{render, render_text, GridOptions};
//! use oooweek_core::{EventsByPerson, QueryWindow};
//!
//! let now = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
//! let window = QueryWindow::weeks_ahead(now, 1, Tz::UTC).unwrap();
//! let blocks = render(&EventsByPerson::new(), &window);
//!
//! assert_eq!(blocks.len(), 2);
//! assert!(render_text(&blocks, &GridOptions::default()).contains("No OOO Events"));
//! ```

use std::borrow::Cow;
use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::event::EventsByPerson;
use crate::grid::PresenceGrid;
use crate::time::QueryWindow;


/// Width of the name column.
pub const NAME_WIDTH: usize = 20;

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Configuration options for the table layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridOptions {
    /// Width of the name column; longer names are truncated with an ellipsis.
    pub name_width: usize,
    /// Text placed in a cell when the person is OOO that day.
    pub marker: String,
    /// Line shown instead of rows when nobody is OOO that week.
    pub empty_text: String,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            name_width: NAME_WIDTH,
            marker: "OOO".to_string(),
            empty_text: "No OOO Events".to_string(),
        }
    }
}

impl GridOptions {
    fn cell_width(&self) -> usize {
        self.marker.chars().count().max(3)
    }

    /// The horizontal rule, as wide as the header.
    pub fn rule(&self) -> String {
        "-".repeat(self.name_width + 2 + DAY_NAMES.len() * (self.cell_width() + 3))
    }
}

/// One person's row in a week block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRow {
    pub person: String,
    /// OOO flags for Monday through Sunday.
    pub days: [bool; 7],
}

/// Seven consecutive days starting on a Monday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekBlock {
    /// The Monday this block starts on.
    pub monday: NaiveDate,
    /// People OOO on at least one day of the week, sorted by name.
    pub rows: Vec<PersonRow>,
}

impl WeekBlock {
    /// Extracts the block starting at `monday` from `grid`.
    pub fn from_grid(grid: &PresenceGrid, monday: NaiveDate) -> Self {
        let sunday = monday + Duration::days(6);
        let rows = grid
            .people_between(monday, sunday)
            .into_iter()
            .map(|person| {
                let mut days = [false; 7];
                for (offset, present) in days.iter_mut().enumerate() {
                    let day = monday + Duration::days(offset as i64);
                    *present = grid.is_present(day, person);
                }
                PersonRow {
                    person: person.to_string(),
                    days,
                }
            })
            .collect();

        Self { monday, rows }
    }

    /// The Sunday this block ends on.
    pub fn sunday(&self) -> NaiveDate {
        self.monday + Duration::days(6)
    }

    /// Returns true if nobody is OOO during this week.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The date range label, e.g. `Mar 3 - Mar 9`.
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.monday.format("%b %-d"),
            self.sunday().format("%b %-d")
        )
    }

    /// Renders the block with the given options, without a trailing newline.
    pub fn format_with(&self, options: &GridOptions) -> String {
        let width = options.name_width;
        let cell = options.cell_width();
        let rule = options.rule();

        let mut lines = Vec::with_capacity(self.rows.len() + 4);

        let mut header = format!("{:<width$} |", self.label());
        for day in DAY_NAMES {
            header.push_str(&format!(" {:<cell$} |", day));
        }
        lines.push(header);
        lines.push(rule.clone());

        if self.rows.is_empty() {
            lines.push(options.empty_text.clone());
        }

        for row in &self.rows {
            let mut line = format!("{:<width$} |", ellipsis(&row.person, width));
            for present in row.days {
                let text = if present { options.marker.as_str() } else { "" };
                line.push_str(&format!(" {:<cell$} |", text));
            }
            lines.push(line);
        }

        lines.push(rule);
        lines.join("\n")
    }
}

impl fmt::Display for WeekBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_with(&GridOptions::default()))
    }
}

/// Renders events into one block per week of `window`.
///
/// Dates are resolved in the window's timezone. The result depends only on
/// the inputs.
pub fn render(events_by_person: &EventsByPerson, window: &QueryWindow) -> Vec<WeekBlock> {
    let grid = PresenceGrid::build(events_by_person, &window.tz);
    window
        .week_starts()
        .into_iter()
        .map(|monday| WeekBlock::from_grid(&grid, monday))
        .collect()
}

/// Joins rendered blocks, each preceded by a blank line.
pub fn render_text(blocks: &[WeekBlock], options: &GridOptions) -> String {
    let mut out = String::new();
    for block in blocks {
        out.push('\n');
        out.push_str(&block.format_with(options));
        out.push('\n');
    }
    out
}

/// Truncates a string with ellipsis if it exceeds the given length.
pub fn ellipsis(s: &str, max_len: usize) -> Cow<'_, str> {
    if max_len == 0 {
        return Cow::Borrowed("");
    }

    let char_count = s.chars().count();
    if char_count <= max_len {
        return Cow::Borrowed(s);
    }

    let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
    Cow::Owned(format!("{}...", truncated))
}
