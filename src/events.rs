//! Known-event catalog and association with a detected change point.
//!
//! Association is temporal proximity only. Nothing here establishes
//! causality, and the reporting layer is careful to say so.

use crate::error::{Error, Result};
use chrono::NaiveDate;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Category of a market-relevant event.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Wars, invasions, coups, attacks on infrastructure.
    Geopolitical,
    /// OPEC/OPEC+ production decisions.
    OpecDecision,
    /// Financial crises, pandemics, demand collapses.
    EconomicShock,
    /// Export bans, embargoes, price caps.
    Sanction,
}

/// Direction an event was expected to push the series, a priori.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedImpact {
    /// Expected to push the series up.
    Increase,
    /// Expected to push the series down.
    Decrease,
    /// Plausible in either direction.
    Mixed,
}

/// One entry in the known-event catalog.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    /// Stable identifier, unique within a catalog.
    pub id: String,
    /// Date the event occurred or was announced.
    pub date: NaiveDate,
    /// Human-readable name.
    pub name: String,
    /// Category. Serialized as `type`, the catalog's field name.
    #[cfg_attr(feature = "serde1", serde(rename = "type"))]
    pub kind: EventKind,
    /// One-sentence description.
    pub description: String,
    /// A priori expected direction of impact.
    pub expected_impact: ExpectedImpact,
}

/// A change point matched against the event catalog.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct EventAssociation {
    /// Date of the change point being explained.
    pub changepoint_date: NaiveDate,
    /// Half-width of the search window, in days.
    pub window_days: i64,
    /// Events within the window with their signed offsets in days
    /// (`event date - change point date`), ordered by absolute offset;
    /// ties keep catalog order.
    pub events_in_window: Vec<(EventRecord, i64)>,
}

impl EventAssociation {
    /// The event nearest the change point, if any fell inside the window.
    #[must_use]
    pub fn closest_event(&self) -> Option<&EventRecord> {
        self.events_in_window.first().map(|(e, _)| e)
    }

    /// Signed offset of the closest event, in days.
    #[must_use]
    pub fn closest_offset_days(&self) -> Option<i64> {
        self.events_in_window.first().map(|&(_, d)| d)
    }
}

/// Matches change-point dates against an event catalog.
#[derive(Clone, Copy, Debug)]
pub struct EventAssociator {
    /// Half-width of the search window, in days.
    pub window_days: i64,
}

impl Default for EventAssociator {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

impl EventAssociator {
    /// Find catalog events within `window_days` of the change point.
    ///
    /// A window of zero matches only events dated exactly on the change
    /// point. An empty result is a legitimate outcome, not an error.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for a negative window.
    pub fn associate(
        &self,
        changepoint_date: NaiveDate,
        catalog: &[EventRecord],
    ) -> Result<EventAssociation> {
        if self.window_days < 0 {
            return Err(Error::Configuration {
                parameter: "window_days",
                value: self.window_days.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }

        let mut events_in_window: Vec<(EventRecord, i64)> = catalog
            .iter()
            .filter_map(|event| {
                let offset = (event.date - changepoint_date).num_days();
                (offset.abs() <= self.window_days).then(|| (event.clone(), offset))
            })
            .collect();
        // Stable: equidistant events keep catalog order.
        events_in_window.sort_by_key(|&(_, offset)| offset.abs());

        Ok(EventAssociation {
            changepoint_date,
            window_days: self.window_days,
            events_in_window,
        })
    }
}

/// Catalog events of a given kind, in catalog order.
#[must_use]
pub fn events_of_kind(catalog: &[EventRecord], kind: EventKind) -> Vec<&EventRecord> {
    catalog.iter().filter(|e| e.kind == kind).collect()
}

/// Catalog events dated within `[start, end]` inclusive, in catalog order.
#[must_use]
pub fn events_in_range(
    catalog: &[EventRecord],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<&EventRecord> {
    catalog
        .iter()
        .filter(|e| e.date >= start && e.date <= end)
        .collect()
}
