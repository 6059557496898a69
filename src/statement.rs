//! Plain-language impact statements.
//!
//! The output is a deterministic function of the analysis results: same
//! inputs, same text. Events are always described as "associated with" the
//! change point; the statement never claims causation.

use crate::events::EventAssociation;
use crate::extract::ChangePointEstimate;
use crate::impact::{Direction, ImpactSummary};
use std::fmt::Write;

/// Banner prepended when convergence diagnostics failed.
const UNRELIABLE_BANNER: &str =
    "WARNING: convergence diagnostics failed; treat every number below as unreliable.";

/// Render a human-readable statement from the analysis results.
///
/// `association` is `None` when the series carries no dates and event
/// matching was skipped. `reliable` comes from the convergence report.
#[must_use]
pub fn impact_statement(
    estimate: &ChangePointEstimate,
    impact: &ImpactSummary,
    association: Option<&EventAssociation>,
    reliable: bool,
) -> String {
    let mut out = String::new();
    if !reliable {
        out.push_str(UNRELIABLE_BANNER);
        out.push_str("\n\n");
    }

    match estimate.date {
        Some(date) => {
            let _ = write!(
                out,
                "A structural break was detected on {date} (observation {})",
                estimate.index
            );
        }
        None => {
            let _ = write!(
                out,
                "A structural break was detected at observation {}",
                estimate.index
            );
        }
    }
    let _ = write!(
        out,
        ", with a {:.0}% credible interval of observations {} to {}.",
        estimate.credible_interval_probability * 100.0,
        estimate.credible_interval.0,
        estimate.credible_interval.1
    );

    match impact.direction {
        Direction::Negligible => {
            let _ = write!(
                out,
                " The mean level was essentially unchanged ({:.4} to {:.4}).",
                impact.mean_before, impact.mean_after
            );
        }
        Direction::Increase | Direction::Decrease => {
            let verb = if impact.direction == Direction::Increase {
                "rose"
            } else {
                "fell"
            };
            let _ = write!(
                out,
                " The mean level {verb} from {:.4} to {:.4}, a {} shift",
                impact.mean_before,
                impact.mean_after,
                impact.magnitude.adjective()
            );
            if let Some(pct) = impact.mean_change_pct {
                let _ = write!(out, " ({pct:+.1}%)");
            }
            out.push('.');
        }
    }

    if let Some(vol) = &impact.volatility {
        match vol.direction {
            Direction::Negligible => {
                let _ = write!(
                    out,
                    " Volatility was essentially unchanged ({:.4} to {:.4}).",
                    vol.before, vol.after
                );
            }
            Direction::Increase | Direction::Decrease => {
                let verb = if vol.direction == Direction::Increase {
                    "rose"
                } else {
                    "fell"
                };
                let _ = write!(
                    out,
                    " Volatility {verb} from {:.4} to {:.4} ({:+.1}%).",
                    vol.before, vol.after, vol.change_pct
                );
            }
        }
    }

    if let Some(assoc) = association {
        match (assoc.closest_event(), assoc.closest_offset_days()) {
            (Some(event), Some(offset)) => {
                let timing = match offset {
                    0 => "on the same day as".to_string(),
                    o if o < 0 => format!("{} days before", -o),
                    o => format!("{o} days after"),
                };
                let _ = write!(
                    out,
                    " The break is associated with {} ({}), dated {timing} the change point.",
                    event.name, event.date
                );
                if assoc.events_in_window.len() > 1 {
                    let _ = write!(
                        out,
                        " It is the closest of {} cataloged events within {} days.",
                        assoc.events_in_window.len(),
                        assoc.window_days
                    );
                }
                out.push_str(
                    " This association is temporal proximity only, not evidence of causation.",
                );
            }
            _ => {
                let _ = write!(
                    out,
                    " No cataloged event falls within {} days of the change point.",
                    assoc.window_days
                );
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventRecord, ExpectedImpact};
    use crate::extract::EstimateMethod;
    use crate::impact::MagnitudeClass;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn estimate(date: Option<NaiveDate>) -> ChangePointEstimate {
        ChangePointEstimate {
            index: 250,
            date,
            method: EstimateMethod::Mean,
            credible_interval: (246, 254),
            credible_interval_probability: 0.94,
            posterior_std: 2.1,
        }
    }

    fn upward_impact() -> ImpactSummary {
        ImpactSummary {
            mean_before: 60.0,
            mean_after: 95.0,
            mean_change: 35.0,
            mean_change_pct: Some(58.3),
            mean_before_hdi: (58.0, 62.0),
            mean_after_hdi: (93.0, 97.0),
            direction: Direction::Increase,
            magnitude_in_std: 7.0,
            magnitude: MagnitudeClass::VeryLarge,
            pooled_std: 5.0,
            volatility: None,
        }
    }

    fn association(offset: i64) -> EventAssociation {
        let cp = d(2008, 7, 14);
        let event = EventRecord {
            id: "x".to_string(),
            date: cp + chrono::Duration::days(offset),
            name: "Supply disruption".to_string(),
            kind: EventKind::Geopolitical,
            description: String::new(),
            expected_impact: ExpectedImpact::Increase,
        };
        EventAssociation {
            changepoint_date: cp,
            window_days: 30,
            events_in_window: vec![(event, offset)],
        }
    }

    #[test]
    fn associates_without_claiming_causation() {
        let text = impact_statement(
            &estimate(Some(d(2008, 7, 14))),
            &upward_impact(),
            Some(&association(-3)),
            true,
        );
        assert!(text.contains("associated with Supply disruption"));
        assert!(text.contains("3 days before"));
        assert!(text.contains("not evidence of causation"));
        assert!(!text.contains("caused by"));
        assert!(!text.contains("WARNING"));
    }

    #[test]
    fn same_day_event_phrasing() {
        let text = impact_statement(
            &estimate(Some(d(2008, 7, 14))),
            &upward_impact(),
            Some(&association(0)),
            true,
        );
        assert!(text.contains("on the same day as"));
    }

    #[test]
    fn multiple_matches_report_a_count() {
        let mut assoc = association(-3);
        let mut second = assoc.events_in_window[0].0.clone();
        second.id = "y".to_string();
        second.name = "Second event".to_string();
        second.date = assoc.changepoint_date + chrono::Duration::days(10);
        assoc.events_in_window.push((second, 10));

        let text = impact_statement(
            &estimate(Some(d(2008, 7, 14))),
            &upward_impact(),
            Some(&assoc),
            true,
        );
        assert!(text.contains("closest of 2 cataloged events within 30 days"));
    }

    #[test]
    fn unreliable_fit_gets_a_banner() {
        let text = impact_statement(&estimate(None), &upward_impact(), None, false);
        assert!(text.starts_with("WARNING"));
        assert!(text.contains("unreliable"));
    }

    #[test]
    fn negligible_volatility_shift_is_not_narrated_as_movement() {
        let impact = ImpactSummary {
            volatility: Some(crate::impact::VolatilityImpact {
                before: 2.0,
                after: 2.01,
                change: 0.01,
                change_pct: 0.5,
                direction: Direction::Negligible,
                before_hdi: (1.9, 2.1),
                after_hdi: (1.9, 2.1),
            }),
            ..upward_impact()
        };
        let text = impact_statement(&estimate(None), &impact, None, true);
        assert!(text.contains("Volatility was essentially unchanged"));
        assert!(!text.contains("Volatility rose"));
        assert!(!text.contains("Volatility fell"));
    }

    #[test]
    fn negligible_shift_is_stated_as_unchanged() {
        let impact = ImpactSummary {
            mean_change: 0.1,
            mean_change_pct: Some(0.2),
            mean_after: 60.1,
            direction: Direction::Negligible,
            magnitude: MagnitudeClass::Negligible,
            ..upward_impact()
        };
        let text = impact_statement(&estimate(None), &impact, None, true);
        assert!(text.contains("essentially unchanged"));
        assert!(!text.contains("rose"));
    }

    #[test]
    fn empty_window_is_reported() {
        let assoc = EventAssociation {
            changepoint_date: d(2015, 6, 1),
            window_days: 30,
            events_in_window: Vec::new(),
        };
        let text = impact_statement(
            &estimate(Some(d(2015, 6, 1))),
            &upward_impact(),
            Some(&assoc),
            true,
        );
        assert!(text.contains("No cataloged event falls within 30 days"));
    }

    #[test]
    fn statements_are_deterministic() {
        let a = impact_statement(&estimate(None), &upward_impact(), None, true);
        let b = impact_statement(&estimate(None), &upward_impact(), None, true);
        assert_eq!(a, b);
    }
}
