//! Execution gateway seam
//!
//! The engine only describes what it wants via [`OrderIntent`]s. A gateway owns
//! real order state and reports back the position it actually holds.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{Bar, Direction, OrderIntent};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("order {tag} rejected: {reason}")]
    Rejected { tag: String, reason: String },

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Position as reported by the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub direction: Direction,
    pub size: u32,
    pub average_price: Option<f64>,
}

impl PositionSnapshot {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0
    }
}

pub trait ExecutionGateway {
    /// Submit one intent; an error means it was not accepted
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), GatewayError>;

    /// Current position held at the gateway
    fn position(&self) -> PositionSnapshot;

    /// Called with every primary bar before the engine evaluates it
    fn on_bar(&mut self, _bar: &Bar) {}
}

impl<G: ExecutionGateway + ?Sized> ExecutionGateway for Box<G> {
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), GatewayError> {
        (**self).submit(intent)
    }

    fn position(&self) -> PositionSnapshot {
        (**self).position()
    }

    fn on_bar(&mut self, bar: &Bar) {
        (**self).on_bar(bar)
    }
}

/// Paper gateway that fills market intents at the latest close.
///
/// Stops and targets are recorded but never triggered.
#[derive(Debug, Default)]
pub struct DryRunGateway {
    last_close: Option<f64>,
    position: PositionSnapshot,
    accepted: Vec<OrderIntent>,
    rejected: usize,
    scripted_rejections: Vec<&'static str>,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next submitted intent whose [`OrderIntent::kind`] is `kind`
    pub fn reject_next(&mut self, kind: &'static str) {
        self.scripted_rejections.push(kind);
    }

    /// Drop the held position as if it had been closed outside the engine
    pub fn flatten(&mut self) {
        self.position = PositionSnapshot::flat();
    }

    pub fn accepted(&self) -> &[OrderIntent] {
        &self.accepted
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    fn fill_price(&self, intent: &OrderIntent) -> Result<f64, GatewayError> {
        self.last_close.ok_or_else(|| GatewayError::Rejected {
            tag: intent.signal_name(),
            reason: "no market price yet".to_string(),
        })
    }

    fn apply(&mut self, intent: &OrderIntent) -> Result<(), GatewayError> {
        match *intent {
            OrderIntent::OpenLong { quantity } | OrderIntent::OpenShort { quantity } => {
                if !self.position.is_flat() {
                    return Err(GatewayError::Rejected {
                        tag: intent.signal_name(),
                        reason: "position already open".to_string(),
                    });
                }
                let price = self.fill_price(intent)?;
                let direction = if matches!(intent, OrderIntent::OpenLong { .. }) {
                    Direction::Long
                } else {
                    Direction::Short
                };
                self.position = PositionSnapshot {
                    direction,
                    size: quantity,
                    average_price: Some(price),
                };
            }
            OrderIntent::AddLong { quantity } | OrderIntent::AddShort { quantity } => {
                if self.position.is_flat() {
                    return Err(GatewayError::Rejected {
                        tag: intent.signal_name(),
                        reason: "nothing to add to".to_string(),
                    });
                }
                let price = self.fill_price(intent)?;
                let held = self.position.size as f64;
                let average = self
                    .position
                    .average_price
                    .map(|avg| (avg * held + price * quantity as f64) / (held + quantity as f64))
                    .unwrap_or(price);
                self.position.size += quantity;
                self.position.average_price = Some(average);
            }
            OrderIntent::ExitPartial { quantity, .. } => {
                self.position.size = self.position.size.saturating_sub(quantity);
                if self.position.size == 0 {
                    self.flatten();
                }
            }
            OrderIntent::ExitAll { .. } => self.flatten(),
            OrderIntent::SetStop { .. } | OrderIntent::SetTarget { .. } => {}
        }
        Ok(())
    }
}

impl ExecutionGateway for DryRunGateway {
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), GatewayError> {
        if let Some(idx) = self
            .scripted_rejections
            .iter()
            .position(|kind| *kind == intent.kind())
        {
            self.scripted_rejections.remove(idx);
            self.rejected += 1;
            return Err(GatewayError::Rejected {
                tag: intent.signal_name(),
                reason: "scripted rejection".to_string(),
            });
        }

        if let Err(e) = self.apply(intent) {
            self.rejected += 1;
            return Err(e);
        }
        debug!(kind = intent.kind(), tag = %intent.signal_name(), "Dry-run accepted");
        self.accepted.push(intent.clone());
        Ok(())
    }

    fn position(&self) -> PositionSnapshot {
        self.position
    }

    fn on_bar(&mut self, bar: &Bar) {
        self.last_close = Some(bar.close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Leg;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn bar(close: f64) -> Bar {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Bar::new_unchecked(dt, close, close, close, close, 1.0)
    }

    #[test]
    fn test_requires_a_price() {
        let mut gw = DryRunGateway::new();
        assert!(gw.submit(&OrderIntent::OpenLong { quantity: 1 }).is_err());
        assert_eq!(gw.rejected_count(), 1);
        assert!(gw.position().is_flat());
    }

    #[test]
    fn test_mirrors_open_add_and_exits() {
        let mut gw = DryRunGateway::new();
        gw.on_bar(&bar(100.0));
        gw.submit(&OrderIntent::OpenLong { quantity: 2 }).unwrap();
        gw.on_bar(&bar(110.0));
        gw.submit(&OrderIntent::AddLong { quantity: 1 }).unwrap();

        let pos = gw.position();
        assert_eq!(pos.direction, Direction::Long);
        assert_eq!(pos.size, 3);
        assert_relative_eq!(pos.average_price.unwrap(), 310.0 / 3.0);

        gw.submit(&OrderIntent::ExitPartial {
            leg: Leg::AddOn,
            direction: Direction::Long,
            quantity: 1,
        })
        .unwrap();
        assert_eq!(gw.position().size, 2);

        gw.submit(&OrderIntent::ExitAll {
            direction: Direction::Long,
            quantity: 2,
        })
        .unwrap();
        assert!(gw.position().is_flat());
        assert_eq!(gw.accepted().len(), 4);
    }

    #[test]
    fn test_scripted_rejection_only_hits_matching_kind() {
        let mut gw = DryRunGateway::new();
        gw.on_bar(&bar(100.0));
        gw.reject_next("ExitAll");

        gw.submit(&OrderIntent::OpenShort { quantity: 1 }).unwrap();
        let err = gw
            .submit(&OrderIntent::ExitAll {
                direction: Direction::Short,
                quantity: 1,
            })
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Rejected {
                tag: "ForceClose".to_string(),
                reason: "scripted rejection".to_string()
            }
        );
        assert_eq!(gw.position().size, 1);

        // rejection is consumed
        gw.submit(&OrderIntent::ExitAll {
            direction: Direction::Short,
            quantity: 1,
        })
        .unwrap();
        assert!(gw.position().is_flat());
    }

    #[test]
    fn test_second_open_rejected() {
        let mut gw = DryRunGateway::new();
        gw.on_bar(&bar(100.0));
        gw.submit(&OrderIntent::OpenLong { quantity: 1 }).unwrap();
        assert!(gw.submit(&OrderIntent::OpenShort { quantity: 1 }).is_err());
    }
}
