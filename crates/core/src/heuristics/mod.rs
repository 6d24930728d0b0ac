//! Fixed threshold rules over daily campaign metrics.
//!
//! Each campaign's daily rows are split into the current (newest) day and a chronological
//! history of the days before it. Every rule reads history in that oldest-first order.

mod describe;
mod rules;
mod service;

pub use describe::{fallback_description, format_money, format_percent};
pub use rules::{HeuristicCheck, HeuristicRule, RULES};
pub use service::{heuristic_confidence, heuristic_score, HeuristicService, HeuristicSettings};
