pub mod engine;
pub mod parser;
pub mod prompt;

pub use engine::DecisionEngine;
pub use parser::parse_decision;
pub use prompt::MarketContext;
