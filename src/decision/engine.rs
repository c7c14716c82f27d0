use super::parser::parse_decision;
use super::prompt::{self, MarketContext};
use crate::api::OpenAiClient;
use crate::models::{Decision, TradeRecord};
use anyhow::{Context, Result};

/// Asks the language model for trade decisions and reflections
pub struct DecisionEngine {
    llm: OpenAiClient,
}

impl DecisionEngine {
    pub fn new(llm: OpenAiClient) -> Self {
        Self { llm }
    }

    /// Decision for the current market, or `None` when the reply holds no
    /// usable decision object
    pub async fn decide(
        &self,
        context: &MarketContext<'_>,
        reflection: Option<&str>,
    ) -> Result<Option<Decision>> {
        let system = prompt::system_prompt(reflection);
        let user = prompt::user_prompt(context).context("Failed to serialise market context")?;

        tracing::debug!("Requesting decision from {}", self.llm.model());
        let reply = self.llm.complete(&system, &user).await?;

        let decision = parse_decision(&reply);
        if decision.is_none() {
            tracing::debug!("Unparseable model reply: {}", reply);
        }
        Ok(decision)
    }

    /// Short critique of recent trades
    pub async fn reflect(
        &self,
        trades: &[TradeRecord],
        context: &MarketContext<'_>,
        performance: f64,
    ) -> Result<String> {
        let user = prompt::reflection_prompt(trades, context, performance)
            .context("Failed to serialise reflection input")?;

        let reflection = self
            .llm
            .complete(prompt::REFLECTION_SYSTEM_PROMPT, &user)
            .await?;

        Ok(reflection.trim().to_string())
    }
}
