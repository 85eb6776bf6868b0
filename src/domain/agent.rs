use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of agent hosted by the runtime
///
/// The declaration order is the registration order used to break routing ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Market overview: prices, movers, volume
    Overview,
    /// Candles and technical analysis
    Charts,
    /// Quotes and human-approved trade proposals
    Trading,
    /// News, sentiment and research reports
    Intelligence,
    /// Conversational front door that fans out to the others
    Chat,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Overview,
        AgentType::Charts,
        AgentType::Trading,
        AgentType::Intelligence,
        AgentType::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Overview => "overview",
            AgentType::Charts => "charts",
            AgentType::Trading => "trading",
            AgentType::Intelligence => "intelligence",
            AgentType::Chat => "chat",
        }
    }

    /// Deterministic per-session agent id, e.g. `s1-charts`
    pub fn session_agent_id(&self, session_id: &str) -> String {
        format!("{}-{}", session_id, self.as_str())
    }

    /// Inverse of `session_agent_id`; ids without the suffix are their own session
    pub fn session_of<'a>(&self, agent_id: &'a str) -> &'a str {
        agent_id
            .strip_suffix(self.as_str())
            .and_then(|rest| rest.strip_suffix('-'))
            .filter(|session| !session.is_empty())
            .unwrap_or(agent_id)
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "overview" => Ok(AgentType::Overview),
            "charts" | "chart" => Ok(AgentType::Charts),
            "trading" | "trade" => Ok(AgentType::Trading),
            "intelligence" | "intel" => Ok(AgentType::Intelligence),
            "chat" => Ok(AgentType::Chat),
            other => Err(format!(
                "unknown agent type '{}'; expected overview|charts|trading|intelligence|chat",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_type() {
        assert_eq!("Charts".parse::<AgentType>().unwrap(), AgentType::Charts);
        assert_eq!("intel".parse::<AgentType>().unwrap(), AgentType::Intelligence);
        assert!("governance".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_session_agent_id() {
        assert_eq!(AgentType::Trading.session_agent_id("abc"), "abc-trading");
        assert_eq!(AgentType::Trading.session_of("abc-trading"), "abc");
        assert_eq!(AgentType::Chat.session_of("custom"), "custom");
    }
}
