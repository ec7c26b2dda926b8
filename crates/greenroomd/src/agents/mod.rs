//! Built-in agents: one reference evaluator and two participants.

mod echo;
mod exact_match;
mod silent;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use greenroom_core::{AgentCard, AgentClient, AgentHost, ClientConfig, GreenExecutor};

pub use echo::Echo;
pub use exact_match::ExactMatch;
pub use silent::Silent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AgentKind {
    /// Evaluator scoring a participant reply by exact match
    ExactMatch,
    /// Participant replying with its input
    Echo,
    /// Participant that never replies
    Silent,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentKind::ExactMatch => "exact-match",
            AgentKind::Echo => "echo",
            AgentKind::Silent => "silent",
        })
    }
}

fn card(kind: AgentKind, description: &str, role: &str, capabilities: &[&str]) -> AgentCard {
    AgentCard {
        name: kind.to_string(),
        description: description.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        roles: vec![role.to_string()],
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
    }
}

/// Build the host for `kind`, not yet bound.
pub fn host(kind: AgentKind) -> Result<AgentHost> {
    let host = match kind {
        AgentKind::ExactMatch => {
            let client = AgentClient::new(ClientConfig::default())?;
            let executor = GreenExecutor::new(Arc::new(ExactMatch), client);
            AgentHost::new(card(
                kind,
                "Sends config.input to a participant and scores an exact reply",
                "evaluator",
                &["tasks", "artifacts", "cancel"],
            ))
            .with_evaluator(executor)
        }
        AgentKind::Echo => AgentHost::new(card(
            kind,
            "Replies with the payload it receives",
            "participant",
            &["message"],
        ))
        .with_participant(Arc::new(Echo)),
        AgentKind::Silent => AgentHost::new(card(
            kind,
            "Accepts messages and never answers",
            "participant",
            &["message"],
        ))
        .with_participant(Arc::new(Silent)),
    };
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_agent_names_match_cli_values() {
        for kind in AgentKind::value_variants() {
            let parsed = AgentKind::from_str(&kind.to_string(), false).unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_cards_name_their_role() {
        let card = card(AgentKind::Echo, "d", "participant", &["message"]);
        assert_eq!(card.name, "echo");
        assert_eq!(card.roles, vec!["participant".to_string()]);
    }
}
