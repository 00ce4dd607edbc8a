//! Line protocol: client command parsing and server line rendering.
//!
//! Lines are UTF-8 and newline-terminated on the wire; everything here works
//! on the line content without the terminator.
//!
//! Client -> server:
//! - first line: `<identity>`
//! - then: `VOTE <option>` (anything else is ignored)
//!
//! Server -> client:
//! - status and welcome lines after registration
//! - `OK: ...` / `ERRO: ...` replies
//! - `UPDATE: <tally>` to clients that have voted
//! - `VOTACAO_INICIADA: ...` / `VOTACAO_ENCERRADA: <tally>` to everyone

use crate::actors::messages::RoundStatus;
use crate::errors::VcError;
use crate::voting::{RoundPhase, TallySnapshot};
use std::time::Duration;

/// Prefix of a vote command.
pub const VOTE_PREFIX: &str = "VOTE ";

/// Maximum accepted inbound line length in bytes.
pub const MAX_LINE_LENGTH: usize = 1024;

/// A parsed client line (after the identity line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `VOTE <option>`.
    Vote(String),
    /// Anything else.
    Unknown,
}

impl ClientCommand {
    /// Parse a trimmed client line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.trim().strip_prefix(VOTE_PREFIX) {
            Some(option) => ClientCommand::Vote(option.trim().to_string()),
            None => ClientCommand::Unknown,
        }
    }
}

/// Parse the identity line. Returns `None` for a blank identity.
#[must_use]
pub fn parse_identity(line: &str) -> Option<String> {
    let identity = line.trim();
    (!identity.is_empty()).then(|| identity.to_string())
}

fn display_options(options: &[String]) -> String {
    options.join(", ")
}

#[must_use]
pub fn welcome_line(options: &[String]) -> String {
    format!(
        "Bem-vindo! Opcoes disponiveis: [{}]. Digite: VOTE [Opcao]",
        display_options(options)
    )
}

/// Round status lines sent right after registration.
#[must_use]
pub fn status_lines(status: &RoundStatus) -> Vec<String> {
    match status.phase {
        RoundPhase::NotStarted => vec!["Aguardando inicio da votacao...".to_string()],
        RoundPhase::Active => vec![
            format!(
                "Votacao em andamento! Tempo restante: {}s",
                status.remaining.unwrap_or_default().as_secs()
            ),
            format!("Opcoes: [{}]", display_options(&status.options)),
        ],
        RoundPhase::Ended => vec![format!("Votacao encerrada. Resultado: {}", status.tally)],
    }
}

#[must_use]
pub fn vote_accepted_line(option: &str) -> String {
    format!("OK: Voto registrado -> {option}")
}

#[must_use]
pub fn error_line(error: &VcError) -> String {
    format!("ERRO: {}", error.client_message())
}

/// Per-vote tally broadcast. A non-zero `padding` appends a NUL-filled
/// snapshot section, used to reproduce slow-consumer stalls on real sockets.
#[must_use]
pub fn update_line(tally: &TallySnapshot, padding: usize) -> String {
    if padding == 0 {
        format!("UPDATE: {tally}")
    } else {
        format!("UPDATE: {tally} | SNAPSHOT: {}", "\0".repeat(padding))
    }
}

#[must_use]
pub fn round_started_line(duration: Duration, options: &[String]) -> String {
    format!(
        "VOTACAO_INICIADA: {} segundos. Opcoes: [{}]",
        duration.as_secs(),
        display_options(options)
    )
}

#[must_use]
pub fn round_ended_line(tally: &TallySnapshot) -> String {
    format!("VOTACAO_ENCERRADA: {tally}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::voting::{VoteLedger, VotingRound};
    use tokio::time::Instant;

    fn abc() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    fn tally_with(votes: &[(&str, &str)]) -> TallySnapshot {
        let now = Instant::now();
        let mut round = VotingRound::new();
        round.start(Duration::from_secs(60), now).unwrap();
        let mut ledger = VoteLedger::new(abc());
        for (id, option) in votes {
            ledger.record_vote(&round, id, option, now).unwrap();
        }
        ledger.snapshot()
    }

    fn status(phase: RoundPhase, remaining: Option<Duration>) -> RoundStatus {
        RoundStatus {
            phase,
            remaining,
            options: abc(),
            tally: tally_with(&[("x1", "A")]),
            registered: 1,
            voted: 1,
        }
    }

    #[test]
    fn test_parse_vote_command() {
        assert_eq!(
            ClientCommand::parse("VOTE A"),
            ClientCommand::Vote("A".to_string())
        );
        assert_eq!(
            ClientCommand::parse("  VOTE B \r"),
            ClientCommand::Vote("B".to_string())
        );
        assert_eq!(
            ClientCommand::parse("VOTE D"),
            ClientCommand::Vote("D".to_string())
        );
    }

    #[test]
    fn test_parse_ignores_other_lines() {
        assert_eq!(ClientCommand::parse("vote A"), ClientCommand::Unknown);
        assert_eq!(ClientCommand::parse("VOTEA"), ClientCommand::Unknown);
        assert_eq!(ClientCommand::parse("HELLO"), ClientCommand::Unknown);
        assert_eq!(ClientCommand::parse(""), ClientCommand::Unknown);
    }

    #[test]
    fn test_parse_identity() {
        assert_eq!(parse_identity(" x1 \r\n"), Some("x1".to_string()));
        assert_eq!(parse_identity("   "), None);
    }

    #[test]
    fn test_welcome_line() {
        assert_eq!(
            welcome_line(&abc()),
            "Bem-vindo! Opcoes disponiveis: [A, B, C]. Digite: VOTE [Opcao]"
        );
    }

    #[test]
    fn test_status_lines_per_phase() {
        assert_eq!(
            status_lines(&status(RoundPhase::NotStarted, None)),
            vec!["Aguardando inicio da votacao...".to_string()]
        );
        assert_eq!(
            status_lines(&status(RoundPhase::Active, Some(Duration::from_secs(42)))),
            vec![
                "Votacao em andamento! Tempo restante: 42s".to_string(),
                "Opcoes: [A, B, C]".to_string(),
            ]
        );
        assert_eq!(
            status_lines(&status(RoundPhase::Ended, None)),
            vec!["Votacao encerrada. Resultado: {A:1, B:0, C:0}".to_string()]
        );
    }

    #[test]
    fn test_broadcast_lines() {
        let tally = tally_with(&[("x1", "A"), ("x2", "A"), ("x3", "B")]);

        assert_eq!(update_line(&tally, 0), "UPDATE: {A:2, B:1, C:0}");
        assert_eq!(
            round_started_line(Duration::from_secs(60), &abc()),
            "VOTACAO_INICIADA: 60 segundos. Opcoes: [A, B, C]"
        );
        assert_eq!(
            round_ended_line(&tally),
            "VOTACAO_ENCERRADA: {A:2, B:1, C:0}"
        );
        assert_eq!(vote_accepted_line("A"), "OK: Voto registrado -> A");
        assert_eq!(error_line(&VcError::DuplicateVote), "ERRO: Voto duplicado");
    }

    #[test]
    fn test_update_line_padding() {
        let tally = tally_with(&[]);
        let line = update_line(&tally, 16);

        assert!(line.starts_with("UPDATE: {A:0, B:0, C:0} | SNAPSHOT: "));
        assert_eq!(line.len(), "UPDATE: {A:0, B:0, C:0} | SNAPSHOT: ".len() + 16);
        assert!(!line.contains('\n'));
    }
}
