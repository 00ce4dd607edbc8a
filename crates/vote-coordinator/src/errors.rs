//! Vote coordinator error types.
//!
//! Every error is recovered locally and surfaced to the originating client
//! as an `ERRO: ...` line. Internal details are logged server-side but not
//! exposed to clients.

use crate::voting::RoundPhase;
use thiserror::Error;

/// Vote coordinator error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VcError {
    /// Another live session already holds this identity.
    #[error("Identity already registered: {0}")]
    DuplicateIdentity(String),

    /// Identity line was empty after trimming.
    #[error("Invalid identity")]
    InvalidIdentity,

    /// Vote submitted while the round is not accepting votes.
    #[error("Round not active (phase: {0})")]
    RoundNotActive(RoundPhase),

    /// Vote submitted after the round deadline elapsed.
    #[error("Round deadline elapsed")]
    RoundExpired,

    /// Round length out of range; carries the requested seconds.
    #[error("Invalid round duration: {0}s")]
    InvalidRoundDuration(u64),

    /// Identity already has a recorded vote.
    #[error("Identity has already voted")]
    DuplicateVote,

    /// Option is not part of the configured option set.
    #[error("Invalid option {option:?}")]
    InvalidOption { option: String, valid: Vec<String> },

    /// Dispatch queue was full and the update was dropped.
    #[error("Dispatch queue full, update dropped")]
    DispatchBackpressure,

    /// Writing to a client sink failed or timed out.
    #[error("Sink write failed for {client_id}: {reason}")]
    SinkWriteFailure { client_id: String, reason: String },

    /// Operation referenced an identity with no live session.
    #[error("Client not registered: {0}")]
    UnknownClient(String),

    /// Coordinator is shutting down.
    #[error("Coordinator is shutting down")]
    ShuttingDown,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VcError {
    /// Returns a bounded label for metrics and structured logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            VcError::DuplicateIdentity(_) => "duplicate_identity",
            VcError::InvalidIdentity => "invalid_identity",
            VcError::RoundNotActive(_) => "round_not_active",
            VcError::RoundExpired => "round_expired",
            VcError::InvalidRoundDuration(_) => "invalid_round_duration",
            VcError::DuplicateVote => "duplicate_vote",
            VcError::InvalidOption { .. } => "invalid_option",
            VcError::DispatchBackpressure => "dispatch_backpressure",
            VcError::SinkWriteFailure { .. } => "sink_write_failure",
            VcError::UnknownClient(_) => "unknown_client",
            VcError::ShuttingDown => "shutting_down",
            VcError::Config(_) => "config",
            VcError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    ///
    /// The wire layer prefixes this with `ERRO: `.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            VcError::DuplicateIdentity(_) => "NOME em uso".to_string(),
            VcError::InvalidIdentity => "NOME invalido".to_string(),
            VcError::RoundNotActive(RoundPhase::Ended) => "Votacao encerrada".to_string(),
            VcError::RoundNotActive(_) => "Votacao nao iniciada".to_string(),
            VcError::RoundExpired => "Tempo limite expirado".to_string(),
            VcError::InvalidRoundDuration(_) => "Duracao invalida".to_string(),
            VcError::DuplicateVote => "Voto duplicado".to_string(),
            VcError::InvalidOption { valid, .. } => {
                format!("Opcao invalida. Use: [{}]", valid.join(", "))
            }
            VcError::DispatchBackpressure => {
                "Servidor sobrecarregado, atualizacao descartada".to_string()
            }
            VcError::SinkWriteFailure { .. } => "Falha ao entregar mensagem".to_string(),
            VcError::UnknownClient(_) => "Cliente nao registrado".to_string(),
            VcError::ShuttingDown => "Servidor encerrando".to_string(),
            VcError::Config(_) | VcError::Internal(_) => "Erro interno".to_string(),
        }
    }

    /// Whether the connection should stay open after reporting this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            VcError::ShuttingDown | VcError::Internal(_) | VcError::UnknownClient(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn abc() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn test_client_messages_match_wire_texts() {
        assert_eq!(
            VcError::DuplicateIdentity("x1".to_string()).client_message(),
            "NOME em uso"
        );
        assert_eq!(
            VcError::RoundNotActive(RoundPhase::NotStarted).client_message(),
            "Votacao nao iniciada"
        );
        assert_eq!(
            VcError::RoundNotActive(RoundPhase::Ended).client_message(),
            "Votacao encerrada"
        );
        assert_eq!(
            VcError::RoundExpired.client_message(),
            "Tempo limite expirado"
        );
        assert_eq!(VcError::DuplicateVote.client_message(), "Voto duplicado");
        assert_eq!(
            VcError::InvalidOption {
                option: "D".to_string(),
                valid: abc(),
            }
            .client_message(),
            "Opcao invalida. Use: [A, B, C]"
        );
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let err = VcError::Internal("mailbox receive failed: closed".to_string());
        assert_eq!(err.client_message(), "Erro interno");
        assert!(err.to_string().contains("mailbox receive failed"));

        let err = VcError::SinkWriteFailure {
            client_id: "x1".to_string(),
            reason: "timed_out".to_string(),
        };
        assert!(!err.client_message().contains("x1"));
    }

    #[test]
    fn test_reason_labels_are_bounded() {
        let errors = [
            VcError::DuplicateIdentity("a".to_string()),
            VcError::InvalidIdentity,
            VcError::RoundNotActive(RoundPhase::NotStarted),
            VcError::RoundExpired,
            VcError::InvalidRoundDuration(u64::MAX),
            VcError::DuplicateVote,
            VcError::InvalidOption {
                option: "D".to_string(),
                valid: abc(),
            },
            VcError::DispatchBackpressure,
            VcError::SinkWriteFailure {
                client_id: "a".to_string(),
                reason: "closed".to_string(),
            },
            VcError::UnknownClient("a".to_string()),
            VcError::ShuttingDown,
            VcError::Config("bad".to_string()),
            VcError::Internal("bad".to_string()),
        ];

        for err in &errors {
            let reason = err.reason();
            assert!(!reason.is_empty());
            assert!(reason
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_recoverable_errors_keep_connection_open() {
        assert!(VcError::DuplicateVote.is_recoverable());
        assert!(VcError::RoundExpired.is_recoverable());
        assert!(VcError::InvalidRoundDuration(0).is_recoverable());
        assert!(VcError::DispatchBackpressure.is_recoverable());
        assert!(!VcError::ShuttingDown.is_recoverable());
        assert!(!VcError::Internal("x".to_string()).is_recoverable());
    }
}
