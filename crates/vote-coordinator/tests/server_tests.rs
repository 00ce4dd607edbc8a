//! End-to-end tests over real TCP connections.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;
use vc_test_utils::*;
use vote_coordinator::connection::ConnectionSettings;
use vote_coordinator::protocol::MAX_LINE_LENGTH;

const ROUND: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_greeting_before_round_starts() {
    let server = TestVoteServer::spawn(decoupled()).await;
    let mut client = TestClient::join(server.addr, "alice").await;

    client.expect_line("Aguardando inicio da votacao...").await;
    client
        .expect_line("Bem-vindo! Opcoes disponiveis: [A, B, C]. Digite: VOTE [Opcao]")
        .await;

    client.vote("A").await;
    client.expect_line("ERRO: Votacao nao iniciada").await;

    server.stop().await;
}

#[tokio::test]
async fn test_vote_flow_over_tcp() {
    for strategy in [locked(), decoupled()] {
        let server = TestVoteServer::spawn(strategy).await;
        let mut alice = TestClient::join(server.addr, "alice").await;
        let mut bob = TestClient::join(server.addr, "bob").await;
        alice.wait_for_prefix("Bem-vindo!").await;
        bob.wait_for_prefix("Bem-vindo!").await;

        server.coordinator.start_round(ROUND).await.unwrap();
        alice
            .expect_line("VOTACAO_INICIADA: 60 segundos. Opcoes: [A, B, C]")
            .await;
        bob.expect_prefix("VOTACAO_INICIADA").await;

        alice.vote("B").await;
        alice.expect_line("OK: Voto registrado -> B").await;
        alice.expect_line("UPDATE: {A:0, B:1, C:0}").await;

        alice.vote("A").await;
        alice.expect_line("ERRO: Voto duplicado").await;

        bob.vote("D").await;
        bob.expect_line("ERRO: Opcao invalida. Use: [A, B, C]").await;
        bob.send_line("hello").await;
        bob.vote("C").await;
        bob.expect_line("OK: Voto registrado -> C").await;
        bob.expect_line("UPDATE: {A:0, B:1, C:1}").await;
        alice.expect_line("UPDATE: {A:0, B:1, C:1}").await;

        server.coordinator.end_round().await.unwrap();
        alice.expect_line("VOTACAO_ENCERRADA: {A:0, B:1, C:1}").await;
        bob.expect_line("VOTACAO_ENCERRADA: {A:0, B:1, C:1}").await;

        server.stop().await;
    }
}

#[tokio::test]
async fn test_late_joiner_sees_round_in_progress() {
    let server = TestVoteServer::spawn(decoupled()).await;
    server.coordinator.start_round(ROUND).await.unwrap();

    let mut client = TestClient::join(server.addr, "late").await;
    let line = client
        .expect_prefix("Votacao em andamento! Tempo restante: ")
        .await;
    assert!(line.ends_with('s'), "{line}");
    client.expect_line("Opcoes: [A, B, C]").await;
    client.expect_prefix("Bem-vindo!").await;

    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_name_rejected_and_closed() {
    let server = TestVoteServer::spawn(decoupled()).await;
    let mut first = TestClient::join(server.addr, "carol").await;
    first.wait_for_prefix("Bem-vindo!").await;

    let mut second = TestClient::join(server.addr, "carol").await;
    second.expect_line("ERRO: NOME em uso").await;
    second.expect_closed().await;

    server.stop().await;
}

#[tokio::test]
async fn test_blank_name_rejected() {
    let server = TestVoteServer::spawn(decoupled()).await;
    let mut client = TestClient::join(server.addr, "   ").await;

    client.expect_line("ERRO: NOME invalido").await;
    client.expect_closed().await;
    assert_eq!(server.coordinator.status().await.unwrap().registered, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_name_rejected() {
    let server = TestVoteServer::spawn(decoupled()).await;
    let name = "n".repeat(MAX_LINE_LENGTH + 1);
    let mut client = TestClient::join(server.addr, &name).await;

    client.expect_line("ERRO: NOME invalido").await;
    client.expect_closed().await;
    assert_eq!(server.coordinator.status().await.unwrap().registered, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_frees_identity() {
    let server = TestVoteServer::spawn(locked()).await;
    let mut first = TestClient::join(server.addr, "dave").await;
    first.wait_for_prefix("Bem-vindo!").await;
    drop(first);

    let mut registered = 1;
    for _ in 0..100 {
        registered = server.coordinator.status().await.unwrap().registered;
        if registered == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(registered, 0, "session should be released on disconnect");

    let mut again = TestClient::join(server.addr, "dave").await;
    again.wait_for_prefix("Bem-vindo!").await;

    server.stop().await;
}

#[tokio::test]
async fn test_coordinator_shutdown_closes_clients() {
    let coordinator = spawn_coordinator(decoupled());
    let server = TestVoteServer::spawn_with(
        coordinator.clone(),
        ConnectionSettings { outbound_buffer: 8 },
    )
    .await;
    let mut client = TestClient::join(server.addr, "erin").await;
    client.wait_for_prefix("Bem-vindo!").await;

    coordinator.shutdown(Duration::from_secs(1)).await.unwrap();

    client.vote("A").await;
    client.expect_line("ERRO: Servidor encerrando").await;
    client.expect_closed().await;

    server.stop().await;
}

#[tokio::test]
async fn test_server_stop_closes_connections() {
    let server = TestVoteServer::spawn(decoupled()).await;
    let mut client = TestClient::join(server.addr, "frank").await;
    client.wait_for_prefix("Bem-vindo!").await;

    let coordinator = server.coordinator.clone();
    server.stop().await;

    client.expect_closed().await;
    assert_eq!(coordinator.status().await.unwrap().registered, 0);
}
