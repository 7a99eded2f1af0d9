use std::future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use sitedesk_auth::{
    AuthErrorKind, CredentialVerifier, InMemoryDirectory, Role, UserRecord, VerificationFailure,
};
use sitedesk_core::ManualClock;
use sitedesk_session::{AuthService, AuthState, InMemoryStore, LoginError, SessionConfig};

/// Holds every verification until the test opens the gate.
#[derive(Default)]
struct GatedVerifier {
    directory: InMemoryDirectory,
    entered: Notify,
    gate: Notify,
}

#[async_trait]
impl CredentialVerifier for GatedVerifier {
    async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<UserRecord, VerificationFailure> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.directory.verify(identifier, secret).await
    }
}

/// Never answers.
struct SilentVerifier;

#[async_trait]
impl CredentialVerifier for SilentVerifier {
    async fn verify(
        &self,
        _identifier: &str,
        _secret: &str,
    ) -> Result<UserRecord, VerificationFailure> {
        future::pending().await
    }
}

fn gated_service() -> (Arc<GatedVerifier>, Arc<InMemoryStore>, AuthService) {
    sitedesk_observability::init_for_tests();
    let verifier = Arc::new(GatedVerifier::default());
    verifier
        .directory
        .register(UserRecord::new("pia@example.com", "Pia", Role::SiteEngineer), "pw");
    let store = Arc::new(InMemoryStore::new());
    let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap());
    let service = AuthService::start(
        SessionConfig::default(),
        verifier.clone(),
        store.clone(),
        Arc::new(clock),
    );
    (verifier, store, service)
}

#[tokio::test]
async fn logout_during_verification_discards_the_late_result() {
    let (verifier, store, service) = gated_service();

    let pending = {
        let service = service.clone();
        tokio::spawn(async move { service.login("pia@example.com", "pw").await })
    };
    verifier.entered.notified().await;
    assert!(service.snapshot().is_loading);

    service.logout();
    verifier.gate.notify_one();

    let outcome = pending.await.unwrap();
    assert_eq!(outcome, Err(LoginError::Superseded));
    assert_eq!(service.state(), AuthState::Unauthenticated);
    assert!(service.snapshot().auth_error.is_none());
    assert!(store.is_empty());
    assert!(service.timer_schedule().is_empty());
}

#[tokio::test]
async fn second_login_while_one_is_in_flight_is_refused() {
    let (verifier, _store, service) = gated_service();

    let pending = {
        let service = service.clone();
        tokio::spawn(async move { service.login("pia@example.com", "pw").await })
    };
    verifier.entered.notified().await;

    assert_eq!(
        service.login("pia@example.com", "pw").await,
        Err(LoginError::InProgress)
    );

    verifier.gate.notify_one();
    let user = pending.await.unwrap().unwrap();
    assert_eq!(user.role, Role::SiteEngineer);
    assert!(service.snapshot().is_authenticated);
}

#[tokio::test(start_paused = true)]
async fn verification_that_never_answers_times_out_as_a_network_error() {
    sitedesk_observability::init_for_tests();
    let config = SessionConfig {
        verification_timeout: chrono::Duration::seconds(5),
        ..SessionConfig::default()
    };
    let service = AuthService::start(
        config,
        Arc::new(SilentVerifier),
        Arc::new(InMemoryStore::new()),
        Arc::new(ManualClock::starting_at(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap())),
    );

    let err = service.login("pia@example.com", "pw").await.unwrap_err();

    assert_eq!(err.auth_error().map(|e| e.kind), Some(AuthErrorKind::Network));
    assert!(!service.snapshot().is_loading);

    // The machine is free for the next attempt.
    assert!(matches!(
        service.login("pia@example.com", "pw").await,
        Err(LoginError::Rejected(_))
    ));
}
