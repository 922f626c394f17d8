//! Integration tests for the session controller.
//!
//! Covers the state machine end to end: restored sessions, sign-in events
//! with and without a cached profile, single-flight fetches, fail-open
//! fetches, sign-out invalidation and teardown.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use examhub_core::{AuthUser, Email, Role, SessionState, SubscriptionStatus, UserId};
use examhub_integration_tests::{EPOCH_MS, TestContext, profile, school, user};
use examhub_portal::baas::{AuthEvent, BaasError, IdentityProvider, SignUp};
use secrecy::SecretString;

fn uid(id: &str) -> UserId {
    UserId::new(id)
}

/// `{user, profile = None, loading = false}`: the state a guard would bounce
/// to "unauthorized".
fn looks_unauthorized(state: &SessionState) -> bool {
    state.user.is_some() && state.profile.is_none() && !state.loading
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_fresh_start_without_session_settles_anonymous() {
    let ctx = TestContext::new();
    assert_eq!(ctx.controller.state(), SessionState::initializing());

    ctx.controller.start().await;

    assert_eq!(ctx.controller.state(), SessionState::anonymous());
    assert_eq!(ctx.directory.profile_calls(), 0);
}

#[tokio::test]
async fn test_unreadable_session_settles_anonymous() {
    let ctx = TestContext::new();
    ctx.identity.restore_session(&user("u1"));
    ctx.identity.set_fail_restore(true);

    ctx.controller.start().await;

    assert_eq!(ctx.controller.state(), SessionState::anonymous());
}

#[tokio::test]
async fn test_restored_session_resolves_profile_with_school() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));

    ctx.controller.start().await;

    let state = ctx.controller.state();
    assert!(state.is_settled());
    assert!(state.is_consistent());
    assert_eq!(state.user_id(), Some(&uid("u1")));
    let profile = state.profile.unwrap();
    assert_eq!(profile.role, Role::Teacher);
    assert_eq!(
        profile.school.unwrap().subscription_status,
        SubscriptionStatus::Active
    );
    assert_eq!(ctx.directory.profile_calls(), 1);
    assert_eq!(ctx.directory.school_calls(), 1);

    // The fetched profile is cached with its school merged in.
    let cached = ctx.cache().get(&uid("u1")).unwrap();
    assert!(cached.school.is_some());
}

#[tokio::test]
async fn test_first_resolution_ignores_cache() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.cache()
        .set(&uid("u1"), &profile("u1", Role::Student, Some("s1")));
    ctx.identity.restore_session(&user("u1"));

    ctx.controller.start().await;

    assert_eq!(ctx.controller.state().profile.unwrap().role, Role::Teacher);
    assert_eq!(ctx.directory.profile_calls(), 1);
    assert_eq!(ctx.cache().get(&uid("u1")).unwrap().role, Role::Teacher);
}

// =============================================================================
// Full fetch
// =============================================================================

#[tokio::test]
async fn test_fetch_error_fails_open_to_no_profile() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.directory.set_fail(true);
    ctx.identity.restore_session(&user("u1"));

    ctx.controller.start().await;

    let state = ctx.controller.state();
    assert!(looks_unauthorized(&state));
    assert_eq!(state.user_id(), Some(&uid("u1")));
    assert!(ctx.cache().peek().is_none());
}

#[tokio::test]
async fn test_missing_profile_resolves_without_profile() {
    let ctx = TestContext::new();
    ctx.identity.restore_session(&user("new-user"));

    ctx.controller.start().await;

    assert!(looks_unauthorized(&ctx.controller.state()));
    assert_eq!(ctx.directory.school_calls(), 0);
    assert!(ctx.cache().peek().is_none());
}

#[tokio::test]
async fn test_missing_school_keeps_profile() {
    let ctx = TestContext::new();
    ctx.directory
        .insert_profile(profile("u1", Role::Student, Some("gone")));
    ctx.identity.restore_session(&user("u1"));

    ctx.controller.start().await;

    let profile = ctx.controller.state().profile.unwrap();
    assert!(profile.school.is_none());
    assert!(!profile.is_suspended());
    assert_eq!(ctx.directory.school_calls(), 1);
}

#[tokio::test]
async fn test_platform_admin_skips_school_lookup() {
    let ctx = TestContext::new();
    ctx.directory
        .insert_profile(profile("root", Role::SuperAdmin, Some("s1")));
    ctx.directory
        .insert_school(school("s1", SubscriptionStatus::Suspended));
    ctx.identity.restore_session(&user("root"));

    ctx.controller.start().await;

    let profile = ctx.controller.state().profile.unwrap();
    assert!(profile.school.is_none());
    assert!(!profile.is_suspended());
    assert_eq!(ctx.directory.school_calls(), 0);
}

#[tokio::test]
async fn test_cache_write_failure_does_not_block_resolution() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.store.set_fail_writes(true);
    ctx.identity.restore_session(&user("u1"));

    ctx.controller.start().await;

    assert!(ctx.controller.state().profile.is_some());
    assert!(ctx.cache().peek().is_none());
}

// =============================================================================
// Sign-in events
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cache_hit_publishes_user_and_profile_together() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u2"));
    ctx.directory
        .insert_profile(profile("u2", Role::Student, Some("s1")));
    ctx.controller.start().await;
    ctx.controller.sign_out().await.unwrap();
    assert_eq!(ctx.directory.profile_calls(), 1);

    // Another process sharing the storage signed u1 in and cached the profile.
    let cached = profile("u1", Role::Teacher, Some("s1"))
        .with_school(school("s1", SubscriptionStatus::Active));
    ctx.cache().set(&uid("u1"), &cached);

    let mut rx = ctx.controller.subscribe();
    rx.borrow_and_update();
    let recorder = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            let done = state.profile.is_some();
            seen.push(state);
            if done {
                break;
            }
        }
        seen
    });

    ctx.identity.emit(AuthEvent::SignedIn(user("u1")));
    let seen = tokio::time::timeout(Duration::from_secs(1), recorder)
        .await
        .unwrap()
        .unwrap();

    assert!(!seen.is_empty());
    assert!(seen.iter().all(|s| !looks_unauthorized(s) && !s.loading));
    assert_eq!(seen.last().unwrap().profile.as_ref(), Some(&cached));
    assert_eq!(ctx.directory.profile_calls(), 1);

    // The background refresh runs after its delay and republishes silently.
    let mut renamed = profile("u1", Role::Teacher, Some("s1"));
    renamed.full_name = Some("Renamed".to_string());
    ctx.directory.insert_profile(renamed);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let state = ctx
        .wait_for(|s| {
            s.profile
                .as_ref()
                .is_some_and(|p| p.full_name.as_deref() == Some("Renamed"))
        })
        .await;
    assert!(!state.loading);
    assert!(state.profile.unwrap().school.is_some());
    assert_eq!(ctx.directory.profile_calls(), 2);
    assert_eq!(
        ctx.cache().get(&uid("u1")).unwrap().full_name.as_deref(),
        Some("Renamed")
    );
}

#[tokio::test(start_paused = true)]
async fn test_background_refresh_failure_keeps_cached_profile() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;
    let resolved = ctx.controller.state();

    ctx.directory.set_fail(true);
    ctx.identity.emit(AuthEvent::SignedIn(user("u1")));
    ctx.wait_profile_calls(2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(ctx.controller.state(), resolved);
    assert!(ctx.cache().get(&uid("u1")).is_some());
}

#[tokio::test]
async fn test_overlapping_sign_ins_fetch_once() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.controller.start().await;
    ctx.directory.hold();

    ctx.identity.emit(AuthEvent::SignedIn(user("u1")));
    ctx.identity.emit(AuthEvent::SignedIn(user("u1")));
    ctx.wait_profile_calls(1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Resolving: guards show a placeholder, never a redirect.
    assert!(ctx.controller.state().loading);

    ctx.directory.release(2);
    let state = ctx.wait_signed_in("u1").await;
    assert!(state.profile.is_some());
    assert_eq!(ctx.directory.profile_calls(), 1);
}

#[tokio::test]
async fn test_refetch_while_fetching_is_dropped() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;
    ctx.directory.hold();

    let controller = ctx.controller.clone();
    let running = tokio::spawn(async move { controller.refetch_profile().await });
    ctx.wait_profile_calls(2).await;
    assert!(ctx.controller.state().loading);

    ctx.controller.refetch_profile().await;
    ctx.directory.release(1);
    running.await.unwrap();

    assert!(ctx.controller.state().is_settled());
    assert_eq!(ctx.directory.profile_calls(), 2);
}

#[tokio::test]
async fn test_password_sign_in_resolves_profile() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.add_account(&user("u1"), "correct horse");
    ctx.controller.start().await;

    let email = Email::parse("u1@school.test").unwrap();
    ctx.controller
        .sign_in(&email, &SecretString::from("correct horse"))
        .await
        .unwrap();

    let state = ctx.wait_signed_in("u1").await;
    assert_eq!(state.profile.unwrap().role, Role::Teacher);
}

#[tokio::test]
async fn test_failed_sign_in_while_signed_in_keeps_session() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.add_account(&user("u1"), "correct horse");
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;
    let resolved = ctx.wait_signed_in("u1").await;
    assert!(!resolved.loading);

    let email = Email::parse("u1@school.test").unwrap();
    let result = ctx
        .controller
        .sign_in(&email, &SecretString::from("wrong"))
        .await;
    assert!(matches!(result, Err(BaasError::InvalidCredentials)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = ctx.controller.state();
    assert_eq!(state, resolved);
    assert!(state.is_settled());
    assert_eq!(ctx.directory.profile_calls(), 1);
}

#[tokio::test]
async fn test_sign_up_is_pending_as_soon_as_it_returns() {
    let ctx = TestContext::new();
    ctx.seed_teacher("newbie", "s1", SubscriptionStatus::Active);
    ctx.controller.start().await;

    let signed_in = ctx
        .controller
        .sign_up(&sign_up_request("newbie@school.test"))
        .await
        .unwrap();
    assert!(signed_in);

    // A reader arriving now must not take the session for anonymous.
    let state = ctx.controller.state();
    assert!(state.loading || state.user.is_some(), "{state:?}");

    let settled = ctx.controller.settled().await;
    assert_eq!(settled.user_id(), Some(&uid("newbie")));
    assert!(settled.profile.is_some());
}

#[tokio::test]
async fn test_wrong_password_leaves_state_anonymous() {
    let ctx = TestContext::new();
    ctx.identity.add_account(&user("u1"), "correct horse");
    ctx.controller.start().await;

    let email = Email::parse("u1@school.test").unwrap();
    let result = ctx
        .controller
        .sign_in(&email, &SecretString::from("battery staple"))
        .await;

    assert!(matches!(result, Err(BaasError::InvalidCredentials)));
    assert_eq!(ctx.controller.state(), SessionState::anonymous());
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test]
async fn test_sign_out_invalidates_cache_and_next_sign_in_refetches() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.identity.add_account(&user("u1"), "correct horse");
    ctx.controller.start().await;
    assert!(ctx.cache().get(&uid("u1")).is_some());

    ctx.controller.sign_out().await.unwrap();

    assert_eq!(ctx.controller.state(), SessionState::anonymous());
    let entry = ctx.cache().peek().unwrap();
    assert_eq!(entry.id, uid("u1"));
    assert_eq!(entry.ts, 0);
    assert!(ctx.cache().get(&uid("u1")).is_none());

    ctx.clock.advance(Duration::from_secs(5 * 60));
    let email = Email::parse("u1@school.test").unwrap();
    ctx.controller
        .sign_in(&email, &SecretString::from("correct horse"))
        .await
        .unwrap();
    let state = ctx.wait_signed_in("u1").await;

    assert!(state.profile.is_some());
    assert_eq!(ctx.directory.profile_calls(), 2);
    assert_eq!(
        ctx.cache().peek().unwrap().ts,
        EPOCH_MS + 5 * 60 * 1000
    );
}

#[tokio::test]
async fn test_external_sign_out_event_clears_state() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;

    ctx.identity.emit(AuthEvent::SignedOut);

    let state = ctx.wait_for(|s| s.user.is_none()).await;
    assert_eq!(state, SessionState::anonymous());
    assert_eq!(ctx.cache().peek().unwrap().ts, 0);
}

#[tokio::test]
async fn test_sign_out_during_fetch_discards_result() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.controller.start().await;
    ctx.directory.hold();

    ctx.identity.emit(AuthEvent::SignedIn(user("u1")));
    ctx.wait_profile_calls(1).await;
    ctx.controller.sign_out().await.unwrap();
    ctx.directory.release(1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(ctx.controller.state(), SessionState::anonymous());
    assert!(ctx.cache().peek().is_none());
}

// =============================================================================
// Token refresh and manual refetch
// =============================================================================

#[tokio::test]
async fn test_token_refresh_replaces_user_and_keeps_profile() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;
    let before = ctx.controller.state().profile;

    let new_email = Email::parse("u1.renamed@school.test").unwrap();
    ctx.identity.emit(AuthEvent::TokenRefreshed(AuthUser::new(
        "u1",
        Some(new_email.clone()),
    )));

    let state = ctx
        .wait_for(|s| s.user.as_ref().and_then(|u| u.email.as_ref()) == Some(&new_email))
        .await;
    assert_eq!(state.profile, before);
    assert!(!state.loading);
    assert_eq!(ctx.directory.profile_calls(), 1);
}

#[tokio::test]
async fn test_provider_refresh_emits_token_refreshed() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;
    let before = ctx.controller.state();

    let mut events = ctx.identity.subscribe();
    ctx.identity.refresh_session().await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        AuthEvent::TokenRefreshed(u) if u.id == uid("u1")
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ctx.controller.state(), before);
}

#[tokio::test]
async fn test_refetch_profile_bypasses_cache() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;

    ctx.directory
        .insert_school(school("s1", SubscriptionStatus::Expired));
    ctx.controller.refetch_profile().await;

    let state = ctx.controller.state();
    assert!(!state.loading);
    assert!(state.profile.unwrap().is_suspended());
    assert_eq!(ctx.directory.profile_calls(), 2);
    assert!(ctx.cache().get(&uid("u1")).unwrap().is_suspended());
}

#[tokio::test]
async fn test_refetch_without_user_is_noop() {
    let ctx = TestContext::new();
    ctx.controller.start().await;

    ctx.controller.refetch_profile().await;

    assert_eq!(ctx.controller.state(), SessionState::anonymous());
    assert_eq!(ctx.directory.profile_calls(), 0);
}

// =============================================================================
// Sign-up and account actions
// =============================================================================

fn sign_up_request(email: &str) -> SignUp {
    SignUp {
        email: Email::parse(email).unwrap(),
        password: SecretString::from("a long password"),
        full_name: Some("New Teacher".to_string()),
        role: Some(Role::Teacher),
    }
}

#[tokio::test]
async fn test_sign_up_signs_in_immediately() {
    let ctx = TestContext::new();
    ctx.seed_teacher("newbie", "s1", SubscriptionStatus::Trial);
    ctx.controller.start().await;

    let signed_in = ctx
        .controller
        .sign_up(&sign_up_request("newbie@school.test"))
        .await
        .unwrap();

    assert!(signed_in);
    let state = ctx.wait_signed_in("newbie").await;
    assert_eq!(state.profile.unwrap().role, Role::Teacher);
}

#[tokio::test]
async fn test_sign_up_awaiting_confirmation_stays_anonymous() {
    let ctx = TestContext::new();
    ctx.identity.set_confirm_signups(true);
    ctx.controller.start().await;

    let signed_in = ctx
        .controller
        .sign_up(&sign_up_request("newbie@school.test"))
        .await
        .unwrap();

    assert!(!signed_in);
    assert_eq!(ctx.controller.state(), SessionState::anonymous());

    let again = ctx
        .controller
        .sign_up(&sign_up_request("newbie@school.test"))
        .await;
    assert!(matches!(again, Err(BaasError::UserAlreadyExists)));
    assert_eq!(ctx.controller.state(), SessionState::anonymous());
}

#[tokio::test]
async fn test_update_password_requires_session() {
    let ctx = TestContext::new();
    ctx.controller.start().await;

    let result = ctx
        .controller
        .update_password(&SecretString::from("a new password"))
        .await;
    assert!(matches!(result, Err(BaasError::NoSession)));
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_dispose_stops_event_handling() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;
    let resolved = ctx.controller.state();

    ctx.controller.dispose();
    assert!(!ctx.controller.is_active());
    ctx.identity.emit(AuthEvent::SignedOut);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(ctx.controller.state(), resolved);
}

#[tokio::test]
async fn test_fetch_finishing_after_dispose_publishes_nothing() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.controller.start().await;
    ctx.directory.hold();

    ctx.identity.emit(AuthEvent::SignedIn(user("u1")));
    ctx.wait_profile_calls(1).await;
    let before = ctx.controller.state();

    ctx.controller.dispose();
    ctx.directory.release(1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(ctx.controller.state(), before);
    assert!(ctx.controller.state().user.is_none());
    assert!(ctx.cache().peek().is_none());
}

#[tokio::test]
async fn test_sign_out_after_dispose_leaves_cache_alone() {
    let ctx = TestContext::new();
    ctx.seed_teacher("u1", "s1", SubscriptionStatus::Active);
    ctx.identity.restore_session(&user("u1"));
    ctx.controller.start().await;
    let resolved = ctx.controller.state();
    let entry = ctx.cache().peek().unwrap();

    ctx.controller.dispose();
    ctx.controller.sign_out().await.unwrap();

    assert_eq!(ctx.controller.state(), resolved);
    assert_eq!(ctx.cache().peek().unwrap(), entry);
    assert!(ctx.cache().get(&uid("u1")).is_some());
}
